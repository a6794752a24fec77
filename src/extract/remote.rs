use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::FetchError;

const DEFAULT_ENDPOINT: &str = "https://leetcode.com/graphql/";

const SUBMISSION_QUERY: &str = "\
query submissionDetails($submissionId: Int!) {
  submissionDetails(submissionId: $submissionId) {
    code
    lang { name }
    question { title titleSlug }
  }
}";

/// Raw primary-extractor output. No normalization happens here; that is
/// the orchestrator's job.
#[derive(Debug, Clone)]
pub struct RawSubmission {
    pub code: String,
    pub lang: String,
    pub title: String,
}

/// Source of structured submission data, keyed by submission id.
#[async_trait]
pub trait SubmissionSource {
    async fn fetch(&self, submission_id: &str) -> Result<RawSubmission, FetchError>;
}

/// The real submission API: one structured query per capture, ambient
/// session credentials, no retries.
pub struct SubmissionApi {
    client: reqwest::Client,
    endpoint: String,
    session: Option<String>,
    csrf: Option<String>,
}

impl SubmissionApi {
    /// Build a client from the environment: `OJ_SESSION` / `OJ_CSRF`
    /// session credentials, optional `OJ_GRAPHQL_URL` endpoint override.
    pub fn from_env() -> Self {
        SubmissionApi {
            client: reqwest::Client::new(),
            endpoint: std::env::var("OJ_GRAPHQL_URL").unwrap_or_else(|_| DEFAULT_ENDPOINT.into()),
            session: std::env::var("OJ_SESSION").ok(),
            csrf: std::env::var("OJ_CSRF").ok(),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.session.is_some() && self.csrf.is_some()
    }
}

#[async_trait]
impl SubmissionSource for SubmissionApi {
    async fn fetch(&self, submission_id: &str) -> Result<RawSubmission, FetchError> {
        let (session, csrf) = match (&self.session, &self.csrf) {
            (Some(s), Some(c)) => (s, c),
            _ => return Err(FetchError::AuthRequired),
        };

        let id: i64 = submission_id
            .parse()
            .map_err(|_| FetchError::MissingField("submissionId"))?;
        let body = json!({
            "query": SUBMISSION_QUERY,
            "variables": { "submissionId": id },
        });

        debug!("querying submission {} at {}", submission_id, self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .header("cookie", format!("session={}; csrftoken={}", session, csrf))
            .header("x-csrftoken", csrf)
            .json(&body)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(classify_status(status));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        parse_payload(&payload)
    }
}

/// Map a non-2xx status to its failure kind.
fn classify_status(status: u16) -> FetchError {
    match status {
        401 | 403 => FetchError::AuthRequired,
        404 => FetchError::NotFound,
        429 => FetchError::RateLimited,
        s if s >= 500 => FetchError::UpstreamUnavailable,
        s => FetchError::RequestFailed(s),
    }
}

/// Pull the submission out of a 2xx payload, defensively: service-level
/// errors embedded in the body, a missing result node, and individually
/// missing fields all get distinct reports.
fn parse_payload(payload: &Value) -> Result<RawSubmission, FetchError> {
    if let Some(errors) = payload.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            let joined = errors
                .iter()
                .map(|e| {
                    e.get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string()
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(FetchError::Upstream(joined));
        }
    }

    let detail = payload
        .pointer("/data/submissionDetails")
        .filter(|d| !d.is_null())
        .ok_or(FetchError::MissingField("submissionDetails"))?;

    let code = detail
        .get("code")
        .and_then(Value::as_str)
        .ok_or(FetchError::MissingField("code"))?;
    // lang arrives as { name } but older payloads carry a bare string
    let lang = detail
        .pointer("/lang/name")
        .or_else(|| detail.get("lang"))
        .and_then(Value::as_str)
        .ok_or(FetchError::MissingField("lang"))?;
    let title = detail
        .pointer("/question/title")
        .and_then(Value::as_str)
        .ok_or(FetchError::MissingField("title"))?;

    Ok(RawSubmission {
        code: code.to_string(),
        lang: lang.to_string(),
        title: title.to_string(),
    })
}
