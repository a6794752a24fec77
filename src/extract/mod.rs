pub mod page;
pub mod remote;

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{CaptureError, FetchError};
use crate::language::normalize_language_code;
use crate::validate::{is_plausible_code, is_plausible_language_label};
use page::PageSource;
use remote::SubmissionSource;

/// Candidate id patterns against the current location, most specific
/// first.
static SUBMISSION_ID_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"/submissions/detail/(\d+)", r"/submissions/(\d+)"]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
});

static ORDINAL_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+\.\s*(.+)$").unwrap());

/// A normalized capture, ready for the store.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedRecord {
    pub name: String,
    pub code: String,
    pub language: String,
    pub submission_link: String,
}

/// Pull the submission id out of the current location.
pub fn parse_submission_id(location: &str) -> Option<String> {
    SUBMISSION_ID_RES
        .iter()
        .find_map(|re| re.captures(location))
        .map(|caps| caps[1].to_string())
}

/// Canonical path for a submission, derived from the id. The page's
/// current path may differ and is never used here.
pub fn submission_link(submission_id: &str) -> String {
    format!("/submissions/detail/{}/", submission_id)
}

/// Strip a leading "<integer>. " ordinal from a display title.
pub fn strip_ordinal_prefix(title: &str) -> String {
    match ORDINAL_PREFIX_RE.captures(title) {
        Some(caps) => caps[1].trim().to_string(),
        None => title.trim().to_string(),
    }
}

/// Run the capture pipeline: parse the submission id, try the structured
/// API, distrust its output, and degrade to page scraping. Every primary
/// failure transitions to the fallback; only the pair of failures is
/// terminal.
pub async fn capture_submission(
    api: &(impl SubmissionSource + ?Sized),
    page: &(impl PageSource + ?Sized),
    location: &str,
) -> Result<ExtractedRecord, CaptureError> {
    let id = parse_submission_id(location).ok_or(CaptureError::MissingSubmissionId)?;
    let link = submission_link(&id);

    let primary_failure = match api.fetch(&id).await.and_then(check_payload) {
        Ok(raw) => {
            info!("primary extraction ok for submission {}", id);
            return Ok(ExtractedRecord {
                name: strip_ordinal_prefix(&raw.title),
                code: raw.code,
                language: normalize_language_code(&raw.lang),
                submission_link: link,
            });
        }
        Err(e) => e,
    };
    warn!("primary extraction failed ({}), trying page scan", primary_failure);

    match page::scrape_submission(page).await {
        Ok(fields) => {
            info!("fallback extraction ok for submission {}", id);
            Ok(ExtractedRecord {
                name: strip_ordinal_prefix(&fields.title),
                code: fields.code,
                language: fields.language,
                submission_link: link,
            })
        }
        Err(fallback) => Err(CaptureError::AllStagesFailed {
            primary: primary_failure,
            fallback,
        }),
    }
}

/// The API is authoritative but has been seen returning stale or
/// corrupted payloads; hold its output to the same bar as scraped text.
fn check_payload(raw: remote::RawSubmission) -> Result<remote::RawSubmission, FetchError> {
    if !is_plausible_code(&raw.code) {
        return Err(FetchError::Implausible("code"));
    }
    if !is_plausible_language_label(&raw.lang) {
        return Err(FetchError::Implausible("lang"));
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PageError;
    use async_trait::async_trait;
    use remote::RawSubmission;

    struct FixedApi(Result<RawSubmission, ()>);

    #[async_trait]
    impl SubmissionSource for FixedApi {
        async fn fetch(&self, _id: &str) -> Result<RawSubmission, FetchError> {
            match &self.0 {
                Ok(raw) => Ok(raw.clone()),
                Err(()) => Err(FetchError::AuthRequired),
            }
        }
    }

    struct NoPage;

    #[async_trait]
    impl PageSource for NoPage {
        async fn html(&self) -> Result<String, PageError> {
            Err(PageError::Unavailable("no page in this test".into()))
        }
    }

    fn good_raw() -> RawSubmission {
        RawSubmission {
            code: "def f(n):\n    return n * 2".into(),
            lang: "python3".into(),
            title: "14. Longest Common Prefix".into(),
        }
    }

    fn page_html() -> String {
        std::fs::read_to_string("tests/fixtures/submission_page.html").unwrap()
    }

    const LOCATION: &str = "https://judge.example.com/submissions/detail/123456789/";

    #[test]
    fn id_from_detail_path() {
        assert_eq!(
            parse_submission_id("https://x.test/submissions/detail/42/").as_deref(),
            Some("42")
        );
    }

    #[test]
    fn id_from_bare_path() {
        assert_eq!(
            parse_submission_id("https://x.test/problems/two-sum/submissions/9001/").as_deref(),
            Some("9001")
        );
    }

    #[test]
    fn no_id_anywhere() {
        assert_eq!(parse_submission_id("https://x.test/problemset/all/"), None);
    }

    #[test]
    fn ordinal_prefix_stripped() {
        assert_eq!(
            strip_ordinal_prefix("14. Longest Common Prefix"),
            "Longest Common Prefix"
        );
    }

    #[test]
    fn plain_title_only_trimmed() {
        assert_eq!(strip_ordinal_prefix("  Two Sum "), "Two Sum");
        assert_eq!(strip_ordinal_prefix("v2. rewrite"), "v2. rewrite");
    }

    #[tokio::test]
    async fn primary_success_normalizes() {
        let record = capture_submission(&FixedApi(Ok(good_raw())), &NoPage, LOCATION)
            .await
            .unwrap();
        assert_eq!(record.name, "Longest Common Prefix");
        assert_eq!(record.language, "Python3");
        assert_eq!(record.submission_link, "/submissions/detail/123456789/");
    }

    #[tokio::test]
    async fn auth_failure_degrades_to_fallback() {
        let record = capture_submission(
            &FixedApi(Err(())),
            &page::StaticPage(page_html()),
            LOCATION,
        )
        .await
        .unwrap();
        assert_eq!(record.name, "Longest Common Prefix");
        assert!(record.code.contains("longestCommonPrefix"));
        // Canonical link comes from the id, not the scraped page
        assert_eq!(record.submission_link, "/submissions/detail/123456789/");
    }

    #[tokio::test]
    async fn corrupted_payload_degrades_to_fallback() {
        let corrupt = RawSubmission {
            code: "####".into(),
            lang: "python3".into(),
            title: "1. Two Sum".into(),
        };
        let record = capture_submission(
            &FixedApi(Ok(corrupt)),
            &page::StaticPage(page_html()),
            LOCATION,
        )
        .await
        .unwrap();
        assert!(record.code.contains("longestCommonPrefix"));
    }

    #[tokio::test]
    async fn both_stages_failing_keeps_both_reasons() {
        let err = capture_submission(&FixedApi(Err(())), &NoPage, LOCATION)
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("authentication required"));
        assert!(message.contains("no page in this test"));
    }

    #[tokio::test]
    async fn missing_id_is_terminal() {
        let err = capture_submission(&FixedApi(Ok(good_raw())), &NoPage, "https://x.test/home")
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::MissingSubmissionId));
    }
}
