use thiserror::Error;

/// Failures from the primary (structured API) extractor. None of these
/// propagate past the orchestrator on their own: every variant triggers
/// the fallback, and only resurfaces folded into
/// [`CaptureError::AllStagesFailed`].
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("authentication required (missing or rejected session credentials)")]
    AuthRequired,
    #[error("submission not found upstream")]
    NotFound,
    #[error("rate limited by upstream")]
    RateLimited,
    #[error("upstream unavailable")]
    UpstreamUnavailable,
    #[error("request failed with status {0}")]
    RequestFailed(u16),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("response missing field '{0}'")]
    MissingField(&'static str),
    #[error("implausible '{0}' in api payload")]
    Implausible(&'static str),
    #[error("network error: {0}")]
    Network(String),
}

/// Failures from the fallback (page-scraping) extractor.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("page structure missing '{0}'")]
    StructureMissing(&'static str),
    #[error("page unavailable: {0}")]
    Unavailable(String),
}

/// Terminal failures of the extraction pipeline.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no submission id in current location")]
    MissingSubmissionId,
    #[error("primary extraction failed: {primary}; fallback extraction failed: {fallback}")]
    AllStagesFailed {
        primary: FetchError,
        fallback: PageError,
    },
}

#[derive(Debug, Error)]
pub enum KvError {
    #[error("version conflict writing key '{0}'")]
    VersionConflict(String),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Failures from the ordered store. InvalidInput and NotFound always
/// surface to the caller; delete of an absent id is a logged no-op.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid input: field '{field}' {reason}")]
    InvalidInput {
        field: &'static str,
        reason: &'static str,
    },
    #[error("no problem with id '{0}'")]
    NotFound(String),
    #[error("aggregate changed underneath this write, retry the operation")]
    Conflict,
    #[error(transparent)]
    Kv(#[from] KvError),
}

impl StoreError {
    pub(crate) fn blank(field: &'static str) -> Self {
        StoreError::InvalidInput {
            field,
            reason: "must be non-empty text",
        }
    }
}
