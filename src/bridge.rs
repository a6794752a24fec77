use serde::Serialize;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::extract::page::{HttpPage, PageSource, StaticPage};
use crate::extract::remote::SubmissionApi;
use crate::kv::SqliteKv;
use crate::store::Store;

/// Request kinds the UI collaborator may send.
#[derive(Debug)]
pub enum Request {
    CheckReadiness,
    CaptureNow {
        location: String,
        /// Pre-rendered page snapshot; fetched from `location` when absent.
        page_html: Option<String>,
    },
}

/// Uniform `{success, data|error}` answer envelope.
#[derive(Debug, Serialize)]
pub struct Reply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    fn ok(data: serde_json::Value) -> Self {
        Reply {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn fail(error: impl ToString) -> Self {
        Reply {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

struct Job {
    request: Request,
    reply: oneshot::Sender<Reply>,
}

/// Handle to the bridge task. Cheap to clone; requests queue in arrival
/// order.
#[derive(Clone)]
pub struct BridgeHandle {
    tx: mpsc::Sender<Job>,
}

impl BridgeHandle {
    pub async fn request(&self, request: Request) -> Reply {
        let (tx, rx) = oneshot::channel();
        let job = Job { request, reply: tx };
        if self.tx.send(job).await.is_err() {
            return Reply::fail("bridge task is gone");
        }
        rx.await.unwrap_or_else(|_| Reply::fail("bridge dropped the request"))
    }
}

/// Spawn the bridge task. It is the single owner of the store and the
/// api client, so captures serialize through one queue and never race on
/// the aggregate.
pub fn spawn(store: Store<SqliteKv>, api: SubmissionApi) -> BridgeHandle {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(run(rx, store, api));
    BridgeHandle { tx }
}

// The store is owned by this task and only ever borrowed between awaits;
// rusqlite connections are Send but not Sync.
async fn run(mut rx: mpsc::Receiver<Job>, store: Store<SqliteKv>, api: SubmissionApi) {
    while let Some(job) = rx.recv().await {
        let reply = match job.request {
            Request::CheckReadiness => readiness(&store, &api),
            Request::CaptureNow { location, page_html } => {
                match capture(&api, &location, page_html).await {
                    Ok(record) => match store.add_problem(&record) {
                        Ok(problem) => Reply::ok(
                            serde_json::to_value(&problem)
                                .unwrap_or_else(|_| json!({ "id": problem.id })),
                        ),
                        Err(e) => Reply::fail(e),
                    },
                    Err(e) => Reply::fail(e),
                }
            }
        };
        if job.reply.send(reply).is_err() {
            warn!("requester went away before the reply");
        }
    }
}

fn readiness(store: &Store<SqliteKv>, api: &SubmissionApi) -> Reply {
    let persistence = store.get_info().is_ok();
    Reply::ok(json!({
        "ready": persistence && api.has_credentials(),
        "persistence": persistence,
        "credentials": api.has_credentials(),
    }))
}

async fn capture(
    api: &SubmissionApi,
    location: &str,
    page_html: Option<String>,
) -> Result<crate::extract::ExtractedRecord, crate::error::CaptureError> {
    let page: Box<dyn PageSource + Send + Sync> = match page_html {
        Some(html) => Box::new(StaticPage(html)),
        None => Box::new(HttpPage {
            url: location.to_string(),
        }),
    };
    crate::extract::capture_submission(api, page.as_ref(), location).await
}
