//! In-memory collaborators for controller and orchestrator tests.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use company_etl_company_models::CompanyRecord;
use company_etl_database::sink::{CompanySink, UpsertError, UpsertReceipt};
use company_etl_scraper::{FetchRequest, FetchResponse, Transport, TransportError, TransportErrorKind};
use company_etl_source::source_def::{SourceDefinition, parse_source_toml};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::config::ControllerConfig;

const SOURCE: &str = r#"
    id = "test"
    name = "Test API"

    [request]
    url = "https://api.example.com/search"
    body = '{"from": "{{offset}}", "size": "{{size}}", "prefix": "{{prefix}}"}'
"#;

pub type Scripted = Result<FetchResponse, TransportError>;

/// Replays canned responses in order and records every `(prefix, offset)`
/// requested. Once the script runs out it answers with empty pages.
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<(String, u64)>>,
    cancel_on_fetch: Option<CancellationToken>,
}

impl ScriptedTransport {
    pub fn new(responses: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            cancel_on_fetch: None,
        }
    }

    /// Cancels `token` while answering each request, as a Ctrl-C arriving
    /// mid-fetch would.
    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_on_fetch = Some(token);
        self
    }

    pub fn requests(&self) -> Vec<(String, u64)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn offsets(&self) -> Vec<u64> {
        self.requests().into_iter().map(|(_, offset)| offset).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, TransportError> {
        let body: Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
        self.requests.lock().unwrap().push((
            body["prefix"].as_str().unwrap().to_string(),
            body["from"].as_u64().unwrap(),
        ));
        if let Some(token) = &self.cancel_on_fetch {
            token.cancel();
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(page(&[], None)))
    }
}

/// Remembers stored company ids; rejects the ids in `failing`.
#[derive(Default)]
pub struct RecordingSink {
    pub ids: Mutex<Vec<String>>,
    pub failing: BTreeSet<String>,
}

impl RecordingSink {
    pub fn stored(&self) -> Vec<String> {
        self.ids.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompanySink for RecordingSink {
    async fn apply(&self, record: &CompanyRecord) -> Result<UpsertReceipt, UpsertError> {
        if self.failing.contains(&record.company_id) {
            return Err(UpsertError::ScalarWrite {
                company_id: record.company_id.clone(),
                message: "constraint violation".to_string(),
            });
        }
        self.ids.lock().unwrap().push(record.company_id.clone());
        Ok(UpsertReceipt {
            company_id: record.company_id.clone(),
            ..UpsertReceipt::default()
        })
    }
}

/// A 200 response with one record per id under `data.searchData`.
pub fn page(ids: &[u64], total: Option<u64>) -> FetchResponse {
    let records: Vec<Value> = ids
        .iter()
        .map(|id| json!({"companyId": id.to_string()}))
        .collect();
    let body = match total {
        Some(total) => json!({"data": {"searchData": records, "total": total}}),
        None => json!({"data": {"searchData": records}}),
    };
    FetchResponse {
        status: 200,
        headers: Vec::new(),
        body: body.to_string(),
    }
}

pub fn ids(range: std::ops::Range<u64>) -> Vec<u64> {
    range.collect()
}

pub fn timeout() -> Scripted {
    Err(TransportError::new(TransportErrorKind::Timeout, "timed out"))
}

pub fn test_source() -> SourceDefinition {
    parse_source_toml(SOURCE).unwrap()
}

pub fn test_config() -> ControllerConfig {
    ControllerConfig {
        batch_size: 222,
        base_delay: Duration::from_millis(10),
        max_consecutive_errors: 3,
        upsert_concurrency: 4,
        jitter: false,
    }
}
