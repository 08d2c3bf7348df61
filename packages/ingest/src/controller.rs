//! Drives one work unit page by page until it is done, aborted or
//! interrupted.
//!
//! Each iteration requests `batch_size` records at the unit's cursor,
//! archives the raw response, extracts and normalizes the records, upserts
//! them, advances the cursor by the number of records actually returned
//! and checkpoints. Transport failures back off exponentially without
//! moving the cursor; empty pages before the reported total skip ahead
//! speculatively. Both count toward the unit's consecutive error budget.
//!
//! Shutdown is observed only between batches and during sleeps, so a batch
//! that has started is always upserted and checkpointed before stopping.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use company_etl_company_models::CompanyRecord;
use company_etl_database::sink::CompanySink;
use company_etl_ingest_models::{
    Campaign, PaginationContext, RawBatch, RawPayload, UnitCheckpoint, UnitOutcome, UnitReport,
    UnitStatus, VolumeClass, WorkUnit,
};
use company_etl_scraper::{
    FetchRequest, FetchResponse, Transport, TransportError, TransportErrorKind,
};
use company_etl_source::extract::{describe_shape, extract_records, extract_total};
use company_etl_source::normalize::normalize;
use company_etl_source::progress::ProgressCallback;
use company_etl_source::request::PageRequest;
use company_etl_source::session::absorb_set_cookies;
use company_etl_source::source_def::SourceDefinition;
use futures::{StreamExt as _, stream};
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::IngestError;
use crate::archive::ResponseArchive;
use crate::checkpoint::{CheckpointStore, save_campaign, save_unit};
use crate::config::ControllerConfig;

/// Batches averaged when logging the processing rate.
const RATE_WINDOW: usize = 5;
/// Characters of an unrecognized payload included in the warning.
const PREVIEW_CHARS: usize = 300;

/// Collaborators and options shared by every unit of a campaign.
pub struct PaginationController<'a> {
    pub source: &'a SourceDefinition,
    pub transport: &'a dyn Transport,
    pub sink: &'a dyn CompanySink,
    pub checkpoints: &'a dyn CheckpointStore,
    pub archive: &'a dyn ResponseArchive,
    pub progress: Arc<dyn ProgressCallback>,
    pub config: ControllerConfig,
    pub cancel: CancellationToken,
    /// Token substituted for `{{rest_token}}`.
    pub rest_token: String,
}

/// What one fetch produced.
enum Fetched {
    Page { status: u16, payload: Value },
    Failed(TransportError),
}

impl PaginationController<'_> {
    /// Drives `unit` from its current cursor.
    ///
    /// `campaign` receives the entity total after every batch and is
    /// persisted alongside the unit checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] if a checkpoint cannot be written or the
    /// request template is broken. Transport and data problems never
    /// surface here; they end the unit as [`UnitOutcome::Aborted`].
    #[allow(clippy::too_many_lines)]
    pub async fn drive(
        &self,
        mut unit: WorkUnit,
        mut session: PaginationContext,
        class: VolumeClass,
        campaign: &mut Campaign,
    ) -> Result<UnitReport, IngestError> {
        unit.status = UnitStatus::InProgress;
        unit.consecutive_error_count = 0;

        let mut report = UnitReport::new(&unit);
        let mut rate = RateWindow::default();
        let max_errors = self.config.max_consecutive_errors;

        log::info!(
            "Unit '{}': starting at offset {} ({} processed, total {})",
            unit.key,
            unit.cursor.offset,
            unit.processed_count,
            unit.cursor
                .total_known
                .map_or_else(|| "unknown".to_string(), |t| t.to_string()),
        );

        let outcome = loop {
            if self.cancel.is_cancelled() {
                break UnitOutcome::Interrupted;
            }

            let offset = unit.cursor.offset;
            let page = PageRequest {
                unit_key: &unit.key,
                offset,
                size: self.config.batch_size,
            };
            let request = self
                .source
                .build_request(&page, &mut session, &self.rest_token)?;

            match self.fetch(&request, &mut session).await {
                Fetched::Failed(error) => {
                    report.transport_errors += 1;
                    self.archive(&unit.key, offset, error_payload(&error)).await;

                    unit.consecutive_error_count += 1;
                    if unit.consecutive_error_count >= max_errors {
                        break UnitOutcome::Aborted {
                            reason: format!(
                                "{} consecutive errors, last: {error}",
                                unit.consecutive_error_count
                            ),
                        };
                    }

                    let delay = self.config.backoff_delay(unit.consecutive_error_count);
                    log::warn!(
                        "Unit '{}' offset {offset}: {error} ({}/{max_errors}), retrying in {:.1}s",
                        unit.key,
                        unit.consecutive_error_count,
                        delay.as_secs_f64(),
                    );
                    if !self.pause(delay).await {
                        break UnitOutcome::Interrupted;
                    }
                }
                Fetched::Page { status, payload } => {
                    if let Some(total) = extract_total(&payload, &self.source.response.total_paths)
                    {
                        unit.cursor.total_known = Some(total);
                        report.total_known = Some(total);
                    }

                    let records = extract_records(&payload, &self.source.response.records_paths);
                    if records.is_none() {
                        report.unrecognized_pages += 1;
                        warn_unrecognized(&unit.key, offset, &payload);
                    }
                    self.archive(&unit.key, offset, RawPayload::Response {
                        status,
                        body: payload,
                    })
                    .await;
                    let records = records.unwrap_or_default();

                    if records.is_empty() {
                        if unit.is_exhausted() {
                            break UnitOutcome::Done;
                        }

                        unit.consecutive_error_count += 1;
                        if unit.consecutive_error_count >= max_errors {
                            break UnitOutcome::Aborted {
                                reason: format!(
                                    "{} consecutive empty pages before reported total",
                                    unit.consecutive_error_count
                                ),
                            };
                        }

                        unit.cursor.offset += self.config.batch_size;
                        report.speculative_skips += 1;
                        log::warn!(
                            "Unit '{}': empty page at offset {offset} before total {:?}, skipping to {}",
                            unit.key,
                            unit.cursor.total_known,
                            unit.cursor.offset,
                        );
                        self.checkpoint(&unit, &session).await?;
                    } else {
                        let count = records.len() as u64;
                        unit.consecutive_error_count = 0;

                        let upserted = self.process_records(&unit.key, &records, &mut report).await;
                        unit.processed_count += upserted;
                        unit.cursor.offset += count;

                        self.checkpoint(&unit, &session).await?;
                        campaign.record_entities(upserted);
                        save_campaign(self.checkpoints, campaign).await?;

                        report.batches += 1;
                        report.records_seen += count;
                        report.upserted += upserted;
                        rate.push(count);
                        self.progress.batch_processed(
                            &unit.key,
                            unit.cursor.offset,
                            unit.cursor.total_known,
                        );
                        log_batch(&unit, count, upserted, &rate);

                        if unit.reached_total() {
                            break UnitOutcome::Done;
                        }
                    }

                    if !self.pause(self.config.politeness_delay(class)).await {
                        break UnitOutcome::Interrupted;
                    }
                }
            }
        };

        unit.status = match outcome {
            UnitOutcome::Done => UnitStatus::Completed,
            UnitOutcome::Aborted { .. } => UnitStatus::Pending,
            UnitOutcome::Interrupted => UnitStatus::InProgress,
        };
        self.checkpoint(&unit, &session).await?;

        match &outcome {
            UnitOutcome::Done => log::info!(
                "Unit '{}' done: {} processed of {:?} ({} this run)",
                unit.key,
                unit.processed_count,
                unit.cursor.total_known,
                report.upserted,
            ),
            UnitOutcome::Aborted { reason } => log::error!(
                "Unit '{}' aborted at offset {}: {reason}",
                unit.key,
                unit.cursor.offset,
            ),
            UnitOutcome::Interrupted => log::info!(
                "Unit '{}' interrupted at offset {}",
                unit.key,
                unit.cursor.offset,
            ),
        }

        report.outcome = outcome;
        report.processed_count = unit.processed_count;
        report.total_known = unit.cursor.total_known;
        Ok(report)
    }

    /// Sends `request` and parses the body, capturing cookies on the way.
    async fn fetch(
        &self,
        request: &FetchRequest,
        session: &mut PaginationContext,
    ) -> Fetched {
        let response = match self.transport.fetch(request).await {
            Ok(response) => response,
            Err(error) => return Fetched::Failed(error),
        };

        absorb_set_cookies(session, response.header_values("set-cookie"));

        match parse_response(response) {
            Ok((status, payload)) => Fetched::Page { status, payload },
            Err(error) => Fetched::Failed(error),
        }
    }

    /// Normalizes and upserts one page. Returns the number of entities
    /// stored.
    async fn process_records(&self, key: &str, records: &[Value], report: &mut UnitReport) -> u64 {
        let mut companies: Vec<CompanyRecord> = Vec::with_capacity(records.len());
        for raw in records {
            match normalize(raw, &self.source.fields) {
                Ok(company) => companies.push(company),
                Err(e) => {
                    report.dropped += 1;
                    log::warn!("Unit '{key}': dropping record: {e}");
                }
            }
        }

        let results: Vec<_> = stream::iter(&companies)
            .map(|company| self.sink.apply(company))
            .buffer_unordered(self.config.upsert_concurrency.max(1))
            .collect()
            .await;

        let mut upserted = 0;
        for result in results {
            match result {
                Ok(receipt) => {
                    upserted += 1;
                    if receipt.sub_rows_failed > 0 {
                        log::debug!(
                            "Company '{}': {} sub-row(s) skipped",
                            receipt.company_id,
                            receipt.sub_rows_failed,
                        );
                    }
                }
                Err(e) => {
                    report.failed_upserts += 1;
                    log::warn!("Unit '{key}': {e}");
                }
            }
        }
        upserted
    }

    async fn checkpoint(
        &self,
        unit: &WorkUnit,
        session: &PaginationContext,
    ) -> Result<(), IngestError> {
        save_unit(self.checkpoints, &UnitCheckpoint::capture(unit, session)).await?;
        Ok(())
    }

    async fn archive(&self, unit_key: &str, offset: u64, payload: RawPayload) {
        let batch = RawBatch {
            unit_key: unit_key.to_string(),
            offset,
            captured_at: Utc::now(),
            payload,
        };
        if let Err(e) = self.archive.record(&batch).await {
            log::warn!("Failed to archive batch {unit_key}@{offset}: {e}");
        }
    }

    /// Sleeps for `delay`. Returns `false` if shutdown was requested first.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }
}

fn parse_response(response: FetchResponse) -> Result<(u16, Value), TransportError> {
    if !(200..300).contains(&response.status) {
        return Err(TransportError::http(response.status, response.body));
    }

    serde_json::from_str(&response.body)
        .map(|payload| (response.status, payload))
        .map_err(|e| TransportError {
            kind: TransportErrorKind::InvalidBody,
            message: format!("response is not JSON: {e}"),
            body: Some(response.body.chars().take(PREVIEW_CHARS).collect()),
        })
}

fn error_payload(error: &TransportError) -> RawPayload {
    RawPayload::Error {
        kind: error.kind.to_string(),
        message: error.message.clone(),
        status: match error.kind {
            TransportErrorKind::HttpError(status) => Some(status),
            _ => None,
        },
        body: error.body.clone(),
    }
}

fn warn_unrecognized(key: &str, offset: u64, payload: &Value) {
    let shape = describe_shape(payload);
    let preview: String = payload.to_string().chars().take(PREVIEW_CHARS).collect();
    log::warn!(
        "Unit '{key}' offset {offset}: unrecognized response shape (keys {:?}, arrays {:?}, error {:?}): {preview}",
        shape.top_level_keys,
        shape
            .arrays
            .iter()
            .map(|(path, len, _)| format!("{path}[{len}]"))
            .collect::<Vec<_>>(),
        shape.error_message,
    );
}

fn log_batch(unit: &WorkUnit, count: u64, upserted: u64, rate: &RateWindow) {
    let per_minute = rate.per_minute();
    let eta = unit
        .cursor
        .total_known
        .zip(per_minute)
        .filter(|(_, rate)| *rate > 0.0)
        .map(|(total, rate)| {
            #[allow(clippy::cast_precision_loss)]
            let remaining = total.saturating_sub(unit.cursor.offset) as f64;
            format!(", ETA {:.1} min", remaining / rate)
        })
        .unwrap_or_default();

    log::info!(
        "Unit '{}': {count} records at offset {} ({upserted} upserted, {} processed of {:?}){}{eta}",
        unit.key,
        unit.cursor.offset - count,
        unit.processed_count,
        unit.cursor.total_known,
        per_minute.map_or_else(String::new, |r| format!(", {r:.0} records/min")),
    );
}

/// Record counts of the last few batches with their completion times.
#[derive(Default)]
struct RateWindow {
    samples: VecDeque<(Instant, u64)>,
}

impl RateWindow {
    fn push(&mut self, count: u64) {
        self.samples.push_back((Instant::now(), count));
        while self.samples.len() > RATE_WINDOW + 1 {
            self.samples.pop_front();
        }
    }

    /// Records per minute across the window, once two batches exist.
    fn per_minute(&self) -> Option<f64> {
        let (first, _) = self.samples.front()?;
        let (last, _) = self.samples.back()?;
        let elapsed = last.duration_since(*first).as_secs_f64();
        if self.samples.len() < 2 || elapsed <= 0.0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let records = self.samples.iter().skip(1).map(|(_, n)| n).sum::<u64>() as f64;
        Some(records / elapsed * 60.0)
    }
}

#[cfg(test)]
mod tests {
    use company_etl_source::progress::null_progress;
    use serde_json::json;

    use super::*;
    use crate::archive::NullArchive;
    use crate::checkpoint::{MemoryCheckpointStore, load_unit};
    use crate::testing::{
        RecordingSink, Scripted, ScriptedTransport, ids, page, test_config, test_source, timeout,
    };

    struct Harness {
        source: SourceDefinition,
        transport: ScriptedTransport,
        sink: RecordingSink,
        store: MemoryCheckpointStore,
    }

    impl Harness {
        fn new(responses: Vec<Scripted>) -> Self {
            Self {
                source: test_source(),
                transport: ScriptedTransport::new(responses),
                sink: RecordingSink::default(),
                store: MemoryCheckpointStore::new(),
            }
        }

        fn controller(&self) -> PaginationController<'_> {
            PaginationController {
                source: &self.source,
                transport: &self.transport,
                sink: &self.sink,
                checkpoints: &self.store,
                archive: &NullArchive,
                progress: null_progress(),
                config: test_config(),
                cancel: CancellationToken::new(),
                rest_token: String::new(),
            }
        }

        async fn drive(&self, unit: WorkUnit) -> UnitReport {
            let mut campaign = Campaign::default();
            self.controller()
                .drive(unit, PaginationContext::default(), VolumeClass::Low, &mut campaign)
                .await
                .unwrap()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn advances_by_records_returned_not_page_size() {
        let harness = Harness::new(vec![
            Ok(page(&ids(0..222), Some(272))),
            Ok(page(&ids(222..272), Some(272))),
        ]);

        let report = harness.drive(WorkUnit::new("a")).await;

        assert_eq!(report.outcome, UnitOutcome::Done);
        assert_eq!(harness.transport.offsets(), vec![0, 222]);
        assert_eq!(report.processed_count, 272);
        assert_eq!(harness.sink.stored().len(), 272);

        let (unit, _) = load_unit(&harness.store, "a").await.unwrap().unwrap().into_parts();
        assert_eq!(unit.cursor.offset, 272);
        assert_eq!(unit.status, UnitStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn short_page_moves_cursor_by_its_length() {
        let harness = Harness::new(vec![
            Ok(page(&ids(0..50), Some(1000))),
            Ok(page(&[], Some(1000))),
            Ok(page(&[], Some(1000))),
            Ok(page(&[], Some(1000))),
        ]);

        let report = harness.drive(WorkUnit::new("a")).await;

        assert_eq!(harness.transport.offsets()[..2], [0, 50]);
        assert!(matches!(report.outcome, UnitOutcome::Aborted { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_page_after_total_is_end_of_data() {
        let harness = Harness::new(vec![Ok(page(&[], Some(100)))]);
        let mut unit = WorkUnit::new("a");
        unit.cursor.offset = 100;
        unit.cursor.total_known = Some(100);
        unit.processed_count = 100;

        let report = harness.drive(unit).await;

        assert_eq!(report.outcome, UnitOutcome::Done);
        assert_eq!(report.speculative_skips, 0);
        assert_eq!(harness.transport.offsets(), vec![100]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_page_with_unknown_total_is_end_of_data() {
        let harness = Harness::new(vec![Ok(page(&[], None))]);

        let report = harness.drive(WorkUnit::new("z")).await;

        assert_eq!(report.outcome, UnitOutcome::Done);
        assert_eq!(harness.transport.offsets(), vec![0]);
        assert_eq!(report.processed_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_error_streak() {
        let harness = Harness::new(vec![
            timeout(),
            timeout(),
            Ok(page(&ids(0..10), Some(20))),
            timeout(),
            timeout(),
            Ok(page(&ids(10..20), Some(20))),
        ]);

        let report = harness.drive(WorkUnit::new("a")).await;

        assert_eq!(report.outcome, UnitOutcome::Done);
        assert_eq!(report.transport_errors, 4);
        assert_eq!(harness.transport.offsets(), vec![0, 0, 0, 10, 10, 10]);

        let (unit, _) = load_unit(&harness.store, "a").await.unwrap().unwrap().into_parts();
        assert_eq!(unit.consecutive_error_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn aborts_exactly_at_error_budget() {
        let harness = Harness::new(vec![timeout(), timeout(), timeout(), Ok(page(&[1], None))]);

        let report = harness.drive(WorkUnit::new("a")).await;

        assert!(matches!(report.outcome, UnitOutcome::Aborted { .. }));
        assert_eq!(harness.transport.offsets().len(), 3);

        let (unit, _) = load_unit(&harness.store, "a").await.unwrap().unwrap().into_parts();
        assert_ne!(unit.status, UnitStatus::Completed);
        assert_eq!(unit.cursor.offset, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn non_json_and_http_errors_back_off() {
        let harness = Harness::new(vec![
            Ok(FetchResponse {
                status: 200,
                headers: Vec::new(),
                body: "<html>captcha</html>".to_string(),
            }),
            Ok(FetchResponse {
                status: 503,
                headers: Vec::new(),
                body: "unavailable".to_string(),
            }),
            Ok(page(&ids(0..5), Some(5))),
        ]);

        let report = harness.drive(WorkUnit::new("a")).await;

        assert_eq!(report.outcome, UnitOutcome::Done);
        assert_eq!(report.transport_errors, 2);
        assert_eq!(harness.transport.offsets(), vec![0, 0, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn resumes_from_checkpoint_without_reupserting() {
        let harness = Harness::new(vec![
            Ok(page(&ids(600..822), Some(1000))),
            Ok(page(&ids(822..1000), Some(1000))),
        ]);
        let mut unit = WorkUnit::new("a");
        unit.cursor.offset = 600;
        unit.cursor.total_known = Some(1000);
        unit.processed_count = 600;
        unit.consecutive_error_count = 2;

        let report = harness.drive(unit).await;

        assert_eq!(report.outcome, UnitOutcome::Done);
        assert_eq!(harness.transport.offsets(), vec![600, 822]);
        assert_eq!(report.upserted, 400);
        assert_eq!(report.processed_count, 1000);
        assert!(!harness.sink.stored().contains(&"599".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn drops_records_without_identifier() {
        let body = json!({"data": {"searchData": [
            {"companyId": "1"},
            {"companyName": "NO ID LTD"},
            {"companyId": "3"}
        ], "total": 3}});
        let harness = Harness::new(vec![Ok(FetchResponse {
            status: 200,
            headers: Vec::new(),
            body: body.to_string(),
        })]);

        let report = harness.drive(WorkUnit::new("a")).await;

        // The cursor passed the reported total, so the unit is exhausted.
        assert_eq!(report.dropped, 1);
        assert_eq!(report.upserted, 2);
        assert_eq!(report.outcome, UnitOutcome::Done);
        assert_eq!(harness.transport.offsets(), vec![0, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_upserts_are_not_counted_as_processed() {
        let mut harness = Harness::new(vec![Ok(page(&ids(0..4), Some(4)))]);
        harness.sink.failing.insert("2".to_string());

        let report = harness.drive(WorkUnit::new("a")).await;

        assert_eq!(report.failed_upserts, 1);
        assert_eq!(report.upserted, 3);
        assert_eq!(report.processed_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn unrecognized_shape_counts_as_empty_page() {
        let harness = Harness::new(vec![
            Ok(page(&ids(0..10), Some(100))),
            Ok(FetchResponse {
                status: 200,
                headers: Vec::new(),
                body: json!({"status": "blocked"}).to_string(),
            }),
            Ok(page(&ids(232..242), Some(100))),
        ]);

        let report = harness.drive(WorkUnit::new("a")).await;

        assert_eq!(report.unrecognized_pages, 1);
        assert_eq!(report.speculative_skips, 1);
        assert_eq!(harness.transport.offsets()[..3], [0, 10, 232]);
    }

    #[tokio::test(start_paused = true)]
    async fn captures_cookies_into_the_checkpoint() {
        let mut response = page(&ids(0..3), Some(3));
        response
            .headers
            .push(("Set-Cookie".to_string(), "AWSALB=xyz; Path=/".to_string()));
        let harness = Harness::new(vec![Ok(response)]);

        harness.drive(WorkUnit::new("a")).await;

        let (_, session) = load_unit(&harness.store, "a").await.unwrap().unwrap().into_parts();
        assert_eq!(session.cookies.get("AWSALB").map(String::as_str), Some("xyz"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_controller_fetches_nothing() {
        let harness = Harness::new(vec![Ok(page(&ids(0..10), Some(10)))]);
        let controller = harness.controller();
        controller.cancel.cancel();

        let mut campaign = Campaign::default();
        let report = controller
            .drive(
                WorkUnit::new("a"),
                PaginationContext::default(),
                VolumeClass::Low,
                &mut campaign,
            )
            .await
            .unwrap();

        assert_eq!(report.outcome, UnitOutcome::Interrupted);
        assert!(harness.transport.offsets().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_fetch_finishes_the_batch_then_stops() {
        let cancel = CancellationToken::new();
        let mut harness = Harness::new(Vec::new());
        harness.transport = ScriptedTransport::new(vec![
            Ok(page(&ids(0..10), Some(1000))),
            Ok(page(&ids(10..20), Some(1000))),
        ])
        .cancelling(cancel.clone());
        let mut controller = harness.controller();
        controller.cancel = cancel;

        let mut campaign = Campaign::default();
        let report = controller
            .drive(
                WorkUnit::new("a"),
                PaginationContext::default(),
                VolumeClass::Low,
                &mut campaign,
            )
            .await
            .unwrap();

        assert_eq!(report.outcome, UnitOutcome::Interrupted);
        assert_eq!(harness.transport.offsets(), vec![0]);
        assert_eq!(harness.sink.stored().len(), 10);
        assert_eq!(campaign.total_entities_processed, 10);

        let checkpoint = load_unit(&harness.store, "a").await.unwrap().unwrap();
        assert_eq!(checkpoint.cursor_offset, 10);
        assert_eq!(checkpoint.processed_count, 10);
        assert_eq!(checkpoint.status, UnitStatus::InProgress);
    }

    #[tokio::test(start_paused = true)]
    async fn adds_upserts_to_campaign_total() {
        let harness = Harness::new(vec![Ok(page(&ids(0..7), Some(7)))]);
        let mut campaign = Campaign::default();
        campaign.total_entities_processed = 100;

        harness
            .controller()
            .drive(
                WorkUnit::new("a"),
                PaginationContext::default(),
                VolumeClass::High,
                &mut campaign,
            )
            .await
            .unwrap();

        assert_eq!(campaign.total_entities_processed, 107);
    }
}
