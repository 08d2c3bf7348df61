//! Runs every work unit of a campaign, one at a time, in plan order.
//!
//! The [`Campaign`] is loaded from the checkpoint store, or planned fresh
//! when none exists, and persisted after every state change. A unit left
//! `in_progress` by a crash is resumed before anything else in `pending`.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::Utc;
use company_etl_ingest_models::{
    Campaign, CampaignSummary, PaginationContext, UnitOutcome, UnitStatus, WorkUnit,
};
use tokio::time::Instant;

use crate::IngestError;
use crate::checkpoint::{load_campaign, load_unit, save_campaign};
use crate::controller::PaginationController;
use crate::partition::Partitioner;

/// Drives a campaign to completion (or until interrupted).
pub struct CampaignOrchestrator<'a> {
    pub controller: PaginationController<'a>,
    pub partitioner: Partitioner<'a>,
}

impl CampaignOrchestrator<'_> {
    /// Loads the persisted campaign, planning a new one if none exists.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] if the checkpoint store cannot be read or
    /// written.
    pub async fn load_or_plan(&self) -> Result<Campaign, IngestError> {
        let store = self.controller.checkpoints;

        if let Some(campaign) = load_campaign(store).await? {
            log::info!(
                "Resuming campaign: {} completed, {} pending, in progress: {}",
                campaign.completed.len(),
                campaign.pending.len(),
                campaign.in_progress.as_deref().unwrap_or("none"),
            );
            return Ok(campaign);
        }

        let keys = self.partitioner.plan_and_record(store).await?;
        let campaign = Campaign::new(keys, Utc::now());
        save_campaign(store, &campaign).await?;
        Ok(campaign)
    }

    /// Runs units until `pending` is empty, shutdown is requested, or the
    /// only units left already aborted during this run.
    ///
    /// Aborted units go to the back of `pending` and are retried by the
    /// next run, never by this one.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] on checkpoint store or source configuration
    /// failures. Unit-level failures are reported in the summary instead.
    pub async fn run(&self) -> Result<CampaignSummary, IngestError> {
        let store = self.controller.checkpoints;
        let progress = &self.controller.progress;
        let started = Instant::now();

        let mut campaign = self.load_or_plan().await?;
        let entities_before = campaign.total_entities_processed;
        progress.campaign_started(
            campaign.unit_count() as u64,
            campaign.completed.len() as u64,
        );

        let mut aborted: BTreeSet<String> = BTreeSet::new();
        let mut aborted_order: Vec<String> = Vec::new();
        let mut units_completed = 0u64;
        let mut interrupted = false;

        loop {
            if self.controller.cancel.is_cancelled() {
                interrupted = true;
                break;
            }
            if campaign.in_progress.is_none()
                && campaign.pending.front().is_some_and(|key| aborted.contains(key))
            {
                log::info!("Only units that aborted this run remain; stopping");
                break;
            }
            let Some(key) = campaign.start_next() else {
                break;
            };
            save_campaign(store, &campaign).await?;

            let (unit, session) = match load_unit(store, &key).await? {
                Some(checkpoint) => checkpoint.into_parts(),
                None => (WorkUnit::new(key.clone()), PaginationContext::default()),
            };

            if unit.status == UnitStatus::Completed {
                log::info!("Unit '{key}' already completed, skipping");
                campaign.complete_current();
                save_campaign(store, &campaign).await?;
                units_completed += 1;
                continue;
            }

            progress.unit_started(&key);
            let class = self.partitioner.volume_class(&key);
            let report = self
                .controller
                .drive(unit, session, class, &mut campaign)
                .await?;

            let completed = match report.outcome {
                UnitOutcome::Done => {
                    campaign.complete_current();
                    units_completed += 1;
                    true
                }
                UnitOutcome::Aborted { .. } => {
                    campaign.defer_current();
                    aborted.insert(key.clone());
                    aborted_order.push(key.clone());
                    false
                }
                UnitOutcome::Interrupted => {
                    interrupted = true;
                    false
                }
            };
            save_campaign(store, &campaign).await?;
            progress.unit_finished(&key, completed);

            if interrupted {
                break;
            }
            log_campaign_progress(&campaign, units_completed, started.elapsed());
        }

        let summary = CampaignSummary {
            units_completed,
            units_aborted: aborted_order,
            units_remaining: (campaign.pending.len()
                + usize::from(campaign.in_progress.is_some())) as u64,
            interrupted,
            entities_this_run: campaign
                .total_entities_processed
                .saturating_sub(entities_before),
            total_entities_processed: campaign.total_entities_processed,
            duration: started.elapsed(),
        };

        let message = if summary.interrupted {
            format!(
                "Interrupted: {} unit(s) done this run, {} remaining",
                summary.units_completed, summary.units_remaining
            )
        } else if campaign.is_finished() {
            format!(
                "Campaign complete: {} entities in total",
                summary.total_entities_processed
            )
        } else {
            format!(
                "Stopped with {} unit(s) remaining ({} aborted)",
                summary.units_remaining,
                summary.units_aborted.len()
            )
        };
        log::info!(
            "{message}; {} entities this run in {:.1}s",
            summary.entities_this_run,
            summary.duration.as_secs_f64()
        );
        progress.campaign_finished(message);

        Ok(summary)
    }
}

fn log_campaign_progress(campaign: &Campaign, units_this_run: u64, elapsed: Duration) {
    let minutes = elapsed.as_secs_f64() / 60.0;
    let remaining = campaign.pending.len();

    #[allow(clippy::cast_precision_loss)]
    let rate = if minutes > 0.0 {
        Some(units_this_run as f64 / minutes)
    } else {
        None
    };
    #[allow(clippy::cast_precision_loss)]
    let eta = rate
        .filter(|r| *r > 0.0)
        .map(|r| format!(", ETA {:.0} min", remaining as f64 / r))
        .unwrap_or_default();

    log::info!(
        "Campaign: {}/{} units completed, {remaining} pending, {} entities{}{eta}",
        campaign.completed.len(),
        campaign.unit_count(),
        campaign.total_entities_processed,
        rate.map_or_else(String::new, |r| format!(", {r:.1} units/min")),
    );
}

#[cfg(test)]
mod tests {
    use company_etl_ingest_models::{UnitCheckpoint, WHOLE_RANGE_KEY};
    use company_etl_source::progress::null_progress;
    use company_etl_source::source_def::VolumeClassification;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::archive::NullArchive;
    use crate::checkpoint::{CheckpointStore, MemoryCheckpointStore, SUBDIVISION_KEY, save_unit};
    use crate::partition::PartitionMode;
    use crate::testing::{
        RecordingSink, Scripted, ScriptedTransport, ids, page, test_config, test_source, timeout,
    };

    fn classification() -> VolumeClassification {
        VolumeClassification {
            alphabet: "abc".to_string(),
            high: String::new(),
            medium: String::new(),
            low: "abc".to_string(),
        }
    }

    struct Fixture {
        source: company_etl_source::source_def::SourceDefinition,
        classification: VolumeClassification,
        transport: ScriptedTransport,
        sink: RecordingSink,
        store: MemoryCheckpointStore,
        cancel: CancellationToken,
    }

    impl Fixture {
        fn new(responses: Vec<Scripted>) -> Self {
            Self {
                source: test_source(),
                classification: classification(),
                transport: ScriptedTransport::new(responses),
                sink: RecordingSink::default(),
                store: MemoryCheckpointStore::new(),
                cancel: CancellationToken::new(),
            }
        }

        fn orchestrator(&self, mode: PartitionMode) -> CampaignOrchestrator<'_> {
            CampaignOrchestrator {
                controller: PaginationController {
                    source: &self.source,
                    transport: &self.transport,
                    sink: &self.sink,
                    checkpoints: &self.store,
                    archive: &NullArchive,
                    progress: null_progress(),
                    config: test_config(),
                    cancel: self.cancel.clone(),
                    rest_token: String::new(),
                },
                partitioner: Partitioner::new(mode, &self.classification),
            }
        }

        async fn campaign(&self) -> Campaign {
            load_campaign(&self.store).await.unwrap().unwrap()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn whole_range_campaign_runs_a_single_unit() {
        let fixture = Fixture::new(vec![Ok(page(&ids(0..5), Some(5)))]);

        let summary = fixture
            .orchestrator(PartitionMode::WholeRange)
            .run()
            .await
            .unwrap();

        assert_eq!(summary.units_completed, 1);
        assert_eq!(summary.units_remaining, 0);
        assert_eq!(summary.entities_this_run, 5);
        assert!(!summary.interrupted);

        let campaign = fixture.campaign().await;
        assert!(campaign.is_finished());
        assert!(campaign.completed.contains(WHOLE_RANGE_KEY));
        assert_eq!(campaign.total_entities_processed, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn alphabet_campaign_walks_units_in_order() {
        let fixture = Fixture::new(vec![
            Ok(page(&ids(0..2), Some(2))),
            Ok(page(&ids(2..5), Some(3))),
            Ok(page(&ids(5..6), Some(1))),
        ]);

        let summary = fixture
            .orchestrator(PartitionMode::Alphabet)
            .run()
            .await
            .unwrap();

        assert_eq!(summary.units_completed, 3);
        assert_eq!(summary.total_entities_processed, 6);

        let prefixes: Vec<String> = fixture
            .transport
            .requests()
            .into_iter()
            .map(|(prefix, _)| prefix)
            .collect();
        assert_eq!(prefixes, ["a", "b", "c"]);

        let campaign = fixture.campaign().await;
        assert_eq!(
            campaign.completed,
            BTreeSet::from(["a", "b", "c"].map(String::from))
        );
        assert!(fixture.store.read(SUBDIVISION_KEY).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn resumes_the_in_progress_unit_first() {
        let fixture = Fixture::new(vec![
            Ok(page(&ids(600..1000), Some(1000))),
            Ok(page(&ids(0..3), Some(3))),
            Ok(page(&ids(3..4), Some(1))),
        ]);

        let mut campaign = Campaign::new(["a", "b", "c"].map(String::from), Utc::now());
        campaign.pending.retain(|key| key != "b");
        campaign.in_progress = Some("b".to_string());
        campaign.total_entities_processed = 600;
        save_campaign(&fixture.store, &campaign).await.unwrap();

        let mut unit = WorkUnit::new("b");
        unit.cursor.offset = 600;
        unit.cursor.total_known = Some(1000);
        unit.processed_count = 600;
        unit.status = UnitStatus::InProgress;
        save_unit(
            &fixture.store,
            &UnitCheckpoint::capture(&unit, &PaginationContext::default()),
        )
        .await
        .unwrap();

        let summary = fixture
            .orchestrator(PartitionMode::Alphabet)
            .run()
            .await
            .unwrap();

        assert_eq!(
            fixture.transport.requests(),
            [
                ("b".to_string(), 600),
                ("a".to_string(), 0),
                ("c".to_string(), 0),
            ]
        );
        assert_eq!(summary.units_completed, 3);
        assert_eq!(summary.entities_this_run, 404);
        assert_eq!(summary.total_entities_processed, 1004);
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_unit_is_deferred_not_completed() {
        // Unit "a" exhausts its three-error budget; "b" and "c" succeed.
        let fixture = Fixture::new(vec![
            timeout(),
            timeout(),
            timeout(),
            Ok(page(&ids(0..2), Some(2))),
            Ok(page(&ids(2..3), Some(1))),
        ]);

        let summary = fixture
            .orchestrator(PartitionMode::Alphabet)
            .run()
            .await
            .unwrap();

        assert_eq!(summary.units_aborted, ["a"]);
        assert_eq!(summary.units_completed, 2);
        assert_eq!(summary.units_remaining, 1);
        assert!(!summary.interrupted);

        let campaign = fixture.campaign().await;
        assert!(!campaign.completed.contains("a"));
        assert_eq!(campaign.pending, ["a".to_string()]);
        assert_eq!(campaign.in_progress, None);

        let checkpoint = load_unit(&fixture.store, "a").await.unwrap().unwrap();
        assert_eq!(checkpoint.status, UnitStatus::Pending);
        assert_eq!(checkpoint.cursor_offset, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn next_run_retries_an_aborted_unit() {
        let fixture = Fixture::new(vec![
            timeout(),
            timeout(),
            timeout(),
            Ok(page(&ids(0..1), Some(1))),
            Ok(page(&ids(1..2), Some(1))),
        ]);
        fixture
            .orchestrator(PartitionMode::Alphabet)
            .run()
            .await
            .unwrap();

        let retry = ScriptedTransport::new(vec![Ok(page(&ids(5..7), Some(2)))]);
        let mut orchestrator = fixture.orchestrator(PartitionMode::Alphabet);
        orchestrator.controller.transport = &retry;
        let summary = orchestrator.run().await.unwrap();

        assert_eq!(retry.requests(), [("a".to_string(), 0)]);
        assert_eq!(summary.units_completed, 1);
        assert!(fixture.campaign().await.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn skips_a_unit_whose_checkpoint_is_completed() {
        let fixture = Fixture::new(vec![
            Ok(page(&ids(0..1), Some(1))),
            Ok(page(&ids(1..2), Some(1))),
        ]);

        let mut unit = WorkUnit::new("a");
        unit.cursor.offset = 4;
        unit.cursor.total_known = Some(4);
        unit.processed_count = 4;
        unit.status = UnitStatus::Completed;
        save_unit(
            &fixture.store,
            &UnitCheckpoint::capture(&unit, &PaginationContext::default()),
        )
        .await
        .unwrap();

        fixture
            .orchestrator(PartitionMode::Alphabet)
            .run()
            .await
            .unwrap();

        let prefixes: Vec<String> = fixture
            .transport
            .requests()
            .into_iter()
            .map(|(prefix, _)| prefix)
            .collect();
        assert_eq!(prefixes, ["b", "c"]);
        assert!(fixture.campaign().await.completed.contains("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_leaves_campaign_resumable() {
        let fixture = Fixture::new(vec![Ok(page(&ids(0..1), Some(1)))]);
        fixture.cancel.cancel();

        let summary = fixture
            .orchestrator(PartitionMode::Alphabet)
            .run()
            .await
            .unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.units_completed, 0);
        assert!(fixture.transport.requests().is_empty());

        let campaign = fixture.campaign().await;
        assert_eq!(campaign.pending.len(), 3);
        assert!(campaign.completed.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_mid_unit_keeps_it_in_progress() {
        let mut fixture = Fixture::new(Vec::new());
        fixture.transport = ScriptedTransport::new(vec![
            Ok(page(&ids(0..10), Some(50))),
            Ok(page(&ids(10..50), Some(50))),
        ])
        .cancelling(fixture.cancel.clone());

        let summary = fixture
            .orchestrator(PartitionMode::Alphabet)
            .run()
            .await
            .unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.units_completed, 0);
        assert_eq!(summary.units_remaining, 3);
        assert_eq!(summary.entities_this_run, 10);
        assert_eq!(fixture.transport.requests(), [("a".to_string(), 0)]);
        assert_eq!(fixture.sink.stored().len(), 10);

        let campaign = fixture.campaign().await;
        assert_eq!(campaign.in_progress.as_deref(), Some("a"));
        assert!(campaign.completed.is_empty());
        assert_eq!(campaign.total_entities_processed, 10);

        let checkpoint = load_unit(&fixture.store, "a").await.unwrap().unwrap();
        assert_eq!(checkpoint.cursor_offset, 10);
        assert_eq!(checkpoint.status, UnitStatus::InProgress);
    }
}
