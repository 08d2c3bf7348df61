#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Resumable campaign runner for the company search API.
//!
//! A campaign is planned by the [`partition::Partitioner`], driven unit by
//! unit by the [`orchestrator::CampaignOrchestrator`], and each unit is
//! paged through by the [`controller::PaginationController`]. Progress is
//! checkpointed after every batch so an interrupted or crashed run picks
//! up where it stopped.

pub mod archive;
pub mod checkpoint;
pub mod config;
pub mod controller;
pub mod orchestrator;
pub mod partition;

#[cfg(test)]
mod testing;

use company_etl_database::DbError;
use company_etl_source::SourceError;

use crate::checkpoint::CheckpointError;

/// Failures that stop a campaign run.
///
/// Everything else (transport errors, dropped records, failed upserts) is
/// contained within a unit and reported through its
/// [`company_etl_ingest_models::UnitReport`].
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Database(#[from] DbError),
}
