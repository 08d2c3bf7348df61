//! Work unit planning.
//!
//! The API stops returning results past a fixed depth, so a single query
//! cannot enumerate everything. In [`PartitionMode::Alphabet`] the name
//! space is split by prefix: one key per alphabet letter, except letters
//! classified high-volume, which expand into one two-letter key per
//! alphabet symbol. The decision comes from the source's static
//! [`VolumeClassification`] and is persisted for later inspection.

use std::collections::BTreeMap;

use company_etl_ingest_models::{VolumeClass, WHOLE_RANGE_KEY};
use company_etl_source::source_def::VolumeClassification;
use serde::{Deserialize, Serialize};

use crate::checkpoint::{CheckpointError, CheckpointStore, SUBDIVISION_KEY};

/// How the search space is divided into work units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum PartitionMode {
    /// One unit covering the whole range.
    WholeRange,
    /// One unit per letter prefix, subdividing high-volume letters.
    #[default]
    Alphabet,
}

/// Planning decision for one alphabet letter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubdivisionDecision {
    pub class: VolumeClass,
    pub subdivided: bool,
    pub keys: Vec<String>,
}

/// Plans the ordered work units of a campaign.
#[derive(Debug, Clone, Copy)]
pub struct Partitioner<'a> {
    mode: PartitionMode,
    classification: &'a VolumeClassification,
}

impl<'a> Partitioner<'a> {
    #[must_use]
    pub const fn new(mode: PartitionMode, classification: &'a VolumeClassification) -> Self {
        Self {
            mode,
            classification,
        }
    }

    /// Per-letter planning decisions, keyed by letter. Empty in
    /// [`PartitionMode::WholeRange`].
    #[must_use]
    pub fn subdivision(&self) -> BTreeMap<String, SubdivisionDecision> {
        if self.mode == PartitionMode::WholeRange {
            return BTreeMap::new();
        }

        let symbols = self.classification.symbols();
        symbols
            .iter()
            .map(|letter| {
                let key = letter.to_string();
                let class = self.classification.classify(&key);
                let subdivided = class == VolumeClass::High;
                let keys = if subdivided {
                    symbols.iter().map(|next| format!("{letter}{next}")).collect()
                } else {
                    vec![key.clone()]
                };
                (
                    key,
                    SubdivisionDecision {
                        class,
                        subdivided,
                        keys,
                    },
                )
            })
            .collect()
    }

    /// The ordered work unit keys.
    #[must_use]
    pub fn plan(&self) -> Vec<String> {
        match self.mode {
            PartitionMode::WholeRange => vec![WHOLE_RANGE_KEY.to_string()],
            PartitionMode::Alphabet => {
                let decisions = self.subdivision();
                self.classification
                    .symbols()
                    .iter()
                    .filter_map(|letter| decisions.get(&letter.to_string()))
                    .flat_map(|decision| decision.keys.iter().cloned())
                    .collect()
            }
        }
    }

    /// Plans the campaign and persists the subdivision analysis.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if the analysis could not be persisted.
    pub async fn plan_and_record(
        &self,
        store: &dyn CheckpointStore,
    ) -> Result<Vec<String>, CheckpointError> {
        let analysis = serde_json::to_value(self.subdivision())?;
        store.write(SUBDIVISION_KEY, &analysis).await?;

        let keys = self.plan();
        log::info!("Planned {} work unit(s) ({:?} mode)", keys.len(), self.mode);
        Ok(keys)
    }

    /// Volume class governing the politeness delay of unit `key`.
    #[must_use]
    pub fn volume_class(&self, key: &str) -> VolumeClass {
        if key == WHOLE_RANGE_KEY {
            VolumeClass::Low
        } else {
            self.classification.classify(key)
        }
    }
}
