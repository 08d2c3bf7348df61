#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared CLI utilities for the company ETL toolchain.
//!
//! Provides `indicatif`-backed progress bars behind the [`ProgressCallback`]
//! trait, plus [`init_logger`] which sets up `indicatif-log-bridge` so that
//! `log::info!` and friends are suspended while progress bars redraw.

use std::sync::Arc;
use std::time::Duration;

use company_etl_source::progress::ProgressCallback;
use indicatif::{ProgressBar, ProgressStyle};

pub use indicatif::MultiProgress;

/// Two `indicatif` bars implementing [`ProgressCallback`]: one counting
/// campaign units, one following records within the current unit.
pub struct IndicatifProgress {
    units: ProgressBar,
    records: ProgressBar,
    /// Style to switch to once a unit reports its total.
    records_style: ProgressStyle,
    spinner_style: ProgressStyle,
}

impl IndicatifProgress {
    /// Adds the unit and record bars to `multi`.
    #[must_use]
    pub fn campaign_bars(multi: &MultiProgress) -> Arc<dyn ProgressCallback> {
        Arc::new(Self::new(multi))
    }

    fn new(multi: &MultiProgress) -> Self {
        let units = multi.add(ProgressBar::new(0));
        units.set_style(
            ProgressStyle::with_template(
                "{msg} {wide_bar:.green/dim} {pos}/{len} units [{elapsed_precise}]",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
        );
        units.set_message("Campaign");

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let records = multi.add(ProgressBar::new_spinner());
        records.enable_steady_tick(Duration::from_millis(100));
        records.set_style(spinner_style.clone());

        let records_style = ProgressStyle::with_template(
            "  {msg} {wide_bar:.cyan/dim} {pos}/{len} {percent}% [{eta}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

        Self {
            units,
            records,
            records_style,
            spinner_style,
        }
    }
}

impl ProgressCallback for IndicatifProgress {
    fn campaign_started(&self, total_units: u64, completed_units: u64) {
        self.units.set_length(total_units);
        self.units.set_position(completed_units);
    }

    fn unit_started(&self, key: &str) {
        self.records.set_style(self.spinner_style.clone());
        self.records.unset_length();
        self.records.set_position(0);
        self.records.set_message(format!("Unit '{key}'"));
    }

    fn batch_processed(&self, key: &str, offset: u64, total_known: Option<u64>) {
        if let Some(total) = total_known
            && self.records.length() != Some(total)
        {
            // Switch from spinner to bar style now that the total is known.
            self.records.set_length(total);
            self.records.set_style(self.records_style.clone());
            self.records.set_message(format!("Unit '{key}'"));
        }
        self.records.set_position(offset);
    }

    fn unit_finished(&self, key: &str, completed: bool) {
        if completed {
            self.units.inc(1);
        } else {
            self.records.set_message(format!("Unit '{key}' stopped"));
        }
    }

    fn campaign_finished(&self, message: String) {
        self.records.finish_and_clear();
        self.units.finish_with_message(message);
    }
}

/// Initializes the global logger wrapped in `indicatif-log-bridge` so that
/// `log::info!` and friends are suspended while progress bars redraw.
///
/// Returns the [`MultiProgress`] that all progress bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok(); // Already set in tests

    log::set_max_level(level);

    multi
}
