#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The canonical company record produced by normalization.
//!
//! Every raw vendor record that carries an identifier is mapped into a
//! [`CompanyRecord`]: a flat set of scalar attributes plus the rows it
//! owns in the child tables (financial facts, activities, trading areas
//! and industry mix). Child rows are always keyed by the parent's
//! [`CompanyRecord::company_id`].

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Provenance used when the vendor reports a bare value with no type tag.
pub const UNKNOWN_PROVENANCE: &str = "unknown";

/// Semantic type of a [`FinancialFact`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FactKind {
    /// Total assets minus total liabilities.
    NetAssets,
    /// Profit for the period after tax.
    ProfitAfterTax,
    /// Revenue for the period.
    Turnover,
    /// Turnover attributed across the company's industry mix.
    MultipleIndustryMixTurnover,
}

/// One financial figure reported for a company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialFact {
    pub kind: FactKind,
    /// How the figure was obtained (e.g. `"estimate"` or `"filed"`).
    pub provenance: String,
    pub value: f64,
}

/// A free-text description of what the company does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub description: String,
    pub provenance: String,
}

/// A trading address the company operates from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingArea {
    pub area: String,
    pub address: String,
    pub post_code_short: String,
    pub region_id: String,
    pub region: String,
    pub post_code: String,
    pub district_id: String,
    pub district: String,
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// The weight of one industry classification in the company's activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndustryMix {
    pub sic_code: String,
    pub description: String,
    pub group: String,
    pub weight: f64,
}

/// A company normalized to the canonical schema.
///
/// Scalar fields that the vendor omitted are empty strings (or `None` for
/// the incorporation date). Sub-collections are empty when absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyRecord {
    /// Stable vendor identifier. Never empty.
    pub company_id: String,
    pub name: String,
    pub score: f64,
    pub status: String,
    pub liquidation_status: String,
    pub industry_code: String,
    pub industry_name: String,
    pub address: String,
    pub location: String,
    /// `YYYY-MM-DD` when the vendor sent `DD/MM/YYYY`, otherwise as sent.
    pub incorporated_date: Option<String>,
    pub country: String,
    pub watch_list_titles: String,
    pub financial_facts: Vec<FinancialFact>,
    pub activities: Vec<Activity>,
    pub trading_areas: Vec<TradingArea>,
    pub industry_mix: Vec<IndustryMix>,
}

impl CompanyRecord {
    /// Creates an otherwise empty record with the given identifier.
    #[must_use]
    pub fn new(company_id: impl Into<String>) -> Self {
        Self {
            company_id: company_id.into(),
            ..Self::default()
        }
    }

    /// Total number of child rows owned by this record.
    #[must_use]
    pub fn sub_row_count(&self) -> usize {
        self.financial_facts.len()
            + self.activities.len()
            + self.trading_areas.len()
            + self.industry_mix.len()
    }
}
