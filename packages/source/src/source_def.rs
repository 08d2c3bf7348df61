//! Config-driven search API source definition.
//!
//! [`SourceDefinition`] captures everything vendor-specific about the
//! search API in one serializable struct: how to build a page request,
//! which credentials to rotate, where records and totals live in the
//! response, how raw fields map onto the canonical company record, and
//! how the name space is classified by volume for partitioning.

use std::collections::BTreeMap;
use std::time::Duration;

use company_etl_company_models::FactKind;
use company_etl_ingest_models::VolumeClass;
use company_etl_scraper::Method;
use serde::Deserialize;

use crate::SourceError;

// ── Top-level source definition ──────────────────────────────────────────

/// A complete, config-driven search API definition.
///
/// Loaded from TOML files embedded at compile time.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceDefinition {
    /// Unique identifier (e.g., `"pomanda"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// How to build a page request.
    pub request: RequestTemplate,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub response: ResponseShape,
    /// Field name mappings for normalization.
    #[serde(default)]
    pub fields: FieldMapping,
    #[serde(default)]
    pub partition: VolumeClassification,
}

// ── Request template ─────────────────────────────────────────────────────

/// Static parts of a page request.
///
/// Header values may reference `{{rest_token}}`, `{{session_id}}`,
/// `{{tracker_id}}` and `{{cookie}}`. The body is a JSON document whose
/// string leaves equal to `{{offset}}`, `{{size}}`, `{{prefix}}` or
/// `{{tracker_id}}` are replaced with typed values per request.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestTemplate {
    #[serde(default)]
    pub method: Method,
    pub url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Skip TLS certificate verification.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// JSON body template, as text.
    #[serde(default)]
    pub body: Option<String>,
}

const fn default_timeout_ms() -> u64 {
    30_000
}

impl RequestTemplate {
    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ── Credentials ──────────────────────────────────────────────────────────

/// Static credentials supplied by configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialsConfig {
    /// Token sent on every request.
    #[serde(default)]
    pub rest_token: String,
    /// Environment variable that overrides `rest_token` when set.
    #[serde(default)]
    pub rest_token_env: Option<String>,
    /// Tracker/session pairs rotated round-robin, one per request.
    #[serde(default)]
    pub pairs: Vec<CredentialPair>,
}

/// One tracker/session identifier pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CredentialPair {
    pub tracker_id: String,
    pub session_id: String,
}

impl CredentialsConfig {
    /// Returns the token to send, preferring the environment override.
    #[must_use]
    pub fn rest_token(&self) -> String {
        self.rest_token_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|token| !token.is_empty())
            .unwrap_or_else(|| self.rest_token.clone())
    }
}

// ── Response shape ───────────────────────────────────────────────────────

/// Where records and the total count live in a response.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResponseShape {
    /// Dot paths to the record array, tried in order before the generic
    /// scan.
    pub records_paths: Vec<String>,
    /// Dot paths to the total record count, tried in order.
    pub total_paths: Vec<String>,
}

impl Default for ResponseShape {
    fn default() -> Self {
        Self {
            records_paths: names(&[
                "data.searchData",
                "records",
                "data",
                "companies",
                "results",
                "items",
                "content",
            ]),
            total_paths: names(&["data.total", "total", "totalCount", "data.totalCount"]),
        }
    }
}

// ── Field mapping ────────────────────────────────────────────────────────

/// Maps vendor JSON field names to canonical company fields.
///
/// Every entry is an ordered list of candidate names; the first one present
/// with a usable value wins.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    pub company_id: Vec<String>,
    pub name: Vec<String>,
    pub score: Vec<String>,
    pub status: Vec<String>,
    pub liquidation_status: Vec<String>,
    pub industry_code: Vec<String>,
    pub industry_name: Vec<String>,
    pub address: Vec<String>,
    pub location: Vec<String>,
    pub incorporated_date: Vec<String>,
    pub country: Vec<String>,
    pub watch_list_titles: Vec<String>,
    pub financial_facts: Vec<FactFields>,
    pub activity: Vec<String>,
    /// Candidate names of the trading area array.
    pub trading_areas: Vec<String>,
    pub trading_area: TradingAreaFields,
    /// Candidate names of the industry mix array.
    pub industry_mix: Vec<String>,
    pub industry: IndustryMixFields,
}

/// Candidate names for one financial fact type.
#[derive(Debug, Clone, Deserialize)]
pub struct FactFields {
    pub kind: FactKind,
    pub candidates: Vec<String>,
}

/// Candidate names inside one trading area object.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradingAreaFields {
    pub area: Vec<String>,
    pub address: Vec<String>,
    pub post_code_short: Vec<String>,
    pub region_id: Vec<String>,
    pub region: Vec<String>,
    pub post_code: Vec<String>,
    pub district_id: Vec<String>,
    pub district: Vec<String>,
    pub location: Vec<String>,
    pub latitude: Vec<String>,
    pub longitude: Vec<String>,
}

/// Candidate names inside one industry mix object.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndustryMixFields {
    pub sic_code: Vec<String>,
    pub description: Vec<String>,
    pub group: Vec<String>,
    pub weight: Vec<String>,
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            company_id: names(&["companyId", "id"]),
            name: names(&["companyName", "name"]),
            score: names(&["score"]),
            status: names(&["status", "companyStatus"]),
            liquidation_status: names(&["liqStatus"]),
            industry_code: names(&["industryCode", "SIC"]),
            industry_name: names(&["industryName", "industry"]),
            address: names(&["address", "companyAddress"]),
            location: names(&["location", "companyLocation"]),
            incorporated_date: names(&["incorporatedDate", "dateOfIncorporation"]),
            country: names(&["country"]),
            watch_list_titles: names(&["watchListTitles"]),
            financial_facts: vec![
                FactFields {
                    kind: FactKind::NetAssets,
                    candidates: names(&["netAssets", "NetAssets"]),
                },
                FactFields {
                    kind: FactKind::ProfitAfterTax,
                    candidates: names(&["profitAfterTax", "ProfitAfterTax"]),
                },
                FactFields {
                    kind: FactKind::Turnover,
                    candidates: names(&["turnover", "Turnover"]),
                },
                FactFields {
                    kind: FactKind::MultipleIndustryMixTurnover,
                    candidates: names(&["multipleIndustryMixTO", "MultipleIndustryMixTO"]),
                },
            ],
            activity: names(&["activity", "Activity"]),
            trading_areas: names(&["trad", "Trad", "tradingAddresses", "TradingAddresses"]),
            trading_area: TradingAreaFields::default(),
            industry_mix: names(&["indMix", "IndustryMix", "industries", "Industries"]),
            industry: IndustryMixFields::default(),
        }
    }
}

impl Default for TradingAreaFields {
    fn default() -> Self {
        Self {
            area: names(&["TradArea", "area"]),
            address: names(&["TradAddress", "address"]),
            post_code_short: names(&["TradPostShort", "postCodeShort"]),
            region_id: names(&["TradRegionID", "regionId"]),
            region: names(&["TradRegion", "region"]),
            post_code: names(&["TradPost", "postCode"]),
            district_id: names(&["TradDistrictID", "districtId"]),
            district: names(&["TradDistrict", "district"]),
            location: names(&["TradLocation", "location"]),
            latitude: names(&["TradLatitude", "latitude"]),
            longitude: names(&["TradLongitude", "longitude"]),
        }
    }
}

impl Default for IndustryMixFields {
    fn default() -> Self {
        Self {
            sic_code: names(&["SIC2007", "code"]),
            description: names(&["SICDesc", "description"]),
            group: names(&["SICGroup", "group"]),
            weight: names(&["SIC2007Weight", "weight"]),
        }
    }
}

// ── Volume classification ────────────────────────────────────────────────

/// Static per-letter volume classification used for partitioning.
///
/// Letters are matched case-insensitively. A letter listed nowhere is
/// treated as [`VolumeClass::Medium`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VolumeClassification {
    /// The symbols partition keys are built from, in order.
    pub alphabet: String,
    pub high: String,
    pub medium: String,
    pub low: String,
}

impl Default for VolumeClassification {
    fn default() -> Self {
        Self {
            alphabet: "abcdefghijklmnopqrstuvwxyz".to_string(),
            high: "abcdefghilmprst".to_string(),
            medium: "jknouvw".to_string(),
            low: "qxyz".to_string(),
        }
    }
}

impl VolumeClassification {
    /// Classifies a partition key by its first letter.
    #[must_use]
    pub fn classify(&self, key: &str) -> VolumeClass {
        let Some(letter) = key.chars().next().map(|c| c.to_ascii_lowercase()) else {
            return VolumeClass::Low;
        };
        if self.high.contains(letter) {
            VolumeClass::High
        } else if self.low.contains(letter) {
            VolumeClass::Low
        } else {
            VolumeClass::Medium
        }
    }

    /// The partition alphabet, lowercased, without duplicates.
    #[must_use]
    pub fn symbols(&self) -> Vec<char> {
        let mut seen = Vec::new();
        for c in self.alphabet.chars().map(|c| c.to_ascii_lowercase()) {
            if !c.is_whitespace() && !seen.contains(&c) {
                seen.push(c);
            }
        }
        seen
    }
}

// ── Parsing and validation ───────────────────────────────────────────────

impl SourceDefinition {
    /// Checks the parts of the definition serde cannot.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidDefinition`] if the URL is empty, the
    /// body template is not valid JSON, no identifier candidates are
    /// configured, or the partition alphabet is empty.
    pub fn validate(&self) -> Result<(), SourceError> {
        let invalid = |message: String| SourceError::InvalidDefinition {
            id: self.id.clone(),
            message,
        };

        if self.request.url.trim().is_empty() {
            return Err(invalid("request.url is empty".to_string()));
        }
        if let Some(body) = &self.request.body {
            serde_json::from_str::<serde_json::Value>(body)
                .map_err(|e| invalid(format!("request.body is not valid JSON: {e}")))?;
        }
        if self.fields.company_id.is_empty() {
            return Err(invalid("fields.company_id has no candidates".to_string()));
        }
        if self.partition.symbols().is_empty() {
            return Err(invalid("partition.alphabet is empty".to_string()));
        }
        Ok(())
    }
}

/// Parses a [`SourceDefinition`] from a TOML string.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or missing required fields.
pub fn parse_source_toml(toml_str: &str) -> Result<SourceDefinition, String> {
    toml::de::from_str(toml_str).map_err(|e| e.to_string())
}
