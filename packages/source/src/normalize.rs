//! Mapping raw vendor records onto [`CompanyRecord`].
//!
//! Every canonical field is resolved through the same generic resolver:
//! walk the field's ordered candidate names from the [`FieldMapping`] and
//! take the first one present with a usable value. Absent fields get a
//! type-appropriate default. Only a missing identifier rejects a record.

use company_etl_company_models::{
    Activity, CompanyRecord, FinancialFact, IndustryMix, TradingArea, UNKNOWN_PROVENANCE,
};
use serde_json::Value;

use crate::parsing::{rewrite_day_month_year, value_as_f64, value_as_string};
use crate::source_def::{FieldMapping, IndustryMixFields, TradingAreaFields};

/// Why a raw record could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizationError {
    /// None of the identifier candidates held a usable value.
    #[error("record has no identifier (tried {tried:?})")]
    MissingIdentifier {
        /// Candidate field names that were tried.
        tried: Vec<String>,
    },
}

/// Returns the first candidate value present in `record` that is neither
/// null nor an empty string.
#[must_use]
pub fn resolve<'a>(record: &'a Value, candidates: &[String]) -> Option<&'a Value> {
    candidates
        .iter()
        .filter_map(|name| record.get(name))
        .find(|value| match value {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            _ => true,
        })
}

fn string_field(record: &Value, candidates: &[String]) -> String {
    resolve(record, candidates)
        .and_then(value_as_string)
        .unwrap_or_default()
}

fn f64_field(record: &Value, candidates: &[String]) -> Option<f64> {
    resolve(record, candidates).and_then(value_as_f64)
}

/// Normalizes one raw record.
///
/// # Errors
///
/// Returns [`NormalizationError::MissingIdentifier`] if no identifier
/// candidate is present.
pub fn normalize(
    record: &Value,
    fields: &FieldMapping,
) -> Result<CompanyRecord, NormalizationError> {
    let company_id = resolve(record, &fields.company_id)
        .and_then(value_as_string)
        .ok_or_else(|| NormalizationError::MissingIdentifier {
            tried: fields.company_id.clone(),
        })?;

    let incorporated_date = resolve(record, &fields.incorporated_date)
        .and_then(value_as_string)
        .map(|date| rewrite_day_month_year(&date));

    Ok(CompanyRecord {
        company_id,
        name: string_field(record, &fields.name),
        score: f64_field(record, &fields.score).unwrap_or(0.0),
        status: string_field(record, &fields.status),
        liquidation_status: string_field(record, &fields.liquidation_status),
        industry_code: string_field(record, &fields.industry_code),
        industry_name: string_field(record, &fields.industry_name),
        address: string_field(record, &fields.address),
        location: string_field(record, &fields.location),
        incorporated_date,
        country: string_field(record, &fields.country),
        watch_list_titles: string_field(record, &fields.watch_list_titles),
        financial_facts: financial_facts(record, fields),
        activities: activities(record, fields),
        trading_areas: array_field(record, &fields.trading_areas)
            .filter_map(|item| trading_area(item, &fields.trading_area))
            .collect(),
        industry_mix: array_field(record, &fields.industry_mix)
            .filter_map(|item| industry_mix(item, &fields.industry))
            .collect(),
    })
}

// ── Sub-collections ──────────────────────────────────────────────────────

/// Splits a `{value, type}` object or a bare value into value and
/// provenance.
fn tagged(value: &Value) -> (Option<&Value>, String) {
    match value {
        Value::Object(map) => (
            map.get("value"),
            map.get("type")
                .and_then(value_as_string)
                .unwrap_or_else(|| UNKNOWN_PROVENANCE.to_string()),
        ),
        other => (Some(other), UNKNOWN_PROVENANCE.to_string()),
    }
}

fn financial_facts(record: &Value, fields: &FieldMapping) -> Vec<FinancialFact> {
    fields
        .financial_facts
        .iter()
        .filter_map(|fact| {
            let raw = resolve(record, &fact.candidates)?;
            let (value, provenance) = tagged(raw);
            Some(FinancialFact {
                kind: fact.kind,
                provenance,
                value: value.and_then(value_as_f64)?,
            })
        })
        .collect()
}

fn activities(record: &Value, fields: &FieldMapping) -> Vec<Activity> {
    resolve(record, &fields.activity)
        .and_then(|raw| {
            let (value, provenance) = tagged(raw);
            Some(Activity {
                description: value.and_then(value_as_string)?,
                provenance,
            })
        })
        .into_iter()
        .collect()
}

/// Iterates the first candidate array in `record`; yields nothing when no
/// candidate is an array.
fn array_field<'a>(record: &'a Value, candidates: &[String]) -> impl Iterator<Item = &'a Value> {
    resolve(record, candidates)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn trading_area(item: &Value, fields: &TradingAreaFields) -> Option<TradingArea> {
    item.is_object().then(|| TradingArea {
        area: string_field(item, &fields.area),
        address: string_field(item, &fields.address),
        post_code_short: string_field(item, &fields.post_code_short),
        region_id: string_field(item, &fields.region_id),
        region: string_field(item, &fields.region),
        post_code: string_field(item, &fields.post_code),
        district_id: string_field(item, &fields.district_id),
        district: string_field(item, &fields.district),
        location: string_field(item, &fields.location),
        latitude: f64_field(item, &fields.latitude),
        longitude: f64_field(item, &fields.longitude),
    })
}

fn industry_mix(item: &Value, fields: &IndustryMixFields) -> Option<IndustryMix> {
    item.is_object().then(|| IndustryMix {
        sic_code: string_field(item, &fields.sic_code),
        description: string_field(item, &fields.description),
        group: string_field(item, &fields.group),
        weight: f64_field(item, &fields.weight).unwrap_or(0.0),
    })
}
