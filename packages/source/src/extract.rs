//! Locating the record array inside an arbitrary search response.
//!
//! The API has returned records under several different containers over
//! time. [`extract_records`] tries the configured dot paths in order, then
//! an Elasticsearch-style `hits.hits` envelope, then a generic scan for the
//! first non-empty array of objects up to one level deep.
//!
//! A matching container that holds an empty array is a legitimately empty
//! page and yields `Some(vec![])`. `None` means no known shape matched.

use serde_json::Value;

use crate::parsing::value_as_u64;

/// Navigates a dot-separated path into a [`serde_json::Value`].
#[must_use]
pub fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Extracts the raw records from `payload`.
///
/// Returns `None` if no known container shape matched.
#[must_use]
pub fn extract_records(payload: &Value, paths: &[String]) -> Option<Vec<Value>> {
    if let Value::Array(items) = payload {
        return Some(items.clone());
    }

    for path in paths {
        if let Some(Value::Array(items)) = resolve_path(payload, path) {
            log::trace!("records found at '{path}'");
            return Some(items.clone());
        }
    }

    if let Some(Value::Array(hits)) = resolve_path(payload, "hits.hits") {
        return Some(
            hits.iter()
                .map(|hit| hit.get("_source").unwrap_or(hit).clone())
                .collect(),
        );
    }

    scan_for_records(payload).map(|(path, items)| {
        log::debug!("using records from '{path}' (generic scan)");
        items.clone()
    })
}

/// Returns the first non-empty array of objects at the top level of
/// `payload`, or one level below it, with its dot path.
fn scan_for_records(payload: &Value) -> Option<(String, &Vec<Value>)> {
    let object = payload.as_object()?;

    for (key, value) in object {
        if let Some(items) = as_record_array(value) {
            return Some((key.clone(), items));
        }
        if let Value::Object(nested) = value {
            for (nested_key, nested_value) in nested {
                if let Some(items) = as_record_array(nested_value) {
                    return Some((format!("{key}.{nested_key}"), items));
                }
            }
        }
    }

    None
}

fn as_record_array(value: &Value) -> Option<&Vec<Value>> {
    value
        .as_array()
        .filter(|items| items.first().is_some_and(Value::is_object))
}

/// Extracts the total record count the API reported, if any.
#[must_use]
pub fn extract_total(payload: &Value, paths: &[String]) -> Option<u64> {
    paths
        .iter()
        .find_map(|path| resolve_path(payload, path).and_then(value_as_u64))
}

/// A human-readable outline of a response, for diagnosing new shapes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShapeSummary {
    pub top_level_keys: Vec<String>,
    /// Every array found up to one level deep, with its length and the keys
    /// of its first element.
    pub arrays: Vec<(String, usize, Vec<String>)>,
    /// An error message the API put in the body, if any.
    pub error_message: Option<String>,
}

/// Outlines the structure of `payload`.
#[must_use]
pub fn describe_shape(payload: &Value) -> ShapeSummary {
    let mut summary = ShapeSummary::default();
    let Some(object) = payload.as_object() else {
        if let Value::Array(items) = payload {
            summary
                .arrays
                .push(("<root>".to_string(), items.len(), first_keys(items)));
        }
        return summary;
    };

    summary.top_level_keys = object.keys().cloned().collect();

    for (key, value) in object {
        match value {
            Value::Array(items) => {
                summary
                    .arrays
                    .push((key.clone(), items.len(), first_keys(items)));
            }
            Value::Object(nested) => {
                for (nested_key, nested_value) in nested {
                    if let Value::Array(items) = nested_value {
                        summary.arrays.push((
                            format!("{key}.{nested_key}"),
                            items.len(),
                            first_keys(items),
                        ));
                    }
                }
            }
            _ => {}
        }
    }

    summary.error_message = ["error", "errorMessage", "message"]
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
        .map(str::to_string);

    summary
}

fn first_keys(items: &[Value]) -> Vec<String> {
    items
        .first()
        .and_then(Value::as_object)
        .map(|o| o.keys().cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::source_def::ResponseShape;

    fn paths() -> Vec<String> {
        ResponseShape::default().records_paths
    }

    #[test]
    fn prefers_search_data_container() {
        let payload = json!({
            "data": {
                "searchData": [{"companyId": "1"}, {"companyId": "2"}],
                "total": 2
            },
            "records": [{"companyId": "x"}]
        });

        let records = extract_records(&payload, &paths()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["companyId"], "1");
    }

    #[test]
    fn falls_back_through_known_containers() {
        let payload = json!({"results": [{"id": 7}]});
        let records = extract_records(&payload, &paths()).unwrap();
        assert_eq!(records[0]["id"], 7);

        let payload = json!({"data": [{"id": 8}]});
        let records = extract_records(&payload, &paths()).unwrap();
        assert_eq!(records[0]["id"], 8);
    }

    #[test]
    fn empty_known_container_is_an_empty_page() {
        let payload = json!({"data": {"searchData": [], "total": 0}});
        assert_eq!(extract_records(&payload, &paths()), Some(vec![]));
    }

    #[test]
    fn unwraps_elasticsearch_hits() {
        let payload = json!({"hits": {"hits": [{"_source": {"id": 1}}, {"id": 2}]}});
        let records = extract_records(&payload, &paths()).unwrap();
        assert_eq!(records, vec![json!({"id": 1}), json!({"id": 2})]);
    }

    #[test]
    fn scans_one_level_deep_for_object_arrays() {
        let payload = json!({
            "meta": {"tags": ["a", "b"]},
            "payload": {"rows": [{"id": 3}]}
        });
        let records = extract_records(&payload, &paths()).unwrap();
        assert_eq!(records, vec![json!({"id": 3})]);
    }

    #[test]
    fn scan_follows_document_order_not_key_order() {
        let payload: Value = serde_json::from_str(
            r#"{"zrows": [{"companyId": "top"}], "alpha": {"nested": [{"companyId": "deep"}]}}"#,
        )
        .unwrap();

        let records = extract_records(&payload, &[]).unwrap();
        assert_eq!(records, vec![json!({"companyId": "top"})]);

        let summary = describe_shape(&payload);
        assert_eq!(summary.top_level_keys, vec!["zrows", "alpha"]);
        assert_eq!(summary.arrays[0].0, "zrows");
    }

    #[test]
    fn unrecognized_shape_is_none() {
        let payload = json!({"status": "error", "message": "captcha required"});
        assert_eq!(extract_records(&payload, &paths()), None);
        assert_eq!(extract_records(&json!(null), &paths()), None);
    }

    #[test]
    fn extracts_total_from_first_matching_path() {
        let total_paths = ResponseShape::default().total_paths;
        assert_eq!(
            extract_total(&json!({"data": {"total": "1500"}}), &total_paths),
            Some(1500)
        );
        assert_eq!(extract_total(&json!({"total": 12}), &total_paths), Some(12));
        assert_eq!(extract_total(&json!({"data": {}}), &total_paths), None);
    }

    #[test]
    fn describes_shape() {
        let payload = json!({
            "data": {"searchData": [{"companyId": "1", "companyName": "A"}], "total": 1},
            "message": "ok"
        });

        let summary = describe_shape(&payload);
        assert_eq!(summary.top_level_keys, vec!["data", "message"]);
        assert_eq!(summary.arrays.len(), 1);
        assert_eq!(summary.arrays[0].0, "data.searchData");
        assert_eq!(summary.arrays[0].1, 1);
        assert_eq!(summary.error_message.as_deref(), Some("ok"));
    }
}
