//! Page request construction from a [`RequestTemplate`].

use std::collections::BTreeMap;

use company_etl_ingest_models::{PaginationContext, WHOLE_RANGE_KEY};
use company_etl_scraper::FetchRequest;
use serde_json::Value;

use crate::SourceError;
use crate::session::{cookie_header, next_credential};
use crate::source_def::SourceDefinition;

/// Position of the page to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest<'a> {
    /// Work unit key. [`WHOLE_RANGE_KEY`] means no name prefix.
    pub unit_key: &'a str,
    pub offset: u64,
    pub size: u64,
}

impl PageRequest<'_> {
    /// The name prefix sent for this unit.
    #[must_use]
    pub fn prefix(&self) -> &str {
        if self.unit_key == WHOLE_RANGE_KEY {
            ""
        } else {
            self.unit_key
        }
    }
}

impl SourceDefinition {
    /// Builds the request for `page`, rotating to the next credential pair
    /// and recording the choice in `context`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Template`] if the body template is not valid
    /// JSON.
    pub fn build_request(
        &self,
        page: &PageRequest<'_>,
        context: &mut PaginationContext,
        rest_token: &str,
    ) -> Result<FetchRequest, SourceError> {
        let pairs = &self.credentials.pairs;
        context.credential_index = next_credential(context.credential_index, pairs.len());
        let pair = context.credential_index.and_then(|i| pairs.get(i));

        let tracker_id = pair.map(|p| p.tracker_id.clone()).unwrap_or_default();
        let session_id = pair.map(|p| p.session_id.clone()).unwrap_or_default();

        let mut vars: BTreeMap<&str, Value> = BTreeMap::new();
        vars.insert("offset", Value::from(page.offset));
        vars.insert("size", Value::from(page.size));
        vars.insert("prefix", Value::from(page.prefix()));
        vars.insert("tracker_id", Value::from(tracker_id.clone()));
        vars.insert("session_id", Value::from(session_id));
        vars.insert("rest_token", Value::from(rest_token));
        vars.insert("cookie", Value::from(cookie_header(context)));

        let headers = self
            .request
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), fill_text(value, &vars)))
            .collect();

        let body = match &self.request.body {
            Some(template) => {
                let mut body: Value = serde_json::from_str(template)
                    .map_err(|e| SourceError::Template(format!("body: {e}")))?;
                fill_json(&mut body, &vars);
                Some(body.to_string())
            }
            None => None,
        };

        log::trace!(
            "built request for '{}' offset={} size={} tracker={tracker_id}",
            page.unit_key,
            page.offset,
            page.size,
        );

        Ok(FetchRequest {
            method: self.request.method,
            url: fill_text(&self.request.url, &vars),
            headers,
            body,
            timeout: self.request.timeout(),
            proxy: self.request.proxy.clone(),
        })
    }
}

/// Replaces `{{name}}` placeholders inside a string.
fn fill_text(template: &str, vars: &BTreeMap<&str, Value>) -> String {
    let mut out = template.to_string();
    for (name, value) in vars {
        let placeholder = format!("{{{{{name}}}}}");
        if out.contains(&placeholder) {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out = out.replace(&placeholder, &text);
        }
    }
    out
}

/// Substitutes placeholders throughout a JSON document.
///
/// A string that is exactly one placeholder takes the variable's JSON type
/// (so `"{{offset}}"` becomes a number); placeholders embedded in longer
/// strings are substituted as text.
fn fill_json(value: &mut Value, vars: &BTreeMap<&str, Value>) {
    match value {
        Value::String(s) => {
            let whole = s
                .strip_prefix("{{")
                .and_then(|rest| rest.strip_suffix("}}"))
                .and_then(|name| vars.get(name))
                .cloned();
            if let Some(replacement) = whole {
                *value = replacement;
            } else if s.contains("{{") {
                *s = fill_text(s, vars);
            }
        }
        Value::Array(items) => {
            for item in items {
                fill_json(item, vars);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                fill_json(item, vars);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::source_def::parse_source_toml;

    const DEF: &str = r#"
        id = "test"
        name = "Test API"

        [request]
        url = "https://api.example.com/search"
        body = '''
        {
          "from": "{{offset}}",
          "size": "{{size}}",
          "filters": { "name": { "value": "{{prefix}}" } },
          "trackerId": "{{tracker_id}}",
          "note": "page at {{offset}}",
          "captchaToken": null
        }
        '''

        [request.headers]
        resttoken = "{{rest_token}}"
        sessionid = "{{session_id}}"
        cookie = "{{cookie}}"

        [[credentials.pairs]]
        tracker_id = "t1"
        session_id = "s1"

        [[credentials.pairs]]
        tracker_id = "t2"
        session_id = "s2"
    "#;

    #[test]
    fn fills_typed_body_values() {
        let def = parse_source_toml(DEF).unwrap();
        let mut context = PaginationContext::default();
        let page = PageRequest {
            unit_key: "ab",
            offset: 444,
            size: 222,
        };

        let request = def.build_request(&page, &mut context, "tok").unwrap();
        let body: Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();

        assert_eq!(body["from"], json!(444));
        assert_eq!(body["size"], json!(222));
        assert_eq!(body["filters"]["name"]["value"], json!("ab"));
        assert_eq!(body["trackerId"], json!("t1"));
        assert_eq!(body["note"], json!("page at 444"));
        assert!(body["captchaToken"].is_null());
        assert_eq!(request.headers["resttoken"], "tok");
        assert_eq!(request.headers["sessionid"], "s1");
    }

    #[test]
    fn rotates_credentials_per_request() {
        let def = parse_source_toml(DEF).unwrap();
        let mut context = PaginationContext::default();
        let page = PageRequest {
            unit_key: "a",
            offset: 0,
            size: 10,
        };

        let sessions: Vec<String> = (0..3)
            .map(|_| {
                let request = def.build_request(&page, &mut context, "").unwrap();
                request.headers["sessionid"].clone()
            })
            .collect();

        assert_eq!(sessions, vec!["s1", "s2", "s1"]);
        assert_eq!(context.credential_index, Some(0));
    }

    #[test]
    fn whole_range_sends_empty_prefix_and_replays_cookies() {
        let def = parse_source_toml(DEF).unwrap();
        let mut context = PaginationContext::default();
        context
            .cookies
            .insert("AWSALB".to_string(), "abc".to_string());
        let page = PageRequest {
            unit_key: WHOLE_RANGE_KEY,
            offset: 0,
            size: 10,
        };

        let request = def.build_request(&page, &mut context, "").unwrap();
        let body: Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();

        assert_eq!(body["filters"]["name"]["value"], json!(""));
        assert_eq!(request.headers["cookie"], "AWSALB=abc");
    }
}
