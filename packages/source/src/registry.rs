//! Source registry: every source definition, loaded from embedded TOML.
//!
//! Each `.toml` file in `packages/source/sources/` is baked into the binary
//! at compile time via [`include_str!`].

use crate::source_def::{SourceDefinition, parse_source_toml};

/// TOML configs embedded at compile time.
const SOURCE_TOMLS: &[(&str, &str)] = &[("pomanda", include_str!("../sources/pomanda.toml"))];

/// Returns all configured source definitions, parsed from embedded TOML.
///
/// # Panics
///
/// Panics if any TOML config is malformed (the configs are embedded, so
/// this is caught by the registry tests).
#[must_use]
pub fn all_sources() -> Vec<SourceDefinition> {
    SOURCE_TOMLS
        .iter()
        .map(|(name, toml)| {
            parse_source_toml(toml).unwrap_or_else(|e| panic!("Failed to parse {name}.toml: {e}"))
        })
        .collect()
}

/// Looks up a source definition by id.
#[must_use]
pub fn find_source(id: &str) -> Option<SourceDefinition> {
    all_sources().into_iter().find(|source| source.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_all_sources() {
        assert_eq!(all_sources().len(), SOURCE_TOMLS.len());
    }

    #[test]
    fn all_sources_validate() {
        for source in &all_sources() {
            source
                .validate()
                .unwrap_or_else(|e| panic!("{} failed validation: {e}", source.id));
            assert!(!source.name.is_empty(), "{}: name is empty", source.id);
        }
    }

    #[test]
    fn pomanda_rotates_five_credential_pairs() {
        let source = find_source("pomanda").unwrap();
        assert_eq!(source.credentials.pairs.len(), 5);
        assert_eq!(
            source.credentials.rest_token_env.as_deref(),
            Some("POMANDA_REST_TOKEN")
        );
        assert_eq!(source.partition.high.len(), 15);
    }

    #[test]
    fn unknown_source_is_none() {
        assert!(find_source("nope").is_none());
    }
}
