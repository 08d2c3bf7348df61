#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Search API source definitions and record normalization.
//!
//! A [`source_def::SourceDefinition`] (loaded from embedded TOML by the
//! [`registry`]) knows how to build a page request for any work unit
//! ([`request`]), where the records and totals sit in a response
//! ([`extract`]), and how raw records map onto the canonical company
//! record ([`normalize`]).

pub mod extract;
pub mod normalize;
pub mod parsing;
pub mod progress;
pub mod registry;
pub mod request;
pub mod session;
pub mod source_def;

/// Errors raised while loading a source or building its requests.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// A source definition is internally inconsistent.
    #[error("Invalid source definition '{id}': {message}")]
    InvalidDefinition {
        /// Source id.
        id: String,
        /// What is wrong with it.
        message: String,
    },

    /// No source with this id is registered.
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// A request template could not be filled.
    #[error("Template error: {0}")]
    Template(String),
}
