#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Intervention Engine.
//!
//! Turns loosely typed directive payloads into [`Directive`]s, evaluates
//! their geographic predicate against each lattice point, and produces a
//! modified grid plus before/after statistics. Cells outside the predicate
//! are copied untouched.
//!
//! [`Directive`]: co2_map_intervention_models::Directive

pub mod engine;
pub mod normalize;
pub mod predicate;

pub use engine::{apply_intervention, apply_plan, validate_plan};
pub use normalize::{normalize_directive, normalize_plan};

use thiserror::Error;

/// Errors that can occur while normalizing or applying an intervention.
#[derive(Debug, Error)]
pub enum InterventionError {
    /// A directive field is missing, malformed, or out of range. No grid
    /// is computed.
    #[error("Invalid directive field '{field}': {message}")]
    InvalidDirective {
        /// Path of the offending field, e.g. `magnitude` or
        /// `directives[1].target.name`.
        field: String,
        /// Description of what went wrong.
        message: String,
    },

    /// A numeric step could not produce a finite result.
    #[error("Computation error: {message}")]
    Computation {
        /// Description of what went wrong.
        message: String,
    },
}

impl InterventionError {
    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDirective {
            field: field.into(),
            message: message.into(),
        }
    }

    /// The offending field for [`Self::InvalidDirective`].
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::InvalidDirective { field, .. } => Some(field),
            Self::Computation { .. } => None,
        }
    }
}
