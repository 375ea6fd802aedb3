//! Inputs for correlating current findings with those of a reference branch.
//!
//! [`DiffInputFactory`] hands out one [`LazyDiffInput`] per unit. The input only
//! touches storage when the correlation algorithm actually reads it, and resolves
//! every expected absence (no reference analysis, no counterpart unit, a unit
//! without lines, nothing stored) to an empty value rather than an error.

mod factory;
mod input;
mod reference;

pub use factory::DiffInputFactory;
pub use input::LazyDiffInput;
pub use reference::ReferenceBranchUnits;

use crate::model::{Finding, UnitId};
use anyhow::Result;

/// Maps units of the analysis in progress to their reference branch counterparts.
pub trait ReferenceUnitResolver: Send + Sync {
    /// Whether a reference analysis is configured and available.
    fn has_reference_analysis(&self) -> bool;

    fn resolve_reference_unit_id(&self, key: &str) -> Option<UnitId>;
}

/// A storage session held for exactly one load, released when dropped.
pub trait FingerprintSession {
    /// Stored line fingerprints of a unit, `None` when nothing is stored.
    fn load_line_fingerprints(&self, unit_id: &str) -> Result<Option<Vec<String>>>;
}

/// Opens scoped sessions against the store holding line fingerprints.
pub trait FingerprintStore: Send + Sync {
    fn open_session(&self) -> Result<Box<dyn FingerprintSession + '_>>;
}

pub trait OpenFindingsLoader: Send + Sync {
    /// Findings not yet resolved on a unit, with their change history. Empty when none exist.
    fn load_open_findings_with_changes(&self, unit_id: &str) -> Result<Vec<Finding>>;
}
