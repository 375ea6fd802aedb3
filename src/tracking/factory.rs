use super::{
    FingerprintStore, LazyDiffInput, OpenFindingsLoader, ReferenceBranchUnits,
    ReferenceUnitResolver,
};
use crate::db::Db;
use crate::model::Unit;
use anyhow::Result;
use std::sync::Arc;
use tracing::trace;

/// Builds per-unit reference inputs for the correlation algorithm.
pub struct DiffInputFactory {
    resolver: Arc<dyn ReferenceUnitResolver>,
    store: Arc<dyn FingerprintStore>,
    findings_loader: Arc<dyn OpenFindingsLoader>,
}

impl DiffInputFactory {
    pub fn new(
        resolver: Arc<dyn ReferenceUnitResolver>,
        store: Arc<dyn FingerprintStore>,
        findings_loader: Arc<dyn OpenFindingsLoader>,
    ) -> Self {
        Self {
            resolver,
            store,
            findings_loader,
        }
    }

    /// Wire every collaborator to one database, comparing against `reference_branch`.
    pub fn from_db(db: Arc<Db>, reference_branch: Option<&str>) -> Result<Self> {
        let resolver = ReferenceBranchUnits::load(&db, reference_branch)?;
        Ok(Self::new(Arc::new(resolver), db.clone(), db))
    }

    /// Like [`Self::from_db`], comparing against `REFDIFF_REFERENCE_BRANCH`.
    pub fn from_config(db: Arc<Db>) -> Result<Self> {
        let resolver = ReferenceBranchUnits::from_config(&db)?;
        Ok(Self::new(Arc::new(resolver), db.clone(), db))
    }

    pub fn has_reference_analysis(&self) -> bool {
        self.resolver.has_reference_analysis()
    }

    /// Resolve the reference counterpart of `unit`; nothing is loaded until the input is read.
    pub fn create_input(&self, unit: &Unit) -> LazyDiffInput {
        let reference_id = if self.resolver.has_reference_analysis() {
            self.resolver.resolve_reference_unit_id(&unit.key)
        } else {
            None
        };
        trace!(
            key = %unit.key,
            kind = %unit.kind,
            reference_id = reference_id.as_deref().unwrap_or("-"),
            "created reference input"
        );
        LazyDiffInput::new(
            unit.kind,
            reference_id,
            Arc::clone(&self.store),
            Arc::clone(&self.findings_loader),
        )
    }
}
