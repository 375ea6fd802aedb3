use super::ReferenceUnitResolver;
use crate::config::Config;
use crate::db::Db;
use crate::model::UnitId;
use anyhow::{Context, Result};
use std::collections::HashMap;
use tracing::{info, warn};

/// Component ids of the reference branch's last analysis, keyed by unit key.
///
/// Loaded once; lookups never touch storage.
#[derive(Debug, Clone, Default)]
pub struct ReferenceBranchUnits {
    branch: Option<String>,
    analysis_id: Option<i64>,
    ids: HashMap<String, UnitId>,
}

impl ReferenceBranchUnits {
    /// No reference branch configured.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_ids(branch: &str, analysis_id: i64, ids: HashMap<String, UnitId>) -> Self {
        Self {
            branch: Some(branch.to_string()),
            analysis_id: Some(analysis_id),
            ids,
        }
    }

    /// Load the units of `branch`; `None`, an unknown branch, or one never analyzed yields no reference.
    pub fn load(db: &Db, branch: Option<&str>) -> Result<Self> {
        let Some(branch) = branch else {
            info!("no reference branch configured");
            return Ok(Self::none());
        };
        let Some(record) = db
            .get_branch(branch)
            .with_context(|| format!("look up reference branch {branch}"))?
        else {
            warn!(branch, "reference branch not found");
            return Ok(Self::none());
        };
        let Some(analysis_id) = record.last_analysis_id else {
            warn!(branch, "reference branch has no analysis");
            return Ok(Self::none());
        };

        let ids = db
            .component_ids_by_key(branch)
            .with_context(|| format!("load components of reference branch {branch}"))?;
        info!(branch, analysis_id, units = ids.len(), "loaded reference branch");
        Ok(Self::from_ids(branch, analysis_id, ids))
    }

    /// Load the branch named by `REFDIFF_REFERENCE_BRANCH`.
    pub fn from_config(db: &Db) -> Result<Self> {
        Self::load(db, Config::get().reference_branch.as_deref())
    }

    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    pub fn analysis_id(&self) -> Option<i64> {
        self.analysis_id
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl ReferenceUnitResolver for ReferenceBranchUnits {
    fn has_reference_analysis(&self) -> bool {
        self.analysis_id.is_some()
    }

    fn resolve_reference_unit_id(&self, key: &str) -> Option<UnitId> {
        if self.analysis_id.is_none() {
            return None;
        }
        self.ids.get(key).cloned()
    }
}
