use super::{FingerprintStore, OpenFindingsLoader};
use crate::fingerprint::LineFingerprintSequence;
use crate::model::{Finding, UnitId, UnitKind};
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Reference-side input for one unit, loaded on first read and cached after.
///
/// Fingerprints and findings load independently. A failed load leaves its slot
/// empty so the next read tries again; a successful one is never repeated, even
/// when several threads read at once.
pub struct LazyDiffInput {
    kind: UnitKind,
    reference_id: Option<UnitId>,
    store: Arc<dyn FingerprintStore>,
    findings_loader: Arc<dyn OpenFindingsLoader>,
    fingerprints: OnceCell<LineFingerprintSequence>,
    findings: OnceCell<Vec<Finding>>,
}

impl LazyDiffInput {
    pub fn new(
        kind: UnitKind,
        reference_id: Option<UnitId>,
        store: Arc<dyn FingerprintStore>,
        findings_loader: Arc<dyn OpenFindingsLoader>,
    ) -> Self {
        Self {
            kind,
            reference_id,
            store,
            findings_loader,
            fingerprints: OnceCell::new(),
            findings: OnceCell::new(),
        }
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    pub fn reference_id(&self) -> Option<&str> {
        self.reference_id.as_deref()
    }

    pub fn fingerprints(&self) -> Result<&LineFingerprintSequence> {
        self.fingerprints.get_or_try_init(|| self.load_fingerprints())
    }

    pub fn findings(&self) -> Result<&[Finding]> {
        self.findings
            .get_or_try_init(|| self.load_findings())
            .map(Vec::as_slice)
    }

    pub fn fingerprints_loaded(&self) -> bool {
        self.fingerprints.get().is_some()
    }

    pub fn findings_loaded(&self) -> bool {
        self.findings.get().is_some()
    }

    fn load_fingerprints(&self) -> Result<LineFingerprintSequence> {
        let Some(unit_id) = self.reference_id.as_deref() else {
            trace!(kind = %self.kind, "no reference unit, empty fingerprints");
            return Ok(LineFingerprintSequence::empty());
        };
        if !self.kind.is_line_addressable() {
            trace!(unit_id, kind = %self.kind, "unit has no lines, empty fingerprints");
            return Ok(LineFingerprintSequence::empty());
        }

        let hashes = {
            let session = self
                .store
                .open_session()
                .with_context(|| format!("open session to load fingerprints of {unit_id}"))?;
            session
                .load_line_fingerprints(unit_id)
                .with_context(|| format!("load fingerprints of {unit_id}"))?
        };

        let sequence = match hashes {
            Some(hashes) if !hashes.is_empty() => LineFingerprintSequence::new(hashes),
            _ => LineFingerprintSequence::empty(),
        };
        debug!(unit_id, lines = sequence.len(), "loaded reference fingerprints");
        Ok(sequence)
    }

    fn load_findings(&self) -> Result<Vec<Finding>> {
        let Some(unit_id) = self.reference_id.as_deref() else {
            trace!(kind = %self.kind, "no reference unit, no findings");
            return Ok(Vec::new());
        };

        let findings = self
            .findings_loader
            .load_open_findings_with_changes(unit_id)
            .with_context(|| format!("load open findings of {unit_id}"))?;
        debug!(unit_id, findings = findings.len(), "loaded reference findings");
        Ok(findings)
    }
}

impl fmt::Debug for LazyDiffInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyDiffInput")
            .field("kind", &self.kind)
            .field("reference_id", &self.reference_id)
            .field("fingerprints_loaded", &self.fingerprints_loaded())
            .field("findings_loaded", &self.findings_loaded())
            .finish()
    }
}
