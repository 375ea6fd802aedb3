//! Reference-branch inputs for issue tracking across branches.
//!
//! For a unit under analysis, [`tracking::DiffInputFactory`] finds the unit's
//! counterpart on the reference branch and hands back a [`tracking::LazyDiffInput`]
//! whose per-line fingerprints and open findings are read from the SQLite store
//! in [`db`] on first use, or come back empty when there is nothing to compare.

pub mod analysis;
pub mod config;
pub mod db;
pub mod error;
pub mod fingerprint;
pub mod logging;
pub mod model;
pub mod tracking;
pub mod util;
