use crate::error::UnknownVariant;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Identifier of a component row (a unit on some branch).
pub type UnitId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitKind {
    Project,
    Directory,
    File,
    View,
    Subview,
    ProjectView,
}

impl UnitKind {
    /// Only files have lines to fingerprint.
    pub const fn is_line_addressable(self) -> bool {
        matches!(self, Self::File)
    }

    pub const fn qualifier(self) -> &'static str {
        match self {
            Self::Project => "TRK",
            Self::Directory => "DIR",
            Self::File => "FIL",
            Self::View => "VW",
            Self::Subview => "SVW",
            Self::ProjectView => "APP",
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.qualifier())
    }
}

impl FromStr for UnitKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRK" => Ok(Self::Project),
            "DIR" => Ok(Self::Directory),
            "FIL" => Ok(Self::File),
            "VW" => Ok(Self::View),
            "SVW" => Ok(Self::Subview),
            "APP" => Ok(Self::ProjectView),
            other => Err(UnknownVariant::new("unit kind", other)),
        }
    }
}

/// An analyzable entity of the analysis in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unit {
    pub id: UnitId,
    pub key: String,
    pub kind: UnitKind,
}

impl Unit {
    pub fn new(id: impl Into<UnitId>, key: impl Into<String>, kind: UnitKind) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingStatus {
    Open,
    Confirmed,
    Reopened,
    Resolved,
    Closed,
}

impl FindingStatus {
    /// Still eligible to be matched by a new result.
    pub const fn is_open(self) -> bool {
        !matches!(self, Self::Resolved | Self::Closed)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Confirmed => "CONFIRMED",
            Self::Reopened => "REOPENED",
            Self::Resolved => "RESOLVED",
            Self::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for FindingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FindingStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(Self::Open),
            "CONFIRMED" => Ok(Self::Confirmed),
            "REOPENED" => Ok(Self::Reopened),
            "RESOLVED" => Ok(Self::Resolved),
            "CLOSED" => Ok(Self::Closed),
            other => Err(UnknownVariant::new("finding status", other)),
        }
    }
}

/// One entry of a finding's change history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FindingChange {
    pub key: String,
    pub finding_key: String,
    pub change_type: String,
    pub data: Value,
    pub user: Option<String>,
    pub created_at: i64,
}

/// A previously reported result on a reference unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub key: String,
    pub rule_key: String,
    pub component_id: UnitId,
    pub line: Option<i64>,
    pub message: String,
    pub status: FindingStatus,
    pub line_hash: Option<String>,
    pub changes: Vec<FindingChange>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_files_are_line_addressable() {
        let kinds = [
            UnitKind::Project,
            UnitKind::Directory,
            UnitKind::File,
            UnitKind::View,
            UnitKind::Subview,
            UnitKind::ProjectView,
        ];
        let addressable: Vec<_> = kinds
            .into_iter()
            .filter(|kind| kind.is_line_addressable())
            .collect();
        assert_eq!(addressable, vec![UnitKind::File]);
    }

    #[test]
    fn qualifier_parses_back() {
        assert_eq!("FIL".parse::<UnitKind>(), Ok(UnitKind::File));
        assert_eq!("DIR".parse::<UnitKind>(), Ok(UnitKind::Directory));
        assert_eq!(UnitKind::ProjectView.to_string(), "APP");
        assert!("UTS".parse::<UnitKind>().is_err());
    }

    #[test]
    fn resolved_and_closed_are_not_open() {
        assert!(FindingStatus::Open.is_open());
        assert!(FindingStatus::Confirmed.is_open());
        assert!(FindingStatus::Reopened.is_open());
        assert!(!FindingStatus::Resolved.is_open());
        assert!(!FindingStatus::Closed.is_open());
    }
}
