use serde::{Deserialize, Serialize};
use std::fmt;

use crate::zone::constants::DEFAULT_TTL;

/// Stable identifier assigned to a zone when it is created
pub type ZoneId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
    Master,
    Include,
}

impl ZoneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneKind::Master => "master",
            ZoneKind::Include => "include",
        }
    }
}

impl fmt::Display for ZoneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneStatus {
    #[default]
    Active,
    Inactive,
    Deleted,
}

/// SOA tunables; unset values fall back to the synthesizer defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoaSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<u32>,
}

/// One zone file, either a master with its own origin or an include fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneNode {
    pub id: ZoneId,
    pub name: String,
    pub filename: String,
    /// Relative directory below the publish base, empty for the base itself
    #[serde(default)]
    pub directory: String,
    pub kind: ZoneKind,
    /// Only meaningful for masters
    #[serde(default)]
    pub domain: String,
    /// Hand-edited body emitted ahead of the generated records
    #[serde(default)]
    pub raw_content: String,
    #[serde(default = "default_ttl")]
    pub default_ttl: u32,
    /// Ignored for includes
    #[serde(default)]
    pub soa: SoaSettings,
    #[serde(default)]
    pub status: ZoneStatus,
}

fn default_ttl() -> u32 {
    DEFAULT_TTL
}

impl ZoneNode {
    pub fn master(id: ZoneId, name: impl Into<String>, domain: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id,
            filename: format!("db.{}", name),
            name,
            directory: String::new(),
            kind: ZoneKind::Master,
            domain: domain.into(),
            raw_content: String::new(),
            default_ttl: DEFAULT_TTL,
            soa: SoaSettings::default(),
            status: ZoneStatus::Active,
        }
    }

    pub fn include(id: ZoneId, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id,
            filename: format!("{}.inc", name),
            name,
            directory: String::new(),
            kind: ZoneKind::Include,
            domain: String::new(),
            raw_content: String::new(),
            default_ttl: DEFAULT_TTL,
            soa: SoaSettings::default(),
            status: ZoneStatus::Active,
        }
    }

    pub fn with_directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.raw_content = content.into();
        self
    }

    pub fn with_status(mut self, status: ZoneStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_master(&self) -> bool {
        self.kind == ZoneKind::Master
    }

    pub fn is_active(&self) -> bool {
        self.status == ZoneStatus::Active
    }
}

/// Ordered attachment of an include under a parent zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncludeEdge {
    pub parent_id: ZoneId,
    pub include_id: ZoneId,
    #[serde(default)]
    pub position: i32,
}

impl IncludeEdge {
    pub fn new(parent_id: ZoneId, include_id: ZoneId, position: i32) -> Self {
        Self {
            parent_id,
            include_id,
            position,
        }
    }
}
