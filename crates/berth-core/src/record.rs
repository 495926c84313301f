//! Application records and their bus-facing property payloads.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::BusConfig;

/// Stable, store-assigned application identity. Never changes after creation
/// and never dangles, which makes it safe to retain across suspension points
/// where an object reference would not be.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppId(String);

impl AppId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AppId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// One installed application as reported by the store.
///
/// Identity (`app_id`) is immutable; a record is never mutated to represent
/// a different application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub app_id: AppId,
    pub path: PathBuf,
}

impl ApplicationRecord {
    pub fn new(app_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            app_id: AppId::new(app_id),
            path: path.into(),
        }
    }
}

/// Dynamically typed property value, serialized with explicit tagging so
/// heterogeneous payloads survive the wire without guessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Path(PathBuf),
    StrList(Vec<String>),
}

/// Property name to value, per interface.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// Interface name to its property mapping.
pub type InterfaceMap = BTreeMap<String, PropertyMap>;

/// Derive the bus object path for an application id.
///
/// Deterministic and stable for the object's lifetime. Ids are sanitized so
/// a store-assigned id can never escape the manager's path namespace.
pub fn object_path_for(app_id: &AppId) -> String {
    let sanitized: String = app_id
        .as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}/{}", BusConfig::MANAGER_PATH, sanitized)
}
