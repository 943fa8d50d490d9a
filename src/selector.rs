//! # Label Selectors
//!
//! Equality-based label selector parsing and client-side matching.
//!
//! Selector strings follow the `kubectl -l` format: comma-separated
//! requirements of the form `key=value`, `key==value`, `key!=value`,
//! `key` (exists), or `!key` (does not exist). The same string is passed
//! verbatim to the API server for server-side filtering where possible;
//! client-side matching is needed for the namespace selector cache, which
//! admits a namespace when *any* configured selector matches.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A single selector requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// `key=value` / `key==value`
    Equal(String, String),
    /// `key!=value`
    NotEqual(String, String),
    /// `key`
    Exists(String),
    /// `!key`
    DoesNotExist(String),
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Requirement::Equal(key, value) => labels.get(key) == Some(value),
            Requirement::NotEqual(key, value) => labels.get(key) != Some(value),
            Requirement::Exists(key) => labels.contains_key(key),
            Requirement::DoesNotExist(key) => !labels.contains_key(key),
        }
    }
}

/// A parsed label selector; all requirements must hold (AND semantics).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
    raw: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseSelectorError {
    #[error("empty requirement in selector {0:?}")]
    EmptyRequirement(String),
    #[error("invalid requirement {0:?}: empty key")]
    EmptyKey(String),
    #[error("invalid requirement {0:?}: empty value")]
    EmptyValue(String),
}

impl Selector {
    /// An empty selector matches every label set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Evaluate the selector against a label map.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }

    /// The original selector string, suitable for server-side `labelSelector`
    /// query parameters.
    #[must_use]
    pub fn as_query(&self) -> &str {
        &self.raw
    }
}

impl FromStr for Selector {
    type Err = ParseSelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim().to_string();
        let mut requirements = Vec::new();
        if raw.is_empty() {
            return Ok(Selector { requirements, raw });
        }
        for part in raw.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(ParseSelectorError::EmptyRequirement(raw.clone()));
            }
            let requirement = if let Some((key, value)) = part.split_once("!=") {
                require_key_value(part, key, value, Requirement::NotEqual)?
            } else if let Some((key, value)) = part.split_once("==") {
                require_key_value(part, key, value, Requirement::Equal)?
            } else if let Some((key, value)) = part.split_once('=') {
                require_key_value(part, key, value, Requirement::Equal)?
            } else if let Some(key) = part.strip_prefix('!') {
                let key = key.trim();
                if key.is_empty() {
                    return Err(ParseSelectorError::EmptyKey(part.to_string()));
                }
                Requirement::DoesNotExist(key.to_string())
            } else {
                Requirement::Exists(part.to_string())
            };
            requirements.push(requirement);
        }
        Ok(Selector { requirements, raw })
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn require_key_value(
    part: &str,
    key: &str,
    value: &str,
    build: fn(String, String) -> Requirement,
) -> Result<Requirement, ParseSelectorError> {
    let key = key.trim();
    let value = value.trim();
    if key.is_empty() {
        return Err(ParseSelectorError::EmptyKey(part.to_string()));
    }
    if value.is_empty() {
        return Err(ParseSelectorError::EmptyValue(part.to_string()));
    }
    Ok(build(key.to_string(), value.to_string()))
}
