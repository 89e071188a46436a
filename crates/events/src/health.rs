use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Down,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Up => "UP",
            HealthStatus::Down => "DOWN",
        }
    }
}

/// Structured transport status.
///
/// Health is data: a down transport yields `status: Down`, never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub name: String,
    pub status: HealthStatus,
    /// Implementation-defined detail (topic, partition counts, last error, ...).
    pub details: BTreeMap<String, JsonValue>,
    pub checked_at: DateTime<Utc>,
}

impl Health {
    pub fn up(name: impl Into<String>) -> Self {
        Self::with_status(name, HealthStatus::Up)
    }

    pub fn down(name: impl Into<String>) -> Self {
        Self::with_status(name, HealthStatus::Down)
    }

    fn with_status(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
            details: BTreeMap::new(),
            checked_at: Utc::now(),
        }
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn is_up(&self) -> bool {
        self.status == HealthStatus::Up
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_status_in_uppercase() {
        let health = Health::down("memory").detail("reason", "closed");
        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["status"], "DOWN");
        assert_eq!(json["details"]["reason"], "closed");
        assert!(!health.is_up());
    }
}
