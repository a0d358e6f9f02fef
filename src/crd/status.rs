//! # Conditions
//!
//! Status conditions in the shape used by every hub API, and the upsert
//! helper that keeps at most one condition per type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a condition (True, False, Unknown)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl ConditionStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition
    pub status: ConditionStatus,
    /// Last time the status changed (RFC3339)
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Machine-readable reason for the last transition
    #[serde(default)]
    pub reason: Option<String>,
    /// Human-readable message
    #[serde(default)]
    pub message: Option<String>,
}

impl Condition {
    /// Create a condition; the transition time is filled in by `set_status_condition`
    #[must_use]
    pub fn new(r#type: &str, status: ConditionStatus, reason: &str, message: &str) -> Self {
        Self {
            r#type: r#type.to_string(),
            status,
            last_transition_time: None,
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
        }
    }
}

/// Find the condition of the given type
#[must_use]
pub fn find_condition<'a>(conditions: &'a [Condition], r#type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == r#type)
}

/// Insert or update a condition, keyed by type
///
/// The transition time only moves when the status flips; reason and message
/// are always overwritten. Returns true if anything changed.
pub fn set_status_condition(conditions: &mut Vec<Condition>, new: Condition) -> bool {
    match conditions.iter_mut().find(|c| c.r#type == new.r#type) {
        Some(existing) => {
            let mut changed = false;
            if existing.status != new.status {
                existing.status = new.status;
                existing.last_transition_time = Some(
                    new.last_transition_time
                        .unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
                );
                changed = true;
            }
            if existing.reason != new.reason {
                existing.reason = new.reason;
                changed = true;
            }
            if existing.message != new.message {
                existing.message = new.message;
                changed = true;
            }
            changed
        }
        None => {
            let mut new = new;
            if new.last_transition_time.is_none() {
                new.last_transition_time = Some(chrono::Utc::now().to_rfc3339());
            }
            conditions.push(new);
            true
        }
    }
}
