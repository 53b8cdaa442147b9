use serde::{Deserialize, Serialize};

/// Outcome of the safety battery. `reasons` deny, `flags` only inform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SafetyResult {
    pub allowed: bool,
    pub reasons: Vec<String>,
    pub flags: Vec<String>,
}

impl SafetyResult {
    pub fn from_checks(reasons: Vec<String>, flags: Vec<String>) -> Self {
        Self {
            allowed: reasons.is_empty(),
            reasons,
            flags,
        }
    }
}
