use serde::{Deserialize, Serialize};

/// Reported state of one backend dependency (or of the backend as a whole).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Up,
    Down,
    /// Only used by the aggregate `status` field (some services down).
    Degraded,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Health payload of the backend `/health/` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub mongodb: ServiceState,
    #[serde(default)]
    pub redis: ServiceState,
    #[serde(default)]
    pub anthropic: ServiceState,
    #[serde(default)]
    pub status: ServiceState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mongodb_details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_details: Option<String>,
}

impl HealthStatus {
    /// Presented when the backend could not be reached at all.
    pub fn all_down() -> Self {
        Self {
            mongodb: ServiceState::Down,
            redis: ServiceState::Down,
            anthropic: ServiceState::Down,
            status: ServiceState::Down,
            mongodb_details: None,
            redis_details: None,
        }
    }

    pub fn components(&self) -> [(&'static str, ServiceState); 3] {
        [
            ("mongodb", self.mongodb),
            ("redis", self.redis),
            ("anthropic", self.anthropic),
        ]
    }

    /// Readiness predicate used by the health poll: every dependency is up.
    pub fn all_up(&self) -> bool {
        self.components()
            .iter()
            .all(|(_, state)| *state == ServiceState::Up)
    }

    pub fn not_up(&self) -> Vec<&'static str> {
        self.components()
            .iter()
            .filter(|(_, state)| *state != ServiceState::Up)
            .map(|(name, _)| *name)
            .collect()
    }
}
