use chrono::{DateTime, Utc};
use serde::Serialize;

// ============================================================================
// Health Aggregation
// ============================================================================
//
// The store is required: if it is unreachable the service cannot read or
// write, so the system is unhealthy. The cache is optional: without it reads
// fall through to the store, so a cache outage only degrades the system.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
}

impl ComponentHealth {
    pub fn new(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
            last_check: Utc::now(),
        }
    }

    /// Required dependency: a failed check makes the component unhealthy.
    pub fn required(name: &str, check: Result<(), String>) -> Self {
        match check {
            Ok(()) => Self::new(name, HealthStatus::Healthy),
            Err(e) => Self::new(name, HealthStatus::Unhealthy(e)),
        }
    }

    /// Optional dependency: a failed check only degrades the component.
    pub fn optional(name: &str, check: Result<(), String>) -> Self {
        match check {
            Ok(()) => Self::new(name, HealthStatus::Healthy),
            Err(e) => Self::new(name, HealthStatus::Degraded(e)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub overall_status: HealthStatus,
    pub components: Vec<ComponentHealth>,
    pub check_time: DateTime<Utc>,
}

impl SystemHealth {
    pub fn from_components(components: Vec<ComponentHealth>) -> Self {
        Self {
            overall_status: overall_status(&components),
            components,
            check_time: Utc::now(),
        }
    }
}

fn overall_status(components: &[ComponentHealth]) -> HealthStatus {
    let mut has_degraded = false;
    let mut unhealthy = Vec::new();

    for component in components {
        match &component.status {
            HealthStatus::Unhealthy(msg) => unhealthy.push(format!("{}: {}", component.name, msg)),
            HealthStatus::Degraded(_) => has_degraded = true,
            HealthStatus::Healthy => {}
        }
    }

    if !unhealthy.is_empty() {
        HealthStatus::Unhealthy(unhealthy.join(", "))
    } else if has_degraded {
        HealthStatus::Degraded("Some components degraded".to_string())
    } else {
        HealthStatus::Healthy
    }
}
