//! Health projection from a list of status conditions.
//!
//! Precedence is resolved by condition type, never by list order:
//!
//! 1. `Ready`: `True` → ready, anything else → not ready
//! 2. `Healthy`: `True` → healthy, anything else → unhealthy
//! 3. Neither present: a non-empty heartbeat timestamp → connected,
//!    otherwise unknown
//!
//! Every place that displays health goes through [`project`]; it is total and
//! never fails.

use serde::{Deserialize, Serialize};

use crate::model::Condition;

pub const READY_CONDITION: &str = "Ready";
pub const HEALTHY_CONDITION: &str = "Healthy";

/// Which tier of the projection produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Ready,
    NotReady,
    Healthy,
    Unhealthy,
    Connected,
    Unknown,
}

/// Display class consumed by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    Success,
    Error,
    Pending,
}

/// Icon hint consumed by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusIcon {
    Connected,
    Disconnected,
    Hint,
}

/// Three-valued health projection with its display hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct HealthProjection {
    pub state: HealthState,
    pub label: &'static str,
    pub class: StatusClass,
    pub icon: StatusIcon,
}

impl HealthProjection {
    #[must_use]
    pub const fn from_state(state: HealthState) -> Self {
        let (label, class, icon) = match state {
            HealthState::Ready => ("Ready", StatusClass::Success, StatusIcon::Connected),
            HealthState::NotReady => ("Not Ready", StatusClass::Error, StatusIcon::Disconnected),
            HealthState::Healthy => ("Healthy", StatusClass::Success, StatusIcon::Connected),
            HealthState::Unhealthy => ("Unhealthy", StatusClass::Error, StatusIcon::Disconnected),
            HealthState::Connected => ("Connected", StatusClass::Success, StatusIcon::Connected),
            HealthState::Unknown => ("Unknown", StatusClass::Pending, StatusIcon::Hint),
        };
        Self {
            state,
            label,
            class,
            icon,
        }
    }

    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self.class, StatusClass::Success)
    }
}

/// Project `conditions` (plus an optional heartbeat) onto a health state.
#[must_use]
pub fn project(conditions: &[Condition], last_heartbeat: Option<&str>) -> HealthProjection {
    let state = if let Some(ready) = find(conditions, READY_CONDITION) {
        if ready.is_true() {
            HealthState::Ready
        } else {
            HealthState::NotReady
        }
    } else if let Some(healthy) = find(conditions, HEALTHY_CONDITION) {
        if healthy.is_true() {
            HealthState::Healthy
        } else {
            HealthState::Unhealthy
        }
    } else if last_heartbeat.is_some_and(|ts| !ts.is_empty()) {
        HealthState::Connected
    } else {
        HealthState::Unknown
    };
    HealthProjection::from_state(state)
}

fn find<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions
        .iter()
        .find(|c| c.condition_type == condition_type)
}
