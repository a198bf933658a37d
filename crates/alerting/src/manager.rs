//! Alert throttling
//!
//! Alerts are keyed by the endpoint that produced them. A key stays quiet
//! for `cooldown_seconds` after it fires, and no more than
//! `max_alerts_per_hour` warnings leave the process in any rolling hour.
//! Critical alerts are never held back, though they still fill the window.

use crate::Severity;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const HOUR: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Quiet period after a warning for the same key (seconds)
    pub cooldown_seconds: u64,
    /// Cap across all keys within a rolling hour
    pub max_alerts_per_hour: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 300,
            max_alerts_per_hour: 30,
        }
    }
}

/// Firing history of one key
#[derive(Debug, Clone)]
pub struct AlertState {
    pub last_fired: Instant,
    pub fire_count: usize,
    pub acknowledged: bool,
}

pub struct AlertManager {
    config: AlertConfig,
    states: HashMap<String, AlertState>,
    /// Fire times within the last hour, oldest first
    recent: VecDeque<Instant>,
}

impl AlertManager {
    pub fn new(config: AlertConfig) -> Self {
        info!(
            "Alert throttling: {}s cooldown, {} per hour",
            config.cooldown_seconds, config.max_alerts_per_hour
        );
        Self {
            config,
            states: HashMap::new(),
            recent: VecDeque::new(),
        }
    }

    /// Whether an alert for `key` may go out now.
    ///
    /// Critical alerts skip both the cooldown and the hourly cap.
    pub fn should_fire(&mut self, key: &str, severity: Severity) -> bool {
        self.expire_window();

        if severity == Severity::Critical {
            return true;
        }

        if self.recent.len() >= self.config.max_alerts_per_hour {
            warn!("Alert for {} dropped: hourly cap of {} reached", key, self.config.max_alerts_per_hour);
            return false;
        }

        let cooldown = Duration::from_secs(self.config.cooldown_seconds);
        match self.states.get(key) {
            Some(state) if state.last_fired.elapsed() < cooldown => {
                debug!("Alert for {} suppressed during cooldown", key);
                false
            }
            _ => true,
        }
    }

    pub fn record_fire(&mut self, key: &str) {
        let now = Instant::now();
        self.recent.push_back(now);

        let state = self
            .states
            .entry(key.to_string())
            .and_modify(|state| {
                state.last_fired = now;
                state.fire_count += 1;
                state.acknowledged = false;
            })
            .or_insert(AlertState {
                last_fired: now,
                fire_count: 1,
                acknowledged: false,
            });
        debug!("Alert for {} fired ({} total)", key, state.fire_count);
    }

    /// Mark `key` as seen by an operator; false if it never fired
    pub fn acknowledge(&mut self, key: &str) -> bool {
        self.states
            .get_mut(key)
            .map(|state| state.acknowledged = true)
            .is_some()
    }

    /// Keys that fired and were not acknowledged since
    pub fn pending(&self) -> Vec<(&str, &AlertState)> {
        self.states
            .iter()
            .filter(|(_, state)| !state.acknowledged)
            .map(|(key, state)| (key.as_str(), state))
            .collect()
    }

    pub fn hourly_count(&mut self) -> usize {
        self.expire_window();
        self.recent.len()
    }

    pub fn clear(&mut self) {
        self.states.clear();
        self.recent.clear();
    }

    fn expire_window(&mut self) {
        while let Some(oldest) = self.recent.front() {
            if oldest.elapsed() < HOUR {
                break;
            }
            self.recent.pop_front();
        }
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}
