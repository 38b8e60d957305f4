//! DashboardFeed - in-memory reader for a live dashboard

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use contracts::{ContractError, EventType, SafetyEvent};
use serde::Serialize;

use crate::EventSubscriber;

const DEFAULT_CAPACITY: usize = 50;

#[derive(Debug, Default)]
struct FeedState {
    recent: VecDeque<SafetyEvent>,
    counts: BTreeMap<EventType, u64>,
    total: u64,
}

/// Keeps the most recent events and per-type totals
#[derive(Debug)]
pub struct DashboardFeed {
    name: String,
    capacity: usize,
    state: Mutex<FeedState>,
}

/// Point-in-time copy of the feed
#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardSnapshot {
    /// Most recent events, oldest first
    pub recent: Vec<SafetyEvent>,
    pub counts: BTreeMap<EventType, u64>,
    pub total: u64,
}

impl DashboardFeed {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity: capacity.max(1),
            state: Mutex::new(FeedState::default()),
        }
    }

    /// Create from params map; `capacity` defaults to 50
    pub fn from_params(name: impl Into<String>, params: &HashMap<String, String>) -> Self {
        let capacity = params
            .get("capacity")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CAPACITY);
        Self::new(name, capacity)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        DashboardSnapshot {
            recent: state.recent.iter().cloned().collect(),
            counts: state.counts.clone(),
            total: state.total,
        }
    }
}

impl EventSubscriber for DashboardFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_event(&self, event: &SafetyEvent) -> Result<(), ContractError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.recent.len() == self.capacity {
            state.recent.pop_front();
        }
        state.recent.push_back(event.clone());
        *state.counts.entry(event.event_type).or_insert(0) += 1;
        state.total += 1;
        Ok(())
    }
}
