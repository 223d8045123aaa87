//! Result handles
//!
//! Finished outcomes keyed by request id. Each request gets its own entry, so
//! concurrent requests never overwrite each other's results. The store holds
//! at most `capacity` outcomes; inserting past that evicts the oldest.

use super::PipelineOutcome;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_RESULT_CAPACITY: usize = 1024;

pub struct ResultStore {
    results: DashMap<Uuid, Arc<PipelineOutcome>>,
    /// Insertion order, oldest first
    order: Mutex<VecDeque<Uuid>>,
    capacity: usize,
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RESULT_CAPACITY)
    }

    /// A capacity of zero keeps nothing; `Pipeline::run` still returns the outcome.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            results: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn insert(&self, outcome: PipelineOutcome) -> Arc<PipelineOutcome> {
        let outcome = Arc::new(outcome);
        if self.capacity == 0 {
            return outcome;
        }

        let mut order = self.order.lock().unwrap_or_else(|e| e.into_inner());
        if self
            .results
            .insert(outcome.request_id, Arc::clone(&outcome))
            .is_none()
        {
            order.push_back(outcome.request_id);
        }
        while self.results.len() > self.capacity {
            let Some(oldest) = order.pop_front() else { break };
            if self.results.remove(&oldest).is_some() {
                debug!("Evicted stored result {}", oldest);
            }
        }
        outcome
    }

    pub fn get(&self, request_id: &Uuid) -> Option<Arc<PipelineOutcome>> {
        self.results.get(request_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, request_id: &Uuid) -> Option<Arc<PipelineOutcome>> {
        let mut order = self.order.lock().unwrap_or_else(|e| e.into_inner());
        let removed = self.results.remove(request_id).map(|(_, outcome)| outcome);
        if removed.is_some() {
            order.retain(|id| id != request_id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
