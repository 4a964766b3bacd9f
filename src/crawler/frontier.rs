//! Frontier of search prefixes
//!
//! This module handles:
//! - The FIFO queue of prefixes waiting for a worker
//! - The seen-set: every prefix ever queued, in flight, or finished
//! - Lifecycle bookkeeping (Queued -> InFlight -> Completed/Expanded/Failed)
//! - Rebuilding the frontier of an interrupted run
//!
//! The frontier has exactly one owner (the coordinator), so `add_if_absent`
//! is atomic without any lock.

use crate::prefix::Prefix;
use crate::state::PrefixState;
use crate::storage::FrontierEntry;
use crate::SweepError;
use std::collections::{HashMap, VecDeque};

/// Queue of prefixes to crawl plus the dedup set
#[derive(Debug, Default)]
pub struct Frontier {
    /// Prefixes waiting to be dispatched, in insertion order
    queue: VecDeque<Prefix>,

    /// Seen-set with each prefix's lifecycle state
    states: HashMap<Prefix, PrefixState>,

    /// Insertion order of the seen-set (for persistence)
    order: Vec<Prefix>,

    /// Number of prefixes currently handed to workers
    in_flight: usize,

    /// Number of dispatches made by this frontier
    dispatched: usize,
}

impl Frontier {
    /// Creates an empty frontier
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a frontier holding the seed prefixes
    ///
    /// Duplicate seeds are dropped.
    pub fn seeded(seeds: impl IntoIterator<Item = Prefix>) -> Self {
        let mut frontier = Self::new();
        frontier.extend(seeds);
        frontier
    }

    /// Rebuilds the frontier of an interrupted run
    ///
    /// Terminal prefixes stay in the seen-set only. Prefixes that were queued
    /// or in flight when the run stopped are queued again.
    ///
    /// # Arguments
    ///
    /// * `entries` - Every prefix the run had seen, in insertion order
    pub fn restore(entries: impl IntoIterator<Item = (Prefix, PrefixState)>) -> Self {
        let mut frontier = Self::new();

        for (prefix, state) in entries {
            if frontier.states.contains_key(&prefix) {
                continue;
            }

            let state = if state.is_active() {
                frontier.queue.push_back(prefix.clone());
                PrefixState::Queued
            } else {
                state
            };

            frontier.order.push(prefix.clone());
            frontier.states.insert(prefix, state);
        }

        frontier
    }

    /// Queues a prefix unless it has been seen before
    ///
    /// # Returns
    ///
    /// `true` if the prefix was new and is now queued
    pub fn add_if_absent(&mut self, prefix: Prefix) -> bool {
        if self.states.contains_key(&prefix) {
            return false;
        }

        self.states.insert(prefix.clone(), PrefixState::Queued);
        self.order.push(prefix.clone());
        self.queue.push_back(prefix);
        true
    }

    /// Queues every unseen prefix
    ///
    /// # Returns
    ///
    /// The prefixes that were actually added, in order
    pub fn extend(&mut self, prefixes: impl IntoIterator<Item = Prefix>) -> Vec<Prefix> {
        prefixes
            .into_iter()
            .filter(|p| self.add_if_absent(p.clone()))
            .collect()
    }

    /// Takes the next prefix for dispatch and marks it in flight
    ///
    /// # Returns
    ///
    /// * `Ok(Some(prefix))` - A prefix to hand to a worker
    /// * `Ok(None)` - Nothing is queued
    /// * `Err(SweepError::InvariantViolation)` - A queued prefix was already dispatched
    pub fn next_prefix(&mut self) -> Result<Option<Prefix>, SweepError> {
        let Some(prefix) = self.queue.pop_front() else {
            return Ok(None);
        };

        self.transition(&prefix, PrefixState::InFlight)?;
        self.in_flight += 1;
        self.dispatched += 1;
        Ok(Some(prefix))
    }

    /// Records the terminal state of a drained prefix
    pub fn complete(&mut self, prefix: &Prefix, state: PrefixState) -> Result<(), SweepError> {
        if !state.is_terminal() {
            return Err(SweepError::InvariantViolation(format!(
                "prefix '{}' cannot finish in active state {}",
                prefix, state
            )));
        }

        self.transition(prefix, state)?;
        self.in_flight -= 1;
        Ok(())
    }

    fn transition(&mut self, prefix: &Prefix, next: PrefixState) -> Result<(), SweepError> {
        let Some(current) = self.states.get_mut(prefix) else {
            return Err(SweepError::InvariantViolation(format!(
                "prefix '{}' is not in the frontier",
                prefix
            )));
        };

        if !current.can_transition_to(next) {
            if next == PrefixState::InFlight {
                return Err(SweepError::InvariantViolation(format!(
                    "prefix '{}' dispatched twice (state {})",
                    prefix, current
                )));
            }
            return Err(SweepError::InvalidTransition {
                from: *current,
                to: next,
            });
        }

        *current = next;
        Ok(())
    }

    /// True when nothing is queued and nothing is in flight
    pub fn is_exhausted(&self) -> bool {
        self.queue.is_empty() && self.in_flight == 0
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight
    }

    /// Number of distinct prefixes ever seen
    pub fn seen_count(&self) -> usize {
        self.states.len()
    }

    pub fn dispatched_count(&self) -> usize {
        self.dispatched
    }

    pub fn contains(&self, prefix: &Prefix) -> bool {
        self.states.contains_key(prefix)
    }

    pub fn state_of(&self, prefix: &Prefix) -> Option<PrefixState> {
        self.states.get(prefix).copied()
    }

    /// Snapshot of the seen-set for persistence, in insertion order
    pub fn entries(&self) -> Vec<FrontierEntry> {
        self.order
            .iter()
            .filter_map(|p| {
                self.states.get(p).map(|state| FrontierEntry {
                    prefix: p.as_str().to_string(),
                    state: *state,
                })
            })
            .collect()
    }
}
