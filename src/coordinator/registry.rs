//! Registry of replica endpoints the coordinator believes are reachable.
//!
//! Broadcasts go to every registered tab. A failed send prunes the tab;
//! `contentScriptReady`, tab updates and activations register it again.
//! Every sign of life bumps the tab's generation, so a failure report for a
//! send made to an older generation never prunes a replica that came back.

use crate::protocol::{ReplicaCommand, TabId};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplicaEntry {
    /// The replica in this tab has announced itself since its last load.
    pub ready: bool,
    /// Push held back until the replica announces readiness.
    pub pending: Option<ReplicaCommand>,
    pub generation: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ReplicaRegistry {
    entries: BTreeMap<TabId, ReplicaEntry>,
    next_generation: u64,
}

impl ReplicaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&mut self, tab: TabId) -> &mut ReplicaEntry {
        self.next_generation += 1;
        let entry = self.entries.entry(tab).or_default();
        entry.generation = self.next_generation;
        entry
    }

    /// Register `tab` if unknown. Readiness and pending pushes are kept.
    pub fn touch(&mut self, tab: TabId) {
        self.bump(tab);
    }

    /// Record a readiness announcement, returning any push it supersedes.
    pub fn mark_ready(&mut self, tab: TabId) -> Option<ReplicaCommand> {
        let entry = self.bump(tab);
        entry.ready = true;
        entry.pending.take()
    }

    /// The tab started loading a new document: its old replica is gone.
    pub fn mark_loading(&mut self, tab: TabId) {
        let entry = self.entries.entry(tab).or_default();
        entry.ready = false;
        entry.pending = None;
    }

    pub fn is_ready(&self, tab: TabId) -> bool {
        self.entries.get(&tab).is_some_and(|e| e.ready)
    }

    pub fn defer(&mut self, tab: TabId, command: ReplicaCommand) {
        self.entries.entry(tab).or_default().pending = Some(command);
    }

    pub fn take_pending(&mut self, tab: TabId) -> Option<ReplicaCommand> {
        self.entries.get_mut(&tab).and_then(|e| e.pending.take())
    }

    pub fn clear_pending(&mut self) {
        for entry in self.entries.values_mut() {
            entry.pending = None;
        }
    }

    pub fn prune(&mut self, tab: TabId) -> bool {
        self.entries.remove(&tab).is_some()
    }

    /// Current generation of `tab`, 0 when unregistered.
    pub fn generation(&self, tab: TabId) -> u64 {
        self.entries.get(&tab).map_or(0, |e| e.generation)
    }

    /// Prune `tab` only if nothing was heard from it since `generation`.
    pub fn prune_stale(&mut self, tab: TabId, generation: u64) -> bool {
        match self.entries.get(&tab) {
            Some(entry) if entry.generation == generation => self.prune(tab),
            _ => false,
        }
    }

    pub fn contains(&self, tab: TabId) -> bool {
        self.entries.contains_key(&tab)
    }

    pub fn get(&self, tab: TabId) -> Option<&ReplicaEntry> {
        self.entries.get(&tab)
    }

    pub fn tabs(&self) -> Vec<TabId> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
