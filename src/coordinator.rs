// =============================================================================
// OVERLAY COORDINATOR — coordinator.rs
// Общие сервисы всех сессий + счётчики
// =============================================================================
//
// Coordinator не содержит статического состояния: store, classifier,
// honeypot и ключ инжектятся при создании и раздаются сессиям через Arc.
// =============================================================================

use crate::classifier::Classifier;
use crate::config::CoordinatorConfig;
use crate::envelope::{EnvelopeCodec, SharedKey};
use crate::error::Result;
use crate::honeypot::{HoneypotSink, LogHoneypot};
use crate::store::{AttributeStore, MemoryStore};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Default)]
pub struct CoordinatorStats {
    sessions_opened: AtomicU64,
    sessions_active: AtomicU64,
    frames_received: AtomicU64,
    frames_rejected: AtomicU64,
    diversions: AtomicU64,
    updates: AtomicU64,
    queries: AtomicU64,
    unknown_messages: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub sessions_opened: u64,
    pub sessions_active: u64,
    pub frames_received: u64,
    pub frames_rejected: u64,
    pub diversions: u64,
    pub updates: u64,
    pub queries: u64,
    pub unknown_messages: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl CoordinatorStats {
    pub(crate) fn session_opened(&self) {
        bump(&self.sessions_opened);
        bump(&self.sessions_active);
    }

    pub(crate) fn session_closed(&self) {
        self.sessions_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_received(&self) {
        bump(&self.frames_received);
    }

    pub(crate) fn frame_rejected(&self) {
        bump(&self.frames_rejected);
    }

    pub(crate) fn diverted(&self) {
        bump(&self.diversions);
    }

    pub(crate) fn updated(&self) {
        bump(&self.updates);
    }

    pub(crate) fn queried(&self) {
        bump(&self.queries);
    }

    pub(crate) fn unknown(&self) {
        bump(&self.unknown_messages);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            sessions_opened: get(&self.sessions_opened),
            sessions_active: get(&self.sessions_active),
            frames_received: get(&self.frames_received),
            frames_rejected: get(&self.frames_rejected),
            diversions: get(&self.diversions),
            updates: get(&self.updates),
            queries: get(&self.queries),
            unknown_messages: get(&self.unknown_messages),
        }
    }
}

pub struct Coordinator {
    config: CoordinatorConfig,
    codec: EnvelopeCodec,
    classifier: Classifier,
    store: Arc<dyn AttributeStore>,
    honeypot: Arc<dyn HoneypotSink>,
    stats: CoordinatorStats,
    started_at: Instant,
}

impl Coordinator {
    /// In-memory store, permissive classifier and logging honeypot until replaced.
    pub fn new(config: CoordinatorConfig, key: &SharedKey) -> Result<Self> {
        Ok(Coordinator {
            config,
            codec: EnvelopeCodec::new(key)?,
            classifier: Classifier::permissive(),
            store: Arc::new(MemoryStore::new()),
            honeypot: Arc::new(LogHoneypot),
            stats: CoordinatorStats::default(),
            started_at: Instant::now(),
        })
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn AttributeStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_honeypot(mut self, honeypot: Arc<dyn HoneypotSink>) -> Self {
        self.honeypot = honeypot;
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn codec(&self) -> &EnvelopeCodec {
        &self.codec
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn store(&self) -> &dyn AttributeStore {
        self.store.as_ref()
    }

    pub fn honeypot(&self) -> &dyn HoneypotSink {
        self.honeypot.as_ref()
    }

    pub fn stats(&self) -> &CoordinatorStats {
        &self.stats
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PeerAttributes;

    #[test]
    fn test_defaults_and_overrides() {
        let store = Arc::new(MemoryStore::new());
        store.update("pre", PeerAttributes::default()).unwrap();
        let c = Coordinator::new(CoordinatorConfig::default(), &SharedKey::generate())
            .unwrap()
            .with_store(store);
        assert_eq!(c.store().len().unwrap(), 1);
        assert_eq!(c.stats().snapshot().frames_received, 0);
    }

    #[test]
    fn test_session_counters() {
        let stats = CoordinatorStats::default();
        stats.session_opened();
        stats.session_opened();
        stats.session_closed();
        let snap = stats.snapshot();
        assert_eq!(snap.sessions_opened, 2);
        assert_eq!(snap.sessions_active, 1);
    }
}
