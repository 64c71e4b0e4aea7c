// =============================================================================
// OVERLAY COORDINATOR — honeypot.rs
// Hand-off к внешнему honeypot: (адрес пира, сообщение-нарушитель)
// =============================================================================
//
// Сам honeypot (accept / log / canned ack) живёт снаружи.
// Координатор только передаёт ему диверсию и не ждёт ответа.
// =============================================================================

use crate::constants::HONEYPOT_QUEUE_CAPACITY;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

/// One flagged message handed to the honeypot.
#[derive(Debug, Clone, Serialize)]
pub struct Diversion {
    pub peer: SocketAddr,
    pub session_id: String,
    pub message: serde_json::Value,
    pub at: DateTime<Utc>,
}

/// External honeypot collaborator. `divert` must return without waiting.
pub trait HoneypotSink: Send + Sync {
    fn divert(&self, diversion: Diversion);
}

/// Logs every diversion at warn level.
#[derive(Debug, Default, Clone)]
pub struct LogHoneypot;

impl HoneypotSink for LogHoneypot {
    fn divert(&self, d: Diversion) {
        log::warn!("🍯 [{}] Redirected {} to honeypot for: {}", d.session_id, d.peer, d.message);
    }
}

/// Forwards diversions to an in-process consumer (e.g. a honeypot engine task).
/// The queue is bounded: when the consumer falls behind, new diversions are
/// dropped and counted instead of buffered.
#[derive(Debug, Clone)]
pub struct ChannelHoneypot {
    tx: mpsc::Sender<Diversion>,
    dropped: Arc<AtomicU64>,
}

impl ChannelHoneypot {
    pub fn new() -> (Self, mpsc::Receiver<Diversion>) {
        Self::with_capacity(HONEYPOT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<Diversion>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (ChannelHoneypot { tx, dropped: Arc::new(AtomicU64::new(0)) }, rx)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl HoneypotSink for ChannelHoneypot {
    fn divert(&self, d: Diversion) {
        let peer = d.peer;
        match self.tx.try_send(d) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!("🍯 honeypot queue full, diversion from {} dropped", peer);
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!("🍯 honeypot consumer gone, diversion from {} dropped", peer);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn diversion() -> Diversion {
        Diversion {
            peer: "127.0.0.1:4000".parse().unwrap(),
            session_id: "s-1".into(),
            message: json!({"type": "query", "size": 1e9}),
            at: Utc::now(),
        }
    }

    #[test]
    fn test_channel_delivers() {
        let (sink, mut rx) = ChannelHoneypot::new();
        sink.divert(diversion());
        let got = rx.try_recv().unwrap();
        assert_eq!(got.session_id, "s-1");
        assert_eq!(got.message["size"], json!(1e9));
    }

    #[test]
    fn test_closed_channel_does_not_panic() {
        let (sink, rx) = ChannelHoneypot::new();
        drop(rx);
        sink.divert(diversion());
        assert_eq!(sink.dropped(), 1);
        LogHoneypot.divert(diversion());
    }

    #[test]
    fn test_full_queue_drops_instead_of_growing() {
        let (sink, mut rx) = ChannelHoneypot::with_capacity(2);
        for _ in 0..5 {
            sink.divert(diversion());
        }
        assert_eq!(sink.dropped(), 3);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());

        sink.divert(diversion());
        assert!(rx.try_recv().is_ok());
        assert_eq!(sink.dropped(), 3);
    }
}
