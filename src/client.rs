// =============================================================================
// OVERLAY COORDINATOR — client.rs
// Сторона пира: отчёты об атрибутах и запросы к координатору
// =============================================================================
//
// Сбор метрик хоста (psutil-подобный) остаётся снаружи: пир передаёт
// AttributeSource, клиент только шифрует, отправляет и разбирает ответ.
// =============================================================================

use crate::constants::{DEFAULT_MAX_FRAME_BYTES, MAX_REPORT_BACKOFF_SECS};
use crate::envelope::{Envelope, EnvelopeCodec, SharedKey};
use crate::error::{Error, Result};
use crate::frame::{Frame, FrameCodec};
use crate::protocol::{Constraints, Message, PeerAttributes};
use futures::{SinkExt, StreamExt};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ack,
    Peers(Vec<String>),
    /// Coordinator diverted the request to its honeypot.
    Flagged(String),
}

impl Reply {
    /// Peer ids from a query reply; a honeypot notice becomes `Error::Flagged`.
    pub fn into_peers(self) -> Result<Vec<String>> {
        match self {
            Reply::Peers(peers) => Ok(peers),
            Reply::Flagged(notice) => Err(Error::Flagged(notice)),
            Reply::Ack => Err(Error::protocol("expected query_response, got ack")),
        }
    }
}

/// One request in flight at a time. After a missed reply or a transport
/// error the client is broken: a late reply could otherwise be read as the
/// answer to the next request, so every further call fails until the peer
/// reconnects.
pub struct PeerClient<S = TcpStream> {
    framed: Framed<S, FrameCodec>,
    codec: EnvelopeCodec,
    reply_timeout: Duration,
    broken: bool,
}

impl PeerClient<TcpStream> {
    pub async fn connect<A: ToSocketAddrs>(addr: A, key: &SharedKey) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Self::from_stream(stream, key)
    }
}

impl<S> PeerClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn from_stream(stream: S, key: &SharedKey) -> Result<Self> {
        Ok(PeerClient {
            framed: Framed::new(stream, FrameCodec::new(DEFAULT_MAX_FRAME_BYTES)),
            codec: EnvelopeCodec::new(key)?,
            reply_timeout: REPLY_TIMEOUT,
            broken: false,
        })
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub async fn report(&mut self, peer_id: &str, attributes: PeerAttributes) -> Result<Reply> {
        let msg = Message::AttributeUpdate { peer_id: peer_id.to_string(), attributes };
        self.request(&msg).await
    }

    pub async fn query(&mut self, constraints: Constraints, num_peers: usize) -> Result<Reply> {
        self.request(&Message::Query { constraints, num_peers }).await
    }

    pub async fn request(&mut self, message: &Message) -> Result<Reply> {
        let line = self.codec.seal(message)?.to_line()?;
        self.exchange(line).await
    }

    /// Sends an arbitrary JSON object, e.g. one carrying `size` / `frequency`.
    pub async fn request_value(&mut self, value: &serde_json::Value) -> Result<Reply> {
        let line = self.codec.seal_value(value)?.to_line()?;
        self.exchange(line).await
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    async fn exchange(&mut self, line: String) -> Result<Reply> {
        if self.broken {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "client must reconnect after a missed reply").into());
        }
        let reply = self.round_trip(line).await;
        if matches!(&reply, Err(e) if e.is_fatal_to_session()) {
            self.broken = true;
        }
        reply
    }

    async fn round_trip(&mut self, line: String) -> Result<Reply> {
        self.framed.send(line).await?;
        let frame = match tokio::time::timeout(self.reply_timeout, self.framed.next()).await {
            Err(_) => return Err(io::Error::new(io::ErrorKind::TimedOut, "no reply from coordinator").into()),
            Ok(None) => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "coordinator closed the connection").into()),
            Ok(Some(frame)) => frame?,
        };
        let line = match frame {
            Frame::Line(line) => line,
            Frame::Oversized => return Err(Error::protocol("reply exceeds frame limit")),
            Frame::Malformed => return Err(Error::protocol("reply is not UTF-8")),
        };
        match self.codec.open(&Envelope::from_line(&line)?)? {
            Message::Ack => Ok(Reply::Ack),
            Message::QueryResponse { peers } => Ok(Reply::Peers(peers)),
            Message::HoneypotNotice { message } => Ok(Reply::Flagged(message)),
            other => Err(Error::protocol(format!("unexpected reply type {}", other.type_name()))),
        }
    }
}

/// Samples the local host's resources for each report.
pub trait AttributeSource: Send {
    fn sample(&mut self) -> PeerAttributes;
}

impl<F> AttributeSource for F
where
    F: FnMut() -> PeerAttributes + Send,
{
    fn sample(&mut self) -> PeerAttributes {
        self()
    }
}

/// Reports attributes every `interval` until cancelled. A flagged report
/// doubles the wait (capped); an ack resets it. Transport errors end the loop.
pub async fn run_reporter<S, A>(
    client: &mut PeerClient<S>,
    peer_id: &str,
    source: &mut A,
    interval: Duration,
    cancel: CancellationToken,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    A: AttributeSource + ?Sized,
{
    let max_wait = Duration::from_secs(MAX_REPORT_BACKOFF_SECS).max(interval);
    let mut wait = interval;
    loop {
        if cancel.is_cancelled() {
            return Ok(());
        }
        match client.report(peer_id, source.sample()).await {
            Ok(Reply::Ack) => {
                log::debug!("📤 [{}] Attributes reported", peer_id);
                wait = interval;
            }
            Ok(Reply::Flagged(notice)) => {
                wait = (wait * 2).min(max_wait);
                log::warn!("🍯 [{}] Report flagged ({}), next in {:?}", peer_id, notice, wait);
            }
            Ok(other) => log::warn!("[{}] Unexpected reply to report: {:?}", peer_id, other),
            Err(e) if e.is_fatal_to_session() => return Err(e),
            Err(e) => log::warn!("[{}] Report failed: {}", peer_id, e),
        }
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(wait) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ClassificationFeatures, Classifier, Verdict};
    use crate::config::CoordinatorConfig;
    use crate::coordinator::Coordinator;
    use crate::session::Session;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::DuplexStream;

    fn connected(classifier: Classifier) -> (PeerClient<DuplexStream>, Arc<Coordinator>, CancellationToken) {
        let key = SharedKey::generate();
        let coordinator = Arc::new(
            Coordinator::new(CoordinatorConfig::default(), &key).unwrap().with_classifier(classifier),
        );
        let (client, server) = tokio::io::duplex(64 * 1024);
        let cancel = CancellationToken::new();
        let session = Session::new(server, "127.0.0.1:41000".parse().unwrap(), Arc::clone(&coordinator));
        tokio::spawn(session.run(cancel.clone()));
        (PeerClient::from_stream(client, &key).unwrap(), coordinator, cancel)
    }

    #[tokio::test]
    async fn test_report_and_query() {
        let (mut client, coordinator, _cancel) = connected(Classifier::permissive());
        assert_eq!(client.report("peer_1", PeerAttributes::new(100.0, 100.0, 40.0, 60.0)).await.unwrap(), Reply::Ack);
        assert_eq!(client.report("peer_2", PeerAttributes::new(100.0, 100.0, 40.0, 20.0)).await.unwrap(), Reply::Ack);
        assert_eq!(coordinator.store().len().unwrap(), 2);

        let reply = client.query(Constraints::new().with("cpu", 50.0), 5).await.unwrap();
        assert_eq!(reply, Reply::Peers(vec!["peer_1".into()]));
        let peers = client.query(Constraints::new().with("storage", 100.0), 5).await.unwrap().into_peers().unwrap();
        assert!(peers.is_empty());
    }

    #[tokio::test]
    async fn test_flagged_request() {
        let flag_big = Classifier::from_scorer(|f: &ClassificationFeatures| {
            if f.size > 1e4 { Verdict::Anomalous } else { Verdict::Normal }
        });
        let (mut client, _coordinator, _cancel) = connected(flag_big);
        let reply = client
            .request_value(&json!({"type": "query", "constraints": {}, "size": 1e6}))
            .await
            .unwrap();
        assert_eq!(reply, Reply::Flagged("Suspicious activity logged".into()));
        assert!(matches!(reply.into_peers(), Err(Error::Flagged(_))));
    }

    #[tokio::test]
    async fn test_no_reply_times_out() {
        let (client, _coordinator, _cancel) = connected(Classifier::permissive());
        let mut client = client.with_reply_timeout(Duration::from_millis(100));
        let err = client.request_value(&json!({"type": "ping"})).await.unwrap_err();
        assert!(err.is_fatal_to_session());
        assert!(client.is_broken());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_late_reply_is_never_taken_for_the_next_one() {
        let slow = Classifier::from_scorer(|f: &ClassificationFeatures| {
            if f.frequency > 1.0 {
                std::thread::sleep(Duration::from_millis(300));
            }
            Verdict::Normal
        });
        let (client, coordinator, _cancel) = connected(slow);
        let mut client = client.with_reply_timeout(Duration::from_millis(100));
        let slow_query = json!({"type": "query", "constraints": {}, "num_peers": 5, "frequency": 2.0});
        assert!(client.request_value(&slow_query).await.is_err());

        tokio::time::sleep(Duration::from_millis(400)).await;
        let err = client.report("late", PeerAttributes::new(1.0, 1.0, 1.0, 1.0)).await.unwrap_err();
        assert!(err.is_fatal_to_session());
        assert!(coordinator.store().get("late").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reporter_stops_on_cancel() {
        let (mut client, coordinator, _session_cancel) = connected(Classifier::permissive());
        let sampled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&sampled);
        let mut source = move || {
            counter.fetch_add(1, Ordering::SeqCst);
            PeerAttributes::new(1.0, 1.0, 1.0, 1.0)
        };
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            stopper.cancel();
        });
        run_reporter(&mut client, "reporter", &mut source, Duration::from_millis(20), cancel)
            .await
            .unwrap();
        assert!(sampled.load(Ordering::SeqCst) >= 2);
        assert!(coordinator.store().get("reporter").unwrap().is_some());
    }
}
