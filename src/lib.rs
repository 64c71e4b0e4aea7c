// =============================================================================
// OVERLAY COORDINATOR — lib.rs
// =============================================================================
//
// Координатор оверлей-сети: пиры шлют зашифрованные отчёты о ресурсах
// и запросы на подбор соседей; аномальные сообщения уходят в honeypot.
//
//   Listener → Session ─┬─ Envelope (AES-GCM) → Message
//                       ├─ Classifier (IsolationForest)
//                       ├─ AttributeStore + QueryMatcher
//                       └─ HoneypotSink
// =============================================================================

pub mod api;
pub mod classifier;
pub mod client;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod envelope;
pub mod error;
pub mod frame;
pub mod honeypot;
pub mod isolation;
pub mod listener;
pub mod matcher;
pub mod protocol;
pub mod session;
pub mod store;

pub use classifier::{Classifier, Verdict};
pub use config::CoordinatorConfig;
pub use coordinator::Coordinator;
pub use envelope::SharedKey;
pub use error::{Error, Result};
pub use listener::Listener;
pub use protocol::{Constraints, Message, PeerAttributes};
