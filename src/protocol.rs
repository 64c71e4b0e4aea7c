// =============================================================================
// OVERLAY COORDINATOR — protocol.rs
// Сообщения протокола (plaintext внутри Envelope)
// =============================================================================
//
// Каждое сообщение — JSON объект с полем "type":
//   attribute_update { peer_id, attributes }
//   query            { constraints, num_peers }
//   ack              {}
//   query_response   { peers }
//   honeypot         { message }
// =============================================================================

use crate::constants::{DEFAULT_NUM_PEERS, HONEYPOT_NOTICE};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const ATTR_UPLOAD_BANDWIDTH: &str = "upload_bandwidth";
pub const ATTR_DOWNLOAD_BANDWIDTH: &str = "download_bandwidth";
pub const ATTR_STORAGE: &str = "storage";
pub const ATTR_CPU: &str = "cpu";

fn default_num_peers() -> usize {
    DEFAULT_NUM_PEERS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    AttributeUpdate {
        peer_id: String,
        attributes: PeerAttributes,
    },
    Query {
        constraints: Constraints,
        #[serde(default = "default_num_peers")]
        num_peers: usize,
    },
    #[serde(alias = "ACK")]
    Ack,
    QueryResponse {
        peers: Vec<String>,
    },
    #[serde(rename = "honeypot", alias = "honeypot_notice")]
    HoneypotNotice {
        message: String,
    },
    /// Any `type` this coordinator does not know.
    #[serde(other)]
    Unknown,
}

impl Message {
    pub fn honeypot_notice() -> Self {
        Message::HoneypotNotice { message: HONEYPOT_NOTICE.to_string() }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Message::AttributeUpdate { .. } => "attribute_update",
            Message::Query { .. } => "query",
            Message::Ack => "ack",
            Message::QueryResponse { .. } => "query_response",
            Message::HoneypotNotice { .. } => "honeypot",
            Message::Unknown => "unknown",
        }
    }

    /// Typed view of an authenticated JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::protocol("message is not a JSON object"));
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

// -----------------------------------------------------------------------------
// PeerAttributes — последний отчёт пира о ресурсах
// -----------------------------------------------------------------------------

/// Resource attributes reported by one peer.
///
/// The four well-known attributes are optional on the wire so that a peer
/// that cannot measure one of them still reports the rest; any other numeric
/// attribute lands in `extra`. A constraint on an attribute the peer did not
/// report never matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerAttributes {
    /// KB/s
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_bandwidth: Option<f64>,
    /// KB/s
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_bandwidth: Option<f64>,
    /// GB free
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<f64>,
    /// percent, 0..100
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, f64>,
}

impl PeerAttributes {
    pub fn new(upload_bandwidth: f64, download_bandwidth: f64, storage: f64, cpu: f64) -> Self {
        PeerAttributes {
            upload_bandwidth: Some(upload_bandwidth),
            download_bandwidth: Some(download_bandwidth),
            storage: Some(storage),
            cpu: Some(cpu),
            extra: BTreeMap::new(),
        }
    }

    /// Sets any attribute by name, well-known or not.
    pub fn with(mut self, name: &str, value: f64) -> Self {
        match name {
            ATTR_UPLOAD_BANDWIDTH => self.upload_bandwidth = Some(value),
            ATTR_DOWNLOAD_BANDWIDTH => self.download_bandwidth = Some(value),
            ATTR_STORAGE => self.storage = Some(value),
            ATTR_CPU => self.cpu = Some(value),
            _ => {
                self.extra.insert(name.to_string(), value);
            }
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            ATTR_UPLOAD_BANDWIDTH => self.upload_bandwidth,
            ATTR_DOWNLOAD_BANDWIDTH => self.download_bandwidth,
            ATTR_STORAGE => self.storage,
            ATTR_CPU => self.cpu,
            other => self.extra.get(other).copied(),
        }
    }
}

// -----------------------------------------------------------------------------
// Constraints — минимальные требования запроса
// -----------------------------------------------------------------------------

/// Attribute name → minimum required value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Constraints(BTreeMap<String, f64>);

impl Constraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, min_value: f64) -> Self {
        self.0.insert(name.to_string(), min_value);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Every constrained attribute must be present, finite and `>=` its minimum.
    pub fn is_satisfied_by(&self, attrs: &PeerAttributes) -> bool {
        self.iter().all(|(name, min)| match attrs.get(name) {
            Some(value) => value.is_finite() && value >= min,
            None => false,
        })
    }
}

impl FromIterator<(String, f64)> for Constraints {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Constraints(iter.into_iter().collect())
    }
}
