// =============================================================================
// OVERLAY COORDINATOR — store.rs
// Attribute Store: peer_id → последний отчёт
// =============================================================================
//
// Инварианты:
//   - не больше одной записи на peer_id
//   - новый отчёт полностью заменяет старый (без merge)
//   - удаления/TTL нет (известное ограничение)
// =============================================================================

use crate::error::{Error, Result};
use crate::matcher::QueryMatcher;
use crate::protocol::{Constraints, PeerAttributes};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::RwLock;

/// One peer's most recently reported resource state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub peer_id: String,
    pub attributes: PeerAttributes,
    pub last_updated: DateTime<Utc>,
}

/// Internally synchronised peer registry shared by all sessions.
///
/// Implementations must serialise `update` against readers; `scan` visits
/// records from one consistent snapshot and stops when the visitor breaks.
pub trait AttributeStore: Send + Sync {
    fn update(&self, peer_id: &str, attributes: PeerAttributes) -> Result<()>;

    fn scan(&self, visit: &mut dyn FnMut(&PeerRecord) -> ControlFlow<()>) -> Result<()>;

    fn get(&self, peer_id: &str) -> Result<Option<PeerRecord>>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn snapshot(&self) -> Result<Vec<PeerRecord>> {
        let mut out = Vec::new();
        self.scan(&mut |record| {
            out.push(record.clone());
            ControlFlow::Continue(())
        })?;
        Ok(out)
    }

    fn query(&self, constraints: &Constraints, limit: usize) -> Result<Vec<String>> {
        QueryMatcher::select(self, constraints, limit)
    }
}

/// In-process store. Records are scanned in ascending peer id order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, PeerRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AttributeStore for MemoryStore {
    fn update(&self, peer_id: &str, attributes: PeerAttributes) -> Result<()> {
        let record = PeerRecord {
            peer_id: peer_id.to_string(),
            attributes,
            last_updated: Utc::now(),
        };
        let mut records = self.records.write().map_err(|_| Error::StoreContention("attribute store poisoned"))?;
        records.insert(peer_id.to_string(), record);
        Ok(())
    }

    fn scan(&self, visit: &mut dyn FnMut(&PeerRecord) -> ControlFlow<()>) -> Result<()> {
        let records = self.records.read().map_err(|_| Error::StoreContention("attribute store poisoned"))?;
        for record in records.values() {
            if visit(record).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn get(&self, peer_id: &str) -> Result<Option<PeerRecord>> {
        let records = self.records.read().map_err(|_| Error::StoreContention("attribute store poisoned"))?;
        Ok(records.get(peer_id).cloned())
    }

    fn len(&self) -> Result<usize> {
        let records = self.records.read().map_err(|_| Error::StoreContention("attribute store poisoned"))?;
        Ok(records.len())
    }
}
