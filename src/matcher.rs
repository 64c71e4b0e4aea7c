// =============================================================================
// OVERLAY COORDINATOR — matcher.rs
// Query Matcher: выбор пиров по минимальным требованиям
// =============================================================================

use crate::error::Result;
use crate::protocol::Constraints;
use crate::store::AttributeStore;
use std::ops::ControlFlow;

pub struct QueryMatcher;

impl QueryMatcher {
    /// Short-circuiting linear scan: returns the first `limit` peers (in the
    /// store's scan order) whose attributes satisfy every constraint.
    /// This is not a ranking; nothing beyond "first found" is promised.
    pub fn select<S>(store: &S, constraints: &Constraints, limit: usize) -> Result<Vec<String>>
    where
        S: AttributeStore + ?Sized,
    {
        let mut matched = Vec::with_capacity(limit.min(64));
        if limit == 0 {
            return Ok(matched);
        }
        store.scan(&mut |record| {
            if constraints.is_satisfied_by(&record.attributes) {
                matched.push(record.peer_id.clone());
                if matched.len() >= limit {
                    return ControlFlow::Break(());
                }
            }
            ControlFlow::Continue(())
        })?;
        Ok(matched)
    }
}
