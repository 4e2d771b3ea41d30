//! Bounded table of requests waiting on a worker reply

use std::collections::HashMap;
use std::sync::Weak;
use std::time::{Duration, Instant};

use shared::{process_debug, CallerReply, Operation, ProcessId, ReplyOutcome, WorkerId};

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::traits::ReplySink;

/// Outcome of routing a reply to its caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The caller received the reply
    Delivered,
    /// The entry existed but its caller is gone; the reply was discarded
    Detached,
    /// The entry was removed without a reply under the drop failure policy
    Dropped,
    /// No pending entry carries this id
    Unknown,
}

/// One admitted request
struct PendingEntry {
    caller: Weak<dyn ReplySink>,
    worker: WorkerId,
    operation: Operation,
    admitted_at: Instant,
}

/// Deliver `outcome` to a caller if it is still listening
pub(crate) fn deliver(caller: &Weak<dyn ReplySink>, id: &str, outcome: ReplyOutcome) -> Resolution {
    match caller.upgrade() {
        Some(sink) if !sink.is_detached() => {
            sink.deliver(CallerReply::new(id, outcome));
            Resolution::Delivered
        }
        _ => {
            process_debug!(ProcessId::current(), "Caller for {} is gone, discarding reply", id);
            Resolution::Detached
        }
    }
}

/// Map from request id to the caller waiting on it.
///
/// Never holds more than `capacity` entries and never holds two entries for
/// the same id. Each entry is removed the first time it is resolved, so a
/// caller sees at most one reply per id.
pub struct PendingRequestTable {
    entries: HashMap<String, PendingEntry>,
    capacity: usize,
}

impl PendingRequestTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Record a request offloaded to `worker`
    pub fn admit(
        &mut self,
        id: &str,
        operation: Operation,
        worker: WorkerId,
        caller: Weak<dyn ReplySink>,
    ) -> CoordinatorResult<()> {
        if self.is_full() {
            return Err(CoordinatorError::PendingFull {
                capacity: self.capacity,
            });
        }
        if self.entries.contains_key(id) {
            return Err(CoordinatorError::DuplicateRequest { id: id.to_string() });
        }

        self.entries.insert(
            id.to_string(),
            PendingEntry {
                caller,
                worker,
                operation,
                admitted_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Remove the entry for `id` and hand `outcome` to its caller
    pub fn resolve(&mut self, id: &str, outcome: ReplyOutcome) -> Resolution {
        match self.entries.remove(id) {
            Some(entry) => deliver(&entry.caller, id, outcome),
            None => Resolution::Unknown,
        }
    }

    /// Remove the entry for `id` without replying
    pub fn discard(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Operation recorded for a pending id
    pub fn operation(&self, id: &str) -> Option<Operation> {
        self.entries.get(id).map(|entry| entry.operation)
    }

    /// Ids currently assigned to `worker`
    pub fn ids_for_worker(&self, worker: WorkerId) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.worker == worker)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Ids admitted at least `ttl` before `now`
    pub fn expired(&self, now: Instant, ttl: Duration) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.admitted_at) >= ttl)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Every pending id
    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MockReplySink;
    use serde_json::json;
    use std::sync::Arc;

    fn listening_sink(expected_replies: usize) -> Arc<dyn ReplySink> {
        let mut sink = MockReplySink::new();
        sink.expect_is_detached().return_const(false);
        sink.expect_deliver().times(expected_replies).return_const(());
        Arc::new(sink)
    }

    fn admit(table: &mut PendingRequestTable, id: &str, sink: &Arc<dyn ReplySink>) -> CoordinatorResult<()> {
        table.admit(id, Operation::Mem, WorkerId::new(0), Arc::downgrade(sink))
    }

    #[test]
    fn test_capacity_plus_one_is_rejected() {
        let sink = listening_sink(0);
        let mut table = PendingRequestTable::new(100);

        for i in 0..100 {
            admit(&mut table, &format!("r{i}"), &sink).unwrap();
        }
        let overflow = admit(&mut table, "r100", &sink);

        assert!(matches!(overflow, Err(CoordinatorError::PendingFull { capacity: 100 })));
        assert_eq!(table.len(), 100);
        assert!(!table.contains("r100"));
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let sink = listening_sink(0);
        let mut table = PendingRequestTable::new(4);

        admit(&mut table, "a1", &sink).unwrap();
        assert!(matches!(
            admit(&mut table, "a1", &sink),
            Err(CoordinatorError::DuplicateRequest { .. })
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_resolve_delivers_at_most_once() {
        let sink = listening_sink(1);
        let mut table = PendingRequestTable::new(4);
        admit(&mut table, "a1", &sink).unwrap();

        assert_eq!(table.resolve("a1", ReplyOutcome::Res(json!(1))), Resolution::Delivered);
        assert_eq!(table.resolve("a1", ReplyOutcome::Res(json!(2))), Resolution::Unknown);
        assert!(table.is_empty());
    }

    #[test]
    fn test_unknown_id_is_noop() {
        let mut table = PendingRequestTable::new(4);
        assert_eq!(table.resolve("ghost", ReplyOutcome::Res(json!(null))), Resolution::Unknown);
        assert!(!table.discard("ghost"));
    }

    #[test]
    fn test_dropped_caller_discards_reply_and_entry() {
        let sink = listening_sink(0);
        let mut table = PendingRequestTable::new(4);
        admit(&mut table, "a1", &sink).unwrap();
        drop(sink);

        assert_eq!(table.resolve("a1", ReplyOutcome::Res(json!(1))), Resolution::Detached);
        assert!(table.is_empty());
    }

    #[test]
    fn test_detached_caller_discards_reply() {
        let mut sink = MockReplySink::new();
        sink.expect_is_detached().return_const(true);
        sink.expect_deliver().never();
        let sink: Arc<dyn ReplySink> = Arc::new(sink);

        let mut table = PendingRequestTable::new(4);
        admit(&mut table, "a1", &sink).unwrap();
        assert_eq!(table.resolve("a1", ReplyOutcome::Res(json!(1))), Resolution::Detached);
        assert!(table.is_empty());
    }

    #[test]
    fn test_ids_for_worker_and_expiry() {
        let sink = listening_sink(0);
        let mut table = PendingRequestTable::new(8);
        table.admit("w0", Operation::Mem, WorkerId::new(0), Arc::downgrade(&sink)).unwrap();
        table.admit("w1", Operation::Time, WorkerId::new(1), Arc::downgrade(&sink)).unwrap();

        assert_eq!(table.ids_for_worker(WorkerId::new(1)), vec!["w1".to_string()]);
        assert_eq!(table.operation("w1"), Some(Operation::Time));

        let now = Instant::now();
        assert!(table.expired(now, Duration::from_secs(30)).is_empty());
        let mut stale = table.expired(now + Duration::from_secs(31), Duration::from_secs(30));
        stale.sort();
        assert_eq!(stale, vec!["w0".to_string(), "w1".to_string()]);
    }
}
