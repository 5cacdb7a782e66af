//! Usage-delta ledger
//!
//! Every cache hit owes the repository one usage increment. The ledger
//! counts what is still owed; a delivered increment acknowledges its delta,
//! and whatever remains at session close is flushed.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::knowledge::types::ItemId;

#[derive(Debug, Default)]
pub struct UsageLedger {
    pending: Mutex<HashMap<ItemId, u64>>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<ItemId, u64>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Owe one increment for `id`
    pub fn record(&self, id: &str) {
        *self.guard().entry(id.to_string()).or_insert(0) += 1;
    }

    /// One increment for `id` was delivered
    pub fn acknowledge(&self, id: &str) {
        let mut pending = self.guard();
        if let Some(count) = pending.get_mut(id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                pending.remove(id);
            }
        }
    }

    /// Total increments still owed
    pub fn outstanding(&self) -> u64 {
        self.guard().values().sum()
    }

    /// Take everything still owed, sorted by id
    pub fn drain(&self) -> Vec<(ItemId, u64)> {
        let mut owed: Vec<(ItemId, u64)> = self.guard().drain().collect();
        owed.sort();
        owed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_acknowledge() {
        let ledger = UsageLedger::new();
        ledger.record("a");
        ledger.record("a");
        ledger.record("b");
        assert_eq!(ledger.outstanding(), 3);

        ledger.acknowledge("a");
        ledger.acknowledge("unknown");
        assert_eq!(ledger.outstanding(), 2);

        assert_eq!(ledger.drain(), vec![("a".to_string(), 1), ("b".to_string(), 1)]);
        assert_eq!(ledger.outstanding(), 0);
    }
}
