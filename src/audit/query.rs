use std::sync::PoisonError;

use super::{AuditEntry, AuditLog, Outcome};
use crate::access::Principal;
use crate::vault::StoreHandle;

/// Which entries a query yields. Empty fields match everything.
#[derive(Clone, Debug, Default)]
pub struct AuditFilter {
    pub store: Option<StoreHandle>,
    pub principal: Option<Principal>,
    pub outcome: Option<Outcome>,
    pub transitions_only: bool,
}

impl AuditFilter {
    pub fn store(mut self, store: StoreHandle) -> Self {
        self.store = Some(store);
        self
    }

    pub fn principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn transitions_only(mut self) -> Self {
        self.transitions_only = true;
        self
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.store.map_or(true, |s| s == entry.store)
            && self.principal.as_ref().map_or(true, |p| entry.principal.as_ref() == Some(p))
            && self.outcome.map_or(true, |o| o == entry.outcome)
            && (!self.transitions_only || entry.transitioned)
    }
}

/// Lazy, finite walk over the log in insertion order.
///
/// The walk stops at the last entry that existed when the query was made.
/// Each step re-locks the log, so appends are never blocked for the whole
/// iteration; entries evicted meanwhile are skipped.
pub struct AuditQuery<'a> {
    log: &'a AuditLog,
    filter: AuditFilter,
    cursor: u64,
    end: u64,
}

impl<'a> AuditQuery<'a> {
    pub(super) fn new(log: &'a AuditLog, filter: AuditFilter, end: u64) -> Self {
        Self { log, filter, cursor: 0, end }
    }
}

impl Iterator for AuditQuery<'_> {
    type Item = AuditEntry;

    fn next(&mut self) -> Option<AuditEntry> {
        if self.cursor >= self.end {
            return None;
        }
        let entries = self.log.entries.read().unwrap_or_else(PoisonError::into_inner);
        let start = entries.partition_point(|e| e.seq < self.cursor);
        for entry in entries.range(start..) {
            if entry.seq >= self.end {
                break;
            }
            if self.filter.matches(entry) {
                self.cursor = entry.seq + 1;
                return Some(entry.clone());
            }
        }
        self.cursor = self.end;
        None
    }
}
