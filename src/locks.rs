//! Per-key mutual exclusion table
//!
//! A key appears here if and only if an operation carrying that key is
//! currently executing. Keyless operations never touch this table.

use std::collections::HashMap;

use crate::error::InvariantViolation;

/// `key -> holder sequence number` for running keyed operations
#[derive(Debug, Default)]
pub(crate) struct KeyLockTable {
    held: HashMap<String, u64>,
}

impl KeyLockTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Whether any running operation holds `key`
    pub(crate) fn is_locked(&self, key: &str) -> bool {
        self.held.contains_key(key)
    }

    /// Acquire `key` for `holder`; false if another operation holds it
    pub(crate) fn try_acquire(&mut self, key: &str, holder: u64) -> bool {
        if self.held.contains_key(key) {
            return false;
        }
        self.held.insert(key.to_string(), holder);
        true
    }

    /// Release `key`, which must be held by `holder`. Releases are strictly
    /// nested per key: exactly one per successful acquire, by the same
    /// logical execution that acquired it.
    pub(crate) fn release(&mut self, key: &str, holder: u64) -> Result<(), InvariantViolation> {
        match self.held.get(key) {
            None => Err(InvariantViolation::ReleaseNotHeld {
                key: key.to_string(),
            }),
            Some(&current) if current != holder => Err(InvariantViolation::ReleaseWrongHolder {
                key: key.to_string(),
                holder: current,
                releaser: holder,
            }),
            Some(_) => {
                self.held.remove(key);
                Ok(())
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.held.len()
    }
}
