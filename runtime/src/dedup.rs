//! Unit identity for deduplication.
//!
//! Two records are the same unit only when floorplan, unit number, rent text
//! and availability text all match exactly. The same unit number under
//! another floorplan, or re-offered at a new price or date, is a distinct
//! entry.

use std::collections::HashSet;

const DELIMITER: char = '|';

/// Composite identity of one scraped unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn new(
        floorplan_name: &str,
        unit_number: &str,
        rent_text: &str,
        availability_text: &str,
    ) -> Self {
        let mut key = String::with_capacity(
            floorplan_name.len() + unit_number.len() + rent_text.len() + availability_text.len() + 3,
        );
        for (i, part) in [floorplan_name, unit_number, rent_text, availability_text]
            .iter()
            .enumerate()
        {
            if i > 0 {
                key.push(DELIMITER);
            }
            key.push_str(part);
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Keys seen so far in one scope (a run, or one collation pass).
#[derive(Debug, Default, Clone)]
pub struct SeenKeys {
    keys: HashSet<DedupKey>,
}

impl SeenKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// True the first time `key` is offered; records it as a side effect.
    pub fn is_new(&mut self, key: DedupKey) -> bool {
        self.keys.insert(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
