// src/changes.rs
//
// Per-byte change classification for the reverse-engineering view.
//
// Each identifier keeps the last observed data and a change counter per byte
// position. A changed byte is assigned one of 3 cycling highlight classes so
// a front end can visually age out older changes.

use std::collections::HashMap;

use serde::Serialize;

use crate::codec::MAX_DATA_LEN;

/// Number of cycling highlight classes for changed bytes.
pub const HIGHLIGHT_CLASSES: u32 = 3;

/// Highlight class for one byte position.
///
/// `Default` means the byte did not change in the latest observation. The
/// three phases cycle with the byte's change counter (`counter % 3`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Highlight {
    Default,
    Phase0,
    Phase1,
    Phase2,
}

impl Highlight {
    fn from_count(count: u32) -> Self {
        match count % HIGHLIGHT_CLASSES {
            0 => Highlight::Phase0,
            1 => Highlight::Phase1,
            _ => Highlight::Phase2,
        }
    }
}

/// Diff result for one byte position.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ByteDiff {
    pub value: u8,
    pub changed: bool,
    pub highlight: Highlight,
}

struct ChangeRecord {
    last_data: Vec<u8>,
    change_count: [u32; MAX_DATA_LEN],
}

/// Change tracker keyed by frame identifier.
///
/// Records are created lazily on first observation and live until an
/// explicit global reset; they are never destroyed individually.
#[derive(Default)]
pub struct ChangeTracker {
    records: HashMap<u16, ChangeRecord>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        ChangeTracker::default()
    }

    /// Classify `new_data` against the last observation of `id`.
    ///
    /// The first observation is the baseline: every byte is unchanged with a
    /// zeroed counter. On later observations each differing position gets its
    /// counter incremented and a cycling highlight class; unchanged positions
    /// keep the default class. `last_data` is always updated.
    pub fn diff(&mut self, id: u16, new_data: &[u8]) -> Vec<ByteDiff> {
        match self.records.get_mut(&id) {
            None => {
                self.records.insert(
                    id,
                    ChangeRecord {
                        last_data: new_data.to_vec(),
                        change_count: [0; MAX_DATA_LEN],
                    },
                );
                new_data
                    .iter()
                    .map(|&value| ByteDiff {
                        value,
                        changed: false,
                        highlight: Highlight::Default,
                    })
                    .collect()
            }
            Some(record) => {
                let mut diffs = Vec::with_capacity(new_data.len());
                for (i, &value) in new_data.iter().enumerate().take(MAX_DATA_LEN) {
                    let changed = record.last_data.get(i) != Some(&value);
                    let highlight = if changed {
                        record.change_count[i] += 1;
                        Highlight::from_count(record.change_count[i])
                    } else {
                        Highlight::Default
                    };
                    diffs.push(ByteDiff {
                        value,
                        changed,
                        highlight,
                    });
                }
                record.last_data = new_data.to_vec();
                diffs
            }
        }
    }

    /// Number of identifiers seen so far.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Global reset: drop every record and baseline.
    pub fn reset(&mut self) {
        self.records.clear();
    }
}
