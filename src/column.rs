//! Column output types.

use crate::tree::SeqKey;
use std::collections::BTreeMap;

/// One aligned base in a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnBase {
    /// Genome-wide array index of the base.
    pub array_index: i64,
    /// The base as read, complemented on the reverse strand.
    pub base: u8,
    pub reversed: bool,
}

/// Mapping from sequence to the ordered bases of that sequence aligned to the
/// current column.
///
/// Storage is reused between columns: clearing keeps the per-sequence vectors
/// allocated, and sequences that drop out of later columns linger as empty
/// entries until [`ColumnMap::prune_empty`]. Iteration skips empty entries.
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    entries: BTreeMap<SeqKey, Vec<ColumnBase>>,
}

impl ColumnMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bases of `key` in this column, if any.
    pub fn bases(&self, key: SeqKey) -> Option<&[ColumnBase]> {
        match self.entries.get(&key) {
            Some(v) if !v.is_empty() => Some(v),
            _ => None,
        }
    }

    /// Sequences with at least one base in this column, in key order.
    pub fn iter(&self) -> impl Iterator<Item = (SeqKey, &[ColumnBase])> {
        self.entries
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(&k, v)| (k, v.as_slice()))
    }

    /// Number of sequences present in this column.
    pub fn len(&self) -> usize {
        self.entries.values().filter(|v| !v.is_empty()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(|v| v.is_empty())
    }

    /// Total bases across all sequences in this column.
    pub fn num_bases(&self) -> usize {
        self.entries.values().map(|v| v.len()).sum()
    }

    pub(crate) fn push(&mut self, key: SeqKey, base: ColumnBase) {
        self.entries.entry(key).or_default().push(base);
    }

    pub(crate) fn contains_base(&self, key: SeqKey, array_index: i64) -> bool {
        self.entries
            .get(&key)
            .is_some_and(|v| v.iter().any(|b| b.array_index == array_index))
    }

    /// Clear all vectors in place, keeping their allocations.
    pub(crate) fn reset(&mut self) {
        for v in self.entries.values_mut() {
            v.clear();
        }
    }

    /// Drop entries left empty by the current column.
    pub(crate) fn prune_empty(&mut self) {
        self.entries.retain(|_, v| !v.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{GenomeId, SeqKey};

    fn key(g: u32, s: u32) -> SeqKey {
        SeqKey {
            genome: GenomeId(g),
            seq: s,
        }
    }

    #[test]
    fn test_push_and_reset() {
        let mut map = ColumnMap::new();
        map.push(
            key(0, 0),
            ColumnBase {
                array_index: 3,
                base: b'A',
                reversed: false,
            },
        );
        map.push(
            key(1, 0),
            ColumnBase {
                array_index: 7,
                base: b'T',
                reversed: true,
            },
        );
        assert_eq!(map.len(), 2);
        assert_eq!(map.num_bases(), 2);
        assert!(map.contains_base(key(0, 0), 3));
        assert!(!map.contains_base(key(0, 0), 4));

        map.reset();
        assert!(map.is_empty());
        assert_eq!(map.iter().count(), 0);

        // reused storage: key(1, 0) still has an (empty) entry until pruned
        map.push(
            key(0, 0),
            ColumnBase {
                array_index: 4,
                base: b'C',
                reversed: false,
            },
        );
        map.prune_empty();
        assert_eq!(map.len(), 1);
        assert_eq!(map.bases(key(0, 0)).unwrap()[0].array_index, 4);
        assert!(map.bases(key(1, 0)).is_none());
    }
}
