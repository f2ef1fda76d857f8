//! Breakpoint analysis: classify what begins at a segment boundary.
//!
//! The scanner inspects a top cursor positioned immediately left of a
//! breakpoint (for deletions) or moved onto the candidate segment (for
//! insertions) and reports the affected range. In atomic mode a single
//! segment is considered at a time; the column iterator always runs atomic.

use crate::cursor::TopCursor;
use crate::tree::GenomeTree;

#[derive(Debug, Default)]
pub struct RearrangementScanner {
    atomic: bool,
    length: i64,
    range: (i64, i64),
}

impl RearrangementScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_atomic(&mut self, atomic: bool) {
        self.atomic = atomic;
    }

    pub fn is_atomic(&self) -> bool {
        self.atomic
    }

    /// Length of the most recently identified event.
    pub fn length(&self) -> i64 {
        self.length
    }

    /// Inclusive parent-genome range removed by the identified deletion.
    pub fn deleted_range(&self) -> (i64, i64) {
        self.range
    }

    /// Inclusive child-genome range covered by the identified insertion.
    pub fn inserted_range(&self) -> (i64, i64) {
        self.range
    }

    /// Decide whether a deletion in this genome begins at the right edge of
    /// the cursor's segment: the parent range between this segment's block
    /// and the next aligned block is unaccounted for. The cursor must be
    /// forward and unsliced.
    pub fn identify_deletion_from_left_breakpoint(
        &mut self,
        tree: &GenomeTree,
        cursor: &TopCursor,
    ) -> bool {
        debug_assert!(!cursor.is_reversed());
        let genome = tree.genome(cursor.genome);
        let seg = &genome.tops[cursor.array_index() as usize];
        let Some(parent_bottom) = seg.parent else {
            return false;
        };
        let Some(next_seg) = genome.tops.get(cursor.array_index() as usize + 1) else {
            return false;
        };
        let Some(next_bottom) = next_seg.parent else {
            return false;
        };
        // inversions are not plain deletions
        if seg.parent_reversed || next_seg.parent_reversed {
            return false;
        }
        let Some(parent) = genome.parent else {
            return false;
        };
        let parent_genome = tree.genome(parent);
        let b = &parent_genome.bottoms[parent_bottom as usize];
        let nb = &parent_genome.bottoms[next_bottom as usize];
        let gap_start = b.start + b.length;
        let gap_end = nb.start - 1;
        if gap_end < gap_start {
            return false;
        }
        // a rearrangement never spans sequences
        if parent_genome.sequence_containing(gap_start)
            != parent_genome.sequence_containing(gap_end)
        {
            return false;
        }
        self.length = gap_end - gap_start + 1;
        self.range = (gap_start, gap_end);
        true
    }

    /// Decide whether the cursor's segment is an insertion: it has no parent
    /// and sits right of an aligned segment. The cursor must be forward and
    /// unsliced, already moved onto the candidate segment.
    pub fn identify_insertion_from_left_breakpoint(
        &mut self,
        tree: &GenomeTree,
        cursor: &TopCursor,
    ) -> bool {
        debug_assert!(!cursor.is_reversed());
        let genome = tree.genome(cursor.genome);
        let index = cursor.array_index() as usize;
        let seg = &genome.tops[index];
        if seg.parent.is_some() {
            return false;
        }
        // left breakpoint must sit against an aligned segment
        if index == 0 || genome.tops[index - 1].parent.is_none() {
            return false;
        }
        self.length = seg.length;
        self.range = (seg.start, seg.start + seg.length - 1);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::TopCursor;
    use crate::tree::GenomeTree;

    /// root: 10 bases; child: aligned [0,3) -> root [0,3), inserted [3,6),
    /// aligned [6,13) -> root [3,10). Root range [3,6) has no child block
    /// when the child is built without the middle alignment.
    fn indel_tree(with_insertion: bool) -> (GenomeTree, crate::tree::GenomeId) {
        let mut tree = GenomeTree::new();
        let root = tree.add_genome("root", None);
        let child = tree.add_genome("child", Some(root));
        tree.add_sequence(root, "r1", 10);
        tree.set_dna(root, b"ACGTACGTAC");
        if with_insertion {
            tree.add_sequence(child, "c1", 13);
            tree.set_dna(child, b"ACGTTTTACGTAC");
            let b0 = tree.add_bottom_segment(root, 0, 3);
            let b1 = tree.add_bottom_segment(root, 3, 7);
            let t0 = tree.add_top_segment(child, 0, 3);
            tree.add_top_segment(child, 3, 3);
            let t2 = tree.add_top_segment(child, 6, 7);
            tree.attach(root, b0, child, t0, false).unwrap();
            tree.attach(root, b1, child, t2, false).unwrap();
        } else {
            tree.add_sequence(child, "c1", 7);
            tree.set_dna(child, b"ACGGTAC");
            let b0 = tree.add_bottom_segment(root, 0, 3);
            tree.add_bottom_segment(root, 3, 3);
            let b2 = tree.add_bottom_segment(root, 6, 4);
            let t0 = tree.add_top_segment(child, 0, 3);
            let t1 = tree.add_top_segment(child, 3, 4);
            tree.attach(root, b0, child, t0, false).unwrap();
            tree.attach(root, b2, child, t1, false).unwrap();
        }
        tree.validate().unwrap();
        (tree, child)
    }

    #[test]
    fn test_deletion_at_left_breakpoint() {
        let (tree, child) = indel_tree(false);
        let mut scanner = RearrangementScanner::new();
        scanner.set_atomic(true);
        let cursor = TopCursor::at(child, 0);
        assert!(scanner.identify_deletion_from_left_breakpoint(&tree, &cursor));
        assert_eq!(scanner.deleted_range(), (3, 5));
        assert_eq!(scanner.length(), 3);

        // no gap after the second block
        let cursor = TopCursor::at(child, 1);
        assert!(!scanner.identify_deletion_from_left_breakpoint(&tree, &cursor));
    }

    #[test]
    fn test_insertion_at_left_breakpoint() {
        let (tree, child) = indel_tree(true);
        let mut scanner = RearrangementScanner::new();
        scanner.set_atomic(true);
        let cursor = TopCursor::at(child, 1);
        assert!(scanner.identify_insertion_from_left_breakpoint(&tree, &cursor));
        assert_eq!(scanner.inserted_range(), (3, 5));
        assert_eq!(scanner.length(), 3);

        // aligned segments are not insertions
        let cursor = TopCursor::at(child, 2);
        assert!(!scanner.identify_insertion_from_left_breakpoint(&tree, &cursor));
    }

    #[test]
    fn test_no_deletion_without_right_neighbor() {
        let (tree, child) = indel_tree(false);
        let mut scanner = RearrangementScanner::new();
        scanner.set_atomic(true);
        let last = TopCursor::at(child, 1);
        assert!(!scanner.identify_deletion_from_left_breakpoint(&tree, &last));
    }
}
