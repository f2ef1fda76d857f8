//! Value-type navigation cursors over a [`GenomeTree`].
//!
//! A segment cursor addresses one top or bottom segment of a genome,
//! optionally sliced to a subrange and optionally reversed. Slice offsets
//! are counted in the cursor's current orientation: `start_offset` from the
//! iteration start, `end_offset` from the iteration end. Cursors are plain
//! `Copy` values; every operation takes the tree by reference.

use crate::tree::{GenomeId, GenomeTree, SeqKey};
use std::marker::PhantomData;

/// Marker for cursors over the top segment array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopAxis {}

/// Marker for cursors over the bottom segment array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BottomAxis {}

pub trait Axis {
    /// Start and length of segment `index`, in genome coordinates.
    fn extent(tree: &GenomeTree, genome: GenomeId, index: u32) -> (i64, i64);
    fn count(tree: &GenomeTree, genome: GenomeId) -> usize;
    fn find(tree: &GenomeTree, genome: GenomeId, pos: i64) -> Option<u32>;
}

impl Axis for TopAxis {
    fn extent(tree: &GenomeTree, genome: GenomeId, index: u32) -> (i64, i64) {
        let t = &tree.genome(genome).tops[index as usize];
        (t.start, t.length)
    }

    fn count(tree: &GenomeTree, genome: GenomeId) -> usize {
        tree.genome(genome).tops.len()
    }

    fn find(tree: &GenomeTree, genome: GenomeId, pos: i64) -> Option<u32> {
        tree.genome(genome).top_containing(pos)
    }
}

impl Axis for BottomAxis {
    fn extent(tree: &GenomeTree, genome: GenomeId, index: u32) -> (i64, i64) {
        let b = &tree.genome(genome).bottoms[index as usize];
        (b.start, b.length)
    }

    fn count(tree: &GenomeTree, genome: GenomeId) -> usize {
        tree.genome(genome).bottoms.len()
    }

    fn find(tree: &GenomeTree, genome: GenomeId, pos: i64) -> Option<u32> {
        tree.genome(genome).bottom_containing(pos)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegCursor<A> {
    pub genome: GenomeId,
    index: u32,
    start_offset: i64,
    end_offset: i64,
    reversed: bool,
    _axis: PhantomData<A>,
}

pub type TopCursor = SegCursor<TopAxis>;
pub type BottomCursor = SegCursor<BottomAxis>;

impl<A: Axis> SegCursor<A> {
    /// Cursor over the whole segment `index`, forward orientation.
    pub fn at(genome: GenomeId, index: u32) -> Self {
        SegCursor {
            genome,
            index,
            start_offset: 0,
            end_offset: 0,
            reversed: false,
            _axis: PhantomData,
        }
    }

    /// Cursor sliced to the single genome coordinate `pos`, forward orientation.
    pub fn at_site(tree: &GenomeTree, genome: GenomeId, pos: i64) -> Option<Self> {
        let index = A::find(tree, genome, pos)?;
        let (start, length) = A::extent(tree, genome, index);
        Some(SegCursor {
            genome,
            index,
            start_offset: pos - start,
            end_offset: start + length - 1 - pos,
            reversed: false,
            _axis: PhantomData,
        })
    }

    /// Like [`SegCursor::at_site`], but oriented and single-base sliced so the
    /// iteration start sits at `pos`.
    pub fn at_site_oriented(
        tree: &GenomeTree,
        genome: GenomeId,
        pos: i64,
        reversed: bool,
    ) -> Option<Self> {
        let mut cursor = Self::at_site(tree, genome, pos)?;
        if reversed {
            cursor.to_reverse();
        }
        Some(cursor)
    }

    /// Position in the segment array.
    pub fn array_index(&self) -> u32 {
        self.index
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    pub fn start_offset(&self) -> i64 {
        self.start_offset
    }

    pub fn end_offset(&self) -> i64 {
        self.end_offset
    }

    fn extent(&self, tree: &GenomeTree) -> (i64, i64) {
        A::extent(tree, self.genome, self.index)
    }

    /// Genome coordinate of the cursor's iteration start.
    pub fn start_position(&self, tree: &GenomeTree) -> i64 {
        let (start, length) = self.extent(tree);
        if self.reversed {
            start + length - 1 - self.start_offset
        } else {
            start + self.start_offset
        }
    }

    /// Genome coordinate of the cursor's iteration end.
    pub fn last_position(&self, tree: &GenomeTree) -> i64 {
        let (start, length) = self.extent(tree);
        if self.reversed {
            start + self.end_offset
        } else {
            start + length - 1 - self.end_offset
        }
    }

    /// Sliced length.
    pub fn length(&self, tree: &GenomeTree) -> i64 {
        let (_, length) = self.extent(tree);
        length - self.start_offset - self.end_offset
    }

    pub fn overlaps(&self, tree: &GenomeTree, pos: i64) -> bool {
        let a = self.start_position(tree);
        let b = self.last_position(tree);
        pos >= a.min(b) && pos <= a.max(b)
    }

    /// Restrict the cursor; offsets are relative to the full segment, in the
    /// cursor's current orientation.
    pub fn slice(&mut self, tree: &GenomeTree, start_offset: i64, end_offset: i64) {
        let (_, length) = self.extent(tree);
        debug_assert!(start_offset >= 0 && end_offset >= 0);
        debug_assert!(start_offset + end_offset < length);
        self.start_offset = start_offset;
        self.end_offset = end_offset;
    }

    /// Widen the slice back to the full segment.
    pub fn reset_slice(&mut self) {
        self.start_offset = 0;
        self.end_offset = 0;
    }

    pub fn to_reverse(&mut self) {
        std::mem::swap(&mut self.start_offset, &mut self.end_offset);
        self.reversed = !self.reversed;
    }

    /// Move one segment ahead in iteration order, clearing the slice.
    /// Returns false (cursor unchanged) at the array edge.
    pub fn to_right(&mut self, tree: &GenomeTree) -> bool {
        if self.reversed {
            if self.index == 0 {
                return false;
            }
            self.index -= 1;
        } else {
            if self.index as usize + 1 >= A::count(tree, self.genome) {
                return false;
            }
            self.index += 1;
        }
        self.reset_slice();
        true
    }

    /// Move one segment back in iteration order, clearing the slice.
    pub fn to_left(&mut self, tree: &GenomeTree) -> bool {
        self.to_reverse();
        let moved = self.to_right(tree);
        self.to_reverse();
        moved
    }
}

impl TopCursor {
    pub fn has_parent(&self, tree: &GenomeTree) -> bool {
        tree.genome(self.genome).tops[self.index as usize]
            .parent
            .is_some()
    }

    /// Cursor over the aligned bottom segment of the parent genome, carrying
    /// the slice and composing orientations. Segment lengths match, so slice
    /// offsets transfer directly.
    pub fn parent(&self, tree: &GenomeTree) -> Option<BottomCursor> {
        let seg = &tree.genome(self.genome).tops[self.index as usize];
        let bottom = seg.parent?;
        let parent_genome = tree.genome(self.genome).parent?;
        Some(SegCursor {
            genome: parent_genome,
            index: bottom,
            start_offset: self.start_offset,
            end_offset: self.end_offset,
            reversed: self.reversed ^ seg.parent_reversed,
            _axis: PhantomData,
        })
    }

    pub fn next_paralogy_index(&self, tree: &GenomeTree) -> Option<u32> {
        tree.genome(self.genome).tops[self.index as usize].next_paralogy
    }

    /// Cursor over the next segment in the paralogy cycle. Paralogs share a
    /// parent segment, so lengths match and offsets transfer.
    pub fn next_paralogy(&self, tree: &GenomeTree) -> Option<TopCursor> {
        let genome = tree.genome(self.genome);
        let seg = &genome.tops[self.index as usize];
        let next = seg.next_paralogy?;
        let next_seg = &genome.tops[next as usize];
        Some(SegCursor {
            genome: self.genome,
            index: next,
            start_offset: self.start_offset,
            end_offset: self.end_offset,
            reversed: self.reversed ^ (seg.parent_reversed != next_seg.parent_reversed),
            _axis: PhantomData,
        })
    }

    pub fn has_parse_down(&self, tree: &GenomeTree) -> bool {
        !tree.genome(self.genome).bottoms.is_empty()
    }

    /// Cursor over this genome's bottom-segment view of the same slice.
    /// The slice must not cross a bottom segment boundary.
    pub fn parse_down(&self, tree: &GenomeTree) -> Option<BottomCursor> {
        parse_partner::<TopAxis, BottomAxis>(tree, self)
    }
}

impl BottomCursor {
    pub fn has_child(&self, tree: &GenomeTree, slot: usize) -> bool {
        tree.genome(self.genome).bottoms[self.index as usize]
            .children
            .get(slot)
            .is_some_and(|c| c.is_some())
    }

    /// Cursor over the aligned top segment of child genome `slot`.
    pub fn child(&self, tree: &GenomeTree, slot: usize) -> Option<TopCursor> {
        let genome = tree.genome(self.genome);
        let top = *genome.bottoms[self.index as usize].children.get(slot)?;
        let top = top?;
        let child_genome = genome.children[slot];
        let child_seg = &tree.genome(child_genome).tops[top as usize];
        Some(SegCursor {
            genome: child_genome,
            index: top,
            start_offset: self.start_offset,
            end_offset: self.end_offset,
            reversed: self.reversed ^ child_seg.parent_reversed,
            _axis: PhantomData,
        })
    }

    pub fn has_parse_up(&self, tree: &GenomeTree) -> bool {
        !tree.genome(self.genome).tops.is_empty()
    }

    /// Cursor over this genome's top-segment view of the same slice.
    /// The slice must not cross a top segment boundary.
    pub fn parse_up(&self, tree: &GenomeTree) -> Option<TopCursor> {
        parse_partner::<BottomAxis, TopAxis>(tree, self)
    }
}

/// Locate the opposite-axis segment covering a cursor's slice and slice it to
/// the same genome-coordinate range, keeping the orientation.
fn parse_partner<A: Axis, B: Axis>(
    tree: &GenomeTree,
    cursor: &SegCursor<A>,
) -> Option<SegCursor<B>> {
    let a = cursor.start_position(tree);
    let b = cursor.last_position(tree);
    let (lo, hi) = (a.min(b), a.max(b));
    let index = B::find(tree, cursor.genome, lo)?;
    let (start, length) = B::extent(tree, cursor.genome, index);
    if hi >= start + length {
        return None;
    }
    let (start_offset, end_offset) = if cursor.reversed {
        (start + length - 1 - hi, lo - start)
    } else {
        (lo - start, start + length - 1 - hi)
    };
    Some(SegCursor {
        genome: cursor.genome,
        index,
        start_offset,
        end_offset,
        reversed: cursor.reversed,
        _axis: PhantomData,
    })
}

/// Cursor over a genome's DNA array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DnaCursor {
    pub genome: GenomeId,
    pos: i64,
    reversed: bool,
}

impl DnaCursor {
    pub fn new(genome: GenomeId, pos: i64) -> Self {
        DnaCursor {
            genome,
            pos,
            reversed: false,
        }
    }

    pub fn array_index(&self) -> i64 {
        self.pos
    }

    pub fn jump_to(&mut self, pos: i64) {
        self.pos = pos;
    }

    pub fn set_reversed(&mut self, reversed: bool) {
        self.reversed = reversed;
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// The base at the cursor, complemented on the reverse strand.
    pub fn base(&self, tree: &GenomeTree) -> u8 {
        let b = tree.genome(self.genome).dna[self.pos as usize];
        if self.reversed {
            complement(b)
        } else {
            b
        }
    }

    /// Sequence owning the cursor's position.
    pub fn seq_key(&self, tree: &GenomeTree) -> Option<SeqKey> {
        let seq = tree.genome(self.genome).sequence_containing(self.pos)?;
        Some(SeqKey {
            genome: self.genome,
            seq,
        })
    }
}

pub fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'a' => b't',
        b'T' => b'A',
        b't' => b'a',
        b'C' => b'G',
        b'c' => b'g',
        b'G' => b'C',
        b'g' => b'c',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::GenomeTree;

    fn tree_with_child() -> (GenomeTree, GenomeId, GenomeId) {
        let mut tree = GenomeTree::new();
        let root = tree.add_genome("root", None);
        let child = tree.add_genome("child", Some(root));
        tree.add_sequence(root, "r1", 10);
        tree.set_dna(root, b"ACGTACGTAC");
        tree.add_sequence(child, "c1", 10);
        tree.set_dna(child, b"TTGTACGTAC");
        let b0 = tree.add_bottom_segment(root, 0, 4);
        let b1 = tree.add_bottom_segment(root, 4, 6);
        let t0 = tree.add_top_segment(child, 0, 4);
        let t1 = tree.add_top_segment(child, 4, 6);
        tree.attach(root, b0, child, t0, false).unwrap();
        tree.attach(root, b1, child, t1, true).unwrap();
        tree.validate().unwrap();
        (tree, root, child)
    }

    #[test]
    fn test_site_search_and_slicing() {
        let (tree, _, child) = tree_with_child();
        let cursor = TopCursor::at_site(&tree, child, 5).unwrap();
        assert_eq!(cursor.array_index(), 1);
        assert_eq!(cursor.start_position(&tree), 5);
        assert_eq!(cursor.last_position(&tree), 5);
        assert_eq!(cursor.length(&tree), 1);
        assert!(cursor.overlaps(&tree, 5));
        assert!(!cursor.overlaps(&tree, 6));

        let mut wide = cursor;
        wide.reset_slice();
        assert_eq!(wide.start_position(&tree), 4);
        assert_eq!(wide.last_position(&tree), 9);
        assert_eq!(wide.length(&tree), 6);
    }

    #[test]
    fn test_to_right_and_reverse() {
        let (tree, _, child) = tree_with_child();
        let mut cursor = TopCursor::at(child, 0);
        assert!(cursor.to_right(&tree));
        assert_eq!(cursor.array_index(), 1);
        assert!(!cursor.to_right(&tree));

        cursor.to_reverse();
        assert!(cursor.is_reversed());
        assert_eq!(cursor.start_position(&tree), 9);
        assert_eq!(cursor.last_position(&tree), 4);
        assert!(cursor.to_right(&tree));
        assert_eq!(cursor.array_index(), 0);
    }

    #[test]
    fn test_parent_and_child_hops() {
        let (tree, root, child) = tree_with_child();
        // forward link
        let top = TopCursor::at_site(&tree, child, 2).unwrap();
        let parent = top.parent(&tree).unwrap();
        assert_eq!(parent.genome, root);
        assert!(!parent.is_reversed());
        assert_eq!(parent.start_position(&tree), 2);

        // inverted link: child position 4 maps to the far end of root's b1
        let top = TopCursor::at_site(&tree, child, 4).unwrap();
        let parent = top.parent(&tree).unwrap();
        assert!(parent.is_reversed());
        assert_eq!(parent.start_position(&tree), 9);

        // and back down again
        let down = parent.child(&tree, 0).unwrap();
        assert!(!down.is_reversed());
        assert_eq!(down.start_position(&tree), 4);
    }

    #[test]
    fn test_parse_partner() {
        let mut tree = GenomeTree::new();
        let root = tree.add_genome("root", None);
        let mid = tree.add_genome("mid", Some(root));
        tree.add_sequence(root, "r1", 6);
        tree.set_dna(root, b"ACGTAC");
        tree.add_sequence(mid, "m1", 6);
        tree.set_dna(mid, b"ACGTAC");
        let rb = tree.add_bottom_segment(root, 0, 6);
        let mt = tree.add_top_segment(mid, 0, 6);
        // bottom view of mid split differently from its top view
        tree.add_bottom_segment(mid, 0, 3);
        tree.add_bottom_segment(mid, 3, 3);
        tree.attach(root, rb, mid, mt, false).unwrap();

        let top = TopCursor::at_site(&tree, mid, 4).unwrap();
        assert!(top.has_parse_down(&tree));
        let bottom = top.parse_down(&tree).unwrap();
        assert_eq!(bottom.array_index(), 1);
        assert_eq!(bottom.start_position(&tree), 4);
        let up = bottom.parse_up(&tree).unwrap();
        assert_eq!(up.array_index(), 0);
        assert_eq!(up.start_position(&tree), 4);
    }

    #[test]
    fn test_dna_cursor_strand() {
        let (tree, _, child) = tree_with_child();
        let mut dna = DnaCursor::new(child, 0);
        assert_eq!(dna.base(&tree), b'T');
        dna.jump_to(2);
        assert_eq!(dna.base(&tree), b'G');
        dna.set_reversed(true);
        assert_eq!(dna.base(&tree), b'C');
        assert_eq!(dna.array_index(), 2);
    }
}
