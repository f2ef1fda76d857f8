//! Forward-only iterator over alignment columns.
//!
//! Starting from a reference region, each call to [`ColumnIterator::advance`]
//! produces the set of bases across all genomes aligned to the next reference
//! position, plus any bases of lineage-specific insertions within the
//! configured insertion budget. The traversal keeps a stack of active regions
//! (the reference region at the bottom, nested indel regions above it), a
//! graph of per-genome linked cursors that is advanced in place between
//! columns, and a per-genome cache of already-emitted positions so no base is
//! reported more than once.

use crate::column::{ColumnBase, ColumnMap};
use crate::cursor::{BottomCursor, DnaCursor, TopCursor};
use crate::position_cache::PositionCache;
use crate::rearrangement::RearrangementScanner;
use crate::tree::{GenomeId, GenomeTree, SeqKey};
use log::debug;
use rustc_hash::FxHashMap;

#[derive(Debug)]
pub enum ColumnIteratorError {
    EmptyTree,
    UnknownGenome(u32),
    UnknownSequence { genome: String, seq: u32 },
    IndexOutOfRange { index: i64, sequence: String },
    EmptyRange { start: i64, end: i64 },
    RootNotAncestor { root: String, reference: String },
}

impl std::fmt::Display for ColumnIteratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnIteratorError::EmptyTree => write!(f, "The genome tree has no root genome"),
            ColumnIteratorError::UnknownGenome(id) => write!(f, "Unknown genome id {}", id),
            ColumnIteratorError::UnknownSequence { genome, seq } => {
                write!(f, "Genome '{}' has no sequence {}", genome, seq)
            }
            ColumnIteratorError::IndexOutOfRange { index, sequence } => {
                write!(f, "Index {} outside sequence '{}'", index, sequence)
            }
            ColumnIteratorError::EmptyRange { start, end } => {
                write!(f, "End index {} lies before start index {}", end, start)
            }
            ColumnIteratorError::RootNotAncestor { root, reference } => {
                write!(f, "Genome '{}' is not an ancestor of '{}'", root, reference)
            }
        }
    }
}

impl std::error::Error for ColumnIteratorError {}

/// A column attempt hit an already-emitted or out-of-range position and was
/// abandoned; the cursor moves on without output.
struct Voided;

type SyncResult = Result<(), Voided>;

/// Which edge the recursion arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arrival {
    Root,
    Parent,
    Child(usize),
    Parse,
    Dup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TopId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BotId(u32);

/// Top-segment view of one genome in the linked-cursor graph.
#[derive(Debug, Default)]
struct TopNode {
    seg: Option<TopCursor>,
    dna: Option<DnaCursor>,
    parent: Option<BotId>,
    bottom_parse: Option<BotId>,
    next_dup: Option<TopId>,
}

/// Bottom-segment view of one genome in the linked-cursor graph.
#[derive(Debug, Default)]
struct BottomNode {
    seg: Option<BottomCursor>,
    dna: Option<DnaCursor>,
    top_parse: Option<TopId>,
    children: Vec<Option<TopId>>,
}

/// One active region: a contiguous index range on one sequence.
#[derive(Debug, Clone, Copy)]
struct StackEntry {
    seq: SeqKey,
    first_index: i64,
    index: i64,
    last_index: i64,
    /// Insertion budget consumed by this region and all enclosing ones.
    cum_size: u64,
    top: TopId,
    bottom: BotId,
}

#[derive(Debug)]
pub struct ColumnIterator<'a> {
    tree: &'a GenomeTree,
    root_genome: GenomeId,
    max_insertion_length: u64,
    no_dupes: bool,
    stack: Vec<StackEntry>,
    indel_stack: Vec<StackEntry>,
    tops: Vec<TopNode>,
    bots: Vec<BottomNode>,
    visit_cache: FxHashMap<GenomeId, PositionCache>,
    col_map: ColumnMap,
    scanner: RearrangementScanner,
    ref_seq: SeqKey,
    ref_index: i64,
}

impl<'a> ColumnIterator<'a> {
    /// Build an iterator positioned on the first column of the range
    /// `[start, end]` (genome coordinates) of `reference`. `root` bounds how
    /// far upward the recursion may go and defaults to the tree root; `end`
    /// defaults to the last position of the reference sequence. A
    /// `max_insertion_length` of 0 disables indel tracking; `no_dupes`
    /// suppresses traversal of paralogy edges.
    pub fn new(
        tree: &'a GenomeTree,
        reference: SeqKey,
        root: Option<GenomeId>,
        start: i64,
        end: Option<i64>,
        max_insertion_length: u64,
        no_dupes: bool,
    ) -> Result<Self, ColumnIteratorError> {
        if reference.genome.0 as usize >= tree.num_genomes() {
            return Err(ColumnIteratorError::UnknownGenome(reference.genome.0));
        }
        let genome = tree.genome(reference.genome);
        let seq = genome
            .sequences
            .get(reference.seq as usize)
            .ok_or_else(|| ColumnIteratorError::UnknownSequence {
                genome: genome.name.clone(),
                seq: reference.seq,
            })?;
        if start < seq.start || start > seq.last_position() {
            return Err(ColumnIteratorError::IndexOutOfRange {
                index: start,
                sequence: seq.name.clone(),
            });
        }
        let end = end.unwrap_or_else(|| seq.last_position());
        if end > seq.last_position() {
            return Err(ColumnIteratorError::IndexOutOfRange {
                index: end,
                sequence: seq.name.clone(),
            });
        }
        if end < start {
            return Err(ColumnIteratorError::EmptyRange { start, end });
        }
        let root_genome = root
            .or_else(|| tree.root())
            .ok_or(ColumnIteratorError::EmptyTree)?;
        if root_genome.0 as usize >= tree.num_genomes() {
            return Err(ColumnIteratorError::UnknownGenome(root_genome.0));
        }
        let mut ancestor = Some(reference.genome);
        while let Some(g) = ancestor {
            if g == root_genome {
                break;
            }
            ancestor = tree.genome(g).parent;
        }
        if ancestor.is_none() {
            return Err(ColumnIteratorError::RootNotAncestor {
                root: tree.genome(root_genome).name.clone(),
                reference: tree.genome(reference.genome).name.clone(),
            });
        }

        let mut scanner = RearrangementScanner::new();
        scanner.set_atomic(true);
        let mut iter = ColumnIterator {
            tree,
            root_genome,
            max_insertion_length,
            no_dupes,
            stack: Vec::new(),
            indel_stack: Vec::new(),
            tops: Vec::new(),
            bots: Vec::new(),
            visit_cache: FxHashMap::default(),
            col_map: ColumnMap::new(),
            scanner,
            ref_seq: reference,
            ref_index: start,
        };
        let entry = iter.new_region(reference, start, end, 0);
        iter.stack.push(entry);
        iter.advance();
        Ok(iter)
    }

    /// Move to the next column. Once the produced column is the last one,
    /// further calls are no-ops.
    pub fn advance(&mut self) {
        if self.skip_clean() {
            return;
        }
        debug_assert!(self.indel_stack.is_empty());
        loop {
            self.indel_stack.clear();
            if self.skip_clean() {
                // every remaining position was already emitted elsewhere
                self.col_map.reset();
                return;
            }
            let init = self.needs_init();
            let produced = self.recursive_update(init).is_ok();
            let last = self.stack.len() - 1;
            if produced {
                self.ref_seq = self.stack[last].seq;
                self.ref_index = self.stack[last].index;
            }
            self.stack[last].index += 1;
            if produced {
                break;
            }
        }
        // enter nested regions discovered during this column before resuming
        // the enclosing region
        self.stack.append(&mut self.indel_stack);
        self.skip_clean();
        #[cfg(debug_assertions)]
        self.assert_column_consistent();
    }

    /// True once the produced column is the final one of the whole range.
    pub fn at_end(&self) -> bool {
        self.stack.len() == 1 && self.stack[0].index > self.stack[0].last_index
    }

    /// Sequence driving the column just produced.
    pub fn current_sequence(&self) -> SeqKey {
        self.ref_seq
    }

    /// Array index of the column just produced, on its driving sequence.
    pub fn current_index(&self) -> i64 {
        self.ref_index
    }

    /// The column just produced: sequence -> ordered aligned bases.
    pub fn column(&self) -> &ColumnMap {
        &self.col_map
    }

    pub fn tree(&self) -> &'a GenomeTree {
        self.tree
    }

    /// Prune the linked-cursor graph down to the root nodes of the regions
    /// still on the stack, and drop empty column-map entries. The visit cache
    /// and already-produced column data stay intact; pruned cursors are
    /// re-derived by positional search on the next column.
    pub fn defragment(&mut self) {
        self.col_map.prune_empty();
        debug_assert!(self.indel_stack.is_empty());
        let mut tops = Vec::with_capacity(self.stack.len());
        let mut bots = Vec::with_capacity(self.stack.len());
        for entry in &mut self.stack {
            let mut top = std::mem::take(&mut self.tops[entry.top.0 as usize]);
            top.parent = None;
            top.bottom_parse = None;
            top.next_dup = None;
            entry.top = TopId(tops.len() as u32);
            tops.push(top);
            let mut bottom = std::mem::take(&mut self.bots[entry.bottom.0 as usize]);
            bottom.top_parse = None;
            bottom.children.iter_mut().for_each(|c| *c = None);
            entry.bottom = BotId(bots.len() as u32);
            bots.push(bottom);
        }
        debug!(
            "defragment: {} top / {} bottom nodes pruned down to {} regions",
            self.tops.len(),
            self.bots.len(),
            self.stack.len()
        );
        self.tops = tops;
        self.bots = bots;
    }

    // ---- stack maintenance ------------------------------------------------

    fn top_entry(&self) -> &StackEntry {
        &self.stack[self.stack.len() - 1]
    }

    fn in_bounds(&self) -> bool {
        let e = self.top_entry();
        e.index >= e.first_index && e.index <= e.last_index
    }

    /// Skip visited indices and pop exhausted nested regions. Returns true
    /// when only the root region remains and it is exhausted.
    fn skip_clean(&mut self) -> bool {
        self.next_free_index();
        while self.stack.len() > 1 && !self.in_bounds() {
            self.pop_region();
            self.next_free_index();
        }
        self.stack.len() == 1 && !self.in_bounds()
    }

    /// Move the active region's cursor right past already-emitted indices.
    fn next_free_index(&mut self) {
        let last = self.stack.len() - 1;
        let genome = self.stack[last].seq.genome;
        if let Some(cache) = self.visit_cache.get(&genome) {
            let index = self.stack[last].index;
            self.stack[last].index = cache.next_unvisited(index);
        }
    }

    fn pop_region(&mut self) {
        if let Some(e) = self.stack.pop() {
            debug!(
                "leaving nested region {:?} [{}, {}]",
                e.seq, e.first_index, e.last_index
            );
        }
    }

    fn needs_init(&self) -> bool {
        let e = self.top_entry();
        e.index == e.first_index
            || (self.tops[e.top.0 as usize].seg.is_none()
                && self.bots[e.bottom.0 as usize].seg.is_none())
    }

    fn new_region(&mut self, seq: SeqKey, first: i64, last: i64, cum_size: u64) -> StackEntry {
        let top = self.new_top_node();
        let bottom = self.new_bottom_node(seq.genome);
        StackEntry {
            seq,
            first_index: first,
            index: first,
            last_index: last,
            cum_size,
            top,
            bottom,
        }
    }

    fn new_top_node(&mut self) -> TopId {
        self.tops.push(TopNode::default());
        TopId((self.tops.len() - 1) as u32)
    }

    fn new_bottom_node(&mut self, genome: GenomeId) -> BotId {
        self.bots.push(BottomNode {
            children: vec![None; self.tree.genome(genome).children.len()],
            ..BottomNode::default()
        });
        BotId((self.bots.len() - 1) as u32)
    }

    // ---- cursor access ----------------------------------------------------

    fn top_seg(&self, id: TopId) -> TopCursor {
        self.tops[id.0 as usize]
            .seg
            .expect("linked top cursor not positioned")
    }

    fn top_dna(&self, id: TopId) -> DnaCursor {
        self.tops[id.0 as usize]
            .dna
            .expect("linked top cursor has no DNA cursor")
    }

    fn bot_seg(&self, id: BotId) -> BottomCursor {
        self.bots[id.0 as usize]
            .seg
            .expect("linked bottom cursor not positioned")
    }

    fn bot_dna(&self, id: BotId) -> DnaCursor {
        self.bots[id.0 as usize]
            .dna
            .expect("linked bottom cursor has no DNA cursor")
    }

    // ---- column synchronization -------------------------------------------

    /// Re-synchronize the whole cross-genome graph at the active region's
    /// cursor. On the first column of a region the driving cursor is found by
    /// positional search; afterwards it only ever scans forward.
    fn recursive_update(&mut self, init: bool) -> SyncResult {
        self.col_map.reset();
        let e = *self.top_entry();
        let genome = self.tree.genome(e.seq.genome);
        if !genome.tops.is_empty() {
            let tid = e.top;
            let (seg, dna) = if init {
                let seg = TopCursor::at_site(self.tree, e.seq.genome, e.index)
                    .expect("position not covered by a top segment");
                (seg, DnaCursor::new(e.seq.genome, e.index))
            } else {
                let mut seg = self.top_seg(tid);
                debug_assert!(!seg.is_reversed());
                seg.reset_slice();
                while !seg.overlaps(self.tree, e.index) {
                    if !seg.to_right(self.tree) {
                        break;
                    }
                }
                debug_assert!(seg.overlaps(self.tree, e.index));
                let offset = e.index - seg.start_position(self.tree);
                let full_length = seg.length(self.tree);
                seg.slice(self.tree, offset, full_length - offset - 1);
                let mut dna = self.top_dna(tid);
                dna.jump_to(e.index);
                dna.set_reversed(false);
                (seg, dna)
            };
            debug_assert_eq!(seg.start_position(self.tree), dna.array_index());
            let node = &mut self.tops[tid.0 as usize];
            node.seg = Some(seg);
            node.dna = Some(dna);
            self.visit_top(tid, Arrival::Root)
        } else if !genome.bottoms.is_empty() {
            let bid = e.bottom;
            let (seg, dna) = if init {
                let seg = BottomCursor::at_site(self.tree, e.seq.genome, e.index)
                    .expect("position not covered by a bottom segment");
                (seg, DnaCursor::new(e.seq.genome, e.index))
            } else {
                let mut seg = self.bot_seg(bid);
                debug_assert!(!seg.is_reversed());
                seg.reset_slice();
                while !seg.overlaps(self.tree, e.index) {
                    if !seg.to_right(self.tree) {
                        break;
                    }
                }
                debug_assert!(seg.overlaps(self.tree, e.index));
                let offset = e.index - seg.start_position(self.tree);
                let full_length = seg.length(self.tree);
                seg.slice(self.tree, offset, full_length - offset - 1);
                let mut dna = self.bot_dna(bid);
                dna.jump_to(e.index);
                dna.set_reversed(false);
                (seg, dna)
            };
            debug_assert_eq!(seg.start_position(self.tree), dna.array_index());
            let node = &mut self.bots[bid.0 as usize];
            node.seg = Some(seg);
            node.dna = Some(dna);
            self.visit_bottom(bid, Arrival::Root)
        } else {
            // isolated genome with no alignment relationships at all
            let dna = DnaCursor::new(e.seq.genome, e.index);
            self.col_map_insert(&dna)
        }
    }

    /// Record a top-view node's base and recurse over its outgoing edges.
    /// The node's cursors must already be positioned by the caller.
    fn visit_top(&mut self, tid: TopId, from: Arrival) -> SyncResult {
        let dna = self.top_dna(tid);
        // a parse partner shares the coordinate its counterpart just recorded
        if from != Arrival::Parse {
            self.col_map_insert(&dna)?;
        }
        let seg = self.top_seg(tid);
        match from {
            Arrival::Root | Arrival::Parse => self.scan_deletion(&seg),
            Arrival::Parent | Arrival::Dup => self.scan_insertion(&seg),
            Arrival::Child(_) => debug_assert!(false, "top-view node reached through a child edge"),
        }
        if !self.check_range(&dna) {
            return Ok(());
        }
        if matches!(from, Arrival::Root | Arrival::Parse) {
            self.follow_parent(tid)?;
        }
        if from != Arrival::Dup {
            self.follow_dups(tid)?;
        }
        if from != Arrival::Parse {
            self.follow_parse_down(tid)?;
        }
        Ok(())
    }

    /// Record a bottom-view node's base and recurse over its outgoing edges.
    fn visit_bottom(&mut self, bid: BotId, from: Arrival) -> SyncResult {
        let dna = self.bot_dna(bid);
        if from != Arrival::Parse {
            self.col_map_insert(&dna)?;
        }
        if !self.check_range(&dna) {
            return Ok(());
        }
        let originating = if let Arrival::Child(slot) = from {
            self.follow_parse_up(bid)?;
            Some(slot)
        } else {
            None
        };
        let num_children = self.bots[bid.0 as usize].children.len();
        for slot in 0..num_children {
            if originating == Some(slot) {
                continue;
            }
            self.follow_child(bid, slot)?;
        }
        Ok(())
    }

    fn follow_parent(&mut self, tid: TopId) -> SyncResult {
        let seg = self.top_seg(tid);
        if seg.genome == self.root_genome {
            return Ok(());
        }
        let Some(parent_cursor) = seg.parent(self.tree) else {
            return Ok(());
        };
        let parent_genome = parent_cursor.genome;
        let slot = self
            .tree
            .genome(parent_genome)
            .child_slot(seg.genome)
            .expect("parent link from a genome that is not a child");
        let bid = match self.tops[tid.0 as usize].parent {
            Some(b) => b,
            None => {
                let b = self.new_bottom_node(parent_genome);
                self.bots[b.0 as usize].children[slot] = Some(tid);
                self.tops[tid.0 as usize].parent = Some(b);
                b
            }
        };
        let mut dna = DnaCursor::new(parent_genome, parent_cursor.start_position(self.tree));
        dna.set_reversed(parent_cursor.is_reversed());
        let node = &mut self.bots[bid.0 as usize];
        node.seg = Some(parent_cursor);
        node.dna = Some(dna);
        self.visit_bottom(bid, Arrival::Child(slot))
    }

    fn follow_child(&mut self, bid: BotId, slot: usize) -> SyncResult {
        let seg = self.bot_seg(bid);
        let Some(child_cursor) = seg.child(self.tree, slot) else {
            return Ok(());
        };
        let tid = match self.bots[bid.0 as usize].children[slot] {
            Some(t) => t,
            None => {
                let t = self.new_top_node();
                self.tops[t.0 as usize].parent = Some(bid);
                self.bots[bid.0 as usize].children[slot] = Some(t);
                t
            }
        };
        let mut dna = DnaCursor::new(child_cursor.genome, child_cursor.start_position(self.tree));
        dna.set_reversed(child_cursor.is_reversed());
        let node = &mut self.tops[tid.0 as usize];
        node.seg = Some(child_cursor);
        node.dna = Some(dna);
        self.visit_top(tid, Arrival::Parent)
    }

    fn follow_parse_up(&mut self, bid: BotId) -> SyncResult {
        let seg = self.bot_seg(bid);
        if !seg.has_parse_up(self.tree) {
            return Ok(());
        }
        let Some(up) = seg.parse_up(self.tree) else {
            return Ok(());
        };
        let tid = match self.bots[bid.0 as usize].top_parse {
            Some(t) => t,
            None => {
                let t = self.new_top_node();
                self.tops[t.0 as usize].bottom_parse = Some(bid);
                self.bots[bid.0 as usize].top_parse = Some(t);
                t
            }
        };
        let mut dna = DnaCursor::new(up.genome, up.start_position(self.tree));
        dna.set_reversed(up.is_reversed());
        debug_assert_eq!(dna.array_index(), self.bot_dna(bid).array_index());
        let node = &mut self.tops[tid.0 as usize];
        node.seg = Some(up);
        node.dna = Some(dna);
        self.visit_top(tid, Arrival::Parse)
    }

    fn follow_parse_down(&mut self, tid: TopId) -> SyncResult {
        let seg = self.top_seg(tid);
        if !seg.has_parse_down(self.tree) {
            return Ok(());
        }
        let Some(down) = seg.parse_down(self.tree) else {
            return Ok(());
        };
        let bid = match self.tops[tid.0 as usize].bottom_parse {
            Some(b) => b,
            None => {
                let b = self.new_bottom_node(seg.genome);
                self.bots[b.0 as usize].top_parse = Some(tid);
                self.tops[tid.0 as usize].bottom_parse = Some(b);
                b
            }
        };
        let mut dna = DnaCursor::new(down.genome, down.start_position(self.tree));
        dna.set_reversed(down.is_reversed());
        debug_assert_eq!(dna.array_index(), self.top_dna(tid).array_index());
        let node = &mut self.bots[bid.0 as usize];
        node.seg = Some(down);
        node.dna = Some(dna);
        self.visit_bottom(bid, Arrival::Parse)
    }

    /// Walk the paralogy cycle starting after `tid`, visiting every duplicate
    /// once.
    fn follow_dups(&mut self, tid: TopId) -> SyncResult {
        if self.no_dupes {
            return Ok(());
        }
        let seg = self.top_seg(tid);
        if seg.next_paralogy_index(self.tree).is_none() {
            return Ok(());
        }
        let first = seg.array_index();
        let mut cur = tid;
        loop {
            let cur_seg = self.top_seg(cur);
            let Some(dup_cursor) = cur_seg.next_paralogy(self.tree) else {
                break;
            };
            let dup_id = match self.tops[cur.0 as usize].next_dup {
                Some(d) => d,
                None => {
                    let d = self.new_top_node();
                    // paralogs answer to the same parent segment
                    self.tops[d.0 as usize].parent = self.tops[cur.0 as usize].parent;
                    self.tops[cur.0 as usize].next_dup = Some(d);
                    d
                }
            };
            let mut dna = DnaCursor::new(dup_cursor.genome, dup_cursor.start_position(self.tree));
            dna.set_reversed(dup_cursor.is_reversed());
            let node = &mut self.tops[dup_id.0 as usize];
            node.seg = Some(dup_cursor);
            node.dna = Some(dna);
            self.visit_top(dup_id, Arrival::Dup)?;
            cur = dup_id;
            match self.top_seg(cur).next_paralogy_index(self.tree) {
                None => break,
                Some(i) if i == first => break,
                Some(_) => {}
            }
        }
        Ok(())
    }

    // ---- indel discovery --------------------------------------------------

    /// Whether a candidate indel of `length` fits the insertion budget on
    /// top of the active region. The budget bounds each chain of nested
    /// regions; sibling indels discovered in the same column are each
    /// checked against the enclosing region alone.
    fn fits_budget(&self, length: i64) -> bool {
        length as u64 + self.top_entry().cum_size <= self.max_insertion_length
    }

    /// Push a nested region onto the pending stack if the same range is not
    /// already there.
    fn push_indel_region(&mut self, seq: SeqKey, first: i64, last: i64) {
        debug_assert!(last >= first);
        if self
            .indel_stack
            .iter()
            .any(|e| e.seq == seq && e.first_index == first && e.last_index == last)
        {
            return;
        }
        let cum_size = self.top_entry().cum_size + (last - first + 1) as u64;
        debug_assert!(cum_size <= self.max_insertion_length);
        debug!("entering nested region {:?} [{}, {}]", seq, first, last);
        let entry = self.new_region(seq, first, last, cum_size);
        self.indel_stack.push(entry);
    }

    /// Detect a deletion beginning at the right edge of the cursor's segment
    /// and, budget permitting, queue the deleted parent range as a nested
    /// region.
    fn scan_deletion(&mut self, seg: &TopCursor) {
        if self.max_insertion_length == 0 || !seg.has_parent(self.tree) {
            return;
        }
        let mut t = *seg;
        if t.is_reversed() {
            t.to_reverse();
        }
        // only at the breakpoint itself, never mid-segment
        if t.end_offset() != 0 {
            return;
        }
        t.reset_slice();
        debug_assert!(self.scanner.is_atomic());
        if self.scanner.identify_deletion_from_left_breakpoint(self.tree, &t)
            && self.fits_budget(self.scanner.length())
        {
            let (first, last) = self.scanner.deleted_range();
            let parent = self
                .tree
                .genome(t.genome)
                .parent
                .expect("deletion implies a parent genome");
            let seq = self
                .tree
                .genome(parent)
                .sequence_containing(first)
                .expect("deleted range outside any sequence");
            self.push_indel_region(
                SeqKey {
                    genome: parent,
                    seq,
                },
                first,
                last,
            );
        }
    }

    /// Detect an insertion immediately right of the cursor's segment and,
    /// budget permitting, queue the inserted child range as a nested region.
    fn scan_insertion(&mut self, seg: &TopCursor) {
        if self.max_insertion_length == 0 || !seg.has_parent(self.tree) {
            return;
        }
        let mut t = *seg;
        let reversed = t.is_reversed();
        if t.end_offset() != 0 {
            return;
        }
        t.reset_slice();
        if !t.to_right(self.tree) {
            return;
        }
        if reversed {
            t.to_reverse();
        }
        debug_assert!(self.scanner.is_atomic());
        if self.scanner.identify_insertion_from_left_breakpoint(self.tree, &t)
            && self.fits_budget(self.scanner.length())
        {
            let (first, last) = self.scanner.inserted_range();
            let seq = self
                .tree
                .genome(t.genome)
                .sequence_containing(first)
                .expect("inserted range outside any sequence");
            self.push_indel_region(
                SeqKey {
                    genome: t.genome,
                    seq,
                },
                first,
                last,
            );
        }
    }

    // ---- emission ---------------------------------------------------------

    /// Record one base in the column map, tracking it in the visit cache per
    /// the tracking policy. Voids the column when the position was already
    /// emitted.
    fn col_map_insert(&mut self, dna: &DnaCursor) -> SyncResult {
        let key = dna
            .seq_key(self.tree)
            .expect("DNA position outside any sequence");
        let array_index = dna.array_index();
        let root_seq = self.stack[0].seq;
        let update_cache = if self.max_insertion_length == 0 {
            // no nested regions can exist: history left of the cursor is
            // unreachable and need not be retained
            debug_assert_eq!(self.stack.len(), 1);
            key == root_seq && self.stack[0].index < array_index
        } else {
            key == root_seq || self.stack.iter().skip(1).any(|e| e.seq == key)
        };
        let found = if update_cache {
            !self
                .visit_cache
                .entry(key.genome)
                .or_default()
                .insert(array_index)
        } else {
            self.visit_cache
                .get(&key.genome)
                .is_some_and(|c| c.contains(array_index))
        };
        if found || self.col_map.contains_base(key, array_index) {
            return Err(Voided);
        }
        self.col_map.push(
            key,
            ColumnBase {
                array_index,
                base: dna.base(self.tree),
                reversed: dna.is_reversed(),
            },
        );
        Ok(())
    }

    /// A neighbor landing on the active sequence must never sit left of the
    /// region's own cursor; other sequences are unconstrained.
    fn check_range(&self, dna: &DnaCursor) -> bool {
        let e = self.top_entry();
        match dna.seq_key(self.tree) {
            Some(key) if key == e.seq => dna.array_index() >= e.index,
            _ => true,
        }
    }

    #[cfg(debug_assertions)]
    fn assert_column_consistent(&self) {
        let mut seen = rustc_hash::FxHashSet::default();
        for (key, bases) in self.col_map.iter() {
            for base in bases {
                assert!(
                    seen.insert((key, base.array_index)),
                    "column holds {:?}:{} twice",
                    key,
                    base.array_index
                );
            }
        }
    }
}
