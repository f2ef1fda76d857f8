//! In-memory genome-tree store.
//!
//! A `GenomeTree` is a rooted tree of genomes linked by segment arrays:
//! each genome's top segments map it onto its parent, and its bottom
//! segments map it onto its children. DNA is addressed by a genome-wide
//! array index (the genome coordinate). The store is built once, then
//! queried read-only by cursors and the column iterator.

use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Error as IoError};
use std::path::Path;

/// Identifier of a genome within a `GenomeTree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GenomeId(pub u32);

/// Identifier of a sequence: owning genome plus position in its sequence list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeqKey {
    pub genome: GenomeId,
    pub seq: u32,
}

#[derive(Debug)]
pub enum TreeError {
    UnknownGenome(u32),
    UnknownSegment(String),
    NotAChild { parent: String, child: String },
    Invalid(String),
    Io(IoError),
    Encode(String),
    Decode(String),
}

impl std::fmt::Display for TreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TreeError::UnknownGenome(id) => write!(f, "Unknown genome id {}", id),
            TreeError::UnknownSegment(msg) => write!(f, "Unknown segment: {}", msg),
            TreeError::NotAChild { parent, child } => {
                write!(f, "Genome '{}' is not a child of '{}'", child, parent)
            }
            TreeError::Invalid(msg) => write!(f, "Invalid genome tree: {}", msg),
            TreeError::Io(e) => write!(f, "IO error: {}", e),
            TreeError::Encode(msg) => write!(f, "Failed to encode genome tree: {}", msg),
            TreeError::Decode(msg) => write!(f, "Failed to decode genome tree: {}", msg),
        }
    }
}

impl std::error::Error for TreeError {}

/// A named contiguous subrange of a genome's coordinate space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    pub name: String,
    pub start: i64,
    pub length: i64,
}

impl Sequence {
    pub fn last_position(&self) -> i64 {
        self.start + self.length - 1
    }
}

/// A maximal block of a genome aligned to one bottom segment of its parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopSegment {
    pub start: i64,
    pub length: i64,
    /// Index of the aligned bottom segment in the parent genome.
    pub parent: Option<u32>,
    /// Orientation relative to the parent segment.
    pub parent_reversed: bool,
    /// Next top segment in this genome's paralogy cycle.
    pub next_paralogy: Option<u32>,
}

/// A maximal block of a genome aligned to at most one top segment per child.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BottomSegment {
    pub start: i64,
    pub length: i64,
    /// One slot per child genome, holding the aligned top segment index.
    pub children: Vec<Option<u32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genome {
    pub name: String,
    pub parent: Option<GenomeId>,
    pub children: Vec<GenomeId>,
    pub sequences: Vec<Sequence>,
    pub dna: Vec<u8>,
    pub tops: Vec<TopSegment>,
    pub bottoms: Vec<BottomSegment>,
}

impl Genome {
    pub fn length(&self) -> i64 {
        self.dna.len() as i64
    }

    /// Find the sequence containing a genome coordinate.
    pub fn sequence_containing(&self, pos: i64) -> Option<u32> {
        if pos < 0 {
            return None;
        }
        let idx = self
            .sequences
            .partition_point(|s| s.start + s.length <= pos);
        (idx < self.sequences.len() && self.sequences[idx].start <= pos).then_some(idx as u32)
    }

    /// Find the top segment containing a genome coordinate.
    pub fn top_containing(&self, pos: i64) -> Option<u32> {
        if pos < 0 {
            return None;
        }
        let idx = self.tops.partition_point(|t| t.start + t.length <= pos);
        (idx < self.tops.len() && self.tops[idx].start <= pos).then_some(idx as u32)
    }

    /// Find the bottom segment containing a genome coordinate.
    pub fn bottom_containing(&self, pos: i64) -> Option<u32> {
        if pos < 0 {
            return None;
        }
        let idx = self.bottoms.partition_point(|b| b.start + b.length <= pos);
        (idx < self.bottoms.len() && self.bottoms[idx].start <= pos).then_some(idx as u32)
    }

    /// Slot of a child genome in this genome's ordered child list.
    pub fn child_slot(&self, child: GenomeId) -> Option<usize> {
        self.children.iter().position(|&c| c == child)
    }
}

/// The whole alignment store: genomes plus their segment and DNA arrays.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenomeTree {
    genomes: Vec<Genome>,
    root: Option<GenomeId>,
}

impl GenomeTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> Option<GenomeId> {
        self.root
    }

    pub fn num_genomes(&self) -> usize {
        self.genomes.len()
    }

    pub fn genome(&self, id: GenomeId) -> &Genome {
        &self.genomes[id.0 as usize]
    }

    pub fn genome_mut(&mut self, id: GenomeId) -> &mut Genome {
        &mut self.genomes[id.0 as usize]
    }

    pub fn find_genome(&self, name: &str) -> Option<GenomeId> {
        self.genomes
            .iter()
            .position(|g| g.name == name)
            .map(|i| GenomeId(i as u32))
    }

    pub fn sequence(&self, key: SeqKey) -> &Sequence {
        &self.genome(key.genome).sequences[key.seq as usize]
    }

    /// Add a genome; the first genome added without a parent becomes the root.
    pub fn add_genome(&mut self, name: &str, parent: Option<GenomeId>) -> GenomeId {
        let id = GenomeId(self.genomes.len() as u32);
        if let Some(p) = parent {
            self.genomes[p.0 as usize].children.push(id);
        } else if self.root.is_none() {
            self.root = Some(id);
        }
        self.genomes.push(Genome {
            name: name.to_owned(),
            parent,
            children: Vec::new(),
            sequences: Vec::new(),
            dna: Vec::new(),
            tops: Vec::new(),
            bottoms: Vec::new(),
        });
        id
    }

    /// Append a sequence; its start offset is the running genome length.
    pub fn add_sequence(&mut self, genome: GenomeId, name: &str, length: i64) -> u32 {
        let g = self.genome_mut(genome);
        let start = g
            .sequences
            .last()
            .map(|s| s.start + s.length)
            .unwrap_or(0);
        g.sequences.push(Sequence {
            name: name.to_owned(),
            start,
            length,
        });
        (g.sequences.len() - 1) as u32
    }

    pub fn set_dna(&mut self, genome: GenomeId, dna: &[u8]) {
        self.genome_mut(genome).dna = dna.to_vec();
    }

    pub fn add_top_segment(&mut self, genome: GenomeId, start: i64, length: i64) -> u32 {
        let g = self.genome_mut(genome);
        g.tops.push(TopSegment {
            start,
            length,
            parent: None,
            parent_reversed: false,
            next_paralogy: None,
        });
        (g.tops.len() - 1) as u32
    }

    pub fn add_bottom_segment(&mut self, genome: GenomeId, start: i64, length: i64) -> u32 {
        let num_children = self.genome(genome).children.len();
        let g = self.genome_mut(genome);
        g.bottoms.push(BottomSegment {
            start,
            length,
            children: vec![None; num_children],
        });
        (g.bottoms.len() - 1) as u32
    }

    /// Link a child top segment to a parent bottom segment, in both directions.
    ///
    /// The first top segment attached to a bottom slot becomes the primary
    /// child link; further attachments (paralogs) only set the upward link
    /// and are reached through the paralogy cycle.
    pub fn attach(
        &mut self,
        parent: GenomeId,
        bottom: u32,
        child: GenomeId,
        top: u32,
        reversed: bool,
    ) -> Result<(), TreeError> {
        let slot = self
            .genome(parent)
            .child_slot(child)
            .ok_or_else(|| TreeError::NotAChild {
                parent: self.genome(parent).name.clone(),
                child: self.genome(child).name.clone(),
            })?;
        if bottom as usize >= self.genome(parent).bottoms.len() {
            return Err(TreeError::UnknownSegment(format!(
                "bottom segment {} of genome '{}'",
                bottom,
                self.genome(parent).name
            )));
        }
        if top as usize >= self.genome(child).tops.len() {
            return Err(TreeError::UnknownSegment(format!(
                "top segment {} of genome '{}'",
                top,
                self.genome(child).name
            )));
        }
        {
            let t = &mut self.genome_mut(child).tops[top as usize];
            t.parent = Some(bottom);
            t.parent_reversed = reversed;
        }
        let b = &mut self.genome_mut(parent).bottoms[bottom as usize];
        if b.children.len() <= slot {
            b.children.resize(slot + 1, None);
        }
        if b.children[slot].is_none() {
            b.children[slot] = Some(top);
        }
        Ok(())
    }

    /// Close a paralogy cycle over top segments of one genome.
    pub fn link_paralogy(&mut self, genome: GenomeId, tops: &[u32]) -> Result<(), TreeError> {
        if tops.len() < 2 {
            return Err(TreeError::Invalid(
                "a paralogy cycle needs at least two top segments".to_owned(),
            ));
        }
        let num_tops = self.genome(genome).tops.len();
        for &t in tops {
            if t as usize >= num_tops {
                return Err(TreeError::UnknownSegment(format!(
                    "top segment {} of genome '{}'",
                    t,
                    self.genome(genome).name
                )));
            }
        }
        let g = self.genome_mut(genome);
        for (i, &t) in tops.iter().enumerate() {
            g.tops[t as usize].next_paralogy = Some(tops[(i + 1) % tops.len()]);
        }
        Ok(())
    }

    /// Check array tiling, link reciprocity and equal-length alignment blocks.
    pub fn validate(&self) -> Result<(), TreeError> {
        for (gi, g) in self.genomes.iter().enumerate() {
            let gid = GenomeId(gi as u32);
            let seq_total: i64 = g.sequences.iter().map(|s| s.length).sum();
            if seq_total != g.length() {
                return Err(TreeError::Invalid(format!(
                    "genome '{}': sequences cover {} bases but DNA array holds {}",
                    g.name,
                    seq_total,
                    g.length()
                )));
            }
            self.validate_tiling(g, &g.name, "top", g.tops.iter().map(|t| (t.start, t.length)))?;
            self.validate_tiling(
                g,
                &g.name,
                "bottom",
                g.bottoms.iter().map(|b| (b.start, b.length)),
            )?;
            for (ti, t) in g.tops.iter().enumerate() {
                if let Some(b) = t.parent {
                    let parent = g.parent.ok_or_else(|| {
                        TreeError::Invalid(format!(
                            "genome '{}': top segment {} has a parent link but no parent genome",
                            g.name, ti
                        ))
                    })?;
                    let pb = self
                        .genome(parent)
                        .bottoms
                        .get(b as usize)
                        .ok_or_else(|| {
                            TreeError::Invalid(format!(
                                "genome '{}': top segment {} links to missing bottom segment {}",
                                g.name, ti, b
                            ))
                        })?;
                    if pb.length != t.length {
                        return Err(TreeError::Invalid(format!(
                            "genome '{}': top segment {} (length {}) aligned to bottom \
                             segment of length {}",
                            g.name, ti, t.length, pb.length
                        )));
                    }
                }
                if let Some(n) = t.next_paralogy {
                    let nseg = g.tops.get(n as usize).ok_or_else(|| {
                        TreeError::Invalid(format!(
                            "genome '{}': top segment {} links to missing paralog {}",
                            g.name, ti, n
                        ))
                    })?;
                    if nseg.parent != t.parent {
                        return Err(TreeError::Invalid(format!(
                            "genome '{}': paralogs {} and {} have different parents",
                            g.name, ti, n
                        )));
                    }
                }
            }
            for (bi, b) in g.bottoms.iter().enumerate() {
                if b.children.len() > g.children.len() {
                    return Err(TreeError::Invalid(format!(
                        "genome '{}': bottom segment {} has {} child slots for {} children",
                        g.name,
                        bi,
                        b.children.len(),
                        g.children.len()
                    )));
                }
                for (slot, &child_top) in b.children.iter().enumerate() {
                    let Some(ct) = child_top else { continue };
                    let child = self.genome(g.children[slot]);
                    let t = child.tops.get(ct as usize).ok_or_else(|| {
                        TreeError::Invalid(format!(
                            "genome '{}': bottom segment {} links to missing top segment {} \
                             of child '{}'",
                            g.name, bi, ct, child.name
                        ))
                    })?;
                    if t.parent != Some(bi as u32) {
                        return Err(TreeError::Invalid(format!(
                            "genome '{}': bottom segment {} and top segment {} of child '{}' \
                             do not link reciprocally",
                            g.name, bi, ct, child.name
                        )));
                    }
                }
            }
            debug!(
                "validated genome '{}' ({:?}): {} sequences, {} top / {} bottom segments",
                g.name,
                gid,
                g.sequences.len(),
                g.tops.len(),
                g.bottoms.len()
            );
        }
        Ok(())
    }

    fn validate_tiling(
        &self,
        g: &Genome,
        name: &str,
        axis: &str,
        extents: impl Iterator<Item = (i64, i64)>,
    ) -> Result<(), TreeError> {
        let mut expected = 0i64;
        let mut any = false;
        for (i, (start, length)) in extents.enumerate() {
            any = true;
            if start != expected || length <= 0 {
                return Err(TreeError::Invalid(format!(
                    "genome '{}': {} segment {} starts at {} (expected {}) with length {}",
                    name, axis, i, start, expected, length
                )));
            }
            let first_seq = g.sequence_containing(start);
            let last_seq = g.sequence_containing(start + length - 1);
            if first_seq.is_none() || first_seq != last_seq {
                return Err(TreeError::Invalid(format!(
                    "genome '{}': {} segment {} crosses a sequence boundary",
                    name, axis, i
                )));
            }
            expected += length;
        }
        if any && expected != g.length() {
            return Err(TreeError::Invalid(format!(
                "genome '{}': {} segments cover {} of {} bases",
                name,
                axis,
                expected,
                g.length()
            )));
        }
        Ok(())
    }

    /// Write a bincode snapshot of the whole store.
    pub fn save(&self, path: &Path) -> Result<(), TreeError> {
        let file = File::create(path).map_err(TreeError::Io)?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .map_err(|e| TreeError::Encode(e.to_string()))?;
        Ok(())
    }

    /// Read back a snapshot written by [`GenomeTree::save`], validating it.
    pub fn load(path: &Path) -> Result<Self, TreeError> {
        let file = File::open(path).map_err(TreeError::Io)?;
        let mut reader = BufReader::new(file);
        let tree: GenomeTree =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
                .map_err(|e| TreeError::Decode(e.to_string()))?;
        tree.validate()?;
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_genome_tree() -> GenomeTree {
        let mut tree = GenomeTree::new();
        let root = tree.add_genome("root", None);
        let child = tree.add_genome("child", Some(root));
        tree.add_sequence(root, "r1", 10);
        tree.set_dna(root, b"ACGTACGTAC");
        tree.add_sequence(child, "c1", 10);
        tree.set_dna(child, b"ACGTACGTAC");
        let b = tree.add_bottom_segment(root, 0, 10);
        let t = tree.add_top_segment(child, 0, 10);
        tree.attach(root, b, child, t, false).unwrap();
        tree
    }

    #[test]
    fn test_build_and_validate() {
        let tree = two_genome_tree();
        assert!(tree.validate().is_ok());
        assert_eq!(tree.root(), tree.find_genome("root"));
        let child = tree.find_genome("child").unwrap();
        assert_eq!(tree.genome(child).parent, tree.find_genome("root"));
    }

    #[test]
    fn test_sequence_and_segment_lookup() {
        let mut tree = GenomeTree::new();
        let g = tree.add_genome("g", None);
        tree.add_sequence(g, "s1", 4);
        tree.add_sequence(g, "s2", 6);
        tree.set_dna(g, b"ACGTACGTAC");
        tree.add_bottom_segment(g, 0, 4);
        tree.add_bottom_segment(g, 4, 6);

        let genome = tree.genome(g);
        assert_eq!(genome.sequence_containing(0), Some(0));
        assert_eq!(genome.sequence_containing(3), Some(0));
        assert_eq!(genome.sequence_containing(4), Some(1));
        assert_eq!(genome.sequence_containing(9), Some(1));
        assert_eq!(genome.sequence_containing(10), None);
        assert_eq!(genome.bottom_containing(3), Some(0));
        assert_eq!(genome.bottom_containing(4), Some(1));
        assert_eq!(genome.bottom_containing(10), None);
    }

    #[test]
    fn test_validate_rejects_gap_in_tiling() {
        let mut tree = GenomeTree::new();
        let g = tree.add_genome("g", None);
        tree.add_sequence(g, "s1", 10);
        tree.set_dna(g, b"ACGTACGTAC");
        tree.add_bottom_segment(g, 0, 4);
        tree.add_bottom_segment(g, 5, 5);
        assert!(tree.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unequal_link_lengths() {
        let mut tree = GenomeTree::new();
        let root = tree.add_genome("root", None);
        let child = tree.add_genome("child", Some(root));
        tree.add_sequence(root, "r1", 10);
        tree.set_dna(root, b"ACGTACGTAC");
        tree.add_sequence(child, "c1", 10);
        tree.set_dna(child, b"ACGTACGTAC");
        let b0 = tree.add_bottom_segment(root, 0, 4);
        tree.add_bottom_segment(root, 4, 6);
        let t0 = tree.add_top_segment(child, 0, 5);
        tree.add_top_segment(child, 5, 5);
        tree.attach(root, b0, child, t0, false).unwrap();
        assert!(tree.validate().is_err());
    }

    #[test]
    fn test_attach_rejects_non_child() {
        let mut tree = GenomeTree::new();
        let a = tree.add_genome("a", None);
        let b = tree.add_genome("b", None);
        tree.add_sequence(a, "s", 2);
        tree.set_dna(a, b"AC");
        tree.add_sequence(b, "s", 2);
        tree.set_dna(b, b"AC");
        let bot = tree.add_bottom_segment(a, 0, 2);
        let top = tree.add_top_segment(b, 0, 2);
        assert!(matches!(
            tree.attach(a, bot, b, top, false),
            Err(TreeError::NotAChild { .. })
        ));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let tree = two_genome_tree();
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("aln.bin");
        tree.save(&path).unwrap();
        let loaded = GenomeTree::load(&path).unwrap();
        assert_eq!(loaded.num_genomes(), 2);
        let child = loaded.find_genome("child").unwrap();
        assert_eq!(loaded.genome(child).tops.len(), 1);
        assert_eq!(loaded.genome(child).dna, b"ACGTACGTAC");
    }
}
