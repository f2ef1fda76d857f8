// lib.rs
pub mod column;
pub mod column_iterator;
pub mod cursor;
pub mod position_cache;
pub mod rearrangement;
pub mod tree;

pub use column::{ColumnBase, ColumnMap};
pub use column_iterator::{ColumnIterator, ColumnIteratorError};
pub use tree::{GenomeId, GenomeTree, SeqKey};
