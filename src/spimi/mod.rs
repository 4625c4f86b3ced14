//! Single-pass in-memory indexing (SPIMI) with an external merge.
//!
//! ```text
//!  documents ──► BlockBuilder ──flush──► temp-1, temp-2, ... temp-N
//!                                              │
//!                                     merge_blocks (min-heap)
//!                                              │
//!                         primary ◄────────────┼────────────► tertiary
//!                                          secondary
//! ```
//!
//! Both halves keep memory bounded: the builder by its block threshold, the
//! merger by a fixed read-ahead window per block and a fixed write buffer.

pub mod block;
pub mod iterator;
pub mod merge;

pub use block::{block_path, BlockBuilder, TEMP_BLOCK_PREFIX};
pub use merge::{merge_blocks, merge_by_tf, MergeOutput, TieredWriter};
