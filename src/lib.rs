//! Content defined chunking over byte streams, with pluggable cut-point
//! kernels.
//!
//! A chunker splits its input into variable length chunks whose boundaries
//! depend only on nearby byte content, so inserting or deleting a few bytes
//! in a large stream disturbs only the chunks around the edit. Chunkers must
//! meet three properties:
//!
//! 1.) Data must be split into one or more chunks
//! 2.) Data must be identical to the original after reconstruction by simple
//!     concatenation
//! 3.) The same data and settings must produce the same chunks every time
//!
//! Two kernels are built in, selected by name through [`new_chunker`]:
//! `"fastcdc"` (a rolling Gear hash with normalized chunking) and
//! `"ultracdc"` (a Hamming distance detector with a low entropy fast path).
//! Further kernels can be registered at process start with [`register`].
//!
//! ```no_run
//! # use std::fs::File;
//! let source = File::open("corpus.bin")?;
//! let mut chunker = cdc_chunkers::new_chunker("fastcdc", source, None)?;
//! while let Some(chunk) = chunker.next_chunk()? {
//!     println!("{} bytes", chunk.len());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! When the whole input is already in memory, [`Kernel::cutpoints`] computes
//! every boundary in one pass without any window management.

pub mod chunker;
pub mod fastcdc;
pub mod kernel;
pub mod registry;
pub mod ultracdc;

pub use self::chunker::Chunker;
pub use self::fastcdc::FastCdc;
pub use self::kernel::{CutpointKernel, Kernel};
pub use self::registry::{lookup, new_chunker, register};
pub use self::ultracdc::UltraCdc;

use std::io;
use thiserror::Error;

/// Smallest value any of the three size bounds may take.
pub const SIZE_FLOOR: usize = 64;
/// Largest value any of the three size bounds may take (1 GiB).
pub const SIZE_CEILING: usize = 1 << 30;

#[derive(Error, Debug)]
pub enum ChunkerError {
    #[error("no chunking kernel registered under `{0}`")]
    UnknownKernel(String),
    #[error("MinSize must be between 64 B and 1 GiB and below NormalSize")]
    InvalidMinSize,
    #[error("NormalSize must be between 64 B and 1 GiB")]
    InvalidNormalSize,
    #[error("MaxSize must be between 64 B and 1 GiB and above NormalSize")]
    InvalidMaxSize,
    #[error("MinSize must be a multiple of 8")]
    MinSizeNotMultipleOf8,
    #[error("error reading from chunk source")]
    Source(#[source] io::Error),
    #[error("error writing chunk to sink")]
    Sink(#[source] io::Error),
    #[error("chunk callback failed")]
    Callback(#[source] io::Error),
}

/// Size bounds steering a cut-point kernel.
///
/// `normal_size` is the geometric target ("average") chunk size. `min_size`
/// and `max_size` bound every emitted chunk, except that the final chunk of
/// a stream may come up short. Options are validated once when a chunker is
/// built and never change afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkerOptions {
    pub min_size: usize,
    pub normal_size: usize,
    pub max_size: usize,
}

impl ChunkerOptions {
    pub fn new(min_size: usize, normal_size: usize, max_size: usize) -> Self {
        ChunkerOptions {
            min_size,
            normal_size,
            max_size,
        }
    }

    /// Checks the bounds shared by every kernel: each size within
    /// `[64 B, 1 GiB]` and `min_size < normal_size < max_size`. The first
    /// violated bound decides the error kind: normal, then min, then max.
    pub fn validate(&self) -> Result<(), ChunkerError> {
        let bounded = |size: usize| (SIZE_FLOOR..=SIZE_CEILING).contains(&size);
        if !bounded(self.normal_size) {
            return Err(ChunkerError::InvalidNormalSize);
        }
        if !bounded(self.min_size) || self.min_size >= self.normal_size {
            return Err(ChunkerError::InvalidMinSize);
        }
        if !bounded(self.max_size) || self.max_size <= self.normal_size {
            return Err(ChunkerError::InvalidMaxSize);
        }
        Ok(())
    }
}
