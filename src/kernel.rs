//! Cut-point kernels and the in-memory batch API.

use std::fmt;

use crate::fastcdc::FastCdc;
use crate::ultracdc::UltraCdc;
use crate::{ChunkerError, ChunkerOptions};

/// A cut-point kernel: a pure function from a byte window to the offset at
/// which the next chunk ends.
///
/// Kernels must be deterministic. For a fixed prefix of bytes the returned
/// cut is a function of those bytes only, so identical content in two
/// different streams yields identical chunks. That determinism is what makes
/// downstream deduplication work, and it makes the bytes-to-cuts mapping of
/// a registered kernel name part of the library's external contract.
///
/// Kernels never perform I/O, never fail, and never log; everything fallible
/// lives at the chunker boundary.
pub trait CutpointKernel: Send + Sync {
    /// The options applied when a caller passes none.
    fn default_options(&self) -> ChunkerOptions;

    /// Validates options for this kernel. The default is the common bounds
    /// check; kernels may layer further requirements on top.
    fn validate(&self, opts: &ChunkerOptions) -> Result<(), ChunkerError> {
        opts.validate()
    }

    /// Returns the end offset of the next chunk within `data[..n]`.
    ///
    /// Callers guarantee `n <= data.len()` and that `opts` passed
    /// [`CutpointKernel::validate`]. The result lies in `[1, n]`; when
    /// `n <= min_size` it is exactly `n` (the terminal short chunk), and
    /// otherwise it is at least `min_size` and at most `max_size`.
    fn cutpoint(&self, opts: &ChunkerOptions, data: &[u8], n: usize) -> usize;
}

/// The set of kernels a chunker can drive.
///
/// The built-in kernels are plain enum variants, so the hot path dispatches
/// statically. Kernels registered by other crates ride in the
/// [`Kernel::Custom`] slot behind an owned trait object.
pub enum Kernel {
    FastCdc(FastCdc),
    UltraCdc(UltraCdc),
    Custom(Box<dyn CutpointKernel>),
}

impl Kernel {
    pub fn default_options(&self) -> ChunkerOptions {
        match self {
            Kernel::FastCdc(kernel) => kernel.default_options(),
            Kernel::UltraCdc(kernel) => kernel.default_options(),
            Kernel::Custom(kernel) => kernel.default_options(),
        }
    }

    pub fn validate(&self, opts: &ChunkerOptions) -> Result<(), ChunkerError> {
        match self {
            Kernel::FastCdc(kernel) => kernel.validate(opts),
            Kernel::UltraCdc(kernel) => kernel.validate(opts),
            Kernel::Custom(kernel) => kernel.validate(opts),
        }
    }

    /// Finds the next cut in `data[..n]`, enforcing the kernel contract.
    ///
    /// # Panics
    ///
    /// Panics if `n > data.len()`, or if the kernel returns a cut outside
    /// `[1, n]`. A kernel breaking that contract would silently destroy the
    /// identity between the stream and its concatenated chunks, so the
    /// violation surfaces immediately instead.
    pub fn cutpoint(&self, opts: &ChunkerOptions, data: &[u8], n: usize) -> usize {
        assert!(
            n <= data.len(),
            "cut window of {n} bytes exceeds the {} byte buffer",
            data.len()
        );
        let cut = match self {
            Kernel::FastCdc(kernel) => kernel.cutpoint(opts, data, n),
            Kernel::UltraCdc(kernel) => kernel.cutpoint(opts, data, n),
            Kernel::Custom(kernel) => kernel.cutpoint(opts, data, n),
        };
        assert!(
            (1..=n).contains(&cut),
            "kernel returned cut {cut} outside [1, {n}]"
        );
        cut
    }

    /// Returns every chunk boundary in `data` as absolute offsets starting
    /// from `base`, including the terminal boundary `base + data.len()`.
    ///
    /// This is the maximum throughput path for callers who already hold the
    /// whole input in memory: the kernel runs over suffixes of the buffer
    /// directly, with no window refills and no copying.
    pub fn cutpoints(&self, opts: &ChunkerOptions, data: &[u8], base: u64) -> Vec<u64> {
        let mut cuts = Vec::with_capacity(data.len() / opts.min_size + 1);
        let mut rest = data;
        let mut pos = base;
        while !rest.is_empty() {
            let cut = self.cutpoint(opts, rest, rest.len());
            pos += cut as u64;
            cuts.push(pos);
            rest = &rest[cut..];
        }
        cuts
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kernel::FastCdc(_) => f.write_str("Kernel::FastCdc"),
            Kernel::UltraCdc(_) => f.write_str("Kernel::UltraCdc"),
            Kernel::Custom(_) => f.write_str("Kernel::Custom"),
        }
    }
}
