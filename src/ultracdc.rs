//! The UltraCDC cut-point kernel.
//!
//! Slides an 8 byte window over the input and scores it by Hamming distance
//! against the fixed pattern `0xAAAA_AAAA_AAAA_AAAA`, cutting where the
//! masked distance reaches zero. Runs of identical windows take a low
//! entropy fast path: after [`LEST`] consecutive repeats the kernel forces a
//! cut instead of growing a giant uniform chunk.
//!
//! The pattern, both masks, the threshold, and the byte-indexed inner scan
//! are frozen; together they define the bytes-to-cuts contract of the
//! `"ultracdc"` kernel name.

use crate::kernel::CutpointKernel;
use crate::{ChunkerError, ChunkerOptions};

/// Strict mask, applied below the normal point.
const MASK_S: u32 = 0x2F;
/// Relaxed mask, applied from the normal point on. It ignores two more bits
/// than [`MASK_S`] and so matches more readily.
const MASK_L: u32 = 0x2C;
/// Low entropy string threshold: identical consecutive windows tolerated
/// before a cut is forced.
const LEST: usize = 64;
/// The byte the distance is measured against.
const PATTERN: u8 = 0xAA;

/// Hamming weight of `byte ^ PATTERN` for every byte value. The table load
/// measures faster than POPCNT and needs no target support.
const DISTANCE: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut byte = 0usize;
    while byte < 256 {
        table[byte] = (byte as u8 ^ PATTERN).count_ones() as u8;
        byte += 1;
    }
    table
};

/// The UltraCDC kernel. Stateless; scratch state lives on the stack of each
/// [`CutpointKernel::cutpoint`] call.
#[derive(Clone, Copy, Debug, Default)]
pub struct UltraCdc;

impl CutpointKernel for UltraCdc {
    fn default_options(&self) -> ChunkerOptions {
        ChunkerOptions::new(2 * 1024, 8 * 1024, 64 * 1024)
    }

    fn validate(&self, opts: &ChunkerOptions) -> Result<(), ChunkerError> {
        opts.validate()?;
        if opts.min_size % 8 != 0 {
            return Err(ChunkerError::MinSizeNotMultipleOf8);
        }
        Ok(())
    }

    fn cutpoint(&self, opts: &ChunkerOptions, data: &[u8], n: usize) -> usize {
        let min_size = opts.min_size;
        let mut normal_size = opts.normal_size;
        let mut n = n;
        if n <= min_size {
            return n;
        }
        if n >= opts.max_size {
            n = opts.max_size;
        } else if n <= normal_size {
            // Short tails never reach the relaxed mask.
            normal_size = n;
        }
        if n < min_size + 8 {
            // Not enough bytes past the minimum to seat a window.
            return n;
        }

        let mut mask = MASK_S;
        let mut out_win = read_window(data, min_size);
        let mut dist: u32 = data[min_size..min_size + 8]
            .iter()
            .map(|&byte| u32::from(DISTANCE[byte as usize]))
            .sum();
        let mut low_entropy = 0;

        let mut i = min_size + 8;
        while i <= n - 8 {
            if i >= normal_size {
                mask = MASK_L;
            }
            let in_win = read_window(data, i);
            if in_win == out_win {
                // Identical window: the distance is unchanged, only the run
                // length grows.
                low_entropy += 1;
                if low_entropy >= LEST {
                    return i + 8;
                }
                i += 8;
                continue;
            }
            low_entropy = 0;
            for j in 0..8 {
                if dist & mask == 0 {
                    return i + j;
                }
                let incoming = u32::from(DISTANCE[data[i + j] as usize]);
                let outgoing = u32::from(DISTANCE[data[i + j - 8] as usize]);
                // The outgoing byte is part of the current window, so the
                // sum stays non-negative in this order.
                dist = dist + incoming - outgoing;
            }
            out_win = in_win;
            i += 8;
        }
        n
    }
}

/// Unaligned little-endian load of the 8 byte window at `at`; the input
/// buffer carries no alignment guarantee.
#[inline]
fn read_window(data: &[u8], at: usize) -> u64 {
    let mut window = [0u8; 8];
    window.copy_from_slice(&data[at..at + 8]);
    u64::from_le_bytes(window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::new_chunker;
    use rand::prelude::*;
    use std::io::Cursor;

    fn get_test_data() -> Vec<u8> {
        let size = 524_288;
        let mut vec = vec![0_u8; size];
        rand::thread_rng().fill_bytes(&mut vec);
        vec
    }

    fn chunk_lengths(data: Vec<u8>) -> Vec<usize> {
        new_chunker("ultracdc", Cursor::new(data), None)
            .unwrap()
            .map(|chunk| chunk.unwrap().len())
            .collect()
    }

    // Data should be split into one or more chunks.
    #[test]
    fn one_or_more_chunks() {
        assert!(chunk_lengths(get_test_data()).len() > 1);
    }

    // Data should be identical after reassembly by simple concatenation.
    #[test]
    fn reassemble_data() {
        let data = get_test_data();
        let chunks: Vec<Vec<u8>> = new_chunker("ultracdc", Cursor::new(data.clone()), None)
            .unwrap()
            .map(|chunk| chunk.unwrap())
            .collect();
        assert_eq!(chunks.concat(), data);
    }

    // Running the chunker over the same data twice should result in
    // identical chunks.
    #[test]
    fn identical_chunks() {
        let data = get_test_data();
        assert_eq!(chunk_lengths(data.clone()), chunk_lengths(data));
    }

    // Verifies that this kernel does not produce chunks larger than max_size.
    #[test]
    fn max_size() {
        let max_size = UltraCdc.default_options().max_size;
        for length in chunk_lengths(get_test_data()) {
            assert!(length <= max_size);
        }
    }

    // Verifies that this kernel, at most, produces one under-sized chunk,
    // and that it comes last.
    #[test]
    fn min_size() {
        let min_size = UltraCdc.default_options().min_size;
        let lengths = chunk_lengths(get_test_data());
        let undersized = lengths.iter().filter(|&&len| len < min_size).count();
        assert!(undersized <= 1);
        if undersized == 1 {
            assert!(lengths.last().unwrap() < &min_size);
        }
    }

    #[test]
    fn low_entropy_run_forces_a_cut() {
        // A run long enough to hold LEST identical windows past the first
        // one cuts at min + 8 + 8 * LEST, without consulting the masks.
        let opts = ChunkerOptions::new(64, 128, 1024);
        let mut data = vec![0x55u8; 1024];
        let mut tail = vec![0u8; 4096];
        rand::thread_rng().fill_bytes(&mut tail);
        data.extend_from_slice(&tail);
        let cut = UltraCdc.cutpoint(&opts, &data, data.len());
        assert_eq!(cut, 64 + 8 + 8 * LEST);
    }

    #[test]
    fn uniform_input_cuts_at_the_entropy_threshold() {
        // All zeroes never satisfy the distance masks; every cut comes from
        // the low entropy path until the tail runs out.
        let opts = UltraCdc.default_options();
        let data = vec![0u8; opts.max_size];
        let run = opts.min_size + 8 + 8 * LEST;
        let lengths: Vec<usize> = new_chunker("ultracdc", Cursor::new(data), None)
            .unwrap()
            .map(|chunk| chunk.unwrap().len())
            .collect();
        assert_eq!(lengths.last().copied(), Some(opts.max_size % run));
        for &length in &lengths[..lengths.len() - 1] {
            assert_eq!(length, run);
        }
    }

    #[test]
    fn tail_shorter_than_one_window_is_returned_whole() {
        let opts = ChunkerOptions::new(64, 128, 1024);
        let data = vec![0xC3u8; 67];
        assert_eq!(UltraCdc.cutpoint(&opts, &data, data.len()), 67);
    }

    #[test]
    fn min_size_must_be_byte_aligned() {
        let opts = ChunkerOptions::new(100, 200, 400);
        assert!(matches!(
            UltraCdc.validate(&opts),
            Err(ChunkerError::MinSizeNotMultipleOf8)
        ));
    }
}
