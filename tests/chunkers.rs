//! Cross-surface equivalence: for a fixed source and options, the pull,
//! sink, and callback surfaces and the batch cutpoint API must all see the
//! same chunk boundaries, and the concatenated chunks must equal the source.

use cdc_chunkers::{lookup, new_chunker, ChunkerOptions};
use rand::prelude::*;
use sha2::{Digest, Sha256};
use std::io::{self, Cursor, Write};

const DATA_LEN: usize = 4 << 20;

fn test_corpus() -> Vec<u8> {
    let mut data = vec![0u8; DATA_LEN];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

/// Keeps fastcdc chunks small enough that a few MiB of input produce a
/// meaningful number of them.
fn fastcdc_opts() -> Option<ChunkerOptions> {
    Some(ChunkerOptions::new(4096, 16384, 65536))
}

struct RecordingSink {
    lengths: Vec<usize>,
    hasher: Sha256,
}

impl Write for RecordingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lengths.push(buf.len());
        self.hasher.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn lengths_via_next(
    name: &str,
    opts: Option<ChunkerOptions>,
    data: &[u8],
) -> (Vec<usize>, [u8; 32]) {
    let mut chunker = new_chunker(name, Cursor::new(data.to_vec()), opts).unwrap();
    let mut lengths = Vec::new();
    let mut hasher = Sha256::new();
    while let Some(chunk) = chunker.next_chunk().unwrap() {
        lengths.push(chunk.len());
        hasher.update(chunk);
    }
    (lengths, hasher.finalize().into())
}

fn lengths_via_copy(
    name: &str,
    opts: Option<ChunkerOptions>,
    data: &[u8],
) -> (Vec<usize>, [u8; 32], u64) {
    let mut chunker = new_chunker(name, Cursor::new(data.to_vec()), opts).unwrap();
    let mut sink = RecordingSink {
        lengths: Vec::new(),
        hasher: Sha256::new(),
    };
    let written = chunker.copy(&mut sink).unwrap();
    (sink.lengths, sink.hasher.finalize().into(), written)
}

fn lengths_via_split(
    name: &str,
    opts: Option<ChunkerOptions>,
    data: &[u8],
) -> (Vec<usize>, [u8; 32]) {
    let mut chunker = new_chunker(name, Cursor::new(data.to_vec()), opts).unwrap();
    let mut lengths = Vec::new();
    let mut hasher = Sha256::new();
    let mut expected_offset = 0u64;
    chunker
        .split(|offset, length, chunk| {
            assert_eq!(offset, expected_offset, "split offsets must be running sums");
            assert_eq!(length as usize, chunk.len());
            expected_offset += length;
            lengths.push(chunk.len());
            hasher.update(chunk);
            Ok(())
        })
        .unwrap();
    (lengths, hasher.finalize().into())
}

fn assert_surfaces_agree(name: &str, opts: Option<ChunkerOptions>) {
    let data = test_corpus();
    let source_digest: [u8; 32] = Sha256::digest(&data).into();

    let (next_lengths, next_digest) = lengths_via_next(name, opts, &data);
    let (copy_lengths, copy_digest, written) = lengths_via_copy(name, opts, &data);
    let (split_lengths, split_digest) = lengths_via_split(name, opts, &data);

    assert_eq!(next_digest, source_digest);
    assert_eq!(copy_digest, source_digest);
    assert_eq!(split_digest, source_digest);
    assert_eq!(written, data.len() as u64);
    assert_eq!(next_lengths, copy_lengths);
    assert_eq!(next_lengths, split_lengths);

    // Size bounds: at most one chunk below min_size, and it comes last.
    let probe = new_chunker(name, Cursor::new(Vec::new()), opts).unwrap();
    let (min_size, max_size) = (probe.min_size(), probe.max_size());
    let mut saw_min_size = false;
    for (index, &length) in next_lengths.iter().enumerate() {
        assert!(length <= max_size, "chunk above max_size");
        if length < min_size {
            assert!(!saw_min_size, "second chunk below min_size");
            assert_eq!(index + 1, next_lengths.len());
            saw_min_size = true;
        }
    }
}

fn assert_batch_matches_streaming(name: &str, opts: Option<ChunkerOptions>) {
    let data = test_corpus();
    let kernel = lookup(name).unwrap();
    let opts = opts.unwrap_or_else(|| kernel.default_options());
    let batch = kernel.cutpoints(&opts, &data, 0);
    let mut chunker = new_chunker(name, Cursor::new(data), Some(opts)).unwrap();
    let mut streamed = Vec::new();
    let mut position = 0u64;
    while let Some(chunk) = chunker.next_chunk().unwrap() {
        position += chunk.len() as u64;
        streamed.push(position);
    }
    assert_eq!(batch, streamed);
}

#[test]
fn fastcdc_surfaces_agree() {
    assert_surfaces_agree("fastcdc", fastcdc_opts());
}

#[test]
fn ultracdc_surfaces_agree() {
    assert_surfaces_agree("ultracdc", None);
}

#[test]
fn fastcdc_batch_matches_streaming() {
    assert_batch_matches_streaming("fastcdc", fastcdc_opts());
}

#[test]
fn ultracdc_batch_matches_streaming() {
    assert_batch_matches_streaming("ultracdc", None);
}

// The chunker must behave identically when the source dribbles bytes in
// small, irregular reads instead of serving the window in one go.
struct DribblingReader {
    data: Vec<u8>,
    position: usize,
    step: usize,
}

impl io::Read for DribblingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = self
            .step
            .min(buf.len())
            .min(self.data.len() - self.position);
        buf[..len].copy_from_slice(&self.data[self.position..self.position + len]);
        self.position += len;
        self.step = self.step % 7000 + 13;
        Ok(len)
    }
}

#[test]
fn short_reads_do_not_move_boundaries() {
    let data = test_corpus();
    let (whole, _) = lengths_via_next("ultracdc", None, &data);
    let dribble = DribblingReader {
        data: data.clone(),
        position: 0,
        step: 1,
    };
    let mut chunker = new_chunker("ultracdc", dribble, None).unwrap();
    let mut lengths = Vec::new();
    while let Some(chunk) = chunker.next_chunk().unwrap() {
        lengths.push(chunk.len());
    }
    assert_eq!(lengths, whole);
}
