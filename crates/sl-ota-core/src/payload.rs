//! Firmware image loading and chunking.
//!
//! GBL images are opaque to the host: the AppLoader validates content on
//! the device side, so the only local check is that the file is non-empty.
//! Chunking is driven by the link MTU; every ATT write carries
//! `mtu - 3` payload bytes, never less than the 20-byte baseline.

use crate::protocol::constants::{ATT_WRITE_OVERHEAD, MIN_WRITE_PAYLOAD};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Firmware image is empty")]
    Empty,
    #[error("No firmware image path configured")]
    PathMissing,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A firmware image held in memory for the duration of the upload.
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    data: Vec<u8>,
}

impl FirmwareImage {
    /// Read an image file. Empty files are rejected before any radio work
    /// happens.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ImageError> {
        Self::from_bytes(std::fs::read(path)?)
    }

    pub fn from_bytes(data: Vec<u8>) -> Result<Self, ImageError> {
        if data.is_empty() {
            return Err(ImageError::Empty);
        }
        Ok(Self { data })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Iterate the image in transmit order.
    pub fn chunks(&self, chunk_size: usize) -> ChunkIterator<'_> {
        ChunkIterator::new(&self.data, chunk_size)
    }
}

/// Usable data bytes per ATT write for a given MTU.
pub fn chunk_size_for_mtu(mtu: usize) -> usize {
    mtu.saturating_sub(ATT_WRITE_OVERHEAD).max(MIN_WRITE_PAYLOAD)
}

/// In-order fixed-size view over an image. Every chunk is `chunk_size`
/// bytes except a shorter final remainder; an exact multiple produces no
/// empty tail.
#[derive(Debug)]
pub struct ChunkIterator<'a> {
    data: &'a [u8],
    chunk_size: usize,
    offset: usize,
    current_chunk: usize,
}

impl<'a> ChunkIterator<'a> {
    /// A zero `chunk_size` is treated as one byte per chunk.
    pub fn new(data: &'a [u8], chunk_size: usize) -> Self {
        Self {
            data,
            chunk_size: chunk_size.max(1),
            offset: 0,
            current_chunk: 0,
        }
    }

    /// Total number of chunks (including the partial tail).
    pub fn total(&self) -> usize {
        if self.data.is_empty() {
            0
        } else {
            self.data.len().div_ceil(self.chunk_size)
        }
    }

    /// Chunks yielded so far.
    pub fn current(&self) -> usize {
        self.current_chunk
    }

    /// Whether the most recently yielded chunk was the final one.
    pub fn is_last(&self) -> bool {
        self.offset >= self.data.len()
    }
}

impl<'a> Iterator for ChunkIterator<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.data.len() {
            return None;
        }

        let remaining = self.data.len() - self.offset;
        let chunk_len = remaining.min(self.chunk_size);

        let chunk = &self.data[self.offset..self.offset + chunk_len];
        self.offset += chunk_len;
        self.current_chunk += 1;

        Some(chunk)
    }
}

/// Upload geometry fixed once the MTU is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPlan {
    /// Payload bytes per data write.
    pub chunk_size: usize,
    /// Number of writes the image needs.
    pub chunk_count: usize,
    /// Image size in bytes.
    pub total_bytes: usize,
    /// Acknowledged data writes when true.
    pub reliable: bool,
}

impl TransferPlan {
    pub fn new(total_bytes: usize, mtu: usize, reliable: bool) -> Self {
        let chunk_size = chunk_size_for_mtu(mtu);
        let chunk_count = if total_bytes == 0 {
            0
        } else {
            total_bytes.div_ceil(chunk_size)
        };
        Self {
            chunk_size,
            chunk_count,
            total_bytes,
            reliable,
        }
    }
}

/// Running counters for an upload in flight.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransferProgress {
    pub chunks_sent: usize,
    pub bytes_sent: usize,
}

impl TransferProgress {
    pub fn record(&mut self, chunk_len: usize) {
        self.chunks_sent += 1;
        self.bytes_sent += chunk_len;
    }

    pub fn percent(&self, plan: &TransferPlan) -> u8 {
        if plan.chunk_count == 0 {
            100
        } else {
            ((self.chunks_sent * 100) / plan.chunk_count) as u8
        }
    }
}

/// Upload rate as (bytes/sec, bits/sec). Zero bytes reports zero rate
/// regardless of elapsed time; a zero or negative elapsed time with data
/// reports infinity rather than panicking.
pub fn throughput(bytes: usize, elapsed_secs: f64) -> (f64, f64) {
    if bytes == 0 {
        return (0.0, 0.0);
    }
    if elapsed_secs <= 0.0 {
        return (f64::INFINITY, f64::INFINITY);
    }
    let bps = bytes as f64 / elapsed_secs;
    (bps, bps * 8.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_chunk_split_counts() {
        let data = image(300);
        let iter = ChunkIterator::new(&data, 20);
        assert_eq!(iter.total(), 15);

        let chunks: Vec<_> = ChunkIterator::new(&data, 20).collect();
        assert_eq!(chunks.len(), 15);
        assert!(chunks.iter().all(|c| c.len() == 20));
    }

    #[test]
    fn test_chunk_split_residual() {
        let data = image(301);
        let chunks: Vec<_> = ChunkIterator::new(&data, 20).collect();
        assert_eq!(chunks.len(), 16);
        assert_eq!(chunks[14].len(), 20);
        assert_eq!(chunks[15].len(), 1);
    }

    #[test]
    fn test_chunk_roundtrip() {
        let data = image(997);
        let rejoined: Vec<u8> = ChunkIterator::new(&data, 61).flatten().copied().collect();
        assert_eq!(rejoined, data);
    }

    #[test]
    fn test_exact_multiple_has_no_empty_tail() {
        let data = image(200);
        let chunks: Vec<_> = ChunkIterator::new(&data, 50).collect();
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.len() == 50));
    }

    #[test]
    fn test_is_last_tracks_tail() {
        let data = image(45);
        let mut iter = ChunkIterator::new(&data, 20);
        iter.next();
        assert!(!iter.is_last());
        iter.next();
        assert!(!iter.is_last());
        iter.next();
        assert!(iter.is_last());
        assert_eq!(iter.current(), 3);
    }

    #[test]
    fn test_zero_chunk_size_treated_as_one() {
        let data = image(5);
        assert_eq!(ChunkIterator::new(&data, 0).total(), 5);

        let chunks: Vec<_> = ChunkIterator::new(&data, 0).collect();
        assert_eq!(chunks.len(), 5);
        assert!(chunks.iter().all(|c| c.len() == 1));
    }

    #[test]
    fn test_chunk_size_from_mtu() {
        assert_eq!(chunk_size_for_mtu(23), 20);
        assert_eq!(chunk_size_for_mtu(250), 247);
        // Floor holds even for absurdly small MTUs
        assert_eq!(chunk_size_for_mtu(10), 20);
    }

    #[test]
    fn test_transfer_plan_counts() {
        let plan = TransferPlan::new(300, 23, false);
        assert_eq!(plan.chunk_size, 20);
        assert_eq!(plan.chunk_count, 15);

        let plan = TransferPlan::new(301, 23, true);
        assert_eq!(plan.chunk_count, 16);
    }

    #[test]
    fn test_transfer_progress_counters() {
        let plan = TransferPlan::new(100, 23, false);
        let data = image(100);
        let mut progress = TransferProgress::default();
        assert_eq!(progress.percent(&plan), 0);
        for chunk in ChunkIterator::new(&data, plan.chunk_size) {
            progress.record(chunk.len());
        }
        assert_eq!(progress.chunks_sent, 5);
        assert_eq!(progress.bytes_sent, 100);
        assert_eq!(progress.percent(&plan), 100);
    }

    #[test]
    fn test_throughput_values() {
        assert_eq!(throughput(1000, 1.0), (1000.0, 8000.0));
        let (bps, bits) = throughput(500, 2.0);
        assert_eq!(bps, 250.0);
        assert_eq!(bits, 2000.0);
    }

    #[test]
    fn test_throughput_guards() {
        assert_eq!(throughput(0, 1.0), (0.0, 0.0));
        assert_eq!(throughput(0, 0.0), (0.0, 0.0));
        let (bps, _) = throughput(10, 0.0);
        assert!(bps.is_infinite());
    }

    #[test]
    fn test_empty_image_rejected() {
        assert!(matches!(
            FirmwareImage::from_bytes(Vec::new()),
            Err(ImageError::Empty)
        ));
    }

    #[test]
    fn test_image_chunks() {
        let img = FirmwareImage::from_bytes(image(100)).unwrap();
        assert_eq!(img.len(), 100);
        assert_eq!(img.chunks(33).total(), 4);
    }
}
