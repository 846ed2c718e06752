//! Chunk descriptors and per-file chunk manifests.

use bytes::{Bytes, BytesMut};
use chunkfs_storage::ChunkDigest;
use serde::{Deserialize, Serialize};

use crate::error::{TransferError, TransferResult};

/// One transferable unit of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDescriptor {
    /// Chunk name in the store
    pub name: String,
    /// Digest returned by the store at upload time
    pub digest: ChunkDigest,
    /// Payload size in bytes
    pub size: u64,
    /// 0-based position within the owning file
    pub sequence_index: u64,
}

/// Ordered chunks that reconstruct one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChunkManifest {
    /// File identity this manifest is indexed under
    pub path: String,
    /// Total file size in bytes
    pub total_size: u64,
    /// Chunks in ascending sequence order
    pub chunks: Vec<ChunkDescriptor>,
}

/// A piece of one chunk that overlaps a requested byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan<'a> {
    /// The chunk holding the bytes
    pub chunk: &'a ChunkDescriptor,
    /// First byte within the chunk
    pub start: usize,
    /// One past the last byte within the chunk
    pub end: usize,
}

impl FileChunkManifest {
    /// Build a manifest from chunks already in sequence order.
    pub fn new(path: impl Into<String>, chunks: Vec<ChunkDescriptor>) -> Self {
        let total_size = chunks.iter().map(|c| c.size).sum();
        Self {
            path: path.into(),
            total_size,
            chunks,
        }
    }

    /// Replace the file identity.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Number of chunks
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Check sequence contiguity, chunk sizes and the declared total.
    pub fn validate(&self) -> TransferResult<()> {
        let mut sum = 0u64;
        for (position, chunk) in self.chunks.iter().enumerate() {
            if chunk.sequence_index != position as u64 {
                return Err(self.invalid(format!(
                    "chunk {} has sequence index {}, expected {}",
                    chunk.name, chunk.sequence_index, position
                )));
            }
            if chunk.size == 0 {
                return Err(self.invalid(format!("chunk {} is empty", chunk.name)));
            }
            sum = sum.checked_add(chunk.size).ok_or_else(|| {
                self.invalid(format!("chunk sizes overflow at chunk {}", chunk.name))
            })?;
        }
        if sum != self.total_size {
            return Err(self.invalid(format!(
                "chunk sizes sum to {}, declared size is {}",
                sum, self.total_size
            )));
        }
        Ok(())
    }

    /// Chunk pieces covering `[offset, offset + len)`, clamped to the file.
    /// Empty when the range starts at or past the end.
    pub fn spans(&self, offset: u64, len: u64) -> Vec<ChunkSpan<'_>> {
        let end = offset.saturating_add(len).min(self.total_size);
        let mut spans = Vec::new();
        if offset >= end {
            return spans;
        }

        let mut chunk_start = 0u64;
        for chunk in &self.chunks {
            let chunk_end = chunk_start.saturating_add(chunk.size);
            if chunk_end > offset && chunk_start < end {
                spans.push(ChunkSpan {
                    chunk,
                    start: (offset.max(chunk_start) - chunk_start) as usize,
                    end: (end.min(chunk_end) - chunk_start) as usize,
                });
            }
            if chunk_end >= end {
                break;
            }
            chunk_start = chunk_end;
        }
        spans
    }

    /// Assemble `[offset, offset + len)` from the chunks that overlap it,
    /// asking `fetch` for each one in order. A range inside a single chunk
    /// is returned as a slice of that chunk without copying.
    pub fn read_with<E>(
        &self,
        offset: u64,
        len: u64,
        mut fetch: impl FnMut(&ChunkDescriptor) -> Result<Bytes, E>,
    ) -> Result<Bytes, E> {
        let spans = self.spans(offset, len);
        if let [only] = spans.as_slice() {
            return Ok(fetch(only.chunk)?.slice(only.start..only.end));
        }

        let mut out = BytesMut::new();
        for span in &spans {
            let data = fetch(span.chunk)?;
            out.extend_from_slice(&data[span.start..span.end]);
        }
        Ok(out.freeze())
    }

    fn invalid(&self, reason: String) -> TransferError {
        TransferError::InvalidManifest {
            path: self.path.clone(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkfs_storage::compute_digest;

    fn desc(index: u64, size: u64) -> ChunkDescriptor {
        ChunkDescriptor {
            name: format!("f-{index}"),
            digest: compute_digest(&[index as u8]),
            size,
            sequence_index: index,
        }
    }

    fn ten_bytes_by_four() -> FileChunkManifest {
        FileChunkManifest::new("f", vec![desc(0, 4), desc(1, 4), desc(2, 2)])
    }

    #[test]
    fn new_sums_sizes() {
        let m = ten_bytes_by_four();
        assert_eq!(m.total_size, 10);
        assert_eq!(m.chunk_count(), 3);
        m.validate().unwrap();
    }

    #[test]
    fn empty_manifest_is_valid() {
        let m = FileChunkManifest::new("empty", vec![]);
        assert_eq!(m.total_size, 0);
        m.validate().unwrap();
        assert!(m.spans(0, 100).is_empty());
    }

    #[test]
    fn validate_rejects_gap() {
        let m = FileChunkManifest::new("f", vec![desc(0, 4), desc(2, 4)]);
        assert!(matches!(m.validate(), Err(TransferError::InvalidManifest { .. })));
    }

    #[test]
    fn validate_rejects_duplicate_index() {
        let m = FileChunkManifest::new("f", vec![desc(0, 4), desc(0, 4)]);
        assert!(m.validate().is_err());
    }

    #[test]
    fn validate_rejects_size_mismatch() {
        let mut m = ten_bytes_by_four();
        m.total_size = 11;
        assert!(m.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_chunk() {
        let m = FileChunkManifest::new("f", vec![desc(0, 0)]);
        assert!(m.validate().is_err());
    }

    #[test]
    fn validate_rejects_size_overflow() {
        let mut m = FileChunkManifest::new("f", vec![desc(0, u64::MAX)]);
        m.chunks.push(desc(1, 1));
        assert!(matches!(
            m.validate(),
            Err(TransferError::InvalidManifest { .. })
        ));
        // Span lookup on an unvalidated manifest must not wrap either.
        assert_eq!(m.spans(u64::MAX - 1, 10).len(), 1);
    }

    #[test]
    fn spans_within_one_chunk() {
        let m = ten_bytes_by_four();
        let spans = m.spans(1, 2);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].chunk.sequence_index, 0);
        assert_eq!((spans[0].start, spans[0].end), (1, 3));
    }

    #[test]
    fn spans_across_chunks() {
        let m = ten_bytes_by_four();
        let spans = m.spans(3, 6);
        let summary: Vec<_> = spans
            .iter()
            .map(|s| (s.chunk.sequence_index, s.start, s.end))
            .collect();
        assert_eq!(summary, vec![(0, 3, 4), (1, 0, 4), (2, 0, 1)]);
    }

    #[test]
    fn spans_clamped_at_end() {
        let m = ten_bytes_by_four();
        let spans = m.spans(8, 100);
        assert_eq!(spans.len(), 1);
        assert_eq!((spans[0].chunk.sequence_index, spans[0].start, spans[0].end), (2, 0, 2));
    }

    #[test]
    fn spans_past_end_are_empty() {
        let m = ten_bytes_by_four();
        assert!(m.spans(10, 5).is_empty());
        assert!(m.spans(u64::MAX, u64::MAX).is_empty());
        assert!(m.spans(0, 0).is_empty());
    }

    fn ten_chunk_bodies() -> Vec<Bytes> {
        vec![
            Bytes::from_static(b"abcd"),
            Bytes::from_static(b"efgh"),
            Bytes::from_static(b"ij"),
        ]
    }

    #[test]
    fn read_with_assembles_ranges() {
        let m = ten_bytes_by_four();
        let bodies = ten_chunk_bodies();
        let mut fetched = Vec::new();
        let mut fetch = |d: &ChunkDescriptor| -> Result<Bytes, TransferError> {
            fetched.push(d.sequence_index);
            Ok(bodies[d.sequence_index as usize].clone())
        };

        assert_eq!(&m.read_with(3, 6, &mut fetch).unwrap()[..], b"defghi");
        assert_eq!(&m.read_with(5, 2, &mut fetch).unwrap()[..], b"fg");
        assert_eq!(&m.read_with(8, 100, &mut fetch).unwrap()[..], b"ij");
        assert!(m.read_with(10, 4, &mut fetch).unwrap().is_empty());
        assert_eq!(fetched, vec![0, 1, 2, 1, 2]);
    }

    #[test]
    fn read_with_stops_at_first_error() {
        let m = ten_bytes_by_four();
        let bodies = ten_chunk_bodies();
        let mut calls = 0;
        let err = m
            .read_with(0, 10, |d| {
                calls += 1;
                if d.sequence_index == 1 {
                    Err("gone")
                } else {
                    Ok(bodies[d.sequence_index as usize].clone())
                }
            })
            .unwrap_err();
        assert_eq!(err, "gone");
        assert_eq!(calls, 2);
    }

    #[test]
    fn json_round_trip() {
        let m = ten_bytes_by_four();
        let json = serde_json::to_string(&m).unwrap();
        let back: FileChunkManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(m, back);
    }
}
