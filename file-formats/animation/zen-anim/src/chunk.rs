//! Chunk framing shared by clip and model script resources
//!
//! Each chunk is a `u16` id and a `u32` payload length followed by the
//! payload. A chunk that claims more bytes than remain in the stream is a
//! fatal parse error.

use crate::error::{AnimError, Result};

/// Size of a chunk header in bytes
pub const CHUNK_HEADER_SIZE: usize = 6;

/// A borrowed chunk inside a resource buffer
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    /// Chunk id
    pub id: u16,
    /// Offset of the chunk header within the resource
    pub offset: u64,
    /// Chunk payload
    pub payload: &'a [u8],
}

/// Iterator over the chunks of a resource buffer
#[derive(Debug, Clone)]
pub struct ChunkReader<'a> {
    data: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> ChunkReader<'a> {
    /// Start reading chunks at the beginning of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            failed: false,
        }
    }

    /// Current byte offset
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl<'a> Iterator for ChunkReader<'a> {
    type Item = Result<Chunk<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.data.len() {
            return None;
        }

        let remaining = self.data.len() - self.pos;
        if remaining < CHUNK_HEADER_SIZE {
            self.failed = true;
            return Some(Err(AnimError::Truncated {
                context: "chunk header",
                expected: CHUNK_HEADER_SIZE,
                actual: remaining,
            }));
        }

        let header = &self.data[self.pos..self.pos + CHUNK_HEADER_SIZE];
        let id = u16::from_le_bytes([header[0], header[1]]);
        let length = u32::from_le_bytes([header[2], header[3], header[4], header[5]]) as usize;
        let offset = self.pos as u64;

        let start = self.pos + CHUNK_HEADER_SIZE;
        let available = self.data.len() - start;
        if length > available {
            self.failed = true;
            return Some(Err(AnimError::Truncated {
                context: "chunk payload",
                expected: length,
                actual: available,
            }));
        }

        self.pos = start + length;
        Some(Ok(Chunk {
            id,
            offset,
            payload: &self.data[start..start + length],
        }))
    }
}

/// Append a chunk to `out`
pub fn write_chunk(out: &mut Vec<u8>, id: u16, payload: &[u8]) {
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_consecutive_chunks() {
        let mut data = Vec::new();
        write_chunk(&mut data, 0xA000, &[]);
        write_chunk(&mut data, 0xA020, &[1, 2, 3]);

        let chunks: Vec<_> = ChunkReader::new(&data).collect::<Result<_>>().unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].id, 0xA000);
        assert!(chunks[0].payload.is_empty());
        assert_eq!(chunks[1].offset, 6);
        assert_eq!(chunks[1].payload, &[1, 2, 3]);
    }

    #[test]
    fn test_overlong_chunk_is_fatal() {
        let mut data = Vec::new();
        write_chunk(&mut data, 0xA090, &[0; 8]);
        data.truncate(10);

        let mut reader = ChunkReader::new(&data);
        assert!(matches!(
            reader.next(),
            Some(Err(AnimError::Truncated { expected: 8, actual: 4, .. }))
        ));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_partial_header_is_fatal() {
        let data = [0x20, 0xA0, 0x01];
        let mut reader = ChunkReader::new(&data);
        assert!(matches!(reader.next(), Some(Err(AnimError::Truncated { .. }))));
    }
}
