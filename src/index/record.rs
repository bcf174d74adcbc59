//! Index Record framing
//!
//! Each mutation of the index is one framed, checksummed record:
//!
//! ```text
//! ┌─────────┬─────────┬─────────┬──────────────────────────┐
//! │ LSN (8) │ CRC (4) │ Len (4) │ Data: bincode(IndexRecord)│
//! └─────────┴─────────┴─────────┴──────────────────────────┘
//! ```
//!
//! The CRC covers the data bytes only.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Frame header size: LSN (8) + CRC (4) + Len (4)
pub const FRAME_HEADER_SIZE: usize = 16;

/// Mutations recorded in the index log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexRecord {
    /// Set the stored value string for a key
    Upsert { key: String, value: String },

    /// Forget a key
    Remove { key: String },
}

impl IndexRecord {
    pub fn key(&self) -> &str {
        match self {
            IndexRecord::Upsert { key, .. } | IndexRecord::Remove { key } => key,
        }
    }

    /// Frame this record with the given LSN
    pub fn encode(&self, lsn: u64) -> Result<Vec<u8>> {
        let data = bincode::serialize(self)?;
        let crc = crc32fast::hash(&data);

        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + data.len());
        frame.extend_from_slice(&lsn.to_le_bytes());
        frame.extend_from_slice(&crc.to_le_bytes());
        frame.extend_from_slice(&(data.len() as u32).to_le_bytes());
        frame.extend_from_slice(&data);
        Ok(frame)
    }
}

/// Result of decoding one frame from a buffer
#[derive(Debug, PartialEq, Eq)]
pub enum FrameRead {
    /// A valid record and the number of bytes it occupied
    Record {
        lsn: u64,
        record: IndexRecord,
        len: usize,
    },

    /// Not enough bytes for a whole frame (torn write at the tail)
    Incomplete,

    /// Checksum mismatch or undecodable payload
    Corrupt,
}

/// Decode the frame at the start of `buf`
pub fn decode_frame(buf: &[u8]) -> FrameRead {
    if buf.len() < FRAME_HEADER_SIZE {
        return FrameRead::Incomplete;
    }

    let mut lsn_bytes = [0u8; 8];
    lsn_bytes.copy_from_slice(&buf[0..8]);
    let mut crc_bytes = [0u8; 4];
    crc_bytes.copy_from_slice(&buf[8..12]);
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&buf[12..16]);

    let lsn = u64::from_le_bytes(lsn_bytes);
    let crc = u32::from_le_bytes(crc_bytes);
    let data_len = u32::from_le_bytes(len_bytes) as usize;

    let end = match FRAME_HEADER_SIZE.checked_add(data_len) {
        Some(end) if end <= buf.len() => end,
        _ => return FrameRead::Incomplete,
    };

    let data = &buf[FRAME_HEADER_SIZE..end];
    if crc32fast::hash(data) != crc {
        return FrameRead::Corrupt;
    }

    match bincode::deserialize::<IndexRecord>(data) {
        Ok(record) => FrameRead::Record {
            lsn,
            record,
            len: end,
        },
        Err(_) => FrameRead::Corrupt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upsert() -> IndexRecord {
        IndexRecord::Upsert {
            key: "get_html [\"https://example.com\"]".to_string(),
            value: "ab;2030-01-01T00:00:00".to_string(),
        }
    }

    #[test]
    fn test_decode_encoded_frame() {
        let frame = upsert().encode(7).unwrap();
        assert_eq!(
            decode_frame(&frame),
            FrameRead::Record {
                lsn: 7,
                record: upsert(),
                len: frame.len()
            }
        );
    }

    #[test]
    fn test_decode_torn_frame() {
        let frame = upsert().encode(1).unwrap();
        assert_eq!(decode_frame(&frame[..10]), FrameRead::Incomplete);
        assert_eq!(decode_frame(&frame[..frame.len() - 1]), FrameRead::Incomplete);
    }

    #[test]
    fn test_decode_flipped_bit() {
        let mut frame = upsert().encode(1).unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0x01;
        assert_eq!(decode_frame(&frame), FrameRead::Corrupt);
    }

    #[test]
    fn test_record_key() {
        let remove = IndexRecord::Remove {
            key: "k".to_string(),
        };
        assert_eq!(remove.key(), "k");
        assert!(upsert().key().starts_with("get_html"));
    }
}
