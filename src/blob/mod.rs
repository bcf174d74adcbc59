//! Blob Module
//!
//! Content-addressable storage for cached values.
//!
//! ## Responsibilities
//! - Name each payload by the SHA-512 digest of its uncompressed bytes
//! - Store payloads gzip-compressed, one file per digest
//! - Write through a temp file + rename so a blob is either whole or absent
//! - Verify digests on read
//!
//! ## Layout
//! ```text
//! {data_dir}/
//!   ├── 3c9909afec25354d551dae21590bb26e38d53f21...   (gzip payload)
//!   └── .3c9909afec25354d551dae21590bb26e38d53f21....tmp (only mid-write)
//! ```

mod store;

use sha2::{Digest, Sha512};

use crate::error::{Result, ZealotError};

pub use store::BlobStore;
pub(crate) use store::fsync_dir;

/// Length of a hex-encoded SHA-512 digest
pub const DIGEST_HEX_LEN: usize = 128;

/// Hex-encoded SHA-512 digest of `bytes`
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha512::digest(bytes))
}

/// True if `s` looks like a digest this store could have produced
pub fn is_valid_digest(s: &str) -> bool {
    s.len() == DIGEST_HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Reject anything that is not a lowercase hex digest before it reaches a path
pub(crate) fn check_digest(s: &str) -> Result<()> {
    if is_valid_digest(s) {
        Ok(())
    } else {
        Err(ZealotError::InvalidDigest(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_of_empty_input() {
        assert_eq!(
            digest(b""),
            "cf83e1357eefb8bdf1542850d66d8007d620e4050b5715dc83f4a921d36ce9ce\
             47d0d13c5d85f2b0ff8318d2877eec2f63b931bd47417a81a538327af927da3e"
        );
    }

    #[test]
    fn test_digest_shape() {
        let d = digest(b"abc");
        assert!(is_valid_digest(&d));
        assert!(!is_valid_digest(&d.to_uppercase()));
        assert!(!is_valid_digest(&d[..64]));
        assert!(!is_valid_digest("../../etc/passwd"));
    }
}
