//! Content fingerprints.
//!
//! A [`Fingerprint`] is the SHA-1 digest of a byte sequence. It is only used
//! as an equality proxy for manifest contents, never as a security boundary.
//! Remote blobs and local files go through the same digest so the two sides
//! of a reconciliation are directly comparable.

use std::fmt;
use std::io::{self, Read};

use serde::{Serialize, Serializer};
use sha1::{Digest, Sha1};

/// Streaming chunk size for [`fingerprint_reader`].
const READ_CHUNK: usize = 64 * 1024;

/// 160-bit content digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 20]);

impl Fingerprint {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn from_hasher(hasher: Sha1) -> Self {
        let mut out = [0u8; 20];
        out.copy_from_slice(&hasher.finalize());
        Self(out)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Fingerprint an in-memory byte sequence.
pub fn fingerprint(bytes: &[u8]) -> Fingerprint {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    Fingerprint::from_hasher(hasher)
}

/// Fingerprint everything `reader` yields without buffering it whole.
///
/// Returns the digest together with the number of bytes consumed.
pub fn fingerprint_reader<R: Read>(mut reader: R) -> io::Result<(Fingerprint, u64)> {
    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; READ_CHUNK];
    let mut total = 0u64;
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        hasher.update(&buffer[..read]);
        total += read as u64;
    }
    Ok((Fingerprint::from_hasher(hasher), total))
}
