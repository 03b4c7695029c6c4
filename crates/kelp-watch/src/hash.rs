//! Streaming digest computation for watched files.

use adler32::RollingAdler32;
use md5::Md5;
use sha2::{Digest, Sha256};

use crate::config::HashAlgorithm;
use crate::event::Digests;

/// Accumulates the configured digests over a byte stream.
///
/// SHA-256 is always computed; MD5 and Adler-32 are added when the
/// configuration lists them. Unknown algorithms are rejected at
/// configuration parse time, so construction here cannot fail.
pub struct DigestWriter {
    sha256: Sha256,
    md5: Option<Md5>,
    adler32: Option<RollingAdler32>,
}

impl DigestWriter {
    pub fn new(algorithms: &[HashAlgorithm]) -> Self {
        Self {
            sha256: Sha256::new(),
            md5: algorithms
                .contains(&HashAlgorithm::Md5)
                .then(Md5::new),
            adler32: algorithms
                .contains(&HashAlgorithm::Adler32)
                .then(RollingAdler32::new),
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.sha256.update(bytes);
        if let Some(md5) = self.md5.as_mut() {
            md5.update(bytes);
        }
        if let Some(adler32) = self.adler32.as_mut() {
            adler32.update_buffer(bytes);
        }
    }

    pub fn finalize(self) -> Digests {
        Digests {
            sha256: hex::encode(self.sha256.finalize()),
            md5: self.md5.map(|md5| hex::encode(md5.finalize())),
            adler32: self.adler32.map(|a| format!("{:08x}", a.hash())),
        }
    }
}
