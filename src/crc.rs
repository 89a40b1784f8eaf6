//! Checksums used by the verification engine: a thin `crc32fast` wrapper
//! for whole-image digest comparison.

/// Streaming CRC32 (IEEE 802.3 polynomial) used to verify whole-image
/// digests when no SHA-1/MD5 checksum is available. Thin wrapper around
/// `crc32fast::Hasher` so callers don't need to depend on the crate
/// directly.
#[derive(Default)]
pub struct Crc32(crc32fast::Hasher);

impl Crc32 {
    /// Start a new running CRC32.
    pub fn new() -> Crc32 {
        Crc32(crc32fast::Hasher::new())
    }

    /// Fold `data` into the running checksum.
    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    /// Finalize and return the checksum.
    pub fn finalize(self) -> u32 {
        self.0.finalize()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn crc32_matches_crate() {
        let mut c = Crc32::new();
        c.update(b"hello world");
        assert_eq!(c.finalize(), crc32fast::hash(b"hello world"));
    }
}
