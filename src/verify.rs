//! Verification engine: whole-image digest comparison and per-sector
//! EDC checking.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use md5::{Digest as _, Md5};
use sha1::Sha1;

use crate::model::TrackType;
use crate::CdError;

/// Outcome of a per-sector or whole-image verification check. Modeled as
/// an explicit three-way enum (rather than `Option<bool>`) so call sites
/// read as "ok / failed / not applicable" instead of guessing what `None`
/// means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The stored checksum (EDC, or whole-image digest) matches.
    Good,
    /// The stored checksum doesn't match; the sector or stream is corrupt.
    Bad,
    /// This sector type (or image) carries no checksum to compare against.
    Unknown,
}

/// One mebibyte, the chunk size `verify_media_image` checks cancellation
/// against.
const CHUNK_SIZE: usize = 1024 * 1024;

/// A stored digest to compare a stream against, in the crate's preference
/// order: SHA-1 first, then MD5, then CRC32.
#[derive(Debug, Clone)]
pub enum StoredDigest {
    /// 20-byte SHA-1 digest.
    Sha1([u8; 20]),
    /// 16-byte MD5 digest.
    Md5([u8; 16]),
    /// 4-byte CRC32 checksum.
    Crc32(u32),
}

/// Hash `stream` and compare against `expected`, checking `aborted` once
/// per mebibyte chunk. Returns `Verdict::Unknown` only for the
/// caller to map from "no digest was present" (this function itself
/// always has an `expected` to compare against).
pub fn verify_stream(
    mut stream: impl Read,
    expected: &StoredDigest,
    aborted: &AtomicBool,
) -> Result<Verdict, CdError> {
    let mut buf = vec![0u8; CHUNK_SIZE];

    let matches = match expected {
        StoredDigest::Sha1(want) => {
            let mut hasher = Sha1::new();

            loop {
                if aborted.load(Ordering::Relaxed) {
                    return Err(CdError::Aborted);
                }

                let n = stream.read(&mut buf)?;
                if n == 0 {
                    break;
                }

                hasher.update(&buf[..n]);
            }

            hasher.finalize().as_slice() == want
        }
        StoredDigest::Md5(want) => {
            let mut hasher = Md5::new();

            loop {
                if aborted.load(Ordering::Relaxed) {
                    return Err(CdError::Aborted);
                }

                let n = stream.read(&mut buf)?;
                if n == 0 {
                    break;
                }

                hasher.update(&buf[..n]);
            }

            hasher.finalize().as_slice() == want
        }
        StoredDigest::Crc32(want) => {
            let mut hasher = crate::crc::Crc32::new();

            loop {
                if aborted.load(Ordering::Relaxed) {
                    return Err(CdError::Aborted);
                }

                let n = stream.read(&mut buf)?;
                if n == 0 {
                    break;
                }

                hasher.update(&buf[..n]);
            }

            hasher.finalize() == *want
        }
    };

    Ok(if matches { Verdict::Good } else { Verdict::Bad })
}

fn edc_table() -> &'static [u32; 256] {
    static TABLE: OnceLock<[u32; 256]> = OnceLock::new();

    TABLE.get_or_init(|| {
        let mut table = [0u32; 256];

        let mut i = 0;
        while i < 256 {
            let mut edc = i as u32;
            let mut j = 0;
            while j < 8 {
                edc = (edc >> 1) ^ if edc & 1 != 0 { 0xD8018001 } else { 0 };
                j += 1;
            }
            table[i] = edc;
            i += 1;
        }

        table
    })
}

/// Compute the CD-ROM EDC (ECMA-130 Annex B) over `data`: an LSB-first
/// CRC32 with generator polynomial `0xD8018001`.
pub fn compute_edc(data: &[u8]) -> u32 {
    let table = edc_table();

    data.iter().fold(0u32, |edc, &byte| table[((edc ^ byte as u32) & 0xff) as usize] ^ (edc >> 8))
}

/// Check the EDC of one raw 2352-byte sector of the given `track_type`.
/// Returns `NotApplicable` for shapes that carry no EDC (Audio, cooked
/// `Data`, `CdMode2Formless`).
pub fn verify_sector_edc(track_type: TrackType, raw_sector: &[u8]) -> Verdict {
    let (covered_start, edc) = match track_type {
        TrackType::CdMode1 => (0, crate::geometry::lookup(track_type, crate::geometry::Tag::Edc)),
        TrackType::CdMode2Form1 => (0, crate::geometry::lookup(track_type, crate::geometry::Tag::Edc)),
        TrackType::CdMode2Form2 => (16, crate::geometry::lookup(track_type, crate::geometry::Tag::Edc)),
        TrackType::Audio | TrackType::Data | TrackType::CdMode2Formless => return Verdict::Unknown,
    };

    let edc = match edc {
        Some(e) => e,
        None => return Verdict::Unknown,
    };

    if raw_sector.len() < edc.offset + edc.size {
        return Verdict::Unknown;
    }

    let computed = compute_edc(&raw_sector[covered_start..edc.offset]);
    let stored = u32::from_le_bytes([
        raw_sector[edc.offset],
        raw_sector[edc.offset + 1],
        raw_sector[edc.offset + 2],
        raw_sector[edc.offset + 3],
    ]);

    if computed == stored {
        Verdict::Good
    } else {
        Verdict::Bad
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::TrackType;

    #[test]
    fn audio_has_no_edc() {
        let sector = [0u8; 2352];
        assert_eq!(verify_sector_edc(TrackType::Audio, &sector), Verdict::Unknown);
    }

    #[test]
    fn mode1_edc_round_trips() {
        let mut sector = [0u8; 2352];
        for (i, b) in sector[0..2064].iter_mut().enumerate() {
            *b = i as u8;
        }

        let edc = compute_edc(&sector[0..2064]);
        sector[2064..2068].copy_from_slice(&edc.to_le_bytes());

        assert_eq!(verify_sector_edc(TrackType::CdMode1, &sector), Verdict::Good);

        sector[2064] ^= 0xff;
        assert_eq!(verify_sector_edc(TrackType::CdMode1, &sector), Verdict::Bad);
    }

    #[test]
    fn stream_digest_matches_crc32() {
        let data = b"the quick brown fox".to_vec();
        let expected = StoredDigest::Crc32(crc32fast::hash(&data));
        let aborted = AtomicBool::new(false);

        let verdict = verify_stream(std::io::Cursor::new(data), &expected, &aborted).unwrap();
        assert_eq!(verdict, Verdict::Good);
    }

    #[test]
    fn stream_digest_detects_mismatch() {
        let data = b"the quick brown fox".to_vec();
        let expected = StoredDigest::Crc32(0xdead_beef);
        let aborted = AtomicBool::new(false);

        let verdict = verify_stream(std::io::Cursor::new(data), &expected, &aborted).unwrap();
        assert_eq!(verdict, Verdict::Bad);
    }

    #[test]
    fn aborts_cooperatively() {
        let data = vec![0u8; CHUNK_SIZE * 2];
        let expected = StoredDigest::Crc32(0);
        let aborted = AtomicBool::new(true);

        let err = verify_stream(std::io::Cursor::new(data), &expected, &aborted).unwrap_err();
        assert!(matches!(err, CdError::Aborted));
    }
}
