//! Generic interface to various optical disc (CD/DVD) image formats.
//!
//! The architecture is inspired by BizHawk's CD handling code: small byte
//! codecs and geometry tables at the bottom, per-format parsers in the
//! middle, and a single canonical model + sector extraction engine at the
//! top that downstream code actually talks to.

#![warn(missing_docs)]

#[macro_use]
extern crate arrayref;
#[cfg(feature = "serde")]
extern crate serde;
#[cfg(feature = "serde")]
extern crate serde_big_array;
extern crate thiserror;
extern crate zip;

pub mod bcd;
pub mod crc;
pub mod cue;
pub mod extract;
pub mod filter;
pub mod formats;
pub mod geometry;
pub mod internal;
pub mod model;
pub mod msf;
pub mod sector;
pub mod subchannel;
pub mod toc;
pub mod verify;

pub use bcd::Bcd;
pub use model::{MediaType, OffsetMap, Partition, Session, Track, TrackFlags, TrackType};
pub use msf::Msf;
pub use sector::Sector;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
pub use toc::Toc;

/// Abstract read-only interface to an optical disc image.
///
/// Implemented once per container format (CloneCD, DiscJuggler, CDRWin,
/// BlindWrite 4, DiskCopy 4.2, IMD); all of them are driven exclusively
/// through this trait once `open` has produced a frozen [`model::DiscModel`].
pub trait Image {
    /// Human readable name of the image format, mentioning the
    /// underlying container if this backend daisy-chains another one.
    fn image_format(&self) -> String;

    /// Probe whether `filter` looks like an image this backend can open.
    /// Must not consume or mutate any persistent state; a `false` return
    /// means "try the next backend", not "this image is broken".
    fn identify(filter: &dyn filter::Filter) -> bool
    where
        Self: Sized;

    /// Parse the descriptor(s) referenced by `filter` and build the
    /// canonical model. Must not partially populate the model on error.
    fn open(filter: Box<dyn filter::Filter>) -> CdResult<Self>
    where
        Self: Sized;

    /// Read the user-data payload of a single sector.
    fn read_sector(&mut self, lba: i64) -> CdResult<Vec<u8>> {
        self.read_sectors(lba, 1, None)
    }

    /// Read the user-data payload of `count` contiguous sectors. With
    /// `track: None`, fails with [`CdError::OutOfRange`] if the range
    /// isn't entirely contained in one track. With `track: Some(seq)`,
    /// resolution bypasses that containment check and reads against the
    /// named track's own geometry directly, reaching sectors (a pregap,
    /// say) that are never returned by plain LBA lookup.
    fn read_sectors(&mut self, lba: i64, count: u32, track: Option<u8>) -> CdResult<Vec<u8>>;

    /// Read the full raw sector (2352 bytes for CD tracks). See
    /// [`Image::read_sectors`] for the `track` bypass parameter.
    fn read_sector_long(&mut self, lba: i64, track: Option<u8>) -> CdResult<Vec<u8>>;

    /// Read a specific sector substructure (sync, header, sub-header,
    /// EDC, ECC, subchannel...) per the per-track-type geometry table.
    /// See [`Image::read_sectors`] for the `track` bypass parameter.
    fn read_sector_tag(&mut self, lba: i64, track: Option<u8>, tag: geometry::Tag) -> CdResult<Vec<u8>>;

    /// Read disc-level (not per-sector) metadata, such as CD-TEXT or the
    /// Full TOC.
    fn read_disk_tag(&mut self, tag: DiskTag) -> CdResult<Vec<u8>>;

    /// Whole-image hash verification. Returns `None` if no digest is
    /// available to compare against.
    fn verify_media_image(&mut self) -> CdResult<Option<bool>>;

    /// Per-sector EDC/ECC verification. Returns `Unknown` for sector
    /// types that carry no detectable error protection (e.g. audio). See
    /// [`Image::read_sectors`] for the `track` bypass parameter.
    fn verify_sector(&mut self, lba: i64, track: Option<u8>) -> CdResult<verify::Verdict>;

    /// Verify `count` contiguous sectors starting at `lba`, aggregating
    /// the per-sector verdicts into one report. The default implementation
    /// simply loops [`Image::verify_sector`]; backends with a cheaper
    /// batch path may override it.
    fn verify_sectors(&mut self, lba: i64, count: u32, track: Option<u8>) -> CdResult<VerifySectorsReport> {
        let mut report = VerifySectorsReport { verdict: verify::Verdict::Unknown, failing: Vec::new(), unknown: Vec::new() };

        for i in 0..count as i64 {
            match self.verify_sector(lba + i, track)? {
                verify::Verdict::Bad => {
                    report.failing.push(lba + i);
                    report.verdict = verify::Verdict::Bad;
                }
                verify::Verdict::Good => {
                    if report.verdict == verify::Verdict::Unknown {
                        report.verdict = verify::Verdict::Good;
                    }
                }
                verify::Verdict::Unknown => report.unknown.push(lba + i),
            }
        }

        Ok(report)
    }

    /// The canonical model built at `open` time.
    fn model(&self) -> &model::DiscModel;

    /// Read-only summary of this image's shape. The default
    /// implementation is built entirely from [`Image::image_format`] and
    /// [`Image::model`], so backends don't need their own accessor.
    fn info(&self) -> ImageInfo {
        let model = self.model();

        ImageInfo {
            format: self.image_format(),
            media_type: model.media_type(),
            track_count: model.tracks().len(),
            session_count: model.sessions().len(),
            lead_out: model.lead_out(),
        }
    }
}

/// Aggregated result of [`Image::verify_sectors`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifySectorsReport {
    /// Combined verdict: `Bad` if any sector in the range was bad,
    /// `Good` if every checked sector was good and at least one was
    /// checkable, `Unknown` if none of them carried checkable EDC/ECC.
    pub verdict: verify::Verdict,
    /// LBAs whose EDC/ECC didn't match the stored value.
    pub failing: Vec<i64>,
    /// LBAs that carry no checkable EDC/ECC.
    pub unknown: Vec<i64>,
}

/// Read-only summary of an opened image's shape, exposed as [`Image::info`].
#[derive(Debug, Clone)]
pub struct ImageInfo {
    /// Human readable format name (mirrors [`Image::image_format`]).
    pub format: String,
    /// Disc classification (§4.5).
    pub media_type: model::MediaType,
    /// Number of tracks in the model.
    pub track_count: usize,
    /// Number of sessions in the model.
    pub session_count: usize,
    /// First LBA past the last track.
    pub lead_out: i64,
}

/// Disc-level (as opposed to per-sector) metadata tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskTag {
    /// CD-TEXT blob, as stored verbatim by the source container.
    CdText,
    /// Full TOC, serialized per [`toc::Toc::to_bytes`].
    FullToc,
    /// Media catalog number (UPC/EAN barcode).
    Catalog,
}

/// Error type for disc operations.
#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum CdError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error(
        "Format missmatch. \
            For instance when one attempts to retrieve CD-ROM payloads on an audio track."
    )]
    BadFormat,
    #[error("Unexpected or corrupted image format `{path}`|{line}: {desc}")]
    ParseError {
        path: PathBuf,
        line: u32,
        desc: String,
    },
    #[error("Disc format error in file `{path}`: {desc}")]
    BadImage { path: PathBuf, desc: String },
    #[error("Attempted to access an invalid track number")]
    BadTrack,
    #[error("Attempted to access a track past its end")]
    EndOfTrack,
    #[error(
        "The sync pattern at the start of a CD-ROM sector (0x00, 0xff * 10, 0x00) was invalid"
    )]
    BadSyncPattern,
    #[error("Attempted to parse invalid BCD data")]
    BadBcd,
    #[error("Invalid Q subchannel CRC")]
    InvalidSubQCRC,
    #[error("Unsupported format")]
    Unsupported,
    #[error("Empty table of contents")]
    EmptyToc,
    #[error("Invalid or unexpected MSF format")]
    InvalidMsf,
    #[error("ZIP format error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    /// A parser's `identify` declined the image; callers should try the
    /// next backend rather than surface this to the user.
    #[error("Image not recognized by this backend")]
    NotRecognized,
    /// The descriptor violates a structural invariant of its format.
    #[error("Malformed descriptor at offset {offset}: {detail}")]
    Malformed {
        /// Human readable description of the violated invariant.
        detail: String,
        /// Byte offset (or line number, for text formats) where the
        /// problem was found.
        offset: u64,
    },
    /// The descriptor declares a version this crate doesn't know how to
    /// read.
    #[error("Unsupported descriptor version: {0}")]
    UnsupportedVersion(String),
    /// The requested LBA (or LBA range) isn't contained in any single
    /// track.
    #[error("Sector address out of range")]
    OutOfRange,
    /// The requested tag has no entry in the geometry table for this
    /// track's stored shape.
    #[error("Tag not available for this track's geometry")]
    UnsupportedTag,
    /// The requested disc-level tag isn't present in this image.
    #[error("Requested tag is not present in this image")]
    NotPresent,
    /// Recognised but deliberately unimplemented (e.g. Q16 subchannel
    /// reconstruction, lzip decompression).
    #[error("Not yet implemented: {0}")]
    NotYetImplemented(String),
    /// The operation was cancelled cooperatively via the abort flag.
    #[error("Operation aborted")]
    Aborted,
}

/// Convenience type alias for a `Result<R, CdError>`
pub type CdResult<R> = std::result::Result<R, CdError>;

#[test]
fn cderror_display() {
    // Make sure that CdError implements Display. This should be true if we set an
    // `#[error("...")]` for every variant
    println!("{}", CdError::BadTrack);
    println!("{}", CdError::OutOfRange);
    println!("{}", CdError::NotYetImplemented("lzip".into()));
}
