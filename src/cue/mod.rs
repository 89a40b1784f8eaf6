//! BIN/CUE image format implementation
//!
//! The CUE sheet format was created for the CDRWIN burning software.
//!
//! The original format was described in the CDRWIN user guide but
//! many extensions and variations exist.
//!
//! The CUE file format does not support multi-session discs.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::bcd::Bcd;
use crate::internal::IndexCache;
use crate::msf::Msf;
use crate::sector::{Metadata, Sector, SectorBuilder, TrackFormat};
use crate::CdError;

use self::parser::CueParser;

mod parser;

/// Parsed BIN/CUE image: an index cache plus the opened BIN files it
/// points into.
#[derive(Debug)]
pub struct Cue {
    /// Cache of all the indices in the CD image
    indices: IndexCache<Storage>,
    /// List of all the BIN files referenced in the cue sheet
    bin_files: Vec<BinaryBlob>,
}

impl Cue {
    /// Parse a CUE sheet, open the BIN files and build a `Cue`
    /// instance.
    pub fn new(cue_path: &Path) -> Result<Cue, CdError> {
        CueParser::build_cue(cue_path)
    }

    /// Human readable format name, for [`crate::Image::image_format`].
    pub fn image_format(&self) -> String {
        "CUE".to_string()
    }

    /// Read the sector located at absolute `msf`.
    pub fn read_sector(&mut self, msf: Msf) -> Result<Sector, CdError> {
        let (pos, index) = match self.indices.find_index_for_msf(msf) {
            Some(i) => i,
            None => return Err(CdError::OutOfRange),
        };

        // First we compute the relative track MSF
        let track_msf = if index.is_pregap() {
            // In the pregap the track MSF decreases until index1 is reached
            let index1 = match self.indices.get(pos + 1) {
                Some(i) => i,
                None => return Err(CdError::BadImage {
                    path: Default::default(),
                    desc: "pregap without index 1".into(),
                }),
            };

            index1.msf() - msf
        } else {
            // The track MSF is relative to index1
            let index1 = if index.index().bcd() == 0x01 {
                index
            } else {
                match self.indices.find_index1_for_track(index.track()) {
                    Some((_, i)) => i,
                    // Shouldn't be reached, should be caught by IndexCache's constructor
                    None => return Err(CdError::BadTrack),
                }
            };

            msf - index1.msf()
        };

        let track = index.track();
        let track_index = index.index();
        let format = index.format();
        let session = index.session();
        let sector_index = index.sector_index();

        let mut builder = SectorBuilder::new();

        match index.private() {
            Storage::Bin(bin, offset, ty) => {
                let ty = *ty;
                let offset = *offset;
                let bin = &mut self.bin_files[*bin as usize];

                // For now we only support "simple sector" (2352 byte) format
                if ty.sector_size() != 2352 {
                    return Err(CdError::Unsupported);
                }

                let index_offset =
                    ty.sector_size() as u64 * (msf.sector_index() - sector_index) as u64;

                let offset = offset + index_offset;

                builder.set_data_2352(|data| {
                    bin.file.seek(SeekFrom::Start(offset))?;
                    bin.file.read_exact(data)
                })
                .map_err(CdError::IoError)?;
            }
            Storage::PreGap => {
                // Not stored in the BIN file, synthesize silence/zero-fill
                builder.set_data_2352(|data| {
                    data.fill(0);
                    Ok::<(), std::io::Error>(())
                }).map_err(CdError::IoError)?;
            }
        }

        builder.set_metadata(Metadata {
            msf,
            track_msf,
            index: track_index,
            track,
            format,
            session,
        });

        Ok(builder.unwrap())
    }

    /// Convert a track-relative MSF into the disc's absolute MSF.
    pub fn track_msf(&self, track: Bcd, track_msf: Msf) -> Result<Msf, CdError> {
        self.indices.track_msf(track, track_msf)
    }

    /// Expose the raw index cache so a higher-level backend can build a
    /// canonical [`crate::model::DiscModel`] out of it.
    pub(crate) fn indices(&self) -> &IndexCache<Storage> {
        &self.indices
    }
}

/// Possible types for a CUE track.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub(crate) enum CueTrackType {
    /// CD-DA audio track (red book audio)
    Audio,
    /// CD+G (CD+Graphics) track (with subchannel data)
    CdG,
    /// CD-ROM Mode1/2048 (only data, no header or ECC/EDC)
    Mode1Data,
    /// CD-ROM Mode1/2352
    Mode1Raw,
    /// CD-ROM XA Mode2/2336 (without the 16byte header)
    Mode2Headerless,
    /// CD-ROM XA Mode2/2352
    Mode2Raw,
    /// CD-I Mode2/2336 (without the 16byte header)
    CdIHeaderless,
    /// CD-I Mode2/2352
    CdIRaw,
}

impl CueTrackType {
    pub(crate) fn sector_size(self) -> u16 {
        match self {
            CueTrackType::Audio => 2352,
            CueTrackType::CdG => 2448,
            CueTrackType::Mode1Data => 2048,
            CueTrackType::Mode1Raw => 2336,
            CueTrackType::Mode2Headerless => 2336,
            CueTrackType::Mode2Raw => 2352,
            CueTrackType::CdIHeaderless => 2336,
            CueTrackType::CdIRaw => 2352,
        }
    }

    pub(crate) fn track_format(self) -> TrackFormat {
        match self {
            CueTrackType::Audio => TrackFormat::Audio,
            CueTrackType::CdG => TrackFormat::CdG,
            CueTrackType::Mode1Data | CueTrackType::Mode1Raw => TrackFormat::Mode1,
            CueTrackType::Mode2Headerless | CueTrackType::Mode2Raw => TrackFormat::Mode2Xa,
            CueTrackType::CdIHeaderless | CueTrackType::CdIRaw => TrackFormat::Mode2CdI,
        }
    }
}

/// Storage for a slice
#[derive(Debug)]
pub(crate) enum Storage {
    /// The slice is stored in a portion of a BIN file. Contains the
    /// index of the BIN file and the offset in the file.
    Bin(u32, u64, CueTrackType),
    /// The slice is a pre-gap, it's not stored in the BIN file and
    /// must be regenerated.
    PreGap,
}

/// `BinaryBlob` can contain one or several slices interrupted by pre-
/// and post-gaps.
#[derive(Debug)]
pub(crate) struct BinaryBlob {
    /// BIN file
    file: File,
}

impl BinaryBlob {
    fn new(path: &Path) -> Result<BinaryBlob, CdError> {
        let file = File::open(path).map_err(CdError::IoError)?;

        Ok(BinaryBlob { file })
    }
}

/// Max size for a cue sheet, used to detect bogus input early without
/// attempting to load a huge file to RAM. Cue sheets bigger than this
/// will be rejected.
pub const CUE_SHEET_MAX_LENGTH: u64 = 1024 * 1024;
