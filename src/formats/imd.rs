//! ImageDisk (`.imd`) backend.
//!
//! An IMD file is an ASCII comment terminated by 0x1A, followed by a
//! stream of per-physical-track records: each names its cylinder/head
//! and sector-size code, carries a sector numbering map, and is followed
//! by that many per-sector records, each led by a one-byte type that
//! says whether the sector's data follows literally, as a single
//! compressed fill byte, or not at all.
//!
//! IMD describes a physical CHS floppy layout, which doesn't fit this
//! crate's single-stream/fixed-stride canonical model any better than
//! DiskCopy 4.2's flat dump does. Rather than stretching the model to
//! cover per-track sector-size codes, the whole disk is decoded once at
//! `open` time into a synthesized in-memory buffer and exposed as one
//! `Data` track; see the sole Open Question in DESIGN.md.

use std::io::{Cursor, Read, Seek};

use crate::extract::SectorExtractor;
use crate::filter::Filter;
use crate::geometry::Tag;
use crate::model::{DiscModel, DiscModelBuilder, SubchannelType, Track, TrackType};
use crate::verify::Verdict;
use crate::{CdError, CdResult, DiskTag, Image};

/// Terminates the free-form ASCII comment at the start of the file.
const COMMENT_TERMINATOR: u8 = 0x1A;

/// `0xFF` in the sector-size-code byte means "variable, a per-sector size
/// map follows"; this crate doesn't support that since it has nowhere to
/// put a non-uniform stride in the flattened buffer.
const VARIABLE_SIZE_CODE: u8 = 0xFF;

fn sector_size_from_code(code: u8) -> CdResult<u32> {
    if code > 6 {
        return Err(CdError::Malformed { detail: format!("bad sector size code {code}"), offset: 0 });
    }

    Ok(128u32 << code)
}

struct PhysicalTrack {
    sector_size: u32,
    sectors: Vec<Vec<u8>>,
}

fn read_exact_vec(stream: &mut dyn crate::filter::ReadSeek, n: usize) -> CdResult<Vec<u8>> {
    let mut buf = vec![0u8; n];
    stream.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_u8(stream: &mut dyn crate::filter::ReadSeek) -> CdResult<u8> {
    let mut b = [0u8; 1];
    stream.read_exact(&mut b)?;
    Ok(b[0])
}

/// Parse one physical track record starting at the current stream
/// position. Returns `None` if the stream is at EOF (no more tracks).
fn read_physical_track(stream: &mut dyn crate::filter::ReadSeek) -> CdResult<Option<PhysicalTrack>> {
    let mut mode_buf = [0u8; 1];
    let n = stream.read(&mut mode_buf)?;
    if n == 0 {
        return Ok(None);
    }
    let _mode = mode_buf[0];

    let _cylinder = read_u8(stream)?;
    let head_byte = read_u8(stream)?;
    let spt = read_u8(stream)? as usize;
    let size_code = read_u8(stream)?;

    let cylinder_map_present = head_byte & 0x80 != 0;
    let head_map_present = head_byte & 0x40 != 0;

    read_exact_vec(stream, spt)?; // sector numbering map, not needed for a flattened image

    if cylinder_map_present {
        read_exact_vec(stream, spt)?;
    }
    if head_map_present {
        read_exact_vec(stream, spt)?;
    }

    if size_code == VARIABLE_SIZE_CODE {
        return Err(CdError::Unsupported);
    }
    let size = sector_size_from_code(size_code)?;

    let mut sectors = Vec::with_capacity(spt);
    for _ in 0..spt {
        let record_type = read_u8(stream)?;

        let data = match record_type {
            0 => vec![0u8; size as usize],
            1 | 3 | 5 | 7 => read_exact_vec(stream, size as usize)?,
            2 | 4 | 6 | 8 => {
                let fill = read_u8(stream)?;
                vec![fill; size as usize]
            }
            other => {
                return Err(CdError::Malformed {
                    detail: format!("unknown sector record type {other}"),
                    offset: 0,
                })
            }
        };

        sectors.push(data);
    }

    Ok(Some(PhysicalTrack { sector_size: size, sectors }))
}

/// ImageDisk floppy image: decoded once at `open` time into one flat
/// in-memory buffer (`data`), exposed as a single canonical `Data` track.
pub struct Imd {
    data: Vec<u8>,
    model: DiscModel,
    comment: String,
}

impl Image for Imd {
    fn image_format(&self) -> String {
        "ImageDisk".to_string()
    }

    fn identify(filter: &dyn Filter) -> bool {
        filter.filename().to_lowercase().ends_with(".imd")
    }

    fn open(mut filter: Box<dyn Filter>) -> CdResult<Self> {
        let stream = filter.data_fork_stream();
        stream.rewind()?;

        let mut comment_bytes = Vec::new();
        {
            let mut b = [0u8; 1];
            loop {
                let n = stream.read(&mut b)?;
                if n == 0 {
                    return Err(CdError::Malformed { detail: "no comment terminator before EOF".to_string(), offset: 0 });
                }
                if b[0] == COMMENT_TERMINATOR {
                    break;
                }
                comment_bytes.push(b[0]);
            }
        }
        let comment = String::from_utf8_lossy(&comment_bytes).into_owned();

        if !comment.starts_with("IMD") {
            return Err(CdError::NotRecognized);
        }

        let mut data = Vec::new();
        let mut uniform_size: Option<u32> = None;

        while let Some(track) = read_physical_track(stream)? {
            match uniform_size {
                None => uniform_size = Some(track.sector_size),
                Some(size) if size != track.sector_size => return Err(CdError::Unsupported),
                Some(_) => {}
            }

            for sector in &track.sectors {
                data.extend_from_slice(sector);
            }
        }

        let sector_size = uniform_size.ok_or(CdError::EmptyToc)?;

        if data.len() % sector_size as usize != 0 {
            return Err(CdError::BadImage {
                path: filter.base_path().join(filter.filename()),
                desc: "flattened image size isn't a multiple of the sector size".to_string(),
            });
        }

        let sector_count = data.len() / sector_size as usize;
        if sector_count == 0 {
            return Err(CdError::EmptyToc);
        }

        let mut builder = DiscModelBuilder::new();
        builder.add_track(Track {
            sequence: 1,
            session: 1,
            track_type: TrackType::Data,
            raw_bytes_per_sector: sector_size,
            user_bytes_per_sector: sector_size,
            start_lba: 0,
            end_lba: sector_count as i64 - 1,
            file_offset: 0,
            subchannel_type: SubchannelType::None,
            subchannel_file_offset: None,
            control: 0x4,
        });

        let model = builder.build()?;

        Ok(Imd { data, model, comment })
    }

    fn read_sectors(&mut self, lba: i64, count: u32, track: Option<u8>) -> CdResult<Vec<u8>> {
        let mut cursor = Cursor::new(self.data.as_slice());
        let mut ext = SectorExtractor::new(&mut cursor);
        ext.read_sectors(&self.model, lba, count, track)
    }

    fn read_sector_long(&mut self, lba: i64, track: Option<u8>) -> CdResult<Vec<u8>> {
        let mut cursor = Cursor::new(self.data.as_slice());
        let mut ext = SectorExtractor::new(&mut cursor);
        ext.read_sector_long(&self.model, lba, track)
    }

    fn read_sector_tag(&mut self, lba: i64, track: Option<u8>, tag: Tag) -> CdResult<Vec<u8>> {
        let mut cursor = Cursor::new(self.data.as_slice());
        let mut ext = SectorExtractor::new(&mut cursor);
        ext.read_sector_tag(&self.model, lba, track, tag)
    }

    fn read_disk_tag(&mut self, tag: DiskTag) -> CdResult<Vec<u8>> {
        match tag {
            DiskTag::Catalog if !self.comment.is_empty() => Ok(self.comment.clone().into_bytes()),
            _ => Err(CdError::NotPresent),
        }
    }

    fn verify_media_image(&mut self) -> CdResult<Option<bool>> {
        // IMD carries no whole-image digest of its own.
        Ok(None)
    }

    fn verify_sector(&mut self, _lba: i64, _track: Option<u8>) -> CdResult<Verdict> {
        // Unavailable/compressed sectors are already folded into plain
        // bytes at `open` time; there's no stored EDC left to re-check.
        Ok(Verdict::Unknown)
    }

    fn model(&self) -> &DiscModel {
        &self.model
    }
}

impl Imd {
    /// Free-form ASCII comment stored at the head of the file.
    pub fn comment(&self) -> &str {
        &self.comment
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn track_bytes(mode: u8, cyl: u8, head: u8, spt: u8, size_code: u8, fill: impl Fn(usize) -> Vec<u8>) -> Vec<u8> {
        let mut b = vec![mode, cyl, head, spt, size_code];
        b.extend(1..=spt); // sector numbering map, 1-based
        for i in 0..spt as usize {
            b.push(1); // normal data record
            b.extend(fill(i));
        }
        b
    }

    #[test]
    fn sector_size_from_code_table() {
        assert_eq!(sector_size_from_code(0).unwrap(), 128);
        assert_eq!(sector_size_from_code(3).unwrap(), 1024);
        assert!(sector_size_from_code(7).is_err());
    }

    #[test]
    fn reads_one_physical_track_with_compressed_sector() {
        let mut bytes = vec![0u8, 0, 0, 2, 0]; // mode 0, cyl 0, head 0, 2 sectors, 128 bytes
        bytes.extend_from_slice(&[1, 2]); // numbering map
        bytes.push(1); // normal data
        bytes.extend_from_slice(&[0xAAu8; 128]);
        bytes.push(2); // compressed fill
        bytes.push(0x55);

        let mut cursor = Cursor::new(bytes);
        let track = read_physical_track(&mut cursor).unwrap().unwrap();

        assert_eq!(track.sector_size, 128);
        assert_eq!(track.sectors.len(), 2);
        assert_eq!(track.sectors[0], vec![0xAAu8; 128]);
        assert_eq!(track.sectors[1], vec![0x55u8; 128]);
    }

    #[test]
    fn rejects_variable_size_map() {
        let bytes = vec![0u8, 0, 0, 1, VARIABLE_SIZE_CODE, 1];
        let mut cursor = Cursor::new(bytes);
        assert!(matches!(read_physical_track(&mut cursor), Err(CdError::Unsupported)));
    }

    #[test]
    fn flattens_two_uniform_tracks_into_one_data_track() {
        let mut file = b"IMD test image\x1A".to_vec();
        file.extend(track_bytes(0, 0, 0, 1, 0, |_| vec![0x11u8; 128]));
        file.extend(track_bytes(0, 0, 1, 1, 0, |_| vec![0x22u8; 128]));

        struct CursorFilter {
            cursor: Cursor<Vec<u8>>,
        }
        impl Filter for CursorFilter {
            fn filename(&self) -> &str {
                "disc.imd"
            }
            fn base_path(&self) -> &std::path::Path {
                std::path::Path::new(".")
            }
            fn length(&self) -> u64 {
                self.cursor.get_ref().len() as u64
            }
            fn creation_time(&self) -> Option<std::time::SystemTime> {
                None
            }
            fn last_write_time(&self) -> Option<std::time::SystemTime> {
                None
            }
            fn data_fork_stream(&mut self) -> &mut dyn crate::filter::ReadSeek {
                &mut self.cursor
            }
        }

        let filter = Box::new(CursorFilter { cursor: Cursor::new(file) });
        let mut image = Imd::open(filter).unwrap();

        assert_eq!(image.model().tracks().len(), 1);
        assert_eq!(image.model().track(1).unwrap().end_lba, 1);
        assert_eq!(image.comment(), "IMD test image");

        assert_eq!(image.read_sector(0).unwrap(), vec![0x11u8; 128]);
        assert_eq!(image.read_sector(1).unwrap(), vec![0x22u8; 128]);
    }
}
