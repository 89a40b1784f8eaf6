//! Apple DiskCopy 4.2 backend: a fixed 0x54-byte big-endian header in the
//! data fork, followed by the raw sector data; the "tag" area (12 bytes
//! of HFS metadata per sector, when present) lives in the resource fork.
//!
//! Unlike the CD container formats this crate otherwise speaks, a
//! DiskCopy 4.2 image describes a single floppy disk with no notion of
//! multiple logical tracks or sessions; it is modeled as one `Data`
//! track spanning the whole disk.

use std::io::{Read, Seek, SeekFrom};

use crate::extract::SectorExtractor;
use crate::filter::Filter;
use crate::geometry::Tag;
use crate::model::{DiscModel, DiscModelBuilder, SubchannelType, Track, TrackType};
use crate::verify::Verdict;
use crate::{CdError, CdResult, DiskTag, Image};

const HEADER_LEN: usize = 0x54;
const SECTOR_SIZE: u32 = 512;

/// Fixed 2-byte marker at the end of the header; images without it are
/// rejected as unrecognised rather than silently misparsed.
const PRIVATE_FLAGS: u16 = 0x0100;

/// DiskCopy 4.2 disk geometry, decoded from the header's `diskFormat` byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskFormat {
    Kb400,
    Kb800,
    Kb720,
    Kb1440,
}

impl DiskFormat {
    fn from_byte(b: u8) -> CdResult<DiskFormat> {
        match b {
            0 => Ok(DiskFormat::Kb400),
            1 => Ok(DiskFormat::Kb800),
            2 => Ok(DiskFormat::Kb720),
            3 => Ok(DiskFormat::Kb1440),
            other => Err(CdError::Malformed { detail: format!("unknown diskFormat {other}"), offset: 80 }),
        }
    }
}

struct Header {
    disk_name: String,
    data_size: u32,
    tag_size: u32,
    data_checksum: u32,
    tag_checksum: u32,
    disk_format: DiskFormat,
    format_byte: u8,
}

fn parse_header(buf: &[u8; HEADER_LEN]) -> CdResult<Header> {
    let name_len = buf[0] as usize;
    if name_len > 63 {
        return Err(CdError::Malformed { detail: "disk name length exceeds 63".to_string(), offset: 0 });
    }
    let disk_name = String::from_utf8_lossy(&buf[1..1 + name_len]).into_owned();

    let data_size = u32::from_be_bytes([buf[64], buf[65], buf[66], buf[67]]);
    let tag_size = u32::from_be_bytes([buf[68], buf[69], buf[70], buf[71]]);
    let data_checksum = u32::from_be_bytes([buf[72], buf[73], buf[74], buf[75]]);
    let tag_checksum = u32::from_be_bytes([buf[76], buf[77], buf[78], buf[79]]);
    let disk_format = DiskFormat::from_byte(buf[80])?;
    let format_byte = buf[81];
    let private_flags = u16::from_be_bytes([buf[82], buf[83]]);

    if private_flags != PRIVATE_FLAGS {
        return Err(CdError::NotRecognized);
    }

    Ok(Header { disk_name, data_size, tag_size, data_checksum, tag_checksum, disk_format, format_byte })
}

/// DiskCopy 4.2 image: the data fork's sector stream plus the header
/// fields kept for `read_disk_tag`/verification.
pub struct DiskCopy42 {
    filter: Box<dyn Filter>,
    model: DiscModel,
    header: Header,
}

impl Image for DiskCopy42 {
    fn image_format(&self) -> String {
        "DiskCopy 4.2".to_string()
    }

    fn identify(filter: &dyn Filter) -> bool {
        let name = filter.filename().to_lowercase();
        name.ends_with(".image") || name.ends_with(".dc42")
    }

    fn open(mut filter: Box<dyn Filter>) -> CdResult<Self> {
        if filter.length() < HEADER_LEN as u64 {
            return Err(CdError::NotRecognized);
        }

        let mut raw = [0u8; HEADER_LEN];
        filter.data_fork_stream().rewind()?;
        filter.data_fork_stream().read_exact(&mut raw)?;

        let header = parse_header(&raw)?;

        if header.data_size % SECTOR_SIZE != 0 {
            return Err(CdError::BadImage {
                path: filter.base_path().join(filter.filename()),
                desc: format!("data size {} isn't a multiple of {SECTOR_SIZE}", header.data_size),
            });
        }

        let sector_count = header.data_size / SECTOR_SIZE;
        if sector_count == 0 {
            return Err(CdError::EmptyToc);
        }

        let mut builder = DiscModelBuilder::new();
        builder.add_track(Track {
            sequence: 1,
            session: 1,
            track_type: TrackType::Data,
            raw_bytes_per_sector: SECTOR_SIZE,
            user_bytes_per_sector: SECTOR_SIZE,
            start_lba: 0,
            end_lba: sector_count as i64 - 1,
            file_offset: HEADER_LEN as u64,
            subchannel_type: SubchannelType::None,
            subchannel_file_offset: None,
            control: 0x4,
        });

        let model = builder.build()?;

        Ok(DiskCopy42 { filter, model, header })
    }

    fn read_sectors(&mut self, lba: i64, count: u32, track: Option<u8>) -> CdResult<Vec<u8>> {
        let mut ext = SectorExtractor::new(self.filter.data_fork_stream());
        ext.read_sectors(&self.model, lba, count, track)
    }

    fn read_sector_long(&mut self, lba: i64, track: Option<u8>) -> CdResult<Vec<u8>> {
        let mut ext = SectorExtractor::new(self.filter.data_fork_stream());
        ext.read_sector_long(&self.model, lba, track)
    }

    fn read_sector_tag(&mut self, lba: i64, track: Option<u8>, tag: Tag) -> CdResult<Vec<u8>> {
        let mut ext = SectorExtractor::new(self.filter.data_fork_stream());
        ext.read_sector_tag(&self.model, lba, track, tag)
    }

    fn read_disk_tag(&mut self, tag: DiskTag) -> CdResult<Vec<u8>> {
        match tag {
            DiskTag::Catalog if !self.header.disk_name.is_empty() => Ok(self.header.disk_name.clone().into_bytes()),
            _ => Err(CdError::NotPresent),
        }
    }

    fn verify_media_image(&mut self) -> CdResult<Option<bool>> {
        if self.header.data_size == 0 {
            return Ok(None);
        }

        self.filter.data_fork_stream().seek(SeekFrom::Start(HEADER_LEN as u64))?;
        let stream = self.filter.data_fork_stream().take(self.header.data_size as u64);

        let digest = crate::verify::StoredDigest::Crc32(self.header.data_checksum);
        let aborted = std::sync::atomic::AtomicBool::new(false);

        let verdict = crate::verify::verify_stream(stream, &digest, &aborted)?;
        Ok(Some(verdict == Verdict::Good))
    }

    fn verify_sector(&mut self, _lba: i64, _track: Option<u8>) -> CdResult<Verdict> {
        // DiskCopy 4.2 carries only whole-image checksums, no per-sector EDC.
        Ok(Verdict::Unknown)
    }

    fn model(&self) -> &DiscModel {
        &self.model
    }
}

impl DiskCopy42 {
    /// The disk name stored in the header's Pascal string.
    pub fn disk_name(&self) -> &str {
        &self.header.disk_name
    }

    /// Per-sector tag data (12 bytes of HFS metadata), stored in the
    /// resource fork rather than alongside the data. Returns `NotPresent`
    /// if the image carries no tag data (`tagSize == 0`) or the filter
    /// exposes no resource fork at all.
    pub fn read_tag_data(&mut self, lba: i64) -> CdResult<Vec<u8>> {
        const TAG_SIZE: u64 = 12;

        if self.header.tag_size == 0 {
            return Err(CdError::NotPresent);
        }

        let track = self.model.track_containing(lba).ok_or(CdError::OutOfRange)?;
        let offset = (lba - track.start_lba) as u64 * TAG_SIZE;

        let mut buf = vec![0u8; TAG_SIZE as usize];
        let stream = self.filter.resource_fork_stream()?;
        stream.seek(SeekFrom::Start(offset))?;
        stream.read_exact(&mut buf)?;

        Ok(buf)
    }

    /// Verify the resource fork's tag data against the header's stored
    /// checksum, mirroring [`Image::verify_media_image`] but for the
    /// tag area. `None` if this image carries no tag data.
    pub fn verify_tag_data(&mut self) -> CdResult<Option<bool>> {
        if self.header.tag_size == 0 {
            return Ok(None);
        }

        let stream = self.filter.resource_fork_stream()?;
        stream.seek(SeekFrom::Start(0))?;
        let bounded = stream.take(self.header.tag_size as u64);

        let digest = crate::verify::StoredDigest::Crc32(self.header.tag_checksum);
        let aborted = std::sync::atomic::AtomicBool::new(false);

        let verdict = crate::verify::verify_stream(bounded, &digest, &aborted)?;
        Ok(Some(verdict == Verdict::Good))
    }

    /// Raw `diskFormat`/`formatByte` pair from the header, kept for
    /// callers that want to report the floppy's physical geometry.
    pub fn format_bytes(&self) -> (DiskFormat, u8) {
        (self.header.disk_format, self.header.format_byte)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn header_bytes(data_size: u32, tag_size: u32, disk_format: u8) -> [u8; HEADER_LEN] {
        let mut h = [0u8; HEADER_LEN];
        h[0] = 0; // empty disk name
        h[64..68].copy_from_slice(&data_size.to_be_bytes());
        h[68..72].copy_from_slice(&tag_size.to_be_bytes());
        h[72..76].copy_from_slice(&0u32.to_be_bytes());
        h[76..80].copy_from_slice(&0u32.to_be_bytes());
        h[80] = disk_format;
        h[81] = 0x22;
        h[82..84].copy_from_slice(&PRIVATE_FLAGS.to_be_bytes());
        h
    }

    #[test]
    fn parses_valid_header() {
        let raw = header_bytes(800 * 1024, 0, 1);
        let header = parse_header(&raw).unwrap();
        assert_eq!(header.data_size, 800 * 1024);
        assert_eq!(header.disk_format, DiskFormat::Kb800);
    }

    #[test]
    fn rejects_wrong_private_flags() {
        let mut raw = header_bytes(800 * 1024, 0, 1);
        raw[82] = 0x00;
        raw[83] = 0x00;
        assert!(matches!(parse_header(&raw), Err(CdError::NotRecognized)));
    }

    #[test]
    fn rejects_bad_disk_format() {
        let raw = header_bytes(800 * 1024, 0, 9);
        assert!(parse_header(&raw).is_err());
    }

    #[test]
    fn disk_name_is_decoded() {
        let mut raw = header_bytes(1440 * 1024, 0, 3);
        raw[0] = 4;
        raw[1..5].copy_from_slice(b"Test");
        let header = parse_header(&raw).unwrap();
        assert_eq!(header.disk_name, "Test");
    }
}
