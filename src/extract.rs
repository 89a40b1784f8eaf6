//! Sector Extraction Engine: turns `(lba, tag)` requests into byte-range
//! reads against a track's underlying stream, using the canonical model
//! (§3/§4.4) for track resolution and the geometry table (§4.1) for
//! substructure layout. Every container backend drives its reads through
//! this one engine so its behaviour is identical regardless of the
//! source format.

use std::io::{Read, Seek, SeekFrom};

use crate::geometry::{self, GeometryEntry, Tag};
use crate::model::{DiscModel, Track, TrackType};
use crate::verify::Verdict;
use crate::{CdError, CdResult};

/// Drives sector reads against a single underlying stream (a track's
/// `.bin`/`.img` data fork). Stateless beyond the stream's own seek
/// position; callers may freely interleave reads for different LBAs.
pub struct SectorExtractor<'a> {
    stream: &'a mut dyn crate::filter::ReadSeek,
}

impl<'a> SectorExtractor<'a> {
    /// Wrap `stream` for sector extraction.
    pub fn new(stream: &'a mut dyn crate::filter::ReadSeek) -> SectorExtractor<'a> {
        SectorExtractor { stream }
    }

    /// Resolve `lba` to a track. With `track: None`, this is the normal
    /// containment lookup, checking that `[lba, lba+count-1]` doesn't cross
    /// a track boundary. With `track: Some(seq)`, resolution bypasses
    /// containment entirely and trusts the named track's own geometry,
    /// letting a caller reach sectors (e.g. a pregap) that containment
    /// would never resolve to it.
    fn resolve<'m>(model: &'m DiscModel, lba: i64, count: u32, track: Option<u8>) -> CdResult<&'m Track> {
        match track {
            Some(seq) => model.track(seq).ok_or(CdError::BadTrack),
            None => {
                let track = model.track_containing(lba).ok_or(CdError::OutOfRange)?;

                if lba + count as i64 - 1 > track.end_lba {
                    return Err(CdError::OutOfRange);
                }

                Ok(track)
            }
        }
    }

    /// Geometry for `tag` on `track`. `Data` tracks (DiskCopy 4.2, IMD, and
    /// any other cooked/non-2352 backend) store their sectors as plain user
    /// data with no substructure, so their stride comes straight from the
    /// track itself rather than the fixed-2352 table in `geometry::lookup`.
    fn geometry_for(track: &Track, tag: Tag) -> CdResult<GeometryEntry> {
        if track.track_type == TrackType::Data {
            return match tag {
                Tag::UserData => Ok(GeometryEntry { offset: 0, size: track.user_bytes_per_sector as usize, skip: 0 }),
                _ => Err(CdError::UnsupportedTag),
            };
        }

        geometry::lookup(track.track_type, tag).ok_or(CdError::UnsupportedTag)
    }

    /// Read `count` sectors' worth of one substructure, per the §4.6
    /// extraction algorithm: a single contiguous read when the tag sits
    /// at the very start of the sector stride, otherwise a seek+read loop.
    /// `bypass` selects the track-relative offset (no containment bound)
    /// used when the caller named an explicit track.
    fn read_tagged(&mut self, track: &Track, lba: i64, count: u32, geom: GeometryEntry, bypass: bool) -> CdResult<Vec<u8>> {
        let base = if bypass { track.sector_file_offset_relative(lba)? } else { track.sector_file_offset(lba)? };

        if geom.offset == 0 && geom.skip == 0 {
            let mut buf = vec![0u8; geom.size * count as usize];
            self.stream.seek(SeekFrom::Start(base))?;
            self.stream.read_exact(&mut buf)?;
            return Ok(buf);
        }

        let stride = track.stride();
        let mut buf = Vec::with_capacity(geom.size * count as usize);

        for i in 0..count as u64 {
            self.stream.seek(SeekFrom::Start(base + i * stride + geom.offset as u64))?;

            let start = buf.len();
            buf.resize(start + geom.size, 0);
            self.stream.read_exact(&mut buf[start..])?;
        }

        Ok(buf)
    }

    /// Read the user-data payload of `count` contiguous sectors starting
    /// at `lba`. With `track: None`, fails with [`CdError::OutOfRange`] if
    /// the range isn't entirely contained in one track; with
    /// `track: Some(seq)`, resolution bypasses containment and reads
    /// against that track's own geometry directly.
    pub fn read_sectors(&mut self, model: &DiscModel, lba: i64, count: u32, track: Option<u8>) -> CdResult<Vec<u8>> {
        let bypass = track.is_some();
        let track = Self::resolve(model, lba, count, track)?;
        let geom = Self::geometry_for(track, Tag::UserData)?;

        self.read_tagged(track, lba, count, geom, bypass)
    }

    /// Read the full raw sector (2352 bytes for every CD track shape).
    pub fn read_sector_long(&mut self, model: &DiscModel, lba: i64, track: Option<u8>) -> CdResult<Vec<u8>> {
        let bypass = track.is_some();
        let track = Self::resolve(model, lba, 1, track)?;
        let offset = if bypass { track.sector_file_offset_relative(lba)? } else { track.sector_file_offset(lba)? };

        let mut buf = vec![0u8; track.raw_bytes_per_sector as usize];
        self.stream.seek(SeekFrom::Start(offset))?;
        self.stream.read_exact(&mut buf)?;

        Ok(buf)
    }

    /// Read a single sector substructure per the geometry table. Fails
    /// with [`CdError::UnsupportedTag`] if `tag` has no entry for this
    /// track's stored shape.
    pub fn read_sector_tag(&mut self, model: &DiscModel, lba: i64, track: Option<u8>, tag: Tag) -> CdResult<Vec<u8>> {
        let bypass = track.is_some();
        let track = Self::resolve(model, lba, 1, track)?;
        let geom = Self::geometry_for(track, tag)?;

        self.read_tagged(track, lba, 1, geom, bypass)
    }

    /// Verify one sector's EDC, per §4.7: `NotApplicable` for shapes that
    /// carry no EDC.
    pub fn verify_sector(&mut self, model: &DiscModel, lba: i64, track: Option<u8>) -> CdResult<Verdict> {
        let resolved = Self::resolve(model, lba, 1, track)?;

        if !matches!(
            resolved.track_type,
            TrackType::CdMode1 | TrackType::CdMode2Form1 | TrackType::CdMode2Form2
        ) {
            return Ok(Verdict::Unknown);
        }

        let track_type = resolved.track_type;
        let raw = self.read_sector_long(model, lba, track)?;

        Ok(crate::verify::verify_sector_edc(track_type, &raw))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{DiscModelBuilder, SubchannelType};
    use std::io::Cursor;

    fn track(seq: u8, start: i64, end: i64, ty: TrackType, file_offset: u64) -> Track {
        Track {
            sequence: seq,
            session: 1,
            track_type: ty,
            raw_bytes_per_sector: ty.raw_bytes_per_sector(),
            user_bytes_per_sector: ty.user_bytes_per_sector(),
            start_lba: start,
            end_lba: end,
            file_offset,
            subchannel_type: SubchannelType::None,
            subchannel_file_offset: None,
            control: 0x4,
        }
    }

    #[test]
    fn reads_user_data_from_mode1_track() {
        let mut b = DiscModelBuilder::new();
        b.add_track(track(1, 0, 1, TrackType::CdMode1, 0));
        let model = b.build().unwrap();

        let mut data = vec![0u8; 2352 * 2];
        data[16..16 + 2048].fill(0xAB);
        data[16 + 2352..16 + 2352 + 2048].fill(0xCD);

        let mut cursor = Cursor::new(data);
        let mut ext = SectorExtractor::new(&mut cursor);

        let sector0 = ext.read_sectors(&model, 0, 1, None).unwrap();
        assert_eq!(sector0.len(), 2048);
        assert!(sector0.iter().all(|&b| b == 0xAB));

        let sector1 = ext.read_sectors(&model, 1, 1, None).unwrap();
        assert!(sector1.iter().all(|&b| b == 0xCD));
    }

    #[test]
    fn out_of_range_across_tracks_fails() {
        let mut b = DiscModelBuilder::new();
        b.add_track(track(1, 0, 0, TrackType::CdMode1, 0));
        b.add_track(track(2, 1, 1, TrackType::CdMode1, 2352));
        let model = b.build().unwrap();

        let mut data = vec![0u8; 2352 * 2];
        let mut cursor = Cursor::new(&mut data);
        let mut ext = SectorExtractor::new(&mut cursor);

        assert!(matches!(ext.read_sectors(&model, 0, 2, None), Err(CdError::OutOfRange)));
    }

    #[test]
    fn audio_sector_is_not_edc_checkable() {
        let mut b = DiscModelBuilder::new();
        b.add_track(track(1, 0, 0, TrackType::Audio, 0));
        let model = b.build().unwrap();

        let mut data = vec![0u8; 2352];
        let mut cursor = Cursor::new(&mut data);
        let mut ext = SectorExtractor::new(&mut cursor);

        assert_eq!(ext.verify_sector(&model, 0, None).unwrap(), Verdict::Unknown);
    }

    #[test]
    fn bypass_reaches_sector_before_track_start() {
        let mut b = DiscModelBuilder::new();
        b.add_track(track(1, 150, 249, TrackType::CdMode1, 150 * 2352));
        let model = b.build().unwrap();

        // Lead-in pre-gap sectors physically precede start_lba in the
        // stream; plain containment would never resolve LBA 0 to track 1.
        assert!(model.track_containing(0).is_none());

        let mut data = vec![0u8; 2352 * 250];
        data[16..16 + 2048].fill(0xEF);

        let mut cursor = Cursor::new(data);
        let mut ext = SectorExtractor::new(&mut cursor);

        assert!(matches!(ext.read_sectors(&model, 0, 1, None), Err(CdError::OutOfRange)));

        let pregap = ext.read_sectors(&model, 0, 1, Some(1)).unwrap();
        assert!(pregap.iter().all(|&b| b == 0xEF));
    }
}
