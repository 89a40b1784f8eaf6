//! DiscJuggler (`.cdi`) backend.
//!
//! A single data file whose last 4 bytes are a little-endian length: the
//! trailing footer of that many bytes holds every session/track
//! descriptor plus a final image-level footer (volume id, CD-Text, MCN).
//! Unlike CloneCD/CDRWin there's no separate TOC structure to lean on, so
//! the footer's per-track fields (`start_lba`, `track_length`, `readMode`)
//! are read directly into the canonical model.

use std::io::{Read, Seek, SeekFrom};

use crate::filter::Filter;
use crate::geometry::{self, Tag};
use crate::model::{DiscModel, DiscModelBuilder, SubchannelType, Track, TrackType};
use crate::verify::Verdict;
use crate::{CdError, CdResult, DiskTag, Image};

/// DiscJuggler image: the single `.cdi` file, read directly by each
/// track's own stride (readMode determines whether sectors are stored
/// cooked or raw, with or without interleaved subchannel).
pub struct DiscJuggler {
    filter: Box<dyn Filter>,
    model: DiscModel,
    volume_id: String,
    cd_text: Vec<u8>,
    /// Length of the data region preceding the footer, and the CRC32
    /// stored for it, when present.
    data_len: u64,
    data_checksum: Option<u32>,
}

/// Sequential cursor over the footer buffer; every field in the binary
/// layout below is read through this.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Reader<'a> {
        Reader { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> CdResult<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(CdError::Malformed {
                detail: "unexpected end of footer".to_string(),
                offset: self.pos as u64,
            });
        }

        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    fn skip(&mut self, n: usize) -> CdResult<()> {
        self.take(n).map(|_| ())
    }

    fn u8(&mut self) -> CdResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16le(&mut self) -> CdResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32le(&mut self) -> CdResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn len_prefixed_string(&mut self) -> CdResult<String> {
        let len = self.u8()? as usize;
        Ok(String::from_utf8_lossy(self.take(len)?).into_owned())
    }
}

/// One session header: `00 ?? 00 00 00 00 00 00 00 01 00 00 00 FF FF`,
/// byte 1 being the track count. Returns that track count.
fn parse_session_header(r: &mut Reader) -> CdResult<u8> {
    let h = r.take(15)?;

    let matches = h[0] == 0x00
        && h[2] == 0x00
        && h[3] == 0x00
        && h[4] == 0x00
        && h[5] == 0x00
        && h[6] == 0x00
        && h[7] == 0x00
        && h[8] == 0x00
        && h[9] == 0x01
        && h[10] == 0x00
        && h[11] == 0x00
        && h[12] == 0x00
        && h[13] == 0xFF
        && h[14] == 0xFF;

    if !matches {
        return Err(CdError::Malformed {
            detail: "unrecognised session header pattern".to_string(),
            offset: 0,
        });
    }

    Ok(h[1])
}

/// Fields pulled out of one track descriptor; CD-Text groups, ISRC and
/// the index table are parsed only to be skipped over correctly, they
/// carry nothing the canonical model exposes.
struct RawTrack {
    track_mode: u32,
    track_sequence: u32,
    start_lba: i64,
    track_length: u32,
    read_mode: u32,
    control: u8,
}

fn parse_track(r: &mut Reader) -> CdResult<RawTrack> {
    r.skip(16)?;
    let _filename = r.len_prefixed_string()?;
    r.skip(29)?;
    let _medium_type = r.u16le()?;

    let index_count = r.u16le()? as usize;
    r.skip(index_count * 4)?;

    let cdtext_groups = r.u32le()? as usize;
    for _ in 0..cdtext_groups {
        for _ in 0..18 {
            let len = r.u8()? as usize;
            r.skip(len)?;
        }
    }

    r.skip(2)?;
    let track_mode = r.u32le()?;
    r.skip(4)?;
    let _session_number = r.u32le()?;
    let track_sequence = r.u32le()?;
    let start_lba = r.u32le()? as i32 as i64;
    let track_length = r.u32le()?;
    r.skip(16)?;
    let read_mode = r.u32le()?;
    let control = (r.u32le()? & 0x0F) as u8;
    r.skip(9)?;
    r.skip(12)?; // ISRC
    let _isrc_validity = r.u32le()?;
    r.skip(87)?;
    let _session_type = r.u8()?;
    r.skip(5)?;
    let _track_follows = r.u8()?;
    r.skip(1)?;
    let _end_address = r.u32le()?;

    Ok(RawTrack { track_mode, track_sequence, start_lba, track_length, read_mode, control })
}

/// Image-level footer following the last session's tracks: filename,
/// medium type, disc size, volume id, MCN and the CD-Text blob.
struct ImageFooter {
    volume_id: String,
    cd_text: Vec<u8>,
    /// Whole-image CRC32 over the data region preceding the footer, plus
    /// 8 reserved bytes. `None` if the stored value is all zero (older
    /// writers leave this field unset).
    data_checksum: Option<u32>,
}

fn parse_image_footer(r: &mut Reader) -> CdResult<ImageFooter> {
    r.skip(16)?;
    let _filename = r.len_prefixed_string()?;
    r.skip(29)?;
    let _medium_type = r.u16le()?;
    let _disc_size = r.u32le()?;
    let volume_id = r.len_prefixed_string()?;
    r.skip(9)?;
    r.skip(13)?; // MCN
    let _mcn_validity = r.u32le()?;

    let cd_text_len = r.u32le()? as usize;
    let cd_text = r.take(cd_text_len)?.to_vec();

    let data_checksum = r.u32le()?;
    r.skip(8)?; // reserved

    Ok(ImageFooter { volume_id, cd_text, data_checksum: (data_checksum != 0).then_some(data_checksum) })
}

/// `(raw_bytes_per_sector, subchannel)` for a `readMode` value, per the
/// stride table: cooked Mode 1/2 carry no subchannel, raw sectors may
/// carry interleaved Q16 or full P-W subchannel.
fn sector_shape(read_mode: u32) -> CdResult<(u32, SubchannelType)> {
    match read_mode {
        0 => Ok((2048, SubchannelType::None)),
        1 => Ok((2336, SubchannelType::None)),
        2 => Ok((2352, SubchannelType::None)),
        3 => Ok((2352, SubchannelType::Q16Interleaved)),
        4 => Ok((2352, SubchannelType::RawInterleaved)),
        other => Err(CdError::Malformed { detail: format!("unknown readMode {other}"), offset: 0 }),
    }
}

/// Reject the `(trackMode, readMode)` combinations the source tool never
/// produces: cooked Audio, a Mode 1 track stored cooked-Mode-2-shaped, or
/// a Mode 2 track stored cooked-Mode-1-shaped.
fn validate_combo(track_mode: u32, read_mode: u32) -> CdResult<()> {
    let bad = matches!((track_mode, read_mode), (0, 0) | (0, 1) | (1, 1) | (2, 0));

    if bad {
        return Err(CdError::Malformed {
            detail: format!("trackMode {track_mode} cannot be stored with readMode {read_mode}"),
            offset: 0,
        });
    }

    Ok(())
}

/// Classify a track's nominal shape, peeking the first raw sector to
/// discriminate Mode 2 Form 1/Form 2 when the track is stored raw.
fn classify_track_type(track_mode: u32, read_mode: u32, filter: &mut dyn Filter, file_offset: u64) -> CdResult<TrackType> {
    match track_mode {
        0 => Ok(TrackType::Audio),
        1 => Ok(if read_mode == 0 { TrackType::Data } else { TrackType::CdMode1 }),
        2 => {
            if read_mode == 1 {
                // Cooked headerless Mode 2: no sub-header to discriminate by.
                Ok(TrackType::CdMode2Formless)
            } else {
                let mut raw = [0u8; 2352];
                filter.data_fork_stream().seek(SeekFrom::Start(file_offset))?;
                filter.data_fork_stream().read_exact(&mut raw)?;

                Ok(geometry::mode2_form(&raw).unwrap_or(TrackType::CdMode2Formless))
            }
        }
        other => Err(CdError::Malformed { detail: format!("unknown trackMode {other}"), offset: 0 }),
    }
}

/// Re-resolve a raw-stored Mode 2 sector's actual form; leaves cooked
/// tracks and non-Mode-2 shapes unchanged.
fn actual_type(nominal: TrackType, raw_bytes_per_sector: u32, raw: &[u8]) -> TrackType {
    if nominal.is_mode2() && raw_bytes_per_sector == 2352 {
        geometry::mode2_form(raw).unwrap_or(TrackType::CdMode2Formless)
    } else {
        nominal
    }
}

fn build_model(footer: &[u8], filter: &mut dyn Filter) -> CdResult<(DiscModel, ImageFooter)> {
    let mut r = Reader::new(footer);
    let session_count = r.u8()?;

    if session_count == 0 || session_count > 99 {
        return Err(CdError::Malformed { detail: format!("bad session count {session_count}"), offset: 0 });
    }

    let mut builder = DiscModelBuilder::new();
    let mut running_offset = 0u64;
    let mut first_track = true;

    for sess_idx in 0..=session_count {
        let track_count = parse_session_header(&mut r)?;

        for _ in 0..track_count {
            let raw = parse_track(&mut r)?;
            validate_combo(raw.track_mode, raw.read_mode)?;

            let (raw_bytes_per_sector, subchannel_type) = sector_shape(raw.read_mode)?;
            let stride = raw_bytes_per_sector as u64 + subchannel_type.padding() as u64;

            if first_track {
                running_offset += 150 * stride;
                first_track = false;
            }

            let file_offset = running_offset;
            let track_type = classify_track_type(raw.track_mode, raw.read_mode, filter, file_offset)?;

            builder.add_track(Track {
                sequence: raw.track_sequence as u8,
                session: sess_idx + 1,
                track_type,
                raw_bytes_per_sector,
                user_bytes_per_sector: track_type.user_bytes_per_sector(),
                start_lba: raw.start_lba,
                end_lba: raw.start_lba + raw.track_length as i64 - 1,
                file_offset,
                subchannel_type,
                subchannel_file_offset: (subchannel_type != SubchannelType::None).then_some(file_offset),
                control: raw.control,
            });

            running_offset += raw.track_length as u64 * stride;
        }
    }

    let image_footer = parse_image_footer(&mut r)?;
    let model = builder.build()?;

    Ok((model, image_footer))
}

impl Image for DiscJuggler {
    fn image_format(&self) -> String {
        "DiscJuggler".to_string()
    }

    fn identify(filter: &dyn Filter) -> bool {
        filter.filename().to_lowercase().ends_with(".cdi")
    }

    fn open(mut filter: Box<dyn Filter>) -> CdResult<Self> {
        let total_len = filter.length();

        if total_len < 4 {
            return Err(CdError::Malformed { detail: "file too small to carry a footer".to_string(), offset: 0 });
        }

        let stream = filter.data_fork_stream();
        stream.seek(SeekFrom::Start(total_len - 4))?;

        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf)?;
        let footer_len = u32::from_le_bytes(len_buf) as u64;

        if footer_len + 4 > total_len {
            return Err(CdError::Malformed { detail: "footer length exceeds file size".to_string(), offset: total_len - 4 });
        }

        let footer_start = total_len - 4 - footer_len;
        stream.seek(SeekFrom::Start(footer_start))?;

        let mut footer = vec![0u8; footer_len as usize];
        stream.read_exact(&mut footer)?;

        let (model, image_footer) = build_model(&footer, filter.as_mut())?;

        Ok(DiscJuggler {
            filter,
            model,
            volume_id: image_footer.volume_id,
            cd_text: image_footer.cd_text,
            data_len: footer_start,
            data_checksum: image_footer.data_checksum,
        })
    }

    fn read_sectors(&mut self, lba: i64, count: u32, track: Option<u8>) -> CdResult<Vec<u8>> {
        let (bypass, track) = self.resolve_track(lba, count, track)?;
        let (raw_bytes_per_sector, nominal) = (track.raw_bytes_per_sector, track.track_type);
        let mut out = Vec::new();

        for i in 0..count as i64 {
            let raw = self.read_raw_sector(lba + i, &track, bypass)?;

            if raw_bytes_per_sector != 2352 {
                // Cooked storage: the stored bytes *are* the user data.
                out.extend_from_slice(&raw);
                continue;
            }

            let actual = actual_type(nominal, raw_bytes_per_sector, &raw);
            let geom = geometry::lookup(actual, Tag::UserData).ok_or(CdError::UnsupportedTag)?;
            out.extend_from_slice(&raw[geom.offset..geom.offset + geom.size]);
        }

        Ok(out)
    }

    fn read_sector_long(&mut self, lba: i64, track: Option<u8>) -> CdResult<Vec<u8>> {
        let (bypass, track) = self.resolve_track(lba, 1, track)?;
        self.read_raw_sector(lba, &track, bypass)
    }

    fn read_sector_tag(&mut self, lba: i64, track: Option<u8>, tag: Tag) -> CdResult<Vec<u8>> {
        let (bypass, track) = self.resolve_track(lba, 1, track)?;

        if tag == Tag::Subchannel && track.subchannel_type != SubchannelType::None {
            return Err(CdError::NotYetImplemented("DiscJuggler interleaved subchannel extraction".to_string()));
        }

        let raw_bytes_per_sector = track.raw_bytes_per_sector;
        let nominal = track.track_type;
        let raw = self.read_raw_sector(lba, &track, bypass)?;

        if raw_bytes_per_sector != 2352 {
            return if tag == Tag::UserData { Ok(raw) } else { Err(CdError::UnsupportedTag) };
        }

        let actual = actual_type(nominal, raw_bytes_per_sector, &raw);
        let geom = geometry::lookup(actual, tag).ok_or(CdError::UnsupportedTag)?;

        Ok(raw[geom.offset..geom.offset + geom.size].to_vec())
    }

    fn read_disk_tag(&mut self, tag: DiskTag) -> CdResult<Vec<u8>> {
        match tag {
            DiskTag::CdText if !self.cd_text.is_empty() => Ok(self.cd_text.clone()),
            _ => Err(CdError::NotPresent),
        }
    }

    fn verify_media_image(&mut self) -> CdResult<Option<bool>> {
        let Some(checksum) = self.data_checksum else {
            return Ok(None);
        };

        self.filter.data_fork_stream().seek(SeekFrom::Start(0))?;
        let stream = self.filter.data_fork_stream().take(self.data_len);

        let digest = crate::verify::StoredDigest::Crc32(checksum);
        let aborted = std::sync::atomic::AtomicBool::new(false);

        let verdict = crate::verify::verify_stream(stream, &digest, &aborted)?;
        Ok(Some(verdict == Verdict::Good))
    }

    fn verify_sector(&mut self, lba: i64, track: Option<u8>) -> CdResult<Verdict> {
        let (bypass, track) = self.resolve_track(lba, 1, track)?;

        if track.raw_bytes_per_sector != 2352 || track.track_type.is_audio() {
            return Ok(Verdict::Unknown);
        }

        let raw_bytes_per_sector = track.raw_bytes_per_sector;
        let nominal = track.track_type;
        let raw = self.read_raw_sector(lba, &track, bypass)?;
        let actual = actual_type(nominal, raw_bytes_per_sector, &raw);

        Ok(crate::verify::verify_sector_edc(actual, &raw))
    }

    fn model(&self) -> &DiscModel {
        &self.model
    }
}

impl DiscJuggler {
    /// Volume label recorded in the image footer, if any.
    pub fn volume_id(&self) -> &str {
        &self.volume_id
    }

    /// Resolve `lba` to a track, cloned out so the borrow doesn't outlive
    /// the call into `read_raw_sector` below. With `track: None`, the
    /// usual containment lookup bounded by `[lba, lba+count-1]`; with
    /// `track: Some(seq)`, resolution bypasses containment and the
    /// returned flag tells `read_raw_sector` to use the track-relative
    /// offset instead, reaching sectors (a pregap, say) containment would
    /// never resolve to it.
    fn resolve_track(&self, lba: i64, count: u32, track: Option<u8>) -> CdResult<(bool, Track)> {
        match track {
            Some(seq) => Ok((true, self.model.track(seq).ok_or(CdError::BadTrack)?.clone())),
            None => {
                let track = self.model.track_containing(lba).ok_or(CdError::OutOfRange)?;

                if lba + count as i64 - 1 > track.end_lba {
                    return Err(CdError::OutOfRange);
                }

                Ok((false, track.clone()))
            }
        }
    }

    fn read_raw_sector(&mut self, lba: i64, track: &Track, bypass: bool) -> CdResult<Vec<u8>> {
        let offset = if bypass { track.sector_file_offset_relative(lba)? } else { track.sector_file_offset(lba)? };

        let mut raw = vec![0u8; track.raw_bytes_per_sector as usize];
        self.filter.data_fork_stream().seek(SeekFrom::Start(offset))?;
        self.filter.data_fork_stream().read_exact(&mut raw)?;

        Ok(raw)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn le32(v: u32) -> [u8; 4] {
        v.to_le_bytes()
    }

    fn session_header(track_count: u8) -> Vec<u8> {
        vec![0x00, track_count, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0xFF, 0xFF]
    }

    fn track_descriptor(track_mode: u32, session_number: u32, sequence: u32, start_lba: i64, length: u32, read_mode: u32, control: u32) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&[0u8; 16]);
        b.push(0); // empty filename
        b.extend_from_slice(&[0u8; 29]);
        b.extend_from_slice(&le32(0)[..2]); // medium type (u16)
        b.extend_from_slice(&[0, 0]); // index count = 0
        b.extend_from_slice(&le32(0)); // cdtext group count = 0
        b.extend_from_slice(&[0, 0]);
        b.extend_from_slice(&le32(track_mode));
        b.extend_from_slice(&[0u8; 4]);
        b.extend_from_slice(&le32(session_number));
        b.extend_from_slice(&le32(sequence));
        b.extend_from_slice(&le32(start_lba as u32));
        b.extend_from_slice(&le32(length));
        b.extend_from_slice(&[0u8; 16]);
        b.extend_from_slice(&le32(read_mode));
        b.extend_from_slice(&le32(control));
        b.extend_from_slice(&[0u8; 9]);
        b.extend_from_slice(&[0u8; 12]); // ISRC
        b.extend_from_slice(&le32(0)); // ISRC validity
        b.extend_from_slice(&[0u8; 87]);
        b.push(0); // session type
        b.extend_from_slice(&[0u8; 5]);
        b.push(0); // track follows
        b.push(0);
        b.extend_from_slice(&le32(0)); // end address
        b
    }

    fn image_footer_bytes(volume_id: &str, cd_text: &[u8], data_checksum: u32) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&[0u8; 16]);
        b.push(0); // empty filename
        b.extend_from_slice(&[0u8; 29]);
        b.extend_from_slice(&[0, 0]); // medium type
        b.extend_from_slice(&le32(0)); // disc size
        b.push(volume_id.len() as u8);
        b.extend_from_slice(volume_id.as_bytes());
        b.extend_from_slice(&[0u8; 9]);
        b.extend_from_slice(&[0u8; 13]); // MCN
        b.extend_from_slice(&le32(0)); // MCN validity
        b.extend_from_slice(&le32(cd_text.len() as u32));
        b.extend_from_slice(cd_text);
        b.extend_from_slice(&le32(data_checksum));
        b.extend_from_slice(&[0u8; 8]); // reserved
        b
    }

    #[test]
    fn session_header_rejects_wrong_pattern() {
        let mut bad = session_header(1);
        bad[9] = 0x02;
        let mut r = Reader::new(&bad);
        assert!(parse_session_header(&mut r).is_err());
    }

    #[test]
    fn session_header_reads_track_count() {
        let good = session_header(3);
        let mut r = Reader::new(&good);
        assert_eq!(parse_session_header(&mut r).unwrap(), 3);
    }

    #[test]
    fn rejects_bad_trackmode_readmode_combos() {
        assert!(validate_combo(0, 0).is_err());
        assert!(validate_combo(0, 1).is_err());
        assert!(validate_combo(1, 1).is_err());
        assert!(validate_combo(2, 0).is_err());
        assert!(validate_combo(1, 2).is_ok());
        assert!(validate_combo(2, 2).is_ok());
    }

    #[test]
    fn sector_shape_table_matches_stride() {
        assert_eq!(sector_shape(0).unwrap(), (2048, SubchannelType::None));
        assert_eq!(sector_shape(3).unwrap(), (2352, SubchannelType::Q16Interleaved));
        assert_eq!(sector_shape(4).unwrap(), (2352, SubchannelType::RawInterleaved));
        assert!(sector_shape(5).is_err());
    }

    #[test]
    fn parses_one_session_one_audio_track_and_footer() {
        let mut footer = Vec::new();
        footer.push(1u8); // one session
        footer.extend_from_slice(&session_header(1));
        footer.extend_from_slice(&track_descriptor(0, 1, 1, 0, 100, 2, 0x0));
        footer.extend_from_slice(&session_header(0)); // lead-out/epilogue session
        footer.extend_from_slice(&image_footer_bytes("MY_DISC", &[0xAA, 0xBB], 0));

        let data = vec![0u8; 150 * 2352 + 100 * 2352];

        // Minimal in-memory stand-in for a `Filter` backing the main data file.
        struct CursorFilter {
            cursor: std::io::Cursor<Vec<u8>>,
        }
        impl Filter for CursorFilter {
            fn filename(&self) -> &str {
                "disc.cdi"
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
        let mut filter = CursorFilter { cursor: std::io::Cursor::new(data) };
        let (model, image_footer) = build_model(&footer, &mut filter).unwrap();

        assert_eq!(model.tracks().len(), 1);
        let track = &model.track(1).unwrap();
        assert_eq!(track.track_type, TrackType::Audio);
        assert_eq!(track.start_lba, 0);
        assert_eq!(track.end_lba, 99);
        assert_eq!(track.file_offset, 150 * 2352);
        assert_eq!(image_footer.volume_id, "MY_DISC");
        assert_eq!(image_footer.cd_text, vec![0xAA, 0xBB]);
        assert_eq!(image_footer.data_checksum, None);
    }

    struct CursorFilter {
        cursor: std::io::Cursor<Vec<u8>>,
    }
    impl Filter for CursorFilter {
        fn filename(&self) -> &str {
            "disc.cdi"
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

    #[test]
    fn verify_media_image_reproduces_stored_crc32() {
        let data = vec![0x5Au8; 150 * 2352 + 100 * 2352];
        let checksum = crc32fast::hash(&data);

        let mut footer = Vec::new();
        footer.push(1u8);
        footer.extend_from_slice(&session_header(1));
        footer.extend_from_slice(&track_descriptor(0, 1, 1, 0, 100, 2, 0x0));
        footer.extend_from_slice(&session_header(0));
        footer.extend_from_slice(&image_footer_bytes("MY_DISC", &[], checksum));

        let mut whole = data;
        whole.extend_from_slice(&footer);
        whole.extend_from_slice(&(footer.len() as u32).to_le_bytes());

        let filter = Box::new(CursorFilter { cursor: std::io::Cursor::new(whole) });
        let mut image = DiscJuggler::open(filter).unwrap();

        assert_eq!(image.verify_media_image().unwrap(), Some(true));
    }

    #[test]
    fn bypass_reads_track_relative_offset() {
        let data = vec![0x5Au8; 150 * 2352 + 100 * 2352];

        let mut footer = Vec::new();
        footer.push(1u8);
        footer.extend_from_slice(&session_header(1));
        footer.extend_from_slice(&track_descriptor(1, 1, 1, 0, 100, 2, 0x4));
        footer.extend_from_slice(&session_header(0));
        footer.extend_from_slice(&image_footer_bytes("MY_DISC", &[], 0));

        let mut whole = data;
        whole.extend_from_slice(&footer);
        whole.extend_from_slice(&(footer.len() as u32).to_le_bytes());

        let filter = Box::new(CursorFilter { cursor: std::io::Cursor::new(whole) });
        let mut image = DiscJuggler::open(filter).unwrap();

        assert!(image.read_sector_long(-1, None).is_err());
        assert!(image.read_sector_long(-1, Some(1)).is_ok());
    }
}
