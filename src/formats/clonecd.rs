//! CloneCD (`.ccd` descriptor + `.img` raw image + optional `.sub`
//! subchannel) backend.
//!
//! The descriptor is a plain INI file: `[CloneCD]`/`[Disc]` carry disc-wide
//! metadata, `[Entry N]` sections are literally Full TOC entries (same
//! shape as [`crate::toc::TocEntry`]) so building the canonical model is
//! mostly a matter of feeding them through [`crate::toc::Toc`].

use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom};

use crate::bcd::Bcd;
use crate::filter::{Filter, FiltersList};
use crate::geometry::{self, Scrambler, Tag};
use crate::model::{DiscModel, DiscModelBuilder, SubchannelType, Track, TrackType};
use crate::msf::Msf;
use crate::toc::{Toc, TocEntry, TocEntryKind};
use crate::verify::Verdict;
use crate::{CdError, CdResult, DiskTag, Image};

/// CloneCD image: the `.img` data stream, an optional `.sub` subchannel
/// stream, and the model/TOC/CD-Text derived from the `.ccd` descriptor.
pub struct CloneCd {
    img: Box<dyn Filter>,
    sub: Option<Box<dyn Filter>>,
    model: DiscModel,
    toc: Toc,
    cd_text: Vec<u8>,
    /// Whether `[Disc] DataTracksScrambled=1` was set; data tracks must be
    /// descrambled before their sub-header/mode byte means anything.
    scrambled: bool,
}

type Ini = BTreeMap<String, BTreeMap<String, String>>;

fn parse_ini(text: &str) -> Ini {
    let mut sections: Ini = BTreeMap::new();
    let mut current = String::new();

    for raw_line in text.lines() {
        let line = raw_line.trim();

        if line.is_empty() || line.starts_with(';') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            current = line[1..line.len() - 1].to_string();
            sections.entry(current.clone()).or_default();
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            sections.entry(current.clone()).or_default().insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    sections
}

/// Accepts `0x`-prefixed hex (with an optional leading `-`) or plain
/// decimal, matching the mix CloneCD descriptors actually use across
/// their numeric fields.
fn parse_int(s: &str) -> Option<i64> {
    let s = s.trim();

    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(hex) = s.strip_prefix("-0x").or_else(|| s.strip_prefix("-0X")) {
        i64::from_str_radix(hex, 16).ok().map(|v| -v)
    } else {
        s.parse::<i64>().ok()
    }
}

fn field(section: &BTreeMap<String, String>, key: &str) -> CdResult<i64> {
    let raw = section.get(key).ok_or_else(|| CdError::Malformed {
        detail: format!("missing field `{key}`"),
        offset: 0,
    })?;

    parse_int(raw).ok_or_else(|| CdError::Malformed { detail: format!("field `{key}` isn't a number: {raw}"), offset: 0 })
}

/// Sections named `"{prefix} N"`, sorted by `N` (a plain `BTreeMap` would
/// sort `"Entry 10"` before `"Entry 2"` lexicographically).
fn numbered_sections<'a>(ini: &'a Ini, prefix: &str) -> Vec<(u32, &'a BTreeMap<String, String>)> {
    let mut out: Vec<(u32, &BTreeMap<String, String>)> = ini
        .iter()
        .filter_map(|(name, body)| {
            let n = name.strip_prefix(prefix)?.trim();
            n.parse::<u32>().ok().map(|n| (n, body))
        })
        .collect();

    out.sort_by_key(|&(n, _)| n);
    out
}

fn msf_decimal(min: i64, sec: i64, frame: i64) -> CdResult<Msf> {
    let m = Bcd::from_binary(min.unsigned_abs() as u8);
    let s = Bcd::from_binary(sec as u8);
    let f = Bcd::from_binary(frame as u8);

    match (m, s, f) {
        (Some(m), Some(s), Some(f)) => Msf::new(m, s, f).ok_or(CdError::InvalidMsf),
        _ => Err(CdError::InvalidMsf),
    }
}

fn parse_toc_entries(ini: &Ini) -> CdResult<Vec<TocEntry>> {
    let mut entries = Vec::new();

    for (_, body) in numbered_sections(ini, "Entry ") {
        let session = field(body, "Session")? as u8;
        let point = field(body, "Point")? as u8;
        let adr = field(body, "ADR")? as u8;
        let control = field(body, "Control")? as u8;
        let tno = field(body, "TrackNo")? as u8;
        let zero = field(body, "Zero").unwrap_or(0) as u8;

        let amin = field(body, "AMin")?;
        let asec = field(body, "ASec")?;
        let aframe = field(body, "AFrame")?;
        let pmin = field(body, "PMin")?;
        let psec = field(body, "PSec")?;
        let pframe = field(body, "PFrame")?;

        entries.push(TocEntry {
            session,
            adr,
            control,
            tno,
            point,
            min_sec_frame: msf_decimal(amin, asec, aframe)?,
            zero,
            p_min_sec_frame: msf_decimal(pmin, psec, pframe)?,
        });
    }

    if entries.is_empty() {
        return Err(CdError::EmptyToc);
    }

    Ok(entries)
}

/// One session's worth of track starts plus its lead-out, grouped from
/// the flat `Toc` entry list.
struct SessionToc {
    tracks: Vec<(u8, Msf, u8)>,
    lead_out: Option<Msf>,
}

fn group_by_session(toc: &Toc) -> BTreeMap<u8, SessionToc> {
    let mut sessions: BTreeMap<u8, SessionToc> = BTreeMap::new();

    for entry in toc.entries() {
        let bucket = sessions.entry(entry.session).or_insert_with(|| SessionToc { tracks: Vec::new(), lead_out: None });

        match entry.interpret() {
            TocEntryKind::TrackStart { track, start } => bucket.tracks.push((track, start, entry.control)),
            TocEntryKind::LeadOut { start } => bucket.lead_out = Some(start),
            _ => {}
        }
    }

    for bucket in sessions.values_mut() {
        bucket.tracks.sort_by_key(|&(track, ..)| track);
    }

    sessions
}

/// Peek the first raw sector of a data track to discriminate its actual
/// mode/form, descrambling first if the disc declares its data tracks
/// scrambled (§4.3.1).
fn classify_data_track(img: &mut dyn Filter, file_offset: u64, scrambled: bool) -> CdResult<TrackType> {
    let mut raw = [0u8; 2352];

    img.data_fork_stream().seek(SeekFrom::Start(file_offset))?;
    img.data_fork_stream().read_exact(&mut raw)?;

    if scrambled {
        Scrambler::new().apply(&mut raw);
    }

    if !geometry::has_sync_pattern(&raw) {
        return Ok(TrackType::CdMode2Formless);
    }

    match raw[15] {
        1 => Ok(TrackType::CdMode1),
        2 => Ok(geometry::mode2_form(&raw).unwrap_or(TrackType::CdMode2Formless)),
        _ => Ok(TrackType::CdMode2Formless),
    }
}

fn build_model(toc: &Toc, img: &mut dyn Filter, scrambled: bool, has_sub: bool) -> CdResult<DiscModel> {
    let sessions = group_by_session(toc);
    let mut builder = DiscModelBuilder::new();

    for (&session, stoc) in &sessions {
        if stoc.tracks.is_empty() {
            continue;
        }

        for (i, &(track_no, start, control)) in stoc.tracks.iter().enumerate() {
            let start_lba = start.to_lba();

            let end_lba = if let Some((_, next_start, _)) = stoc.tracks.get(i + 1) {
                next_start.to_lba() - 1
            } else {
                stoc.lead_out.ok_or(CdError::EmptyToc)?.to_lba() - 1
            };

            let file_offset = start_lba.max(0) as u64 * 2352;

            let track_type = if control & 0x4 == 0 {
                TrackType::Audio
            } else {
                classify_data_track(img, file_offset, scrambled)?
            };

            builder.add_track(Track {
                sequence: track_no,
                session,
                track_type,
                raw_bytes_per_sector: track_type.raw_bytes_per_sector(),
                user_bytes_per_sector: track_type.user_bytes_per_sector(),
                start_lba,
                end_lba,
                file_offset,
                subchannel_type: if has_sub { SubchannelType::PackedInterleaved } else { SubchannelType::None },
                subchannel_file_offset: has_sub.then_some(start_lba.max(0) as u64 * 96),
                control,
            });
        }
    }

    builder.build()
}

impl Image for CloneCd {
    fn image_format(&self) -> String {
        "CloneCD".to_string()
    }

    fn identify(filter: &dyn Filter) -> bool {
        filter.filename().to_lowercase().ends_with(".ccd")
    }

    fn open(mut filter: Box<dyn Filter>) -> CdResult<Self> {
        let mut text = String::new();
        filter.data_fork_stream().read_to_string(&mut text).map_err(CdError::IoError)?;

        let ini = parse_ini(&text);

        let disc = ini.get("Disc").ok_or_else(|| CdError::Malformed { detail: "missing [Disc] section".into(), offset: 0 })?;
        let scrambled = disc.get("DataTracksScrambled").and_then(|v| parse_int(v)).unwrap_or(0) != 0;

        if let Some(clonecd) = ini.get("CloneCD") {
            if let Some(version) = clonecd.get("Version") {
                if version != "2" && version != "3" {
                    log::warn!("unrecognised CloneCD descriptor version {version}, continuing anyway");
                }
            }
        }

        let entries = parse_toc_entries(&ini)?;
        let first_session = entries.iter().map(|e| e.session).min().unwrap_or(1);
        let last_session = entries.iter().map(|e| e.session).max().unwrap_or(1);
        let toc = Toc::new(entries, first_session, last_session);
        let cd_text = parse_cd_text_section(&ini);

        let base = filter.base_path().to_path_buf();
        let img_name = base.join(filename_with_ext(filter.filename(), "img"));
        let sub_name = base.join(filename_with_ext(filter.filename(), "sub"));

        let mut img = FiltersList::get(&img_name)?;
        let sub = FiltersList::get(&sub_name).ok();

        let model = build_model(&toc, img.as_mut(), scrambled, sub.is_some())?;

        Ok(CloneCd { img, sub, model, toc, cd_text, scrambled })
    }

    fn read_sectors(&mut self, lba: i64, count: u32, track: Option<u8>) -> CdResult<Vec<u8>> {
        let track = self.resolve_track(lba, count, track)?;
        let (file_offset, start_lba, track_type) = (track.file_offset, track.start_lba, track.track_type);

        let mut out = Vec::new();

        for i in 0..count as i64 {
            let raw = self.read_raw_sector(lba + i, file_offset, start_lba)?;
            let actual = actual_type(track_type, &raw);
            let geom = geometry::lookup(actual, Tag::UserData).ok_or(CdError::UnsupportedTag)?;

            out.extend_from_slice(&raw[geom.offset..geom.offset + geom.size]);
        }

        Ok(out)
    }

    fn read_sector_long(&mut self, lba: i64, track: Option<u8>) -> CdResult<Vec<u8>> {
        let track = self.resolve_track(lba, 1, track)?;
        self.read_raw_sector(lba, track.file_offset, track.start_lba).map(|raw| raw.to_vec())
    }

    fn read_sector_tag(&mut self, lba: i64, track: Option<u8>, tag: Tag) -> CdResult<Vec<u8>> {
        let track = self.resolve_track(lba, 1, track)?;
        let (file_offset, start_lba, track_type, subchannel_file_offset) =
            (track.file_offset, track.start_lba, track.track_type, track.subchannel_file_offset);

        if tag == Tag::Subchannel {
            let base = subchannel_file_offset.ok_or(CdError::UnsupportedTag)?;
            let sub = self.sub.as_mut().ok_or(CdError::UnsupportedTag)?;

            let offset = base + (lba - start_lba) as u64 * 96;
            let mut buf = [0u8; 96];
            sub.data_fork_stream().seek(SeekFrom::Start(offset))?;
            sub.data_fork_stream().read_exact(&mut buf)?;

            return Ok(buf.to_vec());
        }

        let raw = self.read_raw_sector(lba, file_offset, start_lba)?;
        let actual = actual_type(track_type, &raw);
        let geom = geometry::lookup(actual, tag).ok_or(CdError::UnsupportedTag)?;

        Ok(raw[geom.offset..geom.offset + geom.size].to_vec())
    }

    fn read_disk_tag(&mut self, tag: DiskTag) -> CdResult<Vec<u8>> {
        match tag {
            DiskTag::CdText if !self.cd_text.is_empty() => Ok(self.cd_text.clone()),
            DiskTag::FullToc => Ok(self.toc.to_bytes()),
            _ => Err(CdError::NotPresent),
        }
    }

    fn verify_media_image(&mut self) -> CdResult<Option<bool>> {
        Ok(None)
    }

    fn verify_sector(&mut self, lba: i64, track: Option<u8>) -> CdResult<Verdict> {
        let track = self.resolve_track(lba, 1, track)?;
        let (file_offset, start_lba, track_type) = (track.file_offset, track.start_lba, track.track_type);

        if track_type.is_audio() {
            return Ok(Verdict::Unknown);
        }

        let raw = self.read_raw_sector(lba, file_offset, start_lba)?;
        let actual = actual_type(track_type, &raw);

        Ok(crate::verify::verify_sector_edc(actual, &raw))
    }

    fn model(&self) -> &DiscModel {
        &self.model
    }
}

impl CloneCd {
    /// Resolve `lba` to a track. With `track: None`, the usual containment
    /// lookup bounded by `[lba, lba+count-1]`. With `track: Some(seq)`,
    /// resolution bypasses containment and trusts the named track's own
    /// `file_offset`/`start_lba`, reaching sectors (a pregap, say) that
    /// containment would never resolve to it.
    fn resolve_track(&self, lba: i64, count: u32, track: Option<u8>) -> CdResult<&Track> {
        match track {
            Some(seq) => self.model.track(seq).ok_or(CdError::BadTrack),
            None => {
                let track = self.model.track_containing(lba).ok_or(CdError::OutOfRange)?;

                if lba + count as i64 - 1 > track.end_lba {
                    return Err(CdError::OutOfRange);
                }

                Ok(track)
            }
        }
    }

    fn read_raw_sector(&mut self, lba: i64, track_file_offset: u64, track_start_lba: i64) -> CdResult<[u8; 2352]> {
        let offset = track_file_offset + (lba - track_start_lba) as u64 * 2352;

        let mut raw = [0u8; 2352];
        self.img.data_fork_stream().seek(SeekFrom::Start(offset))?;
        self.img.data_fork_stream().read_exact(&mut raw)?;

        if self.scrambled {
            Scrambler::new().apply(&mut raw);
        }

        Ok(raw)
    }
}

/// Re-resolve a Mode 2 track's actual per-sector form; leaves non-Mode2
/// types unchanged. `raw` is assumed already descrambled by the caller.
fn actual_type(nominal: TrackType, raw: &[u8]) -> TrackType {
    if nominal.is_mode2() {
        geometry::mode2_form(raw).unwrap_or(TrackType::CdMode2Formless)
    } else {
        nominal
    }
}

fn parse_cd_text_section(ini: &Ini) -> Vec<u8> {
    let Some(section) = ini.get("CDText") else { return Vec::new() };

    let mut entries: Vec<(u32, &str)> = section
        .iter()
        .filter_map(|(k, v)| k.strip_prefix("Entry ").and_then(|n| n.trim().parse::<u32>().ok()).map(|n| (n, v.as_str())))
        .collect();
    entries.sort_by_key(|&(n, _)| n);

    let mut out = Vec::new();
    for (_, line) in entries {
        for tok in line.split_whitespace() {
            if let Ok(byte) = u8::from_str_radix(tok, 16) {
                out.push(byte);
            }
        }
    }

    out
}

fn filename_with_ext(name: &str, ext: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, _)) => format!("{stem}.{ext}"),
        None => format!("{name}.{ext}"),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_ini_sections() {
        let text = "[CloneCD]\nVersion=3\n\n[Disc]\nTocEntries=4\nDataTracksScrambled=0\n";
        let ini = parse_ini(text);

        assert_eq!(ini.get("CloneCD").unwrap().get("Version").unwrap(), "3");
        assert_eq!(ini.get("Disc").unwrap().get("TocEntries").unwrap(), "4");
    }

    #[test]
    fn parses_hex_and_decimal_fields() {
        assert_eq!(parse_int("0x04"), Some(4));
        assert_eq!(parse_int("-150"), Some(-150));
        assert_eq!(parse_int("10"), Some(10));
    }

    #[test]
    fn orders_numbered_sections_numerically() {
        let text = "[Entry 10]\nPoint=0xa2\n\n[Entry 2]\nPoint=0x01\n";
        let ini = parse_ini(text);
        let sections = numbered_sections(&ini, "Entry ");

        assert_eq!(sections.iter().map(|&(n, _)| n).collect::<Vec<_>>(), vec![2, 10]);
    }

    #[test]
    fn groups_sessions_and_finds_lead_out() {
        let entries = vec![
            TocEntry {
                session: 1,
                adr: 1,
                control: 0x4,
                tno: 0,
                point: 0x01,
                min_sec_frame: Msf::from_bcd(0, 2, 0).unwrap(),
                zero: 0,
                p_min_sec_frame: Msf::from_bcd(0, 2, 0).unwrap(),
            },
            TocEntry {
                session: 1,
                adr: 1,
                control: 0x4,
                tno: 0,
                point: 0xA2,
                min_sec_frame: Msf::from_bcd(0, 0, 0).unwrap(),
                zero: 0,
                p_min_sec_frame: Msf::from_bcd(10, 0, 0).unwrap(),
            },
        ];

        let toc = Toc::new(entries, 1, 1);
        let sessions = group_by_session(&toc);

        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[&1].tracks.len(), 1);
        assert!(sessions[&1].lead_out.is_some());
    }
}
