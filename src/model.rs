//! The canonical disc model: whatever a container parser discovers about
//! a disc's tracks and sessions is normalized into this shape once, during
//! `open`, and frozen. The extraction and verification engines never look
//! back at the source container format again.

use std::collections::BTreeMap;

use crate::{CdError, CdResult};

/// Physical shape of one sector within a track. This is what the
/// [`geometry`](crate::geometry) table is indexed by; it is a property of
/// the *storage*, not of the track's musical/data role (a CD-ROM XA disc's
/// data track is still tagged `CdMode2Form1` or `CdMode2Form2` depending on
/// which form its sectors use).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackType {
    /// 2352 bytes/sector, no sub-structure.
    Audio,
    /// CD-ROM Mode 1: 2048 bytes of user data, EDC + ECC.
    CdMode1,
    /// CD-ROM XA Mode 2 Form 1: 2048 bytes of user data, EDC + ECC.
    CdMode2Form1,
    /// CD-ROM XA Mode 2 Form 2: 2324 bytes of user data, EDC only.
    CdMode2Form2,
    /// Mode 2 sector whose form could not be determined from the
    /// sub-header (or wasn't stored); treated as an opaque 2336-byte blob.
    CdMode2Formless,
    /// Cooked (already-stripped) data stream, stride 2048, no sub-structure
    /// available at all.
    Data,
}

impl TrackType {
    /// Whether this shape is one of the Mode 2 variants.
    pub fn is_mode2(self) -> bool {
        matches!(
            self,
            TrackType::CdMode2Form1 | TrackType::CdMode2Form2 | TrackType::CdMode2Formless
        )
    }

    /// Whether this is an audio (CD-DA) track.
    pub fn is_audio(self) -> bool {
        matches!(self, TrackType::Audio)
    }

    /// Raw (on-disc) sector size in bytes for this shape, when stored at
    /// full fidelity (2352 for every CD shape, 2048 for cooked `Data`).
    pub fn raw_bytes_per_sector(self) -> u32 {
        match self {
            TrackType::Data => 2048,
            _ => 2352,
        }
    }

    /// User-visible payload size in bytes, per the Sector Geometry table.
    pub fn user_bytes_per_sector(self) -> u32 {
        match self {
            TrackType::Audio => 2352,
            TrackType::CdMode1 | TrackType::CdMode2Form1 => 2048,
            TrackType::CdMode2Form2 => 2324,
            TrackType::CdMode2Formless => 2336,
            TrackType::Data => 2048,
        }
    }
}

/// How a track's subchannel is stored alongside its sector data, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubchannelType {
    /// No subchannel stored for this track.
    None,
    /// 16 bytes of interleaved Q subchannel per sector (DiscJuggler readMode 3).
    Q16Interleaved,
    /// 96 bytes of raw interleaved P-W subchannel per sector.
    RawInterleaved,
    /// 96 bytes of subchannel, deinterleaved/packed by channel (CloneCD `.sub`).
    PackedInterleaved,
}

impl SubchannelType {
    /// Extra bytes appended to a sector's raw size by this subchannel storage.
    pub fn padding(self) -> u32 {
        match self {
            SubchannelType::None => 0,
            SubchannelType::Q16Interleaved => 16,
            SubchannelType::RawInterleaved | SubchannelType::PackedInterleaved => 96,
        }
    }
}

/// Disc classification, derived from the composition of its tracks (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    /// Plain audio CD: every track is `Audio`.
    Cdda,
    /// Multi-session disc starting with audio, later sessions carrying
    /// Mode 2 data (the "blue book" CD+ / CD Extra layout).
    CdPlus,
    /// CD-ROM XA: mixed-mode disc with Mode 2 tracks, or a data-first disc
    /// that also carries audio tracks.
    CdRomXa,
    /// Pure data CD-ROM: no audio tracks at all.
    CdRom,
    /// Mixed-mode CD that doesn't fit any more specific bucket.
    Cd,
}

/// One contiguous LBA range within a session. See the module docs for the
/// invariants the [`DiscModelBuilder`] enforces on this type.
#[derive(Debug, Clone)]
pub struct Track {
    /// Track number, 1..99.
    pub sequence: u8,
    /// Session this track belongs to, 1-based.
    pub session: u8,
    /// Physical sector shape.
    pub track_type: TrackType,
    /// On-disc bytes per sector, not counting subchannel padding.
    pub raw_bytes_per_sector: u32,
    /// User-visible bytes per sector (`<= raw_bytes_per_sector`).
    pub user_bytes_per_sector: u32,
    /// First LBA of this track (inclusive).
    pub start_lba: i64,
    /// Last LBA of this track (inclusive).
    pub end_lba: i64,
    /// Byte offset in the underlying data stream at which `start_lba` begins.
    pub file_offset: u64,
    /// How this track's subchannel, if any, is stored.
    pub subchannel_type: SubchannelType,
    /// Byte offset in the subchannel stream (if a separate one exists) at
    /// which this track's subchannel data begins.
    pub subchannel_file_offset: Option<u64>,
    /// 4-bit CONTROL field from the TOC (data/audio, pre-emphasis,
    /// digital-copy-permitted, quadraphonic).
    pub control: u8,
}

impl Track {
    /// Number of sectors in this track.
    pub fn length(&self) -> u32 {
        (self.end_lba - self.start_lba + 1) as u32
    }

    /// Whether `lba` falls within `[start_lba, end_lba]`.
    pub fn contains(&self, lba: i64) -> bool {
        lba >= self.start_lba && lba <= self.end_lba
    }

    /// Byte stride between two consecutive sectors in the underlying
    /// stream, including any subchannel padding.
    pub fn stride(&self) -> u64 {
        self.raw_bytes_per_sector as u64 + self.subchannel_type.padding() as u64
    }

    /// Byte offset of `lba` within the data stream. Fails with
    /// [`CdError::OutOfRange`] if `lba` isn't in this track.
    pub fn sector_file_offset(&self, lba: i64) -> CdResult<u64> {
        if !self.contains(lba) {
            return Err(CdError::OutOfRange);
        }

        let k = (lba - self.start_lba) as u64;

        Ok(self.file_offset + k * self.stride())
    }

    /// Byte offset of `lba` within the data stream, resolved against this
    /// track specifically rather than through containment. Backs the
    /// track-bypass parameter on `Image`'s read/verify operations, which
    /// lets a caller reach sectors physically adjacent to a track (its
    /// pregap, say) that `DiscModel::track_containing` would never route
    /// to it. Fails only if the computed offset would land before the
    /// start of the stream.
    pub fn sector_file_offset_relative(&self, lba: i64) -> CdResult<u64> {
        let delta = (lba - self.start_lba) * self.stride() as i64;
        let offset = self.file_offset as i64 + delta;

        if offset < 0 {
            return Err(CdError::OutOfRange);
        }

        Ok(offset as u64)
    }

    /// Whether this track carries CD-ROM-shaped sectors (as opposed to
    /// plain audio).
    pub fn is_data(&self) -> bool {
        !self.track_type.is_audio()
    }
}

/// One session: a contiguous run of tracks sharing a lead-in/lead-out.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session number, 1-based.
    pub sequence: u8,
    /// First track number in this session.
    pub start_track: u8,
    /// Last track number in this session.
    pub end_track: u8,
    /// First LBA of this session (the first track's `start_lba`).
    pub start_sector: i64,
    /// Last LBA of this session (the last track's `end_lba`).
    pub end_sector: i64,
}

/// A per-track view derived 1:1 from [`Track`], for consumers that expect
/// a partition-table-shaped description rather than CD terminology.
#[derive(Debug, Clone)]
pub struct Partition {
    /// Human readable description, e.g. "Data Track" or "Audio Track".
    pub description: String,
    /// Track number this partition mirrors.
    pub sequence: u8,
    /// First LBA.
    pub start: i64,
    /// Sector count.
    pub length: u32,
    /// Byte offset in the underlying stream.
    pub offset: u64,
    /// Size in bytes (`length * user_bytes_per_sector`).
    pub size_in_bytes: u64,
    /// Coarse type tag, e.g. "MODE1/2048" or "AUDIO".
    pub type_tag: String,
}

/// Dense, monotonic mapping of track sequence to start LBA.
#[derive(Debug, Clone, Default)]
pub struct OffsetMap(BTreeMap<u8, i64>);

impl OffsetMap {
    /// Start LBA of `sequence`, if it exists in the map.
    pub fn get(&self, sequence: u8) -> Option<i64> {
        self.0.get(&sequence).copied()
    }

    /// Iterate over `(sequence, start_lba)` pairs in track order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, i64)> + '_ {
        self.0.iter().map(|(&k, &v)| (k, v))
    }
}

/// Mapping of track sequence to its 4-bit CONTROL field.
#[derive(Debug, Clone, Default)]
pub struct TrackFlags(BTreeMap<u8, u8>);

impl TrackFlags {
    /// CONTROL nibble for `sequence`, if it exists in the map.
    pub fn get(&self, sequence: u8) -> Option<u8> {
        self.0.get(&sequence).copied()
    }
}

/// The frozen, whole-disc model built once by a container parser and
/// consumed for the rest of the image's lifetime.
#[derive(Debug, Clone)]
pub struct DiscModel {
    tracks: Vec<Track>,
    sessions: Vec<Session>,
    partitions: Vec<Partition>,
    offset_map: OffsetMap,
    track_flags: TrackFlags,
    media_type: MediaType,
    lead_out: i64,
}

impl DiscModel {
    /// All tracks, sorted by sequence.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// All sessions, sorted by sequence.
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Derived partition table, one entry per track.
    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    /// Track-sequence to start-LBA map.
    pub fn offset_map(&self) -> &OffsetMap {
        &self.offset_map
    }

    /// Track-sequence to CONTROL map.
    pub fn track_flags(&self) -> &TrackFlags {
        &self.track_flags
    }

    /// The disc's classification (§4.5).
    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    /// First LBA past the last track, i.e. the start of the lead-out.
    pub fn lead_out(&self) -> i64 {
        self.lead_out
    }

    /// Look up a track by its sequence number.
    pub fn track(&self, sequence: u8) -> Option<&Track> {
        self.tracks.iter().find(|t| t.sequence == sequence)
    }

    /// Resolve `lba` to the track that contains it.
    pub fn track_containing(&self, lba: i64) -> Option<&Track> {
        // Tracks are sorted and non-overlapping, so a linear scan is fine
        // for disc-sized track counts (<= 99) and keeps the lookup simple.
        self.tracks.iter().find(|t| t.contains(lba))
    }

    /// All tracks belonging to the given session, in sequence order.
    pub fn get_session_tracks(&self, session: u8) -> Vec<&Track> {
        self.tracks.iter().filter(|t| t.session == session).collect()
    }
}

/// Accumulates tracks discovered by a container parser and, on [`build`],
/// validates and seals them into a [`DiscModel`].
///
/// [`build`]: DiscModelBuilder::build
#[derive(Debug, Default)]
pub struct DiscModelBuilder {
    tracks: Vec<Track>,
}

impl DiscModelBuilder {
    /// Start with an empty track list.
    pub fn new() -> DiscModelBuilder {
        DiscModelBuilder { tracks: Vec::new() }
    }

    /// Append a track discovered by the parser. Order doesn't matter;
    /// `build` sorts by sequence.
    pub fn add_track(&mut self, track: Track) -> &mut Self {
        self.tracks.push(track);
        self
    }

    /// Validate, seal and freeze the accumulated tracks into a [`DiscModel`].
    pub fn build(mut self) -> CdResult<DiscModel> {
        if self.tracks.is_empty() {
            return Err(CdError::EmptyToc);
        }

        self.tracks.sort_by_key(|t| t.sequence);

        let mut seen = std::collections::HashSet::new();
        for t in &self.tracks {
            if !seen.insert(t.sequence) {
                return Err(CdError::BadImage {
                    path: Default::default(),
                    desc: format!("Duplicate track number {}", t.sequence),
                });
            }

            if t.end_lba < t.start_lba {
                return Err(CdError::BadImage {
                    path: Default::default(),
                    desc: format!("Track {} ends before it starts", t.sequence),
                });
            }

            if t.raw_bytes_per_sector < t.user_bytes_per_sector {
                return Err(CdError::BadImage {
                    path: Default::default(),
                    desc: format!("Track {} has more user data than raw sector bytes", t.sequence),
                });
            }
        }

        for pair in self.tracks.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);

            if prev.session == next.session && next.start_lba != prev.end_lba + 1 {
                return Err(CdError::BadImage {
                    path: Default::default(),
                    desc: format!(
                        "Tracks {} and {} are not LBA-contiguous",
                        prev.sequence, next.sequence
                    ),
                });
            }
        }

        let lead_out = self.tracks.last().unwrap().end_lba + 1;

        let mut sessions: Vec<Session> = Vec::new();
        for t in &self.tracks {
            match sessions.iter_mut().find(|s| s.sequence == t.session) {
                Some(s) => {
                    s.end_track = t.sequence;
                    s.end_sector = t.end_lba;
                }
                None => sessions.push(Session {
                    sequence: t.session,
                    start_track: t.sequence,
                    end_track: t.sequence,
                    start_sector: t.start_lba,
                    end_sector: t.end_lba,
                }),
            }
        }
        sessions.sort_by_key(|s| s.sequence);

        let mut offset_map = BTreeMap::new();
        let mut track_flags = BTreeMap::new();
        let mut partitions = Vec::with_capacity(self.tracks.len());

        for t in &self.tracks {
            offset_map.insert(t.sequence, t.start_lba);
            track_flags.insert(t.sequence, t.control);

            let type_tag = match t.track_type {
                TrackType::Audio => "AUDIO".to_string(),
                TrackType::CdMode1 => "MODE1/2048".to_string(),
                TrackType::CdMode2Form1 => "MODE2/FORM1".to_string(),
                TrackType::CdMode2Form2 => "MODE2/FORM2".to_string(),
                TrackType::CdMode2Formless => "MODE2/2336".to_string(),
                TrackType::Data => "MODE1/2048".to_string(),
            };

            partitions.push(Partition {
                description: if t.is_data() { "Data Track".to_string() } else { "Audio Track".to_string() },
                sequence: t.sequence,
                start: t.start_lba,
                length: t.length(),
                offset: t.file_offset,
                size_in_bytes: t.length() as u64 * t.user_bytes_per_sector as u64,
                type_tag,
            });
        }

        let media_type = classify_media_type(&self.tracks);

        Ok(DiscModel {
            tracks: self.tracks,
            sessions,
            partitions,
            offset_map: OffsetMap(offset_map),
            track_flags: TrackFlags(track_flags),
            media_type,
            lead_out,
        })
    }
}

/// Implements the §4.5 classification rules.
fn classify_media_type(tracks: &[Track]) -> MediaType {
    let first_audio = tracks[0].track_type.is_audio();
    let first_data = !first_audio;

    let rest = &tracks[1..];
    let data = rest.iter().any(|t| !t.track_type.is_audio());
    let audio = rest.iter().any(|t| t.track_type.is_audio());
    let mode2 = tracks.iter().any(|t| t.track_type.is_mode2());
    let sessions = tracks.iter().map(|t| t.session).collect::<std::collections::HashSet<_>>().len();

    if !data && !first_data {
        MediaType::Cdda
    } else if first_audio && data && sessions > 1 && mode2 {
        MediaType::CdPlus
    } else if (first_data && audio) || mode2 {
        MediaType::CdRomXa
    } else if !audio {
        MediaType::CdRom
    } else {
        MediaType::Cd
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn track(seq: u8, session: u8, start: i64, end: i64, ty: TrackType) -> Track {
        Track {
            sequence: seq,
            session,
            track_type: ty,
            raw_bytes_per_sector: ty.raw_bytes_per_sector(),
            user_bytes_per_sector: ty.user_bytes_per_sector(),
            start_lba: start,
            end_lba: end,
            file_offset: start as u64 * ty.raw_bytes_per_sector() as u64,
            subchannel_type: SubchannelType::None,
            subchannel_file_offset: None,
            control: if ty.is_audio() { 0x0 } else { 0x4 },
        }
    }

    #[test]
    fn builds_simple_cdda() {
        let mut b = DiscModelBuilder::new();
        b.add_track(track(1, 1, 0, 999, TrackType::Audio));
        b.add_track(track(2, 1, 1000, 1999, TrackType::Audio));

        let model = b.build().unwrap();
        assert_eq!(model.media_type(), MediaType::Cdda);
        assert_eq!(model.lead_out(), 2000);
        assert_eq!(model.tracks().len(), 2);
        assert_eq!(model.offset_map().get(2), Some(1000));
    }

    #[test]
    fn classifies_cdrom_xa() {
        let mut b = DiscModelBuilder::new();
        b.add_track(track(1, 1, 0, 999, TrackType::CdMode2Form1));
        b.add_track(track(2, 1, 1000, 1999, TrackType::CdMode2Form2));

        let model = b.build().unwrap();
        assert_eq!(model.media_type(), MediaType::CdRomXa);
    }

    #[test]
    fn classifies_pure_cdrom() {
        let mut b = DiscModelBuilder::new();
        b.add_track(track(1, 1, 0, 999, TrackType::CdMode1));

        let model = b.build().unwrap();
        assert_eq!(model.media_type(), MediaType::CdRom);
    }

    #[test]
    fn rejects_gap_between_tracks() {
        let mut b = DiscModelBuilder::new();
        b.add_track(track(1, 1, 0, 999, TrackType::Audio));
        b.add_track(track(2, 1, 1005, 1999, TrackType::Audio));

        assert!(b.build().is_err());
    }

    #[test]
    fn track_containing_resolves_lba() {
        let mut b = DiscModelBuilder::new();
        b.add_track(track(1, 1, 0, 999, TrackType::Audio));
        b.add_track(track(2, 1, 1000, 1999, TrackType::CdMode1));

        let model = b.build().unwrap();
        assert_eq!(model.track_containing(500).unwrap().sequence, 1);
        assert_eq!(model.track_containing(1500).unwrap().sequence, 2);
        assert!(model.track_containing(2000).is_none());
    }
}
