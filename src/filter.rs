//! Filter abstraction: the seekable byte stream a container parser reads
//! from, decoupled from whatever compression or archive wrapper the file
//! on disk happens to be under. Parsers never call `std::fs` directly;
//! they're handed a `Filter` by [`FiltersList::get`].

use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::{CdError, CdResult};

/// Blanket requirement for a filter's underlying byte stream.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// A named, seekable byte stream, plus the handful of filesystem-ish
/// metadata a container parser occasionally needs (DiskCopy 4.2's
/// resource fork, CD-Text file naming heuristics...).
pub trait Filter {
    /// File name (no directory component), as the container parser would
    /// have seen it on disk.
    fn filename(&self) -> &str;

    /// Directory the image was opened from; sibling files (`.bin`, `.sub`,
    /// `.img`) referenced by a descriptor are resolved against this.
    fn base_path(&self) -> &Path;

    /// Length, in bytes, of the data fork.
    fn length(&self) -> u64;

    /// Creation time, if the underlying storage exposes one.
    fn creation_time(&self) -> Option<SystemTime>;

    /// Last write time, if the underlying storage exposes one.
    fn last_write_time(&self) -> Option<SystemTime>;

    /// The main (decompressed, if applicable) byte stream.
    fn data_fork_stream(&mut self) -> &mut dyn ReadSeek;

    /// The resource fork, for formats that carry one (only DiskCopy 4.2
    /// in this crate). Absent by default.
    fn resource_fork_stream(&mut self) -> CdResult<&mut dyn ReadSeek> {
        Err(CdError::NotPresent)
    }
}

/// A filter backed directly by an on-disk file, no decompression.
pub struct PlainFilter {
    path: PathBuf,
    file: File,
    length: u64,
    created: Option<SystemTime>,
    modified: Option<SystemTime>,
}

impl Filter for PlainFilter {
    fn filename(&self) -> &str {
        self.path.file_name().and_then(|n| n.to_str()).unwrap_or("")
    }

    fn base_path(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn creation_time(&self) -> Option<SystemTime> {
        self.created
    }

    fn last_write_time(&self) -> Option<SystemTime> {
        self.modified
    }

    fn data_fork_stream(&mut self) -> &mut dyn ReadSeek {
        &mut self.file
    }
}

/// A filter whose data fork was fully decompressed into memory (gzip,
/// bzip2, xz, or the first entry of a zip archive).
pub struct MemoryFilter {
    path: PathBuf,
    cursor: Cursor<Vec<u8>>,
    created: Option<SystemTime>,
    modified: Option<SystemTime>,
}

impl Filter for MemoryFilter {
    fn filename(&self) -> &str {
        self.path.file_name().and_then(|n| n.to_str()).unwrap_or("")
    }

    fn base_path(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    fn length(&self) -> u64 {
        self.cursor.get_ref().len() as u64
    }

    fn creation_time(&self) -> Option<SystemTime> {
        self.created
    }

    fn last_write_time(&self) -> Option<SystemTime> {
        self.modified
    }

    fn data_fork_stream(&mut self) -> &mut dyn ReadSeek {
        &mut self.cursor
    }
}

/// Compression/archive wrapper recognised by magic-number sniffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wrapper {
    None,
    Gzip,
    Bzip2,
    Xz,
    Lzip,
    Zip,
}

fn sniff(header: &[u8]) -> Wrapper {
    if header.starts_with(&[0x1f, 0x8b]) {
        Wrapper::Gzip
    } else if header.starts_with(b"BZh") {
        Wrapper::Bzip2
    } else if header.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
        Wrapper::Xz
    } else if header.starts_with(b"LZIP") {
        Wrapper::Lzip
    } else if header.starts_with(&[0x50, 0x4b, 0x03, 0x04]) {
        Wrapper::Zip
    } else {
        Wrapper::None
    }
}

/// Opens files on disk and transparently unwraps any compression or
/// archive layer before handing a [`Filter`] to the container parsers.
pub struct FiltersList;

impl FiltersList {
    /// Open `path`, probing for a recognised compression/archive wrapper.
    /// Plain files are opened directly with no extra allocation; wrapped
    /// files are fully decompressed into memory.
    pub fn get(path: &Path) -> CdResult<Box<dyn Filter>> {
        let mut file = File::open(path)?;
        let meta = file.metadata()?;

        let mut header = [0u8; 6];
        let n = file.read(&mut header)?;
        file.rewind()?;

        let wrapper = sniff(&header[..n]);

        let created = meta.created().ok();
        let modified = meta.modified().ok();

        match wrapper {
            Wrapper::None => Ok(Box::new(PlainFilter {
                path: path.to_path_buf(),
                length: meta.len(),
                file,
                created,
                modified,
            })),
            Wrapper::Gzip => {
                let mut buf = Vec::new();
                flate2::read::GzDecoder::new(file).read_to_end(&mut buf)?;

                Ok(Box::new(MemoryFilter { path: path.to_path_buf(), cursor: Cursor::new(buf), created, modified }))
            }
            Wrapper::Bzip2 => {
                let mut buf = Vec::new();
                bzip2::read::BzDecoder::new(file).read_to_end(&mut buf)?;

                Ok(Box::new(MemoryFilter { path: path.to_path_buf(), cursor: Cursor::new(buf), created, modified }))
            }
            Wrapper::Xz => {
                let mut buf = Vec::new();
                xz2::read::XzDecoder::new(file).read_to_end(&mut buf)?;

                Ok(Box::new(MemoryFilter { path: path.to_path_buf(), cursor: Cursor::new(buf), created, modified }))
            }
            Wrapper::Lzip => Err(CdError::NotYetImplemented("lzip decompression".to_string())),
            Wrapper::Zip => {
                let mut archive = zip::ZipArchive::new(file)?;

                if archive.is_empty() {
                    return Err(CdError::BadImage {
                        path: path.to_path_buf(),
                        desc: "Empty zip archive".to_string(),
                    });
                }

                let mut buf = Vec::new();
                archive.by_index(0)?.read_to_end(&mut buf)?;

                Ok(Box::new(MemoryFilter { path: path.to_path_buf(), cursor: Cursor::new(buf), created, modified }))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sniffs_known_magic_numbers() {
        assert_eq!(sniff(&[0x1f, 0x8b, 0x08]), Wrapper::Gzip);
        assert_eq!(sniff(b"BZh9"), Wrapper::Bzip2);
        assert_eq!(sniff(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]), Wrapper::Xz);
        assert_eq!(sniff(b"LZIP"), Wrapper::Lzip);
        assert_eq!(sniff(&[0x50, 0x4b, 0x03, 0x04]), Wrapper::Zip);
        assert_eq!(sniff(b"plain!"), Wrapper::None);
    }

    #[test]
    fn opens_a_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disc.bin");
        std::fs::write(&path, b"some raw sector bytes").unwrap();

        let mut filter = FiltersList::get(&path).unwrap();
        assert_eq!(filter.filename(), "disc.bin");
        assert_eq!(filter.length(), 21);

        let mut buf = Vec::new();
        filter.data_fork_stream().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"some raw sector bytes");
    }
}
