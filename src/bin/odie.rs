//! Command-line front end for the optical disc image engine: a thin
//! `clap`-derived shell over the [`Image`] trait. Owns argument parsing,
//! progress logging and the `ErrorNumber` exit-code mapping; no domain
//! logic lives here.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{debug, info, warn};

use odie::formats;
use odie::verify::Verdict;
use odie::{CdError, Image};

/// Process exit codes. Mirrors how the core's error kinds and
/// verification tri-states resolve to a single number a shell script can
/// branch on.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorNumber {
    NoError = 0,
    HelpRequested = 1,
    MissingArgument = 2,
    UnexpectedArgumentCount = 3,
    CannotOpenFile = 4,
    UnrecognizedFormat = 5,
    FormatNotFound = 6,
    NotVerificable = 7,
    BadSectorsImageNotVerified = 8,
    CorrectSectorsImageNotVerified = 9,
    BadImageSectorsNotVerified = 10,
    BadImageBadSectors = 11,
    CorrectSectorsBadImage = 12,
    CorrectImageSectorsNotVerified = 13,
    CorrectImageBadSectors = 14,
    NotYetImplemented = 15,
}

impl From<ErrorNumber> for ExitCode {
    fn from(e: ErrorNumber) -> ExitCode {
        ExitCode::from(e as u8)
    }
}

/// Translate an open/read failure to its exit code, per §7's error kinds.
fn map_open_error(err: &CdError) -> ErrorNumber {
    match err {
        CdError::NotRecognized => ErrorNumber::UnrecognizedFormat,
        CdError::IoError(_) => ErrorNumber::CannotOpenFile,
        _ => ErrorNumber::FormatNotFound,
    }
}

#[derive(Parser, Debug)]
#[command(name = "odie", author, version, about = "Optical disc image inspection tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dump one or more sectors' user data to stdout.
    Decode {
        /// Path to the disc image descriptor (.ccd/.cdi/.cue/.b5t/.image/.imd).
        image: PathBuf,
        /// First LBA to read.
        #[arg(long, default_value_t = 0)]
        lba: i64,
        /// Number of sectors to read.
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
    /// Verify an image's whole-image digest and per-sector EDC/ECC.
    Verify {
        /// Path to the disc image descriptor.
        image: PathBuf,
    },
    /// Write an image back to physical media. Not implemented: this
    /// crate only inspects disc images, it doesn't drive an optical
    /// drive.
    Dump {
        image: PathBuf,
    },
}

fn open_image(path: &PathBuf) -> Result<Box<dyn Image>, ErrorNumber> {
    debug!("probing backends for {}", path.display());

    formats::open_any(path).map_err(|e| {
        warn!("failed to open {}: {e}", path.display());
        map_open_error(&e)
    })
}

fn run_decode(image: PathBuf, lba: i64, count: u32) -> ErrorNumber {
    let mut img = match open_image(&image) {
        Ok(img) => img,
        Err(code) => return code,
    };

    info!("decoding {count} sector(s) from {} starting at LBA {lba}", img.image_format());

    match img.read_sectors(lba, count, None) {
        Ok(data) => {
            use std::io::Write;
            if std::io::stdout().write_all(&data).is_err() {
                warn!("failed to write decoded sectors to stdout");
                return ErrorNumber::CannotOpenFile;
            }
            ErrorNumber::NoError
        }
        Err(e) => {
            warn!("decode failed: {e}");
            ErrorNumber::FormatNotFound
        }
    }
}

/// Combine the whole-image digest verdict with the aggregated per-sector
/// EDC/ECC verdict into one of the nine terminal exit codes §6 lists.
fn combine_verdicts(image_ok: Option<bool>, sectors: Verdict) -> ErrorNumber {
    match (image_ok, sectors) {
        (None, Verdict::Unknown) => ErrorNumber::NotVerificable,
        (None, Verdict::Bad) => ErrorNumber::BadSectorsImageNotVerified,
        (None, Verdict::Good) => ErrorNumber::CorrectSectorsImageNotVerified,
        (Some(false), Verdict::Unknown) => ErrorNumber::BadImageSectorsNotVerified,
        (Some(false), Verdict::Bad) => ErrorNumber::BadImageBadSectors,
        (Some(false), Verdict::Good) => ErrorNumber::CorrectSectorsBadImage,
        (Some(true), Verdict::Unknown) => ErrorNumber::CorrectImageSectorsNotVerified,
        (Some(true), Verdict::Bad) => ErrorNumber::CorrectImageBadSectors,
        (Some(true), Verdict::Good) => ErrorNumber::NoError,
    }
}

fn run_verify(image: PathBuf) -> ErrorNumber {
    let mut img = match open_image(&image) {
        Ok(img) => img,
        Err(code) => return code,
    };

    info!("verifying {}", img.image_format());

    let image_ok = match img.verify_media_image() {
        Ok(verdict) => verdict,
        Err(e) => {
            warn!("whole-image verification failed: {e}");
            None
        }
    };

    let mut sectors = Verdict::Unknown;

    'tracks: for track in img.model().tracks().to_vec() {
        for lba in track.start_lba..=track.end_lba {
            match img.verify_sector(lba, None) {
                Ok(Verdict::Bad) => {
                    sectors = Verdict::Bad;
                    break 'tracks;
                }
                Ok(Verdict::Good) if sectors == Verdict::Unknown => {
                    sectors = Verdict::Good;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("sector {lba} verification errored: {e}");
                }
            }
        }
    }

    debug!("image verdict {image_ok:?}, sector verdict {sectors:?}");
    combine_verdicts(image_ok, sectors)
}

fn run_dump(_image: PathBuf) -> ErrorNumber {
    warn!("{}", CdError::NotYetImplemented("physical dump".to_string()));
    ErrorNumber::NotYetImplemented
}

/// Map a `clap` parse failure to its `ErrorNumber`, so the CLI's own exit
/// codes stay meaningful even when the failure happens before any `Image`
/// is opened.
fn map_clap_error(e: &clap::Error) -> ErrorNumber {
    use clap::error::ErrorKind;

    match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ErrorNumber::HelpRequested,
        ErrorKind::MissingRequiredArgument => ErrorNumber::MissingArgument,
        ErrorKind::WrongNumberOfValues | ErrorKind::TooManyValues | ErrorKind::TooFewValues => {
            ErrorNumber::UnexpectedArgumentCount
        }
        _ => ErrorNumber::MissingArgument,
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return map_clap_error(&e).into();
        }
    };

    let code = match cli.command {
        Command::Decode { image, lba, count } => run_decode(image, lba, count),
        Command::Verify { image } => run_verify(image),
        Command::Dump { image } => run_dump(image),
    };

    code.into()
}
