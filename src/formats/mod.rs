//! Container format backends. Each submodule implements [`crate::Image`]
//! for one on-disk format; this module only provides the shared
//! `identify`-then-`open` dispatch so callers don't need to know which
//! backend applies to a given file.

pub mod blindwrite4;
pub mod cdrwin;
pub mod clonecd;
pub mod diskcopy42;
pub mod discjuggler;
pub mod imd;

use std::path::Path;

use crate::filter::FiltersList;
use crate::{CdError, CdResult, Image};

/// Probe `path` against every backend in turn and open the first one that
/// recognises it. Backends are tried in the order they're likely to be
/// unambiguous: formats with a strong magic number or signature first,
/// CDRWin's loosely-structured text cue sheet last.
pub fn open_any(path: &Path) -> CdResult<Box<dyn Image>> {
    macro_rules! try_backend {
        ($ty:ty) => {{
            let filter = FiltersList::get(path)?;

            if <$ty>::identify(filter.as_ref()) {
                let filter = FiltersList::get(path)?;
                return Ok(Box::new(<$ty>::open(filter)?));
            }
        }};
    }

    try_backend!(blindwrite4::BlindWrite4);
    try_backend!(diskcopy42::DiskCopy42);
    try_backend!(imd::Imd);
    try_backend!(discjuggler::DiscJuggler);
    try_backend!(clonecd::CloneCd);
    try_backend!(cdrwin::CdRwin);

    Err(CdError::NotRecognized)
}
