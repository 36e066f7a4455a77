use crate::exif_reader::{read_exif_data, ExifData};
use crate::paths::{absolutize, split_parts};
use chrono::{DateTime, Local, TimeZone};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("cannot resolve {path:?} to an absolute path: {reason}")]
    PathResolution { path: String, reason: String },
    #[error("cannot stat {}: {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot read timestamps of {}: {reason}", path.display())]
    Timestamp { path: PathBuf, reason: String },
}

/// Returns the process working directory, the base every relative input path resolves against.
pub fn current_working_dir() -> Result<PathBuf, MetadataError> {
    env::current_dir().map_err(|err| MetadataError::PathResolution {
        path: ".".to_string(),
        reason: err.to_string(),
    })
}

/// Everything a path template can see about one input file.
///
/// Path parts are split once at construction. `stat`, `timestamps` and `exif_data` hit the
/// filesystem on every call and are never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContext {
    index: usize,
    raw: String,
    absolute: PathBuf,
    abs: String,
    dir: String,
    base: String,
    ext: String,
    base_name: String,
}

impl FileContext {
    /// Builds the context for `raw`, resolving relative paths against the process working
    /// directory.
    pub fn for_path(index: usize, raw: &str) -> Result<Self, MetadataError> {
        let working_dir = current_working_dir()?;
        Self::resolve(index, raw, &working_dir)
    }

    pub fn resolve(index: usize, raw: &str, working_dir: &Path) -> Result<Self, MetadataError> {
        if raw.is_empty() {
            return Err(MetadataError::PathResolution {
                path: raw.to_string(),
                reason: "empty path".to_string(),
            });
        }

        let absolute = absolutize(Path::new(raw), working_dir);
        let abs = absolute
            .to_str()
            .ok_or_else(|| MetadataError::PathResolution {
                path: raw.to_string(),
                reason: format!("{} is not valid UTF-8", absolute.display()),
            })?
            .to_string();
        let parts = split_parts(&absolute);

        Ok(Self {
            index,
            raw: raw.to_string(),
            absolute,
            abs,
            dir: parts.dir,
            base: parts.base,
            ext: parts.ext,
            base_name: parts.base_name,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn absolute_path(&self) -> &Path {
        &self.absolute
    }

    pub fn abs(&self) -> &str {
        &self.abs
    }

    pub fn dir(&self) -> &str {
        &self.dir
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn ext(&self) -> &str {
        &self.ext
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn stat(&self) -> Result<StatInfo, MetadataError> {
        let meta = fs::metadata(&self.absolute).map_err(|source| MetadataError::Stat {
            path: self.absolute.clone(),
            source,
        })?;
        let mod_time = meta.modified().map_err(|source| MetadataError::Stat {
            path: self.absolute.clone(),
            source,
        })?;

        Ok(StatInfo {
            name: self.base.clone(),
            size: meta.len(),
            mode: mode_bits(&meta),
            is_dir: meta.is_dir(),
            mod_time: DateTime::<Local>::from(mod_time),
        })
    }

    pub fn timestamps(&self) -> Result<TimestampInfo, MetadataError> {
        let timestamp_err = |err: io::Error| MetadataError::Timestamp {
            path: self.absolute.clone(),
            reason: err.to_string(),
        };
        let meta = fs::metadata(&self.absolute).map_err(timestamp_err)?;
        let mod_time = meta.modified().map_err(timestamp_err)?;
        let access_time = meta.accessed().map_err(timestamp_err)?;

        Ok(TimestampInfo {
            mod_time: mod_time.into(),
            access_time: access_time.into(),
            change_time: change_time(&meta),
            birth_time: meta.created().ok().map(Into::into),
        })
    }

    /// Embedded image metadata, or `None` for files without decodable EXIF.
    pub fn exif_data(&self) -> Option<ExifData> {
        read_exif_data(&self.absolute)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatInfo {
    pub name: String,
    pub size: u64,
    pub mode: u32,
    pub is_dir: bool,
    pub mod_time: DateTime<Local>,
}

impl StatInfo {
    /// `ls -l` style rendering of the type and permission bits, e.g. `-rw-r--r--`.
    pub fn mode_string(&self) -> String {
        let mut out = String::with_capacity(10);
        out.push(if self.is_dir { 'd' } else { '-' });
        for shift in [6u32, 3, 0] {
            let bits = (self.mode >> shift) & 0o7;
            out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
            out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
            out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
        }
        out
    }
}

/// File times. Change and birth times are absent on platforms that do not record them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampInfo {
    pub mod_time: DateTime<Local>,
    pub access_time: DateTime<Local>,
    pub change_time: Option<DateTime<Local>>,
    pub birth_time: Option<DateTime<Local>>,
}

#[cfg(unix)]
fn mode_bits(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn mode_bits(meta: &fs::Metadata) -> u32 {
    if meta.permissions().readonly() {
        0o444
    } else {
        0o666
    }
}

#[cfg(unix)]
fn change_time(meta: &fs::Metadata) -> Option<DateTime<Local>> {
    use std::os::unix::fs::MetadataExt;
    let nanos = u32::try_from(meta.ctime_nsec()).ok()?;
    Local.timestamp_opt(meta.ctime(), nanos).single()
}

#[cfg(not(unix))]
fn change_time(_meta: &fs::Metadata) -> Option<DateTime<Local>> {
    None
}
