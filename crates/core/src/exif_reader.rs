use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use exif::{In, Reader};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

const DATE_TAGS: &[&str] = &["DateTimeOriginal", "DateTimeDigitized", "DateTime"];

/// Embedded image tags of one file, keyed by tag name (`Make`, `LensModel`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExifData {
    fields: BTreeMap<String, String>,
    date_time: Option<DateTime<Local>>,
}

impl ExifData {
    pub fn from_fields(fields: BTreeMap<String, String>) -> Self {
        let date_time = DATE_TAGS
            .iter()
            .filter_map(|name| fields.get(*name))
            .find_map(|raw| parse_date(raw));
        Self { fields, date_time }
    }

    /// Capture time, preferring `DateTimeOriginal` over the digitized and file times.
    pub fn date_time(&self) -> Option<DateTime<Local>> {
        self.date_time
    }

    pub fn tag(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Reads EXIF tags from `path`. Anything that is not a decodable image yields `None`.
pub fn read_exif_data(path: &Path) -> Option<ExifData> {
    match decode(path) {
        Ok(data) => Some(data),
        Err(err) => {
            debug!("no exif data for {}: {err:#}", path.display());
            None
        }
    }
}

fn decode(path: &Path) -> Result<ExifData> {
    let file = File::open(path)
        .with_context(|| format!("cannot open for exif read: {}", path.display()))?;
    let mut buf = BufReader::new(file);
    let exif = Reader::new()
        .read_from_container(&mut buf)
        .with_context(|| format!("cannot decode exif: {}", path.display()))?;

    let mut fields = BTreeMap::new();
    // primary image first so thumbnail tags never shadow it
    let primary = exif.fields().filter(|f| f.ifd_num == In::PRIMARY);
    let rest = exif.fields().filter(|f| f.ifd_num != In::PRIMARY);
    for field in primary.chain(rest) {
        // Display yields the registered name (`DateTimeOriginal`), Debug only the raw number
        let name = field.tag.to_string();
        let value = field.display_value().with_unit(&exif).to_string();
        if let Some(value) = normalize(&value) {
            fields.entry(name).or_insert(value);
        }
    }

    Ok(ExifData::from_fields(fields))
}

fn normalize(value: &str) -> Option<String> {
    let trimmed = value.trim().trim_matches('"').trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_date(input: &str) -> Option<DateTime<Local>> {
    let normalized = input.trim();

    let candidates = [
        "%Y:%m:%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%:z",
        "%Y-%m-%dT%H:%M:%S%.f%:z",
    ];

    for fmt in candidates {
        if let Ok(dt) = DateTime::parse_from_str(normalized, fmt) {
            return Some(dt.with_timezone(&Local));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(normalized, fmt) {
            if let Some(local) = Local.from_local_datetime(&naive).single() {
                return Some(local);
            }
        }
    }

    None
}

/// Writes a minimal TIFF carrying `DateTimeOriginal` and `Make` to `path`.
#[cfg(test)]
pub(crate) fn write_sample_tiff(path: &Path, taken: &str, make: &str) {
    use exif::experimental::Writer;
    use exif::{Field, Tag, Value};
    use std::io::Cursor;

    let date = Field {
        tag: Tag::DateTimeOriginal,
        ifd_num: In::PRIMARY,
        value: Value::Ascii(vec![taken.as_bytes().to_vec()]),
    };
    let maker = Field {
        tag: Tag::Make,
        ifd_num: In::PRIMARY,
        value: Value::Ascii(vec![make.as_bytes().to_vec()]),
    };
    let mut writer = Writer::new();
    writer.push_field(&date);
    writer.push_field(&maker);
    let mut buf = Cursor::new(Vec::new());
    writer.write(&mut buf, false).expect("encode tiff");
    std::fs::write(path, buf.into_inner()).expect("write tiff");
}
