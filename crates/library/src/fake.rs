use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use common::system_time_millis;
use metadata::{tag_names, MetadataError, RawTags, TagReader};

/// Test reader: files are JSON objects of tag values instead of real audio,
/// so sync tests exercise the whole pipeline without fixture media. String
/// values map to tags verbatim; `duration` (seconds) feeds the audio
/// properties; arrays become multi-valued tags. Unparseable content fails
/// that file only.
pub struct JsonReader;

impl TagReader for JsonReader {
    fn name(&self) -> &'static str {
        "json"
    }

    fn read_batch(&self, paths: &[PathBuf]) -> Vec<(PathBuf, Result<RawTags, MetadataError>)> {
        paths
            .iter()
            .map(|path| (path.clone(), parse_file(path)))
            .collect()
    }
}

fn parse_file(path: &PathBuf) -> Result<RawTags, MetadataError> {
    let meta = fs::metadata(path)?;
    let mut raw = RawTags {
        size: meta.len(),
        ..RawTags::default()
    };
    raw.modified = meta.modified().map(system_time_millis).unwrap_or(0);
    raw.birth = raw.modified;

    let contents = fs::read_to_string(path)?;
    let data: serde_json::Value = serde_json::from_str(&contents).map_err(|err| {
        MetadataError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    })?;
    let Some(object) = data.as_object() else {
        return Err(MetadataError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "expected a tag object",
        )));
    };

    for (name, value) in object {
        match value {
            serde_json::Value::String(text) => raw.push(name, text.clone()),
            serde_json::Value::Number(number) => {
                if name == "duration" {
                    raw.props.duration_ms = (number.as_f64().unwrap_or(0.0) * 1000.0) as u32;
                } else {
                    raw.push(name, number.to_string());
                }
            }
            serde_json::Value::Array(values) => {
                for entry in values {
                    if let Some(text) = entry.as_str() {
                        raw.push(name, text.to_string());
                    }
                }
            }
            _ => {}
        }
    }
    if raw.props.duration_ms == 0 {
        raw.props.duration_ms = 120_000;
    }
    Ok(raw)
}

/// Reader that stalls longer than any reasonable batch deadline; used to test
/// the per-batch timeout.
pub struct StalledReader(pub Duration);

impl TagReader for StalledReader {
    fn name(&self) -> &'static str {
        "stalled"
    }

    fn read_batch(&self, paths: &[PathBuf]) -> Vec<(PathBuf, Result<RawTags, MetadataError>)> {
        std::thread::sleep(self.0);
        paths
            .iter()
            .map(|path| (path.clone(), Ok(RawTags::default())))
            .collect()
    }
}

/// Convenience for building test file contents.
pub fn track_json(title: &str, artist: &str, album: &str, track: u16) -> String {
    format!(
        r#"{{"{title_key}": "{title}", "{artist_key}": "{artist}", "{album_key}": "{album}", "{track_key}": "{track}", "duration": 200}}"#,
        title_key = tag_names::TITLE,
        artist_key = tag_names::ARTIST,
        album_key = tag_names::ALBUM,
        track_key = tag_names::TRACK,
    )
}
