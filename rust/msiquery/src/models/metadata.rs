use serde::{
    Deserialize,
    Serialize,
};

use crate::errors::{
    MsiQueryError,
    Result,
};

pub const MAX_PIXELS_X_KEY: &str = "max count of pixels x";
pub const MAX_PIXELS_Y_KEY: &str = "max count of pixels y";

/// Key/value metadata supplied by the file reader.
///
/// Insertion order is kept for CSV export. JSON round trips go through a
/// `serde_json::Map`, which orders keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Map<String, serde_json::Value>")]
#[serde(into = "serde_json::Map<String, serde_json::Value>")]
pub struct Metadata {
    entries: Vec<(String, String)>,
}

/// Declared raster size of the acquisition, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelExtents {
    pub width: usize,
    pub height: usize,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Replaces the value of an existing key, or appends a new entry.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reads `max count of pixels x/y`.
    ///
    /// Both keys must be present and parse as non-negative integers.
    /// Values such as `"120.0"` are accepted as long as they are whole.
    pub fn pixel_extents(&self) -> Result<PixelExtents> {
        let (Some(width), Some(height)) = (self.get(MAX_PIXELS_X_KEY), self.get(MAX_PIXELS_Y_KEY))
        else {
            return Err(MsiQueryError::MissingPixelExtents);
        };
        Ok(PixelExtents {
            width: parse_extent(MAX_PIXELS_X_KEY, width)?,
            height: parse_extent(MAX_PIXELS_Y_KEY, height)?,
        })
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn parse_extent(key: &'static str, value: &str) -> Result<usize> {
    let value = value.trim();
    if let Ok(v) = value.parse::<usize>() {
        return Ok(v);
    }
    match value.parse::<f64>() {
        Ok(v) if v >= 0.0 && v.fract() == 0.0 && v <= u32::MAX as f64 => Ok(v as usize),
        _ => Err(MsiQueryError::invalid(
            key,
            value,
            "pixel extents must be non-negative integers",
        )),
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for Metadata {
    fn from(value: serde_json::Map<String, serde_json::Value>) -> Self {
        let entries = value
            .into_iter()
            .map(|(k, v)| {
                let v = match v {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                };
                (k, v)
            })
            .collect();
        Self { entries }
    }
}

impl From<Metadata> for serde_json::Map<String, serde_json::Value> {
    fn from(value: Metadata) -> Self {
        value
            .entries
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut out = Metadata::new();
        for (k, v) in iter {
            out.insert(k, v);
        }
        out
    }
}
