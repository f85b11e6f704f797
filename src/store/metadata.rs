//! Per-media metadata record.
//!
//! On disk the record is a text file of `key\tvalue\ttype` lines, where
//! `type` is one of `str`, `int` or `float`. Tabs, newlines and backslashes
//! inside string values are backslash-escaped.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::error::StoreError;

// =============================================================================
// Values
// =============================================================================

/// A typed metadata value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetaValue {
    Str(String),
    Int(i64),
    Float(f64),
}

impl MetaValue {
    fn type_name(&self) -> &'static str {
        match self {
            MetaValue::Str(_) => "str",
            MetaValue::Int(_) => "int",
            MetaValue::Float(_) => "float",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            MetaValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            MetaValue::Float(f) => Some(*f),
            MetaValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Str(s) => f.write_str(s),
            MetaValue::Int(i) => write!(f, "{}", i),
            MetaValue::Float(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Str(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Str(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Int(value)
    }
}

impl From<u32> for MetaValue {
    fn from(value: u32) -> Self {
        MetaValue::Int(i64::from(value))
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        MetaValue::Float(value)
    }
}

// =============================================================================
// Record
// =============================================================================

/// Key/value record stored next to a media's tiles.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Metadata {
    fields: BTreeMap<String, MetaValue>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetaValue>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.fields.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetaValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Decode the on-disk text form. `path` is only used for error messages.
    pub fn parse(path: &Path, text: &str) -> Result<Self, StoreError> {
        let mut metadata = Self::new();

        for (index, line) in text.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            let invalid = |reason: &str| StoreError::Metadata {
                path: path.to_path_buf(),
                line: index + 1,
                reason: reason.to_string(),
            };

            let mut parts = line.split('\t');
            let (Some(key), Some(raw), Some(kind), None) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                return Err(invalid("expected key, value and type separated by tabs"));
            };

            let value = match kind {
                "str" => MetaValue::Str(unescape(raw)),
                "int" => MetaValue::Int(raw.parse().map_err(|_| invalid("invalid integer"))?),
                "float" => MetaValue::Float(raw.parse().map_err(|_| invalid("invalid float"))?),
                _ => return Err(invalid("unknown value type")),
            };
            metadata.fields.insert(unescape(key), value);
        }

        Ok(metadata)
    }

    /// Encode to the on-disk text form.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.fields {
            let raw = match value {
                MetaValue::Str(s) => escape(s),
                other => other.to_string(),
            };
            out.push_str(&escape(key));
            out.push('\t');
            out.push_str(&raw);
            out.push('\t');
            out.push_str(value.type_name());
            out.push('\n');
        }
        out
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

// =============================================================================
// Pyramid Record
// =============================================================================

/// The record committed once a pyramid is complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PyramidMetadata {
    /// Extension (and so encoding) of the tile files
    pub filext: String,

    /// Edge length of a full tile in pixels
    pub tilesize: u32,

    /// Finest level index
    pub maxtilelevel: u32,

    /// Source width in pixels
    pub width: u32,

    /// Source height in pixels
    pub height: u32,
}

impl PyramidMetadata {
    pub fn to_metadata(&self) -> Metadata {
        Metadata::new()
            .with("filext", self.filext.as_str())
            .with("tilesize", self.tilesize)
            .with("maxtilelevel", self.maxtilelevel)
            .with("width", self.width)
            .with("height", self.height)
    }

    /// Extract the pyramid fields, or `None` if any is missing or mistyped.
    pub fn from_metadata(metadata: &Metadata) -> Option<Self> {
        let int = |key: &str| {
            metadata
                .get(key)
                .and_then(MetaValue::as_int)
                .and_then(|v| u32::try_from(v).ok())
        };

        Some(Self {
            filext: metadata.get("filext")?.as_str()?.to_string(),
            tilesize: int("tilesize")?,
            maxtilelevel: int("maxtilelevel")?,
            width: int("width")?,
            height: int("height")?,
        })
    }
}
