//! Article records and their output encodings.

use crate::error::{Result, ScholarError};
use crate::fields::{FieldValue, AUTHORS, CITATION_COUNT, NUM_VERSIONS, TITLE, YEAR};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Ordered field mapping of one article, keyed by field name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fields(Vec<(String, FieldValue)>);

impl Fields {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse a JSON object back into an ordered mapping
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl From<Vec<(String, FieldValue)>> for Fields {
    fn from(pairs: Vec<(String, FieldValue)>) -> Self {
        Self(pairs)
    }
}

impl Serialize for Fields {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

struct FieldsVisitor;

impl<'de> Visitor<'de> for FieldsVisitor {
    type Value = Fields;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of field names to values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Fields, A::Error> {
        let mut pairs = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((name, value)) = access.next_entry::<String, FieldValue>()? {
            pairs.push((name, value));
        }
        Ok(Fields(pairs))
    }
}

impl<'de> Deserialize<'de> for Fields {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(FieldsVisitor)
    }
}

/// Output encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Pretty JSON, keys in field set order
    Json,
    /// MessagePack bytes
    Binary,
    /// The in-memory field mapping itself
    Mapping,
    /// CSV with a header row
    Csv,
}

impl FromStr for Format {
    type Err = ScholarError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "binary" | "msgpack" | "pickle" => Ok(Self::Binary),
            "mapping" | "dict" => Ok(Self::Mapping),
            "csv" => Ok(Self::Csv),
            other => Err(ScholarError::Config(format!(
                "unknown output format '{}' (expected json, binary, mapping or csv)",
                other
            ))),
        }
    }
}

/// Rendered output
#[derive(Debug, Clone, PartialEq)]
pub enum Dump {
    Text(String),
    Bytes(Vec<u8>),
    Mapping(Fields),
    Mappings(Vec<Fields>),
}

impl Dump {
    /// Bytes suitable for writing to a file or stdout
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(text) => text.into_bytes(),
            Self::Bytes(bytes) => bytes,
            Self::Mapping(fields) => format!("{:#?}\n", fields).into_bytes(),
            Self::Mappings(all) => format!("{:#?}\n", all).into_bytes(),
        }
    }
}

/// One bibliographic record. Immutable once built by a field set.
#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    fields: Fields,
    source_field_set_version: String,
}

impl Article {
    pub(crate) fn new(fields: Vec<(String, FieldValue)>, version: &str) -> Self {
        Self {
            fields: Fields(fields),
            source_field_set_version: version.to_string(),
        }
    }

    /// Rebuild an article from its JSON rendering
    pub fn from_json(json: &str, version: &str) -> Result<Self> {
        Ok(Self {
            fields: Fields::from_json(json)?,
            source_field_set_version: version.to_string(),
        })
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Identifier of the field set that produced this article
    pub fn version(&self) -> &str {
        &self.source_field_set_version
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn title(&self) -> Option<&str> {
        self.get(TITLE).and_then(FieldValue::as_text)
    }

    pub fn authors(&self) -> Option<&[String]> {
        self.get(AUTHORS).and_then(FieldValue::as_list)
    }

    pub fn year(&self) -> Option<i64> {
        self.get(YEAR).and_then(FieldValue::as_int)
    }

    pub fn citation_count(&self) -> Option<i64> {
        self.get(CITATION_COUNT).and_then(FieldValue::as_int)
    }

    pub fn num_versions(&self) -> Option<i64> {
        self.get(NUM_VERSIONS).and_then(FieldValue::as_int)
    }

    /// Render this article in `format`.
    pub fn dumps(&self, format: Format) -> Result<Dump> {
        match format {
            Format::Json => Ok(Dump::Text(serde_json::to_string_pretty(&self.fields)?)),
            Format::Binary => encode_binary(&self.fields).map(Dump::Bytes),
            Format::Mapping => Ok(Dump::Mapping(self.fields.clone())),
            Format::Csv => encode_csv(std::slice::from_ref(self)).map(Dump::Text),
        }
    }
}

impl Serialize for Article {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

/// Render a whole result sequence in `format`.
///
/// The articles may come from different field sets; CSV output then uses
/// the union of their field names as columns.
pub fn dumps_all(articles: &[Article], format: Format) -> Result<Dump> {
    match format {
        Format::Json => Ok(Dump::Text(serde_json::to_string_pretty(articles)?)),
        Format::Binary => encode_binary(articles).map(Dump::Bytes),
        Format::Mapping => Ok(Dump::Mappings(
            articles.iter().map(|a| a.fields.clone()).collect(),
        )),
        Format::Csv => encode_csv(articles).map(Dump::Text),
    }
}

fn encode_binary<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    rmp_serde::to_vec(value).map_err(|e| ScholarError::Encode(e.to_string()))
}

/// One header row, one row per article. Articles from different field sets
/// share the header: columns are the union of their field names in
/// first-seen order, and a field an article lacks is an empty cell.
fn encode_csv(articles: &[Article]) -> Result<String> {
    if articles.is_empty() {
        return Ok(String::new());
    }

    let mut header: Vec<&str> = Vec::new();
    for name in articles.iter().flat_map(|a| a.fields.names()) {
        if !header.contains(&name) {
            header.push(name);
        }
    }

    let mut wtr = csv::Writer::from_writer(Vec::new());
    let encode_err = |e: csv::Error| ScholarError::Encode(e.to_string());

    wtr.write_record(&header).map_err(encode_err)?;
    for article in articles {
        let row = header.iter().map(|name| {
            article
                .fields
                .get(name)
                .map(FieldValue::to_string)
                .unwrap_or_default()
        });
        wtr.write_record(row).map_err(encode_err)?;
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| ScholarError::Encode(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ScholarError::Encode(e.to_string()))
}
