//! BioSample JSON input.
//!
//! Records look like
//! `{ "accession": "SAMN...", "characteristics": { "tissue": [ { "text": "liver" } ] } }`.
//! Only the first `text` of each characteristic is used.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::error::{MapperError, Result};

/// One sample: an optional identifier and its flattened attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub accession: Option<String>,
    /// Key/value pairs in record order
    pub attributes: Vec<(String, String)>,
}

impl Sample {
    pub fn new<K, V>(accession: Option<&str>, attributes: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            accession: accession.map(str::to_string),
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BioSampleRecord {
    #[serde(default)]
    accession: Option<String>,
    #[serde(default)]
    characteristics: serde_json::Map<String, Value>,
}

impl From<BioSampleRecord> for Sample {
    fn from(record: BioSampleRecord) -> Self {
        let mut attributes = Vec::with_capacity(record.characteristics.len());
        for (key, entries) in record.characteristics {
            match first_text(&entries) {
                Some(text) => attributes.push((key, text.to_string())),
                None => tracing::debug!(
                    accession = ?record.accession,
                    key = %key,
                    "characteristic has no string text, dropped"
                ),
            }
        }
        Sample {
            accession: record.accession,
            attributes,
        }
    }
}

fn first_text(entries: &Value) -> Option<&str> {
    entries.as_array()?.first()?.get("text")?.as_str()
}

/// Parse a BioSample JSON array
pub fn parse_biosamples(json: &str) -> Result<Vec<Sample>> {
    let records: Vec<BioSampleRecord> = serde_json::from_str(json)?;
    Ok(records.into_iter().map(Sample::from).collect())
}

/// Read and parse a BioSample JSON file
pub fn load_biosamples(path: &Path) -> Result<Vec<Sample>> {
    let content = std::fs::read_to_string(path).map_err(MapperError::Io)?;
    let samples = parse_biosamples(&content)?;
    tracing::info!(path = %path.display(), samples = samples.len(), "parsed BioSample JSON");
    Ok(samples)
}
