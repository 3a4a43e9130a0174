//! Channel data model shared by the cache builder and the facade.
//!
//! A [`ChannelSnapshot`] is the one shape every lookup converges on, whether
//! it was synthesized from a live registry response or read back from the
//! snapshot cache.

use crate::level::{self, ScientificValue};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelType {
    Journal,
    Publisher,
    Series,
    SerialPublication,
}

impl ChannelType {
    pub const ALL: [ChannelType; 4] = [
        ChannelType::Journal,
        ChannelType::Publisher,
        ChannelType::Series,
        ChannelType::SerialPublication,
    ];

    /// Path segment the upstream registry addresses this type under.
    pub fn upstream_segment(self) -> &'static str {
        match self {
            ChannelType::Journal => "findjournal",
            ChannelType::Publisher => "findpublisher",
            ChannelType::Series => "findseries",
            ChannelType::SerialPublication => "findjournalserie",
        }
    }

    /// Path segment used in the facade's own URIs.
    pub fn external_segment(self) -> &'static str {
        match self {
            ChannelType::Journal => "journal",
            ChannelType::Publisher => "publisher",
            ChannelType::Series => "series",
            ChannelType::SerialPublication => "serial-publication",
        }
    }

    /// Lower-case type codes the bulk extract uses for this type.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            ChannelType::Journal => &["tidsskrift", "journal"],
            ChannelType::Publisher => &["forlag", "publisher"],
            ChannelType::Series => &["serie", "series"],
            ChannelType::SerialPublication => &["serial-publication", "serialpublication"],
        }
    }

    pub fn from_alias(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|channel_type| channel_type.aliases().contains(&normalized.as_str()))
    }

    pub fn from_external_segment(segment: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|channel_type| channel_type.external_segment() == segment)
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.external_segment())
    }
}

/// Identifiers compare case-insensitively but are always stored upper-cased.
pub fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_uppercase()
}

/// One historical quality-level observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelRecord {
    #[serde(alias = "Year")]
    pub year: i32,
    #[serde(alias = "Level", default, deserialize_with = "level_code")]
    pub level: Option<String>,
}

impl LevelRecord {
    pub fn new(year: i32, level: impl Into<String>) -> Self {
        Self {
            year,
            level: Some(level.into()),
        }
    }
}

// The registry is not consistent about quoting level codes.
fn level_code<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(code) => Some(code),
        Value::Number(code) => Some(code.to_string()),
        _ => None,
    })
}

/// Year-keyed level observations plus the record the registry marks as current.
///
/// At most one record is kept per year; inserting a year twice keeps the last one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelHistory {
    records: BTreeMap<i32, Option<String>>,
    current: Option<LevelRecord>,
}

impl LevelHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a history from raw observations. The current record is applied
    /// last so it wins over a history entry for the same year.
    pub fn from_records(
        current: Option<LevelRecord>,
        history: impl IntoIterator<Item = LevelRecord>,
    ) -> Self {
        let mut levels = Self::new();
        for record in history {
            levels.insert(record);
        }
        if let Some(record) = current {
            levels.set_current(record);
        }
        levels
    }

    pub fn insert(&mut self, record: LevelRecord) {
        self.records.insert(record.year, record.level);
    }

    pub fn set_current(&mut self, record: LevelRecord) {
        self.insert(record.clone());
        self.current = Some(record);
    }

    pub fn level_for(&self, year: i32) -> Option<&str> {
        self.records.get(&year).and_then(|level| level.as_deref())
    }

    pub fn current(&self) -> Option<&LevelRecord> {
        self.current.as_ref()
    }
}

/// Denormalized channel as served by the facade and stored in the snapshot cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSnapshot {
    pub identifier: String,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_id: Option<String>,
    pub name: String,
    pub online_issn: Option<String>,
    pub print_issn: Option<String>,
    pub isbn_prefix: Option<String>,
    pub homepage: Option<Url>,
    pub discontinued: Option<String>,
    #[serde(default)]
    pub level_history: LevelHistory,
}

impl ChannelSnapshot {
    pub fn new(channel_type: ChannelType, identifier: &str, name: impl Into<String>) -> Self {
        Self {
            identifier: normalize_identifier(identifier),
            channel_type,
            legacy_id: None,
            name: name.into(),
            online_issn: None,
            print_issn: None,
            isbn_prefix: None,
            homepage: None,
            discontinued: None,
            level_history: LevelHistory::new(),
        }
    }

    pub fn scientific_value(&self, year: Option<i32>) -> ScientificValue {
        level::resolve(&self.level_history, year)
    }
}
