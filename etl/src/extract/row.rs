use common::channel::{ChannelSnapshot, ChannelType, LevelHistory, LevelRecord};
use serde::Deserialize;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Why a single extract row was not accepted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("malformed row: {0}")]
    Malformed(String),

    #[error("missing required column value: {0}")]
    MissingField(&'static str),

    #[error("unknown channel type '{0}'")]
    UnknownType(String),

    #[error("identifier '{0}' is not a UUID")]
    InvalidIdentifier(String),

    #[error("unparsable {field}: {message}")]
    InvalidLevels { field: &'static str, message: String },

    #[error("invalid homepage '{0}'")]
    InvalidHomepage(String),
}

/// One bulk extract row, columns matched by header name.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheRow {
    #[serde(rename = "ChannelId")]
    pub channel_id: Option<String>,
    #[serde(rename = "Pid")]
    pub pid: Option<String>,
    #[serde(rename = "Type")]
    pub type_code: Option<String>,
    #[serde(rename = "Title")]
    pub title: Option<String>,
    #[serde(rename = "PrintIssn")]
    pub print_issn: Option<String>,
    #[serde(rename = "OnlineIssn")]
    pub online_issn: Option<String>,
    #[serde(rename = "IsbnPrefix")]
    pub isbn_prefix: Option<String>,
    #[serde(rename = "CurrentLevel")]
    pub current_level: Option<String>,
    #[serde(rename = "Ceased")]
    pub ceased: Option<String>,
    #[serde(rename = "LevelHistory")]
    pub level_history: Option<String>,
    #[serde(rename = "Url")]
    pub url: Option<String>,
}

impl CacheRow {
    /// Parses `line` as the single record under `header`.
    pub fn parse(header: &str, line: &str) -> Result<Self, RowError> {
        let text = format!("{}\n{}", header, line);
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        match reader.deserialize::<CacheRow>().next() {
            Some(Ok(row)) => Ok(row),
            Some(Err(e)) => Err(RowError::Malformed(e.to_string())),
            None => Err(RowError::Malformed("no record".to_string())),
        }
    }

    pub fn into_snapshot(self) -> Result<ChannelSnapshot, RowError> {
        let pid = self.pid.ok_or(RowError::MissingField("Pid"))?;
        let identifier = Uuid::parse_str(&pid)
            .map_err(|_| RowError::InvalidIdentifier(pid.clone()))?
            .hyphenated()
            .to_string();

        let type_code = self.type_code.ok_or(RowError::MissingField("Type"))?;
        let channel_type =
            ChannelType::from_alias(&type_code).ok_or(RowError::UnknownType(type_code))?;

        let title = self.title.ok_or(RowError::MissingField("Title"))?;

        let current = parse_levels("CurrentLevel", self.current_level.as_deref())?
            .into_iter()
            .last();
        let history = parse_levels("LevelHistory", self.level_history.as_deref())?;

        let homepage = self
            .url
            .map(|raw| Url::parse(&raw).map_err(|_| RowError::InvalidHomepage(raw)))
            .transpose()?;

        let mut snapshot = ChannelSnapshot::new(channel_type, &identifier, title);
        snapshot.legacy_id = self.channel_id;
        snapshot.print_issn = self.print_issn;
        snapshot.online_issn = self.online_issn;
        snapshot.isbn_prefix = self.isbn_prefix;
        snapshot.homepage = homepage;
        snapshot.discontinued = self.ceased;
        snapshot.level_history = LevelHistory::from_records(current, history);

        Ok(snapshot)
    }
}

/// Level cells hold the elements of a JSON array without the brackets.
fn parse_levels(field: &'static str, cell: Option<&str>) -> Result<Vec<LevelRecord>, RowError> {
    let Some(cell) = cell else {
        return Ok(Vec::new());
    };

    serde_json::from_str(&format!("[{}]", cell)).map_err(|e| RowError::InvalidLevels {
        field,
        message: e.to_string(),
    })
}
