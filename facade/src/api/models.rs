use crate::services::UriRewriter;
use common::channel::{ChannelSnapshot, ChannelType};
use common::level::ScientificValue;
use serde::{Deserialize, Serialize};
use url::Url;

// Request models
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub name: Option<String>,
    pub issn: Option<String>,
    pub year: Option<String>,
    pub offset: Option<String>,
    pub size: Option<String>,
}

// Response models
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: T,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub offset: u32,
    pub limit: u32,
    pub total: u64,
    pub has_more: bool,
}

/// Public representation of a channel for one requested year.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelView {
    pub id: Url,
    pub identifier: String,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    pub name: String,
    pub online_issn: Option<String>,
    pub print_issn: Option<String>,
    pub isbn_prefix: Option<String>,
    pub same_as: Option<Url>,
    pub discontinued: Option<String>,
    pub year: Option<i32>,
    pub scientific_value: ScientificValue,
}

impl ChannelView {
    pub fn new(snapshot: ChannelSnapshot, year: Option<i32>, uris: &UriRewriter) -> Self {
        let scientific_value = snapshot.scientific_value(year);
        Self {
            id: uris.channel_uri(snapshot.channel_type, &snapshot.identifier, year),
            identifier: snapshot.identifier,
            channel_type: snapshot.channel_type,
            name: snapshot.name,
            online_issn: snapshot.online_issn,
            print_issn: snapshot.print_issn,
            isbn_prefix: snapshot.isbn_prefix,
            same_as: snapshot.homepage,
            discontinued: snapshot.discontinued,
            year,
            scientific_value,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub cache: &'static str,
}
