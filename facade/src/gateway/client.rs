use super::{GatewayResponse, RawChannel, RawSearchPage, RegistryGateway, SearchQuery};
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use common::channel::ChannelType;
use common::config::RegistryConfig;
use common::{Error, Result};
use http::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// [`RegistryGateway`] over the registry's HTTP API.
///
/// Redirects are never followed; they surface as [`GatewayResponse::Moved`] so
/// the caller can rewrite them into its own address space.
pub struct HttpRegistryGateway {
    client: rquest::Client,
    base_url: Url,
    bearer_token: Option<String>,
}

impl HttpRegistryGateway {
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        if config.base_url.cannot_be_a_base() {
            return Err(Error::InvalidUri(format!(
                "Registry base URL {} cannot carry a path",
                config.base_url
            )));
        }

        let client = rquest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .redirect(rquest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            bearer_token: config.bearer_token.clone(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn fetch_url(&self, channel_type: ChannelType, identifier: &str, year: Option<i32>) -> Url {
        let year = year.unwrap_or_else(|| Utc::now().year()).to_string();
        self.endpoint(&[channel_type.upstream_segment(), identifier, &year])
    }

    fn search_url(&self, channel_type: ChannelType, query: &SearchQuery) -> Url {
        let mut url = self.endpoint(&[channel_type.upstream_segment(), "search"]);
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(name) = &query.name {
                pairs.append_pair("name", name);
            }
            if let Some(issn) = &query.issn {
                pairs.append_pair("issn", issn);
            }
            if let Some(year) = query.year {
                pairs.append_pair("year", &year.to_string());
            }
            pairs
                .append_pair("offset", &query.offset.to_string())
                .append_pair("size", &query.size.to_string());
        }
        url
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> GatewayResponse<T> {
        debug!(%url, "Calling registry");

        let mut request = self.client.get(url.as_str());
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return GatewayResponse::TransportFailure(e.to_string()),
        };

        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(rquest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return GatewayResponse::TransportFailure(e.to_string()),
        };

        classify(status, location, body)
    }
}

/// Maps a registry status, `Location` header and body to a response variant.
pub(crate) fn classify<T: DeserializeOwned>(
    status: u16,
    location: Option<String>,
    body: String,
) -> GatewayResponse<T> {
    let Ok(status) = StatusCode::from_u16(status) else {
        return GatewayResponse::InvalidResponse(format!("Invalid status code {}", status));
    };

    if status == StatusCode::NOT_FOUND {
        return GatewayResponse::NotFound;
    }

    if status.is_redirection() {
        return match location {
            Some(location) => GatewayResponse::Moved(location),
            None => GatewayResponse::InvalidResponse(format!(
                "Redirect {} without a Location header",
                status
            )),
        };
    }

    if status.is_client_error() {
        return GatewayResponse::ClientError {
            status: status.as_u16(),
            body,
        };
    }

    if status.is_server_error() {
        return GatewayResponse::ServerError {
            status: status.as_u16(),
            body,
        };
    }

    if !status.is_success() {
        return GatewayResponse::InvalidResponse(format!("Unexpected status {}", status));
    }

    match serde_json::from_str(&body) {
        Ok(value) => GatewayResponse::Found(value),
        Err(e) => GatewayResponse::InvalidResponse(format!("Undecodable registry body: {}", e)),
    }
}

#[async_trait]
impl RegistryGateway for HttpRegistryGateway {
    async fn fetch(
        &self,
        channel_type: ChannelType,
        identifier: &str,
        year: Option<i32>,
    ) -> GatewayResponse<RawChannel> {
        self.get(self.fetch_url(channel_type, identifier, year)).await
    }

    async fn search(
        &self,
        channel_type: ChannelType,
        query: &SearchQuery,
    ) -> GatewayResponse<RawSearchPage> {
        self.get(self.search_url(channel_type, query)).await
    }
}
