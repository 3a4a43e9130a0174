//! Access to the upstream channel registry.

pub mod client;

pub use client::HttpRegistryGateway;

use async_trait::async_trait;
use common::channel::{ChannelSnapshot, ChannelType, LevelHistory, LevelRecord};
use serde::{Deserialize, Serialize};
use url::Url;

/// What the registry answered, without interpretation.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayResponse<T> {
    Found(T),
    NotFound,
    /// Raw `Location` the registry redirected to.
    Moved(String),
    ClientError { status: u16, body: String },
    ServerError { status: u16, body: String },
    TransportFailure(String),
    /// A success status whose body could not be decoded.
    InvalidResponse(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub name: Option<String>,
    pub issn: Option<String>,
    pub year: Option<i32>,
    pub offset: u32,
    pub size: u32,
}

#[async_trait]
pub trait RegistryGateway: Send + Sync {
    async fn fetch(
        &self,
        channel_type: ChannelType,
        identifier: &str,
        year: Option<i32>,
    ) -> GatewayResponse<RawChannel>;

    async fn search(
        &self,
        channel_type: ChannelType,
        query: &SearchQuery,
    ) -> GatewayResponse<RawSearchPage>;
}

/// Channel record as the registry serves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawChannel {
    pub pid: String,
    #[serde(alias = "originalTitle")]
    pub name: String,
    pub print_issn: Option<String>,
    pub online_issn: Option<String>,
    #[serde(alias = "isbnprefix")]
    pub isbn_prefix: Option<String>,
    #[serde(alias = "kurl")]
    pub homepage: Option<String>,
    pub ceased: Option<String>,
    /// Level for the year the registry was asked about.
    pub level_element_dto: Option<LevelRecord>,
    #[serde(default)]
    pub level_history: Vec<LevelRecord>,
}

impl RawChannel {
    /// Converts to the same snapshot shape the cache builder produces.
    pub fn into_snapshot(self, channel_type: ChannelType) -> ChannelSnapshot {
        let mut snapshot = ChannelSnapshot::new(channel_type, &self.pid, self.name);
        snapshot.print_issn = self.print_issn;
        snapshot.online_issn = self.online_issn;
        snapshot.isbn_prefix = self.isbn_prefix;
        snapshot.homepage = self.homepage.and_then(|raw| Url::parse(&raw).ok());
        snapshot.discontinued = self.ceased;
        snapshot.level_history =
            LevelHistory::from_records(self.level_element_dto, self.level_history);
        snapshot
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSearchPage {
    #[serde(alias = "totalHits")]
    pub total: u64,
    #[serde(default)]
    pub hits: Vec<RawChannel>,
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers every call with the same scripted response.
    pub struct ScriptedGateway {
        fetch: GatewayResponse<RawChannel>,
        search: GatewayResponse<RawSearchPage>,
        delay: Option<Duration>,
        pub calls: AtomicUsize,
    }

    impl ScriptedGateway {
        pub fn fetching(fetch: GatewayResponse<RawChannel>) -> Self {
            Self {
                fetch,
                search: GatewayResponse::NotFound,
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn searching(search: GatewayResponse<RawSearchPage>) -> Self {
            Self {
                search,
                ..Self::fetching(GatewayResponse::NotFound)
            }
        }

        pub fn delayed(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        async fn pause(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
        }
    }

    #[async_trait]
    impl RegistryGateway for ScriptedGateway {
        async fn fetch(
            &self,
            _channel_type: ChannelType,
            _identifier: &str,
            _year: Option<i32>,
        ) -> GatewayResponse<RawChannel> {
            self.pause().await;
            self.fetch.clone()
        }

        async fn search(
            &self,
            _channel_type: ChannelType,
            _query: &SearchQuery,
        ) -> GatewayResponse<RawSearchPage> {
            self.pause().await;
            self.search.clone()
        }
    }

    pub fn raw_channel(pid: &str, name: &str) -> RawChannel {
        RawChannel {
            pid: pid.to_string(),
            name: name.to_string(),
            print_issn: Some("1234-5678".to_string()),
            online_issn: None,
            isbn_prefix: None,
            homepage: Some("https://channel.example.org".to_string()),
            ceased: None,
            level_element_dto: Some(LevelRecord::new(2024, "2")),
            level_history: vec![LevelRecord::new(2023, "1")],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::level::ScientificValue;

    #[test]
    fn test_registry_json_decodes() {
        let raw: RawChannel = serde_json::from_str(
            r#"{
                "pid": "c1d2e3f4-a5b6-4c7d-8e9f-0a1b2c3d4e5f",
                "originalTitle": "Acta Registry",
                "printIssn": "1234-5678",
                "onlineIssn": null,
                "isbnprefix": null,
                "kurl": "https://acta.example.org",
                "ceased": null,
                "levelElementDto": {"level": "1", "year": 2024}
            }"#,
        )
        .unwrap();

        assert_eq!(raw.name, "Acta Registry");
        assert_eq!(raw.level_element_dto, Some(LevelRecord::new(2024, "1")));
        assert!(raw.level_history.is_empty());
    }

    #[test]
    fn test_into_snapshot_matches_cached_shape() {
        let snapshot = testing::raw_channel("c1d2e3f4-a5b6-4c7d-8e9f-0a1b2c3d4e5f", "Live")
            .into_snapshot(ChannelType::Journal);

        assert_eq!(snapshot.identifier, "C1D2E3F4-A5B6-4C7D-8E9F-0A1B2C3D4E5F");
        assert_eq!(snapshot.channel_type, ChannelType::Journal);
        assert_eq!(snapshot.scientific_value(Some(2024)), ScientificValue::LevelTwo);
        assert_eq!(snapshot.scientific_value(Some(2023)), ScientificValue::LevelOne);
        assert_eq!(snapshot.scientific_value(None), ScientificValue::LevelTwo);
        assert_eq!(
            snapshot.homepage.as_ref().map(Url::as_str),
            Some("https://channel.example.org/")
        );
    }

    #[test]
    fn test_invalid_homepage_is_dropped() {
        let mut raw = testing::raw_channel("c1d2e3f4-a5b6-4c7d-8e9f-0a1b2c3d4e5f", "Live");
        raw.homepage = Some("not a url".to_string());

        assert!(raw.into_snapshot(ChannelType::Series).homepage.is_none());
    }
}
