//! Decides per request whether a channel is served from the live registry or
//! from the snapshot cache.
//!
//! | Registry answer                 | `Live`              | `LiveWithFallback`           |
//! |---------------------------------|---------------------|------------------------------|
//! | found                           | `Found`             | `Found`                      |
//! | not found / client error        | `NotFound`/`Rejected` | same, cache never consulted |
//! | moved                           | `MovedTo` (rewritten) | same                       |
//! | server error / transport / junk | `UpstreamUnavailable` | cache hit wins, else the original failure |
//!
//! `CacheOnly` never calls the registry; a miss there is `NotFound`.

use crate::gateway::{GatewayResponse, RegistryGateway, SearchQuery};
use crate::services::redirect::UriRewriter;
use common::channel::{ChannelSnapshot, ChannelType, normalize_identifier};
use common::config::ResolutionMode;
use common::storage::SnapshotStore;
use common::{Error, Result};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// Failure of the registry that the cache may hide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamFailure {
    ServerError { status: u16, body: String },
    Transport(String),
    InvalidResponse(String),
}

impl fmt::Display for UpstreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamFailure::ServerError { status, body } => {
                write!(f, "registry answered {}: {}", status, body)
            }
            UpstreamFailure::Transport(message) => write!(f, "registry unreachable: {}", message),
            UpstreamFailure::InvalidResponse(message) => {
                write!(f, "registry response unusable: {}", message)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    Found(ChannelSnapshot),
    NotFound,
    MovedTo { identifier: String, location: Url },
    /// The registry refused the request (4xx other than 404).
    Rejected { status: u16, body: String },
    UpstreamUnavailable(UpstreamFailure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPage {
    pub total: u64,
    pub offset: u32,
    pub size: u32,
    pub hits: Vec<ChannelSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Page(SearchPage),
    Rejected { status: u16, body: String },
    UpstreamUnavailable(UpstreamFailure),
}

enum Origin {
    Live,
    Cache,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Origin::Live => "live",
            Origin::Cache => "cache",
        })
    }
}

pub struct ResolutionEngine {
    gateway: Arc<dyn RegistryGateway>,
    cache: Arc<dyn SnapshotStore>,
    mode: ResolutionMode,
    uris: UriRewriter,
}

impl ResolutionEngine {
    pub fn new(
        gateway: Arc<dyn RegistryGateway>,
        cache: Arc<dyn SnapshotStore>,
        mode: ResolutionMode,
        uris: UriRewriter,
    ) -> Self {
        Self {
            gateway,
            cache,
            mode,
            uris,
        }
    }

    pub fn uris(&self) -> &UriRewriter {
        &self.uris
    }

    /// Resolves one channel. Cancellation aborts with [`Error::Cancelled`]
    /// and never falls back to the cache.
    pub async fn resolve(
        &self,
        channel_type: ChannelType,
        identifier: &str,
        year: Option<i32>,
        cancel: &CancellationToken,
    ) -> Result<ResolutionOutcome> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            outcome = self.resolve_uncancelled(channel_type, identifier, year) => outcome,
        }
    }

    /// Searches the live registry. Search results are never served from the cache.
    pub async fn search(
        &self,
        channel_type: ChannelType,
        query: &SearchQuery,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome> {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            response = self.gateway.search(channel_type, query) => response,
        };

        Ok(match response {
            GatewayResponse::Found(page) => SearchOutcome::Page(SearchPage {
                total: page.total,
                offset: query.offset,
                size: query.size,
                hits: page
                    .hits
                    .into_iter()
                    .map(|raw| raw.into_snapshot(channel_type))
                    .collect(),
            }),
            GatewayResponse::NotFound => SearchOutcome::Page(SearchPage {
                total: 0,
                offset: query.offset,
                size: query.size,
                hits: Vec::new(),
            }),
            GatewayResponse::ClientError { status, body } => {
                SearchOutcome::Rejected { status, body }
            }
            GatewayResponse::Moved(location) => {
                SearchOutcome::UpstreamUnavailable(UpstreamFailure::InvalidResponse(format!(
                    "Unexpected redirect to {}",
                    location
                )))
            }
            GatewayResponse::ServerError { status, body } => {
                SearchOutcome::UpstreamUnavailable(UpstreamFailure::ServerError { status, body })
            }
            GatewayResponse::TransportFailure(message) => {
                SearchOutcome::UpstreamUnavailable(UpstreamFailure::Transport(message))
            }
            GatewayResponse::InvalidResponse(message) => {
                SearchOutcome::UpstreamUnavailable(UpstreamFailure::InvalidResponse(message))
            }
        })
    }

    async fn resolve_uncancelled(
        &self,
        channel_type: ChannelType,
        identifier: &str,
        year: Option<i32>,
    ) -> Result<ResolutionOutcome> {
        let identifier = normalize_identifier(identifier);

        if self.mode == ResolutionMode::CacheOnly {
            return Ok(match self.cache.get(channel_type, &identifier).await? {
                Some(snapshot) => found(snapshot, Origin::Cache),
                None => ResolutionOutcome::NotFound,
            });
        }

        let failure = match self.gateway.fetch(channel_type, &identifier, year).await {
            GatewayResponse::Found(raw) => {
                return Ok(found(raw.into_snapshot(channel_type), Origin::Live));
            }
            GatewayResponse::NotFound => return Ok(ResolutionOutcome::NotFound),
            GatewayResponse::ClientError { status, body } => {
                return Ok(ResolutionOutcome::Rejected { status, body });
            }
            GatewayResponse::Moved(location) => {
                match self.uris.rewrite_moved(channel_type, &location, year) {
                    Some((identifier, location)) => {
                        return Ok(ResolutionOutcome::MovedTo {
                            identifier,
                            location,
                        });
                    }
                    None => UpstreamFailure::InvalidResponse(format!(
                        "Redirect location without identifier: {}",
                        location
                    )),
                }
            }
            GatewayResponse::ServerError { status, body } => {
                UpstreamFailure::ServerError { status, body }
            }
            GatewayResponse::TransportFailure(message) => UpstreamFailure::Transport(message),
            GatewayResponse::InvalidResponse(message) => UpstreamFailure::InvalidResponse(message),
        };

        if self.mode == ResolutionMode::Live {
            return Ok(ResolutionOutcome::UpstreamUnavailable(failure));
        }

        Ok(self.fall_back(channel_type, &identifier, failure).await)
    }

    /// The cache only ever replaces a transient registry failure; when it
    /// cannot help, the caller sees the registry failure, not the cache's.
    async fn fall_back(
        &self,
        channel_type: ChannelType,
        identifier: &str,
        failure: UpstreamFailure,
    ) -> ResolutionOutcome {
        match self.cache.get(channel_type, identifier).await {
            Ok(Some(snapshot)) => {
                warn!(%channel_type, %identifier, upstream = %failure, "Serving cached snapshot while registry fails");
                found(snapshot, Origin::Cache)
            }
            Ok(None) => {
                warn!(%channel_type, %identifier, upstream = %failure, "Registry failed and cache has no snapshot");
                ResolutionOutcome::UpstreamUnavailable(failure)
            }
            Err(e) => {
                warn!(%channel_type, %identifier, upstream = %failure, cache = %e, "Registry failed and cache is unavailable");
                ResolutionOutcome::UpstreamUnavailable(failure)
            }
        }
    }
}

fn found(snapshot: ChannelSnapshot, origin: Origin) -> ResolutionOutcome {
    debug!(identifier = %snapshot.identifier, channel_type = %snapshot.channel_type, %origin, "Resolved channel");
    ResolutionOutcome::Found(snapshot)
}
