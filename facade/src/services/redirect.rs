use common::channel::{ChannelType, normalize_identifier};
use common::{Error, Result};
use url::Url;

/// Builds channel URIs in the facade's own address space.
#[derive(Debug, Clone)]
pub struct UriRewriter {
    base_url: Url,
}

impl UriRewriter {
    pub fn new(base_url: Url) -> Result<Self> {
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidUri(format!(
                "Facade base URL {} cannot carry a path",
                base_url
            )));
        }
        Ok(Self { base_url })
    }

    pub fn channel_uri(&self, channel_type: ChannelType, identifier: &str, year: Option<i32>) -> Url {
        let mut url = self.base_url.clone();
        url.set_query(None);
        url.set_fragment(None);
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .push(channel_type.external_segment())
                .push(&normalize_identifier(identifier));
            if let Some(year) = year {
                path.push(&year.to_string());
            }
        }
        url
    }

    /// Rewrites a registry redirect into this facade's URI for the moved channel.
    /// Returns the new identifier and location, or `None` when the location
    /// carries no identifier.
    pub fn rewrite_moved(
        &self,
        channel_type: ChannelType,
        location: &str,
        year: Option<i32>,
    ) -> Option<(String, Url)> {
        let identifier = moved_identifier(location)?;
        let uri = self.channel_uri(channel_type, &identifier, year);
        Some((identifier, uri))
    }
}

/// The registry puts the identifier in the second-to-last path segment,
/// followed by the year.
pub fn moved_identifier(location: &str) -> Option<String> {
    let path = match Url::parse(location) {
        Ok(url) => url.path().to_string(),
        Err(_) => location
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() < 2 {
        return None;
    }

    Some(normalize_identifier(segments[segments.len() - 2]))
}
