// Client for the external name registry (section 6). The registry service
// itself -- and the launcher that spawns peers against it -- is an external
// collaborator; this module only speaks to it over HTTP.
use serde_derive::{Deserialize, Serialize};
use url::Url;

use crate::endpoint::{Endpoint, Epoch, PeerId};

const PEER_NAME_PREFIX: &str = "PEER_";
const TRACKER_NAME_PREFIX: &str = "TRACKER_EPOCH_";

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("registry request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("registry returned malformed response")]
    Malformed,
}

pub type Result<T> = std::result::Result<T, RegistryError>;

pub fn peer_name(id: &PeerId) -> String {
    format!("{PEER_NAME_PREFIX}{id}")
}

pub fn tracker_name(epoch: Epoch) -> String {
    format!("{TRACKER_NAME_PREFIX}{epoch}")
}

#[derive(Debug, Serialize, Deserialize)]
struct NameEntry {
    name: String,
    endpoint: Endpoint,
}

/// Thin HTTP client over a `PUT/GET/DELETE /names/:name` and
/// `GET /names?prefix=:p` contract. Registration failures surface as
/// `RegistryError`; callers decide whether that's fatal (initial
/// self-registration) or retryable (discovery, per section 7).
#[derive(Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RegistryClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    fn name_url(&self, name: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(&format!("names/{name}"));
        url
    }

    #[tracing::instrument(skip(self))]
    pub async fn register(&self, name: &str, endpoint: &Endpoint) -> Result<()> {
        self.http
            .put(self.name_url(name))
            .json(&NameEntry {
                name: name.to_owned(),
                endpoint: endpoint.clone(),
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn lookup(&self, name: &str) -> Result<Option<Endpoint>> {
        let resp = self.http.get(self.name_url(name)).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let entry: NameEntry = resp.error_for_status()?.json().await?;
        Ok(Some(entry.endpoint))
    }

    /// Best-effort: failures are logged by the caller and otherwise ignored
    /// (section 7, "duplicate registration" and "stepping down" both tolerate
    /// this being a no-op against an already-absent name).
    #[tracing::instrument(skip(self))]
    pub async fn unregister(&self, name: &str) -> Result<()> {
        match self.http.delete(self.name_url(name)).send().await {
            Ok(resp) => {
                resp.error_for_status()?;
                Ok(())
            }
            Err(e) => Err(RegistryError::Request(e)),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<(String, Endpoint)>> {
        let mut url = self.base_url.clone();
        url.set_path("names");
        url.query_pairs_mut().append_pair("prefix", prefix);
        let entries: Vec<NameEntry> = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(entries.into_iter().map(|e| (e.name, e.endpoint)).collect())
    }

    /// Peer Directory: every other peer's endpoint, excluding self.
    pub async fn peer_directory(&self, self_id: &PeerId) -> Result<Vec<Endpoint>> {
        let self_name = peer_name(self_id);
        Ok(self
            .list_prefix(PEER_NAME_PREFIX)
            .await?
            .into_iter()
            .filter(|(name, _)| name != &self_name)
            .map(|(_, endpoint)| endpoint)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_prefixed_as_specified() {
        assert_eq!(peer_name(&"p1".to_string()), "PEER_p1");
        assert_eq!(tracker_name(7), "TRACKER_EPOCH_7");
    }
}
