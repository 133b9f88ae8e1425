//! Open Tree of Life synthetic-tree client.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::config::TreeSourceSettings;
use crate::domain::{ArgusonNode, TaxonId};
use crate::infrastructure::error::{InfraResult, RemoteResult};
use crate::infrastructure::http::{build_client, classify, decode_deep, read_bytes, USER_AGENT};
use crate::infrastructure::traits::TreeSource;

#[derive(Debug, Deserialize)]
struct SubtreeResponse {
    arguson: Option<ArgusonNode>,
}

/// Fetches `tree_of_life/subtree` in arguson format.
pub struct OtolTreeSource {
    client: Client,
    api_url: String,
}

impl OtolTreeSource {
    pub fn new(settings: &TreeSourceSettings) -> InfraResult<Self> {
        Ok(Self {
            client: build_client(USER_AGENT, Duration::from_secs(settings.timeout_secs))?,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
        })
    }
}

impl TreeSource for OtolTreeSource {
    #[instrument(level = "debug", skip(self))]
    fn fetch_subtree(
        &self,
        root: TaxonId,
        height_limit: Option<u32>,
    ) -> RemoteResult<Option<ArgusonNode>> {
        let url = format!("{}/tree_of_life/subtree", self.api_url);
        let payload = json!({
            "node_id": format!("ott{root}"),
            "format": "arguson",
            "height_limit": height_limit.map_or(-1, i64::from),
        });
        debug!("POST {url}");
        let response = classify(self.client.post(&url).json(&payload).send())?;
        decode_subtree(&read_bytes(response)?)
    }
}

/// Decode a `tree_of_life/subtree` response body. Synthesis trees nest far
/// past serde_json's default depth limit.
pub fn decode_subtree(body: &[u8]) -> RemoteResult<Option<ArgusonNode>> {
    decode_deep::<SubtreeResponse>(body).map(|response| response.arguson)
}
