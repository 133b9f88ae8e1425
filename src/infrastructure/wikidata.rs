//! Wikidata SPARQL common-name lookup.
//!
//! Taxa are matched through the Open Tree of Life id property (P9157).

use std::collections::HashMap;
use std::time::Duration;

use itertools::Itertools;
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::config::EnrichmentSettings;
use crate::domain::{NamePass, TaxonId};
use crate::infrastructure::error::{InfraResult, RemoteError, RemoteResult};
use crate::infrastructure::http::{build_client, classify, read_json};
use crate::infrastructure::traits::{NameHit, NameSource};

#[derive(Debug, Deserialize)]
struct SparqlResponse {
    results: SparqlResults,
}

#[derive(Debug, Deserialize)]
struct SparqlResults {
    #[serde(default)]
    bindings: Vec<HashMap<String, SparqlValue>>,
}

#[derive(Debug, Deserialize)]
struct SparqlValue {
    value: String,
}

pub struct WikidataNameSource {
    client: Client,
    endpoint: String,
}

impl WikidataNameSource {
    pub fn new(settings: &EnrichmentSettings) -> InfraResult<Self> {
        Ok(Self {
            client: build_client(&settings.user_agent, Duration::from_secs(settings.timeout_secs))?,
            endpoint: settings.sparql_url.clone(),
        })
    }
}

/// SPARQL for one batch; both passes bind `?ottId` and `?name`.
pub fn build_query(pass: NamePass, ids: &[TaxonId]) -> String {
    let values = ids.iter().map(|id| format!("\"{id}\"")).join(" ");
    let property = match pass {
        NamePass::Vernacular => "wdt:P1843",
        NamePass::Label => "rdfs:label",
    };
    format!(
        "SELECT ?ottId ?name WHERE {{\n  ?item wdt:P9157 ?ottId .\n  ?item {property} ?name .\n  FILTER(LANG(?name) = \"en\")\n  VALUES ?ottId {{ {values} }}\n}}"
    )
}

impl NameSource for WikidataNameSource {
    #[instrument(level = "debug", skip(self, ids), fields(batch = ids.len()))]
    fn lookup(&self, pass: NamePass, ids: &[TaxonId]) -> RemoteResult<Vec<NameHit>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = build_query(pass, ids);
        let response = classify(
            self.client
                .get(&self.endpoint)
                .header(ACCEPT, "application/sparql-results+json")
                .query(&[("query", query.as_str()), ("format", "json")])
                .send(),
        )?;
        let body: SparqlResponse = read_json(response)?;

        let mut hits = Vec::with_capacity(body.results.bindings.len());
        for binding in body.results.bindings {
            let (Some(ott), Some(name)) = (binding.get("ottId"), binding.get("name")) else {
                continue;
            };
            let id = ott
                .value
                .parse::<TaxonId>()
                .map_err(|e| RemoteError::Decode(format!("ott id {:?}: {e}", ott.value)))?;
            hits.push(NameHit {
                id,
                name: name.value.clone(),
            });
        }
        debug!("{pass} pass: {} hits for {} ids", hits.len(), ids.len());
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_vernacular_pass_when_building_query_then_uses_common_name_property() {
        let query = build_query(NamePass::Vernacular, &[770315, 244265]);
        assert!(query.contains("wdt:P1843"));
        assert!(query.contains("VALUES ?ottId { \"770315\" \"244265\" }"));
    }

    #[test]
    fn given_label_pass_when_building_query_then_uses_label() {
        let query = build_query(NamePass::Label, &[1]);
        assert!(query.contains("rdfs:label"));
        assert!(!query.contains("P1843"));
    }
}
