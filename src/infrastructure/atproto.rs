//! ATProto repository client (XRPC over a personal data server).

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use crate::config::StoreSettings;
use crate::infrastructure::error::{InfraError, InfraResult, RemoteError, RemoteResult};
use crate::infrastructure::http::{build_client, classify, read_json, USER_AGENT};
use crate::infrastructure::traits::{RecordPage, RecordStore, StoredRecord};

const PDS_SERVICE_TYPE: &str = "AtprotoPersonalDataServer";

/// Authenticated session against one repository.
struct Session {
    did: String,
    access_jwt: String,
    pds: String,
}

#[derive(Debug, Deserialize)]
struct ResolveHandleResponse {
    did: String,
}

#[derive(Debug, Deserialize)]
struct DidDocument {
    #[serde(default)]
    service: Vec<DidService>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DidService {
    #[serde(rename = "type")]
    kind: String,
    service_endpoint: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionResponse {
    access_jwt: String,
    did: String,
}

#[derive(Debug, Deserialize)]
struct ListRecordsResponse {
    #[serde(default)]
    records: Vec<ListedRecord>,
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListedRecord {
    uri: String,
    value: Value,
}

/// Record store backed by `com.atproto.repo.*` calls.
pub struct AtprotoStore {
    client: Client,
    session: Session,
    page_limit: u32,
}

impl AtprotoStore {
    /// Resolve the account's PDS (unless configured) and open a session.
    #[instrument(level = "debug", skip(settings, secret))]
    pub fn authenticate(settings: &StoreSettings, identity: &str, secret: &str) -> InfraResult<Self> {
        let client = build_client(USER_AGENT, Duration::from_secs(settings.timeout_secs))?;

        let pds = match &settings.pds_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                let did = resolve_handle(&client, &settings.public_api_url, identity)
                    .map_err(|e| auth_error(format!("resolve handle {identity}"), e))?;
                resolve_pds(&client, &settings.plc_directory_url, &did)?
            }
        };
        debug!("using PDS {pds}");

        let response = classify(
            client
                .post(format!("{pds}/xrpc/com.atproto.server.createSession"))
                .json(&json!({ "identifier": identity, "password": secret }))
                .send(),
        )
        .map_err(|e| auth_error("create session".to_string(), e))?;
        let session: CreateSessionResponse =
            read_json(response).map_err(|e| auth_error("create session".to_string(), e))?;
        info!("authenticated as {} ({})", identity, session.did);

        Ok(Self {
            client,
            session: Session {
                did: session.did,
                access_jwt: session.access_jwt,
                pds,
            },
            page_limit: settings.page_limit,
        })
    }

    fn xrpc(&self, method: &str) -> String {
        format!("{}/xrpc/{method}", self.session.pds)
    }

    fn post(&self, method: &str, body: &Value) -> RemoteResult<()> {
        classify(
            self.client
                .post(self.xrpc(method))
                .bearer_auth(&self.session.access_jwt)
                .json(body)
                .send(),
        )?;
        Ok(())
    }
}

fn auth_error(context: String, e: RemoteError) -> InfraError {
    InfraError::Auth {
        message: format!("{context}: {e}"),
    }
}

fn resolve_handle(client: &Client, public_api: &str, handle: &str) -> RemoteResult<String> {
    let url = format!(
        "{}/xrpc/com.atproto.identity.resolveHandle",
        public_api.trim_end_matches('/')
    );
    let response = classify(client.get(url).query(&[("handle", handle)]).send())?;
    let body: ResolveHandleResponse = read_json(response)?;
    Ok(body.did)
}

fn did_document_url(plc_directory: &str, did: &str) -> InfraResult<String> {
    if did.starts_with("did:plc:") {
        Ok(format!("{}/{did}", plc_directory.trim_end_matches('/')))
    } else if let Some(host) = did.strip_prefix("did:web:") {
        Ok(format!("https://{host}/.well-known/did.json"))
    } else {
        Err(InfraError::Auth {
            message: format!("unsupported DID method: {did}"),
        })
    }
}

fn resolve_pds(client: &Client, plc_directory: &str, did: &str) -> InfraResult<String> {
    let url = did_document_url(plc_directory, did)?;
    let doc: DidDocument = classify(client.get(url).send())
        .and_then(read_json::<DidDocument>)
        .map_err(|e| auth_error(format!("resolve DID {did}"), e))?;

    doc.service
        .into_iter()
        .find(|svc| svc.kind == PDS_SERVICE_TYPE)
        .map(|svc| svc.service_endpoint.trim_end_matches('/').to_string())
        .ok_or_else(|| InfraError::Auth {
            message: format!("no PDS endpoint in DID document for {did}"),
        })
}

/// Record key is the last segment of an `at://` uri.
fn key_from_uri(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or(uri)
}

impl RecordStore for AtprotoStore {
    fn list_page(&self, collection: &str, cursor: Option<&str>) -> RemoteResult<RecordPage> {
        let limit = self.page_limit.to_string();
        let mut query = vec![
            ("repo", self.session.did.as_str()),
            ("collection", collection),
            ("limit", limit.as_str()),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor));
        }
        let response = classify(
            self.client
                .get(self.xrpc("com.atproto.repo.listRecords"))
                .bearer_auth(&self.session.access_jwt)
                .query(&query)
                .send(),
        )?;
        let body: ListRecordsResponse = read_json(response)?;
        let records: Vec<StoredRecord> = body
            .records
            .into_iter()
            .map(|r| StoredRecord {
                key: key_from_uri(&r.uri).to_string(),
                value: r.value,
            })
            .collect();
        // an empty page ends the listing even if a cursor came back
        let cursor = if records.is_empty() { None } else { body.cursor };
        Ok(RecordPage { records, cursor })
    }

    fn create(&self, collection: &str, key: &str, value: &Value) -> RemoteResult<()> {
        self.post(
            "com.atproto.repo.createRecord",
            &json!({
                "repo": self.session.did,
                "collection": collection,
                "rkey": key,
                "record": value,
            }),
        )
    }

    fn put(&self, collection: &str, key: &str, value: &Value) -> RemoteResult<()> {
        self.post(
            "com.atproto.repo.putRecord",
            &json!({
                "repo": self.session.did,
                "collection": collection,
                "rkey": key,
                "record": value,
            }),
        )
    }

    fn apply_creates(&self, collection: &str, records: &[(String, Value)]) -> RemoteResult<()> {
        let writes: Vec<Value> = records
            .iter()
            .map(|(key, value)| {
                json!({
                    "$type": "com.atproto.repo.applyWrites#create",
                    "collection": collection,
                    "rkey": key,
                    "value": value,
                })
            })
            .collect();
        self.post(
            "com.atproto.repo.applyWrites",
            &json!({ "repo": self.session.did, "writes": writes }),
        )
    }

    fn delete(&self, collection: &str, key: &str) -> RemoteResult<()> {
        self.post(
            "com.atproto.repo.deleteRecord",
            &json!({
                "repo": self.session.did,
                "collection": collection,
                "rkey": key,
            }),
        )
    }
}
