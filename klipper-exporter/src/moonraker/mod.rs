//! HTTP client for the Moonraker web API.
//!
//! One method per upstream resource. Each issues a single GET with no
//! retry, attaches the `X-API-KEY` header when a key is known, and decodes
//! the `result` payload into the typed structures in [`types`].

pub mod types;

use std::time::Duration;

use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::discovery::CustomEntities;
use crate::error::FetchError;
use crate::objects::FIXED_OBJECT_QUERY;

use types::{
    DirectoryInfo, Envelope, HistoryList, HistoryTotals, JobQueue, ObjectList, ObjectQuery,
    ProcStats, SpoolmanStatus, SystemInfo, TemperatureStore,
};

/// Header carrying the Moonraker API key.
pub const API_KEY_HEADER: &str = "X-API-KEY";

/// Query string parameters; a `None` value emits a bare key (`?extruder`).
pub type QueryParams = Vec<(String, Option<String>)>;

/// Shared HTTP client for all targets.
#[derive(Debug, Clone)]
pub struct MoonrakerClient {
    http: reqwest::Client,
}

impl MoonrakerClient {
    /// Create a client whose requests fail after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    /// Bind the client to one target and API key for the duration of a scrape.
    pub fn upstream<'a>(&'a self, target: &'a str, api_key: Option<&'a str>) -> Upstream<'a> {
        Upstream {
            http: &self.http,
            target,
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }
}

/// A Moonraker instance addressed as `host:port`.
#[derive(Debug, Clone, Copy)]
pub struct Upstream<'a> {
    http: &'a reqwest::Client,
    target: &'a str,
    api_key: Option<&'a str>,
}

impl Upstream<'_> {
    pub fn target(&self) -> &str {
        self.target
    }

    pub async fn proc_stats(&self) -> Result<ProcStats, FetchError> {
        self.get("/machine/proc_stats", &[]).await
    }

    pub async fn directory_info(&self) -> Result<DirectoryInfo, FetchError> {
        self.get(
            "/server/files/directory",
            &[pair("path", "gcodes"), pair("extended", "false")],
        )
        .await
    }

    pub async fn job_queue(&self) -> Result<JobQueue, FetchError> {
        self.get("/server/job_queue/status", &[]).await
    }

    pub async fn history_totals(&self) -> Result<HistoryTotals, FetchError> {
        self.get("/server/history/totals", &[]).await
    }

    /// The most recent job only.
    pub async fn history_latest(&self) -> Result<HistoryList, FetchError> {
        self.get(
            "/server/history/list",
            &[
                pair("limit", "1"),
                pair("start", "0"),
                pair("since", "1"),
                pair("order", "desc"),
            ],
        )
        .await
    }

    pub async fn system_info(&self) -> Result<SystemInfo, FetchError> {
        self.get("/machine/system_info", &[]).await
    }

    pub async fn temperature_store(&self) -> Result<TemperatureStore, FetchError> {
        self.get("/server/temperature_store", &[]).await
    }

    pub async fn object_list(&self) -> Result<ObjectList, FetchError> {
        self.get("/printer/objects/list", &[]).await
    }

    /// List every printer object and keep the dynamically named ones.
    pub async fn discover_entities(&self) -> Result<CustomEntities, FetchError> {
        let list = self.object_list().await?;
        Ok(CustomEntities::from_object_names(&list.objects))
    }

    /// Query the fixed objects plus every discovered dynamic object.
    pub async fn object_query(&self, entities: &CustomEntities) -> Result<ObjectQuery, FetchError> {
        let mut query: QueryParams = FIXED_OBJECT_QUERY
            .iter()
            .map(|(object, fields)| (object.to_string(), fields.map(str::to_string)))
            .collect();
        query.extend(entities.query_params());

        self.get("/printer/objects/query", &query).await
    }

    pub async fn spoolman_status(&self) -> Result<SpoolmanStatus, FetchError> {
        self.get("/server/spoolman/status", &[]).await
    }

    /// Build the request URL for a resource path.
    pub fn url(&self, path: &str, query: &[(String, Option<String>)]) -> Result<Url, FetchError> {
        let raw = format!("http://{}{}", self.target, path);
        let mut url = Url::parse(&raw).map_err(|e| FetchError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;

        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                match value {
                    Some(value) => pairs.append_pair(key, value),
                    None => pairs.append_key_only(key),
                };
            }
        }

        Ok(url)
    }

    /// Issue a GET and decode the `result` member of the reply.
    async fn get<T>(&self, path: &str, query: &[(String, Option<String>)]) -> Result<T, FetchError>
    where
        T: DeserializeOwned + Default,
    {
        let url = self.url(path, query)?;
        let url_str = url.to_string();
        debug!(url = %url_str, "Collecting metrics");

        let mut request = self.http.get(url);
        if let Some(key) = self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send().await.map_err(|source| FetchError::Request {
            url: url_str.clone(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url_str,
                status,
            });
        }

        let body = response.bytes().await.map_err(|source| FetchError::Request {
            url: url_str.clone(),
            source,
        })?;
        trace!(url = %url_str, bytes = body.len(), "Received response");

        let envelope: Envelope<T> =
            serde_json::from_slice(&body).map_err(|source| FetchError::Decode {
                url: url_str,
                source,
            })?;

        Ok(envelope.result)
    }
}

fn pair(key: &str, value: &str) -> (String, Option<String>) {
    (key.to_string(), Some(value.to_string()))
}
