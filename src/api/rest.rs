//! Implements the `RecordStore` trait against a json-server style REST endpoint.
//!
//! Routes, relative to the base URL:
//! - `GET    /<collection>?<scope field>=<scope value>`
//! - `POST   /<collection>`
//! - `PUT    /<collection>/<id>`
//! - `DELETE /<collection>/<id>`
//! - `GET    /<collection>/<id>`

use crate::api::RecordStore;
use crate::error::Res;
use crate::model::{Fields, Record, RecordId, Scope};
use anyhow::{anyhow, bail, Context};
use reqwest::{Response, StatusCode};
use serde_json::Value;
use tracing::trace;
use url::Url;

/// A `RecordStore` backed by HTTP calls to a REST endpoint.
#[derive(Debug, Clone)]
pub struct RestStore {
    client: reqwest::Client,
    base_url: Url,
    collection: String,
}

impl RestStore {
    /// Creates a store for `collection` (e.g. `expenses`) under `base_url`
    /// (e.g. `http://localhost:3000`).
    pub fn new(base_url: Url, collection: impl Into<String>) -> Res<Self> {
        let collection = collection.into();
        if collection.trim().is_empty() {
            bail!("The collection name must not be empty");
        }
        if base_url.cannot_be_a_base() {
            bail!("The URL '{base_url}' cannot be used as a base URL");
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            collection,
        })
    }

    fn collection_url(&self) -> Res<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("The URL '{}' cannot be used as a base URL", self.base_url))?
            .pop_if_empty()
            .push(&self.collection);
        Ok(url)
    }

    fn record_url(&self, id: &RecordId) -> Res<Url> {
        let mut url = self.collection_url()?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("The URL '{}' cannot be used as a base URL", self.base_url))?
            .push(&id.key());
        Ok(url)
    }

    fn list_url(&self, scope: Option<&Scope>) -> Res<Url> {
        let mut url = self.collection_url()?;
        if let Some(scope) = scope {
            url.query_pairs_mut()
                .append_pair(scope.field(), scope.value());
        }
        Ok(url)
    }
}

#[async_trait::async_trait]
impl RecordStore for RestStore {
    async fn list(&self, scope: Option<&Scope>) -> Res<Vec<Record>> {
        let url = self.list_url(scope)?;
        trace!("GET {url}");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to send GET request to {url}"))?;
        let body = success(response, "GET", &url).await?.json::<Value>().await?;
        decode_list(body)
    }

    async fn create(&self, fields: &Fields) -> Res<Record> {
        let url = self.collection_url()?;
        trace!("POST {url}");
        let response = self
            .client
            .post(url.clone())
            .json(fields)
            .send()
            .await
            .with_context(|| format!("Failed to send POST request to {url}"))?;
        let body = success(response, "POST", &url).await?.json::<Value>().await?;
        decode_record(body)
    }

    async fn update(&self, id: &RecordId, fields: &Fields) -> Res<Record> {
        let url = self.record_url(id)?;
        trace!("PUT {url}");
        let response = self
            .client
            .put(url.clone())
            .json(fields)
            .send()
            .await
            .with_context(|| format!("Failed to send PUT request to {url}"))?;
        let body = success(response, "PUT", &url).await?.json::<Value>().await?;
        decode_record(body)
    }

    async fn delete(&self, id: &RecordId) -> Res<()> {
        let url = self.record_url(id)?;
        trace!("DELETE {url}");
        let response = self
            .client
            .delete(url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to send DELETE request to {url}"))?;
        success(response, "DELETE", &url).await?;
        Ok(())
    }

    async fn get_by_id(&self, id: &RecordId) -> Res<Option<Record>> {
        let url = self.record_url(id)?;
        trace!("GET {url}");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to send GET request to {url}"))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = success(response, "GET", &url).await?.json::<Value>().await?;
        decode_record(body).map(Some)
    }
}

/// Returns the response if its status is a success, otherwise an error with the status and body.
async fn success(response: Response, method: &str, url: &Url) -> Res<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read response body".to_string());
    bail!("{method} {url} failed with status {status}: {body}")
}

fn decode_list(body: Value) -> Res<Vec<Record>> {
    let Value::Array(items) = body else {
        bail!("Expected a JSON array of records");
    };
    items
        .into_iter()
        .enumerate()
        .map(|(ix, item)| {
            serde_json::from_value(item)
                .with_context(|| format!("The record at index {ix} could not be decoded"))
        })
        .collect()
}

fn decode_record(body: Value) -> Res<Record> {
    serde_json::from_value(body).context("The record returned by the store could not be decoded")
}
