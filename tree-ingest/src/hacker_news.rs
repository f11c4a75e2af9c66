#![doc = "Hacker News item source: bridges the core ItemSource trait to the public Firebase API."]
//
//! # Hacker News source
//!
//! Implements [`ItemSource`] against `https://hacker-news.firebaseio.com/v0`:
//!
//! - `GET {base}/{list}stories.json` returns up to 500 ids for a story list; the root
//!   set is the first `count` of those, each fetched as a full item.
//! - `GET {base}/item/{id}.json` returns one item, or `null` when the id is unknown.
//!
//! No retry happens here. A failed request fails the ingestion task that made it.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use tree_ingest_core::contract::{Item, ItemId, ItemSource};
use tree_ingest_core::error::SourceError;

pub const DEFAULT_BASE_URL: &str = "https://hacker-news.firebaseio.com/v0";

const USER_AGENT: &str = concat!("tree-ingest/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_ROOT_FETCH_CONCURRENCY: usize = 5;

/// The story lists the API publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoryList {
    #[default]
    Top,
    New,
    Best,
    Ask,
    Show,
    Job,
}

impl StoryList {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoryList::Top => "top",
            StoryList::New => "new",
            StoryList::Best => "best",
            StoryList::Ask => "ask",
            StoryList::Show => "show",
            StoryList::Job => "job",
        }
    }

    /// Path of the id list endpoint, relative to the API base.
    pub fn endpoint(&self) -> String {
        format!("{}stories.json", self.as_str())
    }
}

pub struct HackerNewsClient {
    http: reqwest::Client,
    base_url: String,
    list: StoryList,
    root_fetch_concurrency: usize,
}

impl HackerNewsClient {
    pub fn new(base_url: Option<&str>, list: StoryList) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                error!(error = ?e, "Failed to build HTTP client");
                SourceError::Transport(e.to_string())
            })?;
        let base_url = base_url
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        info!(base_url = %base_url, list = list.as_str(), "Initialized HackerNewsClient");
        Ok(Self {
            http,
            base_url,
            list,
            root_fetch_concurrency: DEFAULT_ROOT_FETCH_CONCURRENCY,
        })
    }

    /// How many root items are fetched at once while building the root set.
    pub fn with_root_fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.root_fetch_concurrency = concurrency.max(1);
        self
    }

    pub fn item_url(&self, id: ItemId) -> String {
        format!("{}/item/{}.json", self.base_url, id)
    }

    pub fn list_url(&self) -> String {
        format!("{}/{}", self.base_url, self.list.endpoint())
    }

    async fn get_text(&self, url: &str) -> Result<String, SourceError> {
        let resp = self.http.get(url).send().await.map_err(|e| {
            error!(error = ?e, url = %url, "Request to Hacker News failed");
            SourceError::Transport(e.to_string())
        })?;

        let status = resp.status();
        if !status.is_success() {
            error!(status = %status, url = %url, "Hacker News returned error status");
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        resp.text()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, SourceError> {
    serde_json::from_str(body).map_err(|e| SourceError::Decode(e.to_string()))
}

/// Decode an item payload; the API answers `null` for ids it doesn't know.
pub fn decode_item(body: &str, id: ItemId) -> Result<Item, SourceError> {
    decode::<Option<Item>>(body)?.ok_or(SourceError::NotFound { id })
}

/// Decode a story list payload (a JSON array of ids).
pub fn decode_id_list(body: &str) -> Result<Vec<ItemId>, SourceError> {
    decode(body)
}

#[async_trait]
impl ItemSource for HackerNewsClient {
    async fn fetch_root_set(&self, count: usize) -> Result<Vec<Item>, SourceError> {
        let url = self.list_url();
        debug!(url = %url, count, "Fetching story list");
        let mut ids = decode_id_list(&self.get_text(&url).await?)?;
        ids.truncate(count);
        info!(list = self.list.as_str(), stories = ids.len(), "Story list returned");

        stream::iter(ids)
            .map(|id| self.fetch_item(id))
            .buffered(self.root_fetch_concurrency)
            .try_collect()
            .await
    }

    async fn fetch_item(&self, id: ItemId) -> Result<Item, SourceError> {
        let url = self.item_url(id);
        let body = self.get_text(&url).await?;
        decode_item(&body, id)
    }
}
