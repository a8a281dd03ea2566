//! Content management backend holding the editable project entries.
use crate::config::ContentfulConfig;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

pub const LOCALE: &str = "en-US";

const RATE_LIMIT_RESET: &str = "x-contentful-ratelimit-reset";
const VERSION: &str = "x-contentful-version";
const MANAGEMENT_CONTENT: &str = "application/vnd.contentful.management.v1+json";

/// Failure reported by the content backend.
///
/// `rate_limit_reset` is the number of seconds the backend asks us to wait
/// before trying again. Absent or negative means the call is not worth
/// retrying.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("content backend error ({status:?}): {message}")]
pub struct BackendError {
    pub status: Option<u16>,
    pub message: String,
    pub rate_limit_reset: Option<i64>,
}

impl BackendError {
    pub fn new<M: Into<String>>(status: Option<u16>, message: M) -> Self {
        BackendError {
            status,
            message: message.into(),
            rate_limit_reset: None,
        }
    }

    pub fn rate_limited(reset_secs: i64) -> Self {
        BackendError {
            status: Some(StatusCode::TOO_MANY_REQUESTS.as_u16()),
            message: "rate limit exceeded".into(),
            rate_limit_reset: Some(reset_secs),
        }
    }

    /// How long to wait before retrying, if the error is a usable rate-limit
    /// signal.
    pub fn retry_after(&self) -> Option<Duration> {
        self.rate_limit_reset
            .and_then(|secs| u64::try_from(secs).ok())
            .map(Duration::from_secs)
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        BackendError::new(e.status().map(|s| s.as_u16()), e.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntrySys {
    pub id: String,
    pub version: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub sys: EntrySys,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl Entry {
    pub fn new<I: Into<String>>(id: I, version: u64) -> Self {
        Entry {
            sys: EntrySys {
                id: id.into(),
                version,
            },
            fields: Map::new(),
        }
    }

    pub fn field(&self, name: &str, locale: &str) -> Option<&Value> {
        self.fields.get(name).and_then(|localized| localized.get(locale))
    }

    pub fn set_field(&mut self, name: &str, locale: &str, value: Value) {
        let localized = self
            .fields
            .entry(name.to_string())
            .or_insert_with(|| Value::Object(Map::new()));

        match localized {
            Value::Object(map) => {
                map.insert(locale.to_string(), value);
            }
            other => {
                let mut map = Map::new();
                map.insert(locale.to_string(), value);
                *other = Value::Object(map);
            }
        }
    }
}

/// Entry filter: a content type plus exact-match field values.
#[derive(Clone, Debug, PartialEq)]
pub struct EntryQuery {
    pub content_type: String,
    pub fields: Vec<(String, String)>,
}

impl EntryQuery {
    pub fn new<C: Into<String>>(content_type: C) -> Self {
        EntryQuery {
            content_type: content_type.into(),
            fields: Vec::new(),
        }
    }

    pub fn field<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("content_type".to_string(), self.content_type.clone())];
        pairs.extend(
            self.fields
                .iter()
                .map(|(name, value)| (format!("fields.{name}"), value.clone())),
        );
        pairs
    }
}

#[async_trait]
pub trait ContentBackend: Send + Sync {
    async fn query_entries(&self, query: &EntryQuery) -> Result<Vec<Entry>, BackendError>;
    async fn update_entry(&self, entry: &Entry) -> Result<Entry, BackendError>;
    async fn publish_entry(&self, entry: &Entry) -> Result<(), BackendError>;
}

#[derive(Deserialize)]
struct EntryCollection {
    items: Vec<Entry>,
}

#[derive(Serialize)]
struct EntryUpdate<'a> {
    fields: &'a Map<String, Value>,
}

/// Contentful content management API client.
pub struct ContentfulBackend {
    client: reqwest::Client,
    entries_url: String,
    access_token: String,
}

impl ContentfulBackend {
    pub fn new(config: &ContentfulConfig) -> Result<Self, BackendError> {
        let entries_url = format!(
            "{}/spaces/{}/environments/{}/entries",
            config.api_url.trim_end_matches('/'),
            config.space_id,
            config.environment_id,
        );

        Ok(ContentfulBackend {
            client: reqwest::Client::builder().build()?,
            entries_url,
            access_token: config.access_token.clone(),
        })
    }

    fn collection_url(&self) -> Result<Url, BackendError> {
        Url::parse(&self.entries_url)
            .map_err(|e| BackendError::new(None, format!("invalid URL: {e}")))
    }

    fn entry_url(&self, path: &str) -> Result<Url, BackendError> {
        Url::parse(&format!("{}/", self.entries_url))
            .and_then(|base| base.join(path))
            .map_err(|e| BackendError::new(None, format!("invalid URL: {e}")))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, BackendError> {
        let response = request
            .header(AUTHORIZATION, format!("Bearer {}", self.access_token))
            .header(CONTENT_TYPE, MANAGEMENT_CONTENT)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let rate_limit_reset = if status == StatusCode::TOO_MANY_REQUESTS {
            response
                .headers()
                .get(RATE_LIMIT_RESET)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<i64>().ok())
        } else {
            None
        };
        let message = response.text().await.unwrap_or_default();

        Err(BackendError {
            status: Some(status.as_u16()),
            message,
            rate_limit_reset,
        })
    }
}

#[async_trait]
impl ContentBackend for ContentfulBackend {
    async fn query_entries(&self, query: &EntryQuery) -> Result<Vec<Entry>, BackendError> {
        let url = self.collection_url()?;
        let request = self.client.get(url).query(&query.to_query_pairs());
        let collection: EntryCollection = self.send(request).await?.json().await?;
        Ok(collection.items)
    }

    async fn update_entry(&self, entry: &Entry) -> Result<Entry, BackendError> {
        let url = self.entry_url(&entry.sys.id)?;
        let request = self
            .client
            .put(url)
            .header(VERSION, entry.sys.version)
            .json(&EntryUpdate {
                fields: &entry.fields,
            });
        Ok(self.send(request).await?.json().await?)
    }

    async fn publish_entry(&self, entry: &Entry) -> Result<(), BackendError> {
        let url = self.entry_url(&format!("{}/published", entry.sys.id))?;
        let request = self.client.put(url).header(VERSION, entry.sys.version);
        self.send(request).await?;
        Ok(())
    }
}
