use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

use crate::config::{Config, DEFAULT_BASE_URL};
use crate::error::SyncError;
use crate::model::{
    ContactRecord, Outcome, EMAIL_NOT_FOUND, EMAIL_UPDATED, TRANSACTIONAL_NOT_FOUND,
    TRANSACTIONAL_UNBLOCKED,
};

/// How a response status code turns into an [`Outcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseRule {
    /// Success without a body worth keeping.
    Sentinel(&'static str),
    /// Success carrying a JSON body.
    Payload,
    /// Expected negative answer; logged as a warning, not an error.
    NotFound(&'static str),
}

/// One remote operation and its status-code table. Codes missing from the
/// table are fatal.
#[derive(Debug, Clone, Copy)]
pub struct Endpoint {
    pub operation: &'static str,
    pub rules: &'static [(u16, ResponseRule)],
}

pub const UPSERT_CONTACTS: Endpoint = Endpoint {
    operation: "send data to",
    rules: &[
        (204, ResponseRule::Sentinel(EMAIL_UPDATED)),
        (200, ResponseRule::Payload),
        (404, ResponseRule::NotFound(EMAIL_NOT_FOUND)),
    ],
};

pub const DELETE_BLOCKED_CONTACT: Endpoint = Endpoint {
    operation: "delete data from",
    rules: &[
        (204, ResponseRule::Sentinel(TRANSACTIONAL_UNBLOCKED)),
        (404, ResponseRule::NotFound(TRANSACTIONAL_NOT_FOUND)),
    ],
};

impl Endpoint {
    pub fn rule_for(&self, status: u16) -> Option<ResponseRule> {
        self.rules
            .iter()
            .find(|(code, _)| *code == status)
            .map(|(_, rule)| *rule)
    }

    /// Translate a raw response into an outcome without touching the network.
    pub fn resolve(&self, status: u16, body: &str) -> Result<Outcome> {
        match self.rule_for(status) {
            Some(ResponseRule::Sentinel(text)) => Ok(Outcome::Sentinel(text)),
            Some(ResponseRule::Payload) => {
                let value: Value = serde_json::from_str(body)
                    .with_context(|| format!("invalid JSON in {} response", status))?;
                Ok(Outcome::Structured(value))
            }
            Some(ResponseRule::NotFound(text)) => {
                warn!("API returned {} status. Response: {}", status, body);
                Ok(Outcome::Sentinel(text))
            }
            None => Err(SyncError::Api {
                operation: self.operation,
                status,
                body: body.to_string(),
            }
            .into()),
        }
    }
}

/// Remote contact operations used by the sync run.
#[async_trait]
pub trait ContactsService: Send + Sync {
    async fn upsert_batch(&self, contacts: &[ContactRecord]) -> Result<Outcome>;

    async fn delete_blocked_contact(&self, email: &str) -> Result<Outcome>;
}

#[derive(Serialize)]
struct UpsertBody<'a> {
    contacts: &'a [ContactRecord],
}

#[derive(Clone)]
pub struct BrevoClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl fmt::Debug for BrevoClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrevoClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl BrevoClient {
    pub fn new(api_key: String) -> Result<Self> {
        let base_url = Url::parse(DEFAULT_BASE_URL).context("invalid default API URL")?;
        Self::with_base_url(api_key, base_url)
    }

    /// `base_url` may carry a path prefix; endpoint paths are appended to it.
    pub fn with_base_url(api_key: String, base_url: Url) -> Result<Self> {
        let base_url = as_directory(base_url);
        let http = Client::builder()
            .user_agent(concat!("brevo-contact-sync/", env!("CARGO_PKG_VERSION")))
            .no_proxy()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let base_url = cfg.brevo.url().map_err(SyncError::from)?;
        Self::with_base_url(cfg.brevo.api_key.clone(), base_url)
    }

    pub fn build_upsert_request(&self, contacts: &[ContactRecord]) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join("v3/contacts/batch")
            .context("invalid API base URL")?;
        self.http
            .post(endpoint)
            .header("Content-Type", "application/json")
            .header("api-key", &self.api_key)
            .json(&UpsertBody { contacts })
            .build()
            .context("failed to build upsert request")
    }

    pub fn build_delete_request(&self, email: &str) -> Result<reqwest::Request> {
        let mut endpoint = self
            .base_url
            .join("v3/smtp/blockedContacts/")
            .context("invalid API base URL")?;
        endpoint
            .path_segments_mut()
            .map_err(|_| anyhow!("API base URL cannot carry a path"))?
            .pop_if_empty()
            .push(email);
        self.http
            .delete(endpoint)
            .header("accept", "application/json")
            .header("api-key", &self.api_key)
            .build()
            .context("failed to build delete request")
    }

    async fn execute(&self, endpoint: &Endpoint, request: reqwest::Request) -> Result<Outcome> {
        debug!(method=%request.method(), url=%request.url(), "sending API request");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach the contacts API")?;
        let status = res.status().as_u16();
        let body = res.text().await.context("failed to read API response")?;
        debug!(status, "received API response");
        endpoint.resolve(status, &body)
    }
}

/// Ensure the path ends in `/` so `Url::join` keeps its last segment.
fn as_directory(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[async_trait]
impl ContactsService for BrevoClient {
    async fn upsert_batch(&self, contacts: &[ContactRecord]) -> Result<Outcome> {
        let request = self.build_upsert_request(contacts)?;
        self.execute(&UPSERT_CONTACTS, request).await
    }

    async fn delete_blocked_contact(&self, email: &str) -> Result<Outcome> {
        let request = self.build_delete_request(email)?;
        self.execute(&DELETE_BLOCKED_CONTACT, request).await
    }
}
