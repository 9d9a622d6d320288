//! Remote message store client
//!
//! Talks to a [`StoreServer`](super::StoreServer) over HTTP. Every call is a
//! full snapshot read or a full list replace; nothing is cached here.

use super::server::{AppendRequest, ErrorResponse, ReplaceRequest, SnapshotResponse};
use super::store::{MessageStore, Result, SessionRefresher, StoreError};
use super::{AccountId, AccountSnapshot, Message, MessageId, MessageKind};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct AppendResponse {
    id: MessageId,
}

/// HTTP client for a remote store
#[derive(Debug, Clone)]
pub struct RemoteStore {
    /// Base URL of the store server
    host: String,
    /// Optional bearer token
    token: Option<String>,
    /// HTTP client
    client: reqwest::Client,
}

impl RemoteStore {
    /// Create a client for the given base URL
    pub fn new(host: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            host: host.into().trim_end_matches('/').to_string(),
            token: None,
            client,
        })
    }

    /// Attach a bearer token to every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }

    /// URL under `/accounts/{account}` with the account id escaped as one segment
    fn account_url(&self, account: &AccountId, suffix: &str) -> String {
        self.url(&format!(
            "/accounts/{}{}",
            urlencoding::encode(account.as_str()),
            suffix
        ))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    /// Provision an empty account on the server
    pub async fn provision(&self, account: &AccountId) -> Result<()> {
        let response = self
            .authorize(self.client.post(self.account_url(account, "")))
            .send()
            .await?;
        check_status(account, response).await.map(|_| ())
    }

    /// Admin append through the server, which inserts at the head
    pub async fn append(
        &self,
        account: &AccountId,
        kind: MessageKind,
        text: impl Into<String>,
        sender: Option<String>,
    ) -> Result<MessageId> {
        let request = AppendRequest {
            kind,
            text: text.into(),
            sender,
        };
        let response = self
            .authorize(
                self.client
                    .post(self.account_url(account, "/messages")),
            )
            .json(&request)
            .send()
            .await?;
        let body: AppendResponse = check_status(account, response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        Ok(body.id)
    }

    /// Hit the health endpoint
    pub async fn health(&self) -> Result<()> {
        let response = self.client.get(self.url("/health")).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!(
                "health check returned {}",
                response.status()
            )))
        }
    }
}

/// Map a non-success status into the store error taxonomy
async fn check_status(
    account: &AccountId,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .json::<ErrorResponse>()
        .await
        .map(|e| e.error)
        .unwrap_or_else(|_| status.to_string());

    Err(match status {
        StatusCode::NOT_FOUND => StoreError::AccountNotFound(account.to_string()),
        StatusCode::CONFLICT | StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            StoreError::Rejected(message)
        }
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
            StoreError::Unavailable(message)
        }
        _ => StoreError::Rejected(message),
    })
}

#[async_trait]
impl MessageStore for RemoteStore {
    async fn get_snapshot(&self, account: &AccountId) -> Result<AccountSnapshot> {
        let response = self
            .authorize(
                self.client
                    .get(self.account_url(account, "/snapshot")),
            )
            .send()
            .await?;
        let response = check_status(account, response).await?;

        let body: SnapshotResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        let snapshot = AccountSnapshot::new(body.messages);

        if snapshot.unread_count() != body.unread_count {
            tracing::debug!(
                account = %account,
                reported = body.unread_count,
                derived = snapshot.unread_count(),
                "Server unread count disagrees with message list; using derived count"
            );
        }
        Ok(snapshot)
    }

    async fn replace_messages(&self, account: &AccountId, messages: Vec<Message>) -> Result<()> {
        let response = self
            .authorize(
                self.client
                    .put(self.account_url(account, "/messages")),
            )
            .json(&ReplaceRequest { messages })
            .send()
            .await?;
        check_status(account, response).await.map(|_| ())
    }
}

#[async_trait]
impl SessionRefresher for RemoteStore {
    /// The reference server has no sessions; a health probe stands in for
    /// re-establishing the connection after the client regains focus.
    async fn refresh(&self) -> Result<()> {
        self.health().await
    }
}
