//! Messaging backend transport
//!
//! This module handles the REST messaging API:
//! - `GET /chat/{userA}/{userB}` for the full conversation
//! - `POST /messages` to send
//! - `PATCH /messages/{id}` to edit
//! - `DELETE /messages/{id}` to delete
//!
//! Responses wrap their payload as `{ "data": ... }`. Statuses are mapped to
//! [`Error::Server`] (5xx), [`Error::Api`] (other non-success) and
//! [`Error::Network`] (no response).

use crate::{config::ChatConfig, message::Message, Error, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Operations the chat layer needs from the messaging backend
#[async_trait]
pub trait MessagingBackend: Send + Sync {
    /// Full ordered history between two users
    async fn fetch_conversation(&self, user_a: &str, user_b: &str) -> Result<Vec<Message>>;

    /// Store a new message and return it with its server id and timestamp
    async fn send_message(&self, request: &SendMessageRequest) -> Result<Message>;

    /// Replace the text of a message
    async fn edit_message(&self, message_id: &str, user_id: &str, text: &str) -> Result<Message>;

    /// Delete a message
    async fn delete_message(&self, message_id: &str, user_id: &str) -> Result<()>;
}

/// Body of `POST /messages`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    /// Sender user ID
    pub sender_id: String,
    /// Receiver user ID
    pub receiver_id: String,
    /// Message body
    pub text: String,
    /// ID of the message being replied to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replied_to: Option<String>,
}

/// Body of `PATCH /messages/{id}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EditMessageRequest {
    /// User performing the edit
    pub user_id: String,
    /// New message body
    pub text: String,
}

/// Body of `DELETE /messages/{id}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMessageRequest {
    /// User performing the deletion
    pub user_id: String,
}

/// The backend's `{ "data": ... }` response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct DataEnvelope<T> {
    /// Wrapped payload
    pub data: T,
}

/// HTTP implementation of [`MessagingBackend`]
#[derive(Debug, Clone)]
pub struct HttpBackend {
    /// Base URL without trailing slash (e.g., "https://portal.example.edu/api")
    base_url: Url,
    /// Bearer token for the `Authorization` header
    auth_token: Option<String>,
    /// HTTP client
    client: Client,
}

impl HttpBackend {
    /// Create a backend with the default request timeout
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_options(base_url, None, Duration::from_millis(10_000))
    }

    /// Create a backend with an optional bearer token and a request timeout
    pub fn with_options(
        base_url: &str,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(Error::Config("Backend base URL is empty".to_string()));
        }

        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("Invalid base URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!("Base URL cannot take a path: {}", base_url)));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            auth_token,
            client,
        })
    }

    /// Create a backend from a loaded configuration
    pub fn from_config(config: &ChatConfig) -> Result<Self> {
        Self::with_options(
            &config.base_url,
            config.auth_token.clone(),
            Duration::from_millis(config.request_timeout_ms),
        )
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Base URL with `segments` appended, each percent-encoded as one segment
    ///
    /// Ids are opaque: `/`, `?` and `#` inside an id stay inside its segment.
    /// Empty, `.` and `..` ids are rejected since they cannot name a resource.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        if let Some(bad) = segments.iter().find(|s| matches!(**s, "" | "." | "..")) {
            return Err(Error::Validation(format!("Invalid path segment: '{}'", bad)));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("Base URL cannot take a path: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and map transport failures and statuses to [`Error`]
    async fn execute(&self, builder: RequestBuilder) -> Result<Response> {
        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, body))
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("Failed to read response: {}", e)))?;

        let envelope: DataEnvelope<T> = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Decode(format!("Invalid response body: {}", e)))?;

        Ok(envelope.data)
    }
}

/// Map a non-success status to the matching error variant
pub fn status_error(status: StatusCode, body: String) -> Error {
    let message = if body.is_empty() {
        status.canonical_reason().unwrap_or("unknown").to_string()
    } else {
        body
    };

    if status.is_server_error() {
        Error::Server {
            status: status.as_u16(),
            message,
        }
    } else {
        Error::Api {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl MessagingBackend for HttpBackend {
    async fn fetch_conversation(&self, user_a: &str, user_b: &str) -> Result<Vec<Message>> {
        let url = self.url(&["chat", user_a, user_b])?;
        debug!("Fetching conversation {} <-> {}", user_a, user_b);

        let response = self.execute(self.client.get(url)).await?;
        Self::decode(response).await
    }

    async fn send_message(&self, request: &SendMessageRequest) -> Result<Message> {
        info!("Sending message from {} to {}", request.sender_id, request.receiver_id);

        let response = self
            .execute(self.client.post(self.url(&["messages"])?).json(request))
            .await
            .inspect_err(|e| warn!("Message send failed: {}", e))?;

        Self::decode(response).await
    }

    async fn edit_message(&self, message_id: &str, user_id: &str, text: &str) -> Result<Message> {
        info!("Editing message {}", message_id);

        let body = EditMessageRequest {
            user_id: user_id.to_string(),
            text: text.to_string(),
        };
        let url = self.url(&["messages", message_id])?;

        let response = self.execute(self.client.patch(url).json(&body)).await?;
        Self::decode(response).await
    }

    async fn delete_message(&self, message_id: &str, user_id: &str) -> Result<()> {
        info!("Deleting message {}", message_id);

        let body = DeleteMessageRequest {
            user_id: user_id.to_string(),
        };
        let url = self.url(&["messages", message_id])?;

        self.execute(self.client.delete(url).json(&body)).await?;
        Ok(())
    }
}
