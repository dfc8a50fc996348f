// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Endpoints for fetching the inbox message list and acknowledging status
//! changes.

use inboxcommon::{
    identifiers::{MessageId, UserId},
    messages::{MessageDescriptor, MessageStatus},
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::debug;

use crate::ApiClient;

pub const ENDPOINT_GET_INBOX_MESSAGES: &str = "json/1.3/getInboxMessages";
pub const ENDPOINT_INBOX_STATUS: &str = "json/1.3/inboxStatus";

#[derive(Error, Debug)]
pub enum InboxRequestError {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error("Invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Unexpected response status: {0}")]
    UnexpectedStatus(StatusCode),
    #[error("Backend reported error code {0}")]
    BackendError(i64),
    #[error("Malformed response payload")]
    MalformedResponse(#[source] serde_json::Error),
}

// The backend wraps every request and response in an envelope.

#[derive(Debug, Serialize)]
struct RequestEnvelope<T: Serialize> {
    request: T,
}

#[derive(Debug, Deserialize)]
struct ResponseEnvelope<T> {
    status_code: i64,
    response: Option<T>,
}

#[derive(Debug, Serialize)]
struct GetInboxMessagesRequest<'a> {
    application: &'a str,
    #[serde(rename = "userId")]
    user_id: &'a str,
}

/// Message list reported by the backend.
///
/// `messages` is the authoritative full snapshot; `deleted` is the explicit
/// deletion channel for ids the snapshot no longer carries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetInboxMessagesResponse {
    #[serde(default)]
    pub messages: Vec<MessageDescriptor>,
    #[serde(default)]
    pub deleted: Vec<MessageId>,
    #[serde(rename = "new_inbox", default)]
    pub new_inbox_count: u32,
}

#[derive(Debug, Serialize)]
struct InboxStatusRequest<'a> {
    application: &'a str,
    #[serde(rename = "userId")]
    user_id: &'a str,
    inbox_code: String,
    status: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    hash: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmptyResponse {}

impl ApiClient {
    async fn send_inbox_request<T: Serialize, R: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: T,
    ) -> Result<Option<R>, InboxRequestError> {
        let url = self.endpoint_url(endpoint)?;
        let response = self
            .client
            .post(url)
            .json(&RequestEnvelope { request })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(InboxRequestError::UnexpectedStatus(status));
        }
        let body = response.bytes().await?;
        let envelope: ResponseEnvelope<R> =
            serde_json::from_slice(&body).map_err(InboxRequestError::MalformedResponse)?;
        if envelope.status_code != 200 {
            return Err(InboxRequestError::BackendError(envelope.status_code));
        }
        Ok(envelope.response)
    }

    /// Fetches the inbox message list for the given user.
    pub async fn get_inbox_messages(
        &self,
        user_id: &UserId,
    ) -> Result<GetInboxMessagesResponse, InboxRequestError> {
        let request = GetInboxMessagesRequest {
            application: self.app_code().as_str(),
            user_id: user_id.as_str(),
        };
        let response: GetInboxMessagesResponse = self
            .send_inbox_request(ENDPOINT_GET_INBOX_MESSAGES, request)
            .await?
            .unwrap_or_default();
        debug!(
            messages = response.messages.len(),
            deleted = response.deleted.len(),
            "Fetched inbox messages"
        );
        Ok(response)
    }

    /// Reports a message status change back to the backend.
    pub async fn set_inbox_status(
        &self,
        user_id: &UserId,
        order: i64,
        status: MessageStatus,
        hash: Option<&str>,
    ) -> Result<(), InboxRequestError> {
        let request = InboxStatusRequest {
            application: self.app_code().as_str(),
            user_id: user_id.as_str(),
            inbox_code: order.to_string(),
            status: status.code(),
            hash,
        };
        self.send_inbox_request::<_, EmptyResponse>(ENDPOINT_INBOX_STATUS, request)
            .await?;
        debug!(order, status = status.code(), "Acknowledged inbox status");
        Ok(())
    }
}
