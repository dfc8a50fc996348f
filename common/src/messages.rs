// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Inbox message model as reported by the backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identifiers::MessageId;

/// Delivery status of an inbox message.
///
/// Statuses form a chain ordered by their wire code. A status only ever
/// advances along the chain; a merge that would move it backwards is treated
/// as an un-acknowledged local change instead (see the core client).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum MessageStatus {
    Created,
    Delivered,
    Read,
    Opened,
    DeletedByUser,
    DeletedFromService,
}

#[derive(Debug, Error)]
#[error("invalid inbox message status code: {0}")]
pub struct InvalidStatusCode(pub i64);

impl MessageStatus {
    pub fn code(self) -> i64 {
        match self {
            MessageStatus::Created => 0,
            MessageStatus::Delivered => 1,
            MessageStatus::Read => 2,
            MessageStatus::Opened => 3,
            MessageStatus::DeletedByUser => 4,
            MessageStatus::DeletedFromService => 5,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(MessageStatus::Created),
            1 => Some(MessageStatus::Delivered),
            2 => Some(MessageStatus::Read),
            3 => Some(MessageStatus::Opened),
            4 => Some(MessageStatus::DeletedByUser),
            5 => Some(MessageStatus::DeletedFromService),
            _ => None,
        }
    }

    /// Whether `self` comes strictly before `other` in the status chain.
    pub fn is_below(self, other: MessageStatus) -> bool {
        self.code() < other.code()
    }

    /// All statuses strictly below `self` in the chain.
    pub fn statuses_below(self) -> Vec<MessageStatus> {
        [
            MessageStatus::Created,
            MessageStatus::Delivered,
            MessageStatus::Read,
            MessageStatus::Opened,
            MessageStatus::DeletedByUser,
            MessageStatus::DeletedFromService,
        ]
        .into_iter()
        .filter(|status| status.is_below(self))
        .collect()
    }

    /// Statuses of messages that are visible in the inbox.
    pub fn actual_statuses() -> Vec<MessageStatus> {
        MessageStatus::DeletedByUser.statuses_below()
    }

    pub fn is_read(self) -> bool {
        matches!(self, MessageStatus::Read | MessageStatus::Opened)
    }

    pub fn is_action_performed(self) -> bool {
        matches!(self, MessageStatus::Opened)
    }

    pub fn is_deleted(self) -> bool {
        matches!(
            self,
            MessageStatus::DeletedByUser | MessageStatus::DeletedFromService
        )
    }
}

impl TryFrom<i64> for MessageStatus {
    type Error = InvalidStatusCode;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(InvalidStatusCode(code))
    }
}

impl From<MessageStatus> for i64 {
    fn from(status: MessageStatus) -> Self {
        status.code()
    }
}

/// How a message first entered the local store.
///
/// Push-received messages have no server-side order or hash yet; the next
/// full sync replaces them with the authoritative service copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum MessageSource {
    Push,
    Service,
}

#[derive(Debug, Error)]
#[error("invalid inbox message source code: {0}")]
pub struct InvalidSourceCode(pub i64);

impl MessageSource {
    pub fn code(self) -> i64 {
        match self {
            MessageSource::Push => 0,
            MessageSource::Service => 1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(MessageSource::Push),
            1 => Some(MessageSource::Service),
            _ => None,
        }
    }
}

impl TryFrom<i64> for MessageSource {
    type Error = InvalidSourceCode;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(InvalidSourceCode(code))
    }
}

impl From<MessageSource> for i64 {
    fn from(source: MessageSource) -> Self {
        source.code()
    }
}

/// Kind of action attached to a message, derived from the payload shape when
/// the backend does not report it explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum MessageKind {
    Plain,
    RichMedia,
    Url,
    DeepLink,
    RemoteUrl,
}

#[derive(Debug, Error)]
#[error("invalid inbox message kind code: {0}")]
pub struct InvalidKindCode(pub i64);

impl MessageKind {
    pub fn code(self) -> i64 {
        match self {
            MessageKind::Plain => 0,
            MessageKind::RichMedia => 1,
            MessageKind::Url => 2,
            MessageKind::DeepLink => 3,
            MessageKind::RemoteUrl => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(MessageKind::Plain),
            1 => Some(MessageKind::RichMedia),
            2 => Some(MessageKind::Url),
            3 => Some(MessageKind::DeepLink),
            4 => Some(MessageKind::RemoteUrl),
            _ => None,
        }
    }

    /// Derives the kind from the action parameters of a payload.
    pub fn derive(payload: &MessagePayload) -> Self {
        let params = &payload.action_params;
        if params.get("rm").is_some() {
            return MessageKind::RichMedia;
        }
        if params.get("r").is_some() {
            return MessageKind::RemoteUrl;
        }
        if let Some(link) = params.get("l").and_then(|link| link.as_str()) {
            if link.starts_with("http://") || link.starts_with("https://") {
                return MessageKind::Url;
            }
            return MessageKind::DeepLink;
        }
        MessageKind::Plain
    }
}

impl TryFrom<i64> for MessageKind {
    type Error = InvalidKindCode;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(InvalidKindCode(code))
    }
}

impl From<MessageKind> for i64 {
    fn from(kind: MessageKind) -> Self {
        kind.code()
    }
}

/// Displayable content of an inbox message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "text", default)]
    pub body: String,
    #[serde(rename = "image", default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub action_params: serde_json::Value,
    #[serde(default)]
    pub hash: Option<String>,
}

impl MessagePayload {
    pub fn new(title: Option<String>, body: impl Into<String>) -> Self {
        Self {
            title,
            body: body.into(),
            image_url: None,
            action_params: serde_json::Value::Null,
            hash: None,
        }
    }
}

/// One message as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDescriptor {
    #[serde(rename = "inbox_id")]
    pub id: MessageId,
    #[serde(rename = "order", default)]
    pub order: i64,
    #[serde(rename = "send_date", with = "chrono::serde::ts_seconds")]
    pub sent_at: DateTime<Utc>,
    #[serde(rename = "expired_date", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
    #[serde(rename = "inbox_status")]
    pub status: MessageStatus,
    #[serde(rename = "action_type", default)]
    pub action_kind: Option<i64>,
    #[serde(flatten)]
    pub payload: MessagePayload,
}

impl MessageDescriptor {
    /// Kind reported by the backend, or derived from the payload shape.
    pub fn kind(&self) -> MessageKind {
        self.action_kind
            .and_then(MessageKind::from_code)
            .unwrap_or_else(|| MessageKind::derive(&self.payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_chain_is_strict() {
        assert!(MessageStatus::Created.is_below(MessageStatus::Delivered));
        assert!(MessageStatus::Read.is_below(MessageStatus::Opened));
        assert!(!MessageStatus::Opened.is_below(MessageStatus::Read));
        assert!(!MessageStatus::DeletedFromService.is_below(MessageStatus::DeletedFromService));
    }

    #[test]
    fn actual_statuses_exclude_deleted() {
        let actual = MessageStatus::actual_statuses();
        assert_eq!(
            actual,
            vec![
                MessageStatus::Created,
                MessageStatus::Delivered,
                MessageStatus::Read,
                MessageStatus::Opened,
            ]
        );
    }

    #[test]
    fn kind_is_derived_from_action_params() {
        let mut payload = MessagePayload::new(None, "hello");
        assert_eq!(MessageKind::derive(&payload), MessageKind::Plain);

        payload.action_params = serde_json::json!({ "l": "https://example.com" });
        assert_eq!(MessageKind::derive(&payload), MessageKind::Url);

        payload.action_params = serde_json::json!({ "l": "app://settings" });
        assert_eq!(MessageKind::derive(&payload), MessageKind::DeepLink);

        payload.action_params = serde_json::json!({ "rm": { "url": "..." } });
        assert_eq!(MessageKind::derive(&payload), MessageKind::RichMedia);
    }

    #[test]
    fn descriptor_parses_from_wire_json() {
        let descriptor: MessageDescriptor = serde_json::from_value(serde_json::json!({
            "inbox_id": "m-1",
            "order": 42,
            "send_date": 1_754_000_000,
            "expired_date": 1_786_000_000,
            "inbox_status": 1,
            "title": "Greetings",
            "text": "hello",
            "image": null,
            "action_params": { "l": "https://example.com" },
            "hash": "abc123"
        }))
        .unwrap();
        assert_eq!(descriptor.id, MessageId::from("m-1"));
        assert_eq!(descriptor.order, 42);
        assert_eq!(descriptor.status, MessageStatus::Delivered);
        assert_eq!(descriptor.kind(), MessageKind::Url);
        assert_eq!(descriptor.payload.body, "hello");
    }
}
