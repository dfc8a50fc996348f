// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use chrono::{DateTime, Duration, Utc};
use inboxcommon::{
    identifiers::MessageId,
    messages::{MessageDescriptor, MessageKind, MessagePayload, MessageSource, MessageStatus},
};

pub(crate) mod persistence;

/// Time a push-received message stays visible before the backend reports an
/// authoritative expiry for it.
const DEFAULT_PUSH_TTL_DAYS: i64 = 365;

/// One inbox message as held in the local store.
#[derive(Debug, Clone, PartialEq)]
pub struct InboxMessage {
    pub id: MessageId,
    // Monotonic pagination key assigned by the backend. Push-received
    // messages carry 0 until the next sync replaces them.
    pub order: i64,
    pub sent_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub payload: MessagePayload,
    pub kind: MessageKind,
    pub status: MessageStatus,
    pub source: MessageSource,
}

impl InboxMessage {
    /// Builds the stored representation of a backend-reported message.
    pub fn from_descriptor(descriptor: MessageDescriptor) -> Self {
        let kind = descriptor.kind();
        Self {
            id: descriptor.id,
            order: descriptor.order,
            sent_at: descriptor.sent_at,
            expires_at: descriptor.expires_at,
            payload: descriptor.payload,
            kind,
            status: descriptor.status,
            source: MessageSource::Service,
        }
    }

    /// Builds a message first seen via a push receipt.
    pub fn from_push(id: MessageId, payload: MessagePayload) -> Self {
        let now = Utc::now();
        let kind = MessageKind::derive(&payload);
        Self {
            id,
            order: 0,
            sent_at: now,
            expires_at: now + Duration::days(DEFAULT_PUSH_TTL_DAYS),
            payload,
            kind,
            status: MessageStatus::Delivered,
            source: MessageSource::Push,
        }
    }

    pub fn id(&self) -> &MessageId {
        &self.id
    }

    pub fn status(&self) -> MessageStatus {
        self.status
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_read(&self) -> bool {
        self.status.is_read()
    }

    pub fn is_deleted(&self) -> bool {
        self.status.is_deleted()
    }

    /// Whether the stored content differs from `other` beyond the status
    /// field.
    pub(crate) fn content_differs(&self, other: &InboxMessage) -> bool {
        self.order != other.order
            || self.sent_at != other.sent_at
            || self.expires_at != other.expires_at
            || self.payload != other.payload
            || self.kind != other.kind
    }
}
