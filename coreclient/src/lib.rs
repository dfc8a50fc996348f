// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Client-side inbox engine: a local message store kept consistent with the
//! authoritative backend list under partial updates, deletions, concurrent
//! access and app identity changes.

mod client_record;
mod errors;
mod messages;
mod module;
mod repository;
mod store;

pub use errors::{InboxError, ModuleError, StoreError};
pub use messages::InboxMessage;
pub use module::{DEFAULT_MIN_UPDATE_INTERVAL, InboxConfig, InboxModule};
pub use repository::{InboxApi, InboxRepository, LoadResult, RefreshGate, RefreshGuard};
pub use store::{InboxStorage, MergeOutcome, MergeResult, StoreNotification, StoreResult};

#[cfg(test)]
pub(crate) mod testutils {
    use std::sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};
    use inboxapiclient::inbox_api::{GetInboxMessagesResponse, InboxRequestError};
    use inboxcommon::{
        identifiers::{MessageId, UserId},
        messages::{
            MessageDescriptor, MessageKind, MessagePayload, MessageSource, MessageStatus,
        },
    };

    use crate::{InboxMessage, repository::InboxApi};

    pub(crate) fn service_message(id: &str, order: i64, status: MessageStatus) -> InboxMessage {
        InboxMessage {
            id: id.into(),
            order,
            sent_at: sent_at(order),
            expires_at: Utc::now() + Duration::days(30),
            payload: MessagePayload::new(Some("Title".to_owned()), format!("body {order}")),
            kind: MessageKind::Plain,
            status,
            source: MessageSource::Service,
        }
    }

    pub(crate) fn service_descriptor(
        id: &str,
        order: i64,
        status: MessageStatus,
    ) -> MessageDescriptor {
        MessageDescriptor {
            id: id.into(),
            order,
            sent_at: sent_at(order),
            expires_at: Utc::now() + Duration::days(30),
            status,
            action_kind: None,
            payload: MessagePayload::new(Some("Title".to_owned()), format!("body {order}")),
        }
    }

    fn sent_at(order: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_754_000_000 + order, 0).expect("valid timestamp")
    }

    pub(crate) fn snapshot(
        messages: Vec<MessageDescriptor>,
        deleted: Vec<MessageId>,
    ) -> GetInboxMessagesResponse {
        GetInboxMessagesResponse {
            messages,
            deleted,
            new_inbox_count: 0,
        }
    }

    /// In-memory backend double recording calls.
    #[derive(Default)]
    pub(crate) struct StubApi {
        snapshot: Mutex<GetInboxMessagesResponse>,
        fail_next_fetch: AtomicBool,
        fetch_calls: AtomicUsize,
        acknowledged: Mutex<Vec<(i64, MessageStatus)>>,
    }

    impl StubApi {
        pub(crate) fn set_snapshot(&self, snapshot: GetInboxMessagesResponse) {
            *self.snapshot.lock().unwrap() = snapshot;
        }

        pub(crate) fn fail_next_fetch(&self) {
            self.fail_next_fetch.store(true, Ordering::SeqCst);
        }

        pub(crate) fn fetch_calls(&self) -> usize {
            self.fetch_calls.load(Ordering::SeqCst)
        }

        pub(crate) fn acknowledged(&self) -> Vec<(i64, MessageStatus)> {
            self.acknowledged.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InboxApi for StubApi {
        async fn fetch_messages(
            &self,
            _user: &UserId,
        ) -> Result<GetInboxMessagesResponse, InboxRequestError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_next_fetch.swap(false, Ordering::SeqCst) {
                return Err(InboxRequestError::BackendError(500));
            }
            Ok(self.snapshot.lock().unwrap().clone())
        }

        async fn acknowledge_status(
            &self,
            _user: &UserId,
            order: i64,
            status: MessageStatus,
            _hash: Option<&str>,
        ) -> Result<(), InboxRequestError> {
            self.acknowledged.lock().unwrap().push((order, status));
            Ok(())
        }
    }
}
