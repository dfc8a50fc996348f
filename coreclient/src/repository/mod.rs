// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Orchestration of the local store, the backend and the refresh gate.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use inboxapiclient::{
    ApiClient,
    inbox_api::{GetInboxMessagesResponse, InboxRequestError},
};
use inboxcommon::{
    identifiers::{MessageId, UserId},
    messages::{MessageSource, MessageStatus},
};
use tokio_stream::Stream;
use tracing::{debug, warn};

use crate::{
    InboxMessage,
    errors::InboxError,
    store::{InboxStorage, MergeResult, StoreNotification},
};

mod gate;

pub use gate::{RefreshGate, RefreshGuard};

/// Backend operations the repository depends on.
#[async_trait]
pub trait InboxApi: Send + Sync {
    /// Fetches the full inbox snapshot for the given user.
    async fn fetch_messages(
        &self,
        user: &UserId,
    ) -> Result<GetInboxMessagesResponse, InboxRequestError>;

    /// Reports a message status change back to the backend.
    async fn acknowledge_status(
        &self,
        user: &UserId,
        order: i64,
        status: MessageStatus,
        hash: Option<&str>,
    ) -> Result<(), InboxRequestError>;
}

#[async_trait]
impl InboxApi for ApiClient {
    async fn fetch_messages(
        &self,
        user: &UserId,
    ) -> Result<GetInboxMessagesResponse, InboxRequestError> {
        self.get_inbox_messages(user).await
    }

    async fn acknowledge_status(
        &self,
        user: &UserId,
        order: i64,
        status: MessageStatus,
        hash: Option<&str>,
    ) -> Result<(), InboxRequestError> {
        self.set_inbox_status(user, order, status, hash).await
    }
}

/// Effect of one remote fetch on the local store. Event payload for
/// observers, nothing else.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LoadResult {
    pub added: Vec<MessageId>,
    pub updated: Vec<MessageId>,
    pub deleted: Vec<MessageId>,
}

impl LoadResult {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    fn from_merge(merge: &MergeResult) -> Self {
        Self {
            added: merge.new_items.clone(),
            updated: merge.updated_items.clone(),
            deleted: merge.deleted_items.clone(),
        }
    }
}

/// Access to the inbox with backend synchronization on top of the local
/// store.
pub struct InboxRepository {
    storage: InboxStorage,
    api: Arc<dyn InboxApi>,
    gate: RefreshGate,
    user: Mutex<UserId>,
}

impl InboxRepository {
    pub fn new(
        storage: InboxStorage,
        api: Arc<dyn InboxApi>,
        user: UserId,
        min_update_interval: Duration,
    ) -> Self {
        Self {
            storage,
            api,
            gate: RefreshGate::new(min_update_interval),
            user: Mutex::new(user),
        }
    }

    pub fn storage(&self) -> &InboxStorage {
        &self.storage
    }

    /// Subscribes to change-sets published after every successful mutation.
    pub fn subscribe(&self) -> impl Stream<Item = Arc<StoreNotification>> + Send + 'static {
        self.storage.subscribe()
    }

    fn current_user(&self) -> UserId {
        self.user
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Changes the user the inbox is scoped to.
    ///
    /// Staleness bookkeeping resets on the next refresh; callers that want
    /// an immediate resync use [`Self::user_changed`].
    pub fn set_user(&self, user: UserId) {
        *self
            .user
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = user;
    }

    /// Switches the user and forces a refresh against the backend.
    pub async fn user_changed(&self, user: UserId) -> Result<Option<LoadResult>, InboxError> {
        self.set_user(user);
        self.refresh(true).await
    }

    /// Synchronizes the local store with the backend.
    ///
    /// Returns `None` when another refresh is already in flight. Without
    /// `forced`, a refresh within the minimum update interval is answered
    /// from the cache with an empty result. A transport failure surfaces as
    /// an error; the staleness stamp set at the start of the attempt is
    /// kept, so a failing backend is not hammered.
    pub async fn refresh(&self, forced: bool) -> Result<Option<LoadResult>, InboxError> {
        if self.gate.is_loading() {
            debug!("Inbox refresh already in flight, skipping");
            return Ok(None);
        }
        let user = self.current_user();
        if !self.gate.check(&user) && !forced {
            debug!("Inbox state is fresh enough, skipping refresh");
            return Ok(Some(LoadResult::default()));
        }
        let _guard = self.gate.start_loading();

        // Messages received via push so far; their statuses are re-announced
        // once the backend copy with the authoritative order has landed.
        let push_messages = self
            .storage
            .all_push_messages()
            .await
            .map_err(InboxError::Storage)?;

        let response = self.api.fetch_messages(&user).await?;
        let deleted = response.deleted;
        self.storage
            .delete_list(&deleted)
            .await
            .map_err(InboxError::Storage)?;

        let incoming: Vec<InboxMessage> = response
            .messages
            .into_iter()
            .map(InboxMessage::from_descriptor)
            .collect();
        let outcome = self
            .storage
            .merge_state(&incoming, true)
            .await
            .map_err(InboxError::Storage)?;

        let mut load_result = LoadResult::default();
        if let Some(merge) = outcome.into_result() {
            for (id, status) in &merge.incorrect_statuses {
                self.acknowledge_status(id, *status).await;
            }
            load_result = LoadResult::from_merge(&merge);
        }
        load_result.deleted.extend(deleted);
        load_result.deleted.sort_unstable();
        load_result.deleted.dedup();

        for message in push_messages {
            let changed = self
                .storage
                .update_status(&message.id, message.status)
                .await
                .map_err(InboxError::Storage)?;
            if !changed.is_empty() {
                self.acknowledge_status(&message.id, message.status).await;
            }
        }

        self.emit(&load_result);
        Ok(Some(load_result))
    }

    /// Feeds a message received via push receipt into the store.
    ///
    /// A content-free payload marks a silent inbox push; the actual message
    /// only exists on the backend, so a forced refresh is triggered instead
    /// of a local insert.
    pub async fn add_message(
        &self,
        message: InboxMessage,
    ) -> Result<Option<LoadResult>, InboxError> {
        if message.payload.body.is_empty() {
            return self.refresh(true).await;
        }
        let outcome = self
            .storage
            .merge_state(std::slice::from_ref(&message), false)
            .await
            .map_err(InboxError::Storage)?;
        let Some(merge) = outcome.into_result() else {
            return Ok(None);
        };
        for (id, status) in &merge.incorrect_statuses {
            self.acknowledge_status(id, *status).await;
        }
        let load_result = LoadResult::from_merge(&merge);
        self.emit(&load_result);
        Ok(Some(load_result))
    }

    /// Moves a message to the given status, acknowledging the change to the
    /// backend where necessary.
    ///
    /// Returns the stored message unless the new status removes it from the
    /// inbox.
    pub async fn update_status(
        &self,
        id: &MessageId,
        status: MessageStatus,
    ) -> Result<Option<InboxMessage>, InboxError> {
        let changed = self
            .storage
            .update_status(id, status)
            .await
            .map_err(InboxError::Storage)?;
        let message = self
            .storage
            .actual_message(id)
            .await
            .map_err(InboxError::Storage)?;
        if !changed.is_empty() {
            if let Some(message) = &message {
                if message.source == MessageSource::Service {
                    self.send_acknowledgement(message, status).await;
                }
            }
            let notification = if status.is_deleted() {
                StoreNotification::builder().remove_many(changed)
            } else {
                StoreNotification::builder().update_many(changed)
            };
            self.storage.notify(notification.build());
        }
        Ok(message.filter(|message| !message.is_deleted()))
    }

    pub async fn mark_read(&self, id: &MessageId) -> Result<Option<InboxMessage>, InboxError> {
        self.update_status(id, MessageStatus::Read).await
    }

    pub async fn mark_action_performed(
        &self,
        id: &MessageId,
    ) -> Result<Option<InboxMessage>, InboxError> {
        self.update_status(id, MessageStatus::Opened).await
    }

    pub async fn delete_message(
        &self,
        id: &MessageId,
    ) -> Result<Option<InboxMessage>, InboxError> {
        self.update_status(id, MessageStatus::DeletedByUser).await
    }

    /// Serves one page of messages from the cache without touching the
    /// backend.
    pub async fn cached_messages(
        &self,
        before_order: Option<i64>,
        limit: u32,
    ) -> Result<Vec<InboxMessage>, InboxError> {
        self.storage
            .actual_messages_page(before_order, limit)
            .await
            .map_err(InboxError::Storage)
    }

    /// Serves one page of messages, refreshing from the backend first when
    /// the cached state is stale. A failing backend degrades to the cache.
    pub async fn messages(
        &self,
        before_order: Option<i64>,
        limit: u32,
    ) -> Result<Vec<InboxMessage>, InboxError> {
        if let Err(error) = self.refresh(false).await {
            warn!(%error, "Inbox refresh failed, serving cached messages");
        }
        self.cached_messages(before_order, limit).await
    }

    pub async fn unread_count(&self) -> Result<usize, InboxError> {
        self.storage.unread_count().await.map_err(InboxError::Storage)
    }

    pub async fn no_action_performed_count(&self) -> Result<usize, InboxError> {
        self.storage
            .no_action_performed_count()
            .await
            .map_err(InboxError::Storage)
    }

    pub async fn total_count(&self) -> Result<usize, InboxError> {
        self.storage.total_count().await.map_err(InboxError::Storage)
    }

    /// Clears the inbox by merging an empty authoritative snapshot.
    pub async fn clear_messages(&self) -> Result<Option<LoadResult>, InboxError> {
        let outcome = self
            .storage
            .merge_state(&[], true)
            .await
            .map_err(InboxError::Storage)?;
        let Some(merge) = outcome.into_result() else {
            return Ok(None);
        };
        for (id, status) in &merge.incorrect_statuses {
            self.acknowledge_status(id, *status).await;
        }
        let load_result = LoadResult::from_merge(&merge);
        self.emit(&load_result);
        Ok(Some(load_result))
    }

    /// Looks up the stored message and reports its status to the backend.
    async fn acknowledge_status(&self, id: &MessageId, status: MessageStatus) {
        let message = match self.storage.actual_message(id).await {
            Ok(message) => message,
            Err(error) => {
                warn!(%id, %error, "Failed to load message for status acknowledgement");
                return;
            }
        };
        let Some(message) = message else {
            return;
        };
        if message.source != MessageSource::Service {
            return;
        }
        self.send_acknowledgement(&message, status).await;
    }

    async fn send_acknowledgement(&self, message: &InboxMessage, status: MessageStatus) {
        let user = self.current_user();
        if let Err(error) = self
            .api
            .acknowledge_status(
                &user,
                message.order,
                status,
                message.payload.hash.as_deref(),
            )
            .await
        {
            // Recoverable: the mismatch resurfaces on the next merge.
            warn!(id =% message.id, %error, "Failed to acknowledge inbox status");
        }
    }

    fn emit(&self, load_result: &LoadResult) {
        if load_result.is_empty() {
            return;
        }
        self.storage.notify(
            StoreNotification::builder()
                .add_many(load_result.added.iter().cloned())
                .update_many(load_result.updated.iter().cloned())
                .remove_many(load_result.deleted.iter().cloned())
                .build(),
        );
    }

    #[cfg(test)]
    pub(crate) fn gate(&self) -> &RefreshGate {
        &self.gate
    }
}

#[cfg(test)]
mod tests {
    use sqlx::SqlitePool;
    use tokio_stream::StreamExt;

    use crate::testutils::{StubApi, service_descriptor, service_message, snapshot};

    use super::*;

    const NO_THROTTLE: Duration = Duration::ZERO;
    const LONG_THROTTLE: Duration = Duration::from_secs(3600);

    async fn repository(
        pool: SqlitePool,
        api: Arc<StubApi>,
        min_update_interval: Duration,
    ) -> InboxRepository {
        let storage = InboxStorage::new(pool).await.unwrap();
        InboxRepository::new(
            storage,
            api,
            UserId::from("user-1"),
            min_update_interval,
        )
    }

    #[sqlx::test]
    async fn refresh_applies_snapshot_and_deletion_channel(
        pool: SqlitePool,
    ) -> anyhow::Result<()> {
        let api = Arc::new(StubApi::default());
        let repository = repository(pool, api.clone(), NO_THROTTLE).await;

        repository
            .storage()
            .merge_state(
                &[
                    service_message("stale", 1, MessageStatus::Delivered),
                    service_message("gone", 2, MessageStatus::Delivered),
                ],
                true,
            )
            .await?;

        api.set_snapshot(snapshot(
            vec![
                service_descriptor("stale", 1, MessageStatus::Delivered),
                service_descriptor("fresh", 3, MessageStatus::Delivered),
            ],
            vec!["gone".into()],
        ));

        let mut events = Box::pin(repository.subscribe());
        let load_result = repository.refresh(false).await?.unwrap();

        assert_eq!(load_result.added, vec![MessageId::from("fresh")]);
        assert!(load_result.deleted.contains(&MessageId::from("gone")));

        let stored = repository.storage().all_actual_messages().await?;
        let stored_ids: Vec<_> = stored.iter().map(|m| m.id.clone()).collect();
        assert_eq!(
            stored_ids,
            vec![MessageId::from("fresh"), MessageId::from("stale")]
        );

        let notification = events.next().await.unwrap();
        assert!(notification.contains_added(&MessageId::from("fresh")));
        assert!(notification.contains_removed(&MessageId::from("gone")));
        Ok(())
    }

    #[sqlx::test]
    async fn refresh_is_skipped_while_another_is_in_flight(
        pool: SqlitePool,
    ) -> anyhow::Result<()> {
        let api = Arc::new(StubApi::default());
        let repository = repository(pool, api.clone(), NO_THROTTLE).await;

        let _guard = repository.gate().start_loading();
        let result = repository.refresh(true).await?;
        assert_eq!(result, None);
        assert_eq!(api.fetch_calls(), 0);
        Ok(())
    }

    #[sqlx::test]
    async fn refresh_is_throttled_within_the_minimum_interval(
        pool: SqlitePool,
    ) -> anyhow::Result<()> {
        let api = Arc::new(StubApi::default());
        let repository = repository(pool, api.clone(), LONG_THROTTLE).await;

        repository.refresh(false).await?.unwrap();
        assert_eq!(api.fetch_calls(), 1);

        let second = repository.refresh(false).await?.unwrap();
        assert!(second.is_empty());
        assert_eq!(api.fetch_calls(), 1);

        // A forced refresh bypasses the throttle.
        repository.refresh(true).await?.unwrap();
        assert_eq!(api.fetch_calls(), 2);
        Ok(())
    }

    #[sqlx::test]
    async fn failed_refresh_keeps_the_staleness_stamp(pool: SqlitePool) -> anyhow::Result<()> {
        let api = Arc::new(StubApi::default());
        api.fail_next_fetch();
        let repository = repository(pool, api.clone(), LONG_THROTTLE).await;

        let error = repository.refresh(false).await.unwrap_err();
        assert!(matches!(error, InboxError::Api(_)));
        assert!(!repository.gate().is_loading());

        // The failed attempt was stamped, so the throttle still applies.
        let second = repository.refresh(false).await?.unwrap();
        assert!(second.is_empty());
        assert_eq!(api.fetch_calls(), 1);
        Ok(())
    }

    #[sqlx::test]
    async fn user_switch_forces_a_refresh(pool: SqlitePool) -> anyhow::Result<()> {
        let api = Arc::new(StubApi::default());
        let repository = repository(pool, api.clone(), LONG_THROTTLE).await;

        repository.refresh(false).await?.unwrap();
        assert_eq!(api.fetch_calls(), 1);

        repository.user_changed(UserId::from("user-2")).await?;
        assert_eq!(api.fetch_calls(), 2);
        Ok(())
    }

    #[sqlx::test]
    async fn push_receipt_adds_a_message(pool: SqlitePool) -> anyhow::Result<()> {
        let api = Arc::new(StubApi::default());
        let repository = repository(pool, api.clone(), LONG_THROTTLE).await;

        let message = InboxMessage::from_push(
            "p-1".into(),
            inboxcommon::messages::MessagePayload::new(None, "hello"),
        );
        let load_result = repository.add_message(message).await?.unwrap();
        assert_eq!(load_result.added, vec![MessageId::from("p-1")]);
        assert_eq!(repository.total_count().await?, 1);
        assert_eq!(api.fetch_calls(), 0);
        Ok(())
    }

    #[sqlx::test]
    async fn content_free_push_triggers_a_forced_refresh(
        pool: SqlitePool,
    ) -> anyhow::Result<()> {
        let api = Arc::new(StubApi::default());
        api.set_snapshot(snapshot(
            vec![service_descriptor("m-1", 1, MessageStatus::Delivered)],
            vec![],
        ));
        let repository = repository(pool, api.clone(), LONG_THROTTLE).await;

        let message = InboxMessage::from_push(
            "ignored".into(),
            inboxcommon::messages::MessagePayload::new(None, ""),
        );
        let load_result = repository.add_message(message).await?.unwrap();
        assert_eq!(load_result.added, vec![MessageId::from("m-1")]);
        assert_eq!(api.fetch_calls(), 1);
        Ok(())
    }

    #[sqlx::test]
    async fn update_status_acknowledges_service_messages(
        pool: SqlitePool,
    ) -> anyhow::Result<()> {
        let api = Arc::new(StubApi::default());
        let repository = repository(pool, api.clone(), LONG_THROTTLE).await;

        repository
            .storage()
            .merge_state(&[service_message("m-1", 10, MessageStatus::Delivered)], true)
            .await?;

        let message = repository.mark_read(&"m-1".into()).await?.unwrap();
        assert_eq!(message.status, MessageStatus::Read);
        assert_eq!(api.acknowledged(), vec![(10, MessageStatus::Read)]);

        // Applying the same status again changes nothing upstream.
        repository.mark_read(&"m-1".into()).await?;
        assert_eq!(api.acknowledged().len(), 1);
        Ok(())
    }

    #[sqlx::test]
    async fn deleting_a_message_emits_a_removal(pool: SqlitePool) -> anyhow::Result<()> {
        let api = Arc::new(StubApi::default());
        let repository = repository(pool, api.clone(), LONG_THROTTLE).await;

        repository
            .storage()
            .merge_state(&[service_message("m-1", 10, MessageStatus::Read)], true)
            .await?;

        let mut events = Box::pin(repository.subscribe());
        let message = repository.delete_message(&"m-1".into()).await?;
        assert_eq!(message, None);

        let notification = events.next().await.unwrap();
        assert!(notification.contains_removed(&MessageId::from("m-1")));
        assert_eq!(repository.total_count().await?, 0);
        Ok(())
    }

    #[sqlx::test]
    async fn unacknowledged_statuses_are_resent_on_refresh(
        pool: SqlitePool,
    ) -> anyhow::Result<()> {
        let api = Arc::new(StubApi::default());
        let repository = repository(pool, api.clone(), NO_THROTTLE).await;

        repository
            .storage()
            .merge_state(&[service_message("m-1", 10, MessageStatus::Delivered)], true)
            .await?;
        repository
            .storage()
            .update_status(&"m-1".into(), MessageStatus::Read)
            .await?;

        // The backend still reports the pre-read status.
        api.set_snapshot(snapshot(
            vec![service_descriptor("m-1", 10, MessageStatus::Delivered)],
            vec![],
        ));
        repository.refresh(true).await?.unwrap();

        assert_eq!(api.acknowledged(), vec![(10, MessageStatus::Read)]);
        let stored = repository
            .storage()
            .actual_message(&"m-1".into())
            .await?
            .unwrap();
        assert_eq!(stored.status, MessageStatus::Read);
        Ok(())
    }

    #[sqlx::test]
    async fn clear_messages_merges_an_empty_snapshot(pool: SqlitePool) -> anyhow::Result<()> {
        let api = Arc::new(StubApi::default());
        let repository = repository(pool, api.clone(), LONG_THROTTLE).await;

        repository
            .storage()
            .merge_state(
                &[
                    service_message("m-1", 1, MessageStatus::Delivered),
                    service_message("m-2", 2, MessageStatus::Read),
                ],
                true,
            )
            .await?;

        let load_result = repository.clear_messages().await?.unwrap();
        assert_eq!(load_result.deleted.len(), 2);
        assert_eq!(repository.total_count().await?, 0);
        Ok(())
    }
}
