// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::{path::Path, sync::Arc};

use inboxcommon::{identifiers::MessageId, messages::MessageStatus};
use sqlx::{
    SqlitePool,
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use tokio_stream::Stream;
use tracing::info;

use crate::{InboxMessage, errors::StoreError};

mod merge;
mod notification;

pub use merge::{MergeOutcome, MergeResult};
pub use notification::StoreNotification;
pub(crate) use notification::StoreNotificationsSender;

use merge::{RowAction, classify};

static MIGRATOR: Migrator = sqlx::migrate!();

/// The result type of a failable [`InboxStorage`] method
pub type StoreResult<T> = anyhow::Result<T>;

/// Durable keyed storage for inbox messages.
///
/// The store is the single shared mutable resource of the inbox subsystem.
/// Writes that span several rows run in one transaction, so concurrent
/// merges cannot violate the one-row-per-id invariant; interleaved merges
/// degrade to last-writer-wins per id.
///
/// The store owns the notification channel but never decides when to emit;
/// change-sets are published by the repository after it has applied a
/// complete logical operation.
#[derive(Debug, Clone)]
pub struct InboxStorage {
    pool: SqlitePool,
    notifications_tx: StoreNotificationsSender,
}

impl InboxStorage {
    /// Opens the store at the given path, creating and migrating the
    /// database if necessary.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::new(pool).await
    }

    /// Wraps an existing pool and brings the schema up to date.
    pub async fn new(pool: SqlitePool) -> Result<Self, StoreError> {
        MIGRATOR.run(&pool).await?;
        Ok(Self {
            pool,
            notifications_tx: StoreNotificationsSender::new(),
        })
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Publishes a change-set to all subscribers.
    pub(crate) fn notify(&self, notification: impl Into<Arc<StoreNotification>>) {
        let notification = notification.into();
        if !notification.is_empty() {
            self.notifications_tx.notify(notification);
        }
    }

    /// Subscribes to change-sets published after storage mutations.
    pub fn subscribe(&self) -> impl Stream<Item = Arc<StoreNotification>> + Send + 'static {
        self.notifications_tx.subscribe()
    }

    /// Removes the given ids. Ids without a stored row are ignored. No
    /// notification is published; that is owned by the caller.
    pub async fn delete_list(&self, ids: &[MessageId]) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        InboxMessage::delete_ids(&self.pool, ids).await?;
        Ok(())
    }

    /// Reconciles a backend-reported message collection against the store.
    ///
    /// With `full_list` set, the incoming collection is authoritative and
    /// exhaustive: ids it does not carry are deleted, and an empty incoming
    /// collection clears the store. Without it the collection is a delta and
    /// absence means nothing; an empty delta skips the merge entirely.
    ///
    /// All mutations of one merge are applied in a single transaction.
    pub async fn merge_state(
        &self,
        incoming: &[InboxMessage],
        full_list: bool,
    ) -> StoreResult<MergeOutcome> {
        if incoming.is_empty() && !full_list {
            return Ok(MergeOutcome::Skipped);
        }

        let mut result = MergeResult::default();
        let mut incoming_ids = Vec::with_capacity(incoming.len());

        let mut transaction = self.pool.begin().await?;
        InboxMessage::delete_expired(&mut *transaction).await?;
        for message in incoming {
            incoming_ids.push(message.id.clone());
            match InboxMessage::load_any(&mut *transaction, &message.id).await? {
                None => {
                    message.insert(&mut *transaction).await?;
                    result.new_items.push(message.id.clone());
                }
                Some(existing) => match classify(&existing, message) {
                    RowAction::Update => {
                        message.update_row(&mut *transaction, None).await?;
                        result.updated_items.push(message.id.clone());
                    }
                    RowAction::KeepLocalStatus(local_status) => {
                        message
                            .update_row(&mut *transaction, Some(local_status))
                            .await?;
                        result
                            .incorrect_statuses
                            .insert(message.id.clone(), local_status);
                    }
                    RowAction::Noop => {}
                },
            }
        }
        if full_list {
            let stale = InboxMessage::ids_not_in(&mut *transaction, &incoming_ids).await?;
            InboxMessage::delete_ids(&mut *transaction, &stale).await?;
            result.deleted_items = stale;
        }
        transaction.commit().await?;

        info!(
            new = result.new_items.len(),
            updated = result.updated_items.len(),
            deleted = result.deleted_items.len(),
            full_list,
            "Merged inbox state"
        );
        Ok(MergeOutcome::Merged(result))
    }

    /// Loads a non-expired message by id.
    pub async fn actual_message(&self, id: &MessageId) -> StoreResult<Option<InboxMessage>> {
        Ok(InboxMessage::load_actual(&self.pool, id).await?)
    }

    /// Loads the non-expired messages among `ids`, most recent first.
    pub async fn actual_messages(&self, ids: &[MessageId]) -> StoreResult<Vec<InboxMessage>> {
        Ok(InboxMessage::load_actual_many(&self.pool, ids).await?)
    }

    /// Loads all visible messages, most recent first.
    pub async fn all_actual_messages(&self) -> StoreResult<Vec<InboxMessage>> {
        Ok(InboxMessage::load_all_actual(&self.pool).await?)
    }

    /// Loads one page of visible messages below the `before_order` cursor.
    /// Pass `None` to read from the top.
    pub async fn actual_messages_page(
        &self,
        before_order: Option<i64>,
        limit: u32,
    ) -> StoreResult<Vec<InboxMessage>> {
        let before_order = before_order.unwrap_or(i64::MAX);
        Ok(InboxMessage::load_actual_page(&self.pool, before_order, limit.into()).await?)
    }

    /// Every push-received message regardless of visibility. Diagnostics and
    /// post-sync status replay only.
    pub async fn all_push_messages(&self) -> StoreResult<Vec<InboxMessage>> {
        Ok(InboxMessage::load_all_push(&self.pool).await?)
    }

    /// Moves a message to the given status.
    ///
    /// Idempotent: a message already carrying the status is left alone.
    /// Returns the ids whose change still needs to be acknowledged to the
    /// backend, which is empty exactly when nothing changed.
    pub async fn update_status(
        &self,
        id: &MessageId,
        status: MessageStatus,
    ) -> StoreResult<Vec<MessageId>> {
        let mut transaction = self.pool.begin().await?;
        let Some(existing) = InboxMessage::load_actual(&mut *transaction, id).await? else {
            return Ok(Vec::new());
        };
        if existing.status == status {
            return Ok(Vec::new());
        }
        InboxMessage::set_status(&mut *transaction, id, status).await?;
        transaction.commit().await?;
        Ok(vec![id.clone()])
    }

    /// Number of visible messages not yet read.
    pub async fn unread_count(&self) -> StoreResult<usize> {
        Ok(InboxMessage::count_with_status_below(&self.pool, MessageStatus::Read).await?)
    }

    /// Number of visible messages whose action was not performed yet.
    pub async fn no_action_performed_count(&self) -> StoreResult<usize> {
        Ok(InboxMessage::count_with_status_below(&self.pool, MessageStatus::Opened).await?)
    }

    /// Number of visible messages.
    pub async fn total_count(&self) -> StoreResult<usize> {
        Ok(InboxMessage::count_with_status_below(&self.pool, MessageStatus::DeletedByUser).await?)
    }

    /// Drops every stored message. Used when the app identity changes.
    pub async fn wipe(&self) -> StoreResult<()> {
        InboxMessage::delete_all(&self.pool).await?;
        info!("Wiped inbox store");
        Ok(())
    }
}
