// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use chrono::{DateTime, Utc};
use inboxcommon::{
    identifiers::MessageId,
    messages::{MessageKind, MessagePayload, MessageSource, MessageStatus},
};
use sqlx::SqliteExecutor;
use tracing::warn;

use super::InboxMessage;

const SELECT_COLUMNS: &str = "message_id, sort_order, sent_at, expires_at, title, body, \
     image_url, action_params, hash, kind, status, source";

#[derive(sqlx::FromRow)]
struct SqlInboxMessage {
    message_id: MessageId,
    sort_order: i64,
    sent_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    title: Option<String>,
    body: String,
    image_url: Option<String>,
    action_params: String,
    hash: Option<String>,
    kind: i64,
    status: i64,
    source: i64,
}

impl From<SqlInboxMessage> for InboxMessage {
    fn from(
        SqlInboxMessage {
            message_id,
            sort_order,
            sent_at,
            expires_at,
            title,
            body,
            image_url,
            action_params,
            hash,
            kind,
            status,
            source,
        }: SqlInboxMessage,
    ) -> Self {
        let action_params = serde_json::from_str(&action_params).unwrap_or_else(|error| {
            warn!(id =% message_id, %error, "Failed to parse stored action params");
            serde_json::Value::Null
        });
        let status = MessageStatus::from_code(status).unwrap_or_else(|| {
            warn!(id =% message_id, code = status, "Unknown stored message status");
            MessageStatus::Created
        });
        let kind = MessageKind::from_code(kind).unwrap_or_else(|| {
            warn!(id =% message_id, code = kind, "Unknown stored message kind");
            MessageKind::Plain
        });
        let source = MessageSource::from_code(source).unwrap_or_else(|| {
            warn!(id =% message_id, code = source, "Unknown stored message source");
            MessageSource::Service
        });
        InboxMessage {
            id: message_id,
            order: sort_order,
            sent_at,
            expires_at,
            payload: MessagePayload {
                title,
                body,
                image_url,
                action_params,
                hash,
            },
            kind,
            status,
            source,
        }
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn action_params_json(payload: &MessagePayload) -> String {
    payload.action_params.to_string()
}

impl InboxMessage {
    pub(crate) async fn insert(&self, executor: impl SqliteExecutor<'_>) -> sqlx::Result<()> {
        sqlx::query(
            "INSERT INTO inbox_message (
                message_id,
                sort_order,
                sent_at,
                expires_at,
                title,
                body,
                image_url,
                action_params,
                hash,
                kind,
                status,
                source
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(self.id.as_str())
        .bind(self.order)
        .bind(self.sent_at)
        .bind(self.expires_at)
        .bind(self.payload.title.as_deref())
        .bind(self.payload.body.as_str())
        .bind(self.payload.image_url.as_deref())
        .bind(action_params_json(&self.payload))
        .bind(self.payload.hash.as_deref())
        .bind(self.kind.code())
        .bind(self.status.code())
        .bind(self.source.code())
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Overwrites the stored row. When `preserve_status` is set the stored
    /// status is kept instead of `self.status`.
    pub(crate) async fn update_row(
        &self,
        executor: impl SqliteExecutor<'_>,
        preserve_status: Option<MessageStatus>,
    ) -> sqlx::Result<()> {
        let status = preserve_status.unwrap_or(self.status);
        sqlx::query(
            "UPDATE inbox_message SET
                sort_order = ?,
                sent_at = ?,
                expires_at = ?,
                title = ?,
                body = ?,
                image_url = ?,
                action_params = ?,
                hash = ?,
                kind = ?,
                status = ?,
                source = ?
            WHERE message_id = ?",
        )
        .bind(self.order)
        .bind(self.sent_at)
        .bind(self.expires_at)
        .bind(self.payload.title.as_deref())
        .bind(self.payload.body.as_str())
        .bind(self.payload.image_url.as_deref())
        .bind(action_params_json(&self.payload))
        .bind(self.payload.hash.as_deref())
        .bind(self.kind.code())
        .bind(status.code())
        .bind(self.source.code())
        .bind(self.id.as_str())
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Loads a row by id regardless of expiry and status.
    pub(crate) async fn load_any(
        executor: impl SqliteExecutor<'_>,
        id: &MessageId,
    ) -> sqlx::Result<Option<InboxMessage>> {
        let query_string =
            format!("SELECT {SELECT_COLUMNS} FROM inbox_message WHERE message_id = ?");
        let message = sqlx::query_as::<_, SqlInboxMessage>(&query_string)
            .bind(id.as_str())
            .fetch_optional(executor)
            .await?;
        Ok(message.map(From::from))
    }

    /// Loads a non-expired row by id. Deleted statuses are still returned;
    /// callers split them off where it matters.
    pub(crate) async fn load_actual(
        executor: impl SqliteExecutor<'_>,
        id: &MessageId,
    ) -> sqlx::Result<Option<InboxMessage>> {
        let query_string = format!(
            "SELECT {SELECT_COLUMNS} FROM inbox_message
            WHERE message_id = ? AND expires_at > ?"
        );
        let message = sqlx::query_as::<_, SqlInboxMessage>(&query_string)
            .bind(id.as_str())
            .bind(Utc::now())
            .fetch_optional(executor)
            .await?;
        Ok(message.map(From::from))
    }

    pub(crate) async fn load_actual_many(
        executor: impl SqliteExecutor<'_>,
        ids: &[MessageId],
    ) -> sqlx::Result<Vec<InboxMessage>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query_string = format!(
            "SELECT {SELECT_COLUMNS} FROM inbox_message
            WHERE message_id IN ({}) AND expires_at > ?
            ORDER BY sort_order DESC",
            placeholders(ids.len()),
        );
        let mut query = sqlx::query_as::<_, SqlInboxMessage>(&query_string);
        for id in ids {
            query = query.bind(id.as_str());
        }
        let messages = query.bind(Utc::now()).fetch_all(executor).await?;
        Ok(messages.into_iter().map(From::from).collect())
    }

    /// Loads all visible messages, most recent first.
    pub(crate) async fn load_all_actual(
        executor: impl SqliteExecutor<'_>,
    ) -> sqlx::Result<Vec<InboxMessage>> {
        let statuses = MessageStatus::actual_statuses();
        let query_string = format!(
            "SELECT {SELECT_COLUMNS} FROM inbox_message
            WHERE status IN ({}) AND expires_at > ?
            ORDER BY sort_order DESC",
            placeholders(statuses.len()),
        );
        let mut query = sqlx::query_as::<_, SqlInboxMessage>(&query_string);
        for status in &statuses {
            query = query.bind(status.code());
        }
        let messages = query.bind(Utc::now()).fetch_all(executor).await?;
        Ok(messages.into_iter().map(From::from).collect())
    }

    /// Loads one page of visible messages with `sort_order` strictly below
    /// the cursor, most recent first.
    pub(crate) async fn load_actual_page(
        executor: impl SqliteExecutor<'_>,
        before_order: i64,
        limit: i64,
    ) -> sqlx::Result<Vec<InboxMessage>> {
        let statuses = MessageStatus::actual_statuses();
        let query_string = format!(
            "SELECT {SELECT_COLUMNS} FROM inbox_message
            WHERE status IN ({}) AND expires_at > ? AND sort_order < ?
            ORDER BY sort_order DESC
            LIMIT ?",
            placeholders(statuses.len()),
        );
        let mut query = sqlx::query_as::<_, SqlInboxMessage>(&query_string);
        for status in &statuses {
            query = query.bind(status.code());
        }
        let messages = query
            .bind(Utc::now())
            .bind(before_order)
            .bind(limit)
            .fetch_all(executor)
            .await?;
        Ok(messages.into_iter().map(From::from).collect())
    }

    /// Loads every push-received message regardless of expiry and status.
    pub(crate) async fn load_all_push(
        executor: impl SqliteExecutor<'_>,
    ) -> sqlx::Result<Vec<InboxMessage>> {
        let query_string = format!("SELECT {SELECT_COLUMNS} FROM inbox_message WHERE source = ?");
        let messages = sqlx::query_as::<_, SqlInboxMessage>(&query_string)
            .bind(MessageSource::Push.code())
            .fetch_all(executor)
            .await?;
        Ok(messages.into_iter().map(From::from).collect())
    }

    pub(crate) async fn set_status(
        executor: impl SqliteExecutor<'_>,
        id: &MessageId,
        status: MessageStatus,
    ) -> sqlx::Result<()> {
        sqlx::query("UPDATE inbox_message SET status = ? WHERE message_id = ?")
            .bind(status.code())
            .bind(id.as_str())
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Counts non-expired messages whose status is strictly below `status`.
    pub(crate) async fn count_with_status_below(
        executor: impl SqliteExecutor<'_>,
        status: MessageStatus,
    ) -> sqlx::Result<usize> {
        let statuses = status.statuses_below();
        if statuses.is_empty() {
            return Ok(0);
        }
        let query_string = format!(
            "SELECT COUNT(*) FROM inbox_message
            WHERE status IN ({}) AND expires_at > ?",
            placeholders(statuses.len()),
        );
        let mut query = sqlx::query_scalar::<_, i64>(&query_string);
        for status in &statuses {
            query = query.bind(status.code());
        }
        let count = query.bind(Utc::now()).fetch_one(executor).await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    pub(crate) async fn delete_ids(
        executor: impl SqliteExecutor<'_>,
        ids: &[MessageId],
    ) -> sqlx::Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let query_string = format!(
            "DELETE FROM inbox_message WHERE message_id IN ({})",
            placeholders(ids.len()),
        );
        let mut query = sqlx::query(&query_string);
        for id in ids {
            query = query.bind(id.as_str());
        }
        query.execute(executor).await?;
        Ok(())
    }

    pub(crate) async fn delete_expired(executor: impl SqliteExecutor<'_>) -> sqlx::Result<u64> {
        let result = sqlx::query("DELETE FROM inbox_message WHERE expires_at <= ?")
            .bind(Utc::now())
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    pub(crate) async fn delete_all(executor: impl SqliteExecutor<'_>) -> sqlx::Result<()> {
        sqlx::query("DELETE FROM inbox_message")
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Ids of stored rows that are not part of `ids`.
    pub(crate) async fn ids_not_in(
        executor: impl SqliteExecutor<'_>,
        ids: &[MessageId],
    ) -> sqlx::Result<Vec<MessageId>> {
        if ids.is_empty() {
            return sqlx::query_scalar::<_, MessageId>("SELECT message_id FROM inbox_message")
                .fetch_all(executor)
                .await;
        }
        let query_string = format!(
            "SELECT message_id FROM inbox_message WHERE message_id NOT IN ({})",
            placeholders(ids.len()),
        );
        let mut query = sqlx::query_scalar::<_, MessageId>(&query_string);
        for id in ids {
            query = query.bind(id.as_str());
        }
        query.fetch_all(executor).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use sqlx::SqlitePool;

    use crate::testutils::service_message;

    use super::*;

    #[sqlx::test]
    async fn insert_and_load_roundtrip(pool: SqlitePool) -> anyhow::Result<()> {
        let message = service_message("m-1", 10, MessageStatus::Delivered);
        message.insert(&pool).await?;

        let loaded = InboxMessage::load_any(&pool, &message.id).await?;
        assert_eq!(loaded, Some(message));
        Ok(())
    }

    #[sqlx::test]
    async fn expired_messages_are_invisible_to_actual_reads(
        pool: SqlitePool,
    ) -> anyhow::Result<()> {
        let mut message = service_message("m-1", 10, MessageStatus::Delivered);
        message.expires_at = Utc::now() - Duration::hours(1);
        message.insert(&pool).await?;

        assert!(
            InboxMessage::load_actual(&pool, &message.id)
                .await?
                .is_none()
        );
        assert!(InboxMessage::load_any(&pool, &message.id).await?.is_some());

        let removed = InboxMessage::delete_expired(&pool).await?;
        assert_eq!(removed, 1);
        assert!(InboxMessage::load_any(&pool, &message.id).await?.is_none());
        Ok(())
    }

    #[sqlx::test]
    async fn pagination_is_cursor_based_on_order(pool: SqlitePool) -> anyhow::Result<()> {
        for order in 1..=5 {
            service_message(&format!("m-{order}"), order, MessageStatus::Delivered)
                .insert(&pool)
                .await?;
        }

        let first_page = InboxMessage::load_actual_page(&pool, i64::MAX, 2).await?;
        assert_eq!(
            first_page.iter().map(|m| m.order).collect::<Vec<_>>(),
            vec![5, 4]
        );

        // A concurrent insertion above the cursor must not shift the page.
        service_message("m-9", 9, MessageStatus::Delivered)
            .insert(&pool)
            .await?;

        let cursor = first_page.last().map(|m| m.order).unwrap_or(i64::MAX);
        let second_page = InboxMessage::load_actual_page(&pool, cursor, 2).await?;
        assert_eq!(
            second_page.iter().map(|m| m.order).collect::<Vec<_>>(),
            vec![3, 2]
        );
        Ok(())
    }

    #[sqlx::test]
    async fn ids_not_in_reports_stale_rows(pool: SqlitePool) -> anyhow::Result<()> {
        for order in 1..=3 {
            service_message(&format!("m-{order}"), order, MessageStatus::Delivered)
                .insert(&pool)
                .await?;
        }

        let keep = vec!["m-1".into(), "m-3".into()];
        let stale = InboxMessage::ids_not_in(&pool, &keep).await?;
        assert_eq!(stale, vec!["m-2".into()]);

        let all = InboxMessage::ids_not_in(&pool, &[]).await?;
        assert_eq!(all.len(), 3);
        Ok(())
    }
}
