// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use chrono::{DateTime, Utc};
use inboxcommon::identifiers::AppCode;
use sqlx::SqliteExecutor;

/// Durable record of the app identity the local store belongs to.
///
/// A single row; a mismatch between the stored app code and the configured
/// one means the store holds messages of a different app identity and must
/// be wiped.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub(crate) struct ClientRecord {
    pub(crate) app_code: AppCode,
    pub(crate) created_at: DateTime<Utc>,
}

impl ClientRecord {
    pub(crate) fn new(app_code: AppCode) -> Self {
        Self {
            app_code,
            created_at: Utc::now(),
        }
    }

    pub(crate) async fn load(
        executor: impl SqliteExecutor<'_>,
    ) -> sqlx::Result<Option<ClientRecord>> {
        sqlx::query_as::<_, ClientRecord>(
            "SELECT app_code, created_at FROM client_record WHERE id = 1",
        )
        .fetch_optional(executor)
        .await
    }

    pub(crate) async fn store(&self, executor: impl SqliteExecutor<'_>) -> sqlx::Result<()> {
        sqlx::query(
            "INSERT INTO client_record (id, app_code, created_at)
            VALUES (1, ?, ?)
            ON CONFLICT (id) DO UPDATE SET app_code = excluded.app_code",
        )
        .bind(self.app_code.as_str())
        .bind(self.created_at)
        .execute(executor)
        .await?;
        Ok(())
    }
}
