// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use inboxapiclient::inbox_api::InboxRequestError;
use thiserror::Error;

/// Error opening or migrating the local store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Error raised by repository operations.
#[derive(Debug, Error)]
pub enum InboxError {
    #[error("inbox backend request failed")]
    Api(#[from] InboxRequestError),
    #[error("inbox storage failed")]
    Storage(#[source] anyhow::Error),
}

/// Error raised when wiring up the inbox module.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("invalid inbox configuration: {0}")]
    InvalidConfiguration(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("inbox storage failed")]
    Storage(#[source] anyhow::Error),
}
