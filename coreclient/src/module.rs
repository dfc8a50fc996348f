// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::{sync::Arc, time::Duration};

use inboxcommon::identifiers::{AppCode, UserId};
use sqlx::SqlitePool;
use tokio_stream::Stream;
use tracing::info;

use crate::{
    client_record::ClientRecord,
    errors::ModuleError,
    repository::{InboxApi, InboxRepository},
    store::{InboxStorage, StoreNotification},
};

/// Default minimum interval between two backend refreshes.
pub const DEFAULT_MIN_UPDATE_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone)]
pub struct InboxConfig {
    pub app_code: AppCode,
    pub user_id: UserId,
    pub min_update_interval: Duration,
}

impl InboxConfig {
    pub fn new(app_code: AppCode, user_id: UserId) -> Self {
        Self {
            app_code,
            user_id,
            min_update_interval: DEFAULT_MIN_UPDATE_INTERVAL,
        }
    }

    pub fn with_min_update_interval(mut self, min_update_interval: Duration) -> Self {
        self.min_update_interval = min_update_interval;
        self
    }

    fn validate(&self) -> Result<(), ModuleError> {
        if self.app_code.is_empty() {
            return Err(ModuleError::InvalidConfiguration("app code must not be empty"));
        }
        Ok(())
    }
}

/// Composition root of the inbox subsystem.
///
/// Constructed once at startup with all collaborators passed explicitly.
/// Construction detects an app identity change against the persisted record
/// and wipes the store before anything else touches it, so no message ever
/// crosses an app identity boundary.
pub struct InboxModule {
    storage: InboxStorage,
    repository: InboxRepository,
}

impl InboxModule {
    pub async fn init(
        config: InboxConfig,
        pool: SqlitePool,
        api: Arc<dyn InboxApi>,
    ) -> Result<Self, ModuleError> {
        config.validate()?;
        let storage = InboxStorage::new(pool).await?;

        let previous_record = ClientRecord::load(storage.pool())
            .await
            .map_err(|error| ModuleError::Storage(error.into()))?;
        if let Some(previous_record) = &previous_record {
            if previous_record.app_code != config.app_code {
                info!(
                    previous =% previous_record.app_code,
                    current =% config.app_code,
                    "App identity changed, dropping local inbox state"
                );
                storage.wipe().await.map_err(ModuleError::Storage)?;
            }
        }
        ClientRecord::new(config.app_code.clone())
            .store(storage.pool())
            .await
            .map_err(|error| ModuleError::Storage(error.into()))?;

        let repository = InboxRepository::new(
            storage.clone(),
            api,
            config.user_id.clone(),
            config.min_update_interval,
        );
        Ok(Self {
            storage,
            repository,
        })
    }

    pub fn repository(&self) -> &InboxRepository {
        &self.repository
    }

    pub fn storage(&self) -> &InboxStorage {
        &self.storage
    }

    /// Subscribes to change-sets published by the inbox subsystem.
    pub fn subscribe(&self) -> impl Stream<Item = Arc<StoreNotification>> + Send + 'static {
        self.storage.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use inboxcommon::messages::MessageStatus;
    use sqlx::SqlitePool;

    use crate::testutils::{StubApi, service_message};

    use super::*;

    fn config(app_code: &str) -> InboxConfig {
        InboxConfig::new(AppCode::from(app_code), UserId::from("user-1"))
    }

    #[sqlx::test]
    async fn empty_app_code_is_rejected(pool: SqlitePool) {
        let api = Arc::new(StubApi::default());
        let Err(error) = InboxModule::init(config(""), pool, api).await else {
            panic!("expected a configuration error");
        };
        assert!(matches!(error, ModuleError::InvalidConfiguration(_)));
    }

    #[sqlx::test]
    async fn app_identity_change_wipes_the_store(pool: SqlitePool) -> anyhow::Result<()> {
        let api = Arc::new(StubApi::default());
        let module = InboxModule::init(config("app-1"), pool.clone(), api.clone()).await?;
        module
            .storage()
            .merge_state(
                &[
                    service_message("m-1", 1, MessageStatus::Delivered),
                    service_message("m-2", 2, MessageStatus::Read),
                ],
                true,
            )
            .await?;
        assert_eq!(module.storage().total_count().await?, 2);
        drop(module);

        let module = InboxModule::init(config("app-2"), pool, api).await?;
        assert_eq!(module.storage().total_count().await?, 0);
        Ok(())
    }

    #[sqlx::test]
    async fn same_app_identity_keeps_the_store(pool: SqlitePool) -> anyhow::Result<()> {
        let api = Arc::new(StubApi::default());
        let module = InboxModule::init(config("app-1"), pool.clone(), api.clone()).await?;
        module
            .storage()
            .merge_state(&[service_message("m-1", 1, MessageStatus::Delivered)], true)
            .await?;
        drop(module);

        let module = InboxModule::init(config("app-1"), pool, api).await?;
        assert_eq!(module.storage().total_count().await?, 1);
        Ok(())
    }
}
