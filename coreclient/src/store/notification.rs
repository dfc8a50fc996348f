// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::Arc;

use inboxcommon::identifiers::MessageId;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::error;

// 1024 * size_of::<Arc<StoreNotification>>() = 1024 * 8 = 8 KiB
const NOTIFICATION_CHANNEL_SIZE: usize = 1024;

#[derive(Debug, Clone)]
pub(crate) struct StoreNotificationsSender {
    tx: broadcast::Sender<Arc<StoreNotification>>,
}

impl StoreNotificationsSender {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTIFICATION_CHANNEL_SIZE);
        Self { tx }
    }

    pub(crate) fn notify(&self, notification: impl Into<Arc<StoreNotification>>) {
        let _no_receivers = self.tx.send(notification.into());
    }

    pub(crate) fn subscribe(
        &self,
    ) -> impl tokio_stream::Stream<Item = Arc<StoreNotification>> + Send + 'static {
        BroadcastStream::new(self.tx.subscribe()).map(|res| match res {
            Ok(notification) => notification,
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                error!("store notifications lagged by {} messages", n);
                Arc::new(StoreNotification::default())
            }
        })
    }
}

impl Default for StoreNotificationsSender {
    fn default() -> Self {
        Self::new()
    }
}

/// Change-set broadcast to observers after a storage mutation.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StoreNotification {
    pub added: Vec<MessageId>,
    pub updated: Vec<MessageId>,
    pub removed: Vec<MessageId>,
}

impl StoreNotification {
    pub(crate) fn builder() -> StoreNotificationBuilder {
        StoreNotificationBuilder::default()
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    pub fn contains_added(&self, id: &MessageId) -> bool {
        self.added.binary_search(id).is_ok()
    }

    pub fn contains_updated(&self, id: &MessageId) -> bool {
        self.updated.binary_search(id).is_ok()
    }

    pub fn contains_removed(&self, id: &MessageId) -> bool {
        self.removed.binary_search(id).is_ok()
    }
}

#[derive(Debug, Default)]
pub(crate) struct StoreNotificationBuilder {
    inner: StoreNotification,
}

impl StoreNotificationBuilder {
    pub(crate) fn add_many(
        mut self,
        ids: impl IntoIterator<Item = impl Into<MessageId>>,
    ) -> Self {
        self.inner.added.extend(ids.into_iter().map(Into::into));
        self
    }

    pub(crate) fn update_many(
        mut self,
        ids: impl IntoIterator<Item = impl Into<MessageId>>,
    ) -> Self {
        self.inner.updated.extend(ids.into_iter().map(Into::into));
        self
    }

    pub(crate) fn remove_many(
        mut self,
        ids: impl IntoIterator<Item = impl Into<MessageId>>,
    ) -> Self {
        self.inner.removed.extend(ids.into_iter().map(Into::into));
        self
    }

    pub(crate) fn build(self) -> Arc<StoreNotification> {
        let mut inner = self.inner;
        inner.added.sort_unstable();
        inner.added.dedup();
        inner.updated.sort_unstable();
        inner.updated.dedup();
        inner.removed.sort_unstable();
        inner.removed.dedup();
        Arc::new(inner)
    }
}

impl From<StoreNotificationBuilder> for Arc<StoreNotification> {
    fn from(builder: StoreNotificationBuilder) -> Self {
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_sorted_change_sets() {
        let sender = StoreNotificationsSender::new();
        let mut stream = Box::pin(sender.subscribe());

        sender.notify(
            StoreNotification::builder()
                .add_many(["b", "a"])
                .update_many(["c"])
                .build(),
        );

        let notification = stream.next().await.unwrap();
        assert_eq!(
            notification.added,
            vec![MessageId::from("a"), MessageId::from("b")]
        );
        assert!(notification.contains_added(&MessageId::from("a")));
        assert!(notification.contains_updated(&MessageId::from("c")));
        assert!(!notification.contains_removed(&MessageId::from("a")));
    }
}
