// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::HashMap;

use inboxcommon::{identifiers::MessageId, messages::MessageStatus};

use crate::InboxMessage;

/// Change-set produced by reconciling a backend-reported message collection
/// against the local store.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MergeResult {
    pub new_items: Vec<MessageId>,
    pub updated_items: Vec<MessageId>,
    pub deleted_items: Vec<MessageId>,
    /// Statuses the local store holds ahead of what the backend reported.
    /// These were never acknowledged upstream and must be re-sent.
    pub incorrect_statuses: HashMap<MessageId, MessageStatus>,
}

impl MergeResult {
    pub fn is_empty(&self) -> bool {
        self.new_items.is_empty()
            && self.updated_items.is_empty()
            && self.deleted_items.is_empty()
            && self.incorrect_statuses.is_empty()
    }
}

/// Result of a merge attempt.
///
/// `Skipped` means the merge was not applicable (a delta with no entries)
/// and the store was left untouched. This is distinct from a merge that ran
/// and changed nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    Skipped,
    Merged(MergeResult),
}

impl MergeOutcome {
    pub fn into_result(self) -> Option<MergeResult> {
        match self {
            MergeOutcome::Skipped => None,
            MergeOutcome::Merged(result) => Some(result),
        }
    }

    pub fn as_result(&self) -> Option<&MergeResult> {
        match self {
            MergeOutcome::Skipped => None,
            MergeOutcome::Merged(result) => Some(result),
        }
    }
}

/// Decision for one incoming message that already has a stored counterpart.
#[derive(Debug, PartialEq)]
pub(super) enum RowAction {
    /// Overwrite the row and report it as updated.
    Update,
    /// Overwrite the row but keep the locally advanced status; the status
    /// mismatch is surfaced for re-acknowledgement.
    KeepLocalStatus(MessageStatus),
    /// Stored content already matches, leave the row alone.
    Noop,
}

/// Compares a stored message with its incoming counterpart.
///
/// Statuses only move forward along the status chain. Push-received rows are
/// always overwritten since the backend copy carries the authoritative order
/// and hash.
pub(super) fn classify(existing: &InboxMessage, incoming: &InboxMessage) -> RowAction {
    if existing.source == inboxcommon::messages::MessageSource::Push {
        return RowAction::Update;
    }
    if existing.status.is_below(incoming.status) {
        return RowAction::Update;
    }
    if incoming.status.is_below(existing.status) {
        return RowAction::KeepLocalStatus(existing.status);
    }
    if existing.content_differs(incoming) {
        return RowAction::Update;
    }
    RowAction::Noop
}
