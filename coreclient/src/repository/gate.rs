// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::{
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use inboxcommon::identifiers::UserId;

/// Decides whether a refresh against the backend is warranted and marks the
/// one refresh cycle that may be in flight.
///
/// The in-flight flag is advisory: callers are expected to consult
/// [`Self::is_loading`] before starting a refresh, but the store tolerates
/// overlapping merges regardless.
#[derive(Debug)]
pub struct RefreshGate {
    min_update_interval: Duration,
    loading: AtomicBool,
    state: Mutex<GateState>,
}

#[derive(Debug, Default)]
struct GateState {
    // None means the staleness clock has never been stamped, which always
    // warrants a refresh.
    last_update: Option<Instant>,
    user: Option<UserId>,
}

impl RefreshGate {
    pub fn new(min_update_interval: Duration) -> Self {
        Self {
            min_update_interval,
            loading: AtomicBool::new(false),
            state: Mutex::new(GateState::default()),
        }
    }

    /// Whether enough time has passed since the last refresh attempt.
    ///
    /// A change of the observed user resets the staleness clock first, so a
    /// user switch always warrants a refresh.
    pub fn check(&self, user: &UserId) -> bool {
        let mut state = self.lock_state();
        if state.user.as_ref() != Some(user) {
            state.user = Some(user.clone());
            state.last_update = None;
        }
        match state.last_update {
            None => true,
            Some(last_update) => last_update.elapsed() > self.min_update_interval,
        }
    }

    /// Non-blocking read of the in-flight flag.
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// Stamps the staleness clock and raises the in-flight flag.
    ///
    /// The clock is stamped at the start of the attempt, not at completion,
    /// so a slow or failed refresh still respects the minimum interval.
    /// The returned guard lowers the flag when dropped, which pairs start
    /// and finish on every exit path.
    pub fn start_loading(&self) -> RefreshGuard<'_> {
        {
            let mut state = self.lock_state();
            state.last_update = Some(Instant::now());
        }
        self.loading.store(true, Ordering::Release);
        RefreshGuard { gate: self }
    }

    fn finish_loading(&self) {
        self.loading.store(false, Ordering::Release);
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct RefreshGuard<'a> {
    gate: &'a RefreshGate,
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.gate.finish_loading();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG_INTERVAL: Duration = Duration::from_secs(3600);

    #[test]
    fn fresh_gate_warrants_a_refresh() {
        let gate = RefreshGate::new(LONG_INTERVAL);
        assert!(gate.check(&"user-1".into()));
    }

    #[test]
    fn start_loading_stamps_the_clock() {
        let gate = RefreshGate::new(LONG_INTERVAL);
        let user = UserId::from("user-1");
        assert!(gate.check(&user));

        drop(gate.start_loading());
        assert!(!gate.check(&user));
    }

    #[test]
    fn elapsed_interval_warrants_a_refresh() {
        let gate = RefreshGate::new(Duration::ZERO);
        let user = UserId::from("user-1");
        drop(gate.start_loading());
        std::thread::sleep(Duration::from_millis(5));
        assert!(gate.check(&user));
    }

    #[test]
    fn user_switch_resets_the_staleness_clock() {
        let gate = RefreshGate::new(LONG_INTERVAL);
        let alice = UserId::from("alice");
        let bob = UserId::from("bob");

        assert!(gate.check(&alice));
        drop(gate.start_loading());
        assert!(!gate.check(&alice));

        assert!(gate.check(&bob));
        // And switching back also counts as a switch.
        assert!(gate.check(&alice));
    }

    #[test]
    fn guard_pairs_start_and_finish() {
        let gate = RefreshGate::new(LONG_INTERVAL);
        assert!(!gate.is_loading());
        {
            let _guard = gate.start_loading();
            assert!(gate.is_loading());
        }
        assert!(!gate.is_loading());
    }
}
