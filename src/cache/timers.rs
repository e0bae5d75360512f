// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-address expiry timers.
//!
//! Each armed timer is a tokio task sleeping until the entry's expiry
//! instant. Every timer holds a child of one root [`CancellationToken`], so
//! a single cancel on shutdown stops all of them. Re-arming an address
//! cancels the previous task and bumps a generation counter; a callback only
//! acts when its generation is still the current one for that address.

use std::collections::HashMap;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::models::WalletAddress;

struct ArmedTimer {
    generation: u64,
    token: CancellationToken,
}

pub(crate) struct ExpiryTimers {
    root: CancellationToken,
    armed: HashMap<WalletAddress, ArmedTimer>,
    next_generation: u64,
}

impl ExpiryTimers {
    pub(crate) fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            armed: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Arm (or re-arm) the timer for `address`.
    ///
    /// Returns the generation handed to `on_fire`, or `None` when no tokio
    /// runtime is available or the timers were shut down. Expiry is then
    /// enforced by the lazy check alone.
    pub(crate) fn arm<F>(
        &mut self,
        address: &WalletAddress,
        delay: Duration,
        on_fire: F,
    ) -> Option<u64>
    where
        F: FnOnce(WalletAddress, u64) + Send + 'static,
    {
        self.disarm(address);

        if self.root.is_cancelled() {
            return None;
        }
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                debug!(address = %address, "No tokio runtime, expiry timer not armed");
                return None;
            }
        };

        self.next_generation += 1;
        let generation = self.next_generation;
        let token = self.root.child_token();
        let task_token = token.clone();
        let task_address = address.clone();

        handle.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => on_fire(task_address, generation),
                _ = task_token.cancelled() => {}
            }
        });

        self.armed
            .insert(address.clone(), ArmedTimer { generation, token });
        Some(generation)
    }

    /// Whether `generation` is the live timer for `address`.
    pub(crate) fn is_current(&self, address: &WalletAddress, generation: u64) -> bool {
        self.armed
            .get(address)
            .is_some_and(|timer| timer.generation == generation)
    }

    /// Forget a timer that has already fired.
    pub(crate) fn forget(&mut self, address: &WalletAddress) {
        self.armed.remove(address);
    }

    /// Cancel the pending timer for `address`, if any.
    pub(crate) fn disarm(&mut self, address: &WalletAddress) {
        if let Some(timer) = self.armed.remove(address) {
            timer.token.cancel();
        }
    }

    /// Cancel every pending timer. New timers may still be armed afterwards.
    pub(crate) fn disarm_all(&mut self) {
        for (_, timer) in self.armed.drain() {
            timer.token.cancel();
        }
    }

    /// Cancel every pending timer and refuse to arm new ones.
    pub(crate) fn shutdown(&mut self) {
        self.root.cancel();
        self.armed.clear();
    }

    #[cfg(test)]
    pub(crate) fn armed_count(&self) -> usize {
        self.armed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn addr(n: u8) -> WalletAddress {
        WalletAddress(format!("0x{}", format!("{n:02x}").repeat(20)))
    }

    #[test]
    fn arm_without_runtime_is_a_no_op() {
        let mut timers = ExpiryTimers::new();
        assert_eq!(timers.arm(&addr(1), Duration::from_secs(1), |_, _| {}), None);
        assert_eq!(timers.armed_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let fired = Arc::new(AtomicU64::new(0));
        let mut timers = ExpiryTimers::new();

        let counter = fired.clone();
        let generation = timers
            .arm(&addr(1), Duration::from_secs(10), move |_, generation| {
                counter.store(generation, Ordering::SeqCst);
            })
            .unwrap();
        assert!(timers.is_current(&addr(1), generation));

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), generation);
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_cancels_previous_timer() {
        let fired = Arc::new(AtomicU64::new(0));
        let mut timers = ExpiryTimers::new();

        let first = fired.clone();
        let old = timers
            .arm(&addr(1), Duration::from_secs(5), move |_, _| {
                first.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        let second = fired.clone();
        let new = timers
            .arm(&addr(1), Duration::from_secs(20), move |_, _| {
                second.fetch_add(100, Ordering::SeqCst);
            })
            .unwrap();

        assert!(!timers.is_current(&addr(1), old));
        assert!(timers.is_current(&addr(1), new));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_everything() {
        let fired = Arc::new(AtomicU64::new(0));
        let mut timers = ExpiryTimers::new();

        for n in 1..=3 {
            let counter = fired.clone();
            timers.arm(&addr(n), Duration::from_secs(5), move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(timers.armed_count(), 3);

        timers.shutdown();
        assert_eq!(timers.armed_count(), 0);
        assert_eq!(timers.arm(&addr(4), Duration::from_secs(1), |_, _| {}), None);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
