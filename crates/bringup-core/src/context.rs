//! Shared state between the bring-up task and the network-state callback.

use core::{
    cell::Cell,
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
};

use embassy_sync::{
    blocking_mutex::{Mutex, raw::CriticalSectionRawMutex},
    signal::Signal,
};
use log::debug;

use crate::network::{NetworkState, NetworkStateListener, NetworkTypes, Subscription};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MailboxError {
    /// The mailbox was already armed during this boot cycle.
    AlreadyArmed,
}

/// Network bring-up context: connected-network bitmask, wait mailbox and
/// subscription handle.
///
/// The callback side is a single-winner latch: only the first transition into
/// [`NetworkState::Enabled`] observed while the bitmask is still
/// [`NetworkTypes::NONE`] records the network and posts the mailbox. The latch
/// is a one-shot guard of its own, so overwriting the bitmask never reopens it
/// and the mailbox is posted at most once per boot.
pub struct NetworkContext {
    connected: AtomicU32,
    latched: AtomicBool,
    armed: AtomicBool,
    posts: AtomicU32,
    mailbox: Signal<CriticalSectionRawMutex, NetworkTypes>,
    subscription: Mutex<CriticalSectionRawMutex, Cell<Option<Subscription>>>,
}

impl NetworkContext {
    pub const fn new() -> Self {
        Self {
            connected: AtomicU32::new(NetworkTypes::NONE.bits()),
            latched: AtomicBool::new(false),
            armed: AtomicBool::new(false),
            posts: AtomicU32::new(0),
            mailbox: Signal::new(),
            subscription: Mutex::new(Cell::new(None)),
        }
    }

    pub fn connected(&self) -> NetworkTypes {
        NetworkTypes::from_bits(self.connected.load(Ordering::Acquire))
    }

    /// Overwrite the bitmask with a value polled from the network manager.
    pub fn record_connected(&self, networks: NetworkTypes) {
        self.connected.store(networks.bits(), Ordering::Release);
    }

    /// Create the wait mailbox. Fails if it already exists this boot.
    pub fn arm(&self) -> Result<(), MailboxError> {
        if self.armed.swap(true, Ordering::AcqRel) {
            return Err(MailboxError::AlreadyArmed);
        }
        Ok(())
    }

    /// Destroy the wait mailbox; returns whether it had been armed.
    pub fn disarm(&self) -> bool {
        let was_armed = self.armed.swap(false, Ordering::AcqRel);
        if was_armed {
            self.mailbox.reset();
        }
        was_armed
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Block until the latch posts. No timeout.
    pub async fn wait_for_network(&self) -> NetworkTypes {
        self.mailbox.wait().await
    }

    /// Whether the latch already fired this boot.
    pub fn is_latched(&self) -> bool {
        self.latched.load(Ordering::Acquire)
    }

    /// Number of mailbox posts issued by the latch.
    pub fn post_count(&self) -> u32 {
        self.posts.load(Ordering::Acquire)
    }

    pub fn set_subscription(&self, subscription: Subscription) {
        self.subscription.lock(|cell| cell.set(Some(subscription)));
    }

    pub fn subscription(&self) -> Option<Subscription> {
        self.subscription.lock(Cell::get)
    }
}

impl Default for NetworkContext {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkStateListener for NetworkContext {
    fn on_network_state_changed(&self, network: NetworkTypes, state: NetworkState) {
        if state != NetworkState::Enabled {
            return;
        }

        if !self.connected().is_none() {
            debug!("network {:?} enabled; bitmask already set", network);
            return;
        }
        if self.latched.swap(true, Ordering::AcqRel) {
            debug!("network {:?} enabled; already latched", network);
            return;
        }

        // Bitmask write happens-before the post.
        self.connected.store(network.bits(), Ordering::Release);
        self.posts.fetch_add(1, Ordering::AcqRel);
        self.mailbox.signal(network);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    #[test]
    fn first_enabled_transition_wins_the_latch() {
        let ctx = NetworkContext::new();
        ctx.arm().unwrap();

        ctx.on_network_state_changed(NetworkTypes::WIFI, NetworkState::Enabled);
        ctx.on_network_state_changed(NetworkTypes::BLE, NetworkState::Enabled);
        ctx.on_network_state_changed(NetworkTypes::WIFI, NetworkState::Enabled);

        assert_eq!(ctx.post_count(), 1);
        assert_eq!(ctx.connected(), NetworkTypes::WIFI);
        assert_eq!(block_on(ctx.wait_for_network()), NetworkTypes::WIFI);
    }

    #[test]
    fn disabled_transitions_are_ignored() {
        let ctx = NetworkContext::new();
        ctx.on_network_state_changed(NetworkTypes::WIFI, NetworkState::Disabled);

        assert_eq!(ctx.post_count(), 0);
        assert!(ctx.connected().is_none());
    }

    #[test]
    fn latch_stays_closed_once_a_network_was_recorded() {
        let ctx = NetworkContext::new();
        ctx.record_connected(NetworkTypes::WIFI);

        ctx.on_network_state_changed(NetworkTypes::WIFI, NetworkState::Enabled);

        assert_eq!(ctx.post_count(), 0);
    }

    #[test]
    fn clearing_the_bitmask_does_not_reopen_the_latch() {
        let ctx = NetworkContext::new();
        ctx.arm().unwrap();

        ctx.on_network_state_changed(NetworkTypes::WIFI, NetworkState::Enabled);
        ctx.record_connected(NetworkTypes::NONE);
        ctx.on_network_state_changed(NetworkTypes::WIFI, NetworkState::Enabled);

        assert_eq!(ctx.post_count(), 1);
        assert!(ctx.is_latched());
        assert!(ctx.connected().is_none());
    }

    #[test]
    fn mailbox_can_only_be_armed_once() {
        let ctx = NetworkContext::new();
        assert_eq!(ctx.arm(), Ok(()));
        assert_eq!(ctx.arm(), Err(MailboxError::AlreadyArmed));
        assert!(ctx.disarm());
        assert!(!ctx.disarm());
        assert!(!ctx.is_armed());
    }

    #[test]
    fn subscription_handle_is_kept() {
        let ctx = NetworkContext::new();
        assert_eq!(ctx.subscription(), None);
        ctx.set_subscription(Subscription::new(7));
        assert_eq!(ctx.subscription(), Some(Subscription::new(7)));
    }
}
