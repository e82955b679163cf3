//! Network manager shared between the bring-up sequence and the Wi-Fi worker.

use core::{
    cell::RefCell,
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
};

use bringup_core::network::{
    NetworkManager, NetworkState, NetworkStateListener, NetworkTypes, Subscription,
};
use embassy_sync::{
    blocking_mutex::{Mutex, raw::CriticalSectionRawMutex},
    signal::Signal,
};
use heapless::Vec;
use log::{debug, info};

mod wifi;

pub use wifi::{WifiConfig, wifi_connection_loop};

const MAX_SUBSCRIBERS: usize = 4;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum NetworkManagerError {
    NotInitialized,
    InvalidNetwork,
    TooManySubscribers,
    AlreadyStarted,
}

#[derive(Clone, Copy)]
struct Subscriber {
    id: u16,
    networks: NetworkTypes,
    listener: &'static dyn NetworkStateListener,
}

/// Lock-free network state plus the subscriber list.
pub struct NetworkManagerHandle {
    supported: NetworkTypes,
    initialized: AtomicBool,
    requested: AtomicU32,
    connected: AtomicU32,
    next_id: AtomicU32,
    enable: Signal<CriticalSectionRawMutex, NetworkTypes>,
    subscribers: Mutex<CriticalSectionRawMutex, RefCell<Vec<Subscriber, MAX_SUBSCRIBERS>>>,
}

impl NetworkManagerHandle {
    pub const fn new(supported: NetworkTypes) -> Self {
        Self {
            supported,
            initialized: AtomicBool::new(false),
            requested: AtomicU32::new(0),
            connected: AtomicU32::new(0),
            next_id: AtomicU32::new(1),
            enable: Signal::new(),
            subscribers: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    /// `NetworkManager` view used by the bring-up sequence.
    pub fn client(&'static self) -> NetworkClient {
        NetworkClient { handle: self }
    }

    pub fn supported(&self) -> NetworkTypes {
        self.supported
    }

    pub fn requested(&self) -> NetworkTypes {
        NetworkTypes::from_bits(self.requested.load(Ordering::Acquire))
    }

    pub fn connected(&self) -> NetworkTypes {
        NetworkTypes::from_bits(self.connected.load(Ordering::Acquire))
    }

    /// Resolves once `network` has been requested.
    pub async fn wait_enabled(&self, network: NetworkTypes) {
        while !self.requested().contains(network) {
            self.enable.wait().await;
        }
    }

    /// A network came up; subscribers see it after the bitmask is updated.
    pub fn mark_up(&self, network: NetworkTypes) {
        let previous = self.connected.fetch_or(network.bits(), Ordering::AcqRel);
        if previous & network.bits() == 0 {
            info!("network {:#x} up", network.bits());
            self.publish(network, NetworkState::Enabled);
        }
    }

    pub fn mark_down(&self, network: NetworkTypes) {
        let previous = self.connected.fetch_and(!network.bits(), Ordering::AcqRel);
        if previous & network.bits() != 0 {
            info!("network {:#x} down", network.bits());
            self.publish(network, NetworkState::Disabled);
        }
    }

    fn publish(&self, network: NetworkTypes, state: NetworkState) {
        // Listeners run outside the lock.
        let targets = self.subscribers.lock(|subscribers| {
            subscribers
                .borrow()
                .iter()
                .filter(|subscriber| !(subscriber.networks & network).is_none())
                .copied()
                .collect::<Vec<Subscriber, MAX_SUBSCRIBERS>>()
        });
        for subscriber in targets.iter() {
            debug!(
                "network: notify subscription {} of {:#x} {:?}",
                subscriber.id,
                network.bits(),
                state
            );
            subscriber.listener.on_network_state_changed(network, state);
        }
    }
}

/// Handle given to the bring-up sequence.
pub struct NetworkClient {
    handle: &'static NetworkManagerHandle,
}

impl NetworkManager for NetworkClient {
    type Error = NetworkManagerError;

    fn init(&mut self) -> Result<(), Self::Error> {
        if !self.handle.initialized.swap(true, Ordering::AcqRel) {
            debug!(
                "network manager: supported={:#x}",
                self.handle.supported.bits()
            );
        }
        Ok(())
    }

    fn subscribe(
        &mut self,
        network: NetworkTypes,
        listener: &'static dyn NetworkStateListener,
    ) -> Result<Subscription, Self::Error> {
        if !self.handle.initialized.load(Ordering::Acquire) {
            return Err(NetworkManagerError::NotInitialized);
        }
        if network.is_none() {
            return Err(NetworkManagerError::InvalidNetwork);
        }

        let id = self.handle.next_id.fetch_add(1, Ordering::AcqRel) as u16;
        self.handle.subscribers.lock(|subscribers| {
            subscribers
                .borrow_mut()
                .push(Subscriber {
                    id,
                    networks: network,
                    listener,
                })
                .map_err(|_| NetworkManagerError::TooManySubscribers)
        })?;
        Ok(Subscription::new(id))
    }

    fn enable_networks(&mut self, requested: NetworkTypes) -> NetworkTypes {
        if !self.handle.initialized.load(Ordering::Acquire) {
            return NetworkTypes::NONE;
        }

        let enabled = requested & self.handle.supported;
        self.handle
            .requested
            .fetch_or(enabled.bits(), Ordering::AcqRel);
        self.handle.enable.signal(enabled);

        // The BLE radio is up as soon as the controller is; nothing to wait for.
        if enabled.contains(NetworkTypes::BLE) {
            self.handle.mark_up(NetworkTypes::BLE);
        }
        enabled
    }

    fn connected_networks(&self) -> NetworkTypes {
        self.handle.connected()
    }
}

/// Holds the IP stack runner until the bring-up sequence starts it.
pub struct IpStackGate {
    started: AtomicBool,
    open: Signal<CriticalSectionRawMutex, ()>,
}

impl IpStackGate {
    pub const fn new() -> Self {
        Self {
            started: AtomicBool::new(false),
            open: Signal::new(),
        }
    }

    /// Release the runner. Fails if the stack was already started.
    pub fn open(&self) -> Result<(), NetworkManagerError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(NetworkManagerError::AlreadyStarted);
        }
        self.open.signal(());
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub async fn wait_open(&self) {
        while !self.is_open() {
            self.open.wait().await;
        }
    }
}

impl Default for IpStackGate {
    fn default() -> Self {
        Self::new()
    }
}
