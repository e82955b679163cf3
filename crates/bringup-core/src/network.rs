//! Network-manager contract consumed by the bring-up sequence.

use core::ops::{BitAnd, BitOr};

/// Bitmask of network interface types.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct NetworkTypes(u32);

impl NetworkTypes {
    pub const NONE: Self = Self(0);
    pub const WIFI: Self = Self(0x0000_0001);
    pub const BLE: Self = Self(0x0000_0002);
    pub const ETHERNET: Self = Self(0x0000_0004);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `other` is set in `self`. `NONE` is never contained.
    pub const fn contains(self, other: Self) -> bool {
        other.0 != 0 && (self.0 & other.0) == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }
}

impl BitOr for NetworkTypes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitAnd for NetworkTypes {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.intersection(rhs)
    }
}

/// State reported by the network manager for one interface type.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NetworkState {
    Disabled,
    Enabled,
}

/// Opaque token binding a listener to state-change events.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Subscription(u16);

impl Subscription {
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    pub const fn id(self) -> u16 {
        self.0
    }
}

/// Receiver of network state changes.
///
/// Invoked from the network manager's own execution context, never from the
/// task that subscribed.
pub trait NetworkStateListener: Sync {
    fn on_network_state_changed(&self, network: NetworkTypes, state: NetworkState);
}

/// Vendor network manager tracking which interfaces are enabled/connected.
pub trait NetworkManager {
    type Error: core::fmt::Debug;

    fn init(&mut self) -> Result<(), Self::Error>;

    fn subscribe(
        &mut self,
        network: NetworkTypes,
        listener: &'static dyn NetworkStateListener,
    ) -> Result<Subscription, Self::Error>;

    /// Request the given networks; returns the subset the manager enabled.
    fn enable_networks(&mut self, requested: NetworkTypes) -> NetworkTypes;

    fn connected_networks(&self) -> NetworkTypes;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_requires_all_bits() {
        let both = NetworkTypes::WIFI | NetworkTypes::BLE;
        assert!(both.contains(NetworkTypes::WIFI));
        assert!(both.contains(both));
        assert!(!NetworkTypes::WIFI.contains(both));
        assert!(!both.contains(NetworkTypes::NONE));
    }

    #[test]
    fn masking_isolates_requested_type() {
        let connected = NetworkTypes::from_bits(0x5);
        assert_eq!(connected & NetworkTypes::WIFI, NetworkTypes::WIFI);
        assert!((connected & NetworkTypes::BLE).is_none());
    }
}
