//! Compile-time bring-up configuration.

use log::LevelFilter;

use crate::{network::NetworkTypes, uart::UartSettings};

pub const DEVICE_NICK_NAME: &str = "Espressif_Demo";
pub const BLINK_PERIOD_MS: u32 = 1_000;
pub const BLINK_ON_MS: u32 = 500;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LoggingConfig {
    pub level: LevelFilter,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BringupConfig {
    /// Networks requested from the network manager.
    pub enabled_networks: NetworkTypes,
    /// Network the demos wait for.
    pub demo_network: NetworkTypes,
    pub blink_period_ms: u32,
    pub ble_enabled: bool,
    pub logging: LoggingConfig,
    pub console: UartSettings,
    pub device_nick_name: &'static str,
}

impl BringupConfig {
    pub const fn new(ble_enabled: bool) -> Self {
        let enabled_networks = if ble_enabled {
            NetworkTypes::WIFI.union(NetworkTypes::BLE)
        } else {
            NetworkTypes::WIFI
        };

        Self {
            enabled_networks,
            demo_network: NetworkTypes::WIFI,
            blink_period_ms: BLINK_PERIOD_MS,
            ble_enabled,
            logging: LoggingConfig {
                level: LevelFilter::Info,
            },
            console: UartSettings::PAIRING_CONSOLE,
            device_nick_name: DEVICE_NICK_NAME,
        }
    }

    pub const fn with_enabled_networks(mut self, enabled_networks: NetworkTypes) -> Self {
        self.enabled_networks = enabled_networks;
        self
    }

    pub const fn with_blink_period_ms(mut self, blink_period_ms: u32) -> Self {
        self.blink_period_ms = blink_period_ms;
        self
    }

    pub const fn with_log_level(mut self, level: LevelFilter) -> Self {
        self.logging.level = level;
        self
    }
}

impl Default for BringupConfig {
    fn default() -> Self {
        Self::new(false)
    }
}
