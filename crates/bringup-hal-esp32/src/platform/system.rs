//! Board services: logger, IP stack start, partition checks, credential
//! provisioning and restart.

use alloc::vec;
use core::sync::atomic::{AtomicBool, Ordering};

use bringup_core::{
    config::LoggingConfig,
    platform::Platform,
    provisioning::{DeviceCredentials, ProvisioningResult, provision_credentials},
    uart::UartSettings,
};
use log::{error, info, warn};

use super::uart::{ConsoleError, ConsolePins, ConsolePort, ConsoleUart};
use crate::{
    network::IpStackGate,
    storage::flash::{CredentialSector, PartitionLayout, Region},
};

static LOGGER_STARTED: AtomicBool = AtomicBool::new(false);

#[derive(Debug)]
pub enum PlatformError {
    ConsoleUnavailable,
    Console(ConsoleError),
    LoggerAlreadyStarted,
    IpStackAlreadyStarted,
}

pub struct EspPlatform {
    ip_stack: &'static IpStackGate,
    credentials: DeviceCredentials<'static>,
    console: Option<(ConsolePins, &'static ConsolePort)>,
    credential_region: Option<Region>,
    sdk_ready: bool,
}

impl EspPlatform {
    pub fn new(ip_stack: &'static IpStackGate, credentials: DeviceCredentials<'static>) -> Self {
        Self {
            ip_stack,
            credentials,
            console: None,
            credential_region: None,
            sdk_ready: false,
        }
    }

    /// UART0 for the pairing console; it is published to `port` once configured.
    pub fn with_console(mut self, pins: ConsolePins, port: &'static ConsolePort) -> Self {
        self.console = Some((pins, port));
        self
    }

    pub fn sdk_ready(&self) -> bool {
        self.sdk_ready
    }
}

impl Platform for EspPlatform {
    type Error = PlatformError;

    fn init_pairing_console(&mut self, settings: &UartSettings) -> Result<(), Self::Error> {
        let (pins, port) = self
            .console
            .take()
            .ok_or(PlatformError::ConsoleUnavailable)?;
        let console = ConsoleUart::new(pins, settings).map_err(PlatformError::Console)?;
        port.publish(console);
        Ok(())
    }

    fn start_logging(&mut self, config: &LoggingConfig) -> Result<(), Self::Error> {
        if LOGGER_STARTED.swap(true, Ordering::AcqRel) {
            return Err(PlatformError::LoggerAlreadyStarted);
        }
        esp_println::logger::init_logger(config.level);
        Ok(())
    }

    fn init_ip_stack(&mut self) -> Result<(), Self::Error> {
        self.ip_stack
            .open()
            .map_err(|_| PlatformError::IpStackAlreadyStarted)
    }

    fn system_init(&mut self) -> bool {
        match PartitionLayout::read() {
            Ok(layout) => {
                self.credential_region = layout.credentials;
                if layout.credentials.is_none() {
                    warn!("system: no writable data partition for device credentials");
                }
                true
            }
            Err(err) => {
                error!("system: partition table unreadable: {:?}", err);
                false
            }
        }
    }

    fn provision_keys(&mut self) {
        let Some(region) = self.credential_region else {
            warn!("provisioning: skipped, no credential partition");
            return;
        };

        let mut store = match CredentialSector::new(region) {
            Ok(store) => store,
            Err(err) => {
                warn!("provisioning: credential sector unavailable: {:?}", err);
                return;
            }
        };
        let mut scratch = vec![0u8; self.credentials.encoded_len()];
        match provision_credentials(&mut store, &self.credentials, &mut scratch) {
            Ok(ProvisioningResult::Written { len }) => {
                info!("provisioning: {} byte record stored", len)
            }
            Ok(_) => {}
            Err(err) => warn!("provisioning failed: {:?}", err),
        }
    }

    fn init_sdk(&mut self) -> bool {
        if self.sdk_ready {
            warn!("runtime libraries already initialized");
            return false;
        }
        self.sdk_ready = true;
        true
    }

    fn cleanup_sdk(&mut self) {
        self.sdk_ready = false;
    }

    fn restart(&mut self) {
        esp_hal::system::software_reset()
    }
}
