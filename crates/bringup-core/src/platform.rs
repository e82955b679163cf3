//! Board services consumed by the sequencer.

use crate::{config::LoggingConfig, uart::UartSettings};

/// Vendor SDK / RTOS services used during startup.
pub trait Platform {
    type Error: core::fmt::Debug;

    /// BLE builds: configure the UART used for pairing prompts.
    fn init_pairing_console(&mut self, settings: &UartSettings) -> Result<(), Self::Error>;

    fn start_logging(&mut self, config: &LoggingConfig) -> Result<(), Self::Error>;

    fn init_ip_stack(&mut self) -> Result<(), Self::Error>;

    fn system_init(&mut self) -> bool;

    fn provision_keys(&mut self);

    /// Shared runtime libraries needed by the network manager and demos.
    fn init_sdk(&mut self) -> bool;

    fn cleanup_sdk(&mut self);

    /// Full device restart. Hardware never returns from this; test doubles do.
    fn restart(&mut self);
}

/// Repeating "waiting for network" indicator running on its own context.
pub trait BlinkTimer {
    type Error: core::fmt::Debug;

    fn start(&mut self, period_ms: u32) -> Result<(), Self::Error>;
    fn stop(&mut self);
}

/// Application entry point run once connectivity is up.
#[allow(async_fn_in_trait)]
pub trait DemoRunner {
    async fn run_demos(&mut self);
}
