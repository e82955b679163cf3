//! Bluetooth controller lifecycle on top of `esp-radio`.
//!
//! The radio driver owns the controller memory, so releasing a pool here
//! only records that the mode can no longer be brought up.

use bringup_core::ble::{BleController, BleError, BleMode, BleStatus};
#[cfg(feature = "ble")]
use esp_hal::peripherals::BT;
#[cfg(feature = "ble")]
use esp_radio::{Controller, ble::controller::BleConnector};
use log::{debug, info};

const POOL_CLASSIC: u8 = 0b01;
const POOL_BLE: u8 = 0b10;

const fn pool_bits(mode: BleMode) -> u8 {
    match mode {
        BleMode::ClassicBt => POOL_CLASSIC,
        BleMode::Ble => POOL_BLE,
        BleMode::Dual => POOL_CLASSIC | POOL_BLE,
    }
}

pub struct RadioBle<'d> {
    #[cfg(feature = "ble")]
    radio: &'d Controller<'d>,
    #[cfg(feature = "ble")]
    bt: Option<BT<'d>>,
    #[cfg(feature = "ble")]
    connector: Option<BleConnector<'d>>,
    #[cfg(not(feature = "ble"))]
    _radio: core::marker::PhantomData<&'d ()>,
    released: u8,
    controller: BleStatus,
    adapter: BleStatus,
}

impl<'d> RadioBle<'d> {
    #[cfg(feature = "ble")]
    pub fn new(radio: &'d Controller<'d>, bt: BT<'d>) -> Self {
        Self {
            radio,
            bt: Some(bt),
            connector: None,
            released: 0,
            controller: BleStatus::Idle,
            adapter: BleStatus::Idle,
        }
    }

    #[cfg(not(feature = "ble"))]
    pub fn new() -> Self {
        Self {
            _radio: core::marker::PhantomData,
            released: 0,
            controller: BleStatus::Idle,
            adapter: BleStatus::Idle,
        }
    }

    pub fn is_released(&self, mode: BleMode) -> bool {
        let bits = pool_bits(mode);
        self.released & bits == bits
    }

    /// HCI transport for a host stack, once the controller is up.
    #[cfg(feature = "ble")]
    pub fn connector(&mut self) -> Option<&mut BleConnector<'d>> {
        self.connector.as_mut()
    }

    #[cfg(feature = "ble")]
    fn start_controller(&mut self) -> Result<(), BleError> {
        let bt = self.bt.take().ok_or(BleError::InvalidState)?;
        let connector = BleConnector::new(self.radio, bt, Default::default())
            .map_err(|_| BleError::Driver(-1))?;
        self.connector = Some(connector);
        Ok(())
    }

    #[cfg(not(feature = "ble"))]
    fn start_controller(&mut self) -> Result<(), BleError> {
        Err(BleError::NotSupported)
    }

    #[cfg(feature = "ble")]
    fn stop_controller(&mut self) {
        // The peripheral goes with the connector; the controller cannot be restarted.
        self.connector = None;
    }

    #[cfg(not(feature = "ble"))]
    fn stop_controller(&mut self) {}
}

#[cfg(not(feature = "ble"))]
impl Default for RadioBle<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl BleController for RadioBle<'_> {
    fn mem_release(&mut self, mode: BleMode) -> Result<(), BleError> {
        if self.controller != BleStatus::Idle {
            return Err(BleError::InvalidState);
        }
        self.released |= pool_bits(mode);
        debug!("ble: released {:?} controller memory", mode);
        Ok(())
    }

    fn init(&mut self) -> Result<(), BleError> {
        if self.controller != BleStatus::Idle {
            return Err(BleError::InvalidState);
        }
        if self.is_released(BleMode::Ble) {
            return Err(BleError::NoMemory);
        }

        self.start_controller()?;
        self.controller = BleStatus::Enabled;
        self.adapter = BleStatus::Enabled;
        info!("ble: controller and host adapter enabled");
        Ok(())
    }

    fn adapter_status(&self) -> BleStatus {
        self.adapter
    }

    fn disable_adapter(&mut self) -> Result<(), BleError> {
        if self.adapter != BleStatus::Enabled {
            return Err(BleError::InvalidState);
        }
        self.adapter = BleStatus::Initialized;
        Ok(())
    }

    fn deinit_adapter(&mut self) -> Result<(), BleError> {
        if self.adapter == BleStatus::Enabled {
            return Err(BleError::InvalidState);
        }
        self.adapter = BleStatus::Idle;
        Ok(())
    }

    fn controller_status(&self) -> BleStatus {
        self.controller
    }

    fn disable_controller(&mut self) -> Result<(), BleError> {
        if self.controller != BleStatus::Enabled {
            return Err(BleError::InvalidState);
        }
        self.controller = BleStatus::Initialized;
        Ok(())
    }

    fn deinit_controller(&mut self) -> Result<(), BleError> {
        if self.controller == BleStatus::Enabled {
            return Err(BleError::InvalidState);
        }
        self.stop_controller();
        self.controller = BleStatus::Idle;
        Ok(())
    }
}
