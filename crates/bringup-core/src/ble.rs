//! BLE controller bring-up, memory release and teardown.

use log::{info, warn};

/// Controller memory pools that can be handed back to the heap.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BleMode {
    ClassicBt,
    Ble,
    /// Classic + BLE (dual mode).
    Dual,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BleStatus {
    Idle,
    Initialized,
    Enabled,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BleError {
    InvalidState,
    NoMemory,
    NotSupported,
    Driver(i32),
}

/// Bluetooth controller plus host adapter.
pub trait BleController {
    fn mem_release(&mut self, mode: BleMode) -> Result<(), BleError>;
    fn init(&mut self) -> Result<(), BleError>;

    fn adapter_status(&self) -> BleStatus;
    fn disable_adapter(&mut self) -> Result<(), BleError>;
    fn deinit_adapter(&mut self) -> Result<(), BleError>;

    fn controller_status(&self) -> BleStatus;
    fn disable_controller(&mut self) -> Result<(), BleError>;
    fn deinit_controller(&mut self) -> Result<(), BleError>;
}

/// BLE builds: Classic memory is released up front, then the stack comes up.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BleBringupError {
    MemoryRelease(BleError),
    StackInit(BleError),
}

pub fn bring_up_ble<B: BleController>(ble: &mut B) -> Result<(), BleBringupError> {
    ble.mem_release(BleMode::ClassicBt)
        .map_err(BleBringupError::MemoryRelease)?;
    ble.init().map_err(BleBringupError::StackInit)?;
    info!("ble: stack initialized");
    Ok(())
}

/// Builds without BLE give both controller pools back immediately.
pub fn release_ble_memory<B: BleController>(ble: &mut B) -> Result<(), BleError> {
    ble.mem_release(BleMode::ClassicBt)?;
    ble.mem_release(BleMode::Ble)?;
    info!("ble: controller memory released");
    Ok(())
}

/// Tear the BLE stack down, stopping at the first failing step.
pub fn teardown_ble_stack<B: BleController>(ble: &mut B) -> Result<(), BleError> {
    let result = teardown_steps(ble);
    if let Err(err) = result {
        warn!("ble: teardown failed: {:?}", err);
    }
    result
}

fn teardown_steps<B: BleController>(ble: &mut B) -> Result<(), BleError> {
    if ble.adapter_status() == BleStatus::Enabled {
        ble.disable_adapter()?;
    }
    ble.deinit_adapter()?;

    if ble.controller_status() == BleStatus::Enabled {
        ble.disable_controller()?;
    }
    ble.deinit_controller()?;

    ble.mem_release(BleMode::Ble)?;
    ble.mem_release(BleMode::Dual)
}
