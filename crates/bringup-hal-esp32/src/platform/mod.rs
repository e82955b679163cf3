pub mod ble;
pub mod led;
pub mod system;
pub mod uart;
