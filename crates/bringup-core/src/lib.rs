#![cfg_attr(not(test), no_std)]

//! Board bring-up logic for the ESP32 demo image: storage recovery, BLE
//! controller setup, network bring-up and the hand-off to the demo runner.
//!
//! Everything that touches hardware or vendor SDKs sits behind a trait so the
//! sequencing can run on the host.

extern crate alloc;

pub mod ble;
pub mod bringup;
pub mod config;
pub mod context;
pub mod network;
pub mod platform;
pub mod provisioning;
pub mod sequencer;
pub mod storage;
pub mod uart;

#[cfg(test)]
mod test_support;
