#![no_std]

//! ESP32 implementations of the `bringup-core` board services.

extern crate alloc;

pub mod network;
pub mod platform;
pub mod storage;
