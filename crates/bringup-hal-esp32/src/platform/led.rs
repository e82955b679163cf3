//! "Waiting for network" LED blinker.

use core::sync::atomic::{AtomicBool, Ordering};

use bringup_core::{config::BLINK_ON_MS, platform::BlinkTimer};
use embassy_futures::select::{Either, select};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, signal::Signal};
use embassy_time::Timer;
use esp_hal::gpio::Output;
use log::debug;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BlinkError {
    AlreadyRunning,
    InvalidPeriod,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum BlinkCommand {
    Start { period_ms: u32 },
    Stop,
}

/// Command slot between the bring-up sequence and [`blink_loop`].
pub struct BlinkHandle {
    running: AtomicBool,
    commands: Signal<CriticalSectionRawMutex, BlinkCommand>,
}

impl BlinkHandle {
    pub const fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            commands: Signal::new(),
        }
    }

    pub fn timer(&'static self) -> LedBlinkTimer {
        LedBlinkTimer { handle: self }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Default for BlinkHandle {
    fn default() -> Self {
        Self::new()
    }
}

pub struct LedBlinkTimer {
    handle: &'static BlinkHandle,
}

impl BlinkTimer for LedBlinkTimer {
    type Error = BlinkError;

    fn start(&mut self, period_ms: u32) -> Result<(), Self::Error> {
        if period_ms <= BLINK_ON_MS {
            return Err(BlinkError::InvalidPeriod);
        }
        if self.handle.running.swap(true, Ordering::AcqRel) {
            return Err(BlinkError::AlreadyRunning);
        }
        self.handle
            .commands
            .signal(BlinkCommand::Start { period_ms });
        Ok(())
    }

    fn stop(&mut self) {
        if self.handle.running.swap(false, Ordering::AcqRel) {
            self.handle.commands.signal(BlinkCommand::Stop);
        }
    }
}

/// Drives the LED: on for `BLINK_ON_MS` at the start of every period.
pub async fn blink_loop(handle: &'static BlinkHandle, led: &mut Output<'_>) -> ! {
    loop {
        let mut period_ms = match handle.commands.wait().await {
            BlinkCommand::Start { period_ms } => period_ms,
            BlinkCommand::Stop => continue,
        };
        debug!("led: blinking every {} ms", period_ms);

        loop {
            led.set_high();
            let command = match hold(handle, BLINK_ON_MS).await {
                Some(command) => Some(command),
                None => {
                    led.set_low();
                    hold(handle, period_ms - BLINK_ON_MS).await
                }
            };

            match command {
                None => {}
                Some(BlinkCommand::Start { period_ms: next }) => period_ms = next,
                Some(BlinkCommand::Stop) => break,
            }
        }

        led.set_low();
        debug!("led: blinking stopped");
    }
}

/// Sleep for `ms`, cut short by a new command.
async fn hold(handle: &BlinkHandle, ms: u32) -> Option<BlinkCommand> {
    match select(Timer::after_millis(ms as u64), handle.commands.wait()).await {
        Either::First(()) => None,
        Either::Second(command) => Some(command),
    }
}
