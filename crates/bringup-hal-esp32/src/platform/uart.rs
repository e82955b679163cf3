//! UART0 pairing console.

use bringup_core::uart::{self, FlowControl, UartEvent, UartEventSource, UartSettings};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, signal::Signal};
use embassy_time::{Duration, with_timeout};
use esp_hal::{
    Async,
    peripherals::{GPIO1, GPIO3, GPIO22, UART0},
    uart::{
        Config, ConfigError, CtsConfig, DataBits, HwFlowControl, Parity, RtsConfig, RxError,
        StopBits, Uart,
    },
};
use log::debug;

const RX_CHUNK_LEN: usize = 128;

/// Console peripherals, handed to the platform until the console is configured.
pub struct ConsolePins {
    pub uart: UART0<'static>,
    pub tx: GPIO1<'static>,
    pub rx: GPIO3<'static>,
    /// UART0 RTS; no CTS line is routed on this board.
    pub rts: GPIO22<'static>,
}

#[derive(Debug)]
pub enum ConsoleError {
    Config(ConfigError),
    UnsupportedFlowControl(FlowControl),
}

impl From<ConfigError> for ConsoleError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

pub struct ConsoleUart {
    uart: Uart<'static, Async>,
    chunk: [u8; RX_CHUNK_LEN],
    start: usize,
    end: usize,
}

impl ConsoleUart {
    pub fn new(pins: ConsolePins, settings: &UartSettings) -> Result<Self, ConsoleError> {
        if settings.uses_cts() {
            return Err(ConsoleError::UnsupportedFlowControl(settings.flow_control));
        }

        let uart = Uart::new(pins.uart, uart_config(settings))?
            .with_tx(pins.tx)
            .with_rx(pins.rx);
        let uart = match settings.rts_threshold() {
            Some(_) => uart.with_rts(pins.rts),
            None => uart,
        }
        .into_async();
        debug!(
            "uart0: {} baud, {} data bits, flow control {:?}",
            settings.baud_rate, settings.data_bits, settings.flow_control
        );

        Ok(Self {
            uart,
            chunk: [0; RX_CHUNK_LEN],
            start: 0,
            end: 0,
        })
    }

    fn pending(&self) -> usize {
        self.end - self.start
    }
}

fn uart_config(settings: &UartSettings) -> Config {
    let data_bits = match settings.data_bits {
        5 => DataBits::_5,
        6 => DataBits::_6,
        7 => DataBits::_7,
        _ => DataBits::_8,
    };
    let parity = match settings.parity {
        uart::Parity::None => Parity::None,
        uart::Parity::Even => Parity::Even,
        uart::Parity::Odd => Parity::Odd,
    };
    let stop_bits = if settings.stop_bits == 2 {
        StopBits::_2
    } else {
        StopBits::_1
    };

    Config::default()
        .with_baudrate(settings.baud_rate)
        .with_data_bits(data_bits)
        .with_parity(parity)
        .with_stop_bits(stop_bits)
        .with_hw_flow_ctrl(HwFlowControl {
            cts: CtsConfig::Disabled,
            rts: match settings.rts_threshold() {
                Some(threshold) => RtsConfig::Enabled(threshold),
                None => RtsConfig::Disabled,
            },
        })
}

impl UartEventSource for ConsoleUart {
    async fn next_event(&mut self, timeout_ms: u32) -> Option<UartEvent> {
        if self.pending() > 0 {
            return Some(UartEvent::Data {
                len: self.pending(),
            });
        }

        let read = with_timeout(
            Duration::from_millis(timeout_ms as u64),
            self.uart.read_async(&mut self.chunk),
        )
        .await
        .ok()?;

        Some(match read {
            Ok(len) => {
                self.start = 0;
                self.end = len;
                UartEvent::Data { len }
            }
            Err(RxError::FifoOverflowed) => UartEvent::FifoOverflow,
            Err(RxError::ParityMismatch) => UartEvent::ParityError,
            Err(RxError::FrameFormatViolated) => UartEvent::FrameError,
            Err(_) => UartEvent::Break,
        })
    }

    async fn read_bytes(&mut self, buf: &mut [u8]) -> usize {
        let len = buf.len().min(self.pending());
        buf[..len].copy_from_slice(&self.chunk[self.start..self.start + len]);
        self.start += len;
        len
    }
}

/// Hands the configured console to whichever worker reads it.
pub struct ConsolePort {
    ready: Signal<CriticalSectionRawMutex, ConsoleUart>,
}

impl ConsolePort {
    pub const fn new() -> Self {
        Self {
            ready: Signal::new(),
        }
    }

    pub fn publish(&self, console: ConsoleUart) {
        self.ready.signal(console);
    }

    pub async fn take(&self) -> ConsoleUart {
        self.ready.wait().await
    }
}

impl Default for ConsolePort {
    fn default() -> Self {
        Self::new()
    }
}
