//! Pairing console: fixed UART settings and user-message reads.

use alloc::vec::Vec;

use log::warn;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FlowControl {
    None,
    Rts,
    CtsRts,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UartSettings {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
    pub flow_control: FlowControl,
    /// RX FIFO level at which RTS is deasserted.
    pub rx_flow_threshold: u8,
    pub rx_buffer_len: usize,
    pub tx_buffer_len: usize,
    pub event_queue_len: usize,
}

impl UartSettings {
    /// Console used for numeric-comparison pairing prompts.
    pub const PAIRING_CONSOLE: Self = Self {
        baud_rate: 115_200,
        data_bits: 8,
        parity: Parity::None,
        stop_bits: 1,
        flow_control: FlowControl::Rts,
        rx_flow_threshold: 122,
        rx_buffer_len: 4096,
        tx_buffer_len: 8192,
        event_queue_len: 10,
    };
}

impl UartSettings {
    /// RX FIFO level driving RTS, when the settings use RTS at all.
    pub const fn rts_threshold(&self) -> Option<u8> {
        match self.flow_control {
            FlowControl::None => None,
            FlowControl::Rts | FlowControl::CtsRts => Some(self.rx_flow_threshold),
        }
    }

    pub const fn uses_cts(&self) -> bool {
        matches!(self.flow_control, FlowControl::CtsRts)
    }
}

impl Default for UartSettings {
    fn default() -> Self {
        Self::PAIRING_CONSOLE
    }
}

/// Receive-side events produced by the UART driver.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UartEvent {
    Data { len: usize },
    Break,
    BufferFull,
    FifoOverflow,
    FrameError,
    ParityError,
}

/// Queue of UART events plus the bytes behind `Data` events.
#[allow(async_fn_in_trait)]
pub trait UartEventSource {
    /// Next queued event, or `None` once `timeout_ms` elapses.
    async fn next_event(&mut self, timeout_ms: u32) -> Option<UartEvent>;

    /// Copy pending bytes into `buf`; returns the count copied.
    async fn read_bytes(&mut self, buf: &mut [u8]) -> usize;
}

/// Bytes typed by the user. The caller owns the buffer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UserMessage {
    data: Vec<u8>,
}

impl UserMessage {
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

/// Wait for one data event and return its bytes in a buffer sized to the event.
pub async fn read_user_message<S: UartEventSource>(
    source: &mut S,
    timeout_ms: u32,
) -> Option<UserMessage> {
    let len = match source.next_event(timeout_ms).await? {
        UartEvent::Data { len } if len > 0 => len,
        _ => return None,
    };

    let mut data = Vec::new();
    if data.try_reserve_exact(len).is_err() {
        warn!("uart: allocation of {} bytes failed", len);
        return None;
    }
    data.resize(len, 0);

    let copied = source.read_bytes(&mut data).await;
    if copied < len {
        data.truncate(copied);
    }
    Some(UserMessage { data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use std::collections::VecDeque;

    struct ScriptedUart {
        events: VecDeque<UartEvent>,
        bytes: VecDeque<u8>,
    }

    impl ScriptedUart {
        fn new(events: &[UartEvent], bytes: &[u8]) -> Self {
            Self {
                events: events.iter().copied().collect(),
                bytes: bytes.iter().copied().collect(),
            }
        }
    }

    impl UartEventSource for ScriptedUart {
        async fn next_event(&mut self, _timeout_ms: u32) -> Option<UartEvent> {
            self.events.pop_front()
        }

        async fn read_bytes(&mut self, buf: &mut [u8]) -> usize {
            let mut copied = 0;
            for slot in buf.iter_mut() {
                let Some(byte) = self.bytes.pop_front() else {
                    break;
                };
                *slot = byte;
                copied += 1;
            }
            copied
        }
    }

    #[test]
    fn data_event_yields_buffer_sized_to_event() {
        let mut uart = ScriptedUart::new(&[UartEvent::Data { len: 3 }], b"yes\r\n");
        let message = block_on(read_user_message(&mut uart, 1_000)).unwrap();
        assert_eq!(message.as_bytes(), b"yes");
        assert_eq!(uart.bytes.len(), 2);
    }

    #[test]
    fn timeout_yields_nothing() {
        let mut uart = ScriptedUart::new(&[], b"");
        assert_eq!(block_on(read_user_message(&mut uart, 10)), None);
    }

    #[test]
    fn non_data_and_empty_events_are_ignored() {
        let mut uart = ScriptedUart::new(
            &[UartEvent::FifoOverflow, UartEvent::Data { len: 0 }],
            b"n",
        );
        assert_eq!(block_on(read_user_message(&mut uart, 10)), None);
        assert_eq!(block_on(read_user_message(&mut uart, 10)), None);
        assert_eq!(uart.bytes.len(), 1);
    }

    #[test]
    fn pairing_console_is_115200_8n1_with_rts() {
        let settings = UartSettings::default();
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(
            (settings.data_bits, settings.parity, settings.stop_bits),
            (8, Parity::None, 1)
        );
        assert_eq!(settings.flow_control, FlowControl::Rts);
        assert_eq!(settings.rx_flow_threshold, 122);
    }

    #[test]
    fn rts_threshold_follows_flow_control() {
        let console = UartSettings::PAIRING_CONSOLE;
        assert_eq!(console.rts_threshold(), Some(122));
        assert!(!console.uses_cts());

        let plain = UartSettings {
            flow_control: FlowControl::None,
            ..console
        };
        assert_eq!(plain.rts_threshold(), None);

        let full = UartSettings {
            flow_control: FlowControl::CtsRts,
            rx_flow_threshold: 64,
            ..console
        };
        assert_eq!(full.rts_threshold(), Some(64));
        assert!(full.uses_cts());
    }
}
