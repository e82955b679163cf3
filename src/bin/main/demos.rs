use core::net::Ipv4Addr;

use bringup_core::platform::DemoRunner;
use embassy_net::{
    Stack,
    icmp::{PacketMetadata, ping::PingManager, ping::PingParams},
};
use embassy_time::{Duration, Timer};
use log::{info, warn};

const PING_TARGET: Ipv4Addr = Ipv4Addr::new(1, 1, 1, 1);
const PING_ROUNDS: u8 = 4;
const PING_INTERVAL_SECS: u64 = 5;
const PING_TIMEOUT_MS: u64 = 1_200;

/// Connectivity demo: a few pings once the network is up.
pub(super) struct PingDemos<'a> {
    stack: Stack<'a>,
}

impl<'a> PingDemos<'a> {
    pub(super) fn new(stack: Stack<'a>) -> Self {
        Self { stack }
    }
}

impl DemoRunner for PingDemos<'_> {
    async fn run_demos(&mut self) {
        let mut rx_buffer = [0u8; 256];
        let mut tx_buffer = [0u8; 256];
        let mut rx_meta = [PacketMetadata::EMPTY; 1];
        let mut tx_meta = [PacketMetadata::EMPTY; 1];

        let mut ping_manager = PingManager::new(
            self.stack,
            &mut rx_meta,
            &mut rx_buffer,
            &mut tx_meta,
            &mut tx_buffer,
        );
        let mut ping_params = PingParams::new(PING_TARGET);
        ping_params
            .set_payload(b"bringup")
            .set_count(1)
            .set_timeout(Duration::from_millis(PING_TIMEOUT_MS))
            .set_rate_limit(Duration::from_secs(1));

        let mut replies = 0u8;
        for round in 1..=PING_ROUNDS {
            match ping_manager.ping(&ping_params).await {
                Ok(_) => {
                    replies += 1;
                    info!("demo: ping {} #{} answered", PING_TARGET, round);
                }
                Err(err) => warn!("demo: ping {} #{} failed: {:?}", PING_TARGET, round, err),
            }
            Timer::after_secs(PING_INTERVAL_SECS).await;
        }

        info!("demo: {}/{} pings answered", replies, PING_ROUNDS);
    }
}
