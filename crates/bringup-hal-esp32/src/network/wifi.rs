use bringup_core::network::NetworkTypes;
use embassy_net::Stack;
use embassy_time::{Duration, Timer, WithTimeout};
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController, WifiError};
use log::{info, warn};

use super::NetworkManagerHandle;

const RETRY_BACKOFF_MIN_SECS: u64 = 2;
const RETRY_BACKOFF_MAX_SECS: u64 = 120;
const LINK_POLL_INTERVAL_MS: u64 = 500;
const DHCP_TIMEOUT_SECS: u64 = 15;

/// Station credentials baked into the image.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WifiConfig {
    pub ssid: &'static str,
    pub password: &'static str,
}

impl WifiConfig {
    pub const fn new(ssid: &'static str, password: &'static str) -> Self {
        Self { ssid, password }
    }

    pub fn apply(&self, controller: &mut WifiController<'_>) -> Result<(), WifiError> {
        let client = ClientConfig::default()
            .with_ssid(self.ssid.into())
            .with_password(self.password.into());
        controller.set_config(&ModeConfig::Client(client))
    }
}

fn retry_backoff_secs(consecutive_failures: u32) -> u64 {
    // 2, 4, 8, 16, 32, 64, 120, 120, ...
    let shift = consecutive_failures.min(6);
    RETRY_BACKOFF_MIN_SECS
        .saturating_mul(1u64 << shift)
        .min(RETRY_BACKOFF_MAX_SECS)
}

async fn wait_before_retry(consecutive_failures: &mut u32) {
    let delay_secs = retry_backoff_secs(*consecutive_failures);
    *consecutive_failures = consecutive_failures.saturating_add(1);
    info!(
        "wifi retrying in {}s (consecutive_failures={})",
        delay_secs, *consecutive_failures
    );
    Timer::after_secs(delay_secs).await;
}

/// Keeps the station associated once Wi-Fi has been enabled and reports
/// every up/down transition through `manager`. Subscriber callbacks run here.
pub async fn wifi_connection_loop(
    wifi_controller: &mut WifiController<'_>,
    stack: Stack<'_>,
    manager: &'static NetworkManagerHandle,
) -> ! {
    manager.wait_enabled(NetworkTypes::WIFI).await;
    info!("wifi enabled; starting station");

    let mut consecutive_failures = 0u32;

    loop {
        if !wifi_controller.is_started().unwrap_or(false)
            && let Err(err) = wifi_controller.start_async().await
        {
            warn!("wifi start failed: {:?}", err);
            wait_before_retry(&mut consecutive_failures).await;
            continue;
        }

        if let Err(err) = wifi_controller.connect_async().await {
            warn!("wifi connect failed: {:?}", err);
            let _ = wifi_controller.disconnect_async().await;
            wait_before_retry(&mut consecutive_failures).await;
            continue;
        }

        if stack
            .wait_config_up()
            .with_timeout(Duration::from_secs(DHCP_TIMEOUT_SECS))
            .await
            .is_err()
        {
            info!("dhcp timeout; forcing reconnect");
            let _ = wifi_controller.disconnect_async().await;
            wait_before_retry(&mut consecutive_failures).await;
            continue;
        }

        consecutive_failures = 0;
        if let Some(config) = stack.config_v4() {
            info!("wifi connected, address {}", config.address);
        }
        manager.mark_up(NetworkTypes::WIFI);

        loop {
            let link_up = stack.is_link_up();
            let has_ipv4 = stack.config_v4().is_some();
            let is_connected = matches!(wifi_controller.is_connected(), Ok(true));

            if !(link_up && has_ipv4 && is_connected) {
                info!(
                    "wifi state lost (link_up={} has_ipv4={} connected={}); reconnecting",
                    link_up, has_ipv4, is_connected
                );
                break;
            }

            Timer::after_millis(LINK_POLL_INTERVAL_MS).await;
        }

        manager.mark_down(NetworkTypes::WIFI);
        let _ = wifi_controller.disconnect_async().await;
        wait_before_retry(&mut consecutive_failures).await;
    }
}
