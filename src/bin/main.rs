#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

extern crate alloc;

use bringup_core::{
    config::{BringupConfig, DEVICE_NICK_NAME},
    context::NetworkContext,
    network::NetworkTypes,
    provisioning::DeviceCredentials,
    sequencer::{Board, StartupError, StartupOutcome, StartupSequencer},
};
use bringup_hal_esp32::{
    network::{IpStackGate, NetworkManagerHandle, WifiConfig, wifi_connection_loop},
    platform::{
        ble::RadioBle,
        led::{BlinkHandle, blink_loop},
        system::EspPlatform,
        uart::{ConsolePins, ConsolePort},
    },
    storage::flash::NvsFlash,
};
use embassy_executor::Spawner;
use embassy_time::Timer;
use esp_hal::{
    clock::CpuClock,
    gpio::{Level, Output, OutputConfig},
    timer::timg::TimerGroup,
};
use log::{error, info, warn};
use static_cell::StaticCell;

use demos::PingDemos;

#[cfg(feature = "ble")]
#[path = "main/console.rs"]
mod console;
#[path = "main/demos.rs"]
mod demos;

const WIFI_SSID: &str = env!(
    "BRINGUP_WIFI_SSID",
    "Set BRINGUP_WIFI_SSID in your environment before building/flashing."
);
const WIFI_PASSWORD: &str = env!(
    "BRINGUP_WIFI_PASSWORD",
    "Set BRINGUP_WIFI_PASSWORD in your environment before building/flashing."
);
const WIFI_CONFIG: WifiConfig = WifiConfig::new(WIFI_SSID, WIFI_PASSWORD);

const DEVICE_CREDENTIALS: DeviceCredentials<'static> = DeviceCredentials::new(
    match option_env!("BRINGUP_THING_NAME") {
        Some(name) => name,
        None => DEVICE_NICK_NAME,
    },
    match option_env!("BRINGUP_ENDPOINT") {
        Some(endpoint) => endpoint,
        None => "",
    },
    match option_env!("BRINGUP_CLIENT_CERT_PEM") {
        Some(pem) => pem,
        None => "",
    },
    match option_env!("BRINGUP_PRIVATE_KEY_PEM") {
        Some(pem) => pem,
        None => "",
    },
);

const BLE_ENABLED: bool = cfg!(feature = "ble");
const BRINGUP_CONFIG: BringupConfig = BringupConfig::new(BLE_ENABLED);
const SUPPORTED_NETWORKS: NetworkTypes = if BLE_ENABLED {
    NetworkTypes::WIFI.union(NetworkTypes::BLE)
} else {
    NetworkTypes::WIFI
};

static NETWORK_CONTEXT: NetworkContext = NetworkContext::new();
static NETWORK_MANAGER: NetworkManagerHandle = NetworkManagerHandle::new(SUPPORTED_NETWORKS);
static IP_STACK: IpStackGate = IpStackGate::new();
static BLINK: BlinkHandle = BlinkHandle::new();
static CONSOLE: ConsolePort = ConsolePort::new();
static NET_RESOURCES: StaticCell<embassy_net::StackResources<4>> = StaticCell::new();

#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

async fn idle_forever() -> ! {
    loop {
        Timer::after_secs(1).await;
    }
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    esp_println::println!("boot: {} starting", DEVICE_NICK_NAME);

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    // esp-radio requires an allocator.
    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 65536);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let radio = match esp_radio::init() {
        Ok(radio) => radio,
        Err(err) => {
            esp_println::println!("esp-radio init failed: {:?}", err);
            idle_forever().await
        }
    };

    let (mut wifi_controller, interfaces) =
        match esp_radio::wifi::new(&radio, peripherals.WIFI, esp_radio::wifi::Config::default()) {
            Ok(parts) => parts,
            Err(err) => {
                esp_println::println!("wifi peripheral init failed: {:?}", err);
                idle_forever().await
            }
        };
    if let Err(err) = WIFI_CONFIG.apply(&mut wifi_controller) {
        esp_println::println!("wifi mode config failed: {:?}", err);
        idle_forever().await
    }

    let stack_config = embassy_net::Config::dhcpv4(Default::default());
    let (stack, mut net_runner) = embassy_net::new(
        interfaces.sta,
        stack_config,
        NET_RESOURCES.init(embassy_net::StackResources::<4>::new()),
        0x5A17_2B34_D099_EE11,
    );

    // Status LED on GPIO32.
    let mut led = Output::new(peripherals.GPIO32, Level::Low, OutputConfig::default());

    let platform = EspPlatform::new(&IP_STACK, DEVICE_CREDENTIALS).with_console(
        ConsolePins {
            uart: peripherals.UART0,
            tx: peripherals.GPIO1,
            rx: peripherals.GPIO3,
            rts: peripherals.GPIO22,
        },
        &CONSOLE,
    );

    #[cfg(feature = "ble")]
    let ble = RadioBle::new(&radio, peripherals.BT);
    #[cfg(not(feature = "ble"))]
    let ble = RadioBle::new();

    let board = Board {
        platform,
        storage: NvsFlash::new(),
        network: NETWORK_MANAGER.client(),
        blink: BLINK.timer(),
        ble,
        demos: PingDemos::new(stack),
    };
    let mut sequencer = StartupSequencer::new(board, &NETWORK_CONTEXT, BRINGUP_CONFIG);

    let net_future = async {
        IP_STACK.wait_open().await;
        net_runner.run().await
    };
    let wifi_future = wifi_connection_loop(&mut wifi_controller, stack, &NETWORK_MANAGER);
    let blink_future = blink_loop(&BLINK, &mut led);
    let startup_future = async {
        match sequencer.run().await {
            Ok(StartupOutcome::DemosCompleted) => {
                info!("demos completed");
                #[cfg(feature = "ble")]
                let _ = bringup_core::ble::teardown_ble_stack(&mut sequencer.board_mut().ble);
            }
            Ok(StartupOutcome::Halted(reason)) => error!("halted: {:?}", reason),
            Ok(outcome) => warn!("startup ended early: {:?}", outcome),
            Err(err) => restart_after(err),
        }
        idle_forever().await
    };

    #[cfg(feature = "ble")]
    {
        let console_future = console::console_loop(&CONSOLE);
        let _ = embassy_futures::join::join5(
            net_future,
            wifi_future,
            blink_future,
            startup_future,
            console_future,
        )
        .await;
    }
    #[cfg(not(feature = "ble"))]
    let _ =
        embassy_futures::join::join4(net_future, wifi_future, blink_future, startup_future).await;

    unreachable!()
}

fn restart_after(err: StartupError) -> ! {
    error!("startup failed: {:?}; restarting", err);
    esp_hal::system::software_reset()
}
