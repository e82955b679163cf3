use bringup_core::uart::read_user_message;
use bringup_hal_esp32::platform::uart::ConsolePort;
use log::info;

const CONSOLE_TIMEOUT_MS: u32 = 10_000;

/// Logs whatever the user types on the pairing console.
pub(super) async fn console_loop(port: &'static ConsolePort) -> ! {
    let mut console = port.take().await;
    info!("console: ready for pairing confirmations");

    loop {
        let Some(message) = read_user_message(&mut console, CONSOLE_TIMEOUT_MS).await else {
            continue;
        };
        match core::str::from_utf8(message.as_bytes()) {
            Ok(text) => info!("console: {}", text.trim_end()),
            Err(_) => info!("console: {} bytes", message.len()),
        }
    }
}
