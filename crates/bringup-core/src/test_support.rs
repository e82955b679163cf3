use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
};

use crate::{
    ble::{BleController, BleError, BleMode, BleStatus},
    config::LoggingConfig,
    context::NetworkContext,
    network::{NetworkManager, NetworkStateListener, NetworkTypes, Subscription},
    platform::{BlinkTimer, DemoRunner, Platform},
    storage::{Storage, StorageError},
    uart::UartSettings,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Event {
    StorageInit,
    StorageErase,
    PairingConsole,
    Logging,
    IpStack,
    SystemInit,
    ProvisionKeys,
    BleRelease(BleMode),
    BleInit,
    SdkInit,
    SdkCleanup,
    ManagerInit,
    Subscribe(NetworkTypes),
    Enable(NetworkTypes),
    BlinkStart(u32),
    BlinkStop,
    Restart,
    Demos,
}

#[derive(Clone, Default)]
pub struct Journal(Rc<RefCell<Vec<Event>>>);

impl Journal {
    pub fn record(&self, event: Event) {
        self.0.borrow_mut().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.borrow().clone()
    }

    pub fn count(&self, event: Event) -> usize {
        self.0.borrow().iter().filter(|e| **e == event).count()
    }

    pub fn contains(&self, event: Event) -> bool {
        self.count(event) > 0
    }

    pub fn position(&self, event: Event) -> Option<usize> {
        self.0.borrow().iter().position(|e| *e == event)
    }
}

pub fn leaked_context() -> &'static NetworkContext {
    Box::leak(Box::new(NetworkContext::new()))
}

pub struct MockPlatform {
    pub journal: Journal,
    pub system_ok: bool,
    pub sdk_ok: bool,
    pub ip_stack_ok: bool,
    pub logging_ok: bool,
    pub console_ok: bool,
}

impl MockPlatform {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            system_ok: true,
            sdk_ok: true,
            ip_stack_ok: true,
            logging_ok: true,
            console_ok: true,
        }
    }
}

impl Platform for MockPlatform {
    type Error = &'static str;

    fn init_pairing_console(&mut self, _settings: &UartSettings) -> Result<(), Self::Error> {
        self.journal.record(Event::PairingConsole);
        if self.console_ok { Ok(()) } else { Err("console") }
    }

    fn start_logging(&mut self, _config: &LoggingConfig) -> Result<(), Self::Error> {
        self.journal.record(Event::Logging);
        if self.logging_ok { Ok(()) } else { Err("logging") }
    }

    fn init_ip_stack(&mut self) -> Result<(), Self::Error> {
        self.journal.record(Event::IpStack);
        if self.ip_stack_ok {
            Ok(())
        } else {
            Err("ip stack")
        }
    }

    fn system_init(&mut self) -> bool {
        self.journal.record(Event::SystemInit);
        self.system_ok
    }

    fn provision_keys(&mut self) {
        self.journal.record(Event::ProvisionKeys);
    }

    fn init_sdk(&mut self) -> bool {
        self.journal.record(Event::SdkInit);
        self.sdk_ok
    }

    fn cleanup_sdk(&mut self) {
        self.journal.record(Event::SdkCleanup);
    }

    fn restart(&mut self) {
        self.journal.record(Event::Restart);
    }
}

pub struct MockStorage {
    pub journal: Journal,
    pub init_results: VecDeque<Result<(), StorageError>>,
}

impl MockStorage {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            init_results: VecDeque::new(),
        }
    }
}

impl Storage for MockStorage {
    fn init(&mut self) -> Result<(), StorageError> {
        self.journal.record(Event::StorageInit);
        self.init_results.pop_front().unwrap_or(Ok(()))
    }

    fn erase(&mut self) -> Result<(), StorageError> {
        self.journal.record(Event::StorageErase);
        Ok(())
    }
}

/// Network manager double. `connected` is shared so a test can bring the
/// network up from a concurrent future.
pub struct MockManager {
    pub journal: Journal,
    pub init_ok: bool,
    pub subscribe_ok: bool,
    /// `None` enables exactly what was requested.
    pub enable_result: Option<NetworkTypes>,
    pub connected: Rc<Cell<NetworkTypes>>,
    pub listener: Option<&'static dyn NetworkStateListener>,
}

impl MockManager {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            init_ok: true,
            subscribe_ok: true,
            enable_result: None,
            connected: Rc::new(Cell::new(NetworkTypes::NONE)),
            listener: None,
        }
    }
}

impl NetworkManager for MockManager {
    type Error = &'static str;

    fn init(&mut self) -> Result<(), Self::Error> {
        self.journal.record(Event::ManagerInit);
        if self.init_ok { Ok(()) } else { Err("manager") }
    }

    fn subscribe(
        &mut self,
        network: NetworkTypes,
        listener: &'static dyn NetworkStateListener,
    ) -> Result<Subscription, Self::Error> {
        self.journal.record(Event::Subscribe(network));
        if !self.subscribe_ok {
            return Err("subscribe");
        }
        self.listener = Some(listener);
        Ok(Subscription::new(1))
    }

    fn enable_networks(&mut self, requested: NetworkTypes) -> NetworkTypes {
        self.journal.record(Event::Enable(requested));
        self.enable_result.unwrap_or(requested)
    }

    fn connected_networks(&self) -> NetworkTypes {
        self.connected.get()
    }
}

pub struct MockBlink {
    pub journal: Journal,
    pub start_ok: bool,
}

impl MockBlink {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            start_ok: true,
        }
    }
}

impl BlinkTimer for MockBlink {
    type Error = &'static str;

    fn start(&mut self, period_ms: u32) -> Result<(), Self::Error> {
        if !self.start_ok {
            return Err("timer");
        }
        self.journal.record(Event::BlinkStart(period_ms));
        Ok(())
    }

    fn stop(&mut self) {
        self.journal.record(Event::BlinkStop);
    }
}

pub struct MockBle {
    pub journal: Journal,
    pub init_result: Result<(), BleError>,
    pub release_result: Result<(), BleError>,
}

impl MockBle {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            init_result: Ok(()),
            release_result: Ok(()),
        }
    }
}

impl BleController for MockBle {
    fn mem_release(&mut self, mode: BleMode) -> Result<(), BleError> {
        self.journal.record(Event::BleRelease(mode));
        self.release_result
    }

    fn init(&mut self) -> Result<(), BleError> {
        self.journal.record(Event::BleInit);
        self.init_result
    }

    fn adapter_status(&self) -> BleStatus {
        BleStatus::Idle
    }

    fn disable_adapter(&mut self) -> Result<(), BleError> {
        Ok(())
    }

    fn deinit_adapter(&mut self) -> Result<(), BleError> {
        Ok(())
    }

    fn controller_status(&self) -> BleStatus {
        BleStatus::Idle
    }

    fn disable_controller(&mut self) -> Result<(), BleError> {
        Ok(())
    }

    fn deinit_controller(&mut self) -> Result<(), BleError> {
        Ok(())
    }
}

pub struct MockDemos {
    pub journal: Journal,
}

impl DemoRunner for MockDemos {
    async fn run_demos(&mut self) {
        self.journal.record(Event::Demos);
    }
}
