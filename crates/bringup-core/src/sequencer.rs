//! Fixed board boot sequence.

use log::{error, info, warn};

use crate::{
    ble::{self, BleBringupError, BleController, BleError},
    bringup::{BringupFailure, BringupReport, NetworkBringup},
    config::BringupConfig,
    context::NetworkContext,
    network::NetworkManager,
    platform::{BlinkTimer, DemoRunner, Platform},
    storage::{self, Storage, StorageError, StorageInit},
};

/// Every external service the boot sequence talks to.
pub struct Board<P, S, N, L, B, D> {
    pub platform: P,
    pub storage: S,
    pub network: N,
    pub blink: L,
    pub ble: B,
    pub demos: D,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HaltReason {
    /// The radio is partially initialized; there is no safe way forward.
    BleStackInit(BleError),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StartupOutcome {
    DemosCompleted,
    SystemInitFailed,
    /// Network bring-up failed and a restart was requested.
    NetworkFailed(BringupFailure),
    /// Terminal halt; the caller idles forever.
    Halted(HaltReason),
}

/// Fatal faults from the misc-init phase.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StartupError {
    Storage(StorageError),
    IpStack,
    BleMemoryRelease(BleError),
}

pub struct StartupSequencer<P, S, N, L, B, D> {
    board: Board<P, S, N, L, B, D>,
    context: &'static NetworkContext,
    config: BringupConfig,
    report: Option<BringupReport>,
}

impl<P, S, N, L, B, D> StartupSequencer<P, S, N, L, B, D>
where
    P: Platform,
    S: Storage,
    N: NetworkManager,
    L: BlinkTimer,
    B: BleController,
    D: DemoRunner,
{
    pub fn new(
        board: Board<P, S, N, L, B, D>,
        context: &'static NetworkContext,
        config: BringupConfig,
    ) -> Self {
        Self {
            board,
            context,
            config,
            report: None,
        }
    }

    pub async fn run(&mut self) -> Result<StartupOutcome, StartupError> {
        self.misc_init()?;

        if !self.board.platform.system_init() {
            error!("system init failed; demos will not run");
            return Ok(StartupOutcome::SystemInitFailed);
        }

        self.board.platform.provision_keys();

        if let Some(halt) = self.init_ble()? {
            return Ok(StartupOutcome::Halted(halt));
        }

        let report = NetworkBringup::new(
            &mut self.board.platform,
            &mut self.board.network,
            &mut self.board.blink,
            self.context,
            &self.config,
        )
        .run()
        .await;
        let failure = report.failure();
        self.report = Some(report);

        match failure {
            None => {
                info!("Network initialized - now running the demos");
                self.board.demos.run_demos().await;
                Ok(StartupOutcome::DemosCompleted)
            }
            Some(failure) => Ok(StartupOutcome::NetworkFailed(failure)),
        }
    }

    fn misc_init(&mut self) -> Result<(), StartupError> {
        // Logging is not up yet; a recovery is reported once it is.
        let recovered = match storage::init_storage(&mut self.board.storage) {
            Ok(StorageInit::Clean) => None,
            Ok(StorageInit::Recovered(cause)) => Some(cause),
            Err(err) => return Err(StartupError::Storage(err)),
        };

        if self.config.ble_enabled
            && let Err(err) = self.board.platform.init_pairing_console(&self.config.console)
        {
            warn!("pairing console init failed: {:?}", err);
        }

        if let Err(err) = self.board.platform.start_logging(&self.config.logging) {
            warn!("logging task creation failed: {:?}", err);
        }
        if let Some(cause) = recovered {
            info!("nvs: recovered from '{}' by erasing the partition", cause);
        }

        info!("Initializing TCP/IP stack");
        self.board.platform.init_ip_stack().map_err(|err| {
            error!("TCP/IP stack init failed: {:?}", err);
            StartupError::IpStack
        })
    }

    fn init_ble(&mut self) -> Result<Option<HaltReason>, StartupError> {
        if !self.config.ble_enabled {
            ble::release_ble_memory(&mut self.board.ble).map_err(StartupError::BleMemoryRelease)?;
            return Ok(None);
        }

        match ble::bring_up_ble(&mut self.board.ble) {
            Ok(()) => Ok(None),
            Err(BleBringupError::MemoryRelease(err)) => Err(StartupError::BleMemoryRelease(err)),
            Err(BleBringupError::StackInit(err)) => {
                error!("Failed to initialize the bluetooth stack: {:?}", err);
                Ok(Some(HaltReason::BleStackInit(err)))
            }
        }
    }

    pub fn board(&self) -> &Board<P, S, N, L, B, D> {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut Board<P, S, N, L, B, D> {
        &mut self.board
    }

    pub fn config(&self) -> &BringupConfig {
        &self.config
    }

    /// Network bring-up report, once that phase ran.
    pub fn network_report(&self) -> Option<&BringupReport> {
        self.report.as_ref()
    }

    pub fn into_board(self) -> Board<P, S, N, L, B, D> {
        self.board
    }
}
