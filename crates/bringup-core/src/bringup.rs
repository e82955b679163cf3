//! Network bring-up: libraries, manager, subscription, enable request and the
//! unbounded wait for the demo network.
//!
//! ```text
//! Init -> LibsReady -> ManagerReady -> Subscribed -> NetworksRequested
//!      -> Connected | Waiting -> Connected
//!      -> Done
//! any step -> Failed (restart, then best-effort cleanup)
//! ```

use heapless::Vec;
use log::{debug, error, info, warn};

use crate::{
    config::BringupConfig,
    context::NetworkContext,
    network::{NetworkManager, NetworkTypes},
    platform::{BlinkTimer, Platform},
};

const MAX_STAGES: usize = 10;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BringupStage {
    Init,
    LibsReady,
    ManagerReady,
    Subscribed,
    NetworksRequested,
    Waiting,
    Connected,
    Done,
    Failed,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BringupFailure {
    SdkInit,
    ManagerInit,
    MailboxUnavailable,
    Subscribe,
    NetworksNotEnabled {
        requested: NetworkTypes,
        enabled: NetworkTypes,
    },
}

/// What happened during one bring-up attempt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BringupReport {
    stages: Vec<BringupStage, MAX_STAGES>,
    failure: Option<BringupFailure>,
    connected: NetworkTypes,
    restart_requests: u8,
    restarts_issued: u8,
}

impl BringupReport {
    fn new() -> Self {
        let mut stages = Vec::new();
        let _ = stages.push(BringupStage::Init);
        Self {
            stages,
            failure: None,
            connected: NetworkTypes::NONE,
            restart_requests: 0,
            restarts_issued: 0,
        }
    }

    pub fn stages(&self) -> &[BringupStage] {
        &self.stages
    }

    pub fn final_stage(&self) -> BringupStage {
        self.stages.last().copied().unwrap_or(BringupStage::Init)
    }

    pub fn failure(&self) -> Option<BringupFailure> {
        self.failure
    }

    pub fn is_success(&self) -> bool {
        self.final_stage() == BringupStage::Done
    }

    pub fn waited(&self) -> bool {
        self.stages.contains(&BringupStage::Waiting)
    }

    pub fn connected(&self) -> NetworkTypes {
        self.connected
    }

    /// Restart requests made by the failure paths.
    pub fn restart_requests(&self) -> u8 {
        self.restart_requests
    }

    /// Restarts actually handed to the platform.
    pub fn restarts_issued(&self) -> u8 {
        self.restarts_issued
    }
}

pub struct NetworkBringup<'a, P, N, L> {
    platform: &'a mut P,
    manager: &'a mut N,
    blink: &'a mut L,
    context: &'static NetworkContext,
    config: &'a BringupConfig,
    report: BringupReport,
    libs_initialized: bool,
}

impl<'a, P, N, L> NetworkBringup<'a, P, N, L>
where
    P: Platform,
    N: NetworkManager,
    L: BlinkTimer,
{
    pub fn new(
        platform: &'a mut P,
        manager: &'a mut N,
        blink: &'a mut L,
        context: &'static NetworkContext,
        config: &'a BringupConfig,
    ) -> Self {
        Self {
            platform,
            manager,
            blink,
            context,
            config,
            report: BringupReport::new(),
            libs_initialized: false,
        }
    }

    pub async fn run(mut self) -> BringupReport {
        match self.connect().await {
            Ok(connected) => {
                self.report.connected = connected;
                self.enter(BringupStage::Done);
            }
            Err(failure) => self.fail(failure),
        }
        self.report
    }

    async fn connect(&mut self) -> Result<NetworkTypes, BringupFailure> {
        if !self.platform.init_sdk() {
            info!("Failed to initialize the common library.");
            return Err(BringupFailure::SdkInit);
        }
        self.libs_initialized = true;
        self.enter(BringupStage::LibsReady);

        if let Err(err) = self.manager.init() {
            error!("Failed to initialize network manager library: {:?}", err);
            return Err(BringupFailure::ManagerInit);
        }
        self.enter(BringupStage::ManagerReady);

        if self.context.arm().is_err() {
            error!("Failed to create semaphore to wait for a network connection.");
            return Err(BringupFailure::MailboxUnavailable);
        }
        let subscription = self
            .manager
            .subscribe(self.config.demo_network, self.context)
            .map_err(|err| {
                error!("Failed to subscribe network state change callback: {:?}", err);
                BringupFailure::Subscribe
            })?;
        self.context.set_subscription(subscription);
        self.enter(BringupStage::Subscribed);

        info!("Connecting to network");
        let requested = self.config.enabled_networks;
        let enabled = self.manager.enable_networks(requested);
        if enabled != requested {
            error!(
                "Failed to initialize all the networks configured for the device (requested={:#x} enabled={:#x}).",
                requested.bits(),
                enabled.bits()
            );
            self.restart();
            return Err(BringupFailure::NetworksNotEnabled { requested, enabled });
        }
        self.enter(BringupStage::NetworksRequested);

        let target = self.config.demo_network;
        let connected = self.manager.connected_networks() & target;
        self.context.record_connected(connected);
        if !connected.is_none() {
            debug!("network {:#x} already up; skipping wait", connected.bits());
            self.enter(BringupStage::Connected);
            return Ok(connected);
        }

        self.enter(BringupStage::Waiting);
        let blinking = match self.blink.start(self.config.blink_period_ms) {
            Ok(()) => true,
            Err(err) => {
                warn!("Unable to create the timer for led blinking: {:?}", err);
                false
            }
        };

        info!("No networks connected for the demo. Waiting for a network connection.");
        let signaled = self.context.wait_for_network().await;
        let connected = self.manager.connected_networks() & target;
        self.context.record_connected(connected);
        if blinking {
            self.blink.stop();
        }
        debug!(
            "wait released by {:#x}; connected={:#x}",
            signaled.bits(),
            connected.bits()
        );

        self.enter(BringupStage::Connected);
        Ok(connected)
    }

    fn fail(&mut self, failure: BringupFailure) {
        error!("network bring-up failed: {:?}", failure);
        self.report.failure = Some(failure);
        self.enter(BringupStage::Failed);
        self.restart();

        // Only reached when the restart returns.
        if self.context.disarm() {
            debug!("wait mailbox released");
        }
        if self.libs_initialized {
            self.platform.cleanup_sdk();
        }
    }

    /// Restart requests collapse: the device is reset at most once per attempt.
    fn restart(&mut self) {
        self.report.restart_requests = self.report.restart_requests.saturating_add(1);
        if self.report.restarts_issued > 0 {
            return;
        }
        warn!(" .... RESETTING ............ ");
        self.report.restarts_issued = 1;
        self.platform.restart();
    }

    fn enter(&mut self, stage: BringupStage) {
        debug!("bring-up: {:?}", stage);
        let _ = self.report.stages.push(stage);
    }
}

#[cfg(test)]
mod tests;
