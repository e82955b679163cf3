use super::*;
use crate::{
    network::{NetworkState, NetworkStateListener, Subscription},
    test_support::{Event, Journal, MockBlink, MockManager, MockPlatform, leaked_context},
};
use embassy_futures::{block_on, join::join, yield_now};

struct Rig {
    journal: Journal,
    platform: MockPlatform,
    manager: MockManager,
    blink: MockBlink,
    context: &'static NetworkContext,
    config: BringupConfig,
}

impl Rig {
    fn new() -> Self {
        let journal = Journal::default();
        Self {
            platform: MockPlatform::new(&journal),
            manager: MockManager::new(&journal),
            blink: MockBlink::new(&journal),
            context: leaked_context(),
            config: BringupConfig::new(false),
            journal,
        }
    }

    fn run(&mut self) -> BringupReport {
        block_on(
            NetworkBringup::new(
                &mut self.platform,
                &mut self.manager,
                &mut self.blink,
                self.context,
                &self.config,
            )
            .run(),
        )
    }
}

#[test]
fn network_already_up_skips_blink_and_wait() {
    let mut rig = Rig::new();
    rig.manager.connected.set(NetworkTypes::WIFI);

    let report = rig.run();

    assert!(report.is_success());
    assert!(!report.waited());
    assert_eq!(report.connected(), NetworkTypes::WIFI);
    assert_eq!(
        report.stages(),
        [
            BringupStage::Init,
            BringupStage::LibsReady,
            BringupStage::ManagerReady,
            BringupStage::Subscribed,
            BringupStage::NetworksRequested,
            BringupStage::Connected,
            BringupStage::Done,
        ]
    );
    assert!(!rig.journal.contains(Event::BlinkStart(1_000)));
    assert!(!rig.journal.contains(Event::BlinkStop));
    assert_eq!(rig.context.connected(), NetworkTypes::WIFI);
}

#[test]
fn late_network_blinks_during_wait_and_stops_after() {
    let mut rig = Rig::new();
    let connected = rig.manager.connected.clone();
    let journal = rig.journal.clone();
    let context = rig.context;

    let bringup = NetworkBringup::new(
        &mut rig.platform,
        &mut rig.manager,
        &mut rig.blink,
        rig.context,
        &rig.config,
    );
    let network_comes_up = async {
        // Stand-in for the two seconds the link takes to come up.
        for _ in 0..4 {
            yield_now().await;
        }
        assert!(journal.contains(Event::BlinkStart(1_000)));
        assert!(!journal.contains(Event::BlinkStop));

        connected.set(NetworkTypes::WIFI);
        context.on_network_state_changed(NetworkTypes::WIFI, NetworkState::Enabled);
    };

    let (report, ()) = block_on(join(bringup.run(), network_comes_up));

    assert!(report.is_success());
    assert!(report.waited());
    assert_eq!(report.connected(), NetworkTypes::WIFI);
    let start = journal.position(Event::BlinkStart(1_000)).unwrap();
    let stop = journal.position(Event::BlinkStop).unwrap();
    assert!(start < stop);
    assert_eq!(journal.count(Event::Restart), 0);
    assert_eq!(context.post_count(), 1);
}

#[test]
fn only_first_enabled_transition_posts() {
    let mut rig = Rig::new();
    let connected = rig.manager.connected.clone();
    let context = rig.context;

    let bringup = NetworkBringup::new(
        &mut rig.platform,
        &mut rig.manager,
        &mut rig.blink,
        rig.context,
        &rig.config,
    );
    let flapping_link = async {
        yield_now().await;
        connected.set(NetworkTypes::WIFI);
        context.on_network_state_changed(NetworkTypes::WIFI, NetworkState::Enabled);
        context.on_network_state_changed(NetworkTypes::WIFI, NetworkState::Disabled);
        context.on_network_state_changed(NetworkTypes::WIFI, NetworkState::Enabled);
    };

    let (report, ()) = block_on(join(bringup.run(), flapping_link));

    assert!(report.is_success());
    assert_eq!(context.post_count(), 1);
}

#[test]
fn blink_timer_failure_does_not_block_the_wait() {
    let mut rig = Rig::new();
    rig.blink.start_ok = false;
    let connected = rig.manager.connected.clone();
    let context = rig.context;

    let bringup = NetworkBringup::new(
        &mut rig.platform,
        &mut rig.manager,
        &mut rig.blink,
        rig.context,
        &rig.config,
    );
    let network_comes_up = async {
        yield_now().await;
        connected.set(NetworkTypes::WIFI);
        context.on_network_state_changed(NetworkTypes::WIFI, NetworkState::Enabled);
    };

    let (report, ()) = block_on(join(bringup.run(), network_comes_up));

    assert!(report.is_success());
    assert!(!rig.journal.contains(Event::BlinkStop));
}

#[test]
fn subscribes_for_wifi_and_keeps_the_handle() {
    let mut rig = Rig::new();
    rig.manager.connected.set(NetworkTypes::WIFI);

    rig.run();

    assert!(rig.journal.contains(Event::Subscribe(NetworkTypes::WIFI)));
    assert_eq!(rig.context.subscription(), Some(Subscription::new(1)));
    let listener = rig.manager.listener.unwrap();
    listener.on_network_state_changed(NetworkTypes::WIFI, NetworkState::Enabled);
    assert_eq!(rig.context.post_count(), 0);
}

#[test]
fn enable_mismatch_restarts_before_the_wait() {
    let mut rig = Rig::new();
    rig.manager.enable_result = Some(NetworkTypes::NONE);

    let report = rig.run();

    assert_eq!(
        report.failure(),
        Some(BringupFailure::NetworksNotEnabled {
            requested: NetworkTypes::WIFI,
            enabled: NetworkTypes::NONE,
        })
    );
    assert!(!report.stages().contains(&BringupStage::NetworksRequested));
    assert!(!report.waited());
    assert_eq!(report.restart_requests(), 2);
    assert_eq!(report.restarts_issued(), 1);
    assert_eq!(rig.journal.count(Event::Restart), 1);
    assert!(!rig.journal.contains(Event::BlinkStart(1_000)));

    let restart = rig.journal.position(Event::Restart).unwrap();
    let cleanup = rig.journal.position(Event::SdkCleanup).unwrap();
    assert!(restart < cleanup);
    assert!(!rig.context.is_armed());
}

#[test]
fn manager_init_failure_restarts_once() {
    let mut rig = Rig::new();
    rig.manager.init_ok = false;

    let report = rig.run();

    assert_eq!(report.failure(), Some(BringupFailure::ManagerInit));
    assert_eq!(report.final_stage(), BringupStage::Failed);
    assert_eq!(rig.journal.count(Event::Restart), 1);
    assert!(rig.journal.contains(Event::SdkCleanup));
    assert!(!rig.journal.contains(Event::Subscribe(NetworkTypes::WIFI)));
}

#[test]
fn subscribe_failure_restarts_once_and_releases_mailbox() {
    let mut rig = Rig::new();
    rig.manager.subscribe_ok = false;

    let report = rig.run();

    assert_eq!(report.failure(), Some(BringupFailure::Subscribe));
    assert_eq!(rig.journal.count(Event::Restart), 1);
    assert!(!rig.context.is_armed());
    assert!(!rig.journal.contains(Event::Enable(NetworkTypes::WIFI)));
}

#[test]
fn mailbox_creation_failure_restarts_once() {
    let mut rig = Rig::new();
    rig.context.arm().unwrap();

    let report = rig.run();

    assert_eq!(report.failure(), Some(BringupFailure::MailboxUnavailable));
    assert_eq!(rig.journal.count(Event::Restart), 1);
    assert!(!rig.journal.contains(Event::Subscribe(NetworkTypes::WIFI)));
}

#[test]
fn library_init_failure_skips_cleanup() {
    let mut rig = Rig::new();
    rig.platform.sdk_ok = false;

    let report = rig.run();

    assert_eq!(report.failure(), Some(BringupFailure::SdkInit));
    assert_eq!(report.stages(), [BringupStage::Init, BringupStage::Failed]);
    assert_eq!(rig.journal.count(Event::Restart), 1);
    assert!(!rig.journal.contains(Event::SdkCleanup));
    assert!(!rig.journal.contains(Event::ManagerInit));
}

#[test]
fn ble_builds_request_wifi_and_ble_but_wait_for_wifi() {
    let mut rig = Rig::new();
    rig.config = BringupConfig::new(true);
    rig.manager.connected.set(NetworkTypes::WIFI | NetworkTypes::BLE);

    let report = rig.run();

    assert!(report.is_success());
    assert!(
        rig.journal
            .contains(Event::Enable(NetworkTypes::WIFI | NetworkTypes::BLE))
    );
    assert_eq!(report.connected(), NetworkTypes::WIFI);
}
