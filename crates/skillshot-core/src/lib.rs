//! Machine-agnostic pinball runtime.
//!
//! The core turns raw switch events from a [`platform::Platform`] backend
//! into prioritized, cooperatively-scheduled game behavior composed from
//! [`mode::Mode`]s. The [`game::GameController`] owns the loop, the device
//! tables, the players, and the lifecycle state machine; [`modes`] holds the
//! built-in building blocks (trough, tilt, bonus, ball search, drop targets,
//! service, high score, attract).

pub mod clock;
pub mod config;
pub mod devices;
pub mod error;
pub mod game;
pub mod media;
pub mod mode;
pub mod modes;
pub mod persist;
pub mod platform;
pub mod player;
pub mod queue;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::clock::GameClock;
    use crate::config::{CoilSpec, LedSpec, SwitchSpec};
    use crate::devices::{HardwareAddress, LedColor, SwitchKind, SwitchState, SwitchTag};
    use crate::error::PlatformError;
    use crate::game::GameController;
    use crate::media::{MediaEvent, MediaSink};
    use crate::persist::{HighScore, HighScoreStore};
    use crate::platform::{BumperRule, FlipperRule, Platform, SwitchChange};

    /// Everything a [`FakePlatform`] was asked to do, in order.
    #[derive(Debug, Clone, PartialEq)]
    pub enum PlatformCommand {
        Connect,
        Disconnect,
        Pulse { address: HardwareAddress, ms: u32 },
        Hold { address: HardwareAddress },
        Disable { address: HardwareAddress },
        FlipperRule(FlipperRule),
        BumperRule(BumperRule),
        RemoveRule { switch: HardwareAddress },
        Led { address: HardwareAddress, color: LedColor },
        LedRun { start: HardwareAddress, count: usize },
    }

    struct FakeInner {
        connected: bool,
        initial: HashMap<HardwareAddress, SwitchState>,
        events: Option<mpsc::UnboundedSender<SwitchChange>>,
    }

    /// Recording platform double. Clones share state, so a test can keep one
    /// handle and give the controller another.
    #[derive(Clone)]
    pub struct FakePlatform {
        inner: Arc<Mutex<FakeInner>>,
        commands: Arc<Mutex<Vec<PlatformCommand>>>,
    }

    impl Default for FakePlatform {
        fn default() -> Self {
            Self::new()
        }
    }

    impl FakePlatform {
        pub fn new() -> Self {
            Self {
                inner: Arc::new(Mutex::new(FakeInner {
                    connected: false,
                    initial: HashMap::new(),
                    events: None,
                })),
                commands: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn handle(&self) -> Arc<dyn Platform> {
            Arc::new(self.clone())
        }

        /// Seed the boot-time state for one switch address.
        pub fn set_initial(&self, address: HardwareAddress, state: SwitchState) {
            self.inner.lock().unwrap().initial.insert(address, state);
        }

        /// Push a switch change through the connected event channel, as a
        /// background producer would.
        pub fn emit(&self, address: HardwareAddress, state: SwitchState) {
            let inner = self.inner.lock().unwrap();
            match &inner.events {
                Some(tx) => {
                    let _ = tx.send(SwitchChange { address, state });
                },
                None => panic!("emit() before connect()"),
            }
        }

        pub fn commands(&self) -> Vec<PlatformCommand> {
            self.commands.lock().unwrap().clone()
        }

        pub fn clear_commands(&self) {
            self.commands.lock().unwrap().clear();
        }

        fn record(&self, command: PlatformCommand) {
            self.commands.lock().unwrap().push(command);
        }
    }

    impl Platform for FakePlatform {
        fn connect(
            &self,
            events: mpsc::UnboundedSender<SwitchChange>,
            _cancel: CancellationToken,
        ) -> Result<(), PlatformError> {
            let mut inner = self.inner.lock().unwrap();
            if inner.connected {
                return Err(PlatformError::AlreadyConnected);
            }
            inner.connected = true;
            inner.events = Some(events);
            drop(inner);
            self.record(PlatformCommand::Connect);
            Ok(())
        }

        fn disconnect(&self) -> Result<(), PlatformError> {
            let mut inner = self.inner.lock().unwrap();
            inner.connected = false;
            inner.events = None;
            drop(inner);
            self.record(PlatformCommand::Disconnect);
            Ok(())
        }

        fn initial_switch_states(
            &self,
        ) -> Result<HashMap<HardwareAddress, SwitchState>, PlatformError> {
            let inner = self.inner.lock().unwrap();
            if !inner.connected {
                return Err(PlatformError::NotConnected);
            }
            Ok(inner.initial.clone())
        }

        fn pulse_coil(&self, address: HardwareAddress, ms: u32) {
            self.record(PlatformCommand::Pulse { address, ms });
        }

        fn hold_coil(&self, address: HardwareAddress) {
            self.record(PlatformCommand::Hold { address });
        }

        fn disable_coil(&self, address: HardwareAddress) {
            self.record(PlatformCommand::Disable { address });
        }

        fn configure_flipper_rule(&self, rule: FlipperRule) {
            self.record(PlatformCommand::FlipperRule(rule));
        }

        fn configure_bumper_rule(&self, rule: BumperRule) {
            self.record(PlatformCommand::BumperRule(rule));
        }

        fn remove_hardware_rule(&self, switch: HardwareAddress) {
            self.record(PlatformCommand::RemoveRule { switch });
        }

        fn set_led(&self, address: HardwareAddress, color: LedColor) {
            self.record(PlatformCommand::Led { address, color });
        }

        fn set_led_run(&self, start: HardwareAddress, colors: &[LedColor]) {
            self.record(PlatformCommand::LedRun {
                start,
                count: colors.len(),
            });
        }
    }

    /// Shared view of everything a [`RecordingSink`] saw.
    #[derive(Clone, Default)]
    pub struct MediaLog {
        events: Arc<Mutex<Vec<MediaEvent>>>,
    }

    impl MediaLog {
        pub fn events(&self) -> Vec<MediaEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn names(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().iter().map(|e| e.name()).collect()
        }

        pub fn count(&self, name: &str) -> usize {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.name() == name)
                .count()
        }

        pub fn contains(&self, name: &str) -> bool {
            self.count(name) > 0
        }

        pub fn clear(&self) {
            self.events.lock().unwrap().clear();
        }
    }

    /// Media sink that appends every event to a shared [`MediaLog`].
    pub struct RecordingSink {
        log: MediaLog,
    }

    impl RecordingSink {
        pub fn new(log: MediaLog) -> Self {
            Self { log }
        }
    }

    impl MediaSink for RecordingSink {
        fn post(&mut self, event: &MediaEvent) {
            self.log.events.lock().unwrap().push(event.clone());
        }
    }

    /// In-memory high-score store; clones share the table.
    #[derive(Clone, Default)]
    pub struct MemoryHighScoreStore {
        entries: Arc<Mutex<Vec<HighScore>>>,
    }

    impl MemoryHighScoreStore {
        pub fn with_entries(entries: Vec<HighScore>) -> Self {
            Self {
                entries: Arc::new(Mutex::new(entries)),
            }
        }

        pub fn entries(&self) -> Vec<HighScore> {
            self.entries.lock().unwrap().clone()
        }
    }

    impl HighScoreStore for MemoryHighScoreStore {
        fn load(&self) -> Vec<HighScore> {
            self.entries.lock().unwrap().clone()
        }

        fn save(&self, entries: &[HighScore]) {
            *self.entries.lock().unwrap() = entries.to_vec();
        }
    }

    /// A connected, configured controller over a [`FakePlatform`] and a
    /// manual clock, with a small standard machine: two flippers with rules
    /// and EOS switches, a four-ball trough, shooter lane, tilt bob and slam,
    /// start and service buttons, a pop bumper, a slingshot, and a three-
    /// target drop bank. Modes are not registered; each test adds what it
    /// exercises, then calls `startup`.
    pub struct TestRig {
        pub game: GameController,
        pub clock: GameClock,
        pub platform: FakePlatform,
        pub media: MediaLog,
        pub cancel: CancellationToken,
    }

    impl Default for TestRig {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestRig {
        pub fn new() -> Self {
            let platform = FakePlatform::new();
            // Balls rest in the trough at boot: NC optos read physically open.
            for address in 10..=13 {
                platform.set_initial(address, SwitchState::Open);
            }
            let media = MediaLog::default();
            let clock = GameClock::manual();
            let mut game = GameController::new(
                platform.handle(),
                Box::new(RecordingSink::new(media.clone())),
            )
            .with_clock(clock.clone());
            let cancel = CancellationToken::new();
            game.connect(&cancel).expect("connect");
            game.configure(|cfg| {
                cfg.add_switch(SwitchSpec::new("left_flipper", 1))?;
                cfg.add_switch(SwitchSpec::new("right_flipper", 2))?;
                cfg.add_switch(SwitchSpec::new("left_flipper_eos", 3).tags([SwitchTag::Eos]))?;
                cfg.add_switch(SwitchSpec::new("right_flipper_eos", 4).tags([SwitchTag::Eos]))?;
                cfg.add_switch(SwitchSpec::new("shooter_lane", 5).tags([SwitchTag::ShooterLane]))?;
                cfg.add_switch(SwitchSpec::new("tilt_bob", 6).no_debounce())?;
                cfg.add_switch(SwitchSpec::new("slam_tilt", 7))?;
                cfg.add_switch(SwitchSpec::new("start_button", 8).tags([SwitchTag::Start]))?;
                cfg.add_switch(SwitchSpec::new("service_button", 9).tags([SwitchTag::Service]))?;
                for i in 1..=4u32 {
                    cfg.add_switch(
                        SwitchSpec::new(format!("trough_{i}"), 9 + i)
                            .normally_closed()
                            .tags([SwitchTag::Trough]),
                    )?;
                }
                cfg.add_switch(SwitchSpec::new("pop_bumper", 14).tags([SwitchTag::Playfield]))?;
                cfg.add_switch(SwitchSpec::new("left_sling", 15).tags([SwitchTag::Playfield]))?;
                for (name, address) in [("target_a", 16), ("target_b", 17), ("target_c", 18)] {
                    cfg.add_switch(SwitchSpec::new(name, address).tags([SwitchTag::Playfield]))?;
                }

                cfg.add_coil(CoilSpec::new("trough_eject", 101).pulse_ms(40))?;
                cfg.add_coil(CoilSpec::new("pop_bumper_coil", 102).pulse_ms(20))?;
                cfg.add_coil(CoilSpec::new("left_sling_coil", 103).pulse_ms(20))?;
                cfg.add_coil(CoilSpec::new("drop_reset", 104).pulse_ms(50))?;
                cfg.add_coil(CoilSpec::new("left_flipper_main", 105))?;
                cfg.add_coil(CoilSpec::new("right_flipper_main", 106))?;
                cfg.add_led(LedSpec::new("start_lamp", 201))?;

                cfg.add_flipper_rule("left_flipper", "left_flipper_main", 30, 0.25)?;
                cfg.add_flipper_rule("right_flipper", "right_flipper_main", 30, 0.25)?;
                cfg.add_bumper_rule("pop_bumper", "pop_bumper_coil", 20)?;
                Ok(())
            })
            .expect("configure");
            Self {
                game,
                clock,
                platform,
                media,
                cancel,
            }
        }

        /// Drive a switch to its active state (polarity aware).
        pub fn activate(&mut self, name: &str) {
            self.set_active(name, true);
        }

        pub fn deactivate(&mut self, name: &str) {
            self.set_active(name, false);
        }

        fn set_active(&mut self, name: &str, active: bool) {
            let kind = self
                .game
                .machine()
                .switches()
                .get(name)
                .unwrap_or_else(|| panic!("no switch named `{name}`"))
                .kind();
            let state = match (kind, active) {
                (SwitchKind::NormallyOpen, true) | (SwitchKind::NormallyClosed, false) => {
                    SwitchState::Closed
                },
                (SwitchKind::NormallyOpen, false) | (SwitchKind::NormallyClosed, true) => {
                    SwitchState::Open
                },
            };
            self.game.inject_switch(name, state);
        }

        /// Active then inactive, like a ball rolling over the switch.
        pub fn tap(&mut self, name: &str) {
            self.activate(name);
            self.deactivate(name);
        }

        pub fn tick(&mut self) {
            self.game.run_once();
        }

        /// Advance the manual clock and run one loop iteration.
        pub fn advance(&mut self, secs: f64) {
            self.clock.advance_secs(secs);
            self.game.run_once();
        }
    }
}
