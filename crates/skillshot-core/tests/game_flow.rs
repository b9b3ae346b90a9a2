//! Lifecycle and switch-pipeline tests, driving the controller the way a
//! real machine would: boot states from the platform, switch transitions in,
//! media events and coil commands out.

use std::sync::{Arc, Mutex};

use skillshot_core::devices::{Switch, SwitchState};
use skillshot_core::mode::{Lifecycle, Mode, ModeApi, ModeScope, SwitchResult};
use skillshot_core::modes::{TroughConfig, TroughMode};
use skillshot_core::test_helpers::{PlatformCommand, TestRig};

/// Counts the `target_a` activations it sees.
struct Tally {
    hits: Arc<Mutex<u32>>,
    priority: i32,
}

impl Tally {
    fn new(hits: &Arc<Mutex<u32>>, priority: i32) -> Self {
        Self {
            hits: Arc::clone(hits),
            priority,
        }
    }

    fn on_hit(&mut self, _scope: &mut ModeScope<'_, '_, Self>, _switch: &Switch) -> SwitchResult {
        *self.hits.lock().unwrap() += 1;
        SwitchResult::Continue
    }
}

impl Mode for Tally {
    fn priority(&self) -> i32 {
        self.priority
    }

    fn mode_started(&mut self, api: &mut ModeApi<'_, '_, Self>) {
        api.on_active("target_a", Self::on_hit);
    }
}

fn trough() -> TroughMode {
    TroughMode::new(TroughConfig::default())
}

/// Ball leaves the trough, crosses the shooter lane, and is plunged.
fn launch(rig: &mut TestRig) {
    rig.deactivate("trough_1");
    rig.activate("shooter_lane");
    rig.deactivate("shooter_lane");
}

fn drain(rig: &mut TestRig) {
    rig.activate("trough_1");
}

#[test]
fn startup_reads_initial_switch_states() {
    let mut rig = TestRig::new();
    rig.game.startup().unwrap();
    let switch = rig.game.machine().switches().get("trough_1").unwrap();
    // NC opto reading physically open means a ball is present.
    assert_eq!(switch.state(), SwitchState::Open);
    assert!(switch.is_active());
    assert!(switch.changed_at().is_none());
}

#[test]
fn only_system_modes_are_added_at_startup() {
    let mut rig = TestRig::new();
    let hits = Arc::new(Mutex::new(0));
    rig.game
        .register(Tally::new(&hits, 10), Some(Lifecycle::System));
    rig.game.register(Tally::new(&hits, 20), Some(Lifecycle::Game));
    rig.game.register(Tally::new(&hits, 30), Some(Lifecycle::Ball));
    rig.game.startup().unwrap();
    assert_eq!(rig.game.queue().len(), 1);
}

#[test]
fn full_single_player_game_over_three_balls() {
    let mut rig = TestRig::new();
    rig.game.register(trough(), None);
    rig.game.startup().unwrap();
    rig.game.start_game();

    for ball in 1..=3 {
        assert_eq!(rig.game.ball(), ball);
        launch(&mut rig);
        drain(&mut rig);
    }
    assert!(!rig.game.game_in_progress());
    assert_eq!(rig.game.ball(), 0);

    let names = rig.media.names();
    let game_started = names.iter().position(|n| *n == "game_started").unwrap();
    let first_ball = names.iter().position(|n| *n == "ball_starting").unwrap();
    assert!(game_started < first_ball);
    assert_eq!(rig.media.count("ball_starting"), 3);
    assert_eq!(rig.media.count("ball_ended"), 3);
    assert_eq!(rig.media.count("game_ended"), 1);

    // One trough eject per ball.
    let ejects = rig
        .platform
        .commands()
        .iter()
        .filter(|c| matches!(c, PlatformCommand::Pulse { address: 101, .. }))
        .count();
    assert_eq!(ejects, 3);
}

#[test]
fn players_rotate_and_the_game_ends_after_the_last_ball() {
    let mut rig = TestRig::new();
    rig.game.startup().unwrap();
    rig.game.start_game();
    rig.game.add_player();
    assert_eq!(rig.game.players().len(), 2);

    let mut seen = Vec::new();
    for _ in 0..10 {
        if !rig.game.game_in_progress() {
            break;
        }
        seen.push((rig.game.ball(), rig.game.current_player_index()));
        rig.game.end_ball();
    }
    assert_eq!(seen, [(1, 0), (1, 1), (2, 0), (2, 1), (3, 0), (3, 1)]);
    assert_eq!(rig.game.ball(), 0);
}

#[test]
fn extra_ball_replays_the_same_player() {
    let mut rig = TestRig::new();
    rig.game.startup().unwrap();
    rig.game.start_game();
    rig.game.add_player();
    rig.game.current_player_mut().unwrap().extra_balls = 1;

    rig.game.end_ball();
    assert_eq!((rig.game.ball(), rig.game.current_player_index()), (1, 0));
    rig.game.end_ball();
    assert_eq!((rig.game.ball(), rig.game.current_player_index()), (1, 1));
}

#[test]
fn start_game_is_idempotent_while_in_progress() {
    let mut rig = TestRig::new();
    rig.game.startup().unwrap();
    rig.game.start_game();
    rig.game.current_player_mut().unwrap().add_score(500);
    rig.game.start_game();
    assert_eq!(rig.media.count("game_started"), 1);
    // The running game was not reset.
    assert_eq!(rig.game.current_player().unwrap().score, 500);
}

#[test]
fn add_player_caps_at_max_players_and_needs_a_game() {
    let mut rig = TestRig::new();
    rig.game.startup().unwrap();
    assert!(!rig.game.add_player());

    rig.game.start_game();
    assert!(rig.game.add_player());
    assert!(rig.game.add_player());
    assert!(rig.game.add_player());
    assert!(!rig.game.add_player());
    assert_eq!(rig.game.players().len(), 4);
    assert_eq!(rig.media.count("player_added"), 3);
}

#[test]
fn ball_state_is_cleared_before_each_ball() {
    let mut rig = TestRig::new();
    rig.game.startup().unwrap();
    rig.game.start_game();
    rig.game
        .current_player_mut()
        .unwrap()
        .set_ball_int("jackpots", 5);
    rig.game.end_ball();
    assert_eq!(rig.game.ball(), 2);
    assert_eq!(
        rig.game.current_player().unwrap().ball_int("jackpots", 0),
        0
    );
}

#[test]
fn game_modes_leave_the_queue_at_game_end() {
    let mut rig = TestRig::new();
    let hits = Arc::new(Mutex::new(0));
    rig.game.register(Tally::new(&hits, 10), Some(Lifecycle::Game));
    rig.game.startup().unwrap();
    assert!(rig.game.queue().is_empty());

    rig.game.start_game();
    assert_eq!(rig.game.queue().len(), 1);
    rig.game.end_game();
    assert!(rig.game.queue().is_empty());
    assert_eq!(rig.game.ball(), 0);
}

#[test]
fn ball_modes_ride_ball_boundaries() {
    let mut rig = TestRig::new();
    let hits = Arc::new(Mutex::new(0));
    rig.game.register(Tally::new(&hits, 10), Some(Lifecycle::Ball));
    rig.game.startup().unwrap();
    rig.game.start_game();
    assert_eq!(rig.game.queue().labels(), ["Tally"]);
    rig.game.end_ball();
    // Ball 2 of the same game: the mode was removed and re-added.
    assert_eq!(rig.game.queue().labels(), ["Tally"]);
    rig.game.end_ball();
    rig.game.end_ball();
    assert!(rig.game.queue().is_empty());
}

#[test]
fn repeated_platform_states_are_deduplicated() {
    let mut rig = TestRig::new();
    let hits = Arc::new(Mutex::new(0));
    let id = rig
        .game
        .register(Tally::new(&hits, 10), Some(Lifecycle::Manual));
    rig.game.startup().unwrap();
    rig.game.add_mode(id).unwrap();

    rig.game.inject_switch("target_a", SwitchState::Closed);
    rig.game.inject_switch("target_a", SwitchState::Closed);
    assert_eq!(*hits.lock().unwrap(), 1);

    rig.game.inject_switch("target_a", SwitchState::Open);
    rig.game.inject_switch("target_a", SwitchState::Closed);
    assert_eq!(*hits.lock().unwrap(), 2);
}

#[test]
fn events_for_unknown_addresses_are_dropped() {
    let mut rig = TestRig::new();
    rig.game.startup().unwrap();
    rig.platform.emit(9999, SwitchState::Closed);
    // Warn-and-drop: the loop keeps running.
    rig.tick();
}

#[test]
fn background_producer_events_wait_for_the_loop() {
    let mut rig = TestRig::new();
    let hits = Arc::new(Mutex::new(0));
    let id = rig
        .game
        .register(Tally::new(&hits, 10), Some(Lifecycle::Manual));
    rig.game.startup().unwrap();
    rig.game.add_mode(id).unwrap();

    // target_a lives at address 16 in the rig machine.
    rig.platform.emit(16, SwitchState::Closed);
    assert_eq!(*hits.lock().unwrap(), 0);
    rig.tick();
    assert_eq!(*hits.lock().unwrap(), 1);
}

#[tokio::test]
async fn run_exits_cleanly_on_cancellation() {
    let mut rig = TestRig::new();
    rig.cancel.cancel();
    rig.game.run(rig.cancel.clone()).await.unwrap();
    assert!(rig.platform.commands().contains(&PlatformCommand::Disconnect));
}

#[tokio::test]
async fn run_loop_processes_events_until_cancelled() {
    let mut rig = TestRig::new();
    let hits = Arc::new(Mutex::new(0));
    // The manual clock never advances, which is fine: event dispatch does
    // not depend on dt.
    rig.game
        .register(Tally::new(&hits, 10), Some(Lifecycle::System));

    let cancel = rig.cancel.clone();
    let platform = rig.platform.clone();
    let canceler = tokio::spawn(async move {
        platform.emit(16, SwitchState::Closed);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        cancel.cancel();
    });

    rig.game.run(rig.cancel.clone()).await.unwrap();
    canceler.await.unwrap();
    assert_eq!(*hits.lock().unwrap(), 1);
}
