//! Contract tests for the built-in modes, exercised through the full
//! controller: switch transitions in, coil commands and media events out.

use std::sync::{Arc, Mutex};

use skillshot_core::devices::Switch;
use skillshot_core::media::MediaEvent;
use skillshot_core::mode::{Lifecycle, Mode, ModeApi, ModeScope, SwitchResult};
use skillshot_core::modes::bonus::{self, BonusConfig, BonusMode};
use skillshot_core::modes::{
    AttractConfig, AttractMode, BallSearchConfig, BallSearchMode, DropTargetBankConfig,
    DropTargetBankMode, HighScoreMode, ServiceConfig, ServiceMode, TiltConfig, TiltMode,
    TroughConfig, TroughMode,
};
use skillshot_core::persist::HighScore;
use skillshot_core::platform::FlipperRule;
use skillshot_core::test_helpers::{MemoryHighScoreStore, PlatformCommand, TestRig};

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

fn launch(rig: &mut TestRig) {
    rig.deactivate("trough_1");
    rig.activate("shooter_lane");
    rig.deactivate("shooter_lane");
}

fn drain(rig: &mut TestRig) {
    rig.activate("trough_1");
}

fn pulses_on(rig: &TestRig, address: u32) -> usize {
    rig.platform
        .commands()
        .iter()
        .filter(|c| matches!(c, PlatformCommand::Pulse { address: a, .. } if *a == address))
        .count()
}

// Trough.

#[test]
fn drain_inside_the_save_window_reejects_without_ending_the_ball() {
    let mut rig = TestRig::new();
    let trough_id = rig.game.register(
        TroughMode::new(TroughConfig {
            auto_ball_save_seconds: 5.0,
            ..TroughConfig::default()
        }),
        None,
    );
    rig.game.startup().unwrap();
    rig.game.start_game();
    launch(&mut rig);
    rig.platform.clear_commands();

    rig.advance(2.0);
    drain(&mut rig);

    assert_eq!(pulses_on(&rig, 101), 1);
    assert!(rig.media.contains("ball_saved"));
    assert_eq!(rig.media.count("ball_ended"), 0);
    assert_eq!(rig.game.ball(), 1);

    // The saved ball comes back through the shooter lane.
    rig.deactivate("trough_1");
    rig.activate("shooter_lane");
    rig.deactivate("shooter_lane");
    let trough = rig.game.mode_mut::<TroughMode>(trough_id).unwrap();
    assert_eq!(trough.balls_in_play(), 1);
}

#[test]
fn drain_after_the_save_window_ends_the_ball() {
    let mut rig = TestRig::new();
    rig.game.register(
        TroughMode::new(TroughConfig {
            auto_ball_save_seconds: 5.0,
            ..TroughConfig::default()
        }),
        None,
    );
    rig.game.startup().unwrap();
    rig.game.start_game();
    launch(&mut rig);

    rig.advance(6.0);
    drain(&mut rig);

    assert!(!rig.media.contains("ball_saved"));
    assert_eq!(rig.media.count("ball_ended"), 1);
    assert_eq!(rig.game.ball(), 2);
}

#[test]
fn second_ball_in_play_starts_and_ends_multiball() {
    let mut rig = TestRig::new();
    let trough_id = rig
        .game
        .register(TroughMode::new(TroughConfig::default()), None);
    rig.game.startup().unwrap();
    rig.game.start_game();
    launch(&mut rig);

    rig.game
        .with_mode_ctx::<TroughMode, _>(trough_id, |trough, game| trough.add_ball(game))
        .unwrap();
    rig.deactivate("trough_2");
    rig.activate("shooter_lane");
    rig.deactivate("shooter_lane");

    assert_eq!(
        rig.game
            .mode_mut::<TroughMode>(trough_id)
            .unwrap()
            .balls_in_play(),
        2
    );
    assert!(rig.media.events().contains(&MediaEvent::MultiballStarted { balls_in_play: 2 }));

    rig.activate("trough_2");
    assert!(rig.media.contains("multiball_ended"));
    assert_eq!(rig.game.ball(), 1, "one ball still in play");

    drain(&mut rig);
    assert_eq!(rig.media.count("ball_ended"), 1);
}

// Tilt.

fn tilt_mode() -> TiltMode {
    TiltMode::new(TiltConfig {
        warnings_allowed: 2,
        cooldown_secs: 0.05,
        ..TiltConfig::default()
    })
}

#[test]
fn third_hit_tilts_and_removes_flipper_rules() {
    let mut rig = TestRig::new();
    let tilt_id = rig.game.register(tilt_mode(), None);
    rig.game.startup().unwrap();
    rig.game.start_game();
    rig.platform.clear_commands();

    for _ in 0..3 {
        rig.activate("tilt_bob");
        rig.deactivate("tilt_bob");
        rig.advance(0.1);
    }

    assert_eq!(rig.media.count("tilt_warning"), 2);
    assert_eq!(rig.media.count("tilt"), 1);
    assert!(rig.game.mode_mut::<TiltMode>(tilt_id).unwrap().is_tilted());
    let commands = rig.platform.commands();
    for flipper_switch in [1, 2] {
        assert!(
            commands.contains(&PlatformCommand::RemoveRule {
                switch: flipper_switch
            }),
            "flipper rule on switch {flipper_switch} should be removed"
        );
    }

    // Ball end restores both rules with their original parameters.
    rig.platform.clear_commands();
    rig.game.end_ball();
    let commands = rig.platform.commands();
    assert!(commands.contains(&PlatformCommand::FlipperRule(FlipperRule {
        switch: 1,
        coil: 105,
        pulse_ms: 30,
        hold_power: 0.25,
    })));
    assert!(commands.contains(&PlatformCommand::FlipperRule(FlipperRule {
        switch: 2,
        coil: 106,
        pulse_ms: 30,
        hold_power: 0.25,
    })));
}

#[test]
fn bob_bounces_within_the_cooldown_count_once() {
    let mut rig = TestRig::new();
    rig.game.register(tilt_mode(), None);
    rig.game.startup().unwrap();
    rig.game.start_game();

    rig.activate("tilt_bob");
    rig.deactivate("tilt_bob");
    rig.activate("tilt_bob");

    assert_eq!(rig.media.count("tilt_warning"), 1);
}

#[test]
fn warnings_reset_with_each_ball() {
    let mut rig = TestRig::new();
    let tilt_id = rig.game.register(tilt_mode(), None);
    rig.game.startup().unwrap();
    rig.game.start_game();

    rig.activate("tilt_bob");
    rig.deactivate("tilt_bob");
    assert_eq!(rig.game.mode_mut::<TiltMode>(tilt_id).unwrap().warnings(), 1);

    rig.game.end_ball();
    assert_eq!(rig.game.mode_mut::<TiltMode>(tilt_id).unwrap().warnings(), 0);
}

#[test]
fn slam_tilt_ends_the_game() {
    let mut rig = TestRig::new();
    rig.game.register(tilt_mode(), None);
    rig.game.startup().unwrap();
    rig.game.start_game();

    rig.activate("slam_tilt");
    assert!(rig.media.contains("slam_tilt"));
    assert_eq!(rig.game.ball(), 0);
    assert_eq!(rig.media.count("game_ended"), 1);
}

// Bonus.

fn bonus_mode(step_points: i64, step_interval_secs: f64) -> BonusMode {
    BonusMode::new(BonusConfig {
        step_points,
        step_interval_secs,
        ..BonusConfig::default()
    })
}

#[test]
fn accumulated_bonus_counts_down_in_steps_then_ends_the_ball() {
    let mut rig = TestRig::new();
    rig.game.register(bonus_mode(100, 0.0), None);
    rig.game.startup().unwrap();
    rig.game.start_game();

    rig.game.with_ctx(|game| {
        bonus::add_bonus(game, 100);
        bonus::add_bonus(game, 200);
    });
    assert_eq!(rig.game.with_ctx(|game| bonus::bonus_value(game)), 300);

    rig.game.with_ctx(|game| game.notify_ball_drained());
    for _ in 0..3 {
        rig.tick();
    }

    assert_eq!(rig.game.players()[0].score, 300);
    assert_eq!(rig.game.ball(), 2, "end_ball ran after the countdown");
    assert!(rig.media.events().contains(&MediaEvent::BonusStarted {
        bonus: 300,
        multiplier: 1,
        total: 300,
    }));
    assert_eq!(rig.media.count("bonus_step"), 3);
    assert!(rig
        .media
        .events()
        .contains(&MediaEvent::BonusCompleted { awarded: 300 }));
}

#[test]
fn multiplier_scales_the_total() {
    let mut rig = TestRig::new();
    rig.game.register(bonus_mode(1000, 0.0), None);
    rig.game.startup().unwrap();
    rig.game.start_game();

    rig.game.with_ctx(|game| {
        bonus::add_bonus(game, 100);
        bonus::set_multiplier(game, 3);
    });
    rig.game.with_ctx(|game| game.notify_ball_drained());
    rig.tick();

    assert_eq!(rig.game.players()[0].score, 300);
    assert!(rig.media.events().contains(&MediaEvent::BonusStarted {
        bonus: 100,
        multiplier: 3,
        total: 300,
    }));
    assert!(rig.media.events().contains(&MediaEvent::BonusStep {
        awarded: 300,
        remaining: 0,
    }));
}

#[test]
fn zero_bonus_ends_the_ball_immediately() {
    let mut rig = TestRig::new();
    rig.game.register(bonus_mode(1000, 0.1), None);
    rig.game.startup().unwrap();
    rig.game.start_game();

    rig.game.with_ctx(|game| game.notify_ball_drained());

    assert_eq!(rig.game.ball(), 2);
    assert!(rig
        .media
        .events()
        .contains(&MediaEvent::BonusCompleted { awarded: 0 }));
    assert_eq!(rig.media.count("bonus_step"), 0);
}

// Drop targets.

fn drop_bank() -> DropTargetBankMode {
    DropTargetBankMode::new(DropTargetBankConfig {
        target_switches: vec![
            "target_a".to_string(),
            "target_b".to_string(),
            "target_c".to_string(),
        ],
        reset_coil: "drop_reset".to_string(),
        auto_reset_secs: 2.0,
        ..DropTargetBankConfig::default()
    })
}

#[test]
fn bank_completion_and_auto_reset() {
    let mut rig = TestRig::new();
    let bank_id = rig.game.register(drop_bank(), None);
    rig.game.startup().unwrap();
    rig.game.start_game();

    rig.activate("target_a");
    // Switch bounce: the same target going active again is ignored.
    rig.deactivate("target_a");
    rig.activate("target_a");
    assert_eq!(rig.media.count("drop_target_hit"), 1);

    rig.activate("target_b");
    rig.activate("target_c");
    assert_eq!(rig.media.count("drop_target_hit"), 3);
    assert!(rig.media.events().contains(&MediaEvent::DropTargetBankComplete {
        targets: vec![
            "target_a".to_string(),
            "target_b".to_string(),
            "target_c".to_string(),
        ],
    }));

    rig.platform.clear_commands();
    rig.advance(2.0);
    assert_eq!(pulses_on(&rig, 104), 1);
    assert!(rig.media.contains("drop_target_bank_reset"));
    assert_eq!(
        rig.game
            .mode_mut::<DropTargetBankMode>(bank_id)
            .unwrap()
            .down_count(),
        0
    );

    // Targets are live again after the reset.
    rig.deactivate("target_a");
    rig.activate("target_a");
    assert_eq!(rig.media.count("drop_target_hit"), 4);
}

// Ball search.

fn ball_search() -> BallSearchMode {
    BallSearchMode::new(BallSearchConfig {
        coils: vec!["pop_bumper_coil".to_string(), "left_sling_coil".to_string()],
        ..BallSearchConfig::default()
    })
}

#[test]
fn idle_playfield_triggers_a_round_robin_search() {
    let mut rig = TestRig::new();
    rig.game.register(ball_search(), None);
    rig.game.startup().unwrap();
    rig.game.start_game();
    rig.platform.clear_commands();

    rig.advance(15.0);
    assert!(rig.media.contains("ball_search_started"));
    assert_eq!(pulses_on(&rig, 102), 1);

    rig.advance(0.25);
    assert_eq!(pulses_on(&rig, 103), 1);
    rig.advance(0.25);
    assert_eq!(pulses_on(&rig, 102), 2);

    rig.activate("pop_bumper");
    assert!(rig.media.contains("ball_search_stopped"));

    // No more pulses once the playfield woke up.
    let total = pulses_on(&rig, 102) + pulses_on(&rig, 103);
    rig.advance(0.25);
    assert_eq!(pulses_on(&rig, 102) + pulses_on(&rig, 103), total);
}

#[test]
fn playfield_activity_holds_the_search_off() {
    let mut rig = TestRig::new();
    rig.game.register(ball_search(), None);
    rig.game.startup().unwrap();
    rig.game.start_game();

    for _ in 0..4 {
        rig.advance(10.0);
        rig.tap("pop_bumper");
    }
    assert!(!rig.media.contains("ball_search_started"));
}

#[test]
fn a_ball_in_the_shooter_lane_suspends_the_search_timer() {
    let mut rig = TestRig::new();
    rig.game.register(ball_search(), None);
    rig.game.startup().unwrap();
    rig.game.start_game();

    rig.activate("shooter_lane");
    rig.advance(30.0);
    assert!(!rig.media.contains("ball_search_started"));

    rig.deactivate("shooter_lane");
    rig.advance(15.0);
    assert!(rig.media.contains("ball_search_started"));
}

// Service.

#[test]
fn service_mode_gates_coils_and_intercepts_switches() {
    let mut rig = TestRig::new();
    let hits = Arc::new(Mutex::new(0));
    rig.game.register(ServiceMode::new(ServiceConfig::default()), None);
    let tally_id = rig
        .game
        .register(Tally::new(&hits, 1), Some(Lifecycle::Manual));
    rig.game.startup().unwrap();
    rig.game.add_mode(tally_id).unwrap();

    rig.activate("service_button");
    assert!(rig.media.contains("service_mode_entered"));
    assert!(!rig
        .game
        .machine()
        .coils()
        .get("pop_bumper_coil")
        .unwrap()
        .is_enabled());

    // Playfield activations are reported and swallowed.
    rig.activate("target_a");
    assert_eq!(*hits.lock().unwrap(), 0);
    assert!(rig.media.events().contains(&MediaEvent::ServiceSwitchActivated {
        name: "target_a".to_string(),
    }));

    // Gated coils drop pulses and re-issue the disable.
    rig.platform.clear_commands();
    rig.game.with_ctx(|game| game.pulse("pop_bumper_coil"));
    assert_eq!(pulses_on(&rig, 102), 0);
    assert!(rig
        .platform
        .commands()
        .contains(&PlatformCommand::Disable { address: 102 }));

    rig.deactivate("service_button");
    rig.deactivate("target_a");
    rig.activate("service_button");
    assert!(rig.media.contains("service_mode_exited"));
    assert!(rig
        .game
        .machine()
        .coils()
        .get("pop_bumper_coil")
        .unwrap()
        .is_enabled());

    rig.activate("target_a");
    assert_eq!(*hits.lock().unwrap(), 1);
}

#[test]
fn test_coil_enables_pulses_and_gates_off() {
    let mut rig = TestRig::new();
    let service_id = rig
        .game
        .register(ServiceMode::new(ServiceConfig::default()), None);
    rig.game.startup().unwrap();

    rig.activate("service_button");
    rig.platform.clear_commands();
    rig.game
        .with_mode_ctx::<ServiceMode, _>(service_id, |service, game| {
            service.test_coil(game, "pop_bumper_coil");
        })
        .unwrap();

    let commands = rig.platform.commands();
    assert_eq!(
        commands,
        vec![
            PlatformCommand::Pulse {
                address: 102,
                ms: 20
            },
            PlatformCommand::Disable { address: 102 },
        ]
    );
}

// High score.

fn thousand_club() -> Vec<HighScore> {
    (0..10)
        .map(|i| HighScore {
            name: format!("Player {}", i + 1),
            score: 1000,
            date: "0Z".to_string(),
        })
        .collect()
}

fn play_one_game(rig: &mut TestRig, score: i64) {
    rig.game.start_game();
    rig.game.current_player_mut().unwrap().add_score(score);
    for _ in 0..10 {
        if !rig.game.game_in_progress() {
            break;
        }
        rig.game.end_ball();
    }
}

#[test]
fn low_score_does_not_enter_a_full_table() {
    let mut rig = TestRig::new();
    let store = MemoryHighScoreStore::with_entries(thousand_club());
    rig.game
        .register(HighScoreMode::new(Box::new(store.clone())), None);
    rig.game.startup().unwrap();

    play_one_game(&mut rig, 1);

    let entries = store.entries();
    assert_eq!(entries.len(), 10);
    assert!(entries.iter().all(|e| e.score == 1000));
    assert!(!rig.media.contains("high_score_updated"));
}

#[test]
fn any_score_enters_an_empty_table() {
    let mut rig = TestRig::new();
    let store = MemoryHighScoreStore::default();
    rig.game
        .register(HighScoreMode::new(Box::new(store.clone())), None);
    rig.game.startup().unwrap();

    play_one_game(&mut rig, 0);

    let entries = store.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].score, 0);
    assert_eq!(entries[0].name, "Player 1");
    assert!(rig.media.contains("high_score_updated"));
}

#[test]
fn qualifying_score_displaces_the_lowest_entry() {
    let mut rig = TestRig::new();
    let store = MemoryHighScoreStore::with_entries(thousand_club());
    rig.game
        .register(HighScoreMode::new(Box::new(store.clone())), None);
    rig.game.startup().unwrap();

    play_one_game(&mut rig, 5000);

    let entries = store.entries();
    assert_eq!(entries.len(), 10);
    assert_eq!(entries[0].score, 5000);
    assert_eq!(entries.iter().filter(|e| e.score == 1000).count(), 9);
}

// Attract and game over.

fn attract_rig() -> TestRig {
    let mut rig = TestRig::new();
    rig.game
        .register(AttractMode::new(AttractConfig::default()), None);
    rig.game
        .register(TroughMode::new(TroughConfig::default()), None);
    rig.game.startup().unwrap();
    rig
}

#[test]
fn start_button_starts_a_game_and_buys_players_in_before_the_plunge() {
    let mut rig = attract_rig();

    rig.activate("start_button");
    rig.deactivate("start_button");
    assert_eq!(rig.game.ball(), 1);
    assert_eq!(rig.media.count("game_started"), 1);

    // Before the plunge: another press adds player 2.
    rig.activate("start_button");
    rig.deactivate("start_button");
    assert_eq!(rig.game.players().len(), 2);

    // After the plunge, presses no longer add players.
    launch(&mut rig);
    rig.activate("start_button");
    rig.deactivate("start_button");
    assert_eq!(rig.game.players().len(), 2);
}

#[test]
fn game_over_dwell_expires_back_to_attract() {
    let mut rig = attract_rig();
    rig.activate("start_button");
    rig.deactivate("start_button");
    for _ in 0..10 {
        if !rig.game.game_in_progress() {
            break;
        }
        rig.game.end_ball();
    }
    assert!(rig.game.queue().labels().contains(&"GameOverMode"));

    rig.advance(12.0);
    assert!(!rig.game.queue().labels().contains(&"GameOverMode"));
}

#[test]
fn start_during_the_dwell_begins_the_next_game() {
    let mut rig = attract_rig();
    rig.activate("start_button");
    rig.deactivate("start_button");
    for _ in 0..10 {
        if !rig.game.game_in_progress() {
            break;
        }
        rig.game.end_ball();
    }
    assert!(rig.game.queue().labels().contains(&"GameOverMode"));

    // The game-over mode bows out without consuming the press, so attract
    // sees the same event and starts the next game.
    rig.activate("start_button");
    assert!(!rig.game.queue().labels().contains(&"GameOverMode"));
    assert_eq!(rig.game.ball(), 1);
    assert_eq!(rig.media.count("game_started"), 2);
}

#[test]
fn attract_posts_idle_events_only_between_games() {
    let mut rig = attract_rig();

    rig.advance(30.0);
    assert_eq!(rig.media.count("attract_idle"), 1);
    rig.advance(30.0);
    assert_eq!(rig.media.count("attract_idle"), 2);

    rig.game.start_game();
    rig.advance(30.0);
    assert_eq!(rig.media.count("attract_idle"), 2);
}
