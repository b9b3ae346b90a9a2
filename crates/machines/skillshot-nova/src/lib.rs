//! Nova Strike: a small but complete machine built on the skillshot runtime.
//! The playfield has two flippers, three pop bumpers, two slingshots, a
//! three-target drop bank, a standup, and a skillshot lane.

use serde::Deserialize;

use skillshot_core::config::{CoilSpec, LedSpec, MachineConfig, SwitchSpec};
use skillshot_core::devices::{HardwareAddress, Switch, SwitchTag};
use skillshot_core::error::ConfigError;
use skillshot_core::media::{MediaEvent, MediaSink};
use skillshot_core::mode::{Lifecycle, Mode, ModeApi, ModeScope, SwitchResult};
use skillshot_core::modes::bonus;
use skillshot_core::modes::trough::BALL_IN_PLAY_KEY;

/// Trough opto addresses, lowest ball first. The sim seeds these as active
/// at boot (balls resting in the trough).
pub const TROUGH_ADDRESSES: [HardwareAddress; 4] = [10, 11, 12, 13];
pub const START_BUTTON_ADDRESS: HardwareAddress = 8;
pub const SHOOTER_LANE_ADDRESS: HardwareAddress = 5;
pub const TROUGH_1_ADDRESS: HardwareAddress = 10;
pub const POP_LEFT_ADDRESS: HardwareAddress = 14;

/// Machine tunables, loaded from `nova.toml` next to the binary. Anything
/// missing falls back to the defaults below.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NovaConfig {
    pub pop_bumper_points: i64,
    pub slingshot_points: i64,
    pub standup_points: i64,
    pub skillshot_points: i64,
    /// Bonus credited per pop bumper hit, collected at end of ball.
    pub pop_bonus: i64,
    /// Standup hits on one ball that double the end-of-ball bonus.
    pub multiplier_threshold: i64,
    pub settings_path: String,
    pub high_scores_path: String,
}

impl Default for NovaConfig {
    fn default() -> Self {
        Self {
            pop_bumper_points: 75,
            slingshot_points: 10,
            standup_points: 500,
            skillshot_points: 2500,
            pop_bonus: 100,
            multiplier_threshold: 3,
            settings_path: "nova_settings.json".to_string(),
            high_scores_path: "nova_high_scores.json".to_string(),
        }
    }
}

impl NovaConfig {
    /// Load from `nova.toml`, falling back to defaults if it is missing or
    /// malformed.
    pub fn load() -> Self {
        match std::fs::read_to_string("nova.toml") {
            Ok(text) => match toml::from_str(&text) {
                Ok(config) => config,
                Err(err) => {
                    tracing::warn!("nova.toml is malformed ({err}); using defaults");
                    Self::default()
                },
            },
            Err(_) => Self::default(),
        }
    }
}

/// Register every device and hardware rule on the Nova Strike playfield.
pub fn configure_machine(cfg: &mut MachineConfig) -> Result<(), ConfigError> {
    cfg.add_switch(SwitchSpec::new("left_flipper", 1))?;
    cfg.add_switch(SwitchSpec::new("right_flipper", 2))?;
    cfg.add_switch(SwitchSpec::new("left_flipper_eos", 3).tags([SwitchTag::Eos]))?;
    cfg.add_switch(SwitchSpec::new("right_flipper_eos", 4).tags([SwitchTag::Eos]))?;
    cfg.add_switch(
        SwitchSpec::new("shooter_lane", SHOOTER_LANE_ADDRESS).tags([SwitchTag::ShooterLane]),
    )?;
    cfg.add_switch(SwitchSpec::new("tilt_bob", 6).no_debounce())?;
    cfg.add_switch(SwitchSpec::new("slam_tilt", 7))?;
    cfg.add_switch(SwitchSpec::new("start_button", START_BUTTON_ADDRESS).tags([SwitchTag::Start]))?;
    cfg.add_switch(SwitchSpec::new("service_button", 9).tags([SwitchTag::Service]))?;
    for (i, address) in TROUGH_ADDRESSES.iter().enumerate() {
        cfg.add_switch(
            SwitchSpec::new(format!("trough_{}", i + 1), *address)
                .normally_closed()
                .tags([SwitchTag::Trough]),
        )?;
    }
    for (name, address) in [
        ("pop_left", POP_LEFT_ADDRESS),
        ("pop_right", 15),
        ("pop_top", 16),
        ("sling_left", 17),
        ("sling_right", 18),
        ("drop_a", 19),
        ("drop_b", 20),
        ("drop_c", 21),
        ("standup_nova", 22),
        ("skillshot_lane", 23),
    ] {
        cfg.add_switch(SwitchSpec::new(name, address).tags([SwitchTag::Playfield]))?;
    }

    cfg.add_coil(CoilSpec::new("trough_eject", 101).pulse_ms(40))?;
    cfg.add_coil(CoilSpec::new("pop_left_coil", 102).pulse_ms(18))?;
    cfg.add_coil(CoilSpec::new("pop_right_coil", 103).pulse_ms(18))?;
    cfg.add_coil(CoilSpec::new("pop_top_coil", 104).pulse_ms(18))?;
    cfg.add_coil(CoilSpec::new("sling_left_coil", 105).pulse_ms(16))?;
    cfg.add_coil(CoilSpec::new("sling_right_coil", 106).pulse_ms(16))?;
    cfg.add_coil(CoilSpec::new("drop_reset", 107).pulse_ms(50))?;
    cfg.add_coil(CoilSpec::new("left_flipper_main", 108))?;
    cfg.add_coil(CoilSpec::new("right_flipper_main", 109))?;
    cfg.add_coil(CoilSpec::new("knocker", 110))?;

    cfg.add_led(LedSpec::new("start_lamp", 201))?;
    cfg.add_led(LedSpec::new("shoot_again", 202))?;
    cfg.add_led(LedSpec::new("nova_star", 203))?;

    cfg.add_flipper_rule("left_flipper", "left_flipper_main", 30, 0.3)?;
    cfg.add_flipper_rule("right_flipper", "right_flipper_main", 30, 0.3)?;
    cfg.add_bumper_rule("pop_left", "pop_left_coil", 18)?;
    cfg.add_bumper_rule("pop_right", "pop_right_coil", 18)?;
    cfg.add_bumper_rule("pop_top", "pop_top_coil", 18)?;
    cfg.add_bumper_rule("sling_left", "sling_left_coil", 16)?;
    cfg.add_bumper_rule("sling_right", "sling_right_coil", 16)?;
    Ok(())
}

/// Per-ball state keys owned by the base mode.
const STANDUP_HITS_KEY: &str = "nova_standup_hits";
const SKILLSHOT_DONE_KEY: &str = "nova_skillshot_done";

/// Nova Strike's scoring rules: pops and slings score directly, pops feed
/// the end-of-ball bonus, repeated standup hits double the bonus, and the
/// skillshot lane pays once per ball.
pub struct NovaBaseMode {
    config: NovaConfig,
}

impl NovaBaseMode {
    pub fn new(config: NovaConfig) -> Self {
        Self { config }
    }

    fn on_pop(&mut self, scope: &mut ModeScope<'_, '_, Self>, _switch: &Switch) -> SwitchResult {
        scope.add_score(self.config.pop_bumper_points);
        bonus::add_bonus(scope.game, self.config.pop_bonus);
        SwitchResult::Continue
    }

    fn on_sling(&mut self, scope: &mut ModeScope<'_, '_, Self>, _switch: &Switch) -> SwitchResult {
        scope.add_score(self.config.slingshot_points);
        SwitchResult::Continue
    }

    fn on_standup(&mut self, scope: &mut ModeScope<'_, '_, Self>, _switch: &Switch) -> SwitchResult {
        scope.add_score(self.config.standup_points);
        let threshold = self.config.multiplier_threshold;
        if let Some(player) = scope.player_mut()
            && player.add_ball_int(STANDUP_HITS_KEY, 1) == threshold
        {
            tracing::info!("bonus multiplier doubled");
            bonus::set_multiplier(scope.game, 2);
        }
        SwitchResult::Continue
    }

    fn on_skillshot(&mut self, scope: &mut ModeScope<'_, '_, Self>, _switch: &Switch) -> SwitchResult {
        let collected = scope
            .player()
            .map(|p| p.ball_flag(SKILLSHOT_DONE_KEY, false))
            .unwrap_or(true);
        if !collected && scope.player().map(|p| p.ball_flag(BALL_IN_PLAY_KEY, false)) == Some(true)
        {
            scope.add_score(self.config.skillshot_points);
            if let Some(player) = scope.player_mut() {
                player.set_ball_flag(SKILLSHOT_DONE_KEY, true);
            }
        }
        SwitchResult::Continue
    }
}

impl Mode for NovaBaseMode {
    fn priority(&self) -> i32 {
        40
    }

    fn default_lifecycle(&self) -> Lifecycle {
        Lifecycle::Game
    }

    fn mode_started(&mut self, api: &mut ModeApi<'_, '_, Self>) {
        for pop in ["pop_left", "pop_right", "pop_top"] {
            api.on_active(pop, Self::on_pop);
        }
        for sling in ["sling_left", "sling_right"] {
            api.on_active(sling, Self::on_sling);
        }
        api.on_active("standup_nova", Self::on_standup);
        api.on_active("skillshot_lane", Self::on_skillshot);
    }
}

/// Media sink that narrates events through the log, for headless runs.
pub struct ConsoleMediaSink;

impl MediaSink for ConsoleMediaSink {
    fn post(&mut self, event: &MediaEvent) {
        match serde_json::to_string(event) {
            Ok(json) => tracing::info!("media: {json}"),
            Err(err) => tracing::warn!("unserializable media event: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillshot_core::devices::SwitchState;
    use skillshot_core::game::GameController;
    use skillshot_core::media::NullMediaSink;
    use skillshot_sim::SimPlatform;
    use tokio_util::sync::CancellationToken;

    fn game_with_base_mode() -> GameController {
        let sim = SimPlatform::new();
        for address in TROUGH_ADDRESSES {
            sim.set_initial(address, SwitchState::Open);
        }
        let mut game = GameController::new(sim.handle(), Box::new(NullMediaSink));
        game.connect(&CancellationToken::new()).unwrap();
        game.configure(configure_machine).unwrap();
        game.register(NovaBaseMode::new(NovaConfig::default()), None);
        game.startup().unwrap();
        game.start_game();
        game
    }

    #[test]
    fn config_defaults_are_sane() {
        let config = NovaConfig::default();
        assert_eq!(config.pop_bumper_points, 75);
        assert!(config.multiplier_threshold > 0);
    }

    #[test]
    fn config_parses_partial_toml() {
        let config: NovaConfig = toml::from_str("pop_bumper_points = 150\n").unwrap();
        assert_eq!(config.pop_bumper_points, 150);
        assert_eq!(config.slingshot_points, 10);
    }

    #[test]
    fn machine_registers_every_device() {
        let sim = SimPlatform::new();
        let mut game = GameController::new(sim.handle(), Box::new(NullMediaSink));
        game.connect(&CancellationToken::new()).unwrap();
        game.configure(configure_machine).unwrap();
        let machine = game.machine();
        assert_eq!(machine.switches().len(), 23);
        assert_eq!(machine.coils().len(), 10);
        assert_eq!(machine.leds().len(), 3);
        assert_eq!(machine.flipper_rules().len(), 2);
    }

    #[test]
    fn pops_score_and_feed_the_bonus() {
        let mut game = game_with_base_mode();
        game.inject_switch("pop_left", SwitchState::Closed);
        game.inject_switch("pop_left", SwitchState::Open);
        game.inject_switch("pop_right", SwitchState::Closed);
        assert_eq!(game.current_player().unwrap().score, 150);
        assert_eq!(
            game.current_player().unwrap().ball_int(bonus::BONUS_KEY, 0),
            200
        );
    }

    #[test]
    fn standup_hits_double_the_bonus_multiplier() {
        let mut game = game_with_base_mode();
        for _ in 0..3 {
            game.inject_switch("standup_nova", SwitchState::Closed);
            game.inject_switch("standup_nova", SwitchState::Open);
        }
        assert_eq!(game.current_player().unwrap().score, 1500);
        assert_eq!(
            game.current_player()
                .unwrap()
                .ball_int(bonus::MULTIPLIER_KEY, 1),
            2
        );
    }

    #[test]
    fn skillshot_pays_once_per_ball_after_the_plunge() {
        let mut game = game_with_base_mode();
        // Before the plunge the lane is worthless.
        game.inject_switch("skillshot_lane", SwitchState::Closed);
        assert_eq!(game.current_player().unwrap().score, 0);
        game.inject_switch("skillshot_lane", SwitchState::Open);

        game.current_player_mut()
            .unwrap()
            .set_ball_flag(BALL_IN_PLAY_KEY, true);
        game.inject_switch("skillshot_lane", SwitchState::Closed);
        assert_eq!(game.current_player().unwrap().score, 2500);

        game.inject_switch("skillshot_lane", SwitchState::Open);
        game.inject_switch("skillshot_lane", SwitchState::Closed);
        assert_eq!(game.current_player().unwrap().score, 2500);
    }
}
