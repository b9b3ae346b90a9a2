use crate::devices::Switch;
use crate::media::MediaEvent;
use crate::mode::{Lifecycle, Mode, ModeApi, ModeScope, SwitchResult};
use crate::modes::trough::BALL_IN_PLAY_KEY;

const IDLE_TIMER: &str = "attract_idle";
const DWELL_TIMER: &str = "game_over_dwell";

#[derive(Debug, Clone)]
pub struct AttractConfig {
    pub start_switch: String,
    /// Period between `attract_idle` events while no game is in progress.
    pub idle_secs: f64,
    /// How long the game-over screen holds before attract resumes.
    pub game_over_dwell_secs: f64,
    pub priority: i32,
}

impl Default for AttractConfig {
    fn default() -> Self {
        Self {
            start_switch: "start_button".to_string(),
            idle_secs: 30.0,
            game_over_dwell_secs: 12.0,
            priority: 10,
        }
    }
}

/// The machine's resting state. Start begins a game when idle; during ball 1,
/// before the first plunge, it buys additional players in. On game end it
/// spawns a [`GameOverMode`] child for the score dwell.
pub struct AttractMode {
    config: AttractConfig,
}

impl AttractMode {
    pub fn new(config: AttractConfig) -> Self {
        Self { config }
    }

    fn arm_idle(&mut self, scope: &mut ModeScope<'_, '_, Self>) {
        let idle = self.config.idle_secs;
        scope.delay_named(IDLE_TIMER, idle, Self::on_idle);
    }

    fn on_idle(&mut self, scope: &mut ModeScope<'_, '_, Self>) {
        if !scope.game_in_progress() {
            scope.post(MediaEvent::AttractIdle);
        }
        self.arm_idle(scope);
    }

    fn on_start(&mut self, scope: &mut ModeScope<'_, '_, Self>, _switch: &Switch) -> SwitchResult {
        if !scope.game_in_progress() {
            scope.start_game();
            return SwitchResult::Continue;
        }
        let before_plunge = scope
            .player()
            .map(|p| !p.ball_flag(BALL_IN_PLAY_KEY, false))
            .unwrap_or(false);
        if scope.ball() == 1 && before_plunge && scope.player_count() < scope.max_players() {
            scope.add_player();
        }
        SwitchResult::Continue
    }
}

impl Mode for AttractMode {
    fn priority(&self) -> i32 {
        self.config.priority
    }

    fn default_lifecycle(&self) -> Lifecycle {
        Lifecycle::System
    }

    fn mode_started(&mut self, api: &mut ModeApi<'_, '_, Self>) {
        let start = self.config.start_switch.clone();
        api.on_active(&start, Self::on_start);
        self.arm_idle(api);
    }

    fn game_started(&mut self, scope: &mut ModeScope<'_, '_, Self>) {
        scope.cancel_delay(IDLE_TIMER);
    }

    fn game_ended(&mut self, scope: &mut ModeScope<'_, '_, Self>) {
        self.arm_idle(scope);
        scope.add_child(GameOverMode::new(
            self.config.game_over_dwell_secs,
            self.config.start_switch.clone(),
            self.config.priority + 15,
        ));
    }
}

/// Holds the final scores on screen for a dwell period, then bows out. A
/// Start press during the dwell removes it early *without* consuming the
/// event, so attract sees the same press and starts the next game.
pub struct GameOverMode {
    dwell_secs: f64,
    start_switch: String,
    priority: i32,
}

impl GameOverMode {
    pub fn new(dwell_secs: f64, start_switch: String, priority: i32) -> Self {
        Self {
            dwell_secs,
            start_switch,
            priority,
        }
    }

    fn on_dwell_elapsed(&mut self, scope: &mut ModeScope<'_, '_, Self>) {
        scope.remove_self();
    }

    fn on_start(&mut self, scope: &mut ModeScope<'_, '_, Self>, _switch: &Switch) -> SwitchResult {
        scope.remove_self();
        SwitchResult::Continue
    }
}

impl Mode for GameOverMode {
    fn priority(&self) -> i32 {
        self.priority
    }

    fn mode_started(&mut self, api: &mut ModeApi<'_, '_, Self>) {
        let start = self.start_switch.clone();
        api.on_active(&start, Self::on_start);
        let dwell = self.dwell_secs;
        api.delay_named(DWELL_TIMER, dwell, Self::on_dwell_elapsed);
    }
}
