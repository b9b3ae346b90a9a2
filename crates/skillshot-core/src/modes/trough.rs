use crate::devices::Switch;
use crate::game::GameCtx;
use crate::media::MediaEvent;
use crate::mode::{Lifecycle, Mode, ModeApi, ModeScope, SwitchResult};

/// Delay key for the ball-save window countdown.
const BALL_SAVE_DELAY: &str = "ball_save";

/// Ball-state flag set once the ball leaves the shooter lane. The attract
/// mode reads it to gate late player entry.
pub const BALL_IN_PLAY_KEY: &str = "ball_in_play";

#[derive(Debug, Clone)]
pub struct TroughConfig {
    /// Trough opto switches, one per ball the machine holds. NC wiring:
    /// active means a ball is present.
    pub trough_switches: Vec<String>,
    pub eject_coil: String,
    pub shooter_lane_switch: String,
    /// Width of the automatic ball-save window; 0 disables it.
    pub auto_ball_save_seconds: f64,
    pub priority: i32,
}

impl Default for TroughConfig {
    fn default() -> Self {
        Self {
            trough_switches: (1..=4).map(|i| format!("trough_{i}")).collect(),
            eject_coil: "trough_eject".to_string(),
            shooter_lane_switch: "shooter_lane".to_string(),
            auto_ball_save_seconds: 0.0,
            priority: 90,
        }
    }
}

/// Owns the ball lifecycle: serves balls at ball start, counts balls in
/// play, recognizes multiball, and decides what a drain means: save,
/// deferred end-of-ball, or immediate end-of-ball.
pub struct TroughMode {
    config: TroughConfig,
    balls_in_play: u32,
    launch_pending: bool,
    save_active: bool,
}

impl TroughMode {
    pub fn new(config: TroughConfig) -> Self {
        Self {
            config,
            balls_in_play: 0,
            launch_pending: false,
            save_active: false,
        }
    }

    pub fn balls_in_play(&self) -> u32 {
        self.balls_in_play
    }

    pub fn is_save_active(&self) -> bool {
        self.save_active
    }

    /// Serve one ball into the shooter lane.
    pub fn eject(&mut self, game: &mut GameCtx<'_>) {
        game.pulse(&self.config.eject_coil);
        self.launch_pending = true;
    }

    /// Serve an additional ball mid-play (multiball). Callable from outside
    /// a dispatch via `GameController::with_mode_ctx`.
    pub fn add_ball(&mut self, game: &mut GameCtx<'_>) {
        self.eject(game);
    }

    fn on_trough(&mut self, scope: &mut ModeScope<'_, '_, Self>, switch: &Switch) -> SwitchResult {
        if !scope.game_in_progress() {
            return SwitchResult::Continue;
        }
        if self.balls_in_play == 0 {
            tracing::trace!("trough hit on `{}` with no balls in play", switch.name());
            return SwitchResult::Continue;
        }
        self.balls_in_play -= 1;
        tracing::debug!("ball drained; {} in play", self.balls_in_play);
        if self.balls_in_play >= 1 {
            if self.balls_in_play == 1 {
                scope.post(MediaEvent::MultiballEnded);
            }
            return SwitchResult::Continue;
        }
        // Last ball gone: save it, hand the drain to a subscriber, or end
        // the ball ourselves.
        if self.save_active {
            self.eject(scope.game);
            scope.post(MediaEvent::BallSaved);
        } else {
            scope.notify_ball_drained();
        }
        SwitchResult::Continue
    }

    fn on_shooter_cleared(
        &mut self,
        scope: &mut ModeScope<'_, '_, Self>,
        _switch: &Switch,
    ) -> SwitchResult {
        if !self.launch_pending {
            return SwitchResult::Continue;
        }
        self.launch_pending = false;
        self.balls_in_play += 1;
        tracing::debug!("ball launched; {} in play", self.balls_in_play);
        if let Some(player) = scope.player_mut() {
            player.set_ball_flag(BALL_IN_PLAY_KEY, true);
        }
        if self.balls_in_play == 2 {
            scope.post(MediaEvent::MultiballStarted {
                balls_in_play: self.balls_in_play,
            });
        }
        if self.save_active {
            let seconds = self.config.auto_ball_save_seconds;
            scope.delay_named(BALL_SAVE_DELAY, seconds, Self::on_save_window_closed);
        }
        SwitchResult::Continue
    }

    fn on_save_window_closed(&mut self, _scope: &mut ModeScope<'_, '_, Self>) {
        tracing::debug!("ball save window closed");
        self.save_active = false;
    }
}

impl Mode for TroughMode {
    fn priority(&self) -> i32 {
        self.config.priority
    }

    fn default_lifecycle(&self) -> Lifecycle {
        Lifecycle::Game
    }

    fn mode_started(&mut self, api: &mut ModeApi<'_, '_, Self>) {
        self.balls_in_play = 0;
        self.launch_pending = false;
        self.save_active = false;
        let trough_switches = self.config.trough_switches.clone();
        for name in &trough_switches {
            api.on_active(name, Self::on_trough);
        }
        let shooter = self.config.shooter_lane_switch.clone();
        api.on_inactive(&shooter, Self::on_shooter_cleared);
    }

    fn ball_starting(&mut self, scope: &mut ModeScope<'_, '_, Self>) {
        self.balls_in_play = 0;
        self.launch_pending = false;
        self.save_active = self.config.auto_ball_save_seconds > 0.0;
        self.eject(scope.game);
    }
}
