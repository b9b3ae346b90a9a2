use crate::game::GameCtx;
use crate::media::MediaEvent;
use crate::mode::{DrainResult, Lifecycle, Mode, ModeApi, ModeScope};

/// Ball-state key holding the accumulated bonus.
pub const BONUS_KEY: &str = "bonus";
/// Ball-state key holding the bonus multiplier (clamped to >= 1 on read).
pub const MULTIPLIER_KEY: &str = "bonus_multiplier";

/// Delay key for the countdown steps.
const STEP_DELAY: &str = "bonus_step";

/// Credit bonus to the current player. Any mode can call this; the value
/// lives in ball-scoped state, so it resets with each new ball.
pub fn add_bonus(game: &mut GameCtx<'_>, amount: i64) {
    if let Some(player) = game.player_mut() {
        player.add_ball_int(BONUS_KEY, amount);
    }
}

pub fn set_multiplier(game: &mut GameCtx<'_>, multiplier: i64) {
    if let Some(player) = game.player_mut() {
        player.set_ball_int(MULTIPLIER_KEY, multiplier.max(1));
    }
}

pub fn bonus_value(game: &GameCtx<'_>) -> i64 {
    game.player().map(|p| p.ball_int(BONUS_KEY, 0)).unwrap_or(0)
}

pub fn multiplier(game: &GameCtx<'_>) -> i64 {
    game.player()
        .map(|p| p.ball_int(MULTIPLIER_KEY, 1).max(1))
        .unwrap_or(1)
}

#[derive(Debug, Clone)]
pub struct BonusConfig {
    /// Points awarded per countdown step.
    pub step_points: i64,
    /// Pause between steps; 0 counts one step per tick.
    pub step_interval_secs: f64,
    pub priority: i32,
}

impl Default for BonusConfig {
    fn default() -> Self {
        Self {
            step_points: 1000,
            step_interval_secs: 0.1,
            priority: 45,
        }
    }
}

/// End-of-ball bonus countdown. Subscribes to the drain notification, awards
/// `bonus x multiplier` in fixed steps, then ends the ball.
pub struct BonusMode {
    config: BonusConfig,
    total: i64,
    remaining: i64,
    awarded: i64,
    counting: bool,
}

impl BonusMode {
    pub fn new(config: BonusConfig) -> Self {
        Self {
            config,
            total: 0,
            remaining: 0,
            awarded: 0,
            counting: false,
        }
    }

    pub fn is_counting(&self) -> bool {
        self.counting
    }

    /// Begin the countdown. With nothing to award the ball ends immediately.
    pub fn start(&mut self, scope: &mut ModeScope<'_, '_, Self>) {
        if self.counting {
            return;
        }
        let bonus = bonus_value(scope.game);
        let multiplier = multiplier(scope.game);
        let total = bonus * multiplier;
        self.total = total;
        self.remaining = total;
        self.awarded = 0;
        self.counting = true;
        tracing::debug!("bonus countdown: {bonus} x {multiplier} = {total}");
        scope.post(MediaEvent::BonusStarted {
            bonus,
            multiplier,
            total,
        });
        if total == 0 {
            self.finish(scope);
            return;
        }
        self.schedule_step(scope);
    }

    fn schedule_step(&mut self, scope: &mut ModeScope<'_, '_, Self>) {
        let interval = self.config.step_interval_secs;
        scope.delay_named(STEP_DELAY, interval, Self::on_step);
    }

    fn on_step(&mut self, scope: &mut ModeScope<'_, '_, Self>) {
        let award = self.config.step_points.max(1).min(self.remaining);
        scope.add_score(award);
        self.awarded += award;
        self.remaining -= award;
        scope.post(MediaEvent::BonusStep {
            awarded: award,
            remaining: self.remaining,
        });
        if self.remaining == 0 {
            self.finish(scope);
        } else {
            self.schedule_step(scope);
        }
    }

    fn finish(&mut self, scope: &mut ModeScope<'_, '_, Self>) {
        self.counting = false;
        scope.post(MediaEvent::BonusCompleted {
            awarded: self.awarded,
        });
        scope.end_ball();
    }
}

impl Mode for BonusMode {
    fn priority(&self) -> i32 {
        self.config.priority
    }

    fn default_lifecycle(&self) -> Lifecycle {
        Lifecycle::Ball
    }

    fn mode_started(&mut self, _api: &mut ModeApi<'_, '_, Self>) {
        self.total = 0;
        self.remaining = 0;
        self.awarded = 0;
        self.counting = false;
    }

    fn ball_drained(&mut self, scope: &mut ModeScope<'_, '_, Self>) -> DrainResult {
        self.start(scope);
        DrainResult::Handled
    }
}
