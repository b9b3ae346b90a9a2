use std::time::Instant;

use crate::devices::Switch;
use crate::game::GameCtx;
use crate::media::MediaEvent;
use crate::mode::{Lifecycle, Mode, ModeApi, ModeScope, SwitchResult};

#[derive(Debug, Clone)]
pub struct TiltConfig {
    pub tilt_bob_switch: String,
    pub slam_tilt_switch: Option<String>,
    /// Warnings granted before the tilt lands.
    pub warnings_allowed: u32,
    /// Bob bounces within this window count as one hit.
    pub cooldown_secs: f64,
    pub priority: i32,
}

impl Default for TiltConfig {
    fn default() -> Self {
        Self {
            tilt_bob_switch: "tilt_bob".to_string(),
            slam_tilt_switch: Some("slam_tilt".to_string()),
            warnings_allowed: 2,
            cooldown_secs: 0.5,
            priority: 80,
        }
    }
}

/// Watches the tilt bob, issues warnings, and on the final hit pulls the
/// flipper hardware rules out from under the player. Ball-lifecycle: a new
/// ball re-enters the mode and resets the count; leaving the queue restores
/// the flipper rules it removed.
pub struct TiltMode {
    config: TiltConfig,
    warnings: u32,
    tilted: bool,
    last_hit: Option<Instant>,
}

impl TiltMode {
    pub fn new(config: TiltConfig) -> Self {
        Self {
            config,
            warnings: 0,
            tilted: false,
            last_hit: None,
        }
    }

    pub fn is_tilted(&self) -> bool {
        self.tilted
    }

    pub fn warnings(&self) -> u32 {
        self.warnings
    }

    fn on_bob(&mut self, scope: &mut ModeScope<'_, '_, Self>, _switch: &Switch) -> SwitchResult {
        if self.tilted {
            return SwitchResult::Continue;
        }
        let now = scope.now();
        if let Some(last) = self.last_hit
            && (now - last).as_secs_f64() < self.config.cooldown_secs
        {
            tracing::trace!("tilt bob bounce swallowed");
            return SwitchResult::Continue;
        }
        self.last_hit = Some(now);
        self.warnings += 1;
        if self.warnings <= self.config.warnings_allowed {
            tracing::info!("tilt warning {}/{}", self.warnings, self.config.warnings_allowed);
            scope.post(MediaEvent::TiltWarning {
                warning: self.warnings,
                allowed: self.config.warnings_allowed,
            });
        } else {
            tracing::info!("tilt");
            self.tilted = true;
            scope.remove_flipper_rules();
            scope.post(MediaEvent::Tilt);
        }
        SwitchResult::Continue
    }

    fn on_slam(&mut self, scope: &mut ModeScope<'_, '_, Self>, _switch: &Switch) -> SwitchResult {
        tracing::warn!("slam tilt");
        scope.post(MediaEvent::SlamTilt);
        scope.end_game();
        SwitchResult::Stop
    }
}

impl Mode for TiltMode {
    fn priority(&self) -> i32 {
        self.config.priority
    }

    fn default_lifecycle(&self) -> Lifecycle {
        Lifecycle::Ball
    }

    fn mode_started(&mut self, api: &mut ModeApi<'_, '_, Self>) {
        self.warnings = 0;
        self.tilted = false;
        self.last_hit = None;
        let bob = self.config.tilt_bob_switch.clone();
        api.on_active(&bob, Self::on_bob);
        if let Some(slam) = self.config.slam_tilt_switch.clone() {
            api.on_active(&slam, Self::on_slam);
        }
    }

    fn mode_stopped(&mut self, game: &mut GameCtx<'_>) {
        // Hardware behavior comes back for the next ball.
        if self.tilted {
            game.restore_flipper_rules();
        }
    }
}
