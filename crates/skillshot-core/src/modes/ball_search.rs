use crate::devices::{Activation, Switch, SwitchTag};
use crate::media::MediaEvent;
use crate::mode::{Lifecycle, Mode, ModeApi, ModeScope, SwitchResult};

const IDLE_TIMER: &str = "ball_search";
const PULSE_TIMER: &str = "ball_search_pulse";

#[derive(Debug, Clone)]
pub struct BallSearchConfig {
    /// Coils pulsed round-robin while searching.
    pub coils: Vec<String>,
    /// Playfield silence before the search kicks off.
    pub idle_secs: f64,
    pub pulse_interval_secs: f64,
    pub priority: i32,
}

impl Default for BallSearchConfig {
    fn default() -> Self {
        Self {
            coils: Vec::new(),
            idle_secs: 15.0,
            pulse_interval_secs: 0.25,
            priority: 5,
        }
    }
}

/// Finds a stuck ball: any playfield or EOS activity resets an idle timer; a
/// ball resting in the shooter lane suspends it. On timeout the mode pulses
/// the configured coils in rotation until the playfield wakes up.
pub struct BallSearchMode {
    config: BallSearchConfig,
    searching: bool,
    next_coil: usize,
}

impl BallSearchMode {
    pub fn new(config: BallSearchConfig) -> Self {
        Self {
            config,
            searching: false,
            next_coil: 0,
        }
    }

    pub fn is_searching(&self) -> bool {
        self.searching
    }

    fn arm(&mut self, scope: &mut ModeScope<'_, '_, Self>) {
        let idle = self.config.idle_secs;
        scope.delay_named(IDLE_TIMER, idle, Self::on_timeout);
    }

    fn stop_search(&mut self, scope: &mut ModeScope<'_, '_, Self>) {
        self.searching = false;
        scope.cancel_delay(PULSE_TIMER);
        scope.post(MediaEvent::BallSearchStopped);
    }

    fn on_playfield(
        &mut self,
        scope: &mut ModeScope<'_, '_, Self>,
        _switch: &Switch,
    ) -> SwitchResult {
        if self.searching {
            tracing::info!("ball search: playfield woke up");
            self.stop_search(scope);
        }
        self.arm(scope);
        SwitchResult::Continue
    }

    fn on_shooter_active(
        &mut self,
        scope: &mut ModeScope<'_, '_, Self>,
        _switch: &Switch,
    ) -> SwitchResult {
        // A ball waiting on the plunger is not lost.
        scope.cancel_delay(IDLE_TIMER);
        SwitchResult::Continue
    }

    fn on_shooter_inactive(
        &mut self,
        scope: &mut ModeScope<'_, '_, Self>,
        _switch: &Switch,
    ) -> SwitchResult {
        self.arm(scope);
        SwitchResult::Continue
    }

    fn on_timeout(&mut self, scope: &mut ModeScope<'_, '_, Self>) {
        if self.config.coils.is_empty() {
            return;
        }
        tracing::info!("ball search started");
        self.searching = true;
        scope.post(MediaEvent::BallSearchStarted);
        self.pulse_next(scope);
    }

    fn pulse_next(&mut self, scope: &mut ModeScope<'_, '_, Self>) {
        let coil = self.config.coils[self.next_coil % self.config.coils.len()].clone();
        self.next_coil += 1;
        scope.pulse(&coil);
        let interval = self.config.pulse_interval_secs;
        scope.delay_named(PULSE_TIMER, interval, Self::on_pulse_tick);
    }

    fn on_pulse_tick(&mut self, scope: &mut ModeScope<'_, '_, Self>) {
        if self.searching {
            self.pulse_next(scope);
        }
    }
}

impl Mode for BallSearchMode {
    fn priority(&self) -> i32 {
        self.config.priority
    }

    fn default_lifecycle(&self) -> Lifecycle {
        Lifecycle::Ball
    }

    fn mode_started(&mut self, api: &mut ModeApi<'_, '_, Self>) {
        self.searching = false;
        self.next_coil = 0;
        if self.config.coils.is_empty() {
            tracing::warn!("ball search has no coils configured");
        }
        api.on_tag(SwitchTag::Playfield, Activation::Active, Self::on_playfield);
        api.on_tag(SwitchTag::Eos, Activation::Active, Self::on_playfield);
        api.on_tag(
            SwitchTag::ShooterLane,
            Activation::Active,
            Self::on_shooter_active,
        );
        api.on_tag(
            SwitchTag::ShooterLane,
            Activation::Inactive,
            Self::on_shooter_inactive,
        );
        self.arm(api);
    }
}
