use std::collections::HashSet;

use crate::devices::Switch;
use crate::media::MediaEvent;
use crate::mode::{Lifecycle, Mode, ModeApi, ModeScope, SwitchResult};

const RESET_DELAY: &str = "bank_reset";

#[derive(Debug, Clone)]
pub struct DropTargetBankConfig {
    pub target_switches: Vec<String>,
    pub reset_coil: String,
    /// Seconds between bank completion and automatic reset; 0 disables it.
    pub auto_reset_secs: f64,
    pub priority: i32,
}

impl Default for DropTargetBankConfig {
    fn default() -> Self {
        Self {
            target_switches: Vec::new(),
            reset_coil: "drop_reset".to_string(),
            auto_reset_secs: 0.0,
            priority: 30,
        }
    }
}

/// One bank of drop targets. Tracks which targets are down (first hit only;
/// re-activations from switch bounce are ignored), announces completion, and
/// resets the bank on request or on a timer.
pub struct DropTargetBankMode {
    config: DropTargetBankConfig,
    down: HashSet<String>,
}

impl DropTargetBankMode {
    pub fn new(config: DropTargetBankConfig) -> Self {
        Self {
            config,
            down: HashSet::new(),
        }
    }

    pub fn down_count(&self) -> usize {
        self.down.len()
    }

    pub fn is_complete(&self) -> bool {
        !self.config.target_switches.is_empty()
            && self.config.target_switches.len() == self.down.len()
    }

    /// Raise all targets: cancel any pending auto-reset, clear the down set,
    /// and fire the reset coil.
    pub fn reset(&mut self, scope: &mut ModeScope<'_, '_, Self>) {
        scope.cancel_delay(RESET_DELAY);
        self.down.clear();
        scope.pulse(&self.config.reset_coil);
        scope.post(MediaEvent::DropTargetBankReset);
    }

    fn on_target(&mut self, scope: &mut ModeScope<'_, '_, Self>, switch: &Switch) -> SwitchResult {
        let name = switch.name().to_string();
        if !self.down.insert(name.clone()) {
            return SwitchResult::Continue;
        }
        tracing::debug!("drop target `{name}` down ({}/{})", self.down.len(), self.config.target_switches.len());
        scope.post(MediaEvent::DropTargetHit { target: name });
        if self.is_complete() {
            scope.post(MediaEvent::DropTargetBankComplete {
                targets: self.config.target_switches.clone(),
            });
            if self.config.auto_reset_secs > 0.0 {
                let secs = self.config.auto_reset_secs;
                scope.delay_named(RESET_DELAY, secs, Self::on_auto_reset);
            }
        }
        SwitchResult::Continue
    }

    fn on_auto_reset(&mut self, scope: &mut ModeScope<'_, '_, Self>) {
        self.reset(scope);
    }
}

impl Mode for DropTargetBankMode {
    fn priority(&self) -> i32 {
        self.config.priority
    }

    fn default_lifecycle(&self) -> Lifecycle {
        Lifecycle::Ball
    }

    fn mode_started(&mut self, api: &mut ModeApi<'_, '_, Self>) {
        self.down.clear();
        let targets = self.config.target_switches.clone();
        for name in &targets {
            api.on_active(name, Self::on_target);
        }
    }
}
