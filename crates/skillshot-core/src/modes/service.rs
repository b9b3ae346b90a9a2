use crate::devices::{Activation, Switch, SwitchTag};
use crate::game::GameCtx;
use crate::media::MediaEvent;
use crate::mode::{Lifecycle, Mode, ModeApi, ModeScope, SwitchResult};

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub priority: i32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self { priority: 100 }
    }
}

/// Operator service mode, highest priority in the machine. The switch tagged
/// `Service` toggles it. While active every coil is gated off and every
/// other switch activation is reported and swallowed, so the playfield can
/// be exercised safely.
pub struct ServiceMode {
    config: ServiceConfig,
    active: bool,
}

impl ServiceMode {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Fire one coil under service control: enable, pulse, gate off again.
    pub fn test_coil(&mut self, game: &mut GameCtx<'_>, name: &str) {
        match game.coil_mut(name) {
            Some(coil) => {
                coil.set_enabled(true);
                coil.pulse();
                coil.set_enabled(false);
            },
            None => tracing::warn!("test_coil: no coil named `{name}`"),
        }
    }

    fn enter(&mut self, scope: &mut ModeScope<'_, '_, Self>) {
        tracing::info!("service mode entered");
        self.active = true;
        for coil in scope.game.coils_mut() {
            coil.set_enabled(false);
        }
        scope.post(MediaEvent::ServiceModeEntered);
    }

    fn exit(&mut self, scope: &mut ModeScope<'_, '_, Self>) {
        tracing::info!("service mode exited");
        self.active = false;
        for coil in scope.game.coils_mut() {
            coil.set_enabled(true);
        }
        scope.post(MediaEvent::ServiceModeExited);
    }

    fn on_toggle(&mut self, scope: &mut ModeScope<'_, '_, Self>, _switch: &Switch) -> SwitchResult {
        if self.active {
            self.exit(scope);
        } else {
            self.enter(scope);
        }
        SwitchResult::Stop
    }
}

impl Mode for ServiceMode {
    fn priority(&self) -> i32 {
        self.config.priority
    }

    fn default_lifecycle(&self) -> Lifecycle {
        Lifecycle::System
    }

    fn mode_started(&mut self, api: &mut ModeApi<'_, '_, Self>) {
        self.active = false;
        api.on_tag(SwitchTag::Service, Activation::Active, Self::on_toggle);
    }

    fn handle_switch(&mut self, scope: &mut ModeScope<'_, '_, Self>, switch: &Switch) -> SwitchResult {
        if !self.active || switch.has_tag(SwitchTag::Service) || !switch.matches(Activation::Active)
        {
            return SwitchResult::Continue;
        }
        scope.post(MediaEvent::ServiceSwitchActivated {
            name: switch.name().to_string(),
        });
        SwitchResult::Stop
    }
}
