//! In-process platform backend. Behaves like a real board from the core's
//! side of the seam: it reports initial switch states, raises switch-change
//! events (from any task or thread), and executes installed hardware rules
//! locally, without a host round-trip.

pub mod stores;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use skillshot_core::devices::{HardwareAddress, LedColor, SwitchState};
use skillshot_core::error::PlatformError;
use skillshot_core::platform::{BumperRule, FlipperRule, Platform, SwitchChange};

/// Everything the simulated board was asked to do, in order. Rule-driven
/// reflexes appear here too, exactly as a real board would fire them.
#[derive(Debug, Clone, PartialEq)]
pub enum SimCommand {
    Pulse { address: HardwareAddress, ms: u32 },
    Hold { address: HardwareAddress },
    Disable { address: HardwareAddress },
    Led { address: HardwareAddress, color: LedColor },
}

#[derive(Debug, Clone, Copy)]
enum HardwareRule {
    Flipper(FlipperRule),
    Bumper(BumperRule),
}

struct SimInner {
    connected: bool,
    states: HashMap<HardwareAddress, SwitchState>,
    events: Option<mpsc::UnboundedSender<SwitchChange>>,
    rules: HashMap<HardwareAddress, HardwareRule>,
    commands: Vec<SimCommand>,
}

/// One timed step of a scripted playfield session.
#[derive(Debug, Clone, Copy)]
pub struct ScriptStep {
    pub after: Duration,
    pub address: HardwareAddress,
    pub state: SwitchState,
}

/// The simulator. Clones share the same board, so one handle can go to the
/// controller while another drives the playfield.
#[derive(Clone)]
pub struct SimPlatform {
    inner: Arc<Mutex<SimInner>>,
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl SimPlatform {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimInner {
                connected: false,
                states: HashMap::new(),
                events: None,
                rules: HashMap::new(),
                commands: Vec::new(),
            })),
        }
    }

    pub fn handle(&self) -> Arc<dyn Platform> {
        Arc::new(self.clone())
    }

    /// Seed the boot-time state of one switch.
    pub fn set_initial(&self, address: HardwareAddress, state: SwitchState) {
        self.inner.lock().unwrap().states.insert(address, state);
    }

    /// Flip a simulated switch. Updates board state, fires any installed
    /// rule on that switch, and notifies the subscriber. Callable from any
    /// thread or task.
    pub fn set_switch(&self, address: HardwareAddress, state: SwitchState) {
        let mut inner = self.inner.lock().unwrap();
        let previous = inner.states.insert(address, state);
        if previous == Some(state) {
            return;
        }
        // Local reflex, no host round-trip.
        if let Some(rule) = inner.rules.get(&address).copied() {
            match (rule, state) {
                (HardwareRule::Flipper(rule), SwitchState::Closed) => {
                    inner.commands.push(SimCommand::Pulse {
                        address: rule.coil,
                        ms: rule.pulse_ms,
                    });
                    if rule.hold_power > 0.0 {
                        inner.commands.push(SimCommand::Hold { address: rule.coil });
                    }
                },
                (HardwareRule::Flipper(rule), SwitchState::Open) => {
                    inner.commands.push(SimCommand::Disable { address: rule.coil });
                },
                (HardwareRule::Bumper(rule), SwitchState::Closed) => {
                    inner.commands.push(SimCommand::Pulse {
                        address: rule.coil,
                        ms: rule.pulse_ms,
                    });
                },
                (HardwareRule::Bumper(_), SwitchState::Open) => {},
            }
        }
        if let Some(events) = &inner.events {
            let _ = events.send(SwitchChange { address, state });
        }
    }

    pub fn switch_state(&self, address: HardwareAddress) -> Option<SwitchState> {
        self.inner.lock().unwrap().states.get(&address).copied()
    }

    pub fn commands(&self) -> Vec<SimCommand> {
        self.inner.lock().unwrap().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.inner.lock().unwrap().commands.clear();
    }

    /// Play a scripted session against the board, honoring cancellation
    /// between steps. Spawn this alongside the game loop.
    pub async fn play_script(self, script: Vec<ScriptStep>, cancel: CancellationToken) {
        for step in script {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(step.after) => {},
            }
            tracing::debug!(
                "script: switch {} -> {:?}",
                step.address,
                step.state
            );
            self.set_switch(step.address, step.state);
        }
    }
}

impl Platform for SimPlatform {
    fn connect(
        &self,
        events: mpsc::UnboundedSender<SwitchChange>,
        _cancel: CancellationToken,
    ) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.connected {
            return Err(PlatformError::AlreadyConnected);
        }
        inner.connected = true;
        inner.events = Some(events);
        tracing::info!("simulator connected");
        Ok(())
    }

    fn disconnect(&self) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        inner.connected = false;
        inner.events = None;
        tracing::info!("simulator disconnected");
        Ok(())
    }

    fn initial_switch_states(
        &self,
    ) -> Result<HashMap<HardwareAddress, SwitchState>, PlatformError> {
        let inner = self.inner.lock().unwrap();
        if !inner.connected {
            return Err(PlatformError::NotConnected);
        }
        Ok(inner.states.clone())
    }

    fn pulse_coil(&self, address: HardwareAddress, ms: u32) {
        self.inner
            .lock()
            .unwrap()
            .commands
            .push(SimCommand::Pulse { address, ms });
    }

    fn hold_coil(&self, address: HardwareAddress) {
        self.inner
            .lock()
            .unwrap()
            .commands
            .push(SimCommand::Hold { address });
    }

    fn disable_coil(&self, address: HardwareAddress) {
        self.inner
            .lock()
            .unwrap()
            .commands
            .push(SimCommand::Disable { address });
    }

    fn configure_flipper_rule(&self, rule: FlipperRule) {
        self.inner
            .lock()
            .unwrap()
            .rules
            .insert(rule.switch, HardwareRule::Flipper(rule));
    }

    fn configure_bumper_rule(&self, rule: BumperRule) {
        self.inner
            .lock()
            .unwrap()
            .rules
            .insert(rule.switch, HardwareRule::Bumper(rule));
    }

    fn remove_hardware_rule(&self, switch: HardwareAddress) {
        self.inner.lock().unwrap().rules.remove(&switch);
    }

    fn set_led(&self, address: HardwareAddress, color: LedColor) {
        self.inner
            .lock()
            .unwrap()
            .commands
            .push(SimCommand::Led { address, color });
    }

    fn set_led_run(&self, start: HardwareAddress, colors: &[LedColor]) {
        let mut inner = self.inner.lock().unwrap();
        for (offset, color) in colors.iter().enumerate() {
            inner.commands.push(SimCommand::Led {
                address: start + offset as HardwareAddress,
                color: *color,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected_sim() -> (SimPlatform, mpsc::UnboundedReceiver<SwitchChange>) {
        let sim = SimPlatform::new();
        let (tx, rx) = mpsc::unbounded_channel();
        sim.connect(tx, CancellationToken::new()).unwrap();
        (sim, rx)
    }

    #[test]
    fn initial_states_require_a_connection() {
        let sim = SimPlatform::new();
        sim.set_initial(10, SwitchState::Open);
        assert!(sim.initial_switch_states().is_err());

        let (tx, _rx) = mpsc::unbounded_channel();
        sim.connect(tx, CancellationToken::new()).unwrap();
        let states = sim.initial_switch_states().unwrap();
        assert_eq!(states.get(&10), Some(&SwitchState::Open));
    }

    #[test]
    fn double_connect_is_an_error() {
        let (sim, _rx) = connected_sim();
        let (tx, _rx2) = mpsc::unbounded_channel();
        assert!(sim.connect(tx, CancellationToken::new()).is_err());
    }

    #[test]
    fn switch_changes_reach_the_subscriber() {
        let (sim, mut rx) = connected_sim();
        sim.set_switch(7, SwitchState::Closed);
        assert_eq!(
            rx.try_recv().unwrap(),
            SwitchChange {
                address: 7,
                state: SwitchState::Closed
            }
        );
    }

    #[test]
    fn unchanged_states_do_not_notify() {
        let (sim, mut rx) = connected_sim();
        sim.set_switch(7, SwitchState::Closed);
        sim.set_switch(7, SwitchState::Closed);
        rx.try_recv().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn flipper_rule_fires_locally() {
        let (sim, _rx) = connected_sim();
        sim.configure_flipper_rule(FlipperRule {
            switch: 1,
            coil: 105,
            pulse_ms: 30,
            hold_power: 0.25,
        });
        sim.set_switch(1, SwitchState::Closed);
        sim.set_switch(1, SwitchState::Open);
        assert_eq!(
            sim.commands(),
            vec![
                SimCommand::Pulse {
                    address: 105,
                    ms: 30
                },
                SimCommand::Hold { address: 105 },
                SimCommand::Disable { address: 105 },
            ]
        );
    }

    #[test]
    fn removed_rule_stops_firing() {
        let (sim, _rx) = connected_sim();
        sim.configure_bumper_rule(BumperRule {
            switch: 14,
            coil: 102,
            pulse_ms: 20,
        });
        sim.set_switch(14, SwitchState::Closed);
        sim.remove_hardware_rule(14);
        sim.set_switch(14, SwitchState::Open);
        sim.set_switch(14, SwitchState::Closed);
        assert_eq!(
            sim.commands(),
            vec![SimCommand::Pulse {
                address: 102,
                ms: 20
            }]
        );
    }

    #[test]
    fn led_runs_write_contiguous_addresses() {
        let (sim, _rx) = connected_sim();
        let colors = [LedColor::WHITE, LedColor::OFF];
        sim.set_led_run(200, &colors);
        assert_eq!(
            sim.commands(),
            vec![
                SimCommand::Led {
                    address: 200,
                    color: LedColor::WHITE
                },
                SimCommand::Led {
                    address: 201,
                    color: LedColor::OFF
                },
            ]
        );
    }

    #[tokio::test]
    async fn scripts_stop_at_cancellation() {
        let (sim, mut rx) = connected_sim();
        let cancel = CancellationToken::new();
        cancel.cancel();
        sim.clone()
            .play_script(
                vec![ScriptStep {
                    after: Duration::from_millis(1),
                    address: 5,
                    state: SwitchState::Closed,
                }],
                cancel,
            )
            .await;
        assert!(rx.try_recv().is_err());
    }
}
