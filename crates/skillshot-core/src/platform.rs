use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::devices::{HardwareAddress, LedColor, SwitchState};
use crate::error::PlatformError;

/// A raw switch transition reported by the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchChange {
    pub address: HardwareAddress,
    pub state: SwitchState,
}

/// A flipper reflex rule: while the switch is closed the coil fires at full
/// pulse then drops to hold power, all executed on the board without a host
/// round-trip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlipperRule {
    pub switch: HardwareAddress,
    pub coil: HardwareAddress,
    pub pulse_ms: u32,
    /// Hold strength in `[0.0, 1.0]`.
    pub hold_power: f32,
}

/// A bumper reflex rule: each switch closure fires one coil pulse locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BumperRule {
    pub switch: HardwareAddress,
    pub coil: HardwareAddress,
    pub pulse_ms: u32,
}

/// The sole seam to the physical world. Every backend (a real board driver,
/// the in-process simulator, a test double) satisfies this same contract.
///
/// `connect` must complete before any other method is called. The backend
/// emits switch transitions into the supplied channel and may do so from any
/// thread or task; the consumer is the single game-loop thread. Installed
/// hardware rules are authoritative: the named switch fires the named coil
/// physically until the rule is removed.
///
/// Coil and LED writes are fire-and-forget; backends swallow or log their own
/// transport faults. The core never retries.
pub trait Platform: Send + Sync {
    /// Establish the link to the hardware. The backend keeps the sender for
    /// switch-change notification and should stop producing when `cancel`
    /// fires.
    fn connect(
        &self,
        events: mpsc::UnboundedSender<SwitchChange>,
        cancel: CancellationToken,
    ) -> Result<(), PlatformError>;

    fn disconnect(&self) -> Result<(), PlatformError>;

    /// Ground-truth switch states at boot, keyed by hardware address.
    fn initial_switch_states(&self) -> Result<HashMap<HardwareAddress, SwitchState>, PlatformError>;

    fn pulse_coil(&self, address: HardwareAddress, ms: u32);
    fn hold_coil(&self, address: HardwareAddress);
    fn disable_coil(&self, address: HardwareAddress);

    fn configure_flipper_rule(&self, rule: FlipperRule);
    fn configure_bumper_rule(&self, rule: BumperRule);
    fn remove_hardware_rule(&self, switch: HardwareAddress);

    fn set_led(&self, address: HardwareAddress, color: LedColor);
    /// Write a contiguous run of LEDs starting at `start`.
    fn set_led_run(&self, start: HardwareAddress, colors: &[LedColor]);
}
