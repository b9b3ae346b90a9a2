use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::platform::Platform;

/// Raw address of a device on the hardware bus.
pub type HardwareAddress = u32;

/// Physical state of a switch contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwitchState {
    Open,
    Closed,
}

/// Logical wiring of a switch. Normally-closed is typical for optos: the
/// beam holds the circuit closed, and a ball breaks it open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchKind {
    NormallyOpen,
    NormallyClosed,
}

/// Semantic direction of a switch event. `Active`/`Inactive` are polarity
/// aware; `Closed`/`Open` address the wire directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Active,
    Inactive,
    Closed,
    Open,
}

impl Activation {
    /// The transition that cancels a pending hold for this one.
    pub fn opposite(self) -> Activation {
        match self {
            Activation::Active => Activation::Inactive,
            Activation::Inactive => Activation::Active,
            Activation::Closed => Activation::Open,
            Activation::Open => Activation::Closed,
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Activation::Active => "active",
            Activation::Inactive => "inactive",
            Activation::Closed => "closed",
            Activation::Open => "open",
        };
        f.write_str(s)
    }
}

/// Role tags used for group subscriptions (ball search, service interlock).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchTag {
    Playfield,
    Eos,
    ShooterLane,
    Trough,
    Service,
    Start,
}

/// A playfield switch: immutable identity plus the latest observed physical
/// state and change timestamp.
#[derive(Debug, Clone)]
pub struct Switch {
    name: String,
    address: HardwareAddress,
    kind: SwitchKind,
    debounce: bool,
    tags: Vec<SwitchTag>,
    state: SwitchState,
    changed_at: Option<Instant>,
}

impl Switch {
    pub fn new(
        name: impl Into<String>,
        address: HardwareAddress,
        kind: SwitchKind,
        debounce: bool,
        tags: Vec<SwitchTag>,
    ) -> Self {
        // Resting state: NO switches sit open, NC switches sit closed.
        let state = match kind {
            SwitchKind::NormallyOpen => SwitchState::Open,
            SwitchKind::NormallyClosed => SwitchState::Closed,
        };
        Self {
            name: name.into(),
            address,
            kind,
            debounce,
            tags,
            state,
            changed_at: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> HardwareAddress {
        self.address
    }

    pub fn kind(&self) -> SwitchKind {
        self.kind
    }

    pub fn debounce(&self) -> bool {
        self.debounce
    }

    pub fn tags(&self) -> &[SwitchTag] {
        &self.tags
    }

    pub fn has_tag(&self, tag: SwitchTag) -> bool {
        self.tags.contains(&tag)
    }

    pub fn state(&self) -> SwitchState {
        self.state
    }

    pub fn changed_at(&self) -> Option<Instant> {
        self.changed_at
    }

    pub(crate) fn set_state(&mut self, state: SwitchState, at: Instant) {
        self.state = state;
        self.changed_at = Some(at);
    }

    /// Apply the boot-time ground truth without counting it as a change.
    pub(crate) fn set_initial_state(&mut self, state: SwitchState) {
        self.state = state;
        self.changed_at = None;
    }

    /// Whether the switch is in its triggered state: Closed for NO, Open for
    /// NC.
    pub fn is_active(&self) -> bool {
        match self.kind {
            SwitchKind::NormallyOpen => self.state == SwitchState::Closed,
            SwitchKind::NormallyClosed => self.state == SwitchState::Open,
        }
    }

    /// Whether the switch's current state satisfies `activation`. Used right
    /// after a transition, this answers "did the switch just go `activation`".
    pub fn matches(&self, activation: Activation) -> bool {
        match activation {
            Activation::Active => self.is_active(),
            Activation::Inactive => !self.is_active(),
            Activation::Closed => self.state == SwitchState::Closed,
            Activation::Open => self.state == SwitchState::Open,
        }
    }
}

/// A solenoid driver with a software enable gate. While the gate is off,
/// pulse and hold requests are dropped and the hardware disable is re-issued
/// instead.
pub struct Coil {
    name: String,
    address: HardwareAddress,
    default_pulse_ms: u32,
    enabled: bool,
    platform: Arc<dyn Platform>,
}

impl fmt::Debug for Coil {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coil")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("default_pulse_ms", &self.default_pulse_ms)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl Coil {
    pub fn new(
        name: impl Into<String>,
        address: HardwareAddress,
        default_pulse_ms: u32,
        platform: Arc<dyn Platform>,
    ) -> Self {
        Self {
            name: name.into(),
            address,
            default_pulse_ms,
            enabled: true,
            platform,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> HardwareAddress {
        self.address
    }

    pub fn default_pulse_ms(&self) -> u32 {
        self.default_pulse_ms
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Open or close the software gate. Closing it issues the hardware
    /// disable so a held coil cannot stay energized.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.platform.disable_coil(self.address);
        }
    }

    /// Fire the coil for its default pulse duration.
    pub fn pulse(&self) {
        self.pulse_for(self.default_pulse_ms);
    }

    pub fn pulse_for(&self, ms: u32) {
        if !self.enabled {
            tracing::trace!("coil `{}` is gated off; pulse dropped", self.name);
            self.platform.disable_coil(self.address);
            return;
        }
        self.platform.pulse_coil(self.address, ms);
    }

    pub fn hold(&self) {
        if !self.enabled {
            tracing::trace!("coil `{}` is gated off; hold dropped", self.name);
            self.platform.disable_coil(self.address);
            return;
        }
        self.platform.hold_coil(self.address);
    }

    pub fn disable(&self) {
        self.platform.disable_coil(self.address);
    }
}

/// An RGB color written through to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl LedColor {
    pub const OFF: LedColor = LedColor { r: 0, g: 0, b: 0 };
    pub const WHITE: LedColor = LedColor {
        r: 255,
        g: 255,
        b: 255,
    };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// An addressable LED. Stateless from the core's view; colors are
/// write-through.
pub struct Led {
    name: String,
    address: HardwareAddress,
    platform: Arc<dyn Platform>,
}

impl fmt::Debug for Led {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Led")
            .field("name", &self.name)
            .field("address", &self.address)
            .finish()
    }
}

impl Led {
    pub fn new(name: impl Into<String>, address: HardwareAddress, platform: Arc<dyn Platform>) -> Self {
        Self {
            name: name.into(),
            address,
            platform,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> HardwareAddress {
        self.address
    }

    pub fn set_color(&self, color: LedColor) {
        self.platform.set_led(self.address, color);
    }

    pub fn off(&self) {
        self.set_color(LedColor::OFF);
    }
}

/// Anything registered in a [`DeviceCollection`].
pub trait Device {
    fn device_name(&self) -> &str;
    fn device_address(&self) -> HardwareAddress;
}

impl Device for Switch {
    fn device_name(&self) -> &str {
        self.name()
    }
    fn device_address(&self) -> HardwareAddress {
        self.address()
    }
}

impl Device for Coil {
    fn device_name(&self) -> &str {
        self.name()
    }
    fn device_address(&self) -> HardwareAddress {
        self.address()
    }
}

impl Device for Led {
    fn device_name(&self) -> &str {
        self.name()
    }
    fn device_address(&self) -> HardwareAddress {
        self.address()
    }
}

/// A table of one device type keyed by symbolic name (case-insensitive) and
/// hardware address. Iteration order is insertion order.
pub struct DeviceCollection<T> {
    items: Vec<T>,
    by_name: HashMap<String, usize>,
    by_address: HashMap<HardwareAddress, usize>,
}

impl<T: fmt::Debug> fmt::Debug for DeviceCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}

impl<T: Device> Default for DeviceCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Device> DeviceCollection<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            by_name: HashMap::new(),
            by_address: HashMap::new(),
        }
    }

    /// Register a device. Name and address must each be unique within the
    /// collection.
    pub fn insert(&mut self, device: T) -> Result<(), ConfigError> {
        let key = device.device_name().to_ascii_lowercase();
        let address = device.device_address();
        if self.by_name.contains_key(&key) {
            return Err(ConfigError::DuplicateName(device.device_name().to_string()));
        }
        if self.by_address.contains_key(&address) {
            return Err(ConfigError::DuplicateAddress(address));
        }
        let index = self.items.len();
        self.items.push(device);
        self.by_name.insert(key, index);
        self.by_address.insert(address, index);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.by_name
            .get(&name.to_ascii_lowercase())
            .map(|&i| &self.items[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        let i = *self.by_name.get(&name.to_ascii_lowercase())?;
        Some(&mut self.items[i])
    }

    pub fn by_address(&self, address: HardwareAddress) -> Option<&T> {
        self.by_address.get(&address).map(|&i| &self.items[i])
    }

    pub fn by_address_mut(&mut self, address: HardwareAddress) -> Option<&mut T> {
        let i = *self.by_address.get(&address)?;
        Some(&mut self.items[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(&name.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
