use std::sync::Arc;

use crate::devices::{
    Coil, DeviceCollection, HardwareAddress, Led, Switch, SwitchKind, SwitchTag,
};
use crate::error::ConfigError;
use crate::platform::{BumperRule, FlipperRule, Platform};

/// Declarative description of one switch, consumed by
/// [`MachineConfig::add_switch`].
#[derive(Debug, Clone)]
pub struct SwitchSpec {
    name: String,
    address: HardwareAddress,
    kind: SwitchKind,
    debounce: bool,
    tags: Vec<SwitchTag>,
}

impl SwitchSpec {
    /// A debounced normally-open switch with no tags.
    pub fn new(name: impl Into<String>, address: HardwareAddress) -> Self {
        Self {
            name: name.into(),
            address,
            kind: SwitchKind::NormallyOpen,
            debounce: true,
            tags: Vec::new(),
        }
    }

    pub fn normally_closed(mut self) -> Self {
        self.kind = SwitchKind::NormallyClosed;
        self
    }

    pub fn no_debounce(mut self) -> Self {
        self.debounce = false;
        self
    }

    pub fn tags(mut self, tags: impl IntoIterator<Item = SwitchTag>) -> Self {
        self.tags.extend(tags);
        self
    }
}

/// Declarative description of one coil.
#[derive(Debug, Clone)]
pub struct CoilSpec {
    name: String,
    address: HardwareAddress,
    pulse_ms: u32,
}

/// Default pulse length for coils that don't specify one.
const DEFAULT_COIL_PULSE_MS: u32 = 30;

impl CoilSpec {
    pub fn new(name: impl Into<String>, address: HardwareAddress) -> Self {
        Self {
            name: name.into(),
            address,
            pulse_ms: DEFAULT_COIL_PULSE_MS,
        }
    }

    pub fn pulse_ms(mut self, ms: u32) -> Self {
        self.pulse_ms = ms;
        self
    }
}

/// Declarative description of one LED.
#[derive(Debug, Clone)]
pub struct LedSpec {
    name: String,
    address: HardwareAddress,
}

impl LedSpec {
    pub fn new(name: impl Into<String>, address: HardwareAddress) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }
}

/// The machine's device tables plus the hardware rules installed on the
/// platform. Populated exactly once, after the platform is connected and
/// before the game loop starts; read-only thereafter.
pub struct MachineConfig {
    pub(crate) switches: DeviceCollection<Switch>,
    pub(crate) coils: DeviceCollection<Coil>,
    pub(crate) leds: DeviceCollection<Led>,
    pub(crate) flipper_rules: Vec<FlipperRule>,
    pub(crate) bumper_rules: Vec<BumperRule>,
    platform: Arc<dyn Platform>,
    configured: bool,
}

impl MachineConfig {
    pub(crate) fn new(platform: Arc<dyn Platform>) -> Self {
        Self {
            switches: DeviceCollection::new(),
            coils: DeviceCollection::new(),
            leds: DeviceCollection::new(),
            flipper_rules: Vec::new(),
            bumper_rules: Vec::new(),
            platform,
            configured: false,
        }
    }

    pub(crate) fn mark_configured(&mut self) -> Result<(), ConfigError> {
        if self.configured {
            return Err(ConfigError::AlreadyConfigured);
        }
        self.configured = true;
        Ok(())
    }

    pub fn add_switch(&mut self, spec: SwitchSpec) -> Result<(), ConfigError> {
        self.switches.insert(Switch::new(
            spec.name,
            spec.address,
            spec.kind,
            spec.debounce,
            spec.tags,
        ))
    }

    pub fn add_coil(&mut self, spec: CoilSpec) -> Result<(), ConfigError> {
        self.coils.insert(Coil::new(
            spec.name,
            spec.address,
            spec.pulse_ms,
            Arc::clone(&self.platform),
        ))
    }

    pub fn add_led(&mut self, spec: LedSpec) -> Result<(), ConfigError> {
        self.leds
            .insert(Led::new(spec.name, spec.address, Arc::clone(&self.platform)))
    }

    /// Install a flipper reflex rule by device name. Forwarded to the
    /// platform immediately and retained so tilt can remove and restore it.
    pub fn add_flipper_rule(
        &mut self,
        switch: &str,
        coil: &str,
        pulse_ms: u32,
        hold_power: f32,
    ) -> Result<(), ConfigError> {
        let switch_addr = self.switch_address(switch)?;
        let coil_addr = self.coil_address(coil)?;
        let rule = FlipperRule {
            switch: switch_addr,
            coil: coil_addr,
            pulse_ms,
            hold_power: hold_power.clamp(0.0, 1.0),
        };
        self.platform.configure_flipper_rule(rule);
        self.flipper_rules.push(rule);
        tracing::debug!("flipper rule installed: {switch} -> {coil}");
        Ok(())
    }

    /// Install a bumper reflex rule by device name.
    pub fn add_bumper_rule(
        &mut self,
        switch: &str,
        coil: &str,
        pulse_ms: u32,
    ) -> Result<(), ConfigError> {
        let switch_addr = self.switch_address(switch)?;
        let coil_addr = self.coil_address(coil)?;
        let rule = BumperRule {
            switch: switch_addr,
            coil: coil_addr,
            pulse_ms,
        };
        self.platform.configure_bumper_rule(rule);
        self.bumper_rules.push(rule);
        tracing::debug!("bumper rule installed: {switch} -> {coil}");
        Ok(())
    }

    /// Tear down whatever rule is installed on the named switch.
    pub fn remove_hardware_rule(&mut self, switch: &str) -> Result<(), ConfigError> {
        let addr = self.switch_address(switch)?;
        self.platform.remove_hardware_rule(addr);
        self.flipper_rules.retain(|r| r.switch != addr);
        self.bumper_rules.retain(|r| r.switch != addr);
        Ok(())
    }

    pub fn switches(&self) -> &DeviceCollection<Switch> {
        &self.switches
    }

    pub fn coils(&self) -> &DeviceCollection<Coil> {
        &self.coils
    }

    pub fn leds(&self) -> &DeviceCollection<Led> {
        &self.leds
    }

    pub fn flipper_rules(&self) -> &[FlipperRule] {
        &self.flipper_rules
    }

    fn switch_address(&self, name: &str) -> Result<HardwareAddress, ConfigError> {
        self.switches
            .get(name)
            .map(|s| s.address())
            .ok_or_else(|| ConfigError::UnknownSwitch(name.to_string()))
    }

    fn coil_address(&self, name: &str) -> Result<HardwareAddress, ConfigError> {
        self.coils
            .get(name)
            .map(|c| c.address())
            .ok_or_else(|| ConfigError::UnknownCoil(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FakePlatform, PlatformCommand};

    fn config() -> (MachineConfig, FakePlatform) {
        let platform = FakePlatform::new();
        let cfg = MachineConfig::new(platform.handle());
        (cfg, platform)
    }

    #[test]
    fn rule_with_unknown_switch_fails_fast() {
        let (mut cfg, _platform) = config();
        cfg.add_coil(CoilSpec::new("flipper_main", 1)).unwrap();
        let err = cfg
            .add_flipper_rule("left_fliper", "flipper_main", 30, 0.25)
            .unwrap_err();
        assert_eq!(err, ConfigError::UnknownSwitch("left_fliper".to_string()));
    }

    #[test]
    fn rule_with_unknown_coil_fails_fast() {
        let (mut cfg, _platform) = config();
        cfg.add_switch(SwitchSpec::new("left_flipper", 3)).unwrap();
        let err = cfg
            .add_flipper_rule("left_flipper", "nope", 30, 0.25)
            .unwrap_err();
        assert_eq!(err, ConfigError::UnknownCoil("nope".to_string()));
    }

    #[test]
    fn flipper_rule_is_forwarded_immediately_and_retained() {
        let (mut cfg, platform) = config();
        cfg.add_switch(SwitchSpec::new("left_flipper", 3)).unwrap();
        cfg.add_coil(CoilSpec::new("flipper_main", 1)).unwrap();
        cfg.add_flipper_rule("left_flipper", "flipper_main", 30, 2.0)
            .unwrap();

        assert_eq!(cfg.flipper_rules().len(), 1);
        // Hold power is clamped to [0, 1].
        assert_eq!(cfg.flipper_rules()[0].hold_power, 1.0);
        assert!(matches!(
            platform.commands()[0],
            PlatformCommand::FlipperRule(FlipperRule { switch: 3, coil: 1, .. })
        ));
    }

    #[test]
    fn remove_hardware_rule_drops_the_retained_copy() {
        let (mut cfg, platform) = config();
        cfg.add_switch(SwitchSpec::new("left_flipper", 3)).unwrap();
        cfg.add_coil(CoilSpec::new("flipper_main", 1)).unwrap();
        cfg.add_flipper_rule("left_flipper", "flipper_main", 30, 0.25)
            .unwrap();
        cfg.remove_hardware_rule("left_flipper").unwrap();

        assert!(cfg.flipper_rules().is_empty());
        assert!(
            platform
                .commands()
                .iter()
                .any(|c| matches!(c, PlatformCommand::RemoveRule { switch: 3 }))
        );
    }

    #[test]
    fn configure_runs_exactly_once() {
        let (mut cfg, _platform) = config();
        assert!(cfg.mark_configured().is_ok());
        assert_eq!(cfg.mark_configured(), Err(ConfigError::AlreadyConfigured));
    }
}
