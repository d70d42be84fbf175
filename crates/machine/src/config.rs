use serde::{Deserialize, Serialize};

use goldfish_platform::CONTROLLER_LINES;

use crate::MachineError;

/// Platform layout and optional devices.
///
/// Every field has a default, so a JSON config only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MachineConfig {
    /// Guest RAM size in bytes, mapped at physical address 0.
    pub ram_size_bytes: u64,
    pub intc_base: u32,
    pub bus_base: u32,
    pub bus_irq: u32,
    /// Where the allocator starts handing out windows for devices without a fixed base.
    pub free_base: u32,
    /// First line handed out to devices without a fixed irq.
    pub free_irq: u32,
    pub enable_timer: bool,
    /// Fixed window for the timer. `None` lets the allocator pick one.
    pub timer_base: Option<u32>,
    pub timer_irq: Option<u32>,
    pub enable_rtc: bool,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            ram_size_bytes: 16 * 1024 * 1024,
            intc_base: 0xff00_0000,
            bus_base: 0xff00_1000,
            bus_irq: 1,
            free_base: 0xff01_0000,
            free_irq: 10,
            enable_timer: true,
            timer_base: None,
            timer_irq: None,
            enable_rtc: true,
        }
    }
}

impl MachineConfig {
    /// Parses and validates a JSON config.
    pub fn from_json(json: &str) -> Result<Self, MachineError> {
        let cfg: MachineConfig = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks the fields that the registry cannot check for itself.
    ///
    /// Window overlaps and irq ranges that run off the controller are caught when the devices
    /// are registered.
    pub fn validate(&self) -> Result<(), MachineError> {
        if self.ram_size_bytes == 0 {
            return Err(MachineError::ZeroRamSize);
        }
        if usize::try_from(self.ram_size_bytes).is_err() {
            return Err(MachineError::GuestMemoryTooLarge(self.ram_size_bytes));
        }
        if self.free_irq >= CONTROLLER_LINES {
            return Err(MachineError::InvalidFreeIrq(self.free_irq));
        }
        if self.bus_irq == 0 || self.bus_irq >= CONTROLLER_LINES {
            return Err(MachineError::InvalidBusIrq(self.bus_irq));
        }
        if self.timer_irq == Some(0) {
            return Err(MachineError::InvalidTimerIrq);
        }
        Ok(())
    }
}
