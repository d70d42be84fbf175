use thiserror::Error;

pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

/// Errors raised by device models, the registry and the MMIO dispatcher.
///
/// Almost every variant is fatal: it means the platform was wired wrong or the guest driver does
/// not match the device it is talking to. [`DeviceError::Unmapped`] is the only variant the owner
/// of the emulation loop may log and continue past.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("{device}: bad read offset {offset:#x}")]
    BadReadOffset { device: &'static str, offset: u32 },

    #[error("{device}: bad write offset {offset:#x}")]
    BadWriteOffset { device: &'static str, offset: u32 },

    #[error("{device}: bad OP value {value:#x}")]
    BadOpValue { device: &'static str, value: u32 },

    #[error("{device}: line index {value} is outside the controller's {lines} lines")]
    BadLineValue {
        device: &'static str,
        value: u32,
        lines: u32,
    },

    #[error("irq line {line} is outside the controller's {lines} lines")]
    IrqLineOutOfRange { line: u32, lines: u32 },

    #[error("{device}: irq index {index} >= irq_count {count}")]
    IrqIndexOutOfRange {
        device: String,
        index: u32,
        count: u32,
    },

    #[error("{device}: irq range {first}..{end} does not fit in {lines} controller lines")]
    IrqRangeExceedsController {
        device: String,
        first: u32,
        end: u64,
        lines: u32,
    },

    #[error("{device}: irq range {first}..{end} overlaps lines owned by {owner}")]
    IrqRangeOverlap {
        device: String,
        first: u32,
        end: u64,
        owner: String,
    },

    #[error("{device}: window {base:#x}+{size:#x} overlaps {owner}")]
    RegionOverlap {
        device: String,
        base: u32,
        size: u32,
        owner: String,
    },

    #[error("{device}: window {base:#x}+{size:#x} runs past the end of the address space")]
    RegionOverflow {
        device: String,
        base: u32,
        size: u32,
    },

    #[error("no device mapped at {addr:#x}")]
    Unmapped { addr: u64 },
}

impl DeviceError {
    /// Returns `false` only for accesses that hit no device at all.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, DeviceError::Unmapped { .. })
    }

    /// Configuration errors come from platform bootstrap, never from guest traffic.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DeviceError::IrqLineOutOfRange { .. }
                | DeviceError::IrqIndexOutOfRange { .. }
                | DeviceError::IrqRangeExceedsController { .. }
                | DeviceError::IrqRangeOverlap { .. }
                | DeviceError::RegionOverlap { .. }
                | DeviceError::RegionOverflow { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unmapped_is_non_fatal() {
        assert!(!DeviceError::Unmapped { addr: 0x1000 }.is_fatal());
        assert!(DeviceError::BadReadOffset {
            device: "goldfish_timer",
            offset: 0x40,
        }
        .is_fatal());
        assert!(DeviceError::IrqLineOutOfRange { line: 40, lines: 32 }.is_fatal());
    }

    #[test]
    fn messages_name_the_device_and_offset() {
        let err = DeviceError::BadWriteOffset {
            device: "goldfish_device_bus",
            offset: 0x1c,
        };
        assert_eq!(err.to_string(), "goldfish_device_bus: bad write offset 0x1c");
        assert!(!err.is_configuration());
    }
}
