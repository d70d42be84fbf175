use goldfish_platform::DeviceError;
use thiserror::Error;

/// Errors returned when constructing or configuring a [`crate::Machine`].
#[derive(Debug, Error)]
pub enum MachineError {
    #[error("guest RAM size must be non-zero")]
    ZeroRamSize,

    #[error("guest RAM size {0} bytes does not fit in the host's usize")]
    GuestMemoryTooLarge(u64),

    #[error("free_irq={0} is outside the interrupt controller's 32 lines")]
    InvalidFreeIrq(u32),

    #[error("bus_irq={0} must be in 1..32")]
    InvalidBusIrq(u32),

    #[error("timer_irq=0 requests automatic assignment; leave it unset instead")]
    InvalidTimerIrq,

    #[error("malformed machine config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Device(#[from] DeviceError),
}
