//! Device models for the goldfish virtual platform.
//!
//! Each model exposes `mmio_read` / `mmio_write` methods that take whatever platform services the
//! register access needs (interrupt sink, guest memory, wake-up queue) as explicit arguments, plus
//! an `*Mmio` adapter that bundles those services so the model can be mapped on a
//! [`goldfish_platform::MmioBus`].

#![forbid(unsafe_code)]

pub mod intc;
pub mod pdev_bus;
pub mod rtc;
pub mod timer;

pub use intc::{InterruptController, InterruptControllerMmio, SharedInterruptController};
pub use pdev_bus::{DeviceBus, DeviceBusMmio};
pub use rtc::{GoldfishRtc, GoldfishRtcMmio};
pub use timer::{GoldfishTimer, GoldfishTimerMmio, SharedGoldfishTimer};

/// Scheduled wake-ups owned by device models, delivered back by the machine's event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceWakeup {
    TimerAlarm,
}
