//! Host-side plumbing for the goldfish virtual platform.
//!
//! This crate owns everything the device models consume but do not implement themselves: the
//! device registry and its address/irq allocator, the MMIO dispatcher, interrupt line traits,
//! guest memory access, clocks and the wake-up queue. Device models live in `goldfish-devices`.

#![forbid(unsafe_code)]

pub mod error;
pub mod interrupts;
pub mod memory;
pub mod mmio;
pub mod registry;
pub mod time;

pub use error::{DeviceError, DeviceResult};
pub use interrupts::{CpuLine, CpuPins, IrqRange, IrqSink, CONTROLLER_LINES};
pub use memory::{DenseMemory, GuestMemory, SharedGuestMemory};
pub use mmio::{MmioBus, MmioHandler};
pub use registry::{DeviceDescriptor, DeviceHandle, DeviceRegistry, SharedRegistry, NO_ID};
pub use time::{Clock, ManualClock, TimerId, TimerQueue};
