//! Time sources and wake-up scheduling used by the timer devices.
//!
//! Devices never read host time directly. They sample a [`Clock`] on register access and ask a
//! [`TimerQueue`] for wake-ups. The queue stores plain events rather than callbacks: the owner of
//! the emulation loop pops due events with [`TimerQueue::pop_due`] and routes each one to the
//! device that scheduled it.

mod clock;
mod timers;

pub use clock::{Clock, ManualClock, MonotonicClock, SystemClock};
pub use timers::{SharedTimerQueue, TimerEvent, TimerId, TimerQueue};
