//! Goldfish timer: a free-running nanosecond counter with one one-shot alarm.
//!
//! The counter is 64 bits wide but the registers are 32. Reading `TIME_LOW` samples the clock and
//! latches the sample; `TIME_HIGH` returns the upper half of that latched sample, so a guest that
//! reads low then high always sees a consistent pair. The alarm works the same way in reverse:
//! `ALARM_HIGH` is only stored, and writing `ALARM_LOW` combines both halves into the deadline and
//! arms it.

use std::cell::RefCell;
use std::rc::Rc;

use goldfish_platform::interrupts::IrqSink;
use goldfish_platform::time::SharedTimerQueue;
use goldfish_platform::{
    Clock, DeviceError, DeviceResult, IrqRange, MmioHandler, TimerId, TimerQueue,
};

use crate::DeviceWakeup;

pub const TIMER_NAME: &str = "goldfish_timer";
pub const TIMER_MMIO_SIZE: u32 = 0x1000;

pub const TIMER_TIME_LOW: u32 = 0x00;
pub const TIMER_TIME_HIGH: u32 = 0x04;
pub const TIMER_ALARM_LOW: u32 = 0x08;
pub const TIMER_ALARM_HIGH: u32 = 0x0c;
pub const TIMER_CLEAR_INTERRUPT: u32 = 0x10;
pub const TIMER_CLEAR_ALARM: u32 = 0x14;

#[derive(Debug)]
pub struct GoldfishTimer<C: Clock> {
    clock: C,
    irq: IrqRange,
    /// Sample latched by the last `TIME_LOW` read.
    now_ns: u64,
    alarm_low_ns: u32,
    alarm_high_ns: i32,
    armed: bool,
    wakeup: Option<TimerId>,
}

pub type SharedGoldfishTimer<C> = Rc<RefCell<GoldfishTimer<C>>>;

impl<C: Clock> GoldfishTimer<C> {
    pub fn new(clock: C, irq: IrqRange) -> Self {
        Self {
            clock,
            irq,
            now_ns: 0,
            alarm_low_ns: 0,
            alarm_high_ns: 0,
            armed: false,
            wakeup: None,
        }
    }

    pub fn into_shared(self) -> SharedGoldfishTimer<C> {
        Rc::new(RefCell::new(self))
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Handle of the outstanding wake-up, if one is scheduled.
    pub fn pending_wakeup(&self) -> Option<TimerId> {
        self.wakeup
    }

    /// Deadline formed from the stored halves. The high half is signed, so a guest can program a
    /// deadline before the epoch and have it fire at once.
    fn deadline_ns(&self) -> i64 {
        (i64::from(self.alarm_high_ns) << 32) | i64::from(self.alarm_low_ns)
    }

    pub fn mmio_read(&mut self, offset: u32) -> DeviceResult<u32> {
        match offset {
            TIMER_TIME_LOW => {
                self.now_ns = self.clock.now_ns();
                Ok(self.now_ns as u32)
            }
            TIMER_TIME_HIGH => Ok((self.now_ns >> 32) as u32),
            _ => Err(DeviceError::BadReadOffset {
                device: TIMER_NAME,
                offset,
            }),
        }
    }

    pub fn mmio_write(
        &mut self,
        offset: u32,
        value: u32,
        sink: &mut impl IrqSink,
        queue: &mut TimerQueue<DeviceWakeup>,
    ) -> DeviceResult<()> {
        match offset {
            TIMER_ALARM_LOW => {
                self.alarm_low_ns = value;
                self.arm(sink, queue)
            }
            TIMER_ALARM_HIGH => {
                self.alarm_high_ns = value as i32;
                Ok(())
            }
            TIMER_CLEAR_INTERRUPT => self.irq.set(sink, TIMER_NAME, 0, false),
            TIMER_CLEAR_ALARM => {
                if let Some(id) = self.wakeup.take() {
                    queue.cancel(id);
                }
                self.armed = false;
                self.irq.set(sink, TIMER_NAME, 0, false)
            }
            _ => Err(DeviceError::BadWriteOffset {
                device: TIMER_NAME,
                offset,
            }),
        }
    }

    fn arm(
        &mut self,
        sink: &mut impl IrqSink,
        queue: &mut TimerQueue<DeviceWakeup>,
    ) -> DeviceResult<()> {
        let deadline = self.deadline_ns();
        let now = i64::try_from(self.clock.now_ns()).unwrap_or(i64::MAX);
        if deadline <= now {
            tracing::debug!(device = TIMER_NAME, deadline, now, "alarm already due");
            return self.irq.set(sink, TIMER_NAME, 0, true);
        }

        if let Some(id) = self.wakeup.take() {
            queue.cancel(id);
        }
        // `deadline > now >= 0`, so the conversion is lossless.
        let id = queue.schedule(deadline as u64, DeviceWakeup::TimerAlarm);
        self.wakeup = Some(id);
        self.armed = true;
        tracing::debug!(device = TIMER_NAME, deadline, "alarm armed");
        Ok(())
    }

    /// Delivers a wake-up popped from the queue. Stale handles (from an alarm that was since
    /// replaced or cleared) are ignored.
    pub fn fire_alarm(&mut self, id: TimerId, sink: &mut impl IrqSink) -> DeviceResult<()> {
        if self.wakeup != Some(id) {
            tracing::debug!(device = TIMER_NAME, ?id, "ignoring stale alarm");
            return Ok(());
        }
        self.wakeup = None;
        self.armed = false;
        self.irq.set(sink, TIMER_NAME, 0, true)
    }
}

/// MMIO adapter bundling a shared [`GoldfishTimer`] with its interrupt sink and the wake-up queue.
pub struct GoldfishTimerMmio<C: Clock, S: IrqSink> {
    timer: SharedGoldfishTimer<C>,
    sink: S,
    queue: SharedTimerQueue<DeviceWakeup>,
}

impl<C: Clock, S: IrqSink> GoldfishTimerMmio<C, S> {
    pub fn new(
        timer: SharedGoldfishTimer<C>,
        sink: S,
        queue: SharedTimerQueue<DeviceWakeup>,
    ) -> Self {
        Self { timer, sink, queue }
    }
}

impl<C: Clock, S: IrqSink> MmioHandler for GoldfishTimerMmio<C, S> {
    fn read(&mut self, offset: u32, _size: usize) -> DeviceResult<u32> {
        self.timer.borrow_mut().mmio_read(offset)
    }

    fn write(&mut self, offset: u32, _size: usize, value: u32) -> DeviceResult<()> {
        let mut queue = self.queue.borrow_mut();
        self.timer
            .borrow_mut()
            .mmio_write(offset, value, &mut self.sink, &mut queue)
    }
}
