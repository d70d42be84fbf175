//! Goldfish real-time clock.
//!
//! Reports host wall-clock time in nanoseconds through the same low/high latch as the timer. The
//! alarm registers exist so guest drivers can program them, but nothing is ever scheduled.

use goldfish_platform::interrupts::IrqSink;
use goldfish_platform::{Clock, DeviceError, DeviceResult, IrqRange, MmioHandler};

pub const RTC_NAME: &str = "goldfish_rtc";
pub const RTC_MMIO_SIZE: u32 = 0x1000;

pub const RTC_TIME_LOW: u32 = 0x00;
pub const RTC_TIME_HIGH: u32 = 0x04;
pub const RTC_ALARM_LOW: u32 = 0x08;
pub const RTC_ALARM_HIGH: u32 = 0x0c;
pub const RTC_CLEAR_INTERRUPT: u32 = 0x10;

#[derive(Debug)]
pub struct GoldfishRtc<C: Clock> {
    clock: C,
    irq: IrqRange,
    now_ns: u64,
    alarm_low: u32,
    alarm_high: u32,
}

impl<C: Clock> GoldfishRtc<C> {
    pub fn new(clock: C, irq: IrqRange) -> Self {
        Self {
            clock,
            irq,
            now_ns: 0,
            alarm_low: 0,
            alarm_high: 0,
        }
    }

    /// Last programmed alarm, as `(low, high)`.
    pub fn alarm(&self) -> (u32, u32) {
        (self.alarm_low, self.alarm_high)
    }

    pub fn mmio_read(&mut self, offset: u32) -> DeviceResult<u32> {
        match offset {
            RTC_TIME_LOW => {
                self.now_ns = self.clock.now_ns();
                Ok(self.now_ns as u32)
            }
            RTC_TIME_HIGH => Ok((self.now_ns >> 32) as u32),
            _ => Err(DeviceError::BadReadOffset {
                device: RTC_NAME,
                offset,
            }),
        }
    }

    pub fn mmio_write(
        &mut self,
        offset: u32,
        value: u32,
        sink: &mut impl IrqSink,
    ) -> DeviceResult<()> {
        match offset {
            RTC_ALARM_LOW => self.alarm_low = value,
            RTC_ALARM_HIGH => self.alarm_high = value,
            RTC_CLEAR_INTERRUPT => return self.irq.set(sink, RTC_NAME, 0, false),
            _ => {
                return Err(DeviceError::BadWriteOffset {
                    device: RTC_NAME,
                    offset,
                })
            }
        }
        Ok(())
    }
}

pub struct GoldfishRtcMmio<C: Clock, S: IrqSink> {
    rtc: GoldfishRtc<C>,
    sink: S,
}

impl<C: Clock, S: IrqSink> GoldfishRtcMmio<C, S> {
    pub fn new(rtc: GoldfishRtc<C>, sink: S) -> Self {
        Self { rtc, sink }
    }
}

impl<C: Clock, S: IrqSink> MmioHandler for GoldfishRtcMmio<C, S> {
    fn read(&mut self, offset: u32, _size: usize) -> DeviceResult<u32> {
        self.rtc.mmio_read(offset)
    }

    fn write(&mut self, offset: u32, _size: usize, value: u32) -> DeviceResult<()> {
        self.rtc.mmio_write(offset, value, &mut self.sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goldfish_platform::interrupts::{LineEvent, LineRecorder};
    use goldfish_platform::ManualClock;

    #[test]
    fn wall_clock_is_latched_across_the_two_halves() {
        let clock = ManualClock::starting_at(1_700_000_000 * 1_000_000_000);
        let mut rtc = GoldfishRtc::new(clock.clone(), IrqRange::new(11, 1));

        let expected = clock.now_ns();
        let low = rtc.mmio_read(RTC_TIME_LOW).unwrap();
        clock.advance_ns(5_000_000_000);
        let high = rtc.mmio_read(RTC_TIME_HIGH).unwrap();
        assert_eq!((u64::from(high) << 32) | u64::from(low), expected);
    }

    #[test]
    fn alarm_is_stored_but_never_fires() {
        let clock = ManualClock::new();
        let mut rtc = GoldfishRtc::new(clock.clone(), IrqRange::new(11, 1));
        let mut sink = LineRecorder::new();

        rtc.mmio_write(RTC_ALARM_HIGH, 0, &mut sink).unwrap();
        rtc.mmio_write(RTC_ALARM_LOW, 10, &mut sink).unwrap();
        clock.advance_ns(1_000);
        assert_eq!(rtc.alarm(), (10, 0));
        assert!(sink.take_events().is_empty());

        rtc.mmio_write(RTC_CLEAR_INTERRUPT, 0, &mut sink).unwrap();
        assert_eq!(sink.take_events(), vec![LineEvent::Lower(11)]);
    }

    #[test]
    fn undefined_registers_are_fatal() {
        let mut rtc = GoldfishRtc::new(ManualClock::new(), IrqRange::new(11, 1));
        let mut sink = LineRecorder::new();
        assert!(matches!(
            rtc.mmio_read(RTC_ALARM_LOW),
            Err(DeviceError::BadReadOffset { .. })
        ));
        assert!(matches!(
            rtc.mmio_write(RTC_TIME_LOW, 0, &mut sink),
            Err(DeviceError::BadWriteOffset { offset: RTC_TIME_LOW, .. })
        ));
    }
}
