use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use crate::error::{DeviceError, DeviceResult};

/// Number of input lines on the platform interrupt controller.
pub const CONTROLLER_LINES: u32 = 32;

/// Input side of an interrupt controller: devices drive numbered lines through this.
pub trait IrqSink {
    /// Drives `line` to `level`. A line the controller does not have is a wiring error.
    fn set_irq(&mut self, line: u32, level: bool) -> DeviceResult<()>;
}

impl<T: IrqSink + ?Sized> IrqSink for Rc<RefCell<T>> {
    fn set_irq(&mut self, line: u32, level: bool) -> DeviceResult<()> {
        self.borrow_mut().set_irq(line, level)
    }
}

impl<T: IrqSink + ?Sized> IrqSink for &mut T {
    fn set_irq(&mut self, line: u32, level: bool) -> DeviceResult<()> {
        (**self).set_irq(line, level)
    }
}

/// The two aggregate outputs an interrupt controller forwards to the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpuLine {
    Irq,
    /// High-priority ("fast") interrupt.
    Fiq,
}

/// CPU-side interrupt pins.
pub trait CpuPins {
    fn set_line(&mut self, line: CpuLine, level: bool);
}

impl<T: CpuPins + ?Sized> CpuPins for Rc<RefCell<T>> {
    fn set_line(&mut self, line: CpuLine, level: bool) {
        self.borrow_mut().set_line(line, level);
    }
}

/// Block of consecutive controller lines owned by one device.
///
/// Devices address their lines by index (`0..count`); the range translates the index into the
/// absolute controller line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IrqRange {
    pub first: u32,
    pub count: u32,
}

impl IrqRange {
    pub const NONE: IrqRange = IrqRange { first: 0, count: 0 };

    pub const fn new(first: u32, count: u32) -> Self {
        Self { first, count }
    }

    /// One past the last line, widened so a bogus range cannot wrap.
    pub fn end(&self) -> u64 {
        u64::from(self.first) + u64::from(self.count)
    }

    pub fn overlaps(&self, other: &IrqRange) -> bool {
        self.count != 0
            && other.count != 0
            && u64::from(self.first) < other.end()
            && u64::from(other.first) < self.end()
    }

    /// Drives line `index` of this range on `sink`.
    pub fn set(
        &self,
        sink: &mut impl IrqSink,
        device: &str,
        index: u32,
        level: bool,
    ) -> DeviceResult<()> {
        if index >= self.count {
            return Err(DeviceError::IrqIndexOutOfRange {
                device: device.to_owned(),
                index,
                count: self.count,
            });
        }
        sink.set_irq(self.first + index, level)
    }
}
