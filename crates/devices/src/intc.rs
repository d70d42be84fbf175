//! Goldfish interrupt controller.
//!
//! 32 level-triggered input lines, each with an enable bit, folded into two outputs towards the
//! CPU: the normal IRQ pin (any asserted line with its enable bit set) and the FIQ pin (any
//! asserted line routed to FIQ). The guest only ever sees the normal path; FIQ routing is fixed by
//! the platform at bootstrap.

use std::cell::RefCell;
use std::rc::Rc;

use goldfish_platform::interrupts::{CpuLine, CpuPins, IrqSink, CONTROLLER_LINES};
use goldfish_platform::{DeviceError, DeviceResult, MmioHandler};

pub const INTC_NAME: &str = "goldfish_interrupt_controller";
pub const INTC_MMIO_SIZE: u32 = 0x1000;

const REG_STATUS: u32 = 0x00;
const REG_NUMBER: u32 = 0x04;
const REG_DISABLE_ALL: u32 = 0x08;
const REG_DISABLE: u32 = 0x0c;
const REG_ENABLE: u32 = 0x10;

pub struct InterruptController {
    level: u32,
    irq_enabled: u32,
    fiq_enabled: u32,
    /// Always `popcount(level & irq_enabled)`.
    pending_count: u32,
    irq_out: bool,
    fiq_out: bool,
    parent: Box<dyn CpuPins>,
}

pub type SharedInterruptController = Rc<RefCell<InterruptController>>;

impl std::fmt::Debug for InterruptController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptController")
            .field("level", &format_args!("{:#010x}", self.level))
            .field("irq_enabled", &format_args!("{:#010x}", self.irq_enabled))
            .field("fiq_enabled", &format_args!("{:#010x}", self.fiq_enabled))
            .field("pending_count", &self.pending_count)
            .field("irq_out", &self.irq_out)
            .field("fiq_out", &self.fiq_out)
            .finish_non_exhaustive()
    }
}

fn line_mask(device: &'static str, value: u32) -> DeviceResult<u32> {
    if value >= CONTROLLER_LINES {
        return Err(DeviceError::BadLineValue {
            device,
            value,
            lines: CONTROLLER_LINES,
        });
    }
    Ok(1 << value)
}

impl InterruptController {
    /// Creates a controller with every line low and disabled, driving `parent`.
    pub fn new(parent: Box<dyn CpuPins>) -> Self {
        Self {
            level: 0,
            irq_enabled: 0,
            fiq_enabled: 0,
            pending_count: 0,
            irq_out: false,
            fiq_out: false,
            parent,
        }
    }

    pub fn into_shared(self) -> SharedInterruptController {
        Rc::new(RefCell::new(self))
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn irq_enabled(&self) -> u32 {
        self.irq_enabled
    }

    pub fn fiq_enabled(&self) -> u32 {
        self.fiq_enabled
    }

    pub fn pending_count(&self) -> u32 {
        self.pending_count
    }

    pub fn irq_output(&self) -> bool {
        self.irq_out
    }

    pub fn fiq_output(&self) -> bool {
        self.fiq_out
    }

    /// Routes the lines in `mask` to the FIQ output.
    pub fn set_fiq_enabled(&mut self, mask: u32) {
        self.fiq_enabled = mask;
        self.update_outputs();
    }

    /// Lowest asserted line whose enable bit is set, or 0 when none is.
    fn number(&self) -> u32 {
        let pending = self.level & self.irq_enabled;
        if pending == 0 {
            0
        } else {
            pending.trailing_zeros()
        }
    }

    fn update_outputs(&mut self) {
        let irq = self.level & self.irq_enabled != 0;
        if irq != self.irq_out {
            self.irq_out = irq;
            self.parent.set_line(CpuLine::Irq, irq);
        }

        let fiq = self.level & self.fiq_enabled != 0;
        if fiq != self.fiq_out {
            self.fiq_out = fiq;
            self.parent.set_line(CpuLine::Fiq, fiq);
        }
    }

    pub fn mmio_read(&mut self, offset: u32) -> DeviceResult<u32> {
        match offset {
            REG_STATUS => Ok(self.pending_count),
            REG_NUMBER => Ok(self.number()),
            _ => Err(DeviceError::BadReadOffset {
                device: INTC_NAME,
                offset,
            }),
        }
    }

    pub fn mmio_write(&mut self, offset: u32, value: u32) -> DeviceResult<()> {
        match offset {
            REG_DISABLE_ALL => {
                self.level = 0;
                self.pending_count = 0;
            }
            REG_DISABLE => {
                let mask = line_mask(INTC_NAME, value)?;
                if self.irq_enabled & mask != 0 {
                    if self.level & mask != 0 {
                        self.pending_count -= 1;
                    }
                    self.irq_enabled &= !mask;
                }
            }
            REG_ENABLE => {
                let mask = line_mask(INTC_NAME, value)?;
                if self.irq_enabled & mask == 0 {
                    if self.level & mask != 0 {
                        self.pending_count += 1;
                    }
                    self.irq_enabled |= mask;
                }
            }
            _ => {
                return Err(DeviceError::BadWriteOffset {
                    device: INTC_NAME,
                    offset,
                })
            }
        }
        self.update_outputs();
        Ok(())
    }
}

impl IrqSink for InterruptController {
    fn set_irq(&mut self, line: u32, level: bool) -> DeviceResult<()> {
        if line >= CONTROLLER_LINES {
            return Err(DeviceError::IrqLineOutOfRange {
                line,
                lines: CONTROLLER_LINES,
            });
        }
        let mask = 1u32 << line;
        let was = self.level & mask != 0;
        if was != level {
            if level {
                self.level |= mask;
            } else {
                self.level &= !mask;
            }
            if self.irq_enabled & mask != 0 {
                if level {
                    self.pending_count += 1;
                } else {
                    self.pending_count -= 1;
                }
            }
        }
        self.update_outputs();
        Ok(())
    }
}

/// MMIO view of a [`SharedInterruptController`].
///
/// Devices hold their own clone of the shared controller as their [`IrqSink`], so the register
/// window is a separate handle onto the same state.
pub struct InterruptControllerMmio {
    intc: SharedInterruptController,
}

impl InterruptControllerMmio {
    pub fn new(intc: SharedInterruptController) -> Self {
        Self { intc }
    }
}

impl MmioHandler for InterruptControllerMmio {
    fn read(&mut self, offset: u32, _size: usize) -> DeviceResult<u32> {
        self.intc.borrow_mut().mmio_read(offset)
    }

    fn write(&mut self, offset: u32, _size: usize, value: u32) -> DeviceResult<()> {
        self.intc.borrow_mut().mmio_write(offset, value)
    }
}
