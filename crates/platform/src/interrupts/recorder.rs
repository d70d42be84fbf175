use std::collections::BTreeSet;

use super::lines::{CpuLine, CpuPins, IrqSink, CONTROLLER_LINES};
use crate::error::{DeviceError, DeviceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEvent {
    Raise(u32),
    Lower(u32),
}

/// [`IrqSink`] that only remembers line levels, for exercising a device without a controller.
#[derive(Debug, Default)]
pub struct LineRecorder {
    asserted: BTreeSet<u32>,
    events: Vec<LineEvent>,
}

impl LineRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_asserted(&self, line: u32) -> bool {
        self.asserted.contains(&line)
    }

    pub fn take_events(&mut self) -> Vec<LineEvent> {
        std::mem::take(&mut self.events)
    }
}

impl IrqSink for LineRecorder {
    fn set_irq(&mut self, line: u32, level: bool) -> DeviceResult<()> {
        if line >= CONTROLLER_LINES {
            return Err(DeviceError::IrqLineOutOfRange {
                line,
                lines: CONTROLLER_LINES,
            });
        }
        if level {
            self.asserted.insert(line);
            self.events.push(LineEvent::Raise(line));
        } else {
            self.asserted.remove(&line);
            self.events.push(LineEvent::Lower(line));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinEvent {
    pub line: CpuLine,
    pub level: bool,
}

/// [`CpuPins`] implementation that latches the current level of each pin.
///
/// This stands in for the CPU model: the run loop (or a test) polls [`PinRecorder::irq`] and
/// [`PinRecorder::fiq`] to decide whether to take an interrupt.
#[derive(Debug, Default)]
pub struct PinRecorder {
    irq: bool,
    fiq: bool,
    events: Vec<PinEvent>,
}

impl PinRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn irq(&self) -> bool {
        self.irq
    }

    pub fn fiq(&self) -> bool {
        self.fiq
    }

    pub fn take_events(&mut self) -> Vec<PinEvent> {
        std::mem::take(&mut self.events)
    }
}

impl CpuPins for PinRecorder {
    fn set_line(&mut self, line: CpuLine, level: bool) {
        match line {
            CpuLine::Irq => self.irq = level,
            CpuLine::Fiq => self.fiq = level,
        }
        self.events.push(PinEvent { line, level });
    }
}
