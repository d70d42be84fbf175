#![forbid(unsafe_code)]

mod lines;
mod recorder;

pub use lines::{CpuLine, CpuPins, IrqRange, IrqSink, CONTROLLER_LINES};
pub use recorder::{LineEvent, LineRecorder, PinEvent, PinRecorder};
