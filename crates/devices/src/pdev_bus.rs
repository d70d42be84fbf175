//! Goldfish platform bus enumerator.
//!
//! Guest drivers discover devices by writing `INIT` to the OP register and then reading OP until
//! it returns [`PDEV_BUS_OP_DONE`]. Each [`PDEV_BUS_OP_ADD_DEV`] selects one device whose
//! descriptor is then visible through the remaining registers; the next OP read marks it
//! reported and moves on. The enumerator's own interrupt line stays high from `INIT` until the
//! walk finishes.

use goldfish_platform::interrupts::IrqSink;
use goldfish_platform::memory::GuestMemory;
use goldfish_platform::{
    DeviceDescriptor, DeviceError, DeviceHandle, DeviceResult, IrqRange, MmioHandler,
    SharedRegistry,
};

pub const PDEV_BUS_NAME: &str = "goldfish_device_bus";
pub const PDEV_BUS_MMIO_SIZE: u32 = 0x1000;

pub const PDEV_BUS_OP_DONE: u32 = 0x00;
/// Never produced: devices are not hot-removed.
pub const PDEV_BUS_OP_REMOVE_DEV: u32 = 0x04;
pub const PDEV_BUS_OP_ADD_DEV: u32 = 0x08;

/// Value written to OP to restart enumeration.
pub const PDEV_BUS_OP_INIT: u32 = 0x00;

pub const PDEV_BUS_OP: u32 = 0x00;
pub const PDEV_BUS_GET_NAME: u32 = 0x04;
pub const PDEV_BUS_NAME_LEN: u32 = 0x08;
pub const PDEV_BUS_ID: u32 = 0x0c;
pub const PDEV_BUS_IO_BASE: u32 = 0x10;
pub const PDEV_BUS_IO_SIZE: u32 = 0x14;
pub const PDEV_BUS_IRQ: u32 = 0x18;
pub const PDEV_BUS_IRQ_COUNT: u32 = 0x1c;

#[derive(Debug)]
pub struct DeviceBus {
    registry: SharedRegistry,
    current: Option<DeviceHandle>,
    irq: IrqRange,
}

impl DeviceBus {
    /// `irq` is the line block the registry assigned to the enumerator itself.
    pub fn new(registry: SharedRegistry, irq: IrqRange) -> Self {
        Self {
            registry,
            current: None,
            irq,
        }
    }

    fn advance(&mut self) -> Option<DeviceHandle> {
        let mut registry = self.registry.borrow_mut();
        let next = match self.current {
            None => registry.next_unreported(None),
            Some(current) => {
                registry.mark_reported(current);
                registry
                    .next(current)
                    .and_then(|succ| registry.next_unreported(Some(succ)))
            }
        };
        self.current = next;
        next
    }

    fn current_field(&self, field: impl FnOnce(&DeviceDescriptor) -> u32) -> u32 {
        let Some(current) = self.current else {
            return 0;
        };
        self.registry.borrow().get(current).map_or(0, field)
    }

    pub fn mmio_read(&mut self, offset: u32, sink: &mut impl IrqSink) -> DeviceResult<u32> {
        match offset {
            PDEV_BUS_OP => match self.advance() {
                Some(handle) => {
                    tracing::debug!(device = PDEV_BUS_NAME, index = handle.index(), "ADD_DEV");
                    Ok(PDEV_BUS_OP_ADD_DEV)
                }
                None => {
                    self.irq.set(sink, PDEV_BUS_NAME, 0, false)?;
                    tracing::debug!(device = PDEV_BUS_NAME, "enumeration done");
                    Ok(PDEV_BUS_OP_DONE)
                }
            },
            PDEV_BUS_NAME_LEN => Ok(self.current_field(|d| d.name.len() as u32)),
            PDEV_BUS_ID => Ok(self.current_field(|d| d.id as u32)),
            PDEV_BUS_IO_BASE => Ok(self.current_field(|d| d.base)),
            PDEV_BUS_IO_SIZE => Ok(self.current_field(|d| d.size)),
            PDEV_BUS_IRQ => Ok(self.current_field(|d| d.irq)),
            PDEV_BUS_IRQ_COUNT => Ok(self.current_field(|d| d.irq_count)),
            _ => Err(DeviceError::BadReadOffset {
                device: PDEV_BUS_NAME,
                offset,
            }),
        }
    }

    pub fn mmio_write(
        &mut self,
        offset: u32,
        value: u32,
        sink: &mut impl IrqSink,
        mem: &mut impl GuestMemory,
    ) -> DeviceResult<()> {
        match offset {
            PDEV_BUS_OP => {
                if value != PDEV_BUS_OP_INIT {
                    return Err(DeviceError::BadOpValue {
                        device: PDEV_BUS_NAME,
                        value,
                    });
                }
                let populated = {
                    let mut registry = self.registry.borrow_mut();
                    registry.clear_reported();
                    !registry.is_empty()
                };
                self.current = None;
                tracing::debug!(device = PDEV_BUS_NAME, populated, "INIT");
                self.irq.set(sink, PDEV_BUS_NAME, 0, populated)
            }
            PDEV_BUS_GET_NAME => {
                let Some(current) = self.current else {
                    return Ok(());
                };
                let registry = self.registry.borrow();
                if let Some(desc) = registry.get(current) {
                    mem.write_physical(u64::from(value), desc.name.as_bytes());
                }
                Ok(())
            }
            _ => Err(DeviceError::BadWriteOffset {
                device: PDEV_BUS_NAME,
                offset,
            }),
        }
    }
}

/// MMIO adapter for [`DeviceBus`].
///
/// The enumerator needs an interrupt sink for its own line and guest memory for `GET_NAME`;
/// [`MmioHandler`] carries neither, so both are bundled here.
pub struct DeviceBusMmio<S: IrqSink, M: GuestMemory> {
    bus: DeviceBus,
    sink: S,
    mem: M,
}

impl<S: IrqSink, M: GuestMemory> DeviceBusMmio<S, M> {
    pub fn new(bus: DeviceBus, sink: S, mem: M) -> Self {
        Self { bus, sink, mem }
    }
}

impl<S: IrqSink, M: GuestMemory> MmioHandler for DeviceBusMmio<S, M> {
    fn read(&mut self, offset: u32, _size: usize) -> DeviceResult<u32> {
        self.bus.mmio_read(offset, &mut self.sink)
    }

    fn write(&mut self, offset: u32, _size: usize, value: u32) -> DeviceResult<()> {
        self.bus
            .mmio_write(offset, value, &mut self.sink, &mut self.mem)
    }
}
