//! Platform device registry and the base-address / interrupt-line allocator.
//!
//! Devices are registered once during bootstrap and never removed. Registration order is the
//! order the bus enumerator reports devices to the guest, so the registry is an append-only arena
//! indexed by [`DeviceHandle`].

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use crate::error::{DeviceError, DeviceResult};
use crate::interrupts::{IrqRange, CONTROLLER_LINES};

/// Id reported for devices that do not carry an instance number.
pub const NO_ID: i32 = -1;

const ADDRESS_SPACE_END: u64 = 1 << 32;

/// Metadata for one device attached to the platform bus.
///
/// `base == 0` asks the allocator for a window; `irq == 0` with `irq_count > 0` asks it for a
/// block of lines. Once registered, both stay fixed for the life of the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDescriptor {
    pub name: String,
    pub id: i32,
    pub base: u32,
    pub size: u32,
    pub irq: u32,
    pub irq_count: u32,
}

impl DeviceDescriptor {
    pub fn new(name: impl Into<String>, size: u32) -> Self {
        Self {
            name: name.into(),
            id: NO_ID,
            base: 0,
            size,
            irq: 0,
            irq_count: 0,
        }
    }

    pub fn with_id(mut self, id: i32) -> Self {
        self.id = id;
        self
    }

    pub fn with_base(mut self, base: u32) -> Self {
        self.base = base;
        self
    }

    pub fn with_irq_count(mut self, irq_count: u32) -> Self {
        self.irq_count = irq_count;
        self
    }

    pub fn with_irq(mut self, irq: u32, irq_count: u32) -> Self {
        self.irq = irq;
        self.irq_count = irq_count;
        self
    }

    pub fn irq_range(&self) -> IrqRange {
        IrqRange::new(self.irq, self.irq_count)
    }

    fn window_end(&self) -> u64 {
        u64::from(self.base) + u64::from(self.size)
    }

    fn window_overlaps(&self, base: u64, size: u64) -> bool {
        self.size != 0
            && size != 0
            && base < self.window_end()
            && u64::from(self.base) < base + size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceHandle(usize);

impl DeviceHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
struct Entry {
    desc: DeviceDescriptor,
    reported: bool,
}

#[derive(Debug)]
pub struct DeviceRegistry {
    entries: Vec<Entry>,
    next_free_base: u64,
    next_free_irq: u64,
    irq_lines: u32,
}

pub type SharedRegistry = Rc<RefCell<DeviceRegistry>>;

impl DeviceRegistry {
    /// Creates an empty registry whose allocator starts at `free_base` / `free_irq`.
    pub fn new(free_base: u32, free_irq: u32) -> Self {
        Self {
            entries: Vec::new(),
            next_free_base: u64::from(free_base),
            next_free_irq: u64::from(free_irq),
            irq_lines: CONTROLLER_LINES,
        }
    }

    pub fn into_shared(self) -> SharedRegistry {
        Rc::new(RefCell::new(self))
    }

    pub fn next_free_base(&self) -> u64 {
        self.next_free_base
    }

    pub fn next_free_irq(&self) -> u64 {
        self.next_free_irq
    }

    /// Assigns any missing window / irq block and appends the device.
    ///
    /// On error the registry is left untouched.
    pub fn register(&mut self, mut desc: DeviceDescriptor) -> DeviceResult<DeviceHandle> {
        let mut next_free_base = self.next_free_base;
        let mut next_free_irq = self.next_free_irq;

        if desc.base == 0 {
            let base = self.first_free_window(next_free_base, &desc)?;
            desc.base = base;
            next_free_base = u64::from(base) + u64::from(desc.size);
        } else {
            self.check_fixed_window(&desc)?;
        }

        if desc.irq_count > 0 {
            if desc.irq == 0 {
                let irq = self.first_free_lines(next_free_irq, &desc)?;
                desc.irq = irq;
                next_free_irq = u64::from(irq) + u64::from(desc.irq_count);
            } else {
                self.check_fixed_lines(&desc)?;
            }
        }

        tracing::info!(
            device = %desc.name,
            id = desc.id,
            irq = desc.irq,
            irq_count = desc.irq_count,
            "registered device at {:#x}+{:#x}",
            desc.base,
            desc.size
        );

        self.next_free_base = next_free_base;
        self.next_free_irq = next_free_irq;
        let handle = DeviceHandle(self.entries.len());
        self.entries.push(Entry {
            desc,
            reported: false,
        });
        Ok(handle)
    }

    fn first_free_window(&self, mut candidate: u64, desc: &DeviceDescriptor) -> DeviceResult<u32> {
        let size = u64::from(desc.size);
        loop {
            if candidate >= ADDRESS_SPACE_END || candidate + size > ADDRESS_SPACE_END {
                return Err(DeviceError::RegionOverflow {
                    device: desc.name.clone(),
                    base: candidate.min(u64::from(u32::MAX)) as u32,
                    size: desc.size,
                });
            }
            match self
                .entries
                .iter()
                .find(|e| e.desc.window_overlaps(candidate, size))
            {
                Some(owner) => candidate = owner.desc.window_end(),
                None => return Ok(candidate as u32),
            }
        }
    }

    fn check_fixed_window(&self, desc: &DeviceDescriptor) -> DeviceResult<()> {
        if desc.window_end() > ADDRESS_SPACE_END {
            return Err(DeviceError::RegionOverflow {
                device: desc.name.clone(),
                base: desc.base,
                size: desc.size,
            });
        }
        let base = u64::from(desc.base);
        let size = u64::from(desc.size);
        if let Some(owner) = self
            .entries
            .iter()
            .find(|e| e.desc.window_overlaps(base, size))
        {
            return Err(DeviceError::RegionOverlap {
                device: desc.name.clone(),
                base: desc.base,
                size: desc.size,
                owner: owner.desc.name.clone(),
            });
        }
        Ok(())
    }

    fn first_free_lines(&self, mut candidate: u64, desc: &DeviceDescriptor) -> DeviceResult<u32> {
        loop {
            let end = candidate + u64::from(desc.irq_count);
            if end > u64::from(self.irq_lines) {
                return Err(DeviceError::IrqRangeExceedsController {
                    device: desc.name.clone(),
                    first: candidate.min(u64::from(u32::MAX)) as u32,
                    end,
                    lines: self.irq_lines,
                });
            }
            let wanted = IrqRange::new(candidate as u32, desc.irq_count);
            match self
                .entries
                .iter()
                .find(|e| e.desc.irq_range().overlaps(&wanted))
            {
                Some(owner) => candidate = owner.desc.irq_range().end(),
                None => return Ok(candidate as u32),
            }
        }
    }

    fn check_fixed_lines(&self, desc: &DeviceDescriptor) -> DeviceResult<()> {
        let wanted = desc.irq_range();
        if wanted.end() > u64::from(self.irq_lines) {
            return Err(DeviceError::IrqRangeExceedsController {
                device: desc.name.clone(),
                first: wanted.first,
                end: wanted.end(),
                lines: self.irq_lines,
            });
        }
        if let Some(owner) = self
            .entries
            .iter()
            .find(|e| e.desc.irq_range().overlaps(&wanted))
        {
            return Err(DeviceError::IrqRangeOverlap {
                device: desc.name.clone(),
                first: wanted.first,
                end: wanted.end(),
                owner: owner.desc.name.clone(),
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first(&self) -> Option<DeviceHandle> {
        (!self.entries.is_empty()).then_some(DeviceHandle(0))
    }

    pub fn next(&self, handle: DeviceHandle) -> Option<DeviceHandle> {
        let next = handle.0 + 1;
        (next < self.entries.len()).then_some(DeviceHandle(next))
    }

    pub fn get(&self, handle: DeviceHandle) -> Option<&DeviceDescriptor> {
        self.entries.get(handle.0).map(|e| &e.desc)
    }

    pub fn iter(&self) -> impl Iterator<Item = (DeviceHandle, &DeviceDescriptor)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(idx, e)| (DeviceHandle(idx), &e.desc))
    }

    pub fn descriptors(&self) -> Vec<DeviceDescriptor> {
        self.entries.iter().map(|e| e.desc.clone()).collect()
    }

    pub fn find_by_name(&self, name: &str) -> Option<DeviceHandle> {
        self.iter().find(|(_, d)| d.name == name).map(|(h, _)| h)
    }

    pub fn is_reported(&self, handle: DeviceHandle) -> bool {
        self.entries.get(handle.0).is_some_and(|e| e.reported)
    }

    pub fn mark_reported(&mut self, handle: DeviceHandle) {
        if let Some(entry) = self.entries.get_mut(handle.0) {
            entry.reported = true;
        }
    }

    pub fn clear_reported(&mut self) {
        for entry in &mut self.entries {
            entry.reported = false;
        }
    }

    /// First unreported device at or after `from` (the head when `from` is `None`).
    pub fn next_unreported(&self, from: Option<DeviceHandle>) -> Option<DeviceHandle> {
        let start = from.map_or(0, |h| h.0);
        self.entries
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, e)| !e.reported)
            .map(|(idx, _)| DeviceHandle(idx))
    }
}
