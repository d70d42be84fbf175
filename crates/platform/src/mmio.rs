use crate::error::{DeviceError, DeviceResult};

/// Register-level view of a memory-mapped device.
///
/// The same handler serves 8, 16 and 32-bit accesses; `offset` is relative to the start of the
/// device's window. Handlers report undefined registers as errors instead of ignoring them.
pub trait MmioHandler {
    fn read(&mut self, offset: u32, size: usize) -> DeviceResult<u32>;
    fn write(&mut self, offset: u32, size: usize, value: u32) -> DeviceResult<()>;
}

struct Region {
    base: u64,
    len: u64,
    name: String,
    handler: Box<dyn MmioHandler>,
}

impl Region {
    fn end_exclusive(&self) -> u64 {
        self.base + self.len
    }

    fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr < self.end_exclusive()
    }
}

/// Routes physical addresses to device windows.
///
/// Windows never overlap, so lookups are a binary search over the sorted window list.
#[derive(Default)]
pub struct MmioBus {
    regions: Vec<Region>,
}

fn size_mask(size: usize) -> u32 {
    match size {
        1 => 0xFF,
        2 => 0xFFFF,
        _ => u32::MAX,
    }
}

impl MmioBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `handler` over `[base, base + len)`.
    pub fn map(
        &mut self,
        base: u32,
        len: u32,
        name: &str,
        handler: Box<dyn MmioHandler>,
    ) -> DeviceResult<()> {
        let start = u64::from(base);
        let end_exclusive = start + u64::from(len);
        if len == 0 || end_exclusive > 1 << 32 {
            return Err(DeviceError::RegionOverflow {
                device: name.to_owned(),
                base,
                size: len,
            });
        }

        let idx = self.regions.partition_point(|r| r.base < start);
        let neighbours = [idx.checked_sub(1), Some(idx)];
        for other in neighbours.into_iter().flatten() {
            let Some(other) = self.regions.get(other) else {
                continue;
            };
            if start < other.end_exclusive() && other.base < end_exclusive {
                return Err(DeviceError::RegionOverlap {
                    device: name.to_owned(),
                    base,
                    size: len,
                    owner: other.name.clone(),
                });
            }
        }

        tracing::debug!(device = name, "mapped mmio window {base:#x}+{len:#x}");
        self.regions.insert(
            idx,
            Region {
                base: start,
                len: u64::from(len),
                name: name.to_owned(),
                handler,
            },
        );
        Ok(())
    }

    fn find(&mut self, addr: u64) -> Option<&mut Region> {
        let idx = self.regions.partition_point(|r| r.base <= addr);
        let cand = idx.checked_sub(1)?;
        self.regions.get_mut(cand).filter(|r| r.contains(addr))
    }

    /// Name of the device whose window contains `addr`.
    pub fn device_at(&self, addr: u64) -> Option<&str> {
        let idx = self.regions.partition_point(|r| r.base <= addr);
        let cand = idx.checked_sub(1)?;
        self.regions
            .get(cand)
            .filter(|r| r.contains(addr))
            .map(|r| r.name.as_str())
    }

    /// # Panics
    ///
    /// Panics if `size` is not 1, 2 or 4; the CPU model only issues those widths.
    pub fn read(&mut self, addr: u64, size: usize) -> DeviceResult<u32> {
        assert!(matches!(size, 1 | 2 | 4), "invalid mmio access size {size}");
        let region = self.find(addr).ok_or(DeviceError::Unmapped { addr })?;
        let offset = (addr - region.base) as u32;
        let value = region.handler.read(offset, size)?;
        Ok(value & size_mask(size))
    }

    /// # Panics
    ///
    /// Panics if `size` is not 1, 2 or 4.
    pub fn write(&mut self, addr: u64, size: usize, value: u32) -> DeviceResult<()> {
        assert!(matches!(size, 1 | 2 | 4), "invalid mmio access size {size}");
        let region = self.find(addr).ok_or(DeviceError::Unmapped { addr })?;
        let offset = (addr - region.base) as u32;
        region.handler.write(offset, size, value & size_mask(size))
    }

    pub fn read_u32(&mut self, addr: u64) -> DeviceResult<u32> {
        self.read(addr, 4)
    }

    pub fn write_u32(&mut self, addr: u64, value: u32) -> DeviceResult<()> {
        self.write(addr, 4, value)
    }
}
