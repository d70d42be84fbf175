use std::cell::RefCell;
use std::rc::Rc;

/// Guest physical memory as seen by a device doing DMA-style copies.
///
/// Accesses outside backing storage are not errors: reads float high and writes are dropped,
/// which is what a guest sees on an unpopulated bus.
pub trait GuestMemory {
    fn read_physical(&mut self, paddr: u64, buf: &mut [u8]);
    fn write_physical(&mut self, paddr: u64, buf: &[u8]);

    fn read_u32(&mut self, paddr: u64) -> u32 {
        let mut buf = [0u8; 4];
        self.read_physical(paddr, &mut buf);
        u32::from_le_bytes(buf)
    }

    fn write_u32(&mut self, paddr: u64, val: u32) {
        self.write_physical(paddr, &val.to_le_bytes());
    }
}

pub type SharedGuestMemory = Rc<RefCell<dyn GuestMemory>>;

impl<T: GuestMemory + ?Sized> GuestMemory for Rc<RefCell<T>> {
    fn read_physical(&mut self, paddr: u64, buf: &mut [u8]) {
        self.borrow_mut().read_physical(paddr, buf);
    }

    fn write_physical(&mut self, paddr: u64, buf: &[u8]) {
        self.borrow_mut().write_physical(paddr, buf);
    }
}

/// Flat RAM starting at guest physical address 0.
#[derive(Debug, Clone)]
pub struct DenseMemory {
    bytes: Vec<u8>,
}

impl DenseMemory {
    pub fn new(len: usize) -> Self {
        Self {
            bytes: vec![0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Splits `[paddr, paddr + len)` into the part backed by RAM, as an index range.
    fn backed(&self, paddr: u64, len: usize) -> Option<std::ops::Range<usize>> {
        let start = usize::try_from(paddr).ok()?;
        if start >= self.bytes.len() {
            return None;
        }
        let end = start.saturating_add(len).min(self.bytes.len());
        Some(start..end)
    }
}

impl GuestMemory for DenseMemory {
    fn read_physical(&mut self, paddr: u64, buf: &mut [u8]) {
        buf.fill(0xFF);
        if let Some(range) = self.backed(paddr, buf.len()) {
            let n = range.len();
            buf[..n].copy_from_slice(&self.bytes[range]);
        }
    }

    fn write_physical(&mut self, paddr: u64, buf: &[u8]) {
        if let Some(range) = self.backed(paddr, buf.len()) {
            let n = range.len();
            self.bytes[range].copy_from_slice(&buf[..n]);
        }
    }
}
