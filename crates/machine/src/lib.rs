//! Goldfish platform bootstrap.
//!
//! [`Machine`] owns everything a guest CPU model talks to: guest RAM, the MMIO dispatcher with the
//! built-in devices mapped at their platform addresses, the interrupt controller's CPU pins and
//! the wake-up queue that drives the timer alarm. It does not contain a CPU; the owner of the run
//! loop issues register accesses through [`Machine::read`] / [`Machine::write`], advances time
//! with [`Machine::advance_to`], and polls [`Machine::cpu_irq`] / [`Machine::cpu_fiq`].

#![forbid(unsafe_code)]

mod config;
mod error;

use std::cell::RefCell;
use std::rc::Rc;

use goldfish_devices::intc::{INTC_MMIO_SIZE, INTC_NAME};
use goldfish_devices::pdev_bus::{PDEV_BUS_MMIO_SIZE, PDEV_BUS_NAME};
use goldfish_devices::rtc::{RTC_MMIO_SIZE, RTC_NAME};
use goldfish_devices::timer::{TIMER_MMIO_SIZE, TIMER_NAME};
use goldfish_devices::{
    DeviceBus, DeviceBusMmio, DeviceWakeup, GoldfishRtc, GoldfishRtcMmio, GoldfishTimer,
    GoldfishTimerMmio, InterruptController, InterruptControllerMmio, SharedGoldfishTimer,
    SharedInterruptController,
};
use goldfish_platform::interrupts::PinRecorder;
use goldfish_platform::time::SharedTimerQueue;
use goldfish_platform::{
    Clock, DenseMemory, DeviceDescriptor, DeviceError, DeviceHandle, DeviceRegistry, DeviceResult,
    IrqRange, MmioBus, MmioHandler, SharedGuestMemory, SharedRegistry, TimerQueue,
};

pub use config::MachineConfig;
pub use error::MachineError;

type DynClock = Rc<dyn Clock>;

pub struct Machine {
    cfg: MachineConfig,
    clock: DynClock,
    registry: SharedRegistry,
    mmio: MmioBus,
    intc: SharedInterruptController,
    pins: Rc<RefCell<PinRecorder>>,
    memory: SharedGuestMemory,
    wakeups: SharedTimerQueue<DeviceWakeup>,
    timer: Option<SharedGoldfishTimer<DynClock>>,
}

impl Machine {
    /// Builds the platform described by `cfg`.
    ///
    /// `clock` drives the timer; `wall_clock` backs the RTC. The interrupt controller, bus
    /// enumerator, timer and RTC are registered in that order, so that is also the order the guest
    /// enumerates them in.
    pub fn new(
        cfg: MachineConfig,
        clock: impl Clock + 'static,
        wall_clock: impl Clock + 'static,
    ) -> Result<Self, MachineError> {
        cfg.validate()?;
        let ram_len = usize::try_from(cfg.ram_size_bytes)
            .map_err(|_| MachineError::GuestMemoryTooLarge(cfg.ram_size_bytes))?;

        let pins = Rc::new(RefCell::new(PinRecorder::new()));
        let mut machine = Self {
            clock: Rc::new(clock),
            registry: DeviceRegistry::new(cfg.free_base, cfg.free_irq).into_shared(),
            mmio: MmioBus::new(),
            intc: InterruptController::new(Box::new(pins.clone())).into_shared(),
            pins,
            memory: Rc::new(RefCell::new(DenseMemory::new(ram_len))),
            wakeups: Rc::new(RefCell::new(TimerQueue::new())),
            timer: None,
            cfg,
        };

        let intc = machine.intc.clone();
        machine.attach(
            DeviceDescriptor::new(INTC_NAME, INTC_MMIO_SIZE).with_base(machine.cfg.intc_base),
            |_| Box::new(InterruptControllerMmio::new(intc)),
        )?;

        let (registry, intc, memory) = (
            machine.registry.clone(),
            machine.intc.clone(),
            machine.memory.clone(),
        );
        machine.attach(
            DeviceDescriptor::new(PDEV_BUS_NAME, PDEV_BUS_MMIO_SIZE)
                .with_base(machine.cfg.bus_base)
                .with_irq(machine.cfg.bus_irq, 1),
            |desc| {
                let bus = DeviceBus::new(registry, desc.irq_range());
                Box::new(DeviceBusMmio::new(bus, intc, memory))
            },
        )?;

        if machine.cfg.enable_timer {
            let mut desc = DeviceDescriptor::new(TIMER_NAME, TIMER_MMIO_SIZE).with_irq_count(1);
            if let Some(base) = machine.cfg.timer_base {
                desc = desc.with_base(base);
            }
            if let Some(irq) = machine.cfg.timer_irq {
                desc = desc.with_irq(irq, 1);
            }

            let (clock, intc, wakeups) = (
                machine.clock.clone(),
                machine.intc.clone(),
                machine.wakeups.clone(),
            );
            let mut shared = None;
            machine.attach(desc, |desc| {
                let timer = GoldfishTimer::new(clock, desc.irq_range()).into_shared();
                shared = Some(timer.clone());
                Box::new(GoldfishTimerMmio::new(timer, intc, wakeups))
            })?;
            machine.timer = shared;
        }

        if machine.cfg.enable_rtc {
            let wall_clock: DynClock = Rc::new(wall_clock);
            let intc = machine.intc.clone();
            machine.attach(
                DeviceDescriptor::new(RTC_NAME, RTC_MMIO_SIZE).with_irq_count(1),
                |desc| {
                    let rtc = GoldfishRtc::new(wall_clock, desc.irq_range());
                    Box::new(GoldfishRtcMmio::new(rtc, intc))
                },
            )?;
        }

        tracing::info!(
            devices = machine.registry.borrow().len(),
            ram_size_bytes = machine.cfg.ram_size_bytes,
            "goldfish machine ready"
        );
        Ok(machine)
    }

    /// Registers `desc` and maps the handler built from the final (allocated) descriptor.
    ///
    /// Zero-sized devices are enumerable but get no MMIO window.
    fn attach(
        &mut self,
        desc: DeviceDescriptor,
        build: impl FnOnce(&DeviceDescriptor) -> Box<dyn MmioHandler>,
    ) -> Result<DeviceHandle, MachineError> {
        let handle = self.registry.borrow_mut().register(desc)?;
        let desc = self
            .registry
            .borrow()
            .get(handle)
            .cloned()
            .expect("handle returned by register is valid");
        let handler = build(&desc);
        if desc.size != 0 {
            self.mmio.map(desc.base, desc.size, &desc.name, handler)?;
        }
        Ok(handle)
    }

    /// Adds a board-specific device after the built-in ones.
    ///
    /// The handler is built once the registry has assigned the window and irq block, so it can
    /// capture its [`IrqRange`]. Use [`Machine::interrupt_controller`] as its interrupt sink.
    pub fn add_device(
        &mut self,
        desc: DeviceDescriptor,
        build: impl FnOnce(&DeviceDescriptor) -> Box<dyn MmioHandler>,
    ) -> Result<DeviceHandle, MachineError> {
        self.attach(desc, build)
    }

    pub fn config(&self) -> &MachineConfig {
        &self.cfg
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Descriptors in registration order.
    pub fn device_map(&self) -> Vec<DeviceDescriptor> {
        self.registry.borrow().descriptors()
    }

    pub fn memory(&self) -> &SharedGuestMemory {
        &self.memory
    }

    pub fn interrupt_controller(&self) -> &SharedInterruptController {
        &self.intc
    }

    pub fn cpu_irq(&self) -> bool {
        self.pins.borrow().irq()
    }

    pub fn cpu_fiq(&self) -> bool {
        self.pins.borrow().fiq()
    }

    /// Drives line `index` of a registered device's irq block.
    pub fn set_device_irq(
        &mut self,
        handle: DeviceHandle,
        index: u32,
        level: bool,
    ) -> DeviceResult<()> {
        let (name, range) = match self.registry.borrow().get(handle) {
            Some(desc) => (desc.name.clone(), desc.irq_range()),
            None => (format!("device #{}", handle.index()), IrqRange::NONE),
        };
        range.set(&mut self.intc, &name, index, level)
    }

    fn log_unmapped(err: DeviceError, write: bool) -> DeviceError {
        if let DeviceError::Unmapped { addr } = err {
            tracing::warn!(write, "unmapped mmio access at {addr:#x}");
        }
        err
    }

    /// Guest load from `addr`. An access that hits no device returns the non-fatal
    /// [`DeviceError::Unmapped`]; anything else the device rejects is fatal.
    pub fn read(&mut self, addr: u64, size: usize) -> DeviceResult<u32> {
        self.mmio
            .read(addr, size)
            .map_err(|err| Self::log_unmapped(err, false))
    }

    pub fn write(&mut self, addr: u64, size: usize, value: u32) -> DeviceResult<()> {
        self.mmio
            .write(addr, size, value)
            .map_err(|err| Self::log_unmapped(err, true))
    }

    pub fn read_u32(&mut self, addr: u64) -> DeviceResult<u32> {
        self.read(addr, 4)
    }

    pub fn write_u32(&mut self, addr: u64, value: u32) -> DeviceResult<()> {
        self.write(addr, 4, value)
    }

    /// Earliest outstanding wake-up, if any.
    pub fn next_deadline(&self) -> Option<u64> {
        self.wakeups.borrow().next_deadline()
    }

    /// Delivers every wake-up due at or before `now_ns`, in deadline order. Returns how many were
    /// delivered.
    pub fn advance_to(&mut self, now_ns: u64) -> DeviceResult<usize> {
        let mut delivered = 0;
        loop {
            let Some(due) = self.wakeups.borrow_mut().pop_due(now_ns) else {
                break;
            };
            match due.event {
                DeviceWakeup::TimerAlarm => {
                    if let Some(timer) = &self.timer {
                        timer.borrow_mut().fire_alarm(due.id, &mut self.intc)?;
                    }
                }
            }
            delivered += 1;
        }
        Ok(delivered)
    }

    /// [`Machine::advance_to`] the current time of the machine's clock.
    pub fn poll(&mut self) -> DeviceResult<usize> {
        let now_ns = self.clock.now_ns();
        self.advance_to(now_ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goldfish_platform::ManualClock;

    fn machine(cfg: MachineConfig) -> Machine {
        Machine::new(cfg, ManualClock::new(), ManualClock::new()).unwrap()
    }

    #[test]
    fn default_layout_matches_the_platform() {
        let m = machine(MachineConfig::default());
        let map = m.device_map();
        let layout: Vec<_> = map
            .iter()
            .map(|d| (d.name.as_str(), d.base, d.irq, d.irq_count))
            .collect();
        assert_eq!(
            layout,
            [
                (INTC_NAME, 0xff00_0000, 0, 0),
                (PDEV_BUS_NAME, 0xff00_1000, 1, 1),
                (TIMER_NAME, 0xff01_0000, 10, 1),
                (RTC_NAME, 0xff01_1000, 11, 1),
            ]
        );
        assert!(map.iter().all(|d| d.id == -1 && d.size == 0x1000));
    }

    #[test]
    fn optional_devices_can_be_left_out() {
        let m = machine(MachineConfig {
            enable_timer: false,
            enable_rtc: false,
            ..Default::default()
        });
        assert_eq!(m.registry().borrow().len(), 2);
        assert_eq!(m.next_deadline(), None);
    }

    #[test]
    fn fixed_timer_placement_is_honoured() {
        let m = machine(MachineConfig {
            timer_base: Some(0xfe00_0000),
            timer_irq: Some(20),
            ..Default::default()
        });
        let reg = m.registry().borrow();
        let timer = reg.get(reg.find_by_name(TIMER_NAME).unwrap()).unwrap();
        assert_eq!((timer.base, timer.irq), (0xfe00_0000, 20));
        let rtc = reg.get(reg.find_by_name(RTC_NAME).unwrap()).unwrap();
        assert_eq!((rtc.base, rtc.irq), (0xff01_0000, 10));
    }

    #[test]
    fn colliding_timer_window_is_a_configuration_error() {
        let err = Machine::new(
            MachineConfig {
                timer_base: Some(0xff00_1800),
                ..Default::default()
            },
            ManualClock::new(),
            ManualClock::new(),
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            MachineError::Device(DeviceError::RegionOverlap { ref owner, .. })
                if owner == PDEV_BUS_NAME
        ));
    }
}
