use goldfish_devices::pdev_bus::*;
use goldfish_devices::timer::*;
use goldfish_machine::{Machine, MachineConfig, MachineError};
use goldfish_platform::memory::GuestMemory;
use goldfish_platform::{DeviceDescriptor, DeviceError, DeviceResult, ManualClock, MmioHandler};

const INTC: u64 = 0xff00_0000;
const BUS: u64 = 0xff00_1000;
const TIMER: u64 = 0xff01_0000;
const RTC: u64 = 0xff01_1000;

const INTC_STATUS: u64 = 0x00;
const INTC_NUMBER: u64 = 0x04;
const INTC_ENABLE: u64 = 0x10;

fn boot() -> (Machine, ManualClock) {
    let clock = ManualClock::new();
    let wall = ManualClock::starting_at(1_600_000_000 * 1_000_000_000);
    let machine = Machine::new(MachineConfig::default(), clock.clone(), wall).unwrap();
    (machine, clock)
}

fn enumerate(machine: &mut Machine) -> Vec<(String, u32, u32)> {
    let reg = |off: u32| BUS + u64::from(off);
    machine.write_u32(reg(PDEV_BUS_OP), PDEV_BUS_OP_INIT).unwrap();

    let mut found = Vec::new();
    while machine.read_u32(reg(PDEV_BUS_OP)).unwrap() == PDEV_BUS_OP_ADD_DEV {
        let len = machine.read_u32(reg(PDEV_BUS_NAME_LEN)).unwrap() as usize;
        machine.write_u32(reg(PDEV_BUS_GET_NAME), 0x2000).unwrap();
        let mut name = vec![0; len];
        machine.memory().borrow_mut().read_physical(0x2000, &mut name);
        found.push((
            String::from_utf8(name).unwrap(),
            machine.read_u32(reg(PDEV_BUS_IO_BASE)).unwrap(),
            machine.read_u32(reg(PDEV_BUS_IRQ)).unwrap(),
        ));
    }
    found
}

#[test]
fn guest_enumeration_sees_the_default_platform() {
    let (mut machine, _clock) = boot();
    let found = enumerate(&mut machine);
    assert_eq!(
        found,
        [
            ("goldfish_interrupt_controller".to_string(), 0xff00_0000, 0),
            ("goldfish_device_bus".to_string(), 0xff00_1000, 1),
            ("goldfish_timer".to_string(), 0xff01_0000, 10),
            ("goldfish_rtc".to_string(), 0xff01_1000, 11),
        ]
    );
}

#[test]
fn bus_interrupt_is_visible_while_enumerating() {
    let (mut machine, _clock) = boot();
    machine.write_u32(INTC + INTC_ENABLE, 1).unwrap();
    machine
        .write_u32(BUS + u64::from(PDEV_BUS_OP), PDEV_BUS_OP_INIT)
        .unwrap();
    assert!(machine.cpu_irq());
    assert_eq!(machine.read_u32(INTC + INTC_NUMBER).unwrap(), 1);

    enumerate(&mut machine);
    assert!(!machine.cpu_irq());
}

#[test]
fn timer_alarm_is_delivered_by_advance_to() {
    let (mut machine, clock) = boot();
    machine.write_u32(INTC + INTC_ENABLE, 10).unwrap();

    clock.set_ns(1_000);
    machine
        .write_u32(TIMER + u64::from(TIMER_ALARM_HIGH), 0)
        .unwrap();
    machine
        .write_u32(TIMER + u64::from(TIMER_ALARM_LOW), 250_000)
        .unwrap();
    assert_eq!(machine.next_deadline(), Some(250_000));
    assert_eq!(machine.advance_to(249_999).unwrap(), 0);
    assert!(!machine.cpu_irq());

    assert_eq!(machine.advance_to(250_000).unwrap(), 1);
    assert!(machine.cpu_irq());
    assert_eq!(machine.read_u32(INTC + INTC_STATUS).unwrap(), 1);
    assert_eq!(machine.read_u32(INTC + INTC_NUMBER).unwrap(), 10);

    machine
        .write_u32(TIMER + u64::from(TIMER_CLEAR_INTERRUPT), 0)
        .unwrap();
    assert!(!machine.cpu_irq());
    assert_eq!(machine.next_deadline(), None);
}

#[test]
fn poll_uses_the_machine_clock() {
    let (mut machine, clock) = boot();
    machine.write_u32(INTC + INTC_ENABLE, 10).unwrap();
    machine
        .write_u32(TIMER + u64::from(TIMER_ALARM_LOW), 500)
        .unwrap();

    assert_eq!(machine.poll().unwrap(), 0);
    clock.advance_ns(500);
    assert_eq!(machine.poll().unwrap(), 1);
    assert!(machine.cpu_irq());
}

#[test]
fn cleared_alarm_never_reaches_the_cpu() {
    let (mut machine, _clock) = boot();
    machine.write_u32(INTC + INTC_ENABLE, 10).unwrap();
    machine
        .write_u32(TIMER + u64::from(TIMER_ALARM_LOW), 500)
        .unwrap();
    machine
        .write_u32(TIMER + u64::from(TIMER_CLEAR_ALARM), 0)
        .unwrap();
    assert_eq!(machine.advance_to(u64::MAX).unwrap(), 0);
    assert!(!machine.cpu_irq());
}

#[test]
fn rtc_reports_wall_clock_time() {
    let (mut machine, _clock) = boot();
    let low = machine.read_u32(RTC).unwrap();
    let high = machine.read_u32(RTC + 4).unwrap();
    let ns = (u64::from(high) << 32) | u64::from(low);
    assert_eq!(ns, 1_600_000_000 * 1_000_000_000);
}

#[test]
fn unmapped_accesses_are_not_fatal_but_bad_registers_are() {
    let (mut machine, _clock) = boot();

    let err = machine.read_u32(0x1000_0000).unwrap_err();
    assert_eq!(err, DeviceError::Unmapped { addr: 0x1000_0000 });
    assert!(!err.is_fatal());

    let err = machine.write_u32(0x1000_0000, 1).unwrap_err();
    assert!(!err.is_fatal());

    let err = machine
        .read_u32(BUS + u64::from(PDEV_BUS_GET_NAME))
        .unwrap_err();
    assert!(err.is_fatal());

    let err = machine
        .write_u32(BUS + u64::from(PDEV_BUS_OP), 7)
        .unwrap_err();
    assert!(matches!(err, DeviceError::BadOpValue { value: 7, .. }));

    let err = machine.write_u32(INTC + INTC_ENABLE, 32).unwrap_err();
    assert!(matches!(err, DeviceError::BadLineValue { .. }));
}

struct Scratch(u32);

impl MmioHandler for Scratch {
    fn read(&mut self, _offset: u32, _size: usize) -> DeviceResult<u32> {
        Ok(self.0)
    }

    fn write(&mut self, _offset: u32, _size: usize, value: u32) -> DeviceResult<()> {
        self.0 = value;
        Ok(())
    }
}

#[test]
fn board_devices_join_the_map_and_drive_their_lines() {
    let (mut machine, _clock) = boot();
    let tty = machine
        .add_device(
            DeviceDescriptor::new("goldfish_tty", 0x1000).with_irq_count(2),
            |_| Box::new(Scratch(0)),
        )
        .unwrap();

    let desc = machine.registry().borrow().get(tty).cloned().unwrap();
    assert_eq!(desc.base, 0xff01_2000);
    assert_eq!((desc.irq, desc.irq_count), (12, 2));

    machine.write_u32(u64::from(desc.base), 0x55).unwrap();
    assert_eq!(machine.read_u32(u64::from(desc.base)).unwrap(), 0x55);

    machine.write_u32(INTC + INTC_ENABLE, 13).unwrap();
    machine.set_device_irq(tty, 1, true).unwrap();
    assert!(machine.cpu_irq());
    assert_eq!(machine.read_u32(INTC + INTC_NUMBER).unwrap(), 13);

    let err = machine.set_device_irq(tty, 2, true).unwrap_err();
    assert!(matches!(err, DeviceError::IrqIndexOutOfRange { index: 2, count: 2, .. }));

    let names: Vec<_> = enumerate(&mut machine).into_iter().map(|(n, ..)| n).collect();
    assert_eq!(names.last().map(String::as_str), Some("goldfish_tty"));
}

#[test]
fn overlapping_board_device_is_rejected() {
    let (mut machine, _clock) = boot();
    let err = machine
        .add_device(
            DeviceDescriptor::new("rogue", 0x100).with_base(0xff00_0800),
            |_| Box::new(Scratch(0)),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        MachineError::Device(DeviceError::RegionOverlap { .. })
    ));
    assert_eq!(machine.registry().borrow().len(), 4);
}

#[test]
fn config_json_round_trip() {
    let cfg = MachineConfig {
        enable_rtc: false,
        timer_base: Some(0xfe00_0000),
        ..Default::default()
    };
    let json = serde_json::to_string_pretty(&cfg).unwrap();
    assert_eq!(MachineConfig::from_json(&json).unwrap(), cfg);

    let machine = Machine::new(cfg.clone(), ManualClock::new(), ManualClock::new()).unwrap();
    assert_eq!(machine.config(), &cfg);
    assert!(machine.device_map().iter().all(|d| d.name != "goldfish_rtc"));

    let err = MachineConfig::from_json(r#"{ "bus_irq": 0 }"#).unwrap_err();
    assert!(matches!(err, MachineError::InvalidBusIrq(0)));
}
