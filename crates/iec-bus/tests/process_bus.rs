//! Drives in child processes, driven through the same contract as the
//! in-process buses.

use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};

use drive_1541::ROM_SIZE;
use format_d64::D64;
use iec_bus::{BusConfig, DeviceId, HostPins, Lines, ProcessBus, SerialBus, WorkerCommand};
use tempfile::TempDir;

fn rom(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("1541.rom");
    std::fs::write(&path, vec![0xEA; ROM_SIZE]).expect("write rom");
    path
}

fn bus() -> ProcessBus {
    let _ = env_logger::builder().is_test(true).try_init();
    ProcessBus::new(BusConfig {
        ack_timeout_ms: 5_000,
        startup_timeout_ms: 20_000,
        ..BusConfig::default()
    })
    .expect("config")
}

fn worker(device: u8, rom: PathBuf) -> WorkerCommand {
    WorkerCommand::new(
        env!("CARGO_BIN_EXE_iec-drive"),
        DeviceId::new(device).expect("valid"),
        rom,
    )
}

#[test]
fn atn_is_acknowledged_across_processes() {
    let dir = TempDir::new().expect("tempdir");
    let mut bus = bus();
    bus.attach(&worker(8, rom(&dir))).expect("attach");
    assert_eq!(bus.update(), Lines::RELEASED);

    bus.set_host_output(HostPins {
        atn: true,
        ..HostPins::default()
    });
    bus.update();
    let lines = bus.update();
    assert!(!lines.atn);
    assert!(!lines.data);
    assert!(lines.clk);
}

#[test]
fn drive_keeps_pace_in_batches() {
    let dir = TempDir::new().expect("tempdir");
    let mut bus = bus();
    let eight = bus.attach(&worker(8, rom(&dir))).expect("attach");
    for _ in 0..100 {
        bus.tick(10);
    }
    assert_eq!(bus.host_cycles(), 1_000);
    // Posted every 70 cycles, the first tick to reach 64; 20 are pending.
    assert_eq!(bus.drive_cycles(eight).expect("attached"), 980);
    bus.set_host_output(HostPins {
        clk: true,
        ..HostPins::default()
    });
    bus.update();
    assert_eq!(bus.drive_cycles(eight).expect("attached"), 1_000);
}

#[test]
fn disks_travel_both_ways() {
    let dir = TempDir::new().expect("tempdir");
    let mut bus = bus();
    let nine = bus.attach(&worker(9, rom(&dir))).expect("attach");
    let mut image = D64::formatted(b"REMOTE", *b"R9").expect("format");
    image.write_sector(1, 0, &[0x42; 256]).expect("write");

    assert!(bus.insert_disk(nine, image).expect("insert").is_none());
    bus.set_write_protect(nine, true).expect("protect");
    bus.reset_drive(nine).expect("reset");
    let ejected = bus.eject_disk(nine).expect("eject").expect("disk");
    assert_eq!(ejected.disk_id(), *b"R9");
    assert_eq!(ejected.read_sector(1, 0).expect("read"), &[0x42; 256][..]);
    assert!(bus.eject_disk(nine).expect("eject").is_none());
}

#[test]
fn detach_stops_the_process_and_releases_lines() {
    let dir = TempDir::new().expect("tempdir");
    let mut bus = bus();
    let rom = rom(&dir);
    let eight = bus.attach(&worker(8, rom.clone())).expect("attach");
    assert!(matches!(
        bus.attach(&worker(8, rom.clone())),
        Err(iec_bus::BusError::Attached(_))
    ));
    bus.attach(&worker(10, rom)).expect("attach");

    bus.set_host_output(HostPins {
        atn: true,
        ..HostPins::default()
    });
    bus.update();
    assert!(!bus.update().data);

    bus.detach(eight).expect("detach");
    assert_eq!(bus.devices(), vec![DeviceId::new(10).expect("valid")]);
    bus.set_host_output(HostPins::default());
    bus.update();
    assert_eq!(bus.update(), Lines::RELEASED);
}

#[test]
fn killed_drive_leaves_the_bus() {
    let dir = TempDir::new().expect("tempdir");
    let mut bus = bus();
    let eight = bus.attach(&worker(8, rom(&dir))).expect("attach");
    bus.set_host_output(HostPins {
        atn: true,
        ..HostPins::default()
    });
    bus.update();
    assert!(!bus.update().data);

    let pid = bus.drive_pid(eight).expect("attached");
    let status = Command::new("kill")
        .arg("-9")
        .arg(pid.to_string())
        .status()
        .expect("kill");
    assert!(status.success());

    bus.set_host_output(HostPins::default());
    let deadline = Instant::now() + Duration::from_secs(2);
    while !bus.devices().is_empty() {
        assert!(Instant::now() < deadline, "drive still attached");
        bus.tick(64);
        bus.update();
    }
    assert_eq!(bus.update(), Lines::RELEASED);
    assert_eq!(bus.stalls(), 0);

    let start = Instant::now();
    for _ in 0..8 {
        bus.tick(64);
        bus.update();
    }
    assert!(start.elapsed() < Duration::from_millis(500));
    assert!(matches!(
        bus.drive_cycles(eight),
        Err(iec_bus::BusError::NotAttached(_))
    ));
}

#[test]
fn bad_rom_is_reported_at_startup() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("short.rom");
    std::fs::write(&path, [0u8; 100]).expect("write rom");
    let mut bus = bus();
    assert!(matches!(
        bus.attach(&worker(8, path)),
        Err(iec_bus::BusError::Remote { .. })
    ));
    assert!(bus.devices().is_empty());
}
