//! Each drive in its own process.
//!
//! The host and a drive process share a small mapped segment (see
//! [`Segment`]). The host accumulates cycles and posts them as a batch
//! together with the lines to apply afterwards, then waits for the drive to
//! acknowledge. A batch is posted as soon as the resolved lines change, so
//! no edge is merged into a later one, or once `batch_cycles` have built
//! up. Disk commands travel as JSON lines over the drive's stdin and stdout.

mod protocol;
mod segment;
mod wait;
mod worker;

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use format_d64::D64;
use tempfile::NamedTempFile;

pub use protocol::{Command, Reply};
pub use segment::{Batch, SEGMENT_SIZE, Segment};
pub use wait::{Backoff, wait_until};
pub use worker::{DriveWorker, WorkerArgs, worker_main};

use crate::{BusConfig, BusError, DeviceId, HostPins, Lines, Result, SerialBus, resolve};

/// How often a drive that has not acknowledged is checked for having exited.
const EXIT_POLL: Duration = Duration::from_millis(10);

/// How to start one drive process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    /// The drive binary, typically `iec-drive`.
    pub program: PathBuf,
    pub device: DeviceId,
    pub rom: PathBuf,
    pub rom_high: Option<PathBuf>,
    pub write_protect: bool,
}

impl WorkerCommand {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, device: DeviceId, rom: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            device,
            rom: rom.into(),
            rom_high: None,
            write_protect: false,
        }
    }
}

struct RemoteDrive {
    child: Child,
    stdin: ChildStdin,
    replies: Receiver<Reply>,
    segment: Segment,
    // Unlinked once both sides have dropped their mappings.
    _backing: NamedTempFile,
}

enum Ack {
    Done,
    Late,
    Exited(ExitStatus),
}

impl RemoteDrive {
    fn await_batch(&mut self, sequence: u32, timeout: Duration) -> Ack {
        let deadline = Instant::now() + timeout;
        loop {
            let slice = deadline.saturating_duration_since(Instant::now()).min(EXIT_POLL);
            if self.segment.wait_done(sequence, slice) {
                return Ack::Done;
            }
            if let Ok(Some(status)) = self.child.try_wait() {
                return Ack::Exited(status);
            }
            if Instant::now() >= deadline {
                return Ack::Late;
            }
        }
    }
}

/// Drives in separate processes, kept within one batch of the host.
pub struct ProcessBus {
    config: BusConfig,
    drives: BTreeMap<DeviceId, RemoteDrive>,
    host: HostPins,
    lines: Lines,
    /// Lines the drives have been given.
    delivered: Lines,
    /// Host cycles not yet posted.
    pending: u32,
    host_cycles: u64,
    /// Times a drive missed the acknowledgement timeout.
    stalls: u64,
}

impl ProcessBus {
    pub fn new(config: BusConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            drives: BTreeMap::new(),
            host: HostPins::default(),
            lines: Lines::RELEASED,
            delivered: Lines::RELEASED,
            pending: 0,
            host_cycles: 0,
            stalls: 0,
        })
    }

    /// Start a drive process and wait until it serves its segment.
    pub fn attach(&mut self, worker: &WorkerCommand) -> Result<DeviceId> {
        let device = worker.device;
        if self.drives.contains_key(&device) {
            return Err(BusError::Attached(device));
        }
        self.flush();

        let backing = tempfile::Builder::new()
            .prefix(&format!("iec-drive-{device}-"))
            .tempfile()?;
        let segment = Segment::create(backing.as_file())?;
        // The drive starts from the current lines.
        let first = segment.post(0, self.delivered, self.host_cycles);

        let mut command = std::process::Command::new(&worker.program);
        command
            .arg("--segment")
            .arg(backing.path())
            .arg("--device")
            .arg(device.to_string())
            .arg("--rom")
            .arg(&worker.rom)
            .arg("--slice-cycles")
            .arg(self.config.slice_cycles.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(high) = &worker.rom_high {
            command.arg("--rom-high").arg(high);
        }
        if worker.write_protect {
            command.arg("--write-protect");
        }
        let mut child = command.spawn()?;
        log::debug!("drive {device} started as process {}", child.id());

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            kill(device, &mut child);
            return Err(BusError::Remote {
                device,
                message: "process has no command pipes".into(),
            });
        };
        let (sender, replies) = mpsc::channel();
        if let Err(err) = thread::Builder::new()
            .name(format!("drive-{device}-replies"))
            .spawn(move || read_replies(device, stdout, &sender))
        {
            kill(device, &mut child);
            return Err(err.into());
        }

        await_startup(&self.config, device, &mut child, &segment, first)?;

        self.drives.insert(
            device,
            RemoteDrive {
                child,
                stdin,
                replies,
                segment,
                _backing: backing,
            },
        );
        log::info!("drive {device} attached in its own process");
        Ok(device)
    }

    /// Host cycles elapsed.
    #[must_use]
    pub fn host_cycles(&self) -> u64 {
        self.host_cycles
    }

    /// Times a drive missed the acknowledgement timeout.
    #[must_use]
    pub fn stalls(&self) -> u64 {
        self.stalls
    }

    /// Operating system id of a drive's process.
    pub fn drive_pid(&self, device: DeviceId) -> Result<u32> {
        Ok(self.remote(device)?.child.id())
    }

    /// Cycles a drive has run, as last published.
    pub fn drive_cycles(&self, device: DeviceId) -> Result<u64> {
        Ok(self.remote(device)?.segment.drive_cycles())
    }

    pub fn set_write_protect(&mut self, device: DeviceId, protect: bool) -> Result<()> {
        self.request(device, &Command::SetWriteProtect { protect })
            .map(drop)
    }

    /// Hardware reset of one drive. The disk stays in.
    pub fn reset_drive(&mut self, device: DeviceId) -> Result<()> {
        self.request(device, &Command::Reset).map(drop)
    }

    fn remote(&self, device: DeviceId) -> Result<&RemoteDrive> {
        self.drives.get(&device).ok_or(BusError::NotAttached(device))
    }

    fn resolve(&self) -> Lines {
        resolve(
            self.host,
            self.drives
                .values()
                .map(|remote| remote.segment.drive_output()),
        )
    }

    /// Post everything pending with the current lines and wait for every
    /// drive. A drive that misses the acknowledgement timeout loses the
    /// ticks it has not started. A drive whose process has exited is
    /// removed from the bus; returns whether any was.
    fn flush(&mut self) -> bool {
        let posted: Vec<_> = self
            .drives
            .iter()
            .map(|(&device, remote)| {
                (
                    device,
                    remote
                        .segment
                        .post(self.pending, self.lines, self.host_cycles),
                )
            })
            .collect();
        let timeout = self.config.ack_timeout();
        let mut exited = Vec::new();
        for (device, sequence) in posted {
            let Some(remote) = self.drives.get_mut(&device) else {
                continue;
            };
            match remote.await_batch(sequence, timeout) {
                Ack::Done => {}
                Ack::Late => {
                    self.stalls += 1;
                    let dropped = remote.segment.drop_backlog();
                    log::warn!(
                        "drive {device} did not acknowledge within {} ms, dropped {dropped} cycles",
                        timeout.as_millis()
                    );
                }
                Ack::Exited(status) => {
                    log::error!("drive {device} process exited ({status}), detaching it");
                    exited.push(device);
                }
            }
        }
        self.pending = 0;
        self.delivered = self.lines;
        for device in &exited {
            self.drives.remove(device);
        }
        !exited.is_empty()
    }

    /// Send a command after bringing the drive up to date, and wait for
    /// its reply.
    fn request(&mut self, device: DeviceId, command: &Command) -> Result<Reply> {
        if !self.drives.contains_key(&device) {
            return Err(BusError::NotAttached(device));
        }
        self.flush();
        let timeout = self.config.command_timeout();
        let remote = self
            .drives
            .get_mut(&device)
            .ok_or(BusError::NotAttached(device))?;
        protocol::send(&mut remote.stdin, command)?;
        match remote.replies.recv_timeout(timeout) {
            Ok(Reply::Error { message }) => Err(BusError::Remote { device, message }),
            Ok(reply) => Ok(reply),
            Err(RecvTimeoutError::Timeout) => Err(BusError::Timeout {
                device,
                what: "answer a command",
                timeout_ms: self.config.command_timeout_ms,
            }),
            Err(RecvTimeoutError::Disconnected) => {
                if let Ok(Some(status)) = remote.child.try_wait() {
                    log::error!("drive {device} process exited ({status}), detaching it");
                    self.drives.remove(&device);
                }
                Err(BusError::Remote {
                    device,
                    message: "process closed its reply stream".into(),
                })
            }
        }
    }

    fn disk_request(&mut self, device: DeviceId, command: &Command) -> Result<Option<D64>> {
        match self.request(device, command)? {
            Reply::Disk { image } => image.as_deref().map(protocol::decode_image).transpose(),
            other => Err(BusError::Remote {
                device,
                message: format!("unexpected reply {other:?}"),
            }),
        }
    }

    fn shut_down(&mut self, device: DeviceId) -> Option<()> {
        let mut remote = self.drives.remove(&device)?;
        if let Err(err) = protocol::send(&mut remote.stdin, &Command::Shutdown) {
            log::debug!("drive {device} shutdown command: {err}");
        }
        remote.segment.request_shutdown();
        let mut exited = false;
        wait_until(self.config.command_timeout(), || {
            exited = matches!(remote.child.try_wait(), Ok(Some(_)));
            exited
        });
        if !exited {
            log::warn!("drive {device} did not exit, killing it");
            kill(device, &mut remote.child);
        }
        Some(())
    }
}

/// Wait for a new drive process to report ready and run the batch posted
/// as `first`. The process is killed on a timeout.
fn await_startup(
    config: &BusConfig,
    device: DeviceId,
    child: &mut Child,
    segment: &Segment,
    first: u32,
) -> Result<()> {
    let mut exited = None;
    let ready = wait_until(config.startup_timeout(), || {
        if let Ok(Some(status)) = child.try_wait() {
            exited = Some(status);
        }
        exited.is_some() || segment.is_ready()
    });
    if let Some(status) = exited {
        return Err(BusError::Remote {
            device,
            message: format!("exited during startup ({status})"),
        });
    }
    if !ready {
        kill(device, child);
        return Err(BusError::Timeout {
            device,
            what: "report ready",
            timeout_ms: config.startup_timeout_ms,
        });
    }
    if !segment.wait_done(first, config.ack_timeout()) {
        kill(device, child);
        return Err(BusError::Timeout {
            device,
            what: "take its first batch",
            timeout_ms: config.ack_timeout_ms,
        });
    }
    Ok(())
}

fn kill(device: DeviceId, child: &mut Child) {
    if let Err(err) = child.kill() {
        log::debug!("drive {device} kill: {err}");
    }
    if let Err(err) = child.wait() {
        log::error!("drive {device} wait: {err}");
    }
}

fn read_replies(device: DeviceId, stdout: ChildStdout, replies: &Sender<Reply>) {
    for line in BufReader::new(stdout).lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                log::error!("drive {device} replies: {err}");
                return;
            }
        };
        match serde_json::from_str(&line) {
            Ok(reply) => {
                if replies.send(reply).is_err() {
                    return;
                }
            }
            Err(err) => log::warn!("drive {device} sent malformed reply {line:?}: {err}"),
        }
    }
}

impl SerialBus for ProcessBus {
    fn set_host_output(&mut self, pins: HostPins) {
        self.host = pins;
    }

    /// Resolves from the drives' last published pins. A change is posted
    /// immediately, so drive reactions show up at the following update.
    fn update(&mut self) -> Lines {
        loop {
            self.lines = self.resolve();
            // A drive that exited no longer holds any line.
            if self.lines == self.delivered || !self.flush() {
                return self.lines;
            }
        }
    }

    fn host_input(&self) -> Lines {
        self.lines
    }

    fn tick(&mut self, cycles: u32) {
        self.host_cycles += u64::from(cycles);
        self.pending = self.pending.saturating_add(cycles);
        if self.pending >= self.config.batch_cycles && self.flush() {
            self.lines = self.resolve();
        }
    }

    fn insert_disk(&mut self, device: DeviceId, image: D64) -> Result<Option<D64>> {
        let image = protocol::encode_image(&image);
        self.disk_request(device, &Command::InsertDisk { image })
    }

    fn eject_disk(&mut self, device: DeviceId) -> Result<Option<D64>> {
        self.disk_request(device, &Command::EjectDisk)
    }

    fn detach(&mut self, device: DeviceId) -> Result<()> {
        if !self.drives.contains_key(&device) {
            return Err(BusError::NotAttached(device));
        }
        self.flush();
        self.shut_down(device);
        log::info!("drive {device} detached");
        Ok(())
    }

    fn devices(&self) -> Vec<DeviceId> {
        self.drives.keys().copied().collect()
    }
}

impl Drop for ProcessBus {
    fn drop(&mut self) {
        for device in self.devices() {
            self.shut_down(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_fails_to_attach() {
        let mut bus = ProcessBus::new(BusConfig::default()).expect("config");
        let worker = WorkerCommand::new("/nonexistent/iec-drive", DeviceId::FIRST, "/nonexistent/rom");
        assert!(matches!(bus.attach(&worker), Err(BusError::Io(_))));
        assert!(bus.devices().is_empty());
    }

    fn sleeper() -> Child {
        std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .expect("spawn sleep")
    }

    #[test]
    fn silent_drive_times_out_on_the_startup_limit() {
        let config = BusConfig {
            startup_timeout_ms: 30,
            ack_timeout_ms: 10,
            ..BusConfig::default()
        };
        let file = NamedTempFile::new().expect("tempfile");
        let segment = Segment::create(file.as_file()).expect("create");
        let first = segment.post(0, Lines::RELEASED, 0);
        let mut child = sleeper();
        assert!(matches!(
            await_startup(&config, DeviceId::FIRST, &mut child, &segment, first),
            Err(BusError::Timeout {
                what: "report ready",
                timeout_ms: 30,
                ..
            })
        ));
    }

    #[test]
    fn unserved_first_batch_times_out_on_the_ack_limit() {
        let config = BusConfig {
            startup_timeout_ms: 5_000,
            ack_timeout_ms: 10,
            ..BusConfig::default()
        };
        let file = NamedTempFile::new().expect("tempfile");
        let segment = Segment::create(file.as_file()).expect("create");
        let first = segment.post(0, Lines::RELEASED, 0);
        // Ready, but never completes the batch.
        Segment::open(file.path()).expect("open").set_ready();
        let mut child = sleeper();
        let start = std::time::Instant::now();
        assert!(matches!(
            await_startup(&config, DeviceId::FIRST, &mut child, &segment, first),
            Err(BusError::Timeout {
                what: "take its first batch",
                timeout_ms: 10,
                ..
            })
        ));
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(child.try_wait().expect("status").is_some());
    }

    #[test]
    fn empty_bus_resolves_host_pins() {
        let mut bus = ProcessBus::new(BusConfig::default()).expect("config");
        bus.set_host_output(HostPins {
            clk: true,
            ..HostPins::default()
        });
        let lines = bus.update();
        assert!(!lines.clk);
        assert!(lines.atn && lines.data);
        bus.tick(1_000);
        assert_eq!(bus.host_cycles(), 1_000);
        assert_eq!(bus.stalls(), 0);
        let nine = DeviceId::new(9).expect("valid");
        assert!(matches!(bus.eject_disk(nine), Err(BusError::NotAttached(_))));
        assert!(matches!(bus.drive_cycles(nine), Err(BusError::NotAttached(_))));
    }
}
