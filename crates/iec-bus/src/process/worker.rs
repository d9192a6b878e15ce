//! The drive side of a process bus: one drive serving batches from its
//! segment, with disk commands arriving on stdin.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::Duration;

use clap::Parser;
use drive_1541::{Drive1541, DriveConfig, DriveRom};
use emu_core::Processor;

use super::protocol::{self, Command, Reply};
use super::segment::{Batch, Segment};
use crate::{DriveOutput, Result};

/// Longest park between looks at the command queue.
const IDLE_WAIT: Duration = Duration::from_millis(2);

/// Run one 1541 against a serial bus segment shared with a host process.
#[derive(Debug, Parser)]
#[command(name = "iec-drive", version)]
pub struct WorkerArgs {
    /// Segment file created by the host.
    #[arg(long)]
    pub segment: PathBuf,

    /// Serial bus device number (8-11).
    #[arg(long, default_value_t = 8)]
    pub device: u8,

    /// 16K drive ROM, or its $C000 half when --rom-high is given.
    #[arg(long)]
    pub rom: PathBuf,

    /// $E000 half of a split ROM.
    #[arg(long)]
    pub rom_high: Option<PathBuf>,

    #[arg(long)]
    pub write_protect: bool,

    /// Largest burst run between pin updates.
    #[arg(long, default_value_t = 16)]
    pub slice_cycles: u32,
}

pub struct DriveWorker<P: Processor> {
    drive: Drive1541<P>,
    segment: Segment,
    slice: u32,
    /// Sequence of the last batch served.
    last: u32,
}

impl<P: Processor> DriveWorker<P> {
    #[must_use]
    pub fn new(drive: Drive1541<P>, segment: Segment, slice: u32) -> Self {
        Self {
            drive,
            segment,
            slice: slice.max(1),
            last: 0,
        }
    }

    #[must_use]
    pub fn drive(&self) -> &Drive1541<P> {
        &self.drive
    }

    fn publish(&self) {
        self.segment
            .publish(DriveOutput::of(&self.drive), self.drive.cycles());
    }

    /// Serve the newest batch, if one was posted. Returns whether it did.
    pub fn serve(&mut self) -> bool {
        let Some(batch) = self.segment.take(self.last) else {
            return false;
        };
        self.run_batch(batch);
        true
    }

    fn run_batch(&mut self, batch: Batch) {
        let mut remaining = batch.ticks;
        while remaining > 0 {
            let slice = remaining.min(self.slice);
            self.drive.tick(slice);
            remaining -= slice;
            self.publish();
        }
        batch.lines.apply(&mut self.drive);
        self.publish();
        self.last = batch.sequence;
        self.segment.complete(batch.sequence);
    }

    /// Carry out a command. `None` means shut down.
    pub fn handle(&mut self, command: Command) -> Option<Reply> {
        let reply = match command {
            Command::InsertDisk { image } => match protocol::decode_image(&image) {
                Ok(image) => Reply::Disk {
                    image: self
                        .drive
                        .insert_disk(image)
                        .as_ref()
                        .map(protocol::encode_image),
                },
                Err(err) => Reply::Error {
                    message: err.to_string(),
                },
            },
            Command::EjectDisk => Reply::Disk {
                image: self.drive.eject_disk().as_ref().map(protocol::encode_image),
            },
            Command::SetWriteProtect { protect } => {
                self.drive.set_write_protect(protect);
                Reply::Ok
            }
            Command::Reset => {
                self.drive.reset();
                Reply::Ok
            }
            Command::Shutdown => return None,
        };
        self.publish();
        Some(reply)
    }

    /// Serve batches and commands until told to stop.
    pub fn run(&mut self, commands: &Receiver<Command>, replies: &mut impl Write) -> Result<()> {
        self.publish();
        self.segment.set_ready();
        log::info!("drive {} ready", self.drive.device());

        loop {
            match commands.try_recv() {
                Ok(command) => {
                    let Some(reply) = self.handle(command) else {
                        break;
                    };
                    protocol::send(replies, &reply)?;
                    continue;
                }
                Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }
            if self.segment.shutdown_requested() {
                break;
            }
            if !self.serve() {
                self.segment.wait_request(self.last, IDLE_WAIT);
            }
        }
        log::info!(
            "drive {} stopping after {} cycles, host at {}",
            self.drive.device(),
            self.drive.cycles(),
            self.segment.host_cycles()
        );
        Ok(())
    }
}

/// Entry point for a drive process binary. `new_cpu` supplies the 6502.
pub fn worker_main<P: Processor>(new_cpu: impl FnOnce() -> P) -> ExitCode {
    env_logger::init();
    let args = WorkerArgs::parse();
    match run_worker(&args, new_cpu) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("drive {}: {err}", args.device);
            ExitCode::FAILURE
        }
    }
}

fn run_worker<P: Processor>(args: &WorkerArgs, new_cpu: impl FnOnce() -> P) -> Result<()> {
    let rom = match &args.rom_high {
        Some(high) => DriveRom::load_halves(&args.rom, high)?,
        None => DriveRom::load(&args.rom)?,
    };
    let config = DriveConfig {
        device: args.device,
        write_protect: args.write_protect,
        ..DriveConfig::default()
    };
    let drive = Drive1541::new(new_cpu(), rom, config)?;
    let segment = Segment::open(&args.segment)?;

    let (sender, receiver) = mpsc::channel();
    thread::Builder::new()
        .name("commands".into())
        .spawn(move || read_commands(io::stdin().lock(), &sender))?;

    DriveWorker::new(drive, segment, args.slice_cycles).run(&receiver, &mut io::stdout().lock())
}

/// Forward commands from `input`. End of input counts as shutdown.
fn read_commands(input: impl BufRead, commands: &Sender<Command>) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                log::error!("reading commands: {err}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(command) => {
                if commands.send(command).is_err() {
                    return;
                }
            }
            Err(err) => log::warn!("ignoring malformed command {line:?}: {err}"),
        }
    }
    let _ = commands.send(Command::Shutdown);
}
