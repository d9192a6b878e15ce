//! Each drive on its own thread, gated by the host's cycle count.
//!
//! The host publishes its cycle count under a mutex and wakes the drive
//! threads through a condition variable. A drive runs in slices until it
//! has consumed exactly the cycles the host has authorized, reporting each
//! slice back through a second condition variable. The host waits for
//! every drive after each `tick`, up to the acknowledgement timeout, then
//! writes off whatever a stalled drive has not run. A drive whose thread
//! dies is detached at the next `tick` or `update`.

use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use drive_1541::Drive1541;
use emu_core::Processor;
use format_d64::D64;

use crate::{
    BusConfig, BusError, DeviceId, DriveOutput, HostPins, Lines, Result, SerialBus, resolve,
};

/// How long an idle drive thread sleeps before rechecking its stop flag.
const IDLE_WAIT: Duration = Duration::from_millis(50);

#[derive(Debug, Default)]
struct DriveClock {
    /// Host cycles this drive has accounted for.
    done: u64,
    stop: bool,
}

#[derive(Debug, Default)]
struct Clock {
    host_cycles: u64,
    drives: BTreeMap<DeviceId, DriveClock>,
}

#[derive(Debug, Default)]
struct Shared {
    clock: Mutex<Clock>,
    /// The host advanced, or a drive was told to stop.
    advanced: Condvar,
    /// A drive finished a slice.
    progressed: Condvar,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Attached<P: Processor> {
    drive: Arc<Mutex<Drive1541<P>>>,
    thread: Option<JoinHandle<()>>,
}

/// Drives on worker threads, kept within one `tick` of the host.
pub struct ThreadedBus<P: Processor + Send + 'static> {
    config: BusConfig,
    shared: Arc<Shared>,
    drives: BTreeMap<DeviceId, Attached<P>>,
    host: HostPins,
    lines: Lines,
    /// Times a drive's backlog was written off.
    stalls: u64,
}

impl<P: Processor + Send + 'static> ThreadedBus<P> {
    pub fn new(config: BusConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            shared: Arc::default(),
            drives: BTreeMap::new(),
            host: HostPins::default(),
            lines: Lines::RELEASED,
            stalls: 0,
        })
    }

    /// Move a drive onto its own thread.
    pub fn attach(&mut self, mut drive: Drive1541<P>) -> Result<DeviceId> {
        let device = DeviceId::new(drive.device())?;
        if self.drives.contains_key(&device) {
            return Err(BusError::Attached(device));
        }
        self.lines.apply(&mut drive);
        let drive = Arc::new(Mutex::new(drive));

        {
            let mut clock = lock(&self.shared.clock);
            let done = clock.host_cycles;
            clock.drives.insert(device, DriveClock { done, stop: false });
        }

        let thread = thread::Builder::new()
            .name(format!("drive-{device}"))
            .spawn({
                let drive = Arc::clone(&drive);
                let shared = Arc::clone(&self.shared);
                let slice = self.config.slice_cycles;
                move || run_drive(device, &*drive, &*shared, slice)
            });
        let thread = match thread {
            Ok(thread) => thread,
            Err(err) => {
                lock(&self.shared.clock).drives.remove(&device);
                return Err(err.into());
            }
        };

        self.drives.insert(
            device,
            Attached {
                drive,
                thread: Some(thread),
            },
        );
        log::debug!("drive {device} attached on its own thread");
        Ok(device)
    }

    /// Run `f` with a drive locked.
    pub fn with_drive<R>(
        &self,
        device: DeviceId,
        f: impl FnOnce(&mut Drive1541<P>) -> R,
    ) -> Result<R> {
        let attached = self
            .drives
            .get(&device)
            .ok_or(BusError::NotAttached(device))?;
        Ok(f(&mut *lock(&attached.drive)))
    }

    /// Host cycles elapsed.
    #[must_use]
    pub fn host_cycles(&self) -> u64 {
        lock(&self.shared.clock).host_cycles
    }

    /// Times a drive missed the acknowledgement timeout.
    #[must_use]
    pub fn stalls(&self) -> u64 {
        self.stalls
    }

    fn stop(&mut self, device: DeviceId) -> Option<Attached<P>> {
        let mut attached = self.drives.remove(&device)?;
        {
            let mut clock = lock(&self.shared.clock);
            if let Some(state) = clock.drives.get_mut(&device) {
                state.stop = true;
            }
        }
        self.shared.advanced.notify_all();
        if let Some(thread) = attached.thread.take()
            && thread.join().is_err()
        {
            log::error!("drive {device} thread panicked");
        }
        lock(&self.shared.clock).drives.remove(&device);
        Some(attached)
    }

    /// Detach drives whose thread has exited on its own.
    fn reap(&mut self) {
        let exited: Vec<_> = {
            let clock = lock(&self.shared.clock);
            self.drives
                .keys()
                .copied()
                .filter(|device| clock.drives.get(device).is_none_or(|state| state.stop))
                .collect()
        };
        for device in exited {
            log::error!("drive {device} thread exited, detaching it");
            self.stop(device);
        }
    }
}

/// Marks a drive stopped when its thread leaves, unwinding included.
struct ExitGuard<'a> {
    device: DeviceId,
    shared: &'a Shared,
}

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        if let Some(state) = lock(&self.shared.clock).drives.get_mut(&self.device) {
            state.stop = true;
        }
        self.shared.progressed.notify_all();
    }
}

/// Drive thread body: wait for authorized cycles, run them, report.
fn run_drive<P: Processor>(
    device: DeviceId,
    drive: &Mutex<Drive1541<P>>,
    shared: &Shared,
    slice: u32,
) {
    let _exit = ExitGuard { device, shared };
    loop {
        let (start, budget) = {
            let mut clock = lock(&shared.clock);
            loop {
                let host = clock.host_cycles;
                let Some(state) = clock.drives.get(&device) else {
                    return;
                };
                if state.stop {
                    return;
                }
                if state.done < host {
                    let budget = (host - state.done).min(u64::from(slice)) as u32;
                    break (state.done, budget);
                }
                clock = shared
                    .advanced
                    .wait_timeout(clock, IDLE_WAIT)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
            }
        };

        lock(drive).tick(budget);

        {
            let mut clock = lock(&shared.clock);
            // The host may have written off our backlog meanwhile.
            if let Some(state) = clock.drives.get_mut(&device)
                && state.done == start
            {
                state.done = start + u64::from(budget);
            }
        }
        shared.progressed.notify_all();
    }
}

impl<P: Processor + Send + 'static> SerialBus for ThreadedBus<P> {
    fn set_host_output(&mut self, pins: HostPins) {
        self.host = pins;
    }

    /// Reads every drive's live pins under its lock, so a change made by
    /// the last instruction of a slice is never missed.
    fn update(&mut self) -> Lines {
        self.reap();
        let outputs: Vec<_> = self
            .drives
            .values()
            .map(|attached| DriveOutput::of(&*lock(&attached.drive)))
            .collect();
        let lines = resolve(self.host, outputs);
        for attached in self.drives.values() {
            lines.apply(&mut *lock(&attached.drive));
        }
        self.lines = lines;
        lines
    }

    fn host_input(&self) -> Lines {
        self.lines
    }

    fn tick(&mut self, cycles: u32) {
        let timeout = self.config.ack_timeout();
        let mut clock = lock(&self.shared.clock);
        clock.host_cycles += u64::from(cycles);
        let target = clock.host_cycles;
        self.shared.advanced.notify_all();

        let deadline = Instant::now() + timeout;
        while clock
            .drives
            .values()
            .any(|state| !state.stop && state.done < target)
        {
            let now = Instant::now();
            if now >= deadline {
                for (device, state) in &mut clock.drives {
                    if !state.stop && state.done < target {
                        log::warn!(
                            "drive {device} is {} cycles behind after {} ms, dropping backlog",
                            target - state.done,
                            timeout.as_millis()
                        );
                        state.done = target;
                        self.stalls += 1;
                    }
                }
                break;
            }
            clock = self
                .shared
                .progressed
                .wait_timeout(clock, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        drop(clock);
        self.reap();
    }

    fn insert_disk(&mut self, device: DeviceId, image: D64) -> Result<Option<D64>> {
        self.with_drive(device, |drive| drive.insert_disk(image))
    }

    fn eject_disk(&mut self, device: DeviceId) -> Result<Option<D64>> {
        self.with_drive(device, Drive1541::eject_disk)
    }

    fn detach(&mut self, device: DeviceId) -> Result<()> {
        self.stop(device).ok_or(BusError::NotAttached(device))?;
        log::debug!("drive {device} detached");
        Ok(())
    }

    fn devices(&self) -> Vec<DeviceId> {
        self.drives.keys().copied().collect()
    }
}

impl<P: Processor + Send + 'static> Drop for ThreadedBus<P> {
    fn drop(&mut self) {
        for device in self.devices() {
            self.stop(device);
        }
    }
}
