//! Bounded waiting on conditions another process will make true.
//!
//! Waits on a shared word spin briefly, then yield, then park on the word
//! itself (a futex on Linux) until the other side stores a new value and
//! calls [`wake`]. Every wait has a deadline.

use std::hint;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const SPIN_STEPS: u32 = 6;
const YIELD_STEPS: u32 = 10;
const MAX_SLEEP: Duration = Duration::from_millis(1);

/// Spin, then yield, then sleep with doubling intervals up to 1 ms.
#[derive(Debug, Default)]
pub struct Backoff {
    step: u32,
}

impl Backoff {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.step = 0;
    }

    /// Past spinning and yielding: time to block.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.step >= YIELD_STEPS
    }

    pub fn wait(&mut self) {
        if self.step < SPIN_STEPS {
            for _ in 0..1u32 << self.step {
                hint::spin_loop();
            }
        } else if self.step < YIELD_STEPS {
            thread::yield_now();
        } else {
            let shift = (self.step - YIELD_STEPS).min(10);
            thread::sleep(Duration::from_micros(1 << shift).min(MAX_SLEEP));
        }
        self.step = self.step.saturating_add(1);
    }
}

/// Wait until `ready` holds or `timeout` passes. Returns whether it held.
pub fn wait_until(timeout: Duration, mut ready: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    let mut backoff = Backoff::new();
    loop {
        if ready() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        backoff.wait();
    }
}

/// Wait until `ready` accepts the value of `word`, parking on the word once
/// the backoff is spent. Returns whether it was accepted in time.
pub fn wait_for_word(
    word: &AtomicU32,
    timeout: Duration,
    ready: impl Fn(u32) -> bool,
) -> bool {
    let deadline = Instant::now() + timeout;
    let mut backoff = Backoff::new();
    loop {
        let current = word.load(Ordering::Acquire);
        if ready(current) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        if backoff.is_completed() {
            park(word, current, deadline - now);
        } else {
            backoff.wait();
        }
    }
}

/// Block while `word` still holds `expected`, for at most `timeout`.
/// Returns early on [`wake`], on a changed value, or spuriously.
#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
pub fn park(word: &AtomicU32, expected: u32, timeout: Duration) {
    let timeout = libc::timespec {
        tv_sec: libc::time_t::try_from(timeout.as_secs()).unwrap_or(libc::time_t::MAX),
        tv_nsec: libc::c_long::try_from(timeout.subsec_nanos()).unwrap_or(0),
    };
    // SAFETY: `word` is a live, aligned u32 for the whole call. The shared
    // (non-private) futex works across processes mapping the same file.
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAIT,
            expected,
            &raw const timeout,
            std::ptr::null::<u32>(),
            0u32,
        );
    }
}

/// Wake every waiter parked on `word`.
#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
pub fn wake(word: &AtomicU32) {
    // SAFETY: as in `park`; FUTEX_WAKE only reads the address.
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAKE,
            libc::c_int::MAX,
            std::ptr::null::<libc::timespec>(),
            std::ptr::null::<u32>(),
            0u32,
        );
    }
}

#[cfg(not(target_os = "linux"))]
pub fn park(word: &AtomicU32, expected: u32, timeout: Duration) {
    if word.load(Ordering::Acquire) == expected {
        thread::sleep(timeout.min(MAX_SLEEP));
    }
}

#[cfg(not(target_os = "linux"))]
pub fn wake(_word: &AtomicU32) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn gives_up_after_the_timeout() {
        let start = Instant::now();
        assert!(!wait_until(Duration::from_millis(5), || false));
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn returns_as_soon_as_ready() {
        let mut calls = 0;
        assert!(wait_until(Duration::from_secs(5), || {
            calls += 1;
            calls == 20
        }));
        assert_eq!(calls, 20);
    }

    #[test]
    fn parked_waiter_is_woken() {
        let word = Arc::new(AtomicU32::new(0));
        let waiter = thread::spawn({
            let word = Arc::clone(&word);
            move || {
                let start = Instant::now();
                let ok = wait_for_word(&word, Duration::from_secs(10), |value| value == 1);
                (ok, start.elapsed())
            }
        });
        // Long enough for the waiter to spend its backoff and park.
        thread::sleep(Duration::from_millis(50));
        word.store(1, Ordering::Release);
        wake(&word);
        let (ok, elapsed) = waiter.join().expect("waiter");
        assert!(ok);
        assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");
    }

    #[test]
    fn word_wait_times_out() {
        let word = AtomicU32::new(3);
        let start = Instant::now();
        assert!(!wait_for_word(&word, Duration::from_millis(20), |value| value != 3));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
