//! Peripheral capability contracts, and soft implementations of them
//! for running the modem off-device.
//!
//! The core never touches hardware directly. The ADC driver owns the
//! [`Demodulator`](crate::Demodulator) and feeds it samples; the DAC
//! driver owns the [`Modulator`](crate::Modulator) and pulls samples
//! from it, arming and disarming delivery through [`DacChannel`]. The
//! foreground facade needs a millisecond clock for its read timeout
//! and a relax hint for its busy waits.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Control over DAC sample delivery.
///
/// `irq_start` makes the driver begin calling
/// [`Modulator::dac_isr`](crate::Modulator::dac_isr) once per output
/// sample; `irq_stop` makes it cease. The modulator stops its own
/// channel when it runs out of things to say.
pub trait DacChannel {
    fn irq_start(&self);
    fn irq_stop(&self);
}

/// Monotonic millisecond clock plus a CPU relax hint for busy waits.
pub trait Clock {
    /// Milliseconds since some fixed origin.
    fn now_ms(&self) -> u64;

    /// Called between polls of a busy wait.
    fn relax(&self);
}

/// Optional scope trigger marking interrupt entry and exit. Purely
/// observational.
pub trait Strobe: Send {
    fn on(&mut self);
    fn off(&mut self);
}

/// No strobe attached.
impl Strobe for () {
    fn on(&mut self) {}
    fn off(&mut self) {}
}

/// Wall clock backed by [`std::time::Instant`].
pub struct WallClock {
    start: Instant,
}

impl WallClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for WallClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn relax(&self) {
        std::thread::yield_now();
    }
}

/// Software DAC channel: tracks armed state and counts transitions.
/// Stands in for the real peripheral when driving the modem from a
/// file or a test.
#[derive(Clone, Default)]
pub struct SoftDac {
    inner: Arc<SoftDacInner>,
}

#[derive(Default)]
struct SoftDacInner {
    enabled: AtomicBool,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl SoftDac {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while sample delivery is armed.
    pub fn enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    /// Number of `irq_start` calls so far.
    pub fn starts(&self) -> usize {
        self.inner.starts.load(Ordering::Acquire)
    }

    /// Number of `irq_stop` calls so far.
    pub fn stops(&self) -> usize {
        self.inner.stops.load(Ordering::Acquire)
    }
}

impl DacChannel for SoftDac {
    fn irq_start(&self) {
        self.inner.starts.fetch_add(1, Ordering::AcqRel);
        self.inner.enabled.store(true, Ordering::Release);
    }

    fn irq_stop(&self) {
        self.inner.stops.fetch_add(1, Ordering::AcqRel);
        self.inner.enabled.store(false, Ordering::Release);
    }
}
