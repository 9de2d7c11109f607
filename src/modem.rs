//! Modem construction and the foreground byte stream facade.
//!
//! [`Modem::new`] builds one modem instance and splits it into its
//! three owners: the facade itself for the foreground, plus the
//! interrupt halves to hand to the ADC and DAC drivers. The facade is
//! the only part that may block, and it only ever busy-waits with the
//! clock's relax hint between polls.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use log::{debug, info};

use crate::demod::Demodulator;
use crate::fifo::{new_fifo, FifoReader, FifoWriter};
use crate::filter::{Butterworth, Lowpass};
use crate::hw::{Clock, DacChannel};
use crate::modulator::{Modulator, TxShared, TxTiming, MARK_FREQ, SPACE_FREQ};
use crate::sine::SIN_LEN;
use crate::{Error, Result, BIT_RATE};

/// Status bit: the receive queue was full and a frame was dropped.
pub const RXFIFO_OVERRUN: u8 = 1 << 0;

/// What [`Modem::read`] does while the receive queue is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxTimeout {
    /// Return whatever is available, possibly nothing.
    NonBlocking,
    /// Wait indefinitely.
    Forever,
    /// Wait up to this many milliseconds for each byte.
    Ms(u64),
}

/// Modem configuration. The defaults suit a VHF voice radio keyed a
/// moment before data starts.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// DAC conversion rate in Hz. Must be a multiple of 1200.
    pub dac_sample_rate: u32,
    /// Flags sent before the payload, in milliseconds of air time.
    pub preamble_ms: u32,
    /// Flags sent after the payload, in milliseconds of air time.
    pub trailer_ms: u32,
    /// Read blocking behaviour.
    pub rx_timeout: RxTimeout,
    /// Receive queue capacity in bytes. Should fit a whole frame.
    pub rx_capacity: usize,
    /// Transmit queue capacity in bytes.
    pub tx_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dac_sample_rate: 9600,
            preamble_ms: 300,
            trailer_ms: 50,
            rx_timeout: RxTimeout::NonBlocking,
            rx_capacity: 512,
            tx_capacity: 512,
        }
    }
}

fn div_round(n: u64, d: u64) -> u64 {
    (n + d / 2) / d
}

// Milliseconds of flags to a whole number of flag bytes.
fn flags_for_ms(ms: u32) -> u32 {
    ((ms as u64 * BIT_RATE as u64).div_ceil(8000)) as u32
}

impl Config {
    // Phase increments for the two tones, in table steps per DAC
    // sample.
    fn tone_incs(&self) -> Result<(u16, u16)> {
        if self.dac_sample_rate == 0 || self.dac_sample_rate % BIT_RATE != 0 {
            return Err(Error::msg(format!(
                "DAC sample rate {} is not a multiple of {BIT_RATE}",
                self.dac_sample_rate
            )));
        }
        let rate = self.dac_sample_rate as u64;
        let mark = div_round(SIN_LEN as u64 * MARK_FREQ as u64, rate);
        let space = div_round(SIN_LEN as u64 * SPACE_FREQ as u64, rate);
        if mark == 0 || mark >= SIN_LEN as u64 || space >= SIN_LEN as u64 || mark == space {
            return Err(Error::msg(format!(
                "DAC sample rate {} cannot synthesise both tones (mark inc {mark}, space inc {space})",
                self.dac_sample_rate
            )));
        }
        Ok((mark as u16, space as u16))
    }

    /// Check the configuration without building a modem.
    pub fn validate(&self) -> Result<()> {
        self.tone_incs()?;
        if self.rx_capacity == 0 || self.tx_capacity == 0 {
            return Err(Error::msg("queue capacities must be nonzero"));
        }
        Ok(())
    }
}

/// Foreground side of a modem instance.
pub struct Modem<D: DacChannel + Clone, C: Clock> {
    rx_fifo: FifoReader,
    tx_fifo: FifoWriter,
    status: Arc<AtomicU8>,
    tx: Arc<TxShared>,
    dac: D,
    clock: C,
    rx_timeout: RxTimeout,
    trailer_flags: u32,
}

impl<D: DacChannel + Clone, C: Clock> Modem<D, C> {
    /// Build a modem with the default Butterworth receive filter.
    ///
    /// Returns the foreground facade plus the two interrupt halves:
    /// give the [`Demodulator`] to whatever delivers ADC samples and
    /// the [`Modulator`] to whatever consumes DAC samples.
    #[allow(clippy::type_complexity)]
    pub fn new(
        config: Config,
        dac: D,
        clock: C,
    ) -> Result<(Self, Demodulator<Butterworth>, Modulator<D>)> {
        Self::with_filter::<Butterworth>(config, dac, clock)
    }

    /// Build a modem with an explicit receive filter profile.
    #[allow(clippy::type_complexity)]
    pub fn with_filter<F: Lowpass>(
        config: Config,
        dac: D,
        clock: C,
    ) -> Result<(Self, Demodulator<F>, Modulator<D>)> {
        config.validate()?;
        let (mark_inc, space_inc) = config.tone_incs()?;
        info!(
            "afsk1200: dac rate {}, mark inc {mark_inc}, space inc {space_inc}",
            config.dac_sample_rate
        );

        let (rx_writer, rx_reader) = new_fifo(config.rx_capacity);
        let (tx_writer, tx_reader) = new_fifo(config.tx_capacity);
        let status = Arc::new(AtomicU8::new(0));
        let tx = Arc::new(TxShared::new());

        let demod = Demodulator::new(rx_writer, status.clone());
        let modulator = Modulator::new(
            tx.clone(),
            tx_reader,
            dac.clone(),
            TxTiming {
                mark_inc,
                space_inc,
                dac_samples_per_bit: config.dac_sample_rate / BIT_RATE,
                preamble_flags: flags_for_ms(config.preamble_ms),
            },
        );
        let modem = Modem {
            rx_fifo: rx_reader,
            tx_fifo: tx_writer,
            status,
            tx,
            dac,
            clock,
            rx_timeout: config.rx_timeout,
            trailer_flags: flags_for_ms(config.trailer_ms),
        };
        Ok((modem, demod, modulator))
    }

    /// Read up to `buf.len()` decoded bytes from the receive queue.
    ///
    /// Blocking behaviour follows the configured [`RxTimeout`]; with
    /// a finite timeout the clock restarts for every byte. Returns
    /// the number of bytes copied.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut n = 0;
        while n < buf.len() {
            let b = match self.rx_timeout {
                RxTimeout::NonBlocking => self.rx_fifo.pop(),
                RxTimeout::Forever => loop {
                    if let Some(b) = self.rx_fifo.pop() {
                        break Some(b);
                    }
                    self.clock.relax();
                },
                RxTimeout::Ms(ms) => {
                    let start = self.clock.now_ms();
                    loop {
                        if let Some(b) = self.rx_fifo.pop() {
                            break Some(b);
                        }
                        self.clock.relax();
                        if self.clock.now_ms() - start > ms {
                            break None;
                        }
                    }
                }
            };
            match b {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        n
    }

    /// Queue `buf` for transmission, starting the transmitter as
    /// soon as the first byte is in. Blocks while the queue is full.
    ///
    /// Bytes are sent verbatim: any payload byte equal to `0x7e`,
    /// `0x7f` or `0x1b` must already carry its `0x1b` escape, or it
    /// will go out as a real flag.
    pub fn write(&mut self, buf: &[u8]) -> usize {
        for &b in buf {
            while !self.tx_fifo.push(b) {
                self.clock.relax();
            }
            self.tx_start();
        }
        buf.len()
    }

    /// Wait until the transmitter has gone quiet.
    pub fn flush(&self) {
        while self.tx.sending.load(Ordering::Acquire) {
            self.clock.relax();
        }
    }

    /// Current status mask; see [`RXFIFO_OVERRUN`].
    pub fn error(&self) -> u8 {
        self.status.load(Ordering::Acquire)
    }

    /// Clear the status mask.
    pub fn clear_error(&self) {
        self.status.store(0, Ordering::Release);
    }

    // Kick the transmitter. Safe to call at any time; while a
    // transmission is active this only tops the trailer back up so
    // the new data rides along.
    fn tx_start(&self) {
        if !self.tx.sending.swap(true, Ordering::AcqRel) {
            debug!("tx start");
            self.tx.latch.store(true, Ordering::Release);
            self.dac.irq_start();
        }
        self.tx.trailer_len.store(self.trailer_flags, Ordering::Release);
    }
}
