//! AFSK demodulator: frequency discriminator, low pass filter and
//! phase locked bit sampler.
//!
//! Runs entirely from the ADC interrupt, one sample per call, with no
//! allocation and no blocking. Frequency discrimination is done by
//! multiplying the sample with one delayed by half a bit period: the
//! product's sign after low pass filtering tells the two tones apart.
//! A software PLL then picks one decision instant per bit period and
//! the NRZI decode feeds the HDLC deframer.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use log::debug;

use crate::delay_line::DelayLine;
use crate::fifo::FifoWriter;
use crate::filter::{Butterworth, Lowpass};
use crate::hdlc::HdlcDeframer;
use crate::hw::Strobe;
use crate::modem::RXFIFO_OVERRUN;
use crate::SAMPLES_PER_BIT;

// Sampler phase runs in units of 1/PHASE_BIT of a sample.
const PHASE_BIT: i16 = 8;
const PHASE_INC: i16 = 1;
const PHASE_MAX: i16 = SAMPLES_PER_BIT as i16 * PHASE_BIT;
const PHASE_THRES: i16 = PHASE_MAX / 2;

// The two low bits differ: the last transition is an edge.
#[inline]
fn edge_found(bits: u8) -> bool {
    (bits ^ (bits >> 1)) & 0x01 != 0
}

// Majority vote over the last three sliced bits. Two or more ones
// decide a one. Presumes eight samples per bit.
#[inline]
fn majority3(bits: u8) -> bool {
    matches!(bits & 0x07, 0x07 | 0x06 | 0x05 | 0x03)
}

/// Receive half of the modem. Owned by the ADC driver; see
/// [`Modem::new`](crate::modem::Modem::new).
pub struct Demodulator<F: Lowpass = Butterworth, S: Strobe = ()> {
    delay: DelayLine,
    filter: F,
    // Raw sliced bits, newest in bit 0.
    sampled_bits: u8,
    // Bit sampler phase, nudged toward observed edges.
    curr_phase: i16,
    // Decided bits; only the low two matter, for NRZI.
    found_bits: u8,
    hdlc: HdlcDeframer,
    rx_fifo: FifoWriter,
    status: Arc<AtomicU8>,
    strobe: S,
}

impl<F: Lowpass> Demodulator<F> {
    pub(crate) fn new(rx_fifo: FifoWriter, status: Arc<AtomicU8>) -> Self {
        Self {
            delay: DelayLine::new(),
            filter: F::default(),
            sampled_bits: 0,
            curr_phase: 0,
            found_bits: 0,
            hdlc: HdlcDeframer::new(),
            rx_fifo,
            status,
            strobe: (),
        }
    }
}

impl<F: Lowpass, S: Strobe> Demodulator<F, S> {
    /// Attach a scope trigger output toggled around each sample.
    pub fn with_strobe<S2: Strobe>(self, strobe: S2) -> Demodulator<F, S2> {
        Demodulator {
            delay: self.delay,
            filter: self.filter,
            sampled_bits: self.sampled_bits,
            curr_phase: self.curr_phase,
            found_bits: self.found_bits,
            hdlc: self.hdlc,
            rx_fifo: self.rx_fifo,
            status: self.status,
            strobe,
        }
    }

    /// ADC interrupt callback. Must be called once per sample, at
    /// exactly [`SAMPLE_RATE`](crate::SAMPLE_RATE) Hz.
    pub fn adc_isr(&mut self, sample: i8) {
        self.strobe.on();

        // Discriminator: multiply with the sample from half a bit
        // ago, then low pass. Tone spacing makes the product's DC
        // component negative for mark, positive for space.
        let delayed = self.delay.shift(sample);
        let raw = (delayed as i16 * sample as i16) >> 2;
        let filtered = self.filter.step(raw);

        self.sampled_bits <<= 1;
        if filtered > 0 {
            self.sampled_bits |= 1;
        }

        // An edge tells us where the bit boundary really is; pull the
        // sampling phase toward it.
        if edge_found(self.sampled_bits) {
            if self.curr_phase < PHASE_THRES {
                self.curr_phase += PHASE_INC;
            } else {
                self.curr_phase -= PHASE_INC;
            }
        }
        self.curr_phase += PHASE_BIT;

        // One bit period elapsed: decide a bit.
        if self.curr_phase >= PHASE_MAX {
            self.curr_phase %= PHASE_MAX;

            self.found_bits <<= 1;
            if majority3(self.sampled_bits) {
                self.found_bits |= 1;
            }

            // NRZI: two equal decisions in a row mean 1, a change
            // means 0.
            let bit = !edge_found(self.found_bits);
            if !self.hdlc.parse(bit, &mut self.rx_fifo) {
                let prev = self.status.fetch_or(RXFIFO_OVERRUN, Ordering::AcqRel);
                if prev & RXFIFO_OVERRUN == 0 {
                    debug!("rx overrun, dropping frame");
                }
            }
        }

        self.strobe.off();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn edge_detection() -> Result<()> {
        assert!(!edge_found(0b00));
        assert!(!edge_found(0b11));
        assert!(edge_found(0b01));
        assert!(edge_found(0b10));
        // Only the low two bits count.
        assert!(!edge_found(0b100));
        assert!(edge_found(0b110));
        Ok(())
    }

    #[test]
    fn majority_table() -> Result<()> {
        // Exactly the patterns with two or three ones in the low
        // three bits.
        let ones = [0b111, 0b110, 0b101, 0b011];
        for bits in 0u8..8 {
            assert_eq!(majority3(bits), ones.contains(&bits), "bits {bits:03b}");
        }
        // High bits are ignored.
        assert!(majority3(0b1000_0110));
        assert!(!majority3(0b1111_0001));
        Ok(())
    }
}
