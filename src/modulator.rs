//! DDS modulator and transmit sequencer.
//!
//! The DAC interrupt calls [`Modulator::dac_isr`] once per output
//! sample. Each call advances a phase accumulator through the sine
//! table; every `dac_samples_per_bit` calls the sequencer decides the
//! next bit, NRZI style: transmit a 1 by keeping the current tone, a
//! 0 by switching between mark and space. Bytes come from the
//! transmit queue, bracketed by preamble and trailer flags, with a
//! zero bit stuffed after five consecutive ones.
//!
//! # Escape contract
//!
//! The sequencer transmits queue bytes literally except for
//! [`AX25_ESC`]: on popping it, the *next* queue byte is sent as
//! payload even if it looks like a flag. Callers must pre-escape any
//! literal `0x7e`, `0x7f` or `0x1b` in their payload before writing
//! it to the modem; unescaped flag bytes are sent as real flags with
//! bit stuffing disabled.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crate::fifo::FifoReader;
use crate::hdlc::{AX25_ESC, HDLC_FLAG, HDLC_RESET};
use crate::hw::{DacChannel, Strobe};
use crate::sine::{sin_sample, SIN_LEN};

/// Mark tone frequency in Hz.
pub const MARK_FREQ: u32 = 1200;

/// Space tone frequency in Hz.
pub const SPACE_FREQ: u32 = 2200;

// Stuff a zero after this many consecutive ones.
const BIT_STUFF_LEN: u8 = 5;

// State shared between the DAC interrupt and the foreground facade.
pub(crate) struct TxShared {
    // True from tx start until the sequencer runs dry.
    pub sending: AtomicBool,
    // Flags still owed after the payload. Refreshed by every tx
    // start so new data extends an active transmission.
    pub trailer_len: AtomicU32,
    // Set by a cold tx start; the next dac_isr call reinitialises
    // the sequencer before producing its first sample.
    pub latch: AtomicBool,
}

impl TxShared {
    pub fn new() -> Self {
        Self {
            sending: AtomicBool::new(false),
            trailer_len: AtomicU32::new(0),
            latch: AtomicBool::new(false),
        }
    }
}

// Per-instance constants derived from the configuration.
pub(crate) struct TxTiming {
    pub mark_inc: u16,
    pub space_inc: u16,
    pub dac_samples_per_bit: u32,
    pub preamble_flags: u32,
}

/// Transmit half of the modem. Owned by the DAC driver; see
/// [`Modem::new`](crate::modem::Modem::new).
pub struct Modulator<D: DacChannel, S: Strobe = ()> {
    shared: Arc<TxShared>,
    tx_fifo: FifoReader,
    dac: D,
    strobe: S,

    // DDS state.
    phase_acc: u16,
    phase_inc: u16,

    // Sequencer state.
    sample_count: u32,
    // Mask of the bit being sent, LSB first; 0 requests a new byte.
    tx_bit: u8,
    curr_out: u8,
    // Stuffing applies to the current byte (payload yes, flags no).
    bit_stuff: bool,
    stuff_cnt: u8,
    preamble_len: u32,

    mark_inc: u16,
    space_inc: u16,
    dac_samples_per_bit: u32,
    preamble_flags: u32,
}

impl<D: DacChannel> Modulator<D> {
    pub(crate) fn new(
        shared: Arc<TxShared>,
        tx_fifo: FifoReader,
        dac: D,
        timing: TxTiming,
    ) -> Self {
        Self {
            shared,
            tx_fifo,
            dac,
            strobe: (),
            phase_acc: 0,
            phase_inc: timing.mark_inc,
            sample_count: 0,
            tx_bit: 0,
            curr_out: 0,
            bit_stuff: false,
            stuff_cnt: 0,
            preamble_len: 0,
            mark_inc: timing.mark_inc,
            space_inc: timing.space_inc,
            dac_samples_per_bit: timing.dac_samples_per_bit,
            preamble_flags: timing.preamble_flags,
        }
    }
}

impl<D: DacChannel, S: Strobe> Modulator<D, S> {
    /// Attach a scope trigger output toggled around each sample.
    pub fn with_strobe<S2: Strobe>(self, strobe: S2) -> Modulator<D, S2> {
        Modulator {
            shared: self.shared,
            tx_fifo: self.tx_fifo,
            dac: self.dac,
            strobe,
            phase_acc: self.phase_acc,
            phase_inc: self.phase_inc,
            sample_count: self.sample_count,
            tx_bit: self.tx_bit,
            curr_out: self.curr_out,
            bit_stuff: self.bit_stuff,
            stuff_cnt: self.stuff_cnt,
            preamble_len: self.preamble_len,
            mark_inc: self.mark_inc,
            space_inc: self.space_inc,
            dac_samples_per_bit: self.dac_samples_per_bit,
            preamble_flags: self.preamble_flags,
        }
    }

    #[inline]
    fn switch_tone(&self) -> u16 {
        if self.phase_inc == self.mark_inc {
            self.space_inc
        } else {
            self.mark_inc
        }
    }

    // Sequencer ran dry: disarm the interrupt and go quiet.
    fn stop(&mut self) -> u8 {
        self.dac.irq_stop();
        self.shared.sending.store(false, Ordering::Release);
        self.strobe.off();
        0
    }

    /// DAC interrupt callback. Returns the next output sample.
    ///
    /// Must be called once per DAC sample while the channel is armed.
    pub fn dac_isr(&mut self) -> u8 {
        self.strobe.on();

        // A cold tx start parked its initial state here; pick it up
        // before the first sample.
        if self.shared.latch.swap(false, Ordering::AcqRel) {
            self.phase_inc = self.mark_inc;
            self.phase_acc = 0;
            self.stuff_cnt = 0;
            self.tx_bit = 0;
            self.sample_count = 0;
            self.preamble_len = self.preamble_flags;
        }

        // Start of a bit period?
        if self.sample_count == 0 {
            if self.tx_bit == 0 {
                // Byte finished; choose the next one.
                let trailer = self.shared.trailer_len.load(Ordering::Acquire);
                if self.tx_fifo.is_empty() && trailer == 0 {
                    return self.stop();
                }

                // A fresh byte stuffs unless it turns out to be a
                // flag; the counter only survives across stuffed
                // bytes.
                if !self.bit_stuff {
                    self.stuff_cnt = 0;
                }
                self.bit_stuff = true;

                if self.preamble_len > 0 {
                    self.preamble_len -= 1;
                    self.curr_out = HDLC_FLAG;
                } else {
                    match self.tx_fifo.pop() {
                        Some(b) => self.curr_out = b,
                        None => {
                            self.shared.trailer_len.store(trailer - 1, Ordering::Release);
                            self.curr_out = HDLC_FLAG;
                        }
                    }
                }

                if self.curr_out == AX25_ESC {
                    // Escaped byte: send the next one literally.
                    match self.tx_fifo.pop() {
                        Some(b) => self.curr_out = b,
                        None => return self.stop(),
                    }
                } else if self.curr_out == HDLC_FLAG || self.curr_out == HDLC_RESET {
                    // A real flag must keep its six-ones pattern.
                    self.bit_stuff = false;
                }

                self.tx_bit = 0x01;
            }

            if self.bit_stuff && self.stuff_cnt >= BIT_STUFF_LEN {
                // Five ones in a row: insert a zero.
                self.stuff_cnt = 0;
                self.phase_inc = self.switch_tone();
            } else {
                // NRZI: a 1 keeps the tone, a 0 switches it.
                if self.curr_out & self.tx_bit != 0 {
                    self.stuff_cnt += 1;
                } else {
                    self.stuff_cnt = 0;
                    self.phase_inc = self.switch_tone();
                }
                self.tx_bit <<= 1;
            }

            self.sample_count = self.dac_samples_per_bit;
        }

        self.phase_acc = (self.phase_acc + self.phase_inc) % SIN_LEN as u16;
        self.sample_count -= 1;

        self.strobe.off();
        sin_sample(self.phase_acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use crate::fifo::new_fifo;
    use crate::hw::SoftDac;

    const MARK: u16 = 64; // 512 * 1200 / 9600
    const SPACE: u16 = 117; // round(512 * 2200 / 9600)

    fn setup(preamble_flags: u32, trailer: u32, bytes: &[u8]) -> (Modulator<SoftDac>, SoftDac) {
        let (mut w, r) = new_fifo(64);
        for &b in bytes {
            assert!(w.push(b));
        }
        let shared = Arc::new(TxShared::new());
        shared.trailer_len.store(trailer, Ordering::Release);
        shared.latch.store(true, Ordering::Release);
        shared.sending.store(true, Ordering::Release);
        let dac = SoftDac::new();
        dac.irq_start();
        let m = Modulator::new(
            shared,
            r,
            dac.clone(),
            TxTiming {
                mark_inc: MARK,
                space_inc: SPACE,
                dac_samples_per_bit: 8,
                preamble_flags,
            },
        );
        (m, dac)
    }

    // Run one full bit period, returning the tone it was sent with,
    // or None if the sequencer ran dry instead.
    fn step_bit(m: &mut Modulator<SoftDac>, dac: &SoftDac) -> Option<u16> {
        if !dac.enabled() {
            return None;
        }
        m.dac_isr();
        if !dac.enabled() {
            return None;
        }
        let tone = m.phase_inc;
        for _ in 0..7 {
            m.dac_isr();
        }
        Some(tone)
    }

    fn tone_trace(m: &mut Modulator<SoftDac>, dac: &SoftDac, max_bits: usize) -> Vec<u16> {
        let mut tones = Vec::new();
        for _ in 0..max_bits {
            match step_bit(m, dac) {
                Some(t) => tones.push(t),
                None => break,
            }
        }
        tones
    }

    #[test]
    fn all_zero_byte_toggles_every_bit() -> Result<()> {
        let (mut m, dac) = setup(1, 0, &[0x00]);
        let tones = tone_trace(&mut m, &dac, 100);
        // Flag 01111110 LSB first starting from mark, then eight
        // zeros, NRZI toggling on every one of them.
        let s = SPACE;
        let k = MARK;
        assert_eq!(tones, vec![s, s, s, s, s, s, s, k, s, k, s, k, s, k, s, k]);
        assert!(!dac.enabled());
        assert!(!m.shared.sending.load(Ordering::Acquire));
        assert_eq!(dac.stops(), 1);
        Ok(())
    }

    #[test]
    fn escaped_flag_is_sent_as_data_with_stuffing() -> Result<()> {
        let (mut m, dac) = setup(1, 1, &[AX25_ESC, 0x7e, 0x41]);
        let tones = tone_trace(&mut m, &dac, 100);
        let s = SPACE;
        let k = MARK;
        let mut want = vec![s, s, s, s, s, s, s, k]; // preamble flag
        // 0x7e as payload: 0 11111 [stuffed 0] 1 0 -- nine bit
        // periods, tone change on the stuffed zero.
        want.extend_from_slice(&[s, s, s, s, s, s, k, k, s]);
        // 0x41: 1 0 0 0 0 0 1 0.
        want.extend_from_slice(&[s, k, s, k, s, k, k, s]);
        // Trailer flag.
        want.extend_from_slice(&[k, k, k, k, k, k, k, s]);
        assert_eq!(tones, want);
        assert!(!dac.enabled());
        // All three queue bytes were consumed.
        assert!(m.tx_fifo.is_empty());
        Ok(())
    }

    #[test]
    fn escape_at_queue_end_terminates_transmission() -> Result<()> {
        let (mut m, dac) = setup(1, 2, &[AX25_ESC]);
        // The preamble flag goes out normally: eight bits of eight
        // samples each.
        for _ in 0..64 {
            m.dac_isr();
        }
        assert!(dac.enabled());
        // The next byte pops the escape, finds nothing behind it,
        // and gives up: trailer abandoned.
        assert_eq!(m.dac_isr(), 0);
        assert!(!dac.enabled());
        assert!(!m.shared.sending.load(Ordering::Acquire));
        assert_eq!(m.shared.trailer_len.load(Ordering::Acquire), 2);
        Ok(())
    }

    #[test]
    fn empty_queue_sends_preamble_and_trailer_only() -> Result<()> {
        let (mut m, dac) = setup(2, 3, &[]);
        let tones = tone_trace(&mut m, &dac, 100);
        // Five flags of eight bits each.
        assert_eq!(tones.len(), 40);
        assert!(!dac.enabled());
        assert_eq!(m.shared.trailer_len.load(Ordering::Acquire), 0);
        Ok(())
    }

    #[test]
    fn flags_are_not_stuffed() -> Result<()> {
        // A flag's six consecutive ones must go out unstuffed, eight
        // bits per flag, or it would not be a flag.
        let (mut m, dac) = setup(3, 1, &[]);
        let tones = tone_trace(&mut m, &dac, 100);
        assert_eq!(tones.len(), 32);
        // Each flag: the zero toggles, then one tone held for the
        // six ones, then the closing zero toggles again.
        for flag in tones.chunks(8) {
            assert!(flag[1..7].iter().all(|&t| t == flag[0]));
            assert_ne!(flag[7], flag[6]);
        }
        Ok(())
    }

    #[test]
    fn strobe_marks_every_sample() -> Result<()> {
        use std::sync::atomic::AtomicUsize;

        struct CountStrobe(Arc<AtomicUsize>);
        impl Strobe for CountStrobe {
            fn on(&mut self) {
                self.0.fetch_add(1, Ordering::AcqRel);
            }
            fn off(&mut self) {}
        }

        let (m, _dac) = setup(1, 0, &[0x00]);
        let count = Arc::new(AtomicUsize::new(0));
        let mut m = m.with_strobe(CountStrobe(count.clone()));
        for _ in 0..16 {
            m.dac_isr();
        }
        assert_eq!(count.load(Ordering::Acquire), 16);
        Ok(())
    }

    #[test]
    fn stuffing_counts_across_escaped_bytes() -> Result<()> {
        // 0xff, then 0xff behind an escape. The ones counter carries
        // over between stuffed bytes, so the second byte stuffs
        // after its first two ones.
        let (mut m, dac) = setup(1, 0, &[0xff, AX25_ESC, 0xff]);
        let tones = tone_trace(&mut m, &dac, 200);
        // Flag, 0xff in nine periods, 0xff in ten.
        assert_eq!(tones.len(), 8 + 9 + 10);
        // Never more than six equal tones in a row after the
        // preamble: a longer run would be six unstuffed ones.
        for w in tones[8..].windows(7) {
            assert!(
                !w.windows(2).all(|p| p[0] == p[1]),
                "unstuffed run of ones: {tones:?}"
            );
        }
        assert!(!dac.enabled());
        Ok(())
    }
}
