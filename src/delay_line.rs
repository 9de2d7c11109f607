//! Fixed length sample delay for the frequency discriminator.

use crate::SAMPLES_PER_BIT;

/// Number of samples the discriminator looks back: half a bit period.
pub const DELAY_LEN: usize = SAMPLES_PER_BIT as usize / 2;

/// Ring of the last [`DELAY_LEN`] input samples, pre-filled with
/// zeros so the discriminator has a valid (if silent) reference from
/// the very first sample.
#[derive(Default)]
pub struct DelayLine {
    buf: [i8; DELAY_LEN],
    pos: usize,
}

impl DelayLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push the current sample, returning the one from
    /// [`DELAY_LEN`] samples ago.
    #[inline]
    pub fn shift(&mut self, sample: i8) -> i8 {
        let oldest = self.buf[self.pos];
        self.buf[self.pos] = sample;
        self.pos = (self.pos + 1) % DELAY_LEN;
        oldest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn starts_silent() -> Result<()> {
        let mut d = DelayLine::new();
        for i in 0..DELAY_LEN {
            assert_eq!(d.shift(i as i8 + 1), 0);
        }
        Ok(())
    }

    #[test]
    fn delays_by_half_a_bit() -> Result<()> {
        let mut d = DelayLine::new();
        let samples: Vec<i8> = (0..20).map(|i| i - 10).collect();
        for (n, &s) in samples.iter().enumerate() {
            let out = d.shift(s);
            if n >= DELAY_LEN {
                assert_eq!(out, samples[n - DELAY_LEN]);
            }
        }
        Ok(())
    }
}
