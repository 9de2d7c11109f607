//! Low pass IIR filters for the discriminator output.
//!
//! Both variants are first order 600 Hz low pass filters designed for
//! the fixed 9600 Hz sample rate, with the feedback coefficient
//! approximated by shifts so the whole receive path stays in integer
//! arithmetic. Which one to use is a type parameter on the
//! demodulator; there is no per-sample branch.

/// One step of a low pass filter over the discriminator output.
///
/// Implementations keep two samples of input and output history, the
/// way a first order section needs.
pub trait Lowpass: Default + Send {
    /// Feed one discriminator sample, returning the filtered value.
    fn step(&mut self, sample: i16) -> i16;
}

/// Butterworth profile.
///
/// The feedback term approximates `0.668 * y[n-1]`:
/// `y * 21 / 32 = y/2 + y/8 + y/32 = (y >> 1) + (y >> 3) + (y >> 5)`.
#[derive(Default)]
pub struct Butterworth {
    x: [i16; 2],
    y: [i16; 2],
}

impl Lowpass for Butterworth {
    #[inline]
    fn step(&mut self, sample: i16) -> i16 {
        self.x[0] = self.x[1];
        self.x[1] = sample;
        self.y[0] = self.y[1];
        let y0 = self.y[0] as i32;
        self.y[1] =
            (self.x[0] as i32 + self.x[1] as i32 + (y0 >> 1) + (y0 >> 3) + (y0 >> 5)) as i16;
        self.y[1]
    }
}

/// Chebyshev profile.
///
/// `y >> 1` approximating `0.438 * y[n-1]`. Coarser than the
/// Butterworth sum but one shift cheaper.
#[derive(Default)]
pub struct Chebyshev {
    x: [i16; 2],
    y: [i16; 2],
}

impl Lowpass for Chebyshev {
    #[inline]
    fn step(&mut self, sample: i16) -> i16 {
        self.x[0] = self.x[1];
        self.x[1] = sample;
        self.y[0] = self.y[1];
        self.y[1] = (self.x[0] as i32 + self.x[1] as i32 + ((self.y[0] as i32) >> 1)) as i16;
        self.y[1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn butterworth_step_response() -> Result<()> {
        let mut f = Butterworth::default();
        assert_eq!(f.step(100), 100);
        assert_eq!(f.step(100), 265); // 200 + 50 + 12 + 3
        assert_eq!(f.step(100), 373); // 200 + 132 + 33 + 8
        Ok(())
    }

    #[test]
    fn chebyshev_step_response() -> Result<()> {
        let mut f = Chebyshev::default();
        assert_eq!(f.step(100), 100);
        assert_eq!(f.step(100), 250);
        assert_eq!(f.step(100), 325);
        Ok(())
    }

    #[test]
    fn negative_input_rounds_like_arithmetic_shift() -> Result<()> {
        // -100 >> 3 is -13, not -12: shifts round toward negative
        // infinity, and the filter output depends on that.
        let mut f = Butterworth::default();
        assert_eq!(f.step(-100), -100);
        assert_eq!(f.step(-100), -267); // -200 - 50 - 13 - 4
        Ok(())
    }

    #[test]
    fn silence_stays_silent() -> Result<()> {
        let mut b = Butterworth::default();
        let mut c = Chebyshev::default();
        for _ in 0..100 {
            assert_eq!(b.step(0), 0);
            assert_eq!(c.step(0), 0);
        }
        Ok(())
    }

    #[test]
    fn dc_settles() -> Result<()> {
        // DC gain of the Butterworth profile is 2 / (1 - 21/32), a
        // shade under 6.
        let mut f = Butterworth::default();
        let mut y = 0;
        for _ in 0..50 {
            y = f.step(1000);
        }
        assert!((5600..6000).contains(&y), "settled at {y}");
        Ok(())
    }
}
