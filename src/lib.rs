/*! AFSK1200 (Bell 202) half duplex software modem.

Audio frequency shift keying at 1200 baud with the Bell 202 tone pair
(mark 1200 Hz, space 2200 Hz), NRZI coded HDLC framing. This is the
modulation used by [AX.25][ax25] on VHF, and therefore by [APRS][aprs].

The crate implements the sample-by-sample core of a packet radio
terminal node: bytes go in, an audible FSK waveform comes out, and a
captured audio signal turns back into bytes. Everything around it --
the radio PTT, the actual ADC/DAC peripherals, the AX.25 link layer --
is a collaborator reached through the traits in [`hw`].

# Architecture overview

Receive path, driven one sample at a time from the ADC interrupt:

```text
  [ ADC sample, i8 @ 9600 Hz ]
           ↓
  [ Delay line + discriminator multiply ]
           ↓
  [ Low pass IIR (Butterworth or Chebyshev) ]
           ↓
  [ Sign slicer + phase locked bit sampler ]
           ↓
  [ NRZI decode ]
           ↓
  [ HDLC deframer ]
           ↓
  [ rx byte queue → foreground read() ]
```

Transmit path, driven one sample at a time from the DAC interrupt:

```text
  [ foreground write() → tx byte queue ]
           ↓
  [ Transmit sequencer: preamble / payload / trailer, bit stuffing ]
           ↓
  [ NRZI: a 0 switches tone, a 1 keeps it ]
           ↓
  [ DDS phase accumulator + quarter wave sine table ]
           ↓
  [ DAC sample, u8 ]
```

The modem instance is split at construction into three owners with
disjoint mutable state: a [`modem::Modem`] facade for the foreground,
a [`demod::Demodulator`] for the ADC interrupt and a
[`modulator::Modulator`] for the DAC interrupt. Only the byte queues
and a handful of atomics cross contexts. See [`modem::Modem::new`].

The byte stream carried between the deframer and the layer above uses
`0x7e` as frame delimiter, with `0x1b` escaping any literal `0x7e`,
`0x7f` or `0x1b` in the payload. The transmit side expects payload
*already escaped*; see [`modulator`] for the contract.

[ax25]: https://en.wikipedia.org/wiki/AX.25
[aprs]: https://en.wikipedia.org/wiki/Automatic_Packet_Reporting_System
 */

pub mod delay_line;
pub mod demod;
pub mod fifo;
pub mod filter;
pub mod hdlc;
pub mod hw;
pub mod modem;
pub mod modulator;
pub mod sine;

pub use demod::Demodulator;
pub use modem::{Config, Modem, RxTimeout, RXFIFO_OVERRUN};
pub use modulator::Modulator;

/// ADC sample rate. The demodulator filter constants are designed for
/// this exact rate.
pub const SAMPLE_RATE: u32 = 9600;

/// Signalling rate on the air.
pub const BIT_RATE: u32 = 1200;

/// ADC samples per bit period.
pub const SAMPLES_PER_BIT: u32 = SAMPLE_RATE / BIT_RATE;

/// Crate error type.
#[derive(Debug, Clone)]
pub struct Error {
    msg: String,
}

impl Error {
    /// Create error from message.
    pub fn msg<S: Into<String>>(msg: S) -> Self {
        Self { msg: msg.into() }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "afsk1200 error: {}", self.msg)
    }
}

impl std::error::Error for Error {}

/// Crate result type.
pub type Result<T, E = Error> = std::result::Result<T, E>;
