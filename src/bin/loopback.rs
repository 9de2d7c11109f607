//! Modem loopback demo.
//!
//! Frames a message, modulates it to an audio sample stream, feeds
//! the stream straight back into the demodulator and prints what came
//! out the other end. No hardware needed; this is the whole signal
//! path at infinite SNR.
//!
//! ```text
//! loopback -m "APRS is just HDLC with extra steps"
//! ```

use anyhow::Result;
use clap::Parser;
use log::info;

use afsk1200::hdlc::{AX25_ESC, HDLC_FLAG, HDLC_RESET};
use afsk1200::hw::{SoftDac, WallClock};
use afsk1200::{Config, Modem};

#[derive(clap::Parser, Debug)]
#[command(version, about)]
struct Opt {
    /// Verbosity level.
    #[arg(short, default_value_t = 2)]
    verbose: usize,

    /// Message to send through the loopback.
    #[arg(short, long, default_value = "The quick brown fox jumps over the lazy dog")]
    message: String,

    /// Preamble length in milliseconds.
    #[arg(long, default_value_t = 300)]
    preamble_ms: u32,

    /// Trailer length in milliseconds.
    #[arg(long, default_value_t = 50)]
    trailer_ms: u32,
}

// The modem transmits queue bytes verbatim, so anything that looks
// like a flag has to be escaped before write().
fn escape(bytes: &[u8]) -> Vec<u8> {
    let mut ret = Vec::with_capacity(bytes.len() + 2);
    for &b in bytes {
        if matches!(b, HDLC_FLAG | HDLC_RESET | AX25_ESC) {
            ret.push(AX25_ESC);
        }
        ret.push(b);
    }
    ret
}

// Split the received byte stream on flags and strip the escapes
// again.
fn frames(stream: &[u8]) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    for chunk in stream.split(|&b| b == HDLC_FLAG) {
        if chunk.is_empty() {
            continue;
        }
        let mut frame = Vec::with_capacity(chunk.len());
        let mut escaped = false;
        for &b in chunk {
            if !escaped && b == AX25_ESC {
                escaped = true;
                continue;
            }
            escaped = false;
            frame.push(b);
        }
        out.push(frame);
    }
    out
}

pub fn main() -> Result<()> {
    let opt = Opt::parse();
    stderrlog::new()
        .module(module_path!())
        .module("afsk1200")
        .quiet(false)
        .verbosity(opt.verbose)
        .timestamp(stderrlog::Timestamp::Second)
        .init()?;

    let config = Config {
        preamble_ms: opt.preamble_ms,
        trailer_ms: opt.trailer_ms,
        ..Config::default()
    };
    let dac = SoftDac::new();
    let (mut modem, mut demod, mut modulator) =
        Modem::new(config, dac.clone(), WallClock::new())?;

    let payload = escape(opt.message.as_bytes());
    info!(
        "Sending {} message bytes ({} after escaping)",
        opt.message.len(),
        payload.len()
    );
    modem.write(&payload);

    // Loop every DAC sample back in as an ADC sample, then a little
    // silence so the last bits make it through the receive pipeline.
    let mut samples = 0u64;
    while dac.enabled() {
        let s = modulator.dac_isr();
        demod.adc_isr((s as i16 - 128) as i8);
        samples += 1;
    }
    for _ in 0..64 {
        demod.adc_isr(0);
    }
    modem.flush();
    info!(
        "Looped {samples} samples ({} ms of audio)",
        samples * 1000 / afsk1200::SAMPLE_RATE as u64
    );

    let mut received = Vec::new();
    let mut buf = [0u8; 64];
    loop {
        let n = modem.read(&mut buf);
        if n == 0 {
            break;
        }
        received.extend_from_slice(&buf[..n]);
    }
    if modem.error() != 0 {
        anyhow::bail!("modem error mask {:#04x}", modem.error());
    }

    let flags = received.iter().filter(|&&b| b == HDLC_FLAG).count();
    info!("Received {} bytes, {flags} of them flags", received.len());
    for frame in frames(&received) {
        println!("Frame ({} bytes): {}", frame.len(), String::from_utf8_lossy(&frame));
    }
    Ok(())
}
