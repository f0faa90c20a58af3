//! Embedded PSG reference data.
//!
//! Two process-wide blobs back the Game Boy channel translation: `psg_data`
//! holds band-limited pulse recordings (three duty cycles, five loop regions
//! each) and LFSR noise recordings (two modes, one recording per key in the
//! playable range), and `goldensun_synth` holds the square/saw/triangle
//! tables used by Golden Sun's synthetic instruments. Both are unsigned
//! 8-bit PCM at 44100 Hz, built deterministically on first use and shared
//! for the lifetime of the process.

use std::f64::consts::PI;
use std::sync::OnceLock;

/// Sample rate every synthesised recording is produced at.
pub const PSG_SAMPLE_RATE: u32 = 44100;

/// Loop length, in samples, of each pulse region. One region per key range,
/// coarser periods for lower keys.
pub const PULSE_LOOP_SIZES: [usize; 5] = [689, 344, 172, 86, 43];

/// Key range covered by each pulse region.
pub const PULSE_KEY_RANGES: [(u8, u8); 5] = [(0, 45), (46, 57), (58, 69), (70, 81), (82, 127)];

/// Waveform-RAM region sizes and key ranges for the wave channel.
pub const WAVE_REGION_SIZES: [usize; 4] = [256, 128, 64, 32];
pub const WAVE_KEY_RANGES: [(u8, u8); 4] = [(0, 52), (53, 64), (65, 76), (77, 127)];

/// Keys that get a dedicated noise recording. Keys outside are clamped onto
/// the edge recordings.
pub const NOISE_KEY_LOW: u8 = 42;
pub const NOISE_KEY_HIGH: u8 = 77;

const NOISE_RECORDING_LEN: usize = 16384;
const NOISE_KEY_COUNT: usize = (NOISE_KEY_HIGH - NOISE_KEY_LOW) as usize + 1;

/// Duty-cycle fractions for duty settings 0..=2. Setting 3 (75%) is the
/// complement of 25% and is coerced to 1 before lookup.
const PULSE_DUTIES: [f64; 3] = [0.125, 0.25, 0.5];

#[derive(Debug, Clone, Copy)]
pub struct PulseRegion {
    pub offset: usize,
    pub size: usize,
    pub loop_len: usize,
}

#[derive(Debug, Clone, Copy)]
struct NoiseRegion {
    offset: usize,
}

/// The assembled `psg_data` blob plus its offset directory.
#[derive(Debug)]
pub struct PsgData {
    data: Vec<u8>,
    pulse: [[PulseRegion; 5]; 3],
    noise: [[NoiseRegion; NOISE_KEY_COUNT]; 2],
}

impl PsgData {
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// The recording for one pulse duty/region pair. `duty` must already be
    /// coerced into 0..=2.
    pub fn pulse(&self, duty: u8, region: usize) -> (&[u8], PulseRegion) {
        let reg = self.pulse[duty as usize][region];
        (&self.data[reg.offset..reg.offset + reg.size], reg)
    }

    /// The noise recording for `key`, clamped into the synthesised range.
    /// The upper clamp lands on key 76, matching the translator's keymap.
    pub fn noise(&self, metallic: bool, key: u8) -> (&[u8], u8) {
        let clamped = if key > NOISE_KEY_HIGH {
            NOISE_KEY_HIGH - 1
        } else {
            key.max(NOISE_KEY_LOW)
        };
        let reg = self.noise[metallic as usize][(clamped - NOISE_KEY_LOW) as usize];
        (
            &self.data[reg.offset..reg.offset + NOISE_RECORDING_LEN],
            clamped,
        )
    }
}

pub fn psg_data() -> &'static PsgData {
    static DATA: OnceLock<PsgData> = OnceLock::new();
    DATA.get_or_init(build_psg_data)
}

/// `goldensun_synth` layout: one 64-sample saw period at offset 0, one
/// 64-sample triangle period at offset 64, and an 8192-sample variable-duty
/// square region at offset 128. Fixed-duty square instruments read a
/// 64-sample window inside the variable region.
pub const GS_SAW_OFFSET: usize = 0;
pub const GS_TRIANGLE_OFFSET: usize = 64;
pub const GS_SQUARE_OFFSET: usize = 128;
pub const GS_PERIOD: usize = 64;
pub const GS_SWEEP_LEN: usize = 8192;

#[derive(Debug)]
pub struct GoldenSunSynth {
    data: Vec<u8>,
}

impl GoldenSunSynth {
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn region(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }
}

pub fn goldensun_synth() -> &'static GoldenSunSynth {
    static DATA: OnceLock<GoldenSunSynth> = OnceLock::new();
    DATA.get_or_init(build_goldensun_synth)
}

fn build_psg_data() -> PsgData {
    let mut data = Vec::new();
    let mut pulse = [[PulseRegion {
        offset: 0,
        size: 0,
        loop_len: 0,
    }; 5]; 3];

    for (d, &duty) in PULSE_DUTIES.iter().enumerate() {
        for (r, &loop_len) in PULSE_LOOP_SIZES.iter().enumerate() {
            // One warm-up period followed by the loop period.
            let size = loop_len * 2;
            let offset = data.len();
            let period = band_limited_pulse(loop_len, duty);
            data.extend_from_slice(&period);
            data.extend_from_slice(&period);
            pulse[d][r] = PulseRegion {
                offset,
                size,
                loop_len,
            };
        }
    }

    let mut noise = [[NoiseRegion { offset: 0 }; NOISE_KEY_COUNT]; 2];
    for mode in 0..2 {
        for k in 0..NOISE_KEY_COUNT {
            let key = NOISE_KEY_LOW + k as u8;
            let offset = data.len();
            data.extend_from_slice(&lfsr_noise(mode == 1, noise_clock_hz(key)));
            noise[mode][k] = NoiseRegion { offset };
        }
    }

    PsgData { data, pulse, noise }
}

/// LFSR clock rate for a given key: 32 cycles of the register per period of
/// the key's fundamental.
fn noise_clock_hz(key: u8) -> f64 {
    32.0 * 440.0 * ((key as f64 - 69.0) / 12.0).exp2()
}

/// One period of a band-limited pulse wave with the given duty cycle, as
/// centred unsigned 8-bit PCM. Harmonics run to Nyquist for the period.
fn band_limited_pulse(period: usize, duty: f64) -> Vec<u8> {
    let harmonics = period / 2;
    let mut wave = vec![0f64; period];
    for (i, v) in wave.iter_mut().enumerate() {
        let t = i as f64 / period as f64;
        let mut acc = 0.0;
        for n in 1..=harmonics {
            let nf = n as f64;
            acc += (4.0 / (nf * PI)) * (PI * nf * duty).sin() * (2.0 * PI * nf * t).cos();
        }
        *v = acc;
    }
    quantise_centred(&wave)
}

/// A fixed-length noise recording: a Game Boy LFSR (15-bit normal, 7-bit
/// metallic) clocked at `clock_hz`, resampled to 44100 Hz with linear
/// interpolation between register outputs.
fn lfsr_noise(metallic: bool, clock_hz: f64) -> Vec<u8> {
    let width: u32 = if metallic { 7 } else { 15 };
    let mut lfsr: u32 = (1u32 << width) - 1;
    let mut step = move || {
        let bit = (lfsr ^ (lfsr >> 1)) & 1;
        lfsr = (lfsr >> 1) | (bit << (width - 1));
        if lfsr & 1 != 0 {
            -1.0
        } else {
            1.0
        }
    };

    let ratio = clock_hz / PSG_SAMPLE_RATE as f64;
    let mut prev = step();
    let mut next = step();
    let mut phase = 0f64;
    let mut out = Vec::with_capacity(NOISE_RECORDING_LEN);
    for _ in 0..NOISE_RECORDING_LEN {
        phase += ratio;
        while phase >= 1.0 {
            prev = next;
            next = step();
            phase -= 1.0;
        }
        out.push(prev + (next - prev) * phase);
    }
    quantise_centred(&out)
}

fn build_goldensun_synth() -> GoldenSunSynth {
    let mut data = Vec::with_capacity(GS_SQUARE_OFFSET + GS_SWEEP_LEN);
    data.extend_from_slice(&band_limited_saw(GS_PERIOD));
    data.extend_from_slice(&band_limited_triangle(GS_PERIOD));
    // Variable-duty region: 128 consecutive periods with the duty swept
    // sinusoidally around 50%.
    let periods = GS_SWEEP_LEN / GS_PERIOD;
    for p in 0..periods {
        let duty = 0.5 + 0.46 * (2.0 * PI * p as f64 / periods as f64).sin();
        data.extend_from_slice(&band_limited_pulse(GS_PERIOD, duty));
    }
    GoldenSunSynth { data }
}

fn band_limited_saw(period: usize) -> Vec<u8> {
    let harmonics = period / 2;
    let mut wave = vec![0f64; period];
    for (i, v) in wave.iter_mut().enumerate() {
        let t = i as f64 / period as f64;
        let mut acc = 0.0;
        for n in 1..=harmonics {
            let nf = n as f64;
            acc += (2.0 * PI * nf * t).sin() / nf;
        }
        *v = acc;
    }
    quantise_centred(&wave)
}

fn band_limited_triangle(period: usize) -> Vec<u8> {
    let harmonics = period / 2;
    let mut wave = vec![0f64; period];
    for (i, v) in wave.iter_mut().enumerate() {
        let t = i as f64 / period as f64;
        let mut acc = 0.0;
        let mut sign = 1.0;
        for n in (1..=harmonics).step_by(2) {
            let nf = n as f64;
            acc += sign * (2.0 * PI * nf * t).sin() / (nf * nf);
            sign = -sign;
        }
        *v = acc;
    }
    quantise_centred(&wave)
}

/// Normalises to a fixed peak and centres on 0x80.
fn quantise_centred(wave: &[f64]) -> Vec<u8> {
    let peak = wave.iter().fold(0f64, |m, v| m.max(v.abs())).max(1e-9);
    let scale = 100.0 / peak;
    wave.iter()
        .map(|v| (128.0 + (v * scale).round()).clamp(0.0, 255.0) as u8)
        .collect()
}
