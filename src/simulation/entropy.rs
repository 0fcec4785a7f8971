//! Entropy source driving every branching decision in the simulation.
//!
//! The default source reproduces the sine-based formula over seed, tick and
//! player position, backed by a ChaCha RNG for uniform rolls and the wall
//! clock for reseeding. Tests swap in [`ScriptedEntropy`] to pin each
//! decision down.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Replaceable noise policy shared by all tasks.
pub trait EntropySource: Send {
    /// Bounded value in `[0, 1000)` derived from seed, tick and player position.
    fn sample(&mut self, seed: i32, tick: u64, player_x: i32, player_y: i32) -> u32;

    /// Uniform roll in `[0, 1)`.
    fn roll(&mut self) -> f64;

    /// Wall-clock noise in milliseconds.
    fn clock_ms(&mut self) -> f64;
}

/// `|floor(sin(seed + t*13.37) * 10000) XOR ((x+1)*(y+1))| mod 1000`, on 32-bit integers.
pub fn sine_entropy(seed: i32, tick: u64, player_x: i32, player_y: i32) -> u32 {
    let wave = (f64::from(seed) + tick as f64 * 13.37).sin() * 10_000.0;
    let spot = player_x.wrapping_add(1).wrapping_mul(player_y.wrapping_add(1));
    ((wave.floor() as i32) ^ spot).unsigned_abs() % 1000
}

/// `floor(|sin(phase)| * scale)`
pub fn sine_score(phase: f64, scale: f64) -> i64 {
    (phase.sin().abs() * scale).floor() as i64
}

/// `floor(|cos(phase)| * scale)`
pub fn cosine_score(phase: f64, scale: f64) -> i64 {
    (phase.cos().abs() * scale).floor() as i64
}

/// Uniform integer in `[0, n)`; zero when `n <= 0`.
pub fn roll_below(entropy: &mut dyn EntropySource, n: i64) -> i64 {
    if n <= 0 {
        return 0;
    }
    ((entropy.roll() * n as f64).floor() as i64).clamp(0, n - 1)
}

/// Initial seed from wall-clock noise.
pub fn fresh_seed(entropy: &mut dyn EntropySource) -> i32 {
    let noise = entropy.clock_ms() + entropy.roll();
    (noise.sin().abs() * 1e9).floor() as i64 as i32
}

/// Fold new clock noise into an existing seed: `s ^ (seed << 5)`.
pub fn reseed(seed: i32, clock_ms: f64) -> i32 {
    let s = ((clock_ms + f64::from(seed)).sin() * 1e6).abs().floor() as i32;
    s ^ (seed << 5)
}

pub fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn wall_clock_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as f64
}

/// The production source: sine formula, ChaCha rolls, real clock.
pub struct SineEntropy {
    rng: ChaCha8Rng,
}

impl SineEntropy {
    pub fn new() -> Self {
        Self::from_seed(rand::thread_rng().r#gen())
    }

    pub fn from_seed(seed: u64) -> Self {
        SineEntropy {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl Default for SineEntropy {
    fn default() -> Self {
        Self::new()
    }
}

impl EntropySource for SineEntropy {
    fn sample(&mut self, seed: i32, tick: u64, player_x: i32, player_y: i32) -> u32 {
        sine_entropy(seed, tick, player_x, player_y)
    }

    fn roll(&mut self) -> f64 {
        self.rng.r#gen()
    }

    fn clock_ms(&mut self) -> f64 {
        wall_clock_ms()
    }
}

/// Test double cycling through fixed samples and rolls with a frozen clock.
#[derive(Debug, Clone)]
pub struct ScriptedEntropy {
    samples: Vec<u32>,
    rolls: Vec<f64>,
    clock: f64,
    next_sample: usize,
    next_roll: usize,
}

impl ScriptedEntropy {
    pub fn new(samples: Vec<u32>) -> Self {
        ScriptedEntropy {
            samples,
            rolls: vec![0.5],
            clock: 0.0,
            next_sample: 0,
            next_roll: 0,
        }
    }

    pub fn with_rolls(mut self, rolls: Vec<f64>) -> Self {
        self.rolls = rolls;
        self
    }

    pub fn with_clock(mut self, clock_ms: f64) -> Self {
        self.clock = clock_ms;
        self
    }
}

impl EntropySource for ScriptedEntropy {
    fn sample(&mut self, _seed: i32, _tick: u64, _player_x: i32, _player_y: i32) -> u32 {
        if self.samples.is_empty() {
            return 0;
        }
        let value = self.samples[self.next_sample % self.samples.len()];
        self.next_sample += 1;
        value % 1000
    }

    fn roll(&mut self) -> f64 {
        if self.rolls.is_empty() {
            return 0.0;
        }
        let value = self.rolls[self.next_roll % self.rolls.len()];
        self.next_roll += 1;
        value
    }

    fn clock_ms(&mut self) -> f64 {
        self.clock
    }
}
