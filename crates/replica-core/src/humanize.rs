//! Humanization helpers: artificial reply latency and cosmetic typos.
//!
//! Both helpers take the random source as a parameter so callers can pass a
//! seeded generator in tests and `rand::thread_rng()` in production.

use rand::Rng;
use std::time::Duration;

use crate::config::{HumanizeConfig, TypoMode};

/// `char_count * ms_per_char + thinking_ms`, saturating.
pub fn calculate_latency(char_count: usize, thinking_ms: u64, ms_per_char: u64) -> u64 {
    (char_count as u64)
        .saturating_mul(ms_per_char)
        .saturating_add(thinking_ms)
}

/// Draw the "thinking" part of the delay, uniform over both inclusive bounds.
pub fn draw_thinking_ms<R: Rng + ?Sized>(config: &HumanizeConfig, rng: &mut R) -> u64 {
    if config.thinking_min_ms >= config.thinking_max_ms {
        return config.thinking_min_ms;
    }
    rng.gen_range(config.thinking_min_ms..=config.thinking_max_ms)
}

/// Full artificial delay for a reply of `char_count` characters.
pub fn sample_latency<R: Rng + ?Sized>(
    char_count: usize,
    config: &HumanizeConfig,
    rng: &mut R,
) -> Duration {
    let thinking = draw_thinking_ms(config, rng);
    Duration::from_millis(calculate_latency(
        char_count,
        thinking,
        config.ms_per_char,
    ))
}

/// Swap one random pair of adjacent characters.
///
/// Texts shorter than two characters come back unchanged.
pub fn swap_adjacent<R: Rng + ?Sized>(text: &str, rng: &mut R) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    if chars.len() < 2 {
        return text.to_string();
    }
    let idx = rng.gen_range(0..chars.len() - 1);
    chars.swap(idx, idx + 1);
    chars.into_iter().collect()
}

impl TypoMode {
    /// Apply the cosmetic mutation with the given per-reply probability.
    pub fn apply<R: Rng + ?Sized>(&self, text: &str, probability: f64, rng: &mut R) -> String {
        match self {
            Self::Off => text.to_string(),
            Self::AdjacentSwap => {
                if rng.gen_bool(probability.clamp(0.0, 1.0)) {
                    swap_adjacent(text, rng)
                } else {
                    text.to_string()
                }
            }
        }
    }
}

impl HumanizeConfig {
    /// Run the configured typo hook over `text`.
    pub fn mutate<R: Rng + ?Sized>(&self, text: &str, rng: &mut R) -> String {
        self.typo.apply(text, self.typo_probability, rng)
    }
}
