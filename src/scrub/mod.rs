use rand::Rng;
use rand::seq::index::sample;
use regex::Regex;
use tracing::warn;

/// Separator between regex patterns in the configuration attribute. A comma
/// would collide with commas inside the patterns themselves.
const PATTERN_SEPARATOR: &str = "^^";

/// Stateless message redaction: substrings matching any configured pattern
/// are masked with `X` characters before the record enters the buffer.
#[derive(Debug, Clone)]
pub struct MessageScrubber {
    patterns: Vec<Regex>,
}

impl MessageScrubber {
    /// Compiles a `^^`-separated list of regex patterns. Invalid patterns
    /// are skipped with a warning rather than failing the pipeline.
    pub fn new(spec: &str) -> Self {
        let mut patterns = Vec::new();
        for raw in spec.split(PATTERN_SEPARATOR) {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            match Regex::new(raw) {
                Ok(regex) => patterns.push(regex),
                Err(e) => warn!(pattern = raw, error = %e, "skipping invalid scrub pattern"),
            }
        }
        Self { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Replaces every match with the same number of `X` characters, so the
    /// message keeps its shape.
    pub fn scrub(&self, message: &str) -> String {
        let mut scrubbed = message.to_string();
        for pattern in &self.patterns {
            scrubbed = pattern
                .replace_all(&scrubbed, |caps: &regex::Captures<'_>| {
                    "X".repeat(caps[0].chars().count())
                })
                .into_owned();
        }
        scrubbed
    }

    /// Masks a random non-empty subset of each match's characters, keeping
    /// at least one character intact when the match is longer than one.
    pub fn scrub_random(&self, message: &str) -> String {
        let mut rng = rand::rng();
        let mut scrubbed = message.to_string();
        for pattern in &self.patterns {
            scrubbed = pattern
                .replace_all(&scrubbed, |caps: &regex::Captures<'_>| {
                    let mut chars: Vec<char> = caps[0].chars().collect();
                    let len = chars.len();
                    if len == 0 {
                        return String::new();
                    }
                    let to_mask = if len == 1 {
                        1
                    } else {
                        1 + rng.random_range(0..len - 1)
                    };
                    for index in sample(&mut rng, len, to_mask) {
                        chars[index] = 'X';
                    }
                    chars.into_iter().collect()
                })
                .into_owned();
        }
        scrubbed
    }
}
