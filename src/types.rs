use std::time::Duration;

use clap::ValueEnum;
use serde::Deserialize;

/// How much of the build event stream the console reporter prints.
///
/// Ordered from least to most chatty, so `a >= b` reads as "at least as
/// verbose as".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Quiet,
    Minimal,
    Normal,
    Detailed,
    Diagnostic,
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Normal
    }
}

/// Importance attached to plain build messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Importance {
    High,
    Normal,
    Low,
}

impl Importance {
    /// Minimum verbosity at which a message of this importance is shown.
    pub fn min_verbosity(self) -> Verbosity {
        match self {
            Importance::High => Verbosity::Minimal,
            Importance::Normal => Verbosity::Normal,
            Importance::Low => Verbosity::Detailed,
        }
    }
}

/// Parse a duration like `"500ms"`, `"30s"`, `"10m"` or `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => secs(value, 60).ok_or_else(|| too_large(s)),
        "h" => secs(value, 60 * 60).ok_or_else(|| too_large(s)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}

fn secs(value: u64, per_unit: u64) -> Option<Duration> {
    value.checked_mul(per_unit).map(Duration::from_secs)
}

fn too_large(s: &str) -> String {
    format!("duration '{}' is too large", s)
}
