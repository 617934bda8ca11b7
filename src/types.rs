// src/types.rs

//! Small shared value types used by the CLI, config and output layers.

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// Which half of a task's output a log reader follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogKind {
    Stdout,
    Stderr,
}

impl LogKind {
    /// Value of the `type` query parameter of the logs endpoint.
    pub fn as_str(self) -> &'static str {
        match self {
            LogKind::Stdout => "stdout",
            LogKind::Stderr => "stderr",
        }
    }
}

/// One value of the cumulative `-o/--out` selector.
///
/// Several spellings are accepted for each stream so the flag reads the same
/// as the short forms used in the line prefixes (`A`, `O`, `E`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    All,
    Alloc,
    Stdout,
    Stderr,
    Eval,
    None,
}

impl FromStr for OutputStream {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "all" => Ok(OutputStream::All),
            "alloc" | "a" | "A" => Ok(OutputStream::Alloc),
            "stdout" | "out" | "o" | "O" | "1" => Ok(OutputStream::Stdout),
            "stderr" | "err" | "E" | "2" => Ok(OutputStream::Stderr),
            "evaluation" | "eval" | "e" => Ok(OutputStream::Eval),
            "none" => Ok(OutputStream::None),
            other => Err(format!(
                "invalid output stream: {other} (expected all, alloc, stdout, stderr, eval or none)"
            )),
        }
    }
}

/// The set of enabled output streams after folding every `--out` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSet {
    pub alloc: bool,
    pub stdout: bool,
    pub stderr: bool,
    pub eval: bool,
}

impl OutputSet {
    pub const NONE: OutputSet = OutputSet {
        alloc: false,
        stdout: false,
        stderr: false,
        eval: false,
    };

    pub const ALL: OutputSet = OutputSet {
        alloc: true,
        stdout: true,
        stderr: true,
        eval: true,
    };

    /// Fold selector values. An empty list means `all`; `none` contributes
    /// nothing, so `-o none` silences everything.
    pub fn from_selectors(selectors: &[OutputStream]) -> Self {
        if selectors.is_empty() {
            return Self::ALL;
        }
        let mut set = Self::NONE;
        for sel in selectors {
            match sel {
                OutputStream::All => set = Self::ALL,
                OutputStream::Alloc => set.alloc = true,
                OutputStream::Stdout => set.stdout = true,
                OutputStream::Stderr => set.stderr = true,
                OutputStream::Eval => set.eval = true,
                OutputStream::None => {}
            }
        }
        set
    }

    pub fn wants(&self, kind: LogKind) -> bool {
        match kind {
            LogKind::Stdout => self.stdout,
            LogKind::Stderr => self.stderr,
        }
    }
}

impl Default for OutputSet {
    fn default() -> Self {
        Self::ALL
    }
}

/// Parse a duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`, or a bare
/// (possibly fractional) number of seconds such as `"0.5"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());

    let (num_part, unit_part) = s.split_at(idx);
    let value: f64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("duration must be non-negative, got '{s}'"));
    }
    let unit = unit_part.trim().to_lowercase();

    let secs = match unit.as_str() {
        "" | "s" => value,
        "ms" => value / 1000.0,
        "m" => value * 60.0,
        "h" => value * 60.0 * 60.0,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };

    Ok(Duration::from_secs_f64(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_selectors_are_cumulative() {
        let set = OutputSet::from_selectors(&[OutputStream::Stdout, OutputStream::Stderr]);
        assert!(set.stdout && set.stderr);
        assert!(!set.alloc && !set.eval);

        assert_eq!(OutputSet::from_selectors(&[]), OutputSet::ALL);
        assert_eq!(OutputSet::from_selectors(&[OutputStream::None]), OutputSet::NONE);
    }

    #[test]
    fn output_stream_aliases() {
        assert_eq!("1".parse::<OutputStream>(), Ok(OutputStream::Stdout));
        assert_eq!("E".parse::<OutputStream>(), Ok(OutputStream::Stderr));
        assert_eq!("e".parse::<OutputStream>(), Ok(OutputStream::Eval));
        assert!("bogus".parse::<OutputStream>().is_err());
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("2s"), Ok(Duration::from_secs(2)));
        assert_eq!(parse_duration("0.5"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("3 parsecs").is_err());
    }
}
