//! Resource-quantity grammar for policy parameters.
//!
//! CPU: integer or decimal cores, or an explicit millicore suffix (`m`).
//! Memory: an integer with an optional binary-prefix suffix. This system's
//! convention treats the decimal SI suffixes (`K`, `M`, `G`, `T`, `P`) as
//! synonyms for their `Ki`/`Mi`/`Gi`/`Ti`/`Pi` counterparts — both use the
//! 1024 base (an Open Question resolved in `DESIGN.md`).

use crate::error::{Error, Result};

const KI: f64 = 1024.0;
const MI: f64 = KI * 1024.0;
const GI: f64 = MI * 1024.0;
const TI: f64 = GI * 1024.0;
const PI: f64 = TI * 1024.0;

/// Parse a CPU quantity into millicores.
///
/// Accepts a bare integer or decimal (interpreted as whole cores, ×1000),
/// or a value with an explicit `m` millicore suffix.
pub fn parse_cpu_millicores(input: &str) -> Result<f64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::Config("empty CPU quantity".into()));
    }

    if let Some(digits) = trimmed.strip_suffix('m') {
        return digits
            .parse::<f64>()
            .map_err(|e| Error::Config(format!("invalid CPU millicore quantity {input:?}: {e}")));
    }

    trimmed
        .parse::<f64>()
        .map(|cores| cores * 1000.0)
        .map_err(|e| Error::Config(format!("invalid CPU quantity {input:?}: {e}")))
}

/// Parse a memory quantity into bytes.
pub fn parse_memory_bytes(input: &str) -> Result<f64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::Config("empty memory quantity".into()));
    }

    let suffixes: &[(&str, f64)] = &[
        ("Ki", KI),
        ("Mi", MI),
        ("Gi", GI),
        ("Ti", TI),
        ("Pi", PI),
        ("K", KI),
        ("M", MI),
        ("G", GI),
        ("T", TI),
        ("P", PI),
    ];

    for (suffix, multiplier) in suffixes {
        if let Some(digits) = trimmed.strip_suffix(suffix) {
            return digits
                .parse::<f64>()
                .map(|value| value * multiplier)
                .map_err(|e| Error::Config(format!("invalid memory quantity {input:?}: {e}")));
        }
    }

    trimmed
        .parse::<f64>()
        .map_err(|e| Error::Config(format!("invalid memory quantity {input:?}: {e}")))
}
