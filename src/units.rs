//! Byte/percent conversions shared by reconciliation, telemetry and the API.

const MIB: u64 = 1 << 20;
const GIB: u64 = 1 << 30;

/// Rounds to two decimal places, the precision every stored percentage uses.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Whole mebibytes, truncated.
pub fn bytes_to_mb(bytes: u64) -> i64 {
    (bytes / MIB) as i64
}

/// Whole gibibytes, truncated.
pub fn bytes_to_gb(bytes: u64) -> i64 {
    (bytes / GIB) as i64
}

pub fn bytes_to_gb_rounded(bytes: u64) -> f64 {
    round2(bytes as f64 / GIB as f64)
}

/// `used / total` as a percentage with two decimals. A zero total yields exactly 0.
pub fn usage_percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(used as f64 / total as f64 * 100.0)
}

/// Proxmox reports CPU load as a 0..1 fraction (times core count for guests).
pub fn fraction_to_percent(fraction: f64) -> f64 {
    if !fraction.is_finite() {
        return 0.0;
    }
    round2(fraction * 100.0)
}
