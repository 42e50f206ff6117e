const fn unwrap_or_cargo_version(opt: Option<&'static str>) -> &'static str {
    match opt {
        Some(val) => val,
        None => env!("CARGO_PKG_VERSION"),
    }
}

/// Build version reported by `--version` and the startup log line.
/// `NEXOPS_VERSION` at compile time overrides the crate version (set by release builds).
pub const VERSION: &str = unwrap_or_cargo_version(option_env!("NEXOPS_VERSION"));
