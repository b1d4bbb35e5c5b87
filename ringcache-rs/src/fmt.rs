//! Provides formatting and parsing helpers for byte sizes.
//!
//! Sizes show up in two places: the memory budget of each namespace is configured as a size
//! expression like "64m" and the statistics of a namespace are reported in a human readable
//! form.
use anyhow::Context;

/// Formats a given size in bytes.
///
/// This function determines the ideal unit (ranging from bytes to petabytes) to provide
/// a concise representation.
///
/// Note that a helper function [format_size](format_size) is also provided
/// which directly returns a String.
pub fn format_bytes(size_in_bytes: usize, f: &mut dyn std::fmt::Write) -> std::fmt::Result {
    if size_in_bytes == 1 {
        return write!(f, "1 byte");
    } else if size_in_bytes < 1024 {
        return write!(f, "{} bytes", size_in_bytes);
    }

    let mut magnitude = 0;
    let mut size = size_in_bytes as f64;
    while size > 1024. && magnitude < 5 {
        size /= 1024.;
        magnitude += 1;
    }

    if size <= 10. {
        write!(f, "{:.2} ", size)?;
    } else if size <= 100. {
        write!(f, "{:.1} ", size)?;
    } else {
        write!(f, "{:.0} ", size)?;
    }

    match magnitude {
        0 => write!(f, "Bytes"),
        1 => write!(f, "KiB"),
        2 => write!(f, "MiB"),
        3 => write!(f, "GiB"),
        4 => write!(f, "TiB"),
        _ => write!(f, "PiB"),
    }
}

/// Formats a given size in bytes and returns a String representation.
///
/// # Examples
///
/// ```
/// assert_eq!(ringcache::fmt::format_size(0), "0 bytes");
/// assert_eq!(ringcache::fmt::format_size(1), "1 byte");
/// assert_eq!(ringcache::fmt::format_size(100), "100 bytes");
/// assert_eq!(ringcache::fmt::format_size(2_048), "2.00 KiB");
/// assert_eq!(ringcache::fmt::format_size(8_734), "8.53 KiB");
/// assert_eq!(ringcache::fmt::format_size(873_400), "853 KiB");
/// assert_eq!(ringcache::fmt::format_size(8_734_000), "8.33 MiB");
/// assert_eq!(ringcache::fmt::format_size(87_340_000_000), "81.3 GiB");
/// ```
pub fn format_size(size_in_bytes: usize) -> String {
    let mut result = String::new();
    let _ = format_bytes(size_in_bytes, &mut result);

    result
}

/// Parses a size expression like "64m" into a number of bytes.
///
/// This string can have the following suffixes:
/// * **b** or **B**: treats the value as bytes (same as no suffix)
/// * **k** or **K**: treats the value as KiB
/// * **m** or **M**: treats the value as MiB
/// * **g** or **G**: treats the value as GiB
/// * **t** or **T**: treats the value as TiB
///
/// # Examples
///
/// ```
/// assert_eq!(ringcache::fmt::parse_size("100").unwrap(), 100);
/// assert_eq!(ringcache::fmt::parse_size("100b").unwrap(), 100);
/// assert_eq!(ringcache::fmt::parse_size("2k").unwrap(), 2048);
/// assert_eq!(ringcache::fmt::parse_size("8m").unwrap(), 8 * 1024 * 1024);
/// assert_eq!(ringcache::fmt::parse_size("4 G").unwrap(), 4 * 1024 * 1024 * 1024);
///
/// // An invalid suffix results in an error...
/// assert!(ringcache::fmt::parse_size("3 Y").is_err());
///
/// // Decimal numbers result in an error...
/// assert!(ringcache::fmt::parse_size("1.2g").is_err());
///
/// // Negative numbers result in an error...
/// assert!(ringcache::fmt::parse_size("-1").is_err());
/// ```
pub fn parse_size(str: impl AsRef<str>) -> anyhow::Result<usize> {
    lazy_static::lazy_static! {
        static ref NUMBER_AND_SUFFIX: regex::Regex =
            regex::Regex::new(r"^ *(\d+) *([bBkKmMgGtT]?) *$").unwrap();
    }

    let captures = NUMBER_AND_SUFFIX.captures(str.as_ref()).ok_or_else(|| {
        anyhow::anyhow!(
            "Cannot parse '{}' into a size expression. \
             Expected a positive number and optionally 'b', 'k', 'm', 'g' or 't' as suffix.",
            str.as_ref()
        )
    })?;

    let number = captures[1]
        .parse::<usize>()
        .with_context(|| format!("Size '{}' is out of range.", str.as_ref()))?;
    let factor: usize = match &captures[2] {
        "k" | "K" => 1 << 10,
        "m" | "M" => 1 << 20,
        "g" | "G" => 1 << 30,
        "t" | "T" => 1 << 40,
        _ => 1,
    };

    number
        .checked_mul(factor)
        .ok_or_else(|| anyhow::anyhow!("Size '{}' is out of range.", str.as_ref()))
}
