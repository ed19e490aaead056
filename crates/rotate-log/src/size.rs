//! Human readable byte sizes
//!
//! Sizes in configuration files may be plain integers (`1048576`) or carry a
//! binary unit suffix (`512K`, `10MB`, `1.5GiB`). Units are powers of 1024.

use serde::de::{self, Deserializer, Visitor};
use std::fmt;

use crate::error::{Error, Result};

const UNITS: &[u8] = b"KMGTPE";

/// Parse a human readable size into bytes
pub fn parse_size(input: &str) -> Result<u64> {
    let text = input.trim();
    if text.is_empty() {
        return Ok(0);
    }

    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);

    let value: f64 = number
        .parse()
        .map_err(|_| Error::invalid_size(input, "expected a number"))?;

    let unit = unit.trim().to_ascii_uppercase();
    let unit = unit.strip_suffix('B').unwrap_or(&unit);
    let unit = unit.strip_suffix('I').unwrap_or(unit);

    let multiplier = match unit.as_bytes() {
        [] => 1u64,
        [c] => match UNITS.iter().position(|u| u == c) {
            Some(pos) => 1u64 << ((pos as u32 + 1) * 10),
            None => return Err(Error::invalid_size(input, format!("unknown unit {unit:?}"))),
        },
        _ => return Err(Error::invalid_size(input, format!("unknown unit {unit:?}"))),
    };

    let bytes = value * multiplier as f64;
    if !bytes.is_finite() || bytes > u64::MAX as f64 {
        return Err(Error::invalid_size(input, "value out of range"));
    }
    Ok(bytes as u64)
}

/// Format a byte count the way it is reported in logs (`10.00MB`, `512B`)
pub fn format_size(bytes: u64) -> String {
    for (i, unit) in UNITS.iter().enumerate().rev() {
        let base = 1u64 << ((i as u32 + 1) * 10);
        if bytes >= base {
            return format!("{:.2}{}B", bytes as f64 / base as f64, *unit as char);
        }
    }
    format!("{bytes}B")
}

/// Serde adapter accepting either an integer or a human readable string
pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    struct SizeVisitor;

    impl Visitor<'_> for SizeVisitor {
        type Value = u64;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a byte count or a size such as \"10MB\"")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<u64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<u64, E> {
            u64::try_from(v).map_err(|_| E::custom("size must not be negative"))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<u64, E> {
            parse_size(v).map_err(E::custom)
        }

        fn visit_unit<E: de::Error>(self) -> std::result::Result<u64, E> {
            Ok(0)
        }
    }

    deserializer.deserialize_any(SizeVisitor)
}
