//! Environment variable parsing helpers shared by the sub-configs.

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

fn parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr + ToString,
    <T as FromStr>::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse::<T>()
        .context(format!("Failed to parse {}", key))
}

pub(crate) fn parse_usize(key: &str, default: usize) -> Result<usize> {
    parse(key, default)
}

pub(crate) fn parse_u32(key: &str, default: u32) -> Result<u32> {
    parse(key, default)
}

pub(crate) fn parse_u64(key: &str, default: u64) -> Result<u64> {
    parse(key, default)
}

pub(crate) fn parse_i64(key: &str, default: i64) -> Result<i64> {
    parse(key, default)
}

pub(crate) fn parse_f64(key: &str, default: f64) -> Result<f64> {
    parse(key, default)
}

pub(crate) fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<bool>()
        .unwrap_or(default)
}

pub(crate) fn parse_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Comma separated list, blanks dropped.
pub(crate) fn parse_list(key: &str, default: &str) -> Vec<String> {
    split_list(&parse_string(key, default))
}

pub(crate) fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Comma separated floats.
pub(crate) fn parse_f64_list(key: &str, default: &[f64]) -> Result<Vec<f64>> {
    match env::var(key) {
        Ok(raw) => split_list(&raw)
            .iter()
            .map(|s| {
                s.parse::<f64>()
                    .context(format!("Failed to parse {} entry '{}'", key, s))
            })
            .collect(),
        Err(_) => Ok(default.to_vec()),
    }
}
