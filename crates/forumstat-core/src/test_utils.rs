//! Shared helpers for unit tests inside forumstat-core
//!
//! Integration tests in the workspace root keep their own helpers in
//! `tests/common/mod.rs`; this module is only compiled for unit tests.

use chrono::{TimeZone, Utc};
use once_cell::sync::Lazy;
use std::env;

/// Serializes tests that touch process environment variables
pub static ENV_MUTEX: Lazy<tokio::sync::Mutex<()>> = Lazy::new(|| tokio::sync::Mutex::new(()));

/// Epoch milliseconds of a UTC wall-clock time
pub fn utc_ms(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> i64 {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, second)
        .unwrap()
        .timestamp_millis()
}

/// Restores every environment variable it touched when dropped
#[derive(Default)]
pub struct EnvVarGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvVarGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.saved.push((key.to_string(), env::var(key).ok()));
        // SAFETY: callers hold ENV_MUTEX, so no other test thread touches the environment
        unsafe {
            env::set_var(key, value);
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.saved.push((key.to_string(), env::var(key).ok()));
        // SAFETY: see `set`
        unsafe {
            env::remove_var(key);
        }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        for (key, value) in self.saved.iter().rev() {
            // SAFETY: see `set`
            unsafe {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
