//! Resolution of the single zone used for bucketing and labels
//!
//! Hour, day and month buckets all start at local wall-clock boundaries, so
//! every stored aggregate depends on which zone was in force when it was
//! built. The zone is picked once per run, in this order:
//!
//! 1. `--utc`
//! 2. `--timezone <name>`
//! 3. `$FORUMSTAT_TIMEZONE`
//! 4. `$TZ`, then the system zone, then UTC
//!
//! An unparsable name from the first three sources is an error. The
//! detected sources fall through silently.

use crate::error::{ForumstatError, Result};
use chrono_tz::Tz;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Environment variable naming the zone when no flag is given
pub const TIMEZONE_ENV: &str = "FORUMSTAT_TIMEZONE";

/// Where the resolved zone came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneSource {
    UtcFlag,
    Flag,
    Env,
    TzVar,
    System,
    Fallback,
}

impl fmt::Display for ZoneSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match self {
            ZoneSource::UtcFlag => "--utc",
            ZoneSource::Flag => "--timezone",
            ZoneSource::Env => TIMEZONE_ENV,
            ZoneSource::TzVar => "TZ",
            ZoneSource::System => "system",
            ZoneSource::Fallback => "fallback",
        };
        f.write_str(source)
    }
}

/// The zone every bucket boundary and label is computed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimezoneConfig {
    pub tz: Tz,
    pub source: ZoneSource,
}

impl Default for TimezoneConfig {
    fn default() -> Self {
        Self::detect()
    }
}

impl TimezoneConfig {
    pub fn utc() -> Self {
        Self {
            tz: Tz::UTC,
            source: ZoneSource::UtcFlag,
        }
    }

    /// Resolve the zone from the `--timezone` and `--utc` flags, then the
    /// environment
    pub fn resolve(flag: Option<&str>, utc: bool) -> Result<Self> {
        if utc {
            return Ok(Self::utc());
        }
        if let Some(name) = flag {
            return Ok(Self {
                tz: parse_zone(name)?,
                source: ZoneSource::Flag,
            });
        }
        if let Ok(name) = std::env::var(TIMEZONE_ENV)
            && !name.is_empty()
        {
            return Ok(Self {
                tz: parse_zone(&name)?,
                source: ZoneSource::Env,
            });
        }
        Ok(Self::detect())
    }

    /// The local zone: `$TZ`, then the operating system, then UTC
    pub fn detect() -> Self {
        if let Ok(name) = std::env::var("TZ")
            && let Ok(tz) = Tz::from_str(&name)
        {
            debug!("Using timezone from TZ: {}", name);
            return Self {
                tz,
                source: ZoneSource::TzVar,
            };
        }

        match iana_time_zone::get_timezone() {
            Ok(name) => match Tz::from_str(&name) {
                Ok(tz) => {
                    debug!("Using system timezone: {}", name);
                    Self {
                        tz,
                        source: ZoneSource::System,
                    }
                }
                Err(_) => {
                    debug!("Unknown system timezone '{}', falling back to UTC", name);
                    Self::fallback()
                }
            },
            Err(e) => {
                debug!("System timezone unavailable: {:?}, falling back to UTC", e);
                Self::fallback()
            }
        }
    }

    fn fallback() -> Self {
        Self {
            tz: Tz::UTC,
            source: ZoneSource::Fallback,
        }
    }

    /// Zone name with its source, e.g. `Asia/Shanghai (from --timezone)`
    pub fn describe(&self) -> String {
        format!("{} (from {})", self.tz.name(), self.source)
    }
}

fn parse_zone(name: &str) -> Result<Tz> {
    Tz::from_str(name).map_err(|_| {
        ForumstatError::InvalidTimezone(format!(
            "'{name}'. Use a name like 'Asia/Shanghai', 'America/New_York', or 'UTC'"
        ))
    })
}
