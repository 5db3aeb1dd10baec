use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::FixedOffset;

use crate::engine::{BookingPolicy, EngineError, PastCutoff, SlotFit, SlotGrid};

#[derive(Debug)]
pub enum ConfigError {
    Invalid { var: &'static str, value: String },
    Policy(EngineError),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { var, value } => write!(f, "invalid value for {var}: {value:?}"),
            ConfigError::Policy(e) => write!(f, "invalid booking policy: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<EngineError> for ConfigError {
    fn from(e: EngineError) -> Self {
        ConfigError::Policy(e)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub tenants: Vec<String>,
    pub metrics_port: Option<u16>,
    pub compact_threshold: u64,
    pub reminder_every: Duration,
    pub policy: BookingPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source. Unset means default; malformed is an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = lookup("GYMSLOT_DATA_DIR").unwrap_or_else(|| "./data".into());
        let tenants: Vec<String> = lookup("GYMSLOT_TENANTS")
            .unwrap_or_else(|| "default".into())
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if tenants.is_empty() {
            return Err(ConfigError::Invalid {
                var: "GYMSLOT_TENANTS",
                value: String::new(),
            });
        }

        let metrics_port = lookup("GYMSLOT_METRICS_PORT")
            .map(|v| parse_value("GYMSLOT_METRICS_PORT", v))
            .transpose()?;
        let compact_threshold = parsed(&lookup, "GYMSLOT_COMPACT_THRESHOLD", 1000)?;
        let reminder_secs: u64 = parsed(&lookup, "GYMSLOT_REMINDER_INTERVAL_SECS", 3600)?;
        if reminder_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "GYMSLOT_REMINDER_INTERVAL_SECS",
                value: "0".into(),
            });
        }

        let offset_minutes: i32 = parsed(&lookup, "GYMSLOT_UTC_OFFSET_MINUTES", 0)?;
        let offset = offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or(ConfigError::Invalid {
                var: "GYMSLOT_UTC_OFFSET_MINUTES",
                value: offset_minutes.to_string(),
            })?;

        let grid = SlotGrid::new(
            parsed(&lookup, "GYMSLOT_SLOT_START_HOUR", 6)?,
            parsed(&lookup, "GYMSLOT_SLOT_END_HOUR", 21)?,
            parsed(&lookup, "GYMSLOT_SLOT_STEP_MINUTES", 60)?,
        )?;

        let fit = match lookup("GYMSLOT_SLOT_FIT").as_deref() {
            None | Some("hour") => SlotFit::HourWindow,
            Some("full") => SlotFit::FullSession,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "GYMSLOT_SLOT_FIT",
                    value: other.into(),
                });
            }
        };
        let cutoff = match lookup("GYMSLOT_PAST_CUTOFF").as_deref() {
            None | Some("hour") => PastCutoff::SameHour,
            Some("exact") => PastCutoff::Exact,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "GYMSLOT_PAST_CUTOFF",
                    value: other.into(),
                });
            }
        };

        let policy = BookingPolicy {
            grid,
            horizon_days: parsed(&lookup, "GYMSLOT_HORIZON_DAYS", 14)?,
            session_minutes: parsed(&lookup, "GYMSLOT_SESSION_MINUTES", 60)?,
            buffer_minutes: parsed(&lookup, "GYMSLOT_BUFFER_MINUTES", 0)?,
            fit,
            cutoff,
            offset,
        };
        policy.validate()?;

        Ok(Self {
            data_dir: PathBuf::from(data_dir),
            tenants,
            metrics_port,
            compact_threshold,
            reminder_every: Duration::from_secs(reminder_secs),
            policy,
        })
    }
}

fn parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        Some(v) => parse_value(var, v),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { var, value })
}
