use std::time::Duration as StdDuration;

use chrono::{FixedOffset, NaiveTime, Offset, Utc};
use thiserror::Error;

use crate::capacity::Venue;

const DEFAULT_VENUES: &str = "1:Pobediteley Ave 85:5,2:Dzerzhinskogo Ave 9:5";
const MAX_BUFFER_MINUTES: i64 = 24 * 60;
const MAX_RETENTION_DAYS: i64 = 3650;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Business constants shared by every availability decision. Both the
/// read-only check and the booking path read from the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingRules {
    pub closing_time: NaiveTime,
    pub buffer_minutes: i64,
    pub retention_days: i64,
    pub utc_offset: FixedOffset,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            closing_time: NaiveTime::from_hms_opt(23, 0, 0).unwrap_or(NaiveTime::MIN),
            buffer_minutes: 60,
            retention_days: 3,
            utc_offset: FixedOffset::east_opt(3 * 3600).unwrap_or_else(|| Utc.fix()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmqpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub queue: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub venues: Vec<Venue>,
    pub rules: BookingRules,
    pub sweep_interval: StdDuration,
    pub amqp: Option<AmqpConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let defaults = BookingRules::default();
        let closing_time = match get("CLOSING_TIME") {
            Some(raw) => NaiveTime::parse_from_str(&raw, "%H:%M")
                .map_err(|e| invalid("CLOSING_TIME", &raw, e.to_string()))?,
            None => defaults.closing_time,
        };
        let utc_offset = match get("VENUE_UTC_OFFSET_MINUTES") {
            Some(raw) => {
                let minutes: i32 = parse_number("VENUE_UTC_OFFSET_MINUTES", &raw)?;
                minutes
                    .checked_mul(60)
                    .and_then(FixedOffset::east_opt)
                    .ok_or_else(|| invalid("VENUE_UTC_OFFSET_MINUTES", &raw, "offset out of range"))?
            }
            None => defaults.utc_offset,
        };
        let rules = BookingRules {
            closing_time,
            buffer_minutes: optional_number(&get, "BOOKING_BUFFER_MINUTES", defaults.buffer_minutes)?,
            retention_days: optional_number(&get, "RETENTION_DAYS", defaults.retention_days)?,
            utc_offset,
        };
        if !(0..=MAX_BUFFER_MINUTES).contains(&rules.buffer_minutes) {
            return Err(invalid(
                "BOOKING_BUFFER_MINUTES",
                &rules.buffer_minutes.to_string(),
                format!("must be between 0 and {}", MAX_BUFFER_MINUTES),
            ));
        }
        if !(0..=MAX_RETENTION_DAYS).contains(&rules.retention_days) {
            return Err(invalid(
                "RETENTION_DAYS",
                &rules.retention_days.to_string(),
                format!("must be between 0 and {}", MAX_RETENTION_DAYS),
            ));
        }

        let venues = parse_venues(&get("VENUES").unwrap_or_else(|| DEFAULT_VENUES.to_string()))?;

        let amqp = match get("AMQP_HOST") {
            Some(host) => Some(AmqpConfig {
                host,
                port: optional_number(&get, "AMQP_PORT", 5672)?,
                username: get("AMQP_USER").unwrap_or_else(|| "guest".to_string()),
                password: get("AMQP_PASSWORD").unwrap_or_else(|| "guest".to_string()),
                queue: get("NOTIFY_QUEUE").unwrap_or_else(|| "reservations.new".to_string()),
            }),
            None => None,
        };

        let sweep_secs: u64 = optional_number(&get, "SWEEP_INTERVAL_SECS", 3600)?;
        if sweep_secs == 0 {
            return Err(invalid("SWEEP_INTERVAL_SECS", "0", "must be positive"));
        }

        Ok(Config {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: optional_number(&get, "PORT", 8080)?,
            database_url: get("DATABASE_URL"),
            venues,
            rules,
            sweep_interval: StdDuration::from_secs(sweep_secs),
            amqp,
        })
    }
}

fn parse_number<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| invalid(key, raw, e.to_string()))
}

fn optional_number<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => parse_number(key, &raw),
        None => Ok(default),
    }
}

/// Parses `id:address:tables` entries separated by commas.
pub fn parse_venues(raw: &str) -> Result<Vec<Venue>, ConfigError> {
    let mut venues: Vec<Venue> = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
        let (id, address, tables) = match parts.as_slice() {
            [id, address, tables] => (*id, *address, *tables),
            _ => return Err(invalid("VENUES", entry, "expected id:address:tables")),
        };
        let venue = Venue {
            id: parse_number("VENUES", id)?,
            address: address.to_string(),
            tables: parse_number("VENUES", tables)?,
        };
        if venues.iter().any(|v| v.id == venue.id) {
            return Err(invalid("VENUES", entry, "duplicate venue id"));
        }
        venues.push(venue);
    }
    if venues.is_empty() {
        return Err(invalid("VENUES", raw, "at least one venue is required"));
    }
    Ok(venues)
}
