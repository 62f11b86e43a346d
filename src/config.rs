use sentry::types::Dsn;
use std::env;
use std::str::FromStr;
use url::Url;

const DEFAULT_DEVICE_PORT: &str = "/dev/ttyUSB0";
const DEFAULT_BAUD_RATE: u32 = 19200;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct StationConfig {
    pub device_port: String,
    pub baud_rate: u32,
    pub server_url: Url,
    pub poll_interval_secs: u64,
    /// Warnings and errors are also reported here when set
    pub sentry_dsn: Option<Dsn>,
}

impl StationConfig {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        // Load environment variables
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, Box<dyn std::error::Error>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let device_port =
            lookup("WEATHER_DEVICE_PORT").unwrap_or_else(|| DEFAULT_DEVICE_PORT.to_string());

        let server_url = lookup("WEATHER_SERVER_URL")
            .ok_or("WEATHER_SERVER_URL environment variable not set")?;
        let server_url = Url::parse(server_url.trim())
            .map_err(|e| format!("WEATHER_SERVER_URL is not a valid URL: {}", e))?;

        let baud_rate = parse_or(&lookup, "WEATHER_BAUD_RATE", DEFAULT_BAUD_RATE)?;
        let poll_interval_secs =
            parse_or(&lookup, "WEATHER_POLL_INTERVAL", DEFAULT_POLL_INTERVAL_SECS)?;

        // An empty value disables error reporting, same as leaving it unset
        let sentry_dsn = lookup("WEATHER_SENTRY_DSN")
            .filter(|dsn| !dsn.trim().is_empty())
            .map(|dsn| dsn.trim().parse::<Dsn>())
            .transpose()
            .map_err(|e| format!("WEATHER_SENTRY_DSN is not a valid DSN: {}", e))?;

        Ok(StationConfig {
            device_port,
            baud_rate,
            server_url,
            poll_interval_secs,
            sentry_dsn,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, Box<dyn std::error::Error>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| format!("{} has invalid value '{}': {}", key, raw, e).into()),
        None => Ok(default),
    }
}
