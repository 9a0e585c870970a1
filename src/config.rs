use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

use crate::commandline::CliArgs;

fn default_device_name() -> String {
    if cfg!(target_os = "windows") {
        String::from("COM1")
    } else {
        String::from("/dev/ttyUSB0")
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    humantime::parse_duration(&text).map_err(serde::de::Error::custom)
}

/// Settings of the RS485 link and the addressed device.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LinkConfig {
    #[serde(default = "default_device_name")]
    pub device: String,
    #[serde(default = "LinkConfig::default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "LinkConfig::default_address")]
    pub address: u8,
    #[serde(
        default = "LinkConfig::default_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub timeout: Duration,
    #[serde(
        default = "LinkConfig::default_delay",
        deserialize_with = "deserialize_duration"
    )]
    pub delay: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            device: default_device_name(),
            baud_rate: Self::default_baud_rate(),
            address: Self::default_address(),
            timeout: Self::default_timeout(),
            delay: Self::default_delay(),
        }
    }
}

impl LinkConfig {
    fn default_baud_rate() -> u32 {
        38400
    }

    fn default_address() -> u8 {
        1
    }

    fn default_timeout() -> Duration {
        mksservo_lib::client::DEFAULT_TIMEOUT
    }

    fn default_delay() -> Duration {
        Duration::from_millis(15)
    }

    pub fn load(path: &str) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Cannot open config file '{path}'"))?;
        serde_yaml::from_reader(file).with_context(|| format!("Cannot parse config file '{path}'"))
    }

    /// Config file (or defaults) overridden by explicit command line options.
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(device) = &args.device {
            config.device = device.clone();
        }
        if let Some(baud_rate) = args.baud_rate {
            config.baud_rate = baud_rate;
        }
        if let Some(address) = args.address {
            config.address = address;
        }
        if let Some(timeout) = args.timeout {
            config.timeout = timeout;
        }
        if let Some(delay) = args.delay {
            config.delay = delay;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn load_partial_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "device: /dev/ttyUSB3\nbaud_rate: 9600\ntimeout: 1s 200ms").unwrap();
        let config = LinkConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.device, "/dev/ttyUSB3");
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.address, 1);
        assert_eq!(config.timeout, Duration::from_millis(1200));
        assert_eq!(config.delay, Duration::from_millis(15));
    }

    #[test]
    fn reject_unknown_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "baudrate: 9600").unwrap();
        assert!(LinkConfig::load(file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn command_line_wins() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "address: 3\ndelay: 40ms").unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let args = CliArgs::parse_from([
            "mksservo",
            "--config",
            path.as_str(),
            "--address",
            "0x05",
            "read-io",
        ]);
        let config = LinkConfig::from_args(&args).unwrap();
        assert_eq!(config.address, 5);
        assert_eq!(config.delay, Duration::from_millis(40));
        assert_eq!(config.baud_rate, 38400);
    }
}
