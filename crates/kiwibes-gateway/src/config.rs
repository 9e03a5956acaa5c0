//! Command-line configuration.
//!
//! Kiwibes has no config file — the entire external configuration
//! surface is the CLI (SPEC_FULL §6, §10.3). `clap` parses the raw
//! argument shapes; range validation beyond what `clap` can express
//! declaratively is done by hand so that each out-of-range value maps
//! to its own `BootError` variant (and therefore its own process exit
//! code), matching the original startup-behavior test fixtures.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use kiwibes_domain::BootError;

/// Fixed knobs that are not exposed on the CLI. Each has exactly one
/// definition site instead of being a magic number scattered through
/// the codebase.
pub mod defaults {
    use super::Duration;

    /// REST listen port (tests use 4242, SPEC_FULL §6).
    pub const REST_PORT: u16 = 4242;
    /// How often AuthGuard re-checks `kiwibes.auth`'s mtime.
    pub const AUTH_POLL_INTERVAL: Duration = Duration::from_secs(2);
    /// Scheduler + watchdog tick period.
    pub const SCHEDULER_TICK: Duration = Duration::from_secs(1);
}

#[derive(Parser, Debug)]
#[command(name = "kiwibesd", about = "Kiwibes automation server")]
struct RawArgs {
    /// Home directory: holds kiwibes.json, kiwibes.auth, kiwibes.data,
    /// kiwibes.crt, kiwibes.key, and the log file.
    home: PathBuf,

    /// Log level: 0 = error, 1 = info, 2 = debug.
    #[arg(short = 'l', default_value_t = 1)]
    log_level: u8,

    /// Maximum log file size in MB, before rotation (1..100).
    #[arg(short = 's', default_value_t = 10)]
    log_max_mb: u32,

    /// Maximum data store size in MB (1..100).
    #[arg(short = 'd', default_value_t = 10)]
    data_max_mb: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub home: PathBuf,
    pub log_level: u8,
    pub log_max_mb: u32,
    pub data_max_mb: u32,
}

impl Config {
    /// Byte cap for the DataStore, derived from `-d`.
    pub fn data_cap_bytes(&self) -> usize {
        self.data_max_mb as usize * 1024 * 1024
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.home.join("kiwibes.json")
    }

    pub fn auth_path(&self) -> PathBuf {
        self.home.join("kiwibes.auth")
    }

    pub fn data_path(&self) -> PathBuf {
        self.home.join("kiwibes.data")
    }

    pub fn cert_path(&self) -> PathBuf {
        self.home.join("kiwibes.crt")
    }

    pub fn key_path(&self) -> PathBuf {
        self.home.join("kiwibes.key")
    }

    pub fn log_path(&self) -> PathBuf {
        self.home.join("kiwibes.log")
    }

    /// Parse `std::env::args()`, validating every field by hand so each
    /// failure mode maps to its own `BootError` / exit code.
    pub fn parse() -> Result<Config, BootError> {
        let raw = RawArgs::try_parse().map_err(|_| BootError::CmdlineParse)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawArgs) -> Result<Config, BootError> {
        if !raw.home.is_dir() {
            return Err(BootError::CmdlineInvHome(raw.home.display().to_string()));
        }
        if raw.log_level > 2 {
            return Err(BootError::CmdlineInvLogLevel);
        }
        if !(1..=100).contains(&raw.log_max_mb) {
            return Err(BootError::CmdlineInvLogMaxSize);
        }
        if !(1..=100).contains(&raw.data_max_mb) {
            return Err(BootError::CmdlineInvDataStoreMaxSize);
        }

        Ok(Config {
            home: raw.home,
            log_level: raw.log_level,
            log_max_mb: raw.log_max_mb,
            data_max_mb: raw.data_max_mb,
        })
    }
}
