use std::ffi::OsStr;
use std::time::Duration;

use crate::exec::JoinPolicy;
use crate::pre::*;

/// Per-bridge configuration
///
/// The default is strict lockstep for iterators (one step on the worker per `next`),
/// and the default [`JoinPolicy`] for each kind of bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Config {
    /// How many items the worker may produce ahead of the consumer's demand.
    ///
    /// Only used when iterating. `Some(0)` means one step per pull.
    /// `None` means the worker runs freely without waiting for the consumer.
    pub max_buffered: Option<usize>,
    /// How closing waits for the worker, `None` to use the default
    /// for the kind of bridge
    pub join: Option<JoinPolicy>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_buffered: Some(0),
            join: None,
        }
    }
}

impl Config {
    /// Load config from environment variables, using defaults for the ones not set
    ///
    /// - `ATHREAD_MAX_BUFFERED`: an integer, or `unbounded`
    /// - `ATHREAD_JOIN_TIMEOUT_MS`: wait up to this many milliseconds when closing
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Self::default();
        let max_buffered = env_var("ATHREAD_MAX_BUFFERED")?;
        if !max_buffered.is_empty() {
            config.max_buffered = parse_max_buffered(&max_buffered)?;
        }
        let timeout = env_var("ATHREAD_JOIN_TIMEOUT_MS")?;
        if !timeout.is_empty() {
            config.join = Some(parse_join_timeout(&timeout)?);
        }
        Ok(config)
    }
}

fn parse_max_buffered(value: &str) -> crate::Result<Option<usize>> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("unbounded") {
        return Ok(None);
    }
    let n = crate::check!(
        value.parse::<usize>(),
        "invalid ATHREAD_MAX_BUFFERED: '{value}'"
    )?;
    Ok(Some(n))
}

fn parse_join_timeout(value: &str) -> crate::Result<JoinPolicy> {
    let value = value.trim();
    let ms = crate::check!(
        value.parse::<u64>(),
        "invalid ATHREAD_JOIN_TIMEOUT_MS: '{value}'"
    )?;
    Ok(JoinPolicy::Timeout(Duration::from_millis(ms)))
}

/// Like [`std::env::var`], but treat not-set as empty string.
fn env_var(var: impl AsRef<OsStr>) -> crate::Result<String> {
    let var = var.as_ref();
    crate::trace!("reading env var '{}'", var.display());
    match std::env::var(var) {
        Ok(v) => Ok(v),
        Err(std::env::VarError::NotPresent) => Ok(String::new()),
        Err(e) => {
            crate::rethrow!(e, "failed to read env var '{}'", var.display());
        }
    }
}
