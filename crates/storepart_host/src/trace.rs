//! Log output setup.
//!
//! Filtering follows `RUST_LOG`, e.g. `RUST_LOG=storepart=debug` to see every
//! reduction, or `RUST_LOG='[effect{routine="todo.load"}]=debug'` to follow a
//! single effect routine.

use std::str::FromStr;

use derive_more::Display;
use thiserror::Error;
use tracing_subscriber::{
    filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry,
};

/// Error setting up log output.
#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum TraceError {
    #[error(transparent)]
    SetGlobal(#[from] tracing_subscriber::util::TryInitError),
    #[error(transparent)]
    BadDirective(#[from] tracing_subscriber::filter::ParseError),
}

/// The kind of log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Output {
    /// Regular logging (default)
    Log,
    /// More compact version of above
    Compact,
    /// One json object per event
    Json,
    /// No logging
    None,
}

impl Default for Output {
    fn default() -> Self {
        Output::Log
    }
}

impl FromStr for Output {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Log" => Ok(Output::Log),
            "Compact" => Ok(Output::Compact),
            "Json" => Ok(Output::Json),
            "None" => Ok(Output::None),
            _ => Err(format!("Could not parse log output type {:?}", s)),
        }
    }
}

/// Filter from `RUST_LOG`, showing warnings and errors when it is unset.
pub fn standard_filter() -> Result<EnvFilter, TraceError> {
    Ok(match std::env::var("RUST_LOG") {
        Ok(directives) => EnvFilter::try_new(directives)?,
        Err(_) => EnvFilter::default().add_directive("warn".parse()?),
    })
}

/// Install a global subscriber writing to stderr.
pub fn init_fmt(output: Output) -> Result<(), TraceError> {
    let filter = standard_filter()?;
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_target(true);
    match output {
        Output::Log => Registry::default()
            .with(layer.with_filter(filter))
            .try_init()?,
        Output::Compact => Registry::default()
            .with(layer.compact().with_filter(filter))
            .try_init()?,
        Output::Json => Registry::default()
            .with(layer.json().with_filter(filter))
            .try_init()?,
        Output::None => (),
    }
    Ok(())
}

/// Run logging in a test.
///
/// RUST_LOG must be set or this is a no-op. Calling it again once a
/// subscriber is installed is fine.
pub fn test_run() -> Result<(), TraceError> {
    if std::env::var_os("RUST_LOG").is_none() {
        return Ok(());
    }
    match init_fmt(Output::Log) {
        Err(TraceError::SetGlobal(_)) => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Log" => Ok(Output::Log))]
    #[test_case("Compact" => Ok(Output::Compact))]
    #[test_case("Json" => Ok(Output::Json))]
    #[test_case("None" => Ok(Output::None))]
    fn parses_output(s: &str) -> Result<Output, String> {
        s.parse()
    }

    #[test]
    fn unknown_output_is_rejected() {
        assert!("Flame".parse::<Output>().is_err());
        assert_eq!(Output::Compact.to_string(), "Compact");
    }
}
