//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::config::MnemosConfig;

/// Install a formatted tracing subscriber.
///
/// `RUST_LOG` takes precedence; `default_level` applies when it is unset or
/// unparsable. Returns `false` if a global subscriber was already installed,
/// which makes repeated calls (e.g. from several tests) harmless.
pub fn init_tracing(default_level: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}

/// [`init_tracing`] with `general.log_level` from `config` as the default.
pub fn init_tracing_from_config(config: &MnemosConfig) -> bool {
    init_tracing(&config.general.log_level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing("debug");
        assert!(!init_tracing("info"));
    }

    #[test]
    fn test_init_tracing_from_config() {
        let mut config = MnemosConfig::default();
        config.general.log_level = "mnemos_core=trace,warn".to_string();
        init_tracing_from_config(&config);
        assert!(!init_tracing_from_config(&config));
    }
}
