use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::AuditConfig;

/// Log targets the engine writes to.
pub const BIAS_MONITORING_TARGET: &str = "bias_monitoring";
pub const MODEL_DECISIONS_TARGET: &str = "model_decisions";

/// Installs the global structured-logging subscriber.
///
/// `RUST_LOG` from the process environment wins; otherwise the configured
/// level applies to this crate and to both engine log targets. Returns
/// `false` if a global subscriber was already installed.
pub fn init_tracing(config: &AuditConfig) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(default_directives(&config.rust_log))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

fn default_directives(level: &str) -> String {
    format!(
        "{}={level},{BIAS_MONITORING_TARGET}={level},{MODEL_DECISIONS_TARGET}={level}",
        env!("CARGO_CRATE_NAME")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_cover_engine_targets() {
        let directives = default_directives("debug");
        assert!(directives.starts_with("audit_engine=debug"));
        assert!(directives.contains("bias_monitoring=debug"));
        assert!(directives.contains("model_decisions=debug"));
    }

    #[test]
    fn test_second_init_is_harmless() {
        let config = AuditConfig::default();
        let _ = init_tracing(&config);
        assert!(!init_tracing(&config));
    }
}
