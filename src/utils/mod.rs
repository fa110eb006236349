//! Shared utilities: logging setup.

use tracing_subscriber::EnvFilter;

/// Builds the log filter: the `RUST_LOG` spec verbatim when present,
/// otherwise `info`.
fn env_filter(spec: Option<&str>) -> EnvFilter {
    match spec {
        Some(spec) => EnvFilter::new(spec),
        None => EnvFilter::new("info"),
    }
}

/// Initializes the global tracing subscriber with an env-filter, defaulting
/// to `info` when `RUST_LOG` is unset. Call once at binary startup.
pub fn init_tracing() {
    let spec = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(spec.as_deref()))
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_spec_defaults_to_info() {
        assert_eq!(env_filter(None).to_string(), "info");
    }

    #[test]
    fn explicit_spec_is_taken_verbatim() {
        // No implicit info directive may ride along with the user's spec.
        assert_eq!(env_filter(Some("warn")).to_string(), "warn");
    }
}
