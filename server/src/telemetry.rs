//! Tracing subscriber setup.

use crate::config::AppEnv;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set.
#[must_use]
pub const fn default_directives(env: AppEnv) -> &'static str {
    match env {
        AppEnv::Local => "msgflow=debug,tower_http=debug,sqlx=debug",
        AppEnv::Production => "msgflow=info,tower_http=info",
    }
}

/// Install the global subscriber: JSON lines in production, readable text
/// locally. `RUST_LOG` overrides the default filter.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init(env: AppEnv) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(env)));

    let registry = tracing_subscriber::registry().with(filter);

    match env {
        AppEnv::Production => registry.with(fmt::layer().json()).try_init()?,
        AppEnv::Local => registry.with(fmt::layer()).try_init()?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_logs_at_info() {
        assert_eq!(
            default_directives(AppEnv::Production),
            "msgflow=info,tower_http=info"
        );
    }

    #[test]
    fn local_logs_sql_statements() {
        assert!(default_directives(AppEnv::Local).contains("sqlx=debug"));
        assert!(!default_directives(AppEnv::Production).contains("sqlx"));
    }

    #[test]
    fn directives_parse() {
        for env in [AppEnv::Local, AppEnv::Production] {
            assert!(EnvFilter::try_new(default_directives(env)).is_ok());
        }
    }
}
