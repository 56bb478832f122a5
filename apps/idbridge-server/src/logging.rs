//! One JSON object per log line on stdout.
//!
//! The directive string comes from [`Config`](crate::config::Config), which has
//! already resolved `RUST_LOG` against its default, so the environment is not
//! consulted again here.

use tracing_subscriber::filter::ParseError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Parse `directives` such as `"info,idbridge_scim_client=debug"`.
pub fn log_filter(directives: &str) -> Result<EnvFilter, ParseError> {
    EnvFilter::try_new(directives.trim())
}

/// Install the global subscriber. Bad directives are fatal at startup.
pub fn init_logging(directives: &str) {
    let filter = match log_filter(directives) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("FATAL: Invalid RUST_LOG directives {directives:?}: {e}");
            std::process::exit(1);
        }
    };

    // Flattened so sync and SAML fields sit beside `message`.
    let json = fmt::layer()
        .json()
        .flatten_event(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(false);

    tracing_subscriber::registry().with(json).with(filter).init();

    tracing::info!(directives = %directives, "Logging initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_and_per_crate_directives_parse() {
        assert!(log_filter("info").is_ok());
        assert!(log_filter(" info,idbridge_scim_client=debug,idbridge_api_saml=warn ").is_ok());
    }

    #[test]
    fn test_malformed_directive_is_rejected() {
        assert!(log_filter("idbridge_scim_client=loud").is_err());
    }
}
