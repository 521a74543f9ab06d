//! CLI error types and exit codes

use thiserror::Error;

/// Errors raised by the CLI itself, before the credential lifecycle starts.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias using CLI Error
pub type Result<T> = std::result::Result<T, Error>;

/// Exit code for an invocation that failed with `err`.
///
/// | code | cause                               |
/// |------|-------------------------------------|
/// | 2    | configuration or environment        |
/// | 3    | assertion signing                   |
/// | 4    | token endpoint rejected the request |
/// | 5    | transport failure or bad response   |
/// | 6    | token cache read/write              |
/// | 1    | anything else                       |
pub fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<interop_auth::Error>() {
            return match e {
                interop_auth::Error::InvalidEnvironment(_) => 2,
                interop_auth::Error::Signing(_) => 3,
                interop_auth::Error::TokenExchange { .. } => 4,
                interop_auth::Error::Network(_)
                | interop_auth::Error::InvalidResponse(_)
                | interop_auth::Error::InvalidUrl(_) => 5,
                interop_auth::Error::CacheRead(_) | interop_auth::Error::CacheWrite(_) => 6,
            };
        }
        if cause.downcast_ref::<Error>().is_some() {
            return 2;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::*;

    #[test]
    fn error_display_includes_context() {
        let err = Error::Config("no [test] table".into());
        assert_eq!(err.to_string(), "Configuration error: no [test] table");
    }

    #[test]
    fn exit_codes_follow_root_cause_through_context() {
        let cases = [
            (interop_auth::Error::Signing("bad key".into()), 3),
            (
                interop_auth::Error::TokenExchange {
                    status: 401,
                    body: String::new(),
                },
                4,
            ),
            (interop_auth::Error::Network("refused".into()), 5),
            (interop_auth::Error::InvalidUrl("x".into()), 5),
            (interop_auth::Error::CacheWrite("denied".into()), 6),
            (interop_auth::Error::CacheRead("corrupt".into()), 6),
            (interop_auth::Error::InvalidEnvironment("dev".into()), 2),
        ];
        for (inner, expected) in cases {
            let err = Err::<(), _>(inner)
                .context("failed to obtain access token")
                .unwrap_err();
            assert_eq!(exit_code(&err), expected, "for {err:#}");
        }
    }

    #[test]
    fn config_errors_and_unknown_errors() {
        let config = anyhow::Error::new(Error::Config("missing".into())).context("loading");
        assert_eq!(exit_code(&config), 2);

        let other = anyhow::anyhow!("something else");
        assert_eq!(exit_code(&other), 1);
    }
}
