//! Command-line arguments

use std::path::PathBuf;

use clap::Parser;
use interop_auth::Environment;

#[derive(Debug, Parser)]
#[command(name = "interop-cli")]
#[command(version)]
#[command(
    about = "Obtain an interoperability platform access token with a signed JWT client assertion and call APIs with it"
)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Environment: test or production
    #[arg(long, value_name = "ENV")]
    pub env: Environment,

    /// Status URL to GET with the access token
    #[arg(long, value_name = "URL")]
    pub status_url: Option<String>,

    /// API URL to GET with the access token
    #[arg(long, value_name = "URL")]
    pub api_url: Option<String>,

    /// Query filters merged into --api-url, e.g. "state=ACTIVE&limit=10"
    #[arg(long, value_name = "FILTERS")]
    pub api_url_filters: Option<String>,

    /// Token cache file
    #[arg(long, value_name = "FILE", default_value = "tmp/interop_token.json")]
    pub token_file: PathBuf,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Pretty-print JSON responses
    #[arg(long)]
    pub pretty: bool,

    /// Disable TLS certificate verification (non-production use only)
    #[arg(long = "no-verify-ssl")]
    pub no_verify_ssl: bool,

    /// Save a freshly obtained token to the token cache file
    #[arg(long)]
    pub save: bool,

    /// Fail instead of ignoring a corrupt token cache file
    #[arg(long)]
    pub strict_cache: bool,
}

/// Split `k=v&k2=v2` into pairs. A segment without `=` gets an empty value;
/// empty segments are skipped.
pub fn parse_filters(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.split_once('=') {
            Some((k, v)) => (k.to_owned(), v.to_owned()),
            None => (segment.to_owned(), String::new()),
        })
        .collect()
}
