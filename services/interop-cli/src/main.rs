//! Interoperability platform CLI
//!
//! Single invocation:
//! 1. Loads the environment profile from the TOML config
//! 2. Reuses the cached access token if still valid, otherwise signs a JWT
//!    client assertion and exchanges it at the token endpoint
//! 3. Optionally saves the new token to the cache file
//! 4. Calls the status and/or API URL with the token and prints the JSON body

mod cli;
mod config;
mod error;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use interop_auth::{ApiResponse, Session, TokenCache};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, parse_filters};
use crate::config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = error::exit_code(&e);
            error!(error = %format!("{e:#}"), exit_code = code, "invocation failed");
            eprintln!("error: {e:#}");
            ExitCode::from(code)
        }
    }
}

/// Logs go to stderr so stdout carries only response bodies.
///
/// `--debug` forces debug output for this workspace's crates; otherwise
/// LOG_LEVEL / RUST_LOG apply, defaulting to warnings only.
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("warn,interop_auth=debug,interop_cli=debug")
    } else {
        EnvFilter::try_from_env("LOG_LEVEL")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let output = run_collect(&cli, Config::private_key_from_env()).await?;
    for body in output {
        println!("{body}");
    }
    Ok(())
}

/// Execute the invocation and return the rendered response bodies in call
/// order (status first, then API).
///
/// `private_key` overrides the profile's key file when set.
async fn run_collect(cli: &Cli, private_key: Option<String>) -> Result<Vec<String>> {
    info!(?cli, "parsed arguments");

    let config_path = Config::resolve_path(cli.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let profile = config
        .profile(cli.env, private_key)
        .with_context(|| format!("failed to build {} profile", cli.env))?;
    info!(
        environment = %profile.environment,
        client_id = %profile.client_id,
        kid = %profile.key_id,
        token_endpoint = profile.token_endpoint(),
        "profile loaded"
    );

    let transport = config.transport(!cli.no_verify_ssl);
    let cache = TokenCache::new(&cli.token_file).strict(cli.strict_cache);

    let session = Session::new(profile, &transport, cache)?
        .persist(cli.save)
        .establish()
        .await
        .context("failed to obtain access token")?;
    info!(source = ?session.source(), "access token ready");

    let mut output = Vec::new();

    if let Some(ref url) = cli.status_url {
        let response = session
            .status(url)
            .await
            .with_context(|| format!("status request to {url} failed"))?;
        output.push(render(&response, cli.pretty)?);
    }

    if let Some(ref url) = cli.api_url {
        let filters = cli
            .api_url_filters
            .as_deref()
            .map(parse_filters)
            .unwrap_or_default();
        let response = session
            .request(url, &filters)
            .await
            .with_context(|| format!("API request to {url} failed"))?;
        output.push(render(&response, cli.pretty)?);
    }

    Ok(output)
}

fn render(response: &ApiResponse, pretty: bool) -> Result<String> {
    if !(200..300).contains(&response.status) {
        warn!(status = response.status, "request returned non-success status");
    }
    let body = if pretty {
        serde_json::to_string_pretty(&response.body)?
    } else {
        serde_json::to_string(&response.body)?
    };
    Ok(body)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::Path;

    use axum::Form;
    use axum::http::{HeaderMap, StatusCode, Uri};
    use axum::routing::{get, post};
    use tokio::net::TcpListener;

    use super::*;

    fn fixture_key() -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../crates/interop-auth/tests/fixtures/rsa_pkcs8.pem")
    }

    /// Mock platform: `/token` issues `T` for any three-segment assertion,
    /// `/status` and `/api` echo the bearer token and query string.
    async fn start_platform() -> String {
        let echo = |headers: HeaderMap, uri: Uri| async move {
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_owned();
            axum::Json(serde_json::json!({
                "authorization": auth,
                "query": uri.query().unwrap_or(""),
            }))
        };

        let app = axum::Router::new()
            .route(
                "/token",
                post(|Form(form): Form<HashMap<String, String>>| async move {
                    let assertion = form.get("client_assertion").cloned().unwrap_or_default();
                    if assertion.split('.').count() != 3 {
                        return (StatusCode::BAD_REQUEST, axum::Json(serde_json::json!({})));
                    }
                    (
                        StatusCode::OK,
                        axum::Json(serde_json::json!({"access_token": "T", "expires_in": 60})),
                    )
                }),
            )
            .route("/status", get(echo))
            .route("/api", get(echo));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn write_config(dir: &Path, base: &str) -> std::path::PathBuf {
        let path = dir.join("interop.toml");
        let toml = format!(
            r#"
[test]
key_id = "kid"
issuer = "issuer"
client_id = "client"
purpose_id = "purpose"
private_key_path = "{}"
token_endpoint = "{base}/token"
"#,
            fixture_key().display()
        );
        std::fs::write(&path, toml).unwrap();
        path
    }

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["interop-cli"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[tokio::test]
    async fn full_invocation_exchanges_saves_and_calls() {
        let base = start_platform().await;
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path(), &base);
        let token_file = dir.path().join("tmp").join("token.json");

        let cli = cli(&[
            "--config",
            config.to_str().unwrap(),
            "--env",
            "test",
            "--token-file",
            token_file.to_str().unwrap(),
            "--status-url",
            &format!("{base}/status"),
            "--api-url",
            &format!("{base}/api?limit=1"),
            "--api-url-filters",
            "limit=5&state=ACTIVE",
            "--save",
        ]);
        let output = run_collect(&cli, None).await.unwrap();

        assert_eq!(output.len(), 2);
        let status: serde_json::Value = serde_json::from_str(&output[0]).unwrap();
        assert_eq!(status["authorization"], "Bearer T");
        let api: serde_json::Value = serde_json::from_str(&output[1]).unwrap();
        assert_eq!(api["query"], "limit=5&state=ACTIVE");

        let cached = TokenCache::new(&token_file).load().await.unwrap().unwrap();
        assert_eq!(cached.token.expose(), "T");
    }

    #[tokio::test]
    async fn unconfigured_environment_maps_to_config_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path(), "http://127.0.0.1:9");
        let cli = cli(&["--config", config.to_str().unwrap(), "--env", "production"]);

        let err = run_collect(&cli, None).await.unwrap_err();
        assert_eq!(error::exit_code(&err), 2, "got: {err:#}");
    }

    #[test]
    fn render_compact_and_pretty() {
        let response = ApiResponse {
            status: 200,
            body: serde_json::json!({"a": 1}),
        };
        assert_eq!(render(&response, false).unwrap(), r#"{"a":1}"#);
        assert_eq!(render(&response, true).unwrap(), "{\n  \"a\": 1\n}");
    }
}
