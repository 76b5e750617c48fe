use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use toolgate::{
    CompositeToken, ConnectorTokenSet, GateSettings, config::resolve_config_path, start_http,
};

#[derive(Parser)]
#[command(name = "toolgate")]
#[command(about = "Authentication gate for MCP tool servers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gated MCP HTTP server
    Serve {
        /// Bind address, e.g. 0.0.0.0:3942
        #[arg(long, default_value = "0.0.0.0:3942")]
        bind: String,
        /// Path to auth.json
        #[arg(long, env = "TOOLGATE_CONFIG")]
        config: Option<PathBuf>,
        /// Verbose auth diagnostics (never logs secret values)
        #[arg(long, env = "TOOLGATE_DEBUG", default_value_t = false)]
        debug: bool,
        /// Shared server secret; adds a secret provider after configured ones
        #[arg(long, env = "TOOLGATE_SERVER_SECRET")]
        server_secret: Option<String>,
        /// Comma-separated static API keys; adds an api_key provider
        #[arg(long, env = "TOOLGATE_API_KEYS", value_delimiter = ',')]
        api_keys: Vec<String>,
    },
    /// Print a composite bearer token for clients and tests
    MintToken {
        #[arg(long, env = "TOOLGATE_SERVER_SECRET")]
        secret: Option<String>,
        /// Compact JWT identifying the user
        #[arg(long)]
        id_token: Option<String>,
        /// Connector token as name=token (repeatable)
        #[arg(long = "connector", value_parser = parse_connector)]
        connectors: Vec<(String, String)>,
    },
}

fn parse_connector(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, token)) if !name.is_empty() && !token.is_empty() => {
            Ok((name.to_string(), token.to_string()))
        }
        _ => Err(format!("expected name=token, got '{}'", raw)),
    }
}

fn crate_directive(debug: bool) -> &'static str {
    if debug { "toolgate=debug" } else { "toolgate=info" }
}

fn init_tracing(debug: bool) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(crate_directive(debug).parse()?)
                .add_directive("rmcp=warn".parse()?),
        )
        .init();
    Ok(())
}

/// Settings plus the config file they came from, if any. Runs before tracing
/// is initialised, since the file may turn debug on.
fn load_settings(
    config: Option<PathBuf>,
    server_secret: Option<String>,
    api_keys: Vec<String>,
) -> Result<(GateSettings, Option<PathBuf>)> {
    let api_keys: Vec<String> = api_keys.into_iter().filter(|k| !k.is_empty()).collect();
    let have_inline = server_secret.is_some() || !api_keys.is_empty();

    let path = match config {
        Some(path) => Some(path),
        None => match resolve_config_path() {
            Ok(path) => Some(path),
            Err(e) if !have_inline => return Err(e),
            Err(_) => None,
        },
    };

    let mut settings = match &path {
        Some(path) => GateSettings::load(path)?,
        None => GateSettings::default(),
    };
    settings
        .providers
        .extend(GateSettings::from_secret_and_keys(server_secret, api_keys).providers);
    Ok((settings, path))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            bind,
            config,
            debug,
            server_secret,
            api_keys,
        } => {
            let (settings, path) = load_settings(config, server_secret, api_keys)?;
            let debug = debug || settings.debug;
            init_tracing(debug)?;
            if let Some(path) = path {
                info!("Loaded auth config from {}", path.display());
            }
            start_http(settings.with_debug(debug), &bind).await?;
        }
        Commands::MintToken {
            secret,
            id_token,
            connectors,
        } => {
            let token = CompositeToken {
                server_secret: secret,
                user_id_token: id_token,
                connector_access_tokens: connectors.into_iter().collect::<ConnectorTokenSet>(),
            };
            println!("{}", token.encode());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_file_debug_raises_log_level() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"debug": true, "providers": [{{"type": "secret", "secret": "s"}}]}}"#
        )
        .unwrap();

        let (settings, path) =
            load_settings(Some(file.path().to_path_buf()), None, Vec::new()).unwrap();
        assert!(settings.debug);
        assert_eq!(path.as_deref(), Some(file.path()));
        assert_eq!(crate_directive(settings.debug), "toolgate=debug");
        assert_eq!(crate_directive(false), "toolgate=info");
    }

    #[test]
    fn test_inline_providers_follow_file_providers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"providers": [{{"type": "secret", "secret": "s"}}]}}"#).unwrap();

        let (settings, _) = load_settings(
            Some(file.path().to_path_buf()),
            Some("inline".to_string()),
            vec!["k1".to_string(), String::new()],
        )
        .unwrap();
        let kinds: Vec<_> = settings.providers.iter().map(|p| p.kind()).collect();
        assert_eq!(kinds, vec!["secret", "secret", "api_key"]);
    }

    #[test]
    fn test_parse_connector() {
        assert_eq!(
            parse_connector("google=g-token").unwrap(),
            ("google".to_string(), "g-token".to_string())
        );
        assert!(parse_connector("google").is_err());
        assert!(parse_connector("=t").is_err());
    }
}
