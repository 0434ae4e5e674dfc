//! Keyvault - encrypted API key vault
//!
//! Stores third-party API keys sealed under a master key, shares them with
//! teams and records every access in an audit log.

use std::env;
use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use keyvault::config::LogFormat;
use keyvault::{api, config, db, services::MasterKey, AppConfig, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    // Check for --help flag
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_help();
        return Ok(());
    }

    // Check for --version flag
    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        println!("Keyvault {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Check for --generate-master-key flag
    if args.iter().any(|arg| arg == "--generate-master-key") {
        println!("{}", MasterKey::generate().to_base64().as_str());
        return Ok(());
    }

    // Load configuration first (before logging, so we know log format)
    let config = AppConfig::load().context("Failed to load configuration")?;

    // The guard must be kept alive so buffered log lines reach the file
    let _log_guard = init_logging(&config);

    info!("Keyvault starting up");
    info!(
        rate_limit_backend = ?config.rate_limit.backend,
        trust_proxy_headers = config.server.trust_proxy_headers,
        "Configuration loaded successfully"
    );

    ensure_data_directory(&config)?;

    info!("Initializing database connection");
    let db = db::init_pool(&config.database)
        .await
        .context("Failed to initialize database")?;

    let state = AppState::new(config.clone(), db).context("Failed to initialize services")?;

    let _limiter_cleanup = state
        .services
        .limiter
        .spawn_cleanup(Duration::from_secs(config.rate_limit.cleanup_interval_secs));

    let app = api::router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address configuration")?;

    if let Some(ref tls_config) = config.server.tls {
        info!("Starting HTTPS server on https://{}", addr);
        info!("TLS certificate: {:?}", tls_config.cert_file);

        let rustls_config = create_rustls_config(tls_config)?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .context("Failed to bind to address")?;

        info!("HTTPS server is ready to accept connections");

        axum_server::from_tcp_rustls(listener.into_std()?, rustls_config)?
            .serve(app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .context("HTTPS server error")?;
    } else {
        info!("Starting HTTP server on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .context("Failed to bind to address")?;

        info!("HTTP server is ready to accept connections");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .context("HTTP server error")?;
    }

    Ok(())
}

/// Certificate chain and private key from the configured PEM files
fn load_identity(
    tls_config: &config::TlsConfig,
) -> Result<(
    Vec<rustls::pki_types::CertificateDer<'static>>,
    rustls::pki_types::PrivateKeyDer<'static>,
)> {
    fn open(path: &std::path::Path) -> Result<BufReader<std::fs::File>> {
        std::fs::File::open(path)
            .map(BufReader::new)
            .with_context(|| format!("Failed to open {:?}", path))
    }

    let certs = rustls_pemfile::certs(&mut open(&tls_config.cert_file)?)
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to parse certificates in {:?}", tls_config.cert_file))?;
    if certs.is_empty() {
        anyhow::bail!("No certificates found in {:?}", tls_config.cert_file);
    }

    let key = rustls_pemfile::private_key(&mut open(&tls_config.key_file)?)
        .with_context(|| format!("Failed to read private key: {:?}", tls_config.key_file))?
        .ok_or_else(|| anyhow::anyhow!("No private key found in {:?}", tls_config.key_file))?;

    Ok((certs, key))
}

/// Rustls server configuration honouring the minimum protocol version
fn create_rustls_config(tls_config: &config::TlsConfig) -> Result<axum_server::tls_rustls::RustlsConfig> {
    use rustls::version::{TLS12, TLS13};

    let (certs, key) = load_identity(tls_config)?;

    let versions: Vec<&'static rustls::SupportedProtocolVersion> = match tls_config.min_version.as_str() {
        "1.3" => vec![&TLS13],
        _ => vec![&TLS12, &TLS13],
    };
    info!(min_version = %tls_config.min_version, "TLS protocol versions configured");

    let mut server_config =
        rustls::ServerConfig::builder_with_provider(rustls::crypto::aws_lc_rs::default_provider().into())
            .with_protocol_versions(&versions)
            .context("Failed to set TLS protocol versions")?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .context("Failed to build TLS server config")?;
    server_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(axum_server::tls_rustls::RustlsConfig::from_config(Arc::new(server_config)))
}

type BoxedLayer = Box<dyn tracing_subscriber::Layer<tracing_subscriber::Registry> + Send + Sync>;

/// Install the global subscriber for the configured target and format
///
/// Returns the file writer guard when logging to a file; dropping it stops
/// the background writer.
fn init_logging(config: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use config::LogTarget;
    use tracing_subscriber::{prelude::*, EnvFilter};

    let log_config = &config.logging;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_config.level));

    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = None;

    if matches!(log_config.target, LogTarget::Console | LogTarget::Both) {
        layers.push(format_layer(&log_config.format, std::io::stdout, true));
    }
    if matches!(log_config.target, LogTarget::File | LogTarget::Both) {
        let (writer, file_guard) = create_file_writer(log_config);
        layers.push(format_layer(&log_config.format, writer, false));
        guard = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();

    guard
}

fn format_layer<W>(format: &LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    use tracing_subscriber::{fmt, Layer};

    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_writer(writer)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
    }
}

/// File writer, rotated daily when configured
fn create_file_writer(
    log_config: &config::LoggingConfig,
) -> (
    tracing_appender::non_blocking::NonBlocking,
    tracing_appender::non_blocking::WorkerGuard,
) {
    if let Err(e) = std::fs::create_dir_all(&log_config.log_dir) {
        eprintln!(
            "Warning: Failed to create log directory {:?}: {}",
            log_config.log_dir, e
        );
    }

    let file_appender = if log_config.daily_rotation {
        tracing_appender::rolling::daily(&log_config.log_dir, &log_config.log_prefix)
    } else {
        tracing_appender::rolling::never(&log_config.log_dir, &log_config.log_prefix)
    };

    tracing_appender::non_blocking(file_appender)
}

/// Ensure the directory holding the SQLite file exists
fn ensure_data_directory(config: &AppConfig) -> Result<()> {
    if let Some(path) = sqlite_path(&config.database.url) {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create data directory")?;
                info!("Created data directory: {:?}", parent);
            }
        }
    }
    Ok(())
}

fn sqlite_path(url: &str) -> Option<&str> {
    url.strip_prefix("sqlite://")
        .filter(|path| !path.contains(":memory:"))
        .map(|path| path.split('?').next().unwrap_or(path))
}

/// Print help message
fn print_help() {
    println!(
        r#"Keyvault {}

USAGE:
    keyvault [OPTIONS]

OPTIONS:
    -h, --help               Print this help message
    -V, --version            Print version information
    --generate-master-key    Print a fresh base64 master key for vault.master_key
                             (or VAULT_MASTER_KEY) and exit

ENVIRONMENT:
    KEYVAULT_CONFIG      Path to configuration file (default: config.yaml)
    VAULT_MASTER_KEY     Base64 master key sealing every stored API key
    JWT_SECRET           Token signing secret (at least 32 characters)
    DATABASE_URL         SQLite database URL

CONFIGURATION:
    The application looks for configuration files in the following order:
    1. Path specified by KEYVAULT_CONFIG environment variable
    2. ./config.yaml
    3. ./config/config.yaml
    4. /etc/keyvault/config.yaml
    5. keyvault/config.yaml under the user configuration directory"#,
        env!("CARGO_PKG_VERSION")
    );
}
