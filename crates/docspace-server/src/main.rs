use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use docspace::Workspace;
use tokio::net::TcpListener;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod auth;
mod command;
mod config;
mod error;
mod routes;
mod sessions;

use auth::AuthConfig;
use config::Config;
use routes::AppState;
use sessions::SessionStore;

#[derive(Parser, Debug)]
#[command(name = "docspace-server")]
#[command(about = "Per-user received/generated workspaces behind principal headers")]
#[command(version)]
struct Args {
    /// Config file path.
    #[arg(long, env = "DOCSPACE_CONFIG", default_value = "~/.config/docspace/config.toml")]
    config: String,
    /// Listen address, overriding the config file.
    #[arg(long, env = "DOCSPACE_LISTEN")]
    listen: Option<String>,
    /// Shared secret for HMAC-signed principal headers.
    #[arg(long, env = "DOCSPACE_AUTH_SECRET")]
    auth_secret: Option<String>,
    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "docspace=debug,docspace_server=debug"
    } else {
        "docspace=info,docspace_server=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).json().init();
}

/// Drop idle sessions in the background so abandoned ids do not pile up
/// between requests.
fn spawn_session_sweeper(sessions: Arc<SessionStore>, idle: Duration) {
    let period = (idle / 4).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let purged = sessions.purge_expired();
            if purged > 0 {
                debug!(purged, remaining = sessions.len(), "expired sessions purged");
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = Config::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config))?;
    let spec = config.workspace_spec();
    info!(
        received = %spec.roots.received.display(),
        generated = %spec.roots.generated.display(),
        tools = %spec.executable_root.display(),
        "workspace configured"
    );

    let auth = args.auth_secret.as_ref().map(|secret| {
        AuthConfig::new(secret.as_bytes(), Duration::from_secs(config.auth.max_skew_secs))
    });
    if auth.is_none() {
        info!("docspace-server principal signing disabled (set DOCSPACE_AUTH_SECRET to enable)");
    }

    let sessions = Arc::new(SessionStore::new(
        config.server.session_idle(),
        config.server.max_sessions,
    ));
    spawn_session_sweeper(sessions.clone(), config.server.session_idle());

    let state = AppState {
        workspace: Arc::new(Workspace::new(spec)),
        sessions,
        auth,
    };
    let app = routes::router(state, config.storage.max_upload_bytes);

    let listen = args.listen.unwrap_or(config.server.listen);
    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    info!("docspace-server listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
