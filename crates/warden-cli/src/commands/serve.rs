//! Serve command - run the gateway on stdio.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use warden_config::Config;
use warden_gateway::{Dispatcher, Gateway, serve_stdio};

/// Run the gateway until stdin closes or a termination signal arrives.
pub(crate) async fn run_serve(config_path: Option<&Path>) -> anyhow::Result<()> {
    let resolved = Config::load(config_path)?;
    for file in &resolved.loaded_files {
        info!(file = %file, "configuration layer loaded");
    }
    let cfg = resolved.config;

    let gateway = Arc::new(Gateway::from_config(&cfg)?);
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&gateway),
        cfg.server.max_request_bytes,
    ));

    let shutdown = CancellationToken::new();
    let signals = tokio::spawn(watch_signals(
        Arc::clone(&gateway),
        config_path.map(Path::to_path_buf),
        shutdown.clone(),
    ));

    info!(name = %cfg.server.name, tools = gateway.list_tools().len(), "serving on stdio");
    let served = serve_stdio(dispatcher, shutdown.clone()).await;
    shutdown.cancel();
    signals.abort();

    let metrics = gateway.metrics().snapshot();
    info!(
        calls = metrics.finished,
        redactions = metrics.redactions,
        audit_sequence = gateway.audit().last_sequence(),
        "gateway stopped"
    );
    served?;
    Ok(())
}

/// Reload on SIGHUP; stop on SIGTERM or Ctrl-C.
#[cfg(unix)]
async fn watch_signals(gateway: Arc<Gateway>, path: Option<PathBuf>, shutdown: CancellationToken) {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut hangup, mut terminate) =
        match (signal(SignalKind::hangup()), signal(SignalKind::terminate())) {
            (Ok(hangup), Ok(terminate)) => (hangup, terminate),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "signal handlers unavailable, reload disabled");
                return;
            },
        };

    loop {
        tokio::select! {
            _ = hangup.recv() => reload(&gateway, path.as_deref()),
            _ = terminate.recv() => {
                info!("SIGTERM received");
                shutdown.cancel();
                break;
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                shutdown.cancel();
                break;
            },
            () = shutdown.cancelled() => break,
        }
    }
}

#[cfg(not(unix))]
async fn watch_signals(_gateway: Arc<Gateway>, _path: Option<PathBuf>, shutdown: CancellationToken) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => shutdown.cancel(),
        () = shutdown.cancelled() => {},
    }
}

/// Re-read configuration and swap tools and roles. A bad file keeps the
/// running configuration.
fn reload(gateway: &Gateway, path: Option<&Path>) {
    info!("SIGHUP received, reloading configuration");
    let outcome = Config::load(path)
        .map_err(anyhow::Error::from)
        .and_then(|resolved| gateway.reload(&resolved.config).map_err(anyhow::Error::from));
    if let Err(e) = outcome {
        warn!(error = %e, "reload failed, keeping current configuration");
    }
}
