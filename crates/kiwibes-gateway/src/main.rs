mod api;
mod auth_guard;
mod catalog;
mod config;
mod cron;
mod datastore;
mod executor;
mod persistence;
mod scheduler;
mod state;
mod tls;

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use auth_guard::AuthGuard;
use catalog::Catalog;
use config::Config;
use datastore::DataStore;
use executor::Executor;
use state::AppState;

fn init_tracing(cfg: &Config) -> tracing_appender::non_blocking::WorkerGuard {
    let level = match cfg.log_level {
        0 => "error",
        1 => "info",
        _ => "debug",
    };
    let log_path = cfg.log_path();
    let file_appender = tracing_appender::rolling::never(
        log_path.parent().unwrap_or_else(|| std::path::Path::new(".")),
        log_path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("kiwibes.log")),
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},kiwibes_gateway=debug")));

    let stdout_layer = tracing_subscriber::fmt::layer().json();
    let file_layer = tracing_subscriber::fmt::layer().json().with_writer(non_blocking).with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    guard
}

fn exit_with(code: i32, message: impl std::fmt::Display) -> ! {
    eprintln!("kiwibesd: {message}");
    std::process::exit(code);
}

#[tokio::main]
async fn main() {
    let config = match Config::parse() {
        Ok(c) => c,
        Err(e) => exit_with(e.exit_code(), e),
    };

    let _log_guard = init_tracing(&config);
    tracing::info!(home = %config.home.display(), "kiwibesd starting");

    let jobs = match persistence::load_catalog(&config.catalog_path()) {
        Ok(jobs) => jobs,
        Err(e) => exit_with(e.exit_code(), format!("{e:?}")),
    };
    let data_entries = persistence::load_or_default(&config.data_path());

    let catalog = Arc::new(Catalog::from_jobs(jobs, config.catalog_path()));
    let datastore = Arc::new(DataStore::new(data_entries, config.data_cap_bytes(), config.data_path()));
    let executor = Arc::new(Executor::new(catalog.clone()));
    let auth = Arc::new(AuthGuard::new(config.auth_path()));

    let state = AppState {
        catalog: catalog.clone(),
        datastore: datastore.clone(),
        executor: executor.clone(),
        auth: auth.clone(),
    };

    tokio::spawn(scheduler::run(catalog.clone(), executor.clone()));
    tokio::spawn(auth.clone().run());

    let tls_config = match tls::load(&config.cert_path(), &config.key_path()).await {
        Ok(c) => c,
        Err(e) => exit_with(e.exit_code(), e),
    };

    let app = api::router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config::defaults::REST_PORT));

    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("shutdown signal received, draining connections");
        shutdown_handle.graceful_shutdown(Some(Duration::from_secs(10)));
    });

    tracing::info!(%addr, "listening");
    if let Err(e) = axum_server::bind_rustls(addr, tls_config)
        .handle(handle)
        .serve(app.into_make_service())
        .await
    {
        tracing::error!(error = %e, "server error");
    }

    executor.shutdown().await;
    catalog.flush().await;
    datastore.flush().await;
    tracing::info!("kiwibesd stopped");
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
