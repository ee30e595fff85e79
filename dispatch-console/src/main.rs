mod demo;
mod hub;
mod routes;
mod watch;

use dispatch_core::backend::HttpBackend;
use dispatch_core::config::DispatchConfig;
use dispatch_core::maps::MapsService;
use dispatch_core::oplog::CoordinationLog;
use dispatch_core::session::SessionContext;
use dispatch_core::status::StatusConfig;
use dispatch_core::travel::TravelConfig;
use hub::EventHub;
use routes::ConsoleState;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use watch::WatchRegistry;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if std::env::args().any(|arg| arg == "--demo") {
        if let Err(err) = demo::run().await {
            eprintln!("demo failed: {err}");
            std::process::exit(1);
        }
        return;
    }

    let config = match DispatchConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(2);
        }
    };
    let session = match SessionContext::from_env() {
        Ok(session) => session,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(2);
        }
    };

    let log = CoordinationLog::open("dispatch.db").expect("open coordination log");
    let hub = EventHub::new(log.clone());
    let backend = match HttpBackend::new(&config, &session) {
        Ok(backend) => backend,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(2);
        }
    };

    let maps = MapsService::from_config(&config);
    if maps.is_none() {
        tracing::info!("maps service not configured; travel monitoring disabled");
    }

    let registry = Arc::new(WatchRegistry::new(
        backend,
        maps.clone(),
        maps,
        hub.clone(),
        StatusConfig::default(),
        TravelConfig::default(),
    ));

    let app = routes::console_router(ConsoleState {
        registry,
        hub,
        log,
    });
    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080")
        .await
        .expect("bind :8080");

    println!("dispatch-console listening on :8080");
    axum::serve(listener, app).await.expect("serve");
}
