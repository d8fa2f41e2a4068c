use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use avtale_core::{NotificationSink, SystemClock};
use avtale_db::{init_database, RedbStore};
use avtale_notify::{LogNotifier, NotificationQueue, WebhookNotifier};
use avtale_server::{routes, AppState, Config};

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            eprintln!("Optional: AVTALE_LISTEN_ADDR, AVTALE_DB_PATH, AVTALE_SESSION_TTL_SECS,");
            eprintln!("          AVTALE_NOTIFY_WEBHOOK, AVTALE_ADMIN_USER + AVTALE_ADMIN_PASSWORD");
            std::process::exit(1);
        }
    };

    tracing::info!("Starting Avtale server");
    tracing::info!("Listen address: {}", config.listen_addr);
    tracing::info!("Database path: {}", config.db_path.display());

    // Initialize database
    let db = match init_database(&config.db_path) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Database error: {}", e);
            std::process::exit(1);
        }
    };
    let store = Arc::new(RedbStore::new(db));

    // Notifications go through a queue drained by a background worker
    let sink: Arc<dyn NotificationSink> = match &config.notify_webhook {
        Some(url) => {
            tracing::info!("Delivering notifications to {}", url);
            let notifier = match WebhookNotifier::new(url.clone()) {
                Ok(n) => n,
                Err(e) => {
                    eprintln!("Failed to create webhook client: {}", e);
                    std::process::exit(1);
                }
            };
            let (queue, worker) = NotificationQueue::channel(notifier);
            tokio::spawn(worker.run());
            Arc::new(queue)
        }
        None => {
            tracing::info!("No webhook configured, logging notifications");
            let (queue, worker) = NotificationQueue::channel(LogNotifier);
            tokio::spawn(worker.run());
            Arc::new(queue)
        }
    };

    let state = AppState::new(store, Arc::new(SystemClock), sink, config.session_ttl);

    if let Some(admin) = &config.admin {
        if let Err(e) = state.ensure_admin(admin) {
            eprintln!("Failed to create administrator account: {}", e);
            std::process::exit(1);
        }
    }

    let maintenance = state.clone();
    tokio::spawn(async move {
        maintenance.run_maintenance(MAINTENANCE_INTERVAL).await;
    });

    // Build router
    let app = routes::create_router(state).into_make_service_with_connect_info::<SocketAddr>();

    // Start server
    let listener = match tokio::net::TcpListener::bind(&config.listen_addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", config.listen_addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server running at http://{}", config.listen_addr);

    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
