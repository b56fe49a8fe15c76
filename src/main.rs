//! Coop gateway - data gateway for the cooperative loan and savings app

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coop_gateway::{
    config::Args,
    db::{MemoryStore, MongoClient, MongoStore, SharedStore},
    server::{self, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("coop_gateway={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Coop Gateway v{}", env!("CARGO_PKG_VERSION"));
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Database: {}", args.mongodb_db);
    info!("Allowed origins: {}", args.cors_origin_list().join(", "));
    info!("======================================");

    // Connect to MongoDB (optional in dev mode)
    let mongo = match args.mongodb_uri.as_deref().filter(|u| !u.is_empty()) {
        Some(uri) => match MongoClient::new(uri, &args.mongodb_db).await {
            Ok(client) => Some(client),
            Err(e) if args.dev_mode => {
                warn!("MongoDB connection failed (dev mode, continuing in memory): {}", e);
                None
            }
            Err(e) => {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        },
        None => None,
    };

    let store: SharedStore = match &mongo {
        Some(client) => Arc::new(MongoStore::new(client.clone())),
        None => Arc::new(MemoryStore::new(args.mongodb_db.clone())),
    };

    if args.skip_indexes {
        info!("Index creation skipped");
    } else {
        match tokio::time::timeout(args.transfer_timeout(), store.ensure_indexes()).await {
            Ok(Ok(())) => info!("Indexes ensured on {} store", store.backend()),
            Ok(Err(e)) => warn!("Index creation failed (continuing): {}", e),
            Err(_) => warn!("Index creation timed out (continuing)"),
        }
    }

    let state = Arc::new(AppState::new(args, Some(store), mongo.clone()));
    server::run(Arc::clone(&state)).await?;

    if let Some(client) = mongo {
        client.shutdown().await;
    }
    info!("Coop gateway stopped");
    Ok(())
}
