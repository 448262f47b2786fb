use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use adsync::{app_router, run_scheduler, AppState, Command, Config, SyncTarget};
use adsync_client::MegaphoneClient;
use adsync_core::{load_settings, AppError, Reconciler, Settings};
use adsync_db::PgStore;

type MirrorReconciler = Reconciler<PgStore, MegaphoneClient>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    // Setup logging (stderr to keep stdout clean for JSON reports)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let config = Config::parse();
    let settings = load_settings(config.config.as_deref()).context("Failed to load settings")?;

    // Database connection
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    let store = PgStore::new(pool);

    // Execute command
    match &config.command {
        Command::Migrate => {
            store.migrate().await.map_err(friendly)?;
            info!("Migrations applied");
        }
        Command::Stats => {
            show_stats(&store).await?;
        }
        Command::Sync { target } => {
            let reconciler = Reconciler::new(store, megaphone_client(&config, &settings)?);
            sync(&reconciler, *target).await?;
        }
        Command::Serve { bind } => {
            let bind_addr = bind.clone().unwrap_or_else(|| settings.server.bind_addr.clone());
            store.migrate().await.map_err(friendly)?;
            let reconciler = Arc::new(Reconciler::new(
                store,
                megaphone_client(&config, &settings)?,
            ));
            serve(reconciler, &settings, &bind_addr).await?;
        }
    }

    Ok(())
}

fn friendly(err: AppError) -> anyhow::Error {
    anyhow::anyhow!(err.user_message())
}

fn megaphone_client(config: &Config, settings: &Settings) -> anyhow::Result<MegaphoneClient> {
    MegaphoneClient::new(
        &config.megaphone_base_url,
        &config.megaphone_org_id,
        &config.megaphone_api_token,
        &settings.http,
        &settings.rate_limit,
    )
    .context("Invalid Megaphone configuration")
}

/// Run the API and the scheduler until Ctrl-C
async fn serve(
    reconciler: Arc<MirrorReconciler>,
    settings: &Settings,
    bind_addr: &str,
) -> anyhow::Result<()> {
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let scheduler = if settings.sync.enabled {
        Some(tokio::spawn(run_scheduler(
            Arc::clone(&reconciler),
            settings.sync.clone(),
            shutdown_tx.subscribe(),
        )))
    } else {
        info!("Scheduler disabled");
        None
    };

    let router = app_router(AppState::new(reconciler));
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!("adsync listening on {}", listener.local_addr()?);

    let signal_tx = shutdown_tx.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
            let _ = signal_tx.send(());
        })
        .await
        .context("Server error")?;

    if let Some(handle) = scheduler {
        if let Err(e) = handle.await {
            warn!(error = %e, "Scheduler task ended abnormally");
        }
    }
    Ok(())
}

/// Run one reconciliation and print the report(s) as JSON
async fn sync(reconciler: &MirrorReconciler, target: SyncTarget) -> anyhow::Result<()> {
    let report = match target {
        SyncTarget::Advertisers => {
            serde_json::to_value(reconciler.sync_advertisers().await.map_err(friendly)?)?
        }
        SyncTarget::Campaigns => {
            serde_json::to_value(reconciler.sync_campaigns().await.map_err(friendly)?)?
        }
        SyncTarget::All => serde_json::to_value(reconciler.sync_all().await.map_err(friendly)?)?,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Show mirror statistics
async fn show_stats(store: &PgStore) -> anyhow::Result<()> {
    use adsync_core::MirrorStore;

    let stats = store.stats().await.map_err(friendly)?;

    println!("\nMirror Statistics\n");
    println!("  Agencies:              {}", stats.agencies);
    println!("  Advertisers:           {}", stats.advertisers);
    println!(
        "  Campaigns:             {} ({} archived)",
        stats.campaigns, stats.archived_campaigns
    );
    match stats.last_synced_at {
        Some(last_sync) => println!("  Last campaign sync:    {}", last_sync),
        None => println!("  Last campaign sync:    never"),
    }
    println!();

    Ok(())
}
