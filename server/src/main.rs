use anyhow::Result;
use clap::Parser;
use docsearch::persist::{save_snapshot, IndexPaths};
use docsearch::SearchConfig;
use server::{open_manager, router, AppState};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Index directory path
    #[arg(long, default_value = "./index")]
    index: String,
    /// Search configuration (JSON)
    #[arg(long)]
    config: Option<String>,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Write a snapshot of the live index when shutting down
    #[arg(long, default_value_t = false)]
    save_on_exit: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => SearchConfig::from_json_file(path)?,
        None => SearchConfig::default(),
    };
    let manager = open_manager(&args.index, config)?;
    let state = AppState::new(manager.clone(), &args.index, std::env::var("ADMIN_TOKEN").ok());

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, index = %args.index, documents = manager.document_count(), "server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    manager.shutdown();
    if args.save_on_exit {
        let created_at = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default();
        save_snapshot(&IndexPaths::new(&args.index), &manager.snapshot(), created_at)?;
    }
    tracing::info!("server stopped");
    Ok(())
}
