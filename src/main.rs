//! Khronicle server binary

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use khronicle::config::CommonParameters;
use khronicle::inspection::InspectionServer;
use khronicle::server::{router, AppState};
use khronicle::{preset, KhronicleError};

#[derive(Parser)]
#[command(name = "khronicle")]
#[command(about = "Khronicle - log-history reconstruction for Kubernetes clusters")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonParameters,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the registered inspection types
    Types,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Types) => list_types(&cli.common),
        None => serve(cli.common).await,
    };

    match result {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn build_server(common: &CommonParameters) -> Result<Arc<InspectionServer>, KhronicleError> {
    let server = Arc::new(InspectionServer::new(
        common.io_config(),
        common.max_upload_file_size_bytes,
    ));
    preset::register(&server)?;
    Ok(server)
}

fn list_types(common: &CommonParameters) -> Result<i32, KhronicleError> {
    let server = build_server(common)?;
    for ty in server.all_inspection_types() {
        println!("{:<20} {}", ty.id.cyan().bold(), ty.name);
        if !ty.description.is_empty() {
            println!("{:<20} {}", "", ty.description.dimmed());
        }
    }
    Ok(0)
}

async fn serve(common: CommonParameters) -> Result<i32, KhronicleError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(common.log_filter())),
        )
        .init();

    let server = build_server(&common)?;

    // Headless job mode: run one inspection and exit.
    if let Some(type_id) = &common.job_inspection_type {
        return run_job(&server, type_id, common.job_features()).await;
    }

    let state = AppState {
        server: Arc::clone(&server),
        viewer_mode: common.viewer_mode,
    };
    let app = router(state);

    let addr = format!("{}:{}", common.host, common.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("khronicle listening on http://{addr}");
    println!(
        "{} khronicle listening on {}",
        "→".cyan(),
        format!("http://{addr}").cyan().bold()
    );

    // 0 = normal termination; signals map to the conventional 128+signum.
    let signum = Arc::new(AtomicI32::new(0));
    let shutdown_signum = Arc::clone(&signum);
    let shutdown_server = Arc::clone(&server);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let received = wait_for_signal().await;
            info!("signal {received} received, cancelling inspections");
            shutdown_signum.store(received, Ordering::SeqCst);
            shutdown_server.cancel_all();
        })
        .await?;

    match signum.load(Ordering::SeqCst) {
        0 => Ok(0),
        n => Ok(128 + n),
    }
}

/// Resolve on SIGINT or SIGTERM; returns the signal number.
async fn wait_for_signal() -> i32 {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return 2;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => 2,
            _ = term.recv() => 15,
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        2
    }
}

async fn run_job(
    server: &Arc<InspectionServer>,
    type_id: &str,
    features: Vec<String>,
) -> Result<i32, KhronicleError> {
    let session = server.create_inspection(type_id)?;
    if !features.is_empty() {
        session.set_feature_list(features)?;
    }
    session.run(serde_json::Map::new())?;
    session.wait().await;
    let result = session.result()?;
    if let Some(path) = result.artifact.path {
        println!("{} artifact written to {}", "✓".green(), path.display());
    }
    Ok(0)
}
