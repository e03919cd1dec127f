use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use syncnote_host::api::{self, AppState};
use syncnote_host::config::Config;
use syncnote_store::{
    DocumentStore, HttpUploadService, JsonFileStore, MemoryStore, MemoryUploads, UploadService,
};
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_banner() {
    eprintln!();
    eprintln!("  \x1b[1;36m╔══════════════════════════════════════════╗\x1b[0m");
    eprintln!("  \x1b[1;36m║\x1b[0m  \x1b[1;96msyncnote\x1b[0m  notes and media, live-synced   \x1b[1;36m║\x1b[0m");
    eprintln!("  \x1b[1;36m║\x1b[0m  \x1b[2;37mupload proxy\x1b[0m v{VERSION:<26}\x1b[1;36m║\x1b[0m");
    eprintln!("  \x1b[1;36m╚══════════════════════════════════════════╝\x1b[0m");
    eprintln!();
}

fn print_connection_info(bind: &str, port: u16) {
    eprintln!("  \x1b[1;32m[http]\x1b[0m   Listening on port \x1b[1;96m{port}\x1b[0m");
    eprintln!();
    eprintln!("  \x1b[1;37m>\x1b[0m Upload: \x1b[4;96mhttp://{bind}:{port}/api/upload\x1b[0m");
    eprintln!();
    eprintln!("  \x1b[2mPress Ctrl+C to stop\x1b[0m");
    eprintln!();
}

fn print_help() {
    println!("syncnote - live-synced notes with an upload proxy");
    println!();
    println!("USAGE:");
    println!("    syncnote [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config FILE  Config file (default: {})", Config::default_config_path().display());
    println!("    -h, --help         Show this help");
    println!("    -v, --version      Show version");
    println!();
    println!("ENVIRONMENT:");
    println!("    SYNCNOTE_UPLOAD_API_KEY     API key for hosted deletes");
    println!("    SYNCNOTE_UPLOAD_API_SECRET  API secret for hosted deletes");
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match &config.store.path {
        Some(path) => {
            let store = JsonFileStore::open(path.clone())
                .await
                .with_context(|| format!("Failed to open document store {}", path.display()))?;
            eprintln!("  \x1b[1;32m[store]\x1b[0m  JSON file: {}", path.display());
            Ok(Arc::new(store))
        }
        None => {
            eprintln!("  \x1b[1;33m[store]\x1b[0m  In-memory (documents are lost on exit)");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

fn upload_service(config: &Config) -> Arc<dyn UploadService> {
    match config.upload.http_config() {
        Some(http) => {
            eprintln!(
                "  \x1b[1;32m[upload]\x1b[0m Hosted: {}/{}",
                http.api_base, http.cloud_name
            );
            if http.api_secret.is_none() {
                tracing::warn!("no upload API secret configured, hosted deletes will be rejected");
            }
            Arc::new(HttpUploadService::new(http))
        }
        None => {
            eprintln!("  \x1b[1;33m[upload]\x1b[0m In-memory (no cloud_name configured)");
            Arc::new(MemoryUploads::default())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    eprintln!();
    eprintln!("  \x1b[1;33m[stop]\x1b[0m   Graceful shutdown initiated...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging (tracing)
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--version" | "-v" => {
                println!("syncnote {VERSION}");
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--config" | "-c" if i + 1 < args.len() => {
                config_path = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            other => {
                eprintln!("Unknown argument: {other}");
                eprintln!("Run 'syncnote --help' for usage.");
                std::process::exit(2);
            }
        }
    }

    print_banner();

    let config = match config_path {
        Some(path) => Config::load_from_path(&path)?.with_env_overrides(|k| std::env::var(k).ok()),
        None => {
            Config::create_default_if_missing();
            Config::load()
        }
    };
    eprintln!(
        "  \x1b[1;32m[config]\x1b[0m {} admin(s), max upload {} bytes",
        config.identity.admins.len(),
        config.upload.max_file_size
    );

    let state = AppState {
        uploads: upload_service(&config),
        store: open_store(&config).await?,
        max_file_size: config.upload.max_file_size,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = api::app(state).layer(cors);

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    print_connection_info(&config.server.bind, config.server.port);
    tracing::info!(%addr, "server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    eprintln!("  \x1b[1;32m[done]\x1b[0m   Bye.");
    Ok(())
}
