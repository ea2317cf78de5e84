//! # Stockbridge CLI
//!
//! Operator front end for the sync engine.
//!
//! ## Commands
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        stockbridge <command>                            │
//! │                                                                         │
//! │  status                      link state, bindings, watermark, notices   │
//! │  auth-url                    print the marketplace authorization URL    │
//! │  auth-complete <code> <state> finish the OAuth2 callback                │
//! │  refresh                     force a token refresh                      │
//! │  push                        push local stock to every bound offer      │
//! │  pull                        pull offer stock into the local store      │
//! │  poll-orders                 process the order-event feed once          │
//! │  run                         periodic refresh + order-poll loop         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Exit codes: 0 on success, 2 when not linked to the marketplace, 1 for
//! every other failure (including a partial batch).

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use stockbridge_store::{Journal, StateStore};
use stockbridge_sync::{
    Clock, HttpLocalStore, LocalStore, MarketClient, OrderWatcher, SyncConfig, SyncEngine,
    SyncError, SyncReport, SyncResult, SystemClock, TokenManager,
};

const EXIT_OK: i32 = 0;
const EXIT_FAILURE: i32 = 1;
const EXIT_UNAUTHENTICATED: i32 = 2;

fn usage() {
    eprintln!("Usage: stockbridge [--config <path>] <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  status                        Show link state, bindings and notices");
    eprintln!("  auth-url                      Print the marketplace authorization URL");
    eprintln!("  auth-complete <code> <state>  Finish the OAuth2 callback");
    eprintln!("  refresh                       Force a token refresh");
    eprintln!("  push                          Push local stock to every bound offer");
    eprintln!("  pull                          Pull offer stock into the local store");
    eprintln!("  poll-orders                   Process the order-event feed once");
    eprintln!("  run                           Periodic refresh + order-poll loop");
}

/// Everything a command needs, wired once at startup.
struct App {
    tokens: Arc<TokenManager>,
    engine: Arc<SyncEngine>,
    watcher: Arc<OrderWatcher>,
    store: Arc<StateStore>,
}

impl App {
    fn build(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let config = Arc::new(SyncConfig::load_or_default(config_path)?);

        let market = Arc::new(MarketClient::new(&config)?);
        let store = Arc::new(StateStore::open(config.state_path()?)?);
        let journal = Arc::new(Journal::open(config.journal_path()?)?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let local: Arc<dyn LocalStore> = Arc::new(HttpLocalStore::new(&config)?);

        let tokens = Arc::new(TokenManager::new(
            Arc::clone(&config),
            Arc::clone(&market),
            Arc::clone(&store),
            Arc::clone(&journal),
            Arc::clone(&clock),
        ));
        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&config),
            Arc::clone(&tokens),
            Arc::clone(&market),
            Arc::clone(&local),
            Arc::clone(&store),
            Arc::clone(&journal),
        ));
        let watcher = Arc::new(OrderWatcher::new(
            config,
            Arc::clone(&tokens),
            Arc::clone(&engine),
            market,
            local,
            Arc::clone(&store),
            journal,
            clock,
        ));

        Ok(App {
            tokens,
            engine,
            watcher,
            store,
        })
    }
}

fn print_report(verb: &str, report: &SyncReport) {
    println!(
        "{verb}: {} of {} bindings synchronized",
        report.synced, report.attempted
    );
    for (binding, err) in &report.failures {
        println!("  failed: {binding}: {err}");
    }
}

fn report_exit_code(report: &SyncReport) -> i32 {
    if report.is_clean() {
        EXIT_OK
    } else {
        EXIT_FAILURE
    }
}

async fn cmd_status(app: &App) -> SyncResult<i32> {
    let credential = app.store.credential();
    if credential.is_authorized() {
        println!("marketplace: linked");
    } else {
        println!("marketplace: not linked");
    }

    let bindings = app.store.bindings();
    println!("bindings: {}", bindings.len());
    for binding in &bindings {
        println!("  {binding}");
    }

    match app.store.order_watermark() {
        Some(at) => println!("orders processed through: {}", at.to_rfc3339()),
        None => println!("orders processed through: never"),
    }

    // Notices are one-shot; showing one consumes it.
    if let Some(notice) = app.store.take_notice()? {
        println!("notice ({:?}): {}", notice.kind, notice.message);
    }
    Ok(EXIT_OK)
}

async fn cmd_auth_url(app: &App) -> SyncResult<i32> {
    let url = app.tokens.begin_authorization().await?;
    println!("{url}");
    println!("Open the URL, approve access, then run:");
    println!("  stockbridge auth-complete <code> <state>");
    Ok(EXIT_OK)
}

async fn cmd_auth_complete(app: &App, code: &str, state: &str) -> SyncResult<i32> {
    app.tokens
        .complete_authorization(Some(code), Some(state))
        .await?;
    println!("Linked to the marketplace");
    Ok(EXIT_OK)
}

async fn cmd_refresh(app: &App) -> SyncResult<i32> {
    app.tokens.refresh().await?;
    println!("Token refreshed");
    Ok(EXIT_OK)
}

async fn cmd_push(app: &App) -> SyncResult<i32> {
    app.tokens.ensure_fresh().await?;
    let report = app.engine.push_all().await?;
    print_report("push", &report);
    Ok(report_exit_code(&report))
}

async fn cmd_pull(app: &App) -> SyncResult<i32> {
    app.tokens.ensure_fresh().await?;
    let report = app.engine.pull_all().await?;
    print_report("pull", &report);
    Ok(report_exit_code(&report))
}

async fn cmd_poll_orders(app: &App) -> SyncResult<i32> {
    app.tokens.ensure_fresh().await?;
    let report = app.watcher.poll_remote_orders().await?;
    print_report("poll-orders", &report);
    Ok(report_exit_code(&report))
}

async fn cmd_run(app: &App) -> SyncResult<i32> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let watcher = Arc::clone(&app.watcher);
    let loop_handle = tokio::spawn(watcher.run(shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| SyncError::Transport(e.to_string()))?;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    let _ = loop_handle.await;
    Ok(EXIT_OK)
}

async fn dispatch(args: Vec<String>) -> SyncResult<i32> {
    let mut args = args.into_iter().peekable();

    let config_path = if args.peek().map(String::as_str) == Some("--config") {
        args.next();
        match args.next() {
            Some(path) => Some(PathBuf::from(path)),
            None => {
                usage();
                return Ok(EXIT_FAILURE);
            }
        }
    } else {
        None
    };

    let command = match args.next() {
        Some(command) => command,
        None => {
            usage();
            return Ok(EXIT_FAILURE);
        }
    };

    let app = App::build(config_path)?;

    match command.as_str() {
        "status" => cmd_status(&app).await,
        "auth-url" => cmd_auth_url(&app).await,
        "auth-complete" => {
            let (code, state) = match (args.next(), args.next()) {
                (Some(code), Some(state)) => (code, state),
                _ => {
                    usage();
                    return Ok(EXIT_FAILURE);
                }
            };
            cmd_auth_complete(&app, &code, &state).await
        }
        "refresh" => cmd_refresh(&app).await,
        "push" => cmd_push(&app).await,
        "pull" => cmd_pull(&app).await,
        "poll-orders" => cmd_poll_orders(&app).await,
        "run" => cmd_run(&app).await,
        other => {
            eprintln!("Unknown command: {other}");
            usage();
            Ok(EXIT_FAILURE)
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let code = match dispatch(args).await {
        Ok(code) => code,
        Err(err) => {
            error!(%err, "Command failed");
            eprintln!("error: {err}");
            match err {
                SyncError::Unauthenticated => EXIT_UNAUTHENTICATED,
                _ => EXIT_FAILURE,
            }
        }
    };

    std::process::exit(code);
}
