//! Startup shared by the sheetlens binaries.

use std::sync::Arc;

use anyhow::{Context, Result};
use sheetlens_core::logging::LoggingGuard;
use sheetlens_core::{
    Config, Database, HttpModelBackend, HttpSheetFetcher, SessionStore, SyncController,
};

/// Loaded configuration plus the logging guard that must outlive `main`
pub struct Startup {
    pub config: Config,
    pub _log_guard: LoggingGuard,
}

/// Resolve XDG paths, load the config file and start file logging
pub fn startup(bin: &str) -> Result<Startup> {
    // XDG variables must be set before the core library resolves any path
    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;
    let log_guard =
        sheetlens_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!(bin, "starting");
    Ok(Startup {
        config,
        _log_guard: log_guard,
    })
}

/// Open the configuration store at its XDG path and migrate it
pub fn open_database() -> Result<Arc<Database>> {
    let db_path = Config::database_path();
    tracing::info!(path = %db_path.display(), "Opening database");

    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;
    Ok(Arc::new(db))
}

/// Wire HTTP fetcher, model backend and store into a controller
#[allow(dead_code)] // not needed by sheetlens-connect
pub fn open_controller(config: &Config, db: Arc<Database>) -> Result<SyncController> {
    let fetcher = HttpSheetFetcher::new(&config.sheet).context("failed to create sheet client")?;
    let backend =
        HttpModelBackend::new(&config.llm).context("failed to create model backend")?;
    let store: Arc<dyn SessionStore> = db;

    SyncController::new(config, Arc::new(fetcher), Arc::new(backend), store)
        .context("failed to load stored reports")
}

/// Render a core error with its remediation hint, if any
pub fn explain(error: &sheetlens_core::Error) -> String {
    match error.remediation() {
        Some(hint) => format!("{error}\n  hint: {hint}"),
        None => error.to_string(),
    }
}
