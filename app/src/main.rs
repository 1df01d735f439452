use std::error::Error;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use sqlnav_adapters::mysql::{bootstrap_credentials, MysqlDataAccess};
use sqlnav_core::config::{AppConfig, LoggingConfig, DEFAULT_LOG_FILTER};
use sqlnav_core::data_access::{Credentials, DataAccess};
use sqlnav_core::session::Exit;
use sqlnav_tui::{RunOptions, TuiError};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "SQLNAV_LOG";

fn run_app(
    config: &AppConfig,
    run_tui: impl FnOnce(Arc<dyn DataAccess>, Credentials, RunOptions) -> Result<Exit, TuiError>,
) -> Result<Exit, Box<dyn Error>> {
    let access: Arc<dyn DataAccess> = Arc::new(MysqlDataAccess::new(
        config.server.clone(),
        config.session.max_rows,
    ));
    let options = RunOptions {
        command_timeout: config.session.command_timeout(),
    };
    info!(
        host = %config.server.host,
        port = config.server.port,
        user = %config.bootstrap.user,
        "starting sqlnav"
    );
    let exit = run_tui(access, bootstrap_credentials(&config.bootstrap), options)?;
    Ok(exit)
}

fn log_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn init_logging(config: &LoggingConfig) -> io::Result<()> {
    let filter = log_filter(config);
    match &config.file {
        Some(path) => {
            let file = open_log_file(path)?;
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::sink)
                .try_init();
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let config = match AppConfig::load_default() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("sqlnav: {error}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(error) = init_logging(&config.logging) {
        eprintln!("sqlnav: failed to open log file: {error}");
        return ExitCode::FAILURE;
    }

    match run_app(&config, sqlnav_tui::run) {
        Ok(Exit::Requested) => ExitCode::SUCCESS,
        Ok(Exit::StartupFailure) => {
            eprintln!("sqlnav: could not start a session with the database server");
            ExitCode::FAILURE
        }
        Err(error) => {
            error!(%error, "sqlnav terminated");
            eprintln!("sqlnav: {error}");
            ExitCode::FAILURE
        }
    }
}
