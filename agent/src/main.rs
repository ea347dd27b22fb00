//! Mission Agent - Entry Point
//!
//! Runs the mission for the active plan on this node and refreshes artifacts
//! when new plans arrive.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use mission_agent::app::options::{
    AppOptions, LifecycleOptions, RepositoryOptions, StorageOptions,
};
use mission_agent::app::run::run;
use mission_agent::logs::{init_logging, LogOptions};
use mission_agent::mission::orchestrator;
use mission_agent::storage::layout::StorageLayout;
use mission_agent::storage::settings::Settings;
use mission_agent::utils::version_info;
use mission_agent::workers::observer;

use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Unable to print version: {e}"),
        }
        return;
    }

    let layout = match cli_args.get("base_dir") {
        Some(base_dir) => StorageLayout::new(base_dir),
        None => StorageLayout::default(),
    };

    // Retrieve the settings file, defaults when missing
    let settings_file = match cli_args.get("settings") {
        Some(path) => mission_agent::filesys::file::File::new(path),
        None => layout.settings_file(),
    };
    let settings = if settings_file.exists().await {
        match settings_file.read_json::<Settings>().await {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Unable to read settings file: {e}");
                return;
            }
        }
    } else {
        Settings::default()
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level,
        file: settings.file_logs,
        json_format: settings.json_logs,
        log_dir: layout.logs_dir().path().to_path_buf(),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    let options = app_options(&cli_args, &settings, layout);

    info!("Running mission agent with options: {:?}", options);
    let result = run(version.version, options, await_shutdown_signal()).await;
    if let Err(e) = result {
        error!("Failed to run the agent: {e}");
    }
}

fn app_options(
    cli_args: &HashMap<String, String>,
    settings: &Settings,
    layout: StorageLayout,
) -> AppOptions {
    let polling_interval = Duration::from_secs(settings.polling_interval_secs.max(1));

    let repository = match (&settings.repository.url, &settings.repository.path) {
        (Some(url), _) => RepositoryOptions::Http(url.clone()),
        (None, Some(path)) => RepositoryOptions::Directory(PathBuf::from(path)),
        (None, None) => RepositoryOptions::Directory(layout.base_dir.join("repository")),
    };

    let plan_file = cli_args
        .get("plan")
        .or(settings.plan_file.as_ref())
        .map(PathBuf::from);

    AppOptions {
        lifecycle: LifecycleOptions {
            max_shutdown_delay: Duration::from_secs(settings.max_shutdown_delay_secs),
        },
        storage: StorageOptions { layout },
        repository,
        plan_file,
        plan_polling_interval: polling_interval,
        enable_observer: settings.enable_observer,
        enable_orchestrator: settings.enable_orchestrator,
        observer: observer::Options {
            interval: polling_interval,
            ..Default::default()
        },
        orchestrator: orchestrator::Options {
            polling_interval,
            ..Default::default()
        },
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    error!("Unable to install signal handlers, waiting for Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
