pub mod accounting;
pub mod auth;
pub mod overlay;
pub mod ring;
pub mod settings;
pub mod store;
mod utils;

use std::{path::PathBuf, sync::Arc, time::Instant};

use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use accounting::{RedirectAccountingService, SyncReport, SyncWorker};
use auth::AuthSession;
use overlay::{load_image_paths, AnchorLibrary, OverlayController, ToggleOutcome};
use ring::ListenerSignal;
use settings::SettingsStore;
use store::SqliteLogStore;

const ENABLE_LOGS: bool = true;

/// Listener input line that stands for a keyboard shortcut press.
const SHORTCUT_LINE: &str = "shortcut";

/// Objects owned for the lifetime of the process.
pub struct AppState {
    pub settings: SettingsStore,
    pub auth: Arc<AuthSession>,
    pub accounting: RedirectAccountingService,
    pub overlay: OverlayController,
}

impl AppState {
    pub fn new(data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let settings = SettingsStore::new(data_dir.join("settings.json"))?;
        let store = SqliteLogStore::open(data_dir.join("focusring.sqlite3"))?;

        let auth = Arc::new(AuthSession::new());
        if let Ok(user_id) = std::env::var("FOCUSRING_USER_ID") {
            auth.sign_in(user_id);
        }

        let current = settings.settings();
        let local_images = match &current.images_dir {
            Some(dir) => load_image_paths(dir).unwrap_or_else(|err| {
                log_warn!("Skipping local images: {err:?}");
                Vec::new()
            }),
            None => Vec::new(),
        };
        let library = AnchorLibrary {
            generated_images: Vec::new(),
            local_images,
            session_quotes: current.session_quotes.clone(),
        };

        let accounting = RedirectAccountingService::new(Arc::new(store), auth.clone());
        let overlay =
            OverlayController::new(accounting.clone(), library, current.shortcut_debounce());

        Ok(Self {
            settings,
            auth,
            accounting,
            overlay,
        })
    }
}

fn data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("FOCUSRING_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }
    ProjectDirs::from("app", "focusring", "FocusRing")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| anyhow!("no home directory to place app data in"))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase", tag = "event")]
enum OutputEvent<'a> {
    OverlayToggled(&'a ToggleOutcome),
    RingConnected,
}

fn emit(event: &OutputEvent<'_>) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(err) => log_error!("Failed to encode output event: {err}"),
    }
}

async fn handle_line(state: &AppState, line: &str) {
    if line.trim().eq_ignore_ascii_case(SHORTCUT_LINE) {
        if let Some(outcome) = state.overlay.shortcut_pressed(Instant::now()).await {
            emit(&OutputEvent::OverlayToggled(&outcome));
        }
        return;
    }

    match ListenerSignal::parse(line) {
        ListenerSignal::ButtonPressed => {
            let outcome = state.overlay.ring_pressed().await;
            emit(&OutputEvent::OverlayToggled(&outcome));
        }
        ListenerSignal::Connected => {
            log_info!("Bluetooth ring connected");
            emit(&OutputEvent::RingConnected);
        }
        ListenerSignal::Subscribed => log_info!("Ready to receive button presses"),
        ListenerSignal::Scanning => log_info!("Scanning for ring..."),
        ListenerSignal::DeviceFound(address) => log_info!("Ring found at {address}; connecting"),
        ListenerSignal::Other(text) => log::debug!("[listener] {text}"),
    }
}

async fn serve(state: AppState) -> Result<()> {
    let mut worker = SyncWorker::new();
    worker.start(state.accounting.clone(), state.settings.settings().sync_interval())?;

    state.overlay.activate_session().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_line(&state, &line).await,
                Ok(None) => break,
                Err(err) => {
                    log_error!("Failed to read listener output: {err}");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                log_info!("Interrupt received");
                break;
            }
        }
    }

    log_info!("Shutting down - syncing pending redirects");
    let stopped = worker.stop().await;
    shutdown(&state, stopped).await;
    Ok(())
}

/// Final flush. Runs even when the periodic worker did not stop cleanly.
async fn shutdown(state: &AppState, stopped: Result<()>) -> SyncReport {
    if let Err(err) = stopped {
        log_error!("Sync worker did not stop cleanly: {err:?}");
    }
    let report = state.accounting.sync_pending_logs().await;
    log_info!("Synced {} redirects, {} errors", report.synced, report.errors);
    report
}

pub fn run() -> Result<()> {
    // RUST_LOG overrides the default level.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("FocusRing starting up...");

    let state = AppState::new(data_dir()?)?;
    if !state.auth.is_authenticated() {
        log_warn!("No signed-in user; redirects stay local until FOCUSRING_USER_ID is set");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build async runtime")?;

    runtime.block_on(serve(state))
}
