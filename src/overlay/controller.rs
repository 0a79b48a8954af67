use std::{
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;

use super::anchor::{metric_anchor, Anchor, AnchorKind, AnchorLibrary};
use crate::accounting::{ClickWeight, RedirectAccountingService};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToggleOutcome {
    pub visible: bool,
    /// Set when the overlay was just shown.
    pub anchor: Option<Anchor>,
    /// Set when the press was counted.
    pub new_count: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OverlaySnapshot {
    pub visible: bool,
    pub session_active: bool,
    pub rotation: u64,
}

#[derive(Debug, Default)]
struct OverlayState {
    visible: bool,
    session_active: bool,
    last_shortcut: Option<Instant>,
    rotation: u64,
}

/// Reacts to ring and shortcut presses: flips the overlay, picks what to show
/// and counts the press while a tracked session is active.
#[derive(Clone)]
pub struct OverlayController {
    state: Arc<Mutex<OverlayState>>,
    accounting: RedirectAccountingService,
    library: Arc<RwLock<AnchorLibrary>>,
    shortcut_debounce: Duration,
}

impl OverlayController {
    pub fn new(
        accounting: RedirectAccountingService,
        library: AnchorLibrary,
        shortcut_debounce: Duration,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(OverlayState::default())),
            accounting,
            library: Arc::new(RwLock::new(library)),
            shortcut_debounce,
        }
    }

    pub fn accounting(&self) -> &RedirectAccountingService {
        &self.accounting
    }

    pub async fn snapshot(&self) -> OverlaySnapshot {
        let state = self.state.lock().await;
        OverlaySnapshot {
            visible: state.visible,
            session_active: state.session_active,
            rotation: state.rotation,
        }
    }

    /// Starts counting presses into a fresh session. Whatever the previous
    /// session left unsynced is pushed first; anything still unsynced after
    /// that is dropped with the reset. Presses wait on the state lock until
    /// the new session is in place.
    pub async fn activate_session(&self) {
        let mut state = self.state.lock().await;
        let report = self.accounting.sync_pending_logs().await;
        if report.errors > 0 {
            log_warn!(
                "Starting new session with {} unsynced redirects discarded",
                report.errors
            );
        }
        self.accounting.reset_session();
        state.session_active = true;
        log_info!("Session activated - redirect tracking enabled");
    }

    pub async fn end_session(&self) {
        self.state.lock().await.session_active = false;
        log_info!("Session ended - redirect tracking paused");
    }

    pub fn set_session_content(&self, quotes: Vec<String>, generated_images: Vec<String>) {
        let mut library = match self.library.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        library.session_quotes = quotes;
        library.generated_images = generated_images;
    }

    /// A ring press is always a full redirect.
    pub async fn ring_pressed(&self) -> ToggleOutcome {
        let (visible, show, new_count) = self
            .toggle(None, ClickWeight::Full)
            .await
            .unwrap_or_default();
        self.finish(visible, show, new_count).await
    }

    /// Shortcut presses inside the debounce window are ignored; the rest
    /// each count as half a redirect.
    pub async fn shortcut_pressed(&self, now: Instant) -> Option<ToggleOutcome> {
        let (visible, show, new_count) = self.toggle(Some(now), ClickWeight::Half).await?;
        Some(self.finish(visible, show, new_count).await)
    }

    /// Flips visibility and, while a session is active, records the press
    /// under the state lock. Returns the new visibility, the anchor kind to
    /// show (if becoming visible) and the new local count (if counted).
    async fn toggle(
        &self,
        shortcut_at: Option<Instant>,
        weight: ClickWeight,
    ) -> Option<(bool, Option<AnchorKind>, Option<f64>)> {
        let mut state = self.state.lock().await;

        if let Some(now) = shortcut_at {
            if let Some(last) = state.last_shortcut {
                if now.saturating_duration_since(last) < self.shortcut_debounce {
                    return None;
                }
            }
            state.last_shortcut = Some(now);
        }

        state.visible = !state.visible;
        let show = if state.visible {
            let kind = AnchorKind::for_rotation(state.rotation);
            state.rotation = state.rotation.wrapping_add(1);
            Some(kind)
        } else {
            None
        };

        let new_count = state.session_active.then(|| match weight {
            ClickWeight::Full => self.accounting.record_full_click(Utc::now()),
            ClickWeight::Half => self.accounting.record_half_click(Utc::now()),
        });

        Some((state.visible, show, new_count))
    }

    async fn finish(
        &self,
        visible: bool,
        show: Option<AnchorKind>,
        new_count: Option<f64>,
    ) -> ToggleOutcome {
        let anchor = match show {
            Some(AnchorKind::Metric) => {
                let stats = self.accounting.daily_stats().await;
                Some(metric_anchor(&stats, self.accounting.session_count()))
            }
            Some(kind) => Some(self.pick_still(kind)),
            None => None,
        };

        if let Some(count) = new_count {
            log_info!("Redirect counted; session total {count}");
        }

        ToggleOutcome {
            visible,
            anchor,
            new_count,
        }
    }

    fn pick_still(&self, kind: AnchorKind) -> Anchor {
        let library = match self.library.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut rng = rand::thread_rng();
        match kind {
            AnchorKind::Image => library.pick_image(&mut rng),
            _ => library.pick_quote(&mut rng),
        }
    }
}
