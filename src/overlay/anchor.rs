use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use rand::{seq::SliceRandom, Rng};
use serde::Serialize;

use crate::accounting::DailyStats;

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "webp", "bmp"];

pub const FALLBACK_QUOTES: [&str; 3] = [
    "Every moment of awareness is a victory. Noticing is the hardest part.",
    "Focus isn't never drifting. It's gently coming back, again and again.",
    "Each redirect builds something. Keep going.",
];

/// What the overlay shows, chosen by rotating through the kinds in order.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AnchorKind {
    Image,
    Quote,
    Metric,
}

impl AnchorKind {
    pub fn for_rotation(rotation: u64) -> Self {
        match rotation % 3 {
            0 => AnchorKind::Image,
            1 => AnchorKind::Quote,
            _ => AnchorKind::Metric,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Anchor {
    GeneratedImage { data_url: String },
    LocalImage { path: PathBuf },
    Quote { text: String },
    Metric { value: f64, label: MetricLabel },
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum MetricLabel {
    #[serde(rename = "Redirects Today")]
    RedirectsToday,
    #[serde(rename = "Session Redirects")]
    SessionRedirects,
}

/// Prefer the remote day total; before anything has landed remotely, show the
/// session's own count instead.
pub fn metric_anchor(stats: &DailyStats, session_count: f64) -> Anchor {
    if stats.today > 0.0 {
        Anchor::Metric {
            value: stats.today,
            label: MetricLabel::RedirectsToday,
        }
    } else {
        Anchor::Metric {
            value: session_count,
            label: MetricLabel::SessionRedirects,
        }
    }
}

/// Images and quotes available to the overlay.
#[derive(Debug, Clone, Default)]
pub struct AnchorLibrary {
    pub generated_images: Vec<String>,
    pub local_images: Vec<PathBuf>,
    pub session_quotes: Vec<String>,
}

impl AnchorLibrary {
    /// Generated images win over the local folder; with neither, a quote.
    pub fn pick_image<R: Rng + ?Sized>(&self, rng: &mut R) -> Anchor {
        if let Some(data_url) = self.generated_images.choose(rng) {
            return Anchor::GeneratedImage {
                data_url: data_url.clone(),
            };
        }
        if let Some(path) = self.local_images.choose(rng) {
            return Anchor::LocalImage { path: path.clone() };
        }
        self.pick_quote(rng)
    }

    pub fn pick_quote<R: Rng + ?Sized>(&self, rng: &mut R) -> Anchor {
        let text = match self.session_quotes.choose(rng) {
            Some(quote) => quote.clone(),
            None => FALLBACK_QUOTES
                .choose(rng)
                .copied()
                .unwrap_or(FALLBACK_QUOTES[0])
                .to_string(),
        };
        Anchor::Quote { text }
    }
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Image files directly inside `dir`, sorted. A missing folder is empty.
pub fn load_image_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && is_image_file(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_rotation_cycles_image_quote_metric() {
        let kinds: Vec<_> = (0..6).map(AnchorKind::for_rotation).collect();
        assert_eq!(
            kinds,
            vec![
                AnchorKind::Image,
                AnchorKind::Quote,
                AnchorKind::Metric,
                AnchorKind::Image,
                AnchorKind::Quote,
                AnchorKind::Metric,
            ]
        );
    }

    #[test]
    fn test_metric_prefers_remote_total() {
        let stats = DailyStats::local_only(4.0);
        assert_eq!(
            metric_anchor(&stats, 1.5),
            Anchor::Metric {
                value: 4.0,
                label: MetricLabel::RedirectsToday
            }
        );

        let empty = DailyStats::local_only(0.0);
        assert_eq!(
            metric_anchor(&empty, 1.5),
            Anchor::Metric {
                value: 1.5,
                label: MetricLabel::SessionRedirects
            }
        );
    }

    #[test]
    fn test_metric_serializes_display_label() {
        let today = metric_anchor(&DailyStats::local_only(3.0), 0.0);
        let today = serde_json::to_value(today).unwrap();
        assert_eq!(
            today,
            serde_json::json!({"kind": "metric", "value": 3.0, "label": "Redirects Today"})
        );

        let session = metric_anchor(&DailyStats::local_only(0.0), 2.5);
        let session = serde_json::to_string(&session).unwrap();
        assert!(session.contains(r#""label":"Session Redirects""#));
    }

    #[test]
    fn test_image_falls_back_to_quote() {
        let mut rng = StdRng::seed_from_u64(7);
        let library = AnchorLibrary::default();
        match library.pick_image(&mut rng) {
            Anchor::Quote { text } => assert!(FALLBACK_QUOTES.contains(&text.as_str())),
            other => panic!("expected quote, got {other:?}"),
        }
    }

    #[test]
    fn test_generated_images_take_priority() {
        let mut rng = StdRng::seed_from_u64(7);
        let library = AnchorLibrary {
            generated_images: vec!["data:image/png;base64,AAAA".into()],
            local_images: vec![PathBuf::from("calm.png")],
            session_quotes: Vec::new(),
        };
        assert_eq!(
            library.pick_image(&mut rng),
            Anchor::GeneratedImage {
                data_url: "data:image/png;base64,AAAA".into()
            }
        );
    }

    #[test]
    fn test_session_quotes_replace_fallbacks() {
        let mut rng = StdRng::seed_from_u64(7);
        let library = AnchorLibrary {
            session_quotes: vec!["Ship the draft.".into()],
            ..AnchorLibrary::default()
        };
        assert_eq!(
            library.pick_quote(&mut rng),
            Anchor::Quote {
                text: "Ship the draft.".into()
            }
        );
    }

    #[test]
    fn test_load_image_paths_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.PNG", "a.jpeg", "notes.txt", "c.webp"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("nested.png")).unwrap();

        let names: Vec<_> = load_image_paths(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpeg", "b.PNG", "c.webp"]);
    }

    #[test]
    fn test_missing_image_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_image_paths(&dir.path().join("absent")).unwrap().is_empty());
    }
}
