pub mod anchor;
pub mod controller;

pub use anchor::{load_image_paths, Anchor, AnchorKind, AnchorLibrary, MetricLabel};
pub use controller::{OverlayController, OverlaySnapshot, ToggleOutcome};
