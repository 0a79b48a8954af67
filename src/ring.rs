//! Signals from the Bluetooth ring.
//!
//! The listener process decodes the ring's notifications itself and prints
//! one line per event on stdout, with a marker line for every press.

/// Marker line the listener prints for a decoded button press.
pub const BUTTON_PRESS_MARKER: &str = "BUTTON PRESSED!";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerSignal {
    Scanning,
    DeviceFound(String),
    Connected,
    Subscribed,
    ButtonPressed,
    Other(String),
}

impl ListenerSignal {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.contains(BUTTON_PRESS_MARKER) {
            ListenerSignal::ButtonPressed
        } else if line.contains("Successfully subscribed to notifications") {
            ListenerSignal::Subscribed
        } else if line.contains("Successfully connected") {
            ListenerSignal::Connected
        } else if let Some((_, rest)) = line.split_once("Found device:") {
            let address = rest
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .trim_end_matches('.')
                .to_string();
            ListenerSignal::DeviceFound(address)
        } else if line.contains("Scanning for") {
            ListenerSignal::Scanning
        } else {
            ListenerSignal::Other(line.to_string())
        }
    }
}
