use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Weight of a single recorded redirect. A ring press is a whole redirect;
/// a shortcut press is half of a show/hide cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ClickWeight {
    Full,
    Half,
}

impl ClickWeight {
    pub fn value(self) -> f64 {
        match self {
            ClickWeight::Full => 1.0,
            ClickWeight::Half => 0.5,
        }
    }

    pub fn from_value(value: f64) -> Option<Self> {
        if value == 1.0 {
            Some(ClickWeight::Full)
        } else if value == 0.5 {
            Some(ClickWeight::Half)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RedirectSource {
    Ring,
    Keyboard,
}

impl RedirectSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedirectSource::Ring => "ring",
            RedirectSource::Keyboard => "keyboard",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ring" => Some(RedirectSource::Ring),
            "keyboard" => Some(RedirectSource::Keyboard),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RedirectEvent {
    pub timestamp: DateTime<Utc>,
    pub weight: ClickWeight,
    pub source: RedirectSource,
}

impl RedirectEvent {
    pub fn full_click(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            weight: ClickWeight::Full,
            source: RedirectSource::Ring,
        }
    }

    pub fn half_click(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            weight: ClickWeight::Half,
            source: RedirectSource::Keyboard,
        }
    }

    pub fn value(&self) -> f64 {
        self.weight.value()
    }
}

/// A redirect row as persisted in the remote log store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RedirectRecord {
    pub id: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub source: RedirectSource,
}
