//! Remote redirect log store.
//!
//! The store is an append-only table of `{user_id, timestamp, value, source}`
//! rows shared by every device a user signs in on. The accounting service only
//! talks to it through [`RemoteLogStore`].

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::accounting::{RedirectEvent, RedirectRecord};

mod migrations;
mod sqlite;

pub use sqlite::SqliteLogStore;

#[async_trait]
pub trait RemoteLogStore: Send + Sync {
    /// Insert every event tagged with `user_id`. Either all rows are written
    /// or none are.
    async fn insert_batch(&self, user_id: &str, events: &[RedirectEvent]) -> Result<()>;

    /// Rows for `user_id` with `from <= timestamp < to`, oldest first.
    async fn query_range(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RedirectRecord>>;
}
