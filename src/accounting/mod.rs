mod buffer;
pub mod clock;
pub mod event;
pub mod service;
pub mod stats;
pub mod worker;

pub use clock::{DayClock, FixedClock, SystemClock, HISTORY_DAYS};
pub use event::{ClickWeight, RedirectEvent, RedirectRecord, RedirectSource};
pub use service::RedirectAccountingService;
pub use stats::{DailyStats, SyncReport};
pub use worker::SyncWorker;
