use chrono::{DateTime, Days, FixedOffset, Local, NaiveDate, NaiveTime, TimeZone, Utc};

pub const HISTORY_DAYS: usize = 7;

/// Source of calendar-day boundaries in the user's timezone.
pub trait DayClock: Send + Sync {
    fn today(&self) -> NaiveDate;

    /// `[start, end)` of `day` expressed in UTC.
    fn day_bounds(&self, day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>);
}

/// Uses the operating system's local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl DayClock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn day_bounds(&self, day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        bounds_in(&Local, day)
    }
}

/// Frozen clock pinned to a fixed offset.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: DateTime<FixedOffset>,
}

impl FixedClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self { now }
    }
}

impl DayClock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    fn day_bounds(&self, day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        bounds_in(self.now.offset(), day)
    }
}

/// The seven days before `today`, oldest first.
pub fn history_days(today: NaiveDate) -> [NaiveDate; HISTORY_DAYS] {
    let mut days = [today; HISTORY_DAYS];
    for (i, slot) in days.iter_mut().enumerate() {
        let back = (HISTORY_DAYS - i) as u64;
        *slot = today.checked_sub_days(Days::new(back)).unwrap_or(today);
    }
    days
}

fn bounds_in<Tz: TimeZone>(tz: &Tz, day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let next = day.succ_opt().unwrap_or(day);
    (local_midnight(tz, day), local_midnight(tz, next))
}

fn local_midnight<Tz: TimeZone>(tz: &Tz, day: NaiveDate) -> DateTime<Utc> {
    let naive = day.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&naive).earliest() {
        Some(dt) => dt.with_timezone(&Utc),
        // Midnight skipped by a DST jump; the day starts at the first valid hour.
        None => tz
            .from_local_datetime(&(naive + chrono::Duration::hours(1)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| naive.and_utc()),
    }
}
