use chrono::{Datelike, Local, NaiveDate};
use parking_lot::Mutex;
use tracing::warn;

/// Date-based serial for a given day (YYYYMMDD00)
pub fn date_serial(date: NaiveDate) -> u32 {
    date.year() as u32 * 1_000_000 + date.month() * 10_000 + date.day() * 100
}

/// Hands out SOA serials in `YYYYMMDDnn` form.
///
/// Serials never go backwards within one generator: a second serial minted
/// on the same day bumps the two-digit sequence. Past sequence 99 the serial
/// keeps counting into the next day's range, so it stays monotonic but no
/// longer reads as today's date.
#[derive(Debug, Default)]
pub struct SerialGenerator {
    last: Mutex<u32>,
}

impl SerialGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with the highest serial already handed out elsewhere
    pub fn starting_after(serial: u32) -> Self {
        Self {
            last: Mutex::new(serial),
        }
    }

    /// Raise the floor to a serial seen outside this generator, such as one
    /// already published
    pub fn observe(&self, serial: u32) {
        let mut last = self.last.lock();
        if serial > *last {
            *last = serial;
        }
    }

    pub fn last(&self) -> u32 {
        *self.last.lock()
    }

    pub fn next(&self) -> u32 {
        self.next_for(Local::now().date_naive())
    }

    pub fn next_for(&self, date: NaiveDate) -> u32 {
        let base = date_serial(date);
        let mut last = self.last.lock();
        let next = if *last >= base {
            let next = last.saturating_add(1);
            if next == base + 100 {
                warn!(
                    serial = next,
                    "Daily serial sequence exhausted, continuing into the next date range"
                );
            }
            next
        } else {
            base
        };
        *last = next;
        next
    }
}

/// SOA serial from zone-file text rendered by this crate, if any
pub fn published_serial(text: &str) -> Option<u32> {
    text.lines()
        .find_map(|line| line.trim().strip_suffix("; Serial"))
        .and_then(|value| value.trim().parse().ok())
}
