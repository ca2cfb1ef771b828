//! Human-readable daily order codes.
//!
//! Codes look like `25-06-01-3`: a `YY-MM-DD` day key plus a 1-based sequence
//! number that resets at each new calendar day. The counter table is purely
//! in-memory; durability comes from the codes themselves, which are scanned
//! back out of the persisted orders at startup.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::NaiveDate;
use tracing::debug;

/// Day key in `YY-MM-DD` form, the order-code prefix and counter-table key.
pub fn day_key(date: NaiveDate) -> String {
    date.format("%y-%m-%d").to_string()
}

/// Split an order code into its day key and numeric suffix.
///
/// Returns `None` for anything that does not look like `YY-MM-DD-N`; callers
/// recovering counters skip such codes silently rather than failing startup.
pub fn parse_code(code: &str) -> Option<(String, u32)> {
    let parts: Vec<&str> = code.split('-').collect();
    if parts.len() != 4 {
        return None;
    }
    let suffix: u32 = parts[3].parse().ok()?;
    Some((parts[..3].join("-"), suffix))
}

// ---------------------------------------------------------------------------
// Daily counter table
// ---------------------------------------------------------------------------

/// Per-day order sequence counters. Single writer per process; the mutex
/// serialises concurrent request handlers so two orders issued within the
/// same day always receive strictly increasing, non-colliding suffixes.
pub struct DailyCounter {
    counters: Mutex<HashMap<String, u32>>,
}

impl DailyCounter {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Rebuild the table from persisted order codes, keeping the maximum
    /// suffix seen per day key. Unparseable codes are skipped.
    pub fn recover<'a>(codes: impl IntoIterator<Item = &'a str>) -> Self {
        let mut counters: HashMap<String, u32> = HashMap::new();
        for code in codes {
            match parse_code(code) {
                Some((key, suffix)) => {
                    let entry = counters.entry(key).or_insert(0);
                    if suffix > *entry {
                        *entry = suffix;
                    }
                }
                None => {
                    debug!(code, "skipping unparseable order code during counter recovery");
                }
            }
        }
        Self {
            counters: Mutex::new(counters),
        }
    }

    /// Issue the next code for the given date. Increments the day's counter
    /// under the lock and returns `"{day-key}-{counter}"`.
    pub fn next_code(&self, date: NaiveDate) -> String {
        let key = day_key(date);
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let counter = counters.entry(key.clone()).or_insert(0);
        *counter += 1;
        format!("{key}-{counter}")
    }

    /// Last suffix issued (or recovered) for a date, if any.
    pub fn last_issued(&self, date: NaiveDate) -> Option<u32> {
        let counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        counters.get(&day_key(date)).copied()
    }
}

impl Default for DailyCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn june_first() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).expect("valid date")
    }

    #[test]
    fn day_key_uses_two_digit_year() {
        assert_eq!(day_key(june_first()), "25-06-01");
        assert_eq!(
            day_key(NaiveDate::from_ymd_opt(2026, 12, 31).unwrap()),
            "26-12-31"
        );
    }

    #[test]
    fn parse_code_round_trips_issued_codes() {
        assert_eq!(parse_code("25-06-01-3"), Some(("25-06-01".into(), 3)));
        assert_eq!(parse_code("25-06-01-12"), Some(("25-06-01".into(), 12)));
    }

    #[test]
    fn parse_code_rejects_malformed_input() {
        assert_eq!(parse_code(""), None);
        assert_eq!(parse_code("25-06-01"), None);
        assert_eq!(parse_code("25-06-01-x"), None);
        assert_eq!(parse_code("25-06-01-3-4"), None);
    }

    #[test]
    fn codes_within_a_day_start_at_one_and_increase() {
        let counter = DailyCounter::new();
        assert_eq!(counter.next_code(june_first()), "25-06-01-1");
        assert_eq!(counter.next_code(june_first()), "25-06-01-2");
        assert_eq!(counter.next_code(june_first()), "25-06-01-3");

        // A new day resets to 1 without disturbing the previous day.
        let next_day = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        assert_eq!(counter.next_code(next_day), "25-06-02-1");
        assert_eq!(counter.last_issued(june_first()), Some(3));
    }

    #[test]
    fn recovery_continues_after_restart() {
        // Three orders exist from before a restart, plus one junk code that
        // must not fail recovery.
        let persisted = ["25-06-01-1", "25-06-01-2", "25-06-01-3", "legacy-code"];
        let counter = DailyCounter::recover(persisted);
        assert_eq!(counter.next_code(june_first()), "25-06-01-4");
    }

    #[test]
    fn recovery_keeps_the_maximum_suffix_per_day() {
        let persisted = ["25-06-01-7", "25-06-01-2", "25-05-30-4"];
        let counter = DailyCounter::recover(persisted);
        assert_eq!(counter.last_issued(june_first()), Some(7));
        assert_eq!(counter.next_code(june_first()), "25-06-01-8");
        let may_30 = NaiveDate::from_ymd_opt(2025, 5, 30).unwrap();
        assert_eq!(counter.next_code(may_30), "25-05-30-5");
    }

    #[test]
    fn concurrent_issue_never_collides() {
        use std::sync::Arc;

        let counter = Arc::new(DailyCounter::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let counter = Arc::clone(&counter);
            handles.push(std::thread::spawn(move || {
                (0..25)
                    .map(|_| counter.next_code(june_first()))
                    .collect::<Vec<_>>()
            }));
        }

        let mut all: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread join"))
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 200, "duplicate codes issued under contention");
        assert_eq!(counter.last_issued(june_first()), Some(200));
    }
}
