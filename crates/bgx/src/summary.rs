// ai
//! 📊 summary.rs — "so... did we find anything?"
//!
//! 🚀 Running statistics for one search, accumulated result by result at the sink
//! and rendered once at the end as a borderless comfy-table on standard error.
//! Standard output is sacred ground. Only matches walk there.
//!
//! 🦆 The duck counted the batches twice. It got the same number both times. Promising.

use std::fmt;
use std::time::Duration;

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};

use crate::common::ScanResult;

/// 📊 Everything worth saying about a run once it is over.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// 🔑 keys the lister enumerated
    pub keys: usize,
    /// 📦 batches the lister emitted
    pub batches: usize,
    /// 📬 results that made it to the sink
    pub results: usize,
    pub matches: usize,
    pub errors: usize,
    /// ✂️ results that came back with a truncation note
    pub truncated: usize,
    pub records_scanned: usize,
    /// ⏱️ sum of per-batch round trips, for the average
    pub total_took: Duration,
    /// ⏱️ wall clock for the whole run
    pub elapsed: Duration,
}

impl RunSummary {
    /// 📥 Fold one result into the running totals. Matches are counted by whoever writes them.
    pub fn absorb(&mut self, result: &ScanResult) {
        self.results += 1;
        self.errors += result.errors.len();
        self.records_scanned += result.records_scanned;
        if result.truncated.is_some() {
            self.truncated += 1;
        }
        if let Some(took) = result.took {
            self.total_took += took;
        }
    }

    /// ⏱️ Mean per-batch duration. Zero results means zero, not a division by zero.
    pub fn average_took(&self) -> Duration {
        match u32::try_from(self.results) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total_took / n,
            Err(_) => Duration::from_secs_f64(self.total_took.as_secs_f64() / self.results as f64),
        }
    }

    /// 🍽️ A two-column, right-aligned, borderless table.
    pub fn render(&self) -> String {
        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);

        let rows = [
            ("keys", format_number(self.keys)),
            ("batches", format_number(self.batches)),
            ("records scanned", format_number(self.records_scanned)),
            ("matches", format_number(self.matches)),
            ("errors", format_number(self.errors)),
            ("truncated batches", format_number(self.truncated)),
            ("avg batch time", format_duration(self.average_took())),
            ("elapsed", format_duration(self.elapsed)),
        ];
        for (label, value) in rows {
            table.add_row(vec![
                Cell::new(label).set_alignment(CellAlignment::Right),
                Cell::new(value).set_alignment(CellAlignment::Right),
            ]);
        }
        table.to_string()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} keys in {} batches, {} records scanned, {} matches, {} errors, {} truncated, avg {} per batch",
            self.keys,
            self.batches,
            self.records_scanned,
            self.matches,
            self.errors,
            self.truncated,
            format_duration(self.average_took())
        )
    }
}

/// 🔢 "1000000" → "1,000,000". Eyes everywhere rejoice.
fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ Sub-second runs get milliseconds; longer ones get seconds with two decimals.
fn format_duration(duration: Duration) -> String {
    if duration < Duration::from_secs(1) {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a_result(errors: usize, truncated: bool, took_ms: u64, scanned: usize) -> ScanResult {
        ScanResult {
            errors: (0..errors).map(|i| format!("error {i}")).collect(),
            truncated: truncated.then(|| "skipping k9".to_string()),
            took: Some(Duration::from_millis(took_ms)),
            records_scanned: scanned,
            ..ScanResult::default()
        }
    }

    #[test]
    fn the_one_where_the_totals_add_up() {
        let mut the_summary = RunSummary::default();
        the_summary.absorb(&a_result(1, false, 100, 10));
        the_summary.absorb(&a_result(0, true, 300, 5));

        assert_eq!(the_summary.results, 2);
        assert_eq!(the_summary.errors, 1);
        assert_eq!(the_summary.truncated, 1);
        assert_eq!(the_summary.records_scanned, 15);
        assert_eq!(the_summary.average_took(), Duration::from_millis(200));
    }

    #[test]
    fn the_one_where_nothing_happened_and_nobody_divided_by_zero() {
        let the_summary = RunSummary::default();
        assert_eq!(the_summary.average_took(), Duration::ZERO);
        assert!(the_summary.render().contains("0ms"));
    }

    #[test]
    fn the_one_where_big_numbers_get_commas() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn the_one_where_durations_pick_their_units() {
        assert_eq!(format_duration(Duration::from_millis(42)), "42ms");
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.50s");
    }

    #[test]
    fn the_one_where_the_table_mentions_everything() {
        let the_summary = RunSummary {
            keys: 5,
            batches: 3,
            matches: 3,
            ..RunSummary::default()
        };
        let the_table = the_summary.render();
        for the_label in ["keys", "batches", "matches", "errors", "truncated batches", "avg batch time"] {
            assert!(the_table.contains(the_label), "💀 table lost the '{the_label}' row");
        }
        assert!(the_summary.to_string().starts_with("5 keys in 3 batches"));
    }
}
