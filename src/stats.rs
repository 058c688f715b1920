//! Summary statistics over a spot's check history.

use chrono::{DateTime, Datelike, Utc, Weekday};
use serde::Serialize;

use crate::db::{CheckRecord, Occupancy};

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Streak {
    pub state: Occupancy,
    pub length: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SpotStats {
    pub total_checks: u64,
    pub failed_checks: u64,
    /// Percent of successful checks that saw the spot occupied.
    pub occupied_rate: f64,
    pub current_streak: Option<Streak>,
    pub longest_occupied_streak: u64,
    pub busiest_weekday: Option<String>,
    pub quietest_weekday: Option<String>,
    pub last_change_at: Option<DateTime<Utc>>,
}

/// Consecutive successful records sharing one result.
struct Run {
    state: Occupancy,
    length: u64,
    started_at: DateTime<Utc>,
}

fn runs(successes: &[&CheckRecord]) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    for record in successes {
        match runs.last_mut() {
            Some(run) if run.state == record.result => run.length += 1,
            _ => runs.push(Run {
                state: record.result,
                length: 1,
                started_at: record.timestamp,
            }),
        }
    }
    runs
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 * 100.0 / whole as f64
}

/// Summarize `records` in any order. Failed checks only count towards
/// `total_checks` and `failed_checks`.
pub fn summarize(records: &[CheckRecord]) -> SpotStats {
    let mut successes: Vec<&CheckRecord> =
        records.iter().filter(|record| !record.is_failure()).collect();
    successes.sort_by_key(|record| record.timestamp);

    let total_checks = records.len() as u64;
    let failed_checks = total_checks - successes.len() as u64;
    let occupied = successes
        .iter()
        .filter(|record| record.result == Occupancy::Occupied)
        .count() as u64;

    let runs = runs(&successes);
    let current_streak = runs.last().map(|run| Streak {
        state: run.state,
        length: run.length,
    });
    let longest_occupied_streak = runs
        .iter()
        .filter(|run| run.state == Occupancy::Occupied)
        .map(|run| run.length)
        .max()
        .unwrap_or(0);
    // The first run has no predecessor to differ from.
    let last_change_at = runs.iter().skip(1).last().map(|run| run.started_at);

    // (occupied, checked) per weekday, Monday first.
    let mut by_weekday = [(0u64, 0u64); 7];
    for record in &successes {
        let slot = &mut by_weekday[record.timestamp.weekday().num_days_from_monday() as usize];
        slot.1 += 1;
        if record.result == Occupancy::Occupied {
            slot.0 += 1;
        }
    }
    let rated: Vec<(Weekday, f64)> = WEEKDAYS
        .iter()
        .zip(by_weekday)
        .filter(|(_, (_, checked))| *checked > 0)
        .map(|(day, (hits, checked))| (*day, percent(hits, checked)))
        .collect();

    // Ties go to the earlier weekday.
    let busiest_weekday = rated
        .iter()
        .fold(None, |best: Option<(Weekday, f64)>, &(day, rate)| match best {
            Some((_, best_rate)) if best_rate >= rate => best,
            _ => Some((day, rate)),
        })
        .map(|(day, _)| weekday_name(day).to_string());
    let quietest_weekday = rated
        .iter()
        .fold(None, |best: Option<(Weekday, f64)>, &(day, rate)| match best {
            Some((_, best_rate)) if best_rate <= rate => best,
            _ => Some((day, rate)),
        })
        .map(|(day, _)| weekday_name(day).to_string());

    SpotStats {
        total_checks,
        failed_checks,
        occupied_rate: percent(occupied, successes.len() as u64),
        current_streak,
        longest_occupied_streak,
        busiest_weekday,
        quietest_weekday,
        last_change_at,
    }
}
