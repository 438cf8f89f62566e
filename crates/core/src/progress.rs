#![forbid(unsafe_code)]

//! Pure progress rules. Nothing here touches storage or the clock.

use crate::{HistoryRecord, Plan, PlanDay, PlanKind};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

fn is_done(history: &BTreeMap<u32, HistoryRecord>, day_number: u32) -> bool {
    history
        .get(&day_number)
        .is_some_and(HistoryRecord::is_completed)
}

/// Number of days `1..=k` that are all completed, counting from day 1.
pub fn longest_completed_prefix(day_count: u32, history: &BTreeMap<u32, HistoryRecord>) -> u32 {
    let mut prefix = 0;
    while prefix < day_count && is_done(history, prefix + 1) {
        prefix += 1;
    }
    prefix
}

/// Ordinal pointer: one past the longest completed prefix, clamped to the last day.
pub fn prefix_pointer(day_count: u32, history: &BTreeMap<u32, HistoryRecord>) -> u32 {
    (longest_completed_prefix(day_count, history) + 1).clamp(1, day_count.max(1))
}

/// Pointer update when completion is not coupled to the prefix: only completing the day the
/// pointer sits on moves it, to the next day that is not yet completed.
pub fn independent_pointer(
    current: u32,
    day_count: u32,
    changed_day: u32,
    completed: bool,
    history: &BTreeMap<u32, HistoryRecord>,
) -> u32 {
    let day_count = day_count.max(1);
    let current = current.clamp(1, day_count);
    if !completed || changed_day != current {
        return current;
    }
    (current + 1..=day_count)
        .find(|day| !is_done(history, *day))
        .unwrap_or(day_count)
}

/// Highest day whose scheduled date is on or before `today`, clamped to `[1, day_count]`.
/// Completion state plays no part.
pub fn date_anchored_current_day(days: &[PlanDay], today: NaiveDate, day_count: u32) -> u32 {
    days.iter()
        .filter(|day| {
            day.date
                .and_then(|date| date.resolve_near(today))
                .is_some_and(|date| date <= today)
        })
        .map(|day| day.day_number)
        .max()
        .unwrap_or(1)
        .clamp(1, day_count.max(1))
}

pub fn resolve_current_day(plan: &Plan, days: &[PlanDay], today: NaiveDate) -> u32 {
    match PlanKind::of(days) {
        PlanKind::DateAnchored => date_anchored_current_day(days, today, plan.day_count),
        PlanKind::Ordinal => plan.current_day.clamp(1, plan.day_count.max(1)),
    }
}

pub fn completed_days(day_count: u32, history: &BTreeMap<u32, HistoryRecord>) -> Vec<u32> {
    history
        .values()
        .filter(|record| record.is_completed() && (1..=day_count).contains(&record.day_number))
        .map(|record| record.day_number)
        .collect()
}

pub fn highest_completed_day(history: &BTreeMap<u32, HistoryRecord>) -> Option<u32> {
    history
        .values()
        .filter(|record| record.is_completed())
        .map(|record| record.day_number)
        .max()
}

pub fn is_iteration_complete(day_count: u32, history: &BTreeMap<u32, HistoryRecord>) -> bool {
    day_count > 0 && (1..=day_count).all(|day| is_done(history, day))
}

/// Counts iterations before `current_iteration` in which every day reached completion.
pub fn count_completed_iterations(
    day_count: u32,
    current_iteration: u32,
    records: &[HistoryRecord],
) -> u32 {
    let mut per_iteration: BTreeMap<u32, BTreeSet<u32>> = BTreeMap::new();
    for record in records {
        if record.iteration >= current_iteration || !record.is_completed() {
            continue;
        }
        if (1..=day_count).contains(&record.day_number) {
            per_iteration
                .entry(record.iteration)
                .or_default()
                .insert(record.day_number);
        }
    }

    let full = per_iteration
        .values()
        .filter(|days| days.len() as u64 == u64::from(day_count))
        .count();
    u32::try_from(full).unwrap_or(u32::MAX)
}
