//! Derived analytics over a collection of complaint records.
//!
//! Every view here is a pure function of the input slice: the same records
//! always yield the same [`AggregatedView`]. Nothing is persisted. The only
//! ambient input is the time zone used to bucket timestamps into months and
//! weekdays, which callers may pin with [`AggregatedView::from_records_in`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Datelike, Local, TimeZone};
use serde::Serialize;

use crate::model::{ComplaintRecord, ComplaintStatus};

/// Label used when a department or submitter name is missing.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Maximum number of entries on the submitter leaderboard.
pub const LEADERBOARD_SIZE: usize = 5;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Headline counters for the reports page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ComplaintStats {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub resolved: usize,
    pub returned: usize,
    /// Records whose status matched none of the four known statuses.
    pub unrecognized: usize,
    /// `round(resolved / total * 100)`, or 0 for an empty collection.
    pub resolution_rate: u32,
}

impl ComplaintStats {
    pub fn from_records(records: &[ComplaintRecord]) -> Self {
        let mut stats = ComplaintStats {
            total: records.len(),
            ..Default::default()
        };

        for record in records {
            match record.status {
                ComplaintStatus::Pending => stats.pending += 1,
                ComplaintStatus::InProgress => stats.in_progress += 1,
                ComplaintStatus::Resolved => stats.resolved += 1,
                ComplaintStatus::Returned => stats.returned += 1,
                ComplaintStatus::Unrecognized(_) => stats.unrecognized += 1,
            }
        }

        stats.resolution_rate = resolution_rate(stats.resolved, stats.total);
        stats
    }
}

/// Percentage of resolved complaints, rounded half up. Zero when `total` is zero.
pub fn resolution_rate(resolved: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (resolved as f64 / total as f64 * 100.0).round() as u32
}

/// One slice of the status pie chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSlice {
    pub label: String,
    pub count: usize,
    pub color: &'static str,
}

/// Received vs. resolved complaints for one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyBucket {
    /// `"Mon YY"`, e.g. `"Mar 24"`.
    pub name: String,
    pub received: usize,
    pub resolved: usize,
}

/// Workload split for one department.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepartmentBucket {
    pub name: String,
    pub pending: usize,
    pub in_progress: usize,
    pub resolved: usize,
}

impl DepartmentBucket {
    fn new(name: String) -> Self {
        Self {
            name,
            pending: 0,
            in_progress: 0,
            resolved: 0,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.resolved
    }
}

/// Submission count for one weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayIntensity {
    pub day: &'static str,
    pub count: usize,
    /// Largest single-day count across the week; identical on all seven entries.
    pub scale_max: usize,
}

/// A submitter and how many complaints they filed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitterCount {
    pub name: String,
    pub complaints: usize,
}

/// All chart-ready summaries for one collection of records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregatedView {
    pub stats: ComplaintStats,
    pub status_breakdown: Vec<StatusSlice>,
    pub monthly_trend: Vec<MonthlyBucket>,
    pub department_efficiency: Vec<DepartmentBucket>,
    pub weekly_intensity: [DayIntensity; 7],
    pub leaderboard: Vec<SubmitterCount>,
}

impl AggregatedView {
    /// Aggregate using the server's local time zone for month and weekday buckets.
    pub fn from_records(records: &[ComplaintRecord]) -> Self {
        Self::from_records_in(records, &Local)
    }

    /// Aggregate with an explicit time zone.
    pub fn from_records_in<Tz: TimeZone>(records: &[ComplaintRecord], tz: &Tz) -> Self {
        let stats = ComplaintStats::from_records(records);

        Self {
            status_breakdown: status_breakdown(&stats),
            monthly_trend: monthly_trend(records, tz),
            department_efficiency: department_efficiency(records),
            weekly_intensity: weekly_intensity(records, tz),
            leaderboard: leaderboard(records),
            stats,
        }
    }
}

/// Pie chart slices in fixed order, with empty slices dropped.
///
/// Only the four known statuses get a slice. Records counted in
/// [`ComplaintStats::unrecognized`] appear in no slice, so the slice counts
/// add up to `total - unrecognized`.
pub fn status_breakdown(stats: &ComplaintStats) -> Vec<StatusSlice> {
    [
        (ComplaintStatus::Pending, stats.pending, "#F97316"),
        (ComplaintStatus::InProgress, stats.in_progress, "#3B82F6"),
        (ComplaintStatus::Resolved, stats.resolved, "#10B981"),
        (ComplaintStatus::Returned, stats.returned, "#8B5CF6"),
    ]
    .into_iter()
    .filter(|(_, count, _)| *count > 0)
    .map(|(status, count, color)| StatusSlice {
        label: status.label().to_string(),
        count,
        color,
    })
    .collect()
}

/// Monthly received/resolved counts, in the order months are first seen.
///
/// The result is deliberately not sorted by calendar; records are usually
/// returned newest-first and the chart follows that order.
pub fn monthly_trend<Tz: TimeZone>(records: &[ComplaintRecord], tz: &Tz) -> Vec<MonthlyBucket> {
    let mut buckets: Vec<MonthlyBucket> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        let Some(created) = record.created_at else {
            continue;
        };
        let local = created.with_timezone(tz);
        let name = format!(
            "{} {:02}",
            MONTHS[local.month0() as usize],
            local.year().rem_euclid(100)
        );

        let slot = *index.entry(name.clone()).or_insert_with(|| {
            buckets.push(MonthlyBucket {
                name,
                received: 0,
                resolved: 0,
            });
            buckets.len() - 1
        });

        let bucket = &mut buckets[slot];
        bucket.received += 1;
        if record.status == ComplaintStatus::Resolved {
            bucket.resolved += 1;
        }
    }

    buckets
}

/// Per-department split into pending / in progress / resolved.
///
/// Only `Resolved` and `Pending` are detected; every other status, `Returned`
/// included, is counted as in progress.
pub fn department_efficiency(records: &[ComplaintRecord]) -> Vec<DepartmentBucket> {
    let mut buckets: Vec<DepartmentBucket> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        let name = name_or_unknown(record.department_name.as_deref());
        let slot = *index.entry(name.clone()).or_insert_with(|| {
            buckets.push(DepartmentBucket::new(name));
            buckets.len() - 1
        });

        let bucket = &mut buckets[slot];
        match record.status {
            ComplaintStatus::Resolved => bucket.resolved += 1,
            ComplaintStatus::Pending => bucket.pending += 1,
            _ => bucket.in_progress += 1,
        }
    }

    buckets
}

/// Submissions per weekday, Sunday first.
pub fn weekly_intensity<Tz: TimeZone>(records: &[ComplaintRecord], tz: &Tz) -> [DayIntensity; 7] {
    let mut counts = [0usize; 7];
    for created in records.iter().filter_map(|r| r.created_at) {
        let day = created.with_timezone(tz).weekday().num_days_from_sunday() as usize;
        counts[day] += 1;
    }

    let scale_max = counts.iter().copied().max().unwrap_or(0);

    std::array::from_fn(|day| DayIntensity {
        day: WEEKDAYS[day],
        count: counts[day],
        scale_max,
    })
}

/// Top submitters by complaint count.
///
/// Ties keep the order in which submitters first appear.
pub fn leaderboard(records: &[ComplaintRecord]) -> Vec<SubmitterCount> {
    let mut entries: Vec<SubmitterCount> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        let name = name_or_unknown(record.employee_name.as_deref());
        let slot = *index.entry(name.clone()).or_insert_with(|| {
            entries.push(SubmitterCount {
                name,
                complaints: 0,
            });
            entries.len() - 1
        });
        entries[slot].complaints += 1;
    }

    // sort_by is stable, which gives first-seen tie-breaking
    entries.sort_by(|a, b| b.complaints.cmp(&a.complaints));
    entries.truncate(LEADERBOARD_SIZE);
    entries
}

fn name_or_unknown(name: Option<&str>) -> String {
    match name {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => UNKNOWN_LABEL.to_string(),
    }
}

/// Remembers the last aggregated view together with the records it came from.
///
/// The cache is keyed on the collection's contents only, so a refetch that
/// returns identical records reuses the previous view.
#[derive(Debug, Default)]
pub struct ViewMemo {
    last: Option<(Vec<ComplaintRecord>, Arc<AggregatedView>)>,
}

impl ViewMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute(&mut self, records: Vec<ComplaintRecord>) -> Arc<AggregatedView> {
        if let Some((cached, view)) = &self.last {
            if *cached == records {
                return Arc::clone(view);
            }
        }

        let view = Arc::new(AggregatedView::from_records(&records));
        self.last = Some((records, Arc::clone(&view)));
        view
    }
}
