//! Repeat/success aggregation over classified records.
//!
//! Every function here is a single pass over the records with per-key
//! counters. Results are recomputed from scratch for each filter change.
//!
//! Time series (daily, monthly, ISO-weekly) and the repeat-cause Pareto are
//! built from the same records.
//!
//! Output order is part of the contract:
//!   - technician rows: success count descending
//!   - supervisor / coordinator / city rows: field repeat rate descending
//! Ties fall back to the key so output is deterministic.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt,
    str::FromStr,
};

use chrono::{Datelike, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};

use crate::{
    classify::{ClassifiedRecord, Outcome},
    config::{CauseConfig, HourConfig, RosterConfig},
    error::KpiError,
    types::Period,
};

// ── Grouping ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    Technician,
    Supervisor,
    Coordinator,
    City,
}

impl GroupBy {
    pub const ALL: [GroupBy; 4] = [
        GroupBy::Technician,
        GroupBy::Supervisor,
        GroupBy::Coordinator,
        GroupBy::City,
    ];

    /// `None` for records without a responsible technician; those are
    /// excluded from every grouping.
    fn key_of<'r>(&self, record: &'r ClassifiedRecord) -> Option<&'r str> {
        if !record.is_attributable() {
            return None;
        }
        Some(match self {
            GroupBy::Technician => &record.responsible_code,
            GroupBy::Supervisor => &record.supervisor,
            GroupBy::Coordinator => &record.coordinator,
            GroupBy::City => &record.city,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GroupBy::Technician => "technician",
            GroupBy::Supervisor => "supervisor",
            GroupBy::Coordinator => "coordinator",
            GroupBy::City => "city",
        }
    }
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupBy {
    type Err = KpiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "technician" | "tech" => Ok(GroupBy::Technician),
            "supervisor" => Ok(GroupBy::Supervisor),
            "coordinator" => Ok(GroupBy::Coordinator),
            "city" => Ok(GroupBy::City),
            _ => Err(KpiError::InvalidGroupBy {
                value: s.to_string(),
            }),
        }
    }
}

// ── Aggregate rows ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub key: String,
    /// Display name for technician rows; the key itself otherwise.
    pub label: String,
    pub total_count: u32,
    pub success_count: u32,
    pub failure_count: u32,
    /// Field repeats: flagged AND a previous technician is on record.
    pub repeat_count: u32,
    pub repeat_overall_count: u32,
    pub non_repeat_count: u32,
    pub rate_percent: f64,
    pub overall_rate_percent: f64,
    pub efficacy_percent: f64,
    pub productive_day_count: u32,
    /// Successes per day with any activity, not per calendar day.
    pub daily_average: f64,
}

#[derive(Default)]
struct Accumulator {
    label: String,
    total: u32,
    success: u32,
    failure: u32,
    repeat: u32,
    repeat_overall: u32,
    days: BTreeSet<NaiveDate>,
}

fn percent(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

pub fn aggregate(records: &[ClassifiedRecord], group_by: GroupBy) -> Vec<AggregateRow> {
    let mut groups: HashMap<&str, Accumulator> = HashMap::new();

    for record in records {
        let Some(key) = group_by.key_of(record) else {
            continue;
        };
        let acc = groups.entry(key).or_insert_with(|| Accumulator {
            label: match group_by {
                GroupBy::Technician => record.display_name.clone(),
                _ => key.to_string(),
            },
            ..Accumulator::default()
        });

        acc.total += 1;
        match record.outcome {
            Outcome::Success => acc.success += 1,
            Outcome::Failure => acc.failure += 1,
        }
        if record.is_repeat_attributable {
            acc.repeat += 1;
        }
        if record.is_repeat_overall {
            acc.repeat_overall += 1;
        }
        if let Some(day) = record.execution_date() {
            acc.days.insert(day);
        }
    }

    let mut rows: Vec<AggregateRow> = groups
        .into_iter()
        .map(|(key, acc)| {
            let productive_days = acc.days.len() as u32;
            AggregateRow {
                key: key.to_string(),
                label: acc.label,
                total_count: acc.total,
                success_count: acc.success,
                failure_count: acc.failure,
                repeat_count: acc.repeat,
                repeat_overall_count: acc.repeat_overall,
                non_repeat_count: acc.total - acc.repeat,
                rate_percent: percent(acc.repeat, acc.total),
                overall_rate_percent: percent(acc.repeat_overall, acc.total),
                efficacy_percent: percent(acc.success, acc.total),
                productive_day_count: productive_days,
                daily_average: if productive_days == 0 {
                    0.0
                } else {
                    acc.success as f64 / productive_days as f64
                },
            }
        })
        .collect();

    match group_by {
        GroupBy::Technician => rows.sort_by(|a, b| {
            b.success_count
                .cmp(&a.success_count)
                .then_with(|| a.key.cmp(&b.key))
        }),
        _ => rows.sort_by(|a, b| {
            b.rate_percent
                .partial_cmp(&a.rate_percent)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.key.cmp(&b.key))
        }),
    }
    rows
}

/// Drops the roster's "no supervisor" / "no coordinator" bucket from team
/// rankings. Technician and city rows pass through unchanged.
pub fn drop_unallocated(
    rows: Vec<AggregateRow>,
    group_by: GroupBy,
    roster: &RosterConfig,
) -> Vec<AggregateRow> {
    let placeholder = match group_by {
        GroupBy::Supervisor => &roster.unallocated_supervisor,
        GroupBy::Coordinator => &roster.unknown_coordinator,
        GroupBy::Technician | GroupBy::City => return rows,
    };
    rows.into_iter().filter(|r| r.key != *placeholder).collect()
}

/// Total successes over (technicians × days in the period).
pub fn team_daily_average(rows: &[AggregateRow], days_in_period: u32) -> f64 {
    let denominator = rows.len() as u64 * days_in_period as u64;
    if denominator == 0 {
        return 0.0;
    }
    let successes: u64 = rows.iter().map(|r| r.success_count as u64).sum();
    successes as f64 / denominator as f64
}

// ── Time series ──────────────────────────────────────────────────────────────

/// Outcome and repeat tallies for one bucket of a time series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RepeatCounts {
    pub total: u32,
    pub success: u32,
    pub failure: u32,
    pub repeat_overall: u32,
    pub repeat_field: u32,
    pub overall_rate_percent: f64,
    pub field_rate_percent: f64,
}

impl RepeatCounts {
    fn add(&mut self, record: &ClassifiedRecord) {
        self.total += 1;
        match record.outcome {
            Outcome::Success => self.success += 1,
            Outcome::Failure => self.failure += 1,
        }
        if record.is_repeat_overall {
            self.repeat_overall += 1;
        }
        if record.is_repeat_attributable {
            self.repeat_field += 1;
        }
    }

    fn with_rates(mut self) -> Self {
        self.overall_rate_percent = percent(self.repeat_overall, self.total);
        self.field_rate_percent = percent(self.repeat_field, self.total);
        self
    }
}

fn bucket<K: Ord>(
    records: &[ClassifiedRecord],
    key: impl Fn(&ClassifiedRecord) -> Option<K>,
) -> BTreeMap<K, RepeatCounts> {
    let mut buckets: BTreeMap<K, RepeatCounts> = BTreeMap::new();
    for record in records {
        if let Some(k) = key(record) {
            buckets.entry(k).or_default().add(record);
        }
    }
    buckets
        .into_iter()
        .map(|(k, counts)| (k, counts.with_rates()))
        .collect()
}

/// Per calendar day; records without a timestamp are left out.
pub fn daily_counts(records: &[ClassifiedRecord]) -> BTreeMap<NaiveDate, RepeatCounts> {
    bucket(records, ClassifiedRecord::execution_date)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyPoint {
    pub period: Period,
    #[serde(flatten)]
    pub counts: RepeatCounts,
}

/// Overall vs field repeat rate per period, oldest first. Records without a
/// period are left out.
pub fn monthly_series(records: &[ClassifiedRecord]) -> Vec<MonthlyPoint> {
    bucket(records, |r| r.period.clone())
        .into_iter()
        .map(|(period, counts)| MonthlyPoint { period, counts })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyPoint {
    pub iso_year: i32,
    pub week: u32,
    /// `"2026-W07"`.
    pub label: String,
    #[serde(flatten)]
    pub counts: RepeatCounts,
}

/// Same tallies per ISO week of the execution date, in calendar order.
pub fn weekly_series(records: &[ClassifiedRecord]) -> Vec<WeeklyPoint> {
    bucket(records, |r| {
        r.execution_date().map(|d| {
            let week = d.iso_week();
            (week.year(), week.week())
        })
    })
    .into_iter()
    .map(|((iso_year, week), counts)| WeeklyPoint {
        iso_year,
        week,
        label: format!("{iso_year}-W{week:02}"),
        counts,
    })
    .collect()
}

// ── Repeat causes ────────────────────────────────────────────────────────────

/// Which closure code of a field repeat is charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CauseSide {
    /// The visit that was repeated.
    Previous,
    /// The repeat visit itself.
    Closing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParetoRow {
    pub cause: String,
    pub count: u32,
    pub percent: f64,
    pub cumulative_percent: f64,
}

/// Macro causes of field repeats, most frequent first. Percentages are over
/// every field repeat, so the cumulative column of a truncated list stops
/// short of 100.
pub fn cause_pareto(
    records: &[ClassifiedRecord],
    causes: &CauseConfig,
    side: CauseSide,
) -> Vec<ParetoRow> {
    let mut counts: HashMap<&str, u32> = HashMap::new();
    for record in records.iter().filter(|r| r.is_repeat_attributable) {
        let code = match side {
            CauseSide::Previous => &record.previous_closure_code,
            CauseSide::Closing => &record.closure_code,
        };
        let cause = causes.macro_cause(code).trim();
        if cause.is_empty() {
            continue;
        }
        *counts.entry(cause).or_default() += 1;
    }

    let whole: u32 = counts.values().sum();
    let mut ranked: Vec<(&str, u32)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let mut cumulative = 0.0;
    ranked
        .into_iter()
        .take(causes.top)
        .map(|(cause, count)| {
            let share = percent(count, whole);
            cumulative += share;
            ParetoRow {
                cause: cause.to_string(),
                count,
                percent: share,
                cumulative_percent: cumulative,
            }
        })
        .collect()
}

// ── Totals and coverage ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub total: u32,
    pub success: u32,
    pub failure: u32,
    pub repeat_overall: u32,
    pub repeat_field: u32,
    pub overall_rate_percent: f64,
    pub field_rate_percent: f64,
    pub efficacy_percent: f64,
    /// Records with no technician code at all.
    pub unattributable: u32,
    pub undated: u32,
}

pub fn summarize(records: &[ClassifiedRecord]) -> Totals {
    let mut totals = Totals::default();
    for record in records {
        totals.total += 1;
        match record.outcome {
            Outcome::Success => totals.success += 1,
            Outcome::Failure => totals.failure += 1,
        }
        if record.is_repeat_overall {
            totals.repeat_overall += 1;
        }
        if record.is_repeat_attributable {
            totals.repeat_field += 1;
        }
        if !record.is_attributable() {
            totals.unattributable += 1;
        }
        if record.executed_at.is_none() {
            totals.undated += 1;
        }
    }
    totals.overall_rate_percent = percent(totals.repeat_overall, totals.total);
    totals.field_rate_percent = percent(totals.repeat_field, totals.total);
    totals.efficacy_percent = percent(totals.success, totals.total);
    totals
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    pub total_records: u32,
    pub identified_by_code: u32,
    pub with_supervisor: u32,
    pub with_city: u32,
    pub unidentified: u32,
}

/// How much of the operations export the roster managed to resolve.
pub fn coverage(records: &[ClassifiedRecord], roster: &RosterConfig) -> Coverage {
    let mut cov = Coverage::default();
    for record in records {
        cov.total_records += 1;
        if record.is_attributable() {
            cov.identified_by_code += 1;
        }
        if record.supervisor == roster.unallocated_supervisor {
            cov.unidentified += 1;
        } else {
            cov.with_supervisor += 1;
        }
        if record.city != roster.unknown_city {
            cov.with_city += 1;
        }
    }
    cov
}

// ── Hour bands ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HourBand {
    Hour(u32),
    OffHours,
}

impl HourBand {
    pub fn label(&self) -> String {
        match self {
            HourBand::Hour(h) => format!("{h:02}h"),
            HourBand::OffHours => "off-hours".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourlyRow {
    pub code: String,
    pub label: String,
    /// Aligned with `HourlyTable::bands`.
    pub counts: Vec<u32>,
    pub total: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyTable {
    pub bands: Vec<HourBand>,
    pub rows: Vec<HourlyRow>,
    pub band_totals: Vec<u32>,
}

impl HourlyTable {
    pub fn grand_total(&self) -> u32 {
        self.band_totals.iter().sum()
    }

    /// Busiest band; the earliest band wins a tie.
    pub fn peak_band(&self) -> Option<(HourBand, u32)> {
        let mut best: Option<(HourBand, u32)> = None;
        for (band, &count) in self.bands.iter().zip(&self.band_totals) {
            match best {
                Some((_, c)) if count <= c => {}
                _ => best = Some((*band, count)),
            }
        }
        best
    }

    /// Quietest business-hour band with at least one completion.
    pub fn quietest_band(&self) -> Option<(HourBand, u32)> {
        self.bands
            .iter()
            .zip(&self.band_totals)
            .filter(|(band, &count)| **band != HourBand::OffHours && count > 0)
            .min_by_key(|(_, &count)| count)
            .map(|(band, &count)| (*band, count))
    }

    pub fn off_hours_percent(&self) -> f64 {
        let off = self
            .bands
            .iter()
            .zip(&self.band_totals)
            .find(|(band, _)| **band == HourBand::OffHours)
            .map(|(_, &c)| c)
            .unwrap_or(0);
        percent(off, self.grand_total())
    }

    /// Completions per business-hour band.
    pub fn business_hour_average(&self) -> f64 {
        let business: Vec<u32> = self
            .bands
            .iter()
            .zip(&self.band_totals)
            .filter(|(band, _)| **band != HourBand::OffHours)
            .map(|(_, &c)| c)
            .collect();
        if business.is_empty() {
            return 0.0;
        }
        business.iter().sum::<u32>() as f64 / business.len() as f64
    }
}

/// Completions per technician by hour band. Hours outside
/// `first_hour..=last_hour` share one off-hours band.
pub fn hourly_bands(records: &[ClassifiedRecord], hours: &HourConfig) -> HourlyTable {
    let mut bands: Vec<HourBand> = (hours.first_hour..=hours.last_hour)
        .map(HourBand::Hour)
        .collect();
    bands.push(HourBand::OffHours);
    let band_index = |hour: u32| -> usize {
        if (hours.first_hour..=hours.last_hour).contains(&hour) {
            (hour - hours.first_hour) as usize
        } else {
            bands.len() - 1
        }
    };

    let mut by_tech: HashMap<&str, HourlyRow> = HashMap::new();
    for record in records {
        let (Some(ts), true) = (record.executed_at, record.is_attributable()) else {
            continue;
        };
        let row = by_tech
            .entry(record.responsible_code.as_str())
            .or_insert_with(|| HourlyRow {
                code: record.responsible_code.clone(),
                label: record.display_name.clone(),
                counts: vec![0; bands.len()],
                total: 0,
            });
        row.counts[band_index(ts.hour())] += 1;
        row.total += 1;
    }

    let mut rows: Vec<HourlyRow> = by_tech.into_values().collect();
    rows.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.code.cmp(&b.code)));

    let mut band_totals = vec![0u32; bands.len()];
    for row in &rows {
        for (total, count) in band_totals.iter_mut().zip(&row.counts) {
            *total += count;
        }
    }

    HourlyTable {
        bands,
        rows,
        band_totals,
    }
}
