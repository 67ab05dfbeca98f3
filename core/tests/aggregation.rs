//! Aggregation by technician / supervisor / coordinator / city, time
//! series, repeat causes, totals, roster coverage and hour bands.

use std::str::FromStr;

use chrono::NaiveDate;
use fieldkpi_core::{
    aggregate::{
        aggregate, cause_pareto, coverage, daily_counts, drop_unallocated, hourly_bands,
        monthly_series, summarize, team_daily_average, weekly_series, CauseSide, GroupBy,
        HourBand,
    },
    classify::{ClassifiedRecord, Classifier, OperationRow},
    config::{CauseConfig, KpiConfig},
    error::KpiError,
    roster::{RosterIndex, RosterRow},
};

const SUCCESS: &str = "completed successfully";
const FAILURE: &str = "completed unsuccessfully";

fn roster_rows() -> Vec<RosterRow> {
    let member = |code: &str, name: &str, supervisor: &str, city: Option<&str>| RosterRow {
        primary_code: Some(code.into()),
        display_name: Some(name.into()),
        supervisor: Some(supervisor.into()),
        coordinator: Some("Carla".into()),
        city: city.map(Into::into),
        ..RosterRow::default()
    };
    vec![
        member("TR1", "Bob", "Alice", Some("Joinville")),
        member("TR2", "Dan", "Alice", Some("Joinville")),
        member("TR3", "Eve", "Zoe", None),
    ]
}

fn op(tech: &str, prev: Option<&str>, at: Option<&str>, status: &str, flag: bool) -> OperationRow {
    OperationRow {
        technician_name: Some(tech.into()),
        previous_technician_name: prev.map(Into::into),
        executed_at: at.map(Into::into),
        order_number: "SA".into(),
        status: status.into(),
        repeat_flag: Some(if flag { "SIM" } else { "NÃO" }.into()),
        ..OperationRow::default()
    }
}

fn classify(rows: &[OperationRow]) -> Vec<ClassifiedRecord> {
    let config = KpiConfig::default_test();
    let index = RosterIndex::build(&roster_rows(), &config.roster).unwrap();
    Classifier::new(&index, &config)
        .unwrap()
        .classify_all(rows)
        .records
}

fn sample() -> Vec<ClassifiedRecord> {
    classify(&[
        // TR1: 3 successes over 2 days, 1 field repeat.
        op("Bob (TR1)", None, Some("02/02/2026 08:15"), SUCCESS, false),
        op("Bob (TR1)", None, Some("02/02/2026 08:50"), SUCCESS, false),
        op("Bob (TR1)", Some("Old (TR9)"), Some("03/02/2026 14:00"), SUCCESS, true),
        op("Bob (TR1)", None, Some("03/02/2026 20:30"), FAILURE, true),
        // TR2: 1 success, 1 failure, 1 field repeat, one undated row.
        op("Dan (TR2)", Some("Bob (TR1)"), Some("02/02/2026 06:00"), FAILURE, true),
        op("Dan (TR2)", None, None, SUCCESS, false),
        // TR3 on another team, no city.
        op("Eve (TR3)", None, Some("04/02/2026 10:00"), SUCCESS, false),
        // Nobody to blame.
        op("Contractor", None, Some("04/02/2026 11:00"), FAILURE, true),
    ])
}

#[test]
fn group_counts_respect_invariants() {
    let records = sample();
    for group_by in GroupBy::ALL {
        for row in aggregate(&records, group_by) {
            assert_eq!(
                row.total_count,
                row.success_count + row.failure_count,
                "{group_by} {}",
                row.key
            );
            assert!(row.repeat_count <= row.total_count);
            assert!(row.repeat_count <= row.repeat_overall_count);
            assert_eq!(row.non_repeat_count, row.total_count - row.repeat_count);
        }
    }
}

#[test]
fn technician_rows_sorted_by_success_and_carry_rates() {
    let rows = aggregate(&sample(), GroupBy::Technician);
    let keys: Vec<&str> = rows.iter().map(|r| r.key.as_str()).collect();
    // TR2 and TR3 tie on one success; ties break by code.
    assert_eq!(keys, vec!["TR1", "TR2", "TR3"]);

    let bob = &rows[0];
    assert_eq!(bob.label, "Bob");
    assert_eq!(bob.total_count, 4);
    assert_eq!(bob.success_count, 3);
    assert_eq!(bob.repeat_count, 1);
    assert_eq!(bob.repeat_overall_count, 2);
    assert!((bob.rate_percent - 25.0).abs() < 1e-9);
    assert!((bob.overall_rate_percent - 50.0).abs() < 1e-9);
    assert!((bob.efficacy_percent - 75.0).abs() < 1e-9);
    assert_eq!(bob.productive_day_count, 2);
    assert!((bob.daily_average - 1.5).abs() < 1e-9);
}

#[test]
fn undated_records_count_in_totals_but_not_productive_days() {
    let rows = aggregate(&sample(), GroupBy::Technician);
    let dan = rows.iter().find(|r| r.key == "TR2").unwrap();
    assert_eq!(dan.total_count, 2);
    assert_eq!(dan.productive_day_count, 1);
    assert!((dan.daily_average - 1.0).abs() < 1e-9);
}

#[test]
fn supervisor_rows_sorted_by_rate_descending() {
    let rows = aggregate(&sample(), GroupBy::Supervisor);
    let keys: Vec<&str> = rows.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, vec!["Alice", "Zoe"]);
    // Alice: 6 records, 2 field repeats.
    assert_eq!(rows[0].total_count, 6);
    assert!((rows[0].rate_percent - 100.0 / 3.0).abs() < 1e-9);
    assert_eq!(rows[1].rate_percent, 0.0);
}

#[test]
fn unattributable_records_skip_groupings_but_hit_totals() {
    let records = sample();
    let grouped: u32 = aggregate(&records, GroupBy::City)
        .iter()
        .map(|r| r.total_count)
        .sum();
    assert_eq!(grouped, 7);

    let totals = summarize(&records);
    assert_eq!(totals.total, 8);
    assert_eq!(totals.success, 5);
    assert_eq!(totals.failure, 3);
    assert_eq!(totals.unattributable, 1);
    assert_eq!(totals.undated, 1);
    assert_eq!(totals.repeat_overall, 4);
    assert_eq!(totals.repeat_field, 2);
    assert!((totals.overall_rate_percent - 50.0).abs() < 1e-9);
    assert!((totals.field_rate_percent - 25.0).abs() < 1e-9);
}

#[test]
fn city_grouping_uses_placeholder_for_unknown_city() {
    let rows = aggregate(&sample(), GroupBy::City);
    assert!(rows.iter().any(|r| r.key == "Not informed" && r.total_count == 1));
    assert!(rows.iter().any(|r| r.key == "Joinville" && r.total_count == 6));
}

#[test]
fn group_by_parses_known_names_only() {
    assert_eq!(GroupBy::from_str("City").unwrap(), GroupBy::City);
    assert_eq!("technician".parse::<GroupBy>().unwrap(), GroupBy::Technician);
    match GroupBy::from_str("region") {
        Err(KpiError::InvalidGroupBy { value }) => assert_eq!(value, "region"),
        other => panic!("expected InvalidGroupBy, got {other:?}"),
    }
}

#[test]
fn daily_counts_bucket_by_calendar_date() {
    let days = daily_counts(&sample());
    let feb = |d| NaiveDate::from_ymd_opt(2026, 2, d).unwrap();

    assert_eq!(days.len(), 3);
    let d2 = &days[&feb(2)];
    assert_eq!((d2.total, d2.success, d2.failure), (3, 2, 1));
    assert_eq!((d2.repeat_overall, d2.repeat_field), (1, 1));
    assert!((d2.overall_rate_percent - 100.0 / 3.0).abs() < 1e-9);
    assert!((d2.field_rate_percent - 100.0 / 3.0).abs() < 1e-9);

    let d3 = &days[&feb(3)];
    assert_eq!((d3.total, d3.success, d3.failure), (2, 1, 1));
    assert_eq!((d3.repeat_overall, d3.repeat_field), (2, 1));
    assert!((d3.overall_rate_percent - 100.0).abs() < 1e-9);
    assert!((d3.field_rate_percent - 50.0).abs() < 1e-9);

    // The unattributable repeat still counts toward the overall rate.
    let d4 = &days[&feb(4)];
    assert_eq!((d4.total, d4.success, d4.failure), (2, 1, 1));
    assert_eq!((d4.repeat_overall, d4.repeat_field), (1, 0));
    assert!((d4.overall_rate_percent - 50.0).abs() < 1e-9);
    assert_eq!(d4.field_rate_percent, 0.0);
}

#[test]
fn monthly_series_runs_oldest_first_and_skips_undated() {
    let records = classify(&[
        op("Bob (TR1)", Some("Old (TR9)"), Some("15/01/2026 09:00"), FAILURE, true),
        op("Bob (TR1)", None, Some("20/01/2026 09:00"), SUCCESS, true),
        op("Bob (TR1)", None, Some("02/02/2026 09:00"), SUCCESS, false),
        op("Dan (TR2)", None, Some("30/12/2025 09:00"), SUCCESS, false),
        op("Dan (TR2)", None, None, SUCCESS, true),
    ]);
    let series = monthly_series(&records);
    let periods: Vec<&str> = series.iter().map(|p| p.period.as_str()).collect();
    assert_eq!(periods, vec!["2025-12", "2026-01", "2026-02"]);

    let jan = &series[1].counts;
    assert_eq!(jan.total, 2);
    assert_eq!(jan.repeat_overall, 2);
    assert_eq!(jan.repeat_field, 1);
    assert!((jan.overall_rate_percent - 100.0).abs() < 1e-9);
    assert!((jan.field_rate_percent - 50.0).abs() < 1e-9);
    assert_eq!(series.iter().map(|p| p.counts.total).sum::<u32>(), 4);
}

#[test]
fn weekly_series_follows_iso_weeks_across_the_year_end() {
    let records = classify(&[
        // Sunday 28 Dec 2025 closes ISO week 2025-W52.
        op("Bob (TR1)", None, Some("28/12/2025 10:00"), SUCCESS, false),
        // Monday 29 Dec 2025 already opens 2026-W01.
        op("Bob (TR1)", Some("Old (TR9)"), Some("29/12/2025 10:00"), FAILURE, true),
        op("Dan (TR2)", None, Some("02/01/2026 10:00"), SUCCESS, false),
        // Sunday 1 Feb is W05, Monday 2 Feb is W06.
        op("Dan (TR2)", None, Some("01/02/2026 10:00"), SUCCESS, true),
        op("Dan (TR2)", None, Some("02/02/2026 10:00"), SUCCESS, false),
    ]);
    let labels: Vec<String> = weekly_series(&records)
        .into_iter()
        .map(|p| p.label)
        .collect();
    assert_eq!(labels, vec!["2025-W52", "2026-W01", "2026-W05", "2026-W06"]);

    let series = weekly_series(&records);
    let w01 = &series[1];
    assert_eq!((w01.iso_year, w01.week), (2026, 1));
    assert_eq!(w01.counts.total, 2);
    assert!((w01.counts.field_rate_percent - 50.0).abs() < 1e-9);
    assert!((series[2].counts.overall_rate_percent - 100.0).abs() < 1e-9);
    assert_eq!(series[2].counts.field_rate_percent, 0.0);
}

fn closed(prev_tech: Option<&str>, closing: &str, previous: &str) -> OperationRow {
    OperationRow {
        closure_code: Some(closing.into()),
        previous_closure_code: Some(previous.into()),
        ..op("Bob (TR1)", prev_tech, Some("02/02/2026 09:00"), SUCCESS, true)
    }
}

#[test]
fn cause_pareto_ranks_field_repeat_causes() {
    let causes = CauseConfig {
        codes: [("F01", "Drop cable"), ("F02", "Connector")]
            .into_iter()
            .map(|(code, cause)| (code.to_string(), cause.to_string()))
            .collect(),
        fallback: "Other".into(),
        top: 2,
    };
    let records = classify(&[
        closed(Some("Old (TR9)"), "F01", "F02"),
        closed(Some("Old (TR9)"), "F01", "F02"),
        closed(Some("Old (TR9)"), "F01", "X99"),
        closed(Some("Old (TR9)"), " ", "F01"),
        // Flagged but nobody earlier to charge: not a field repeat.
        closed(None, "F02", "F02"),
    ]);

    let previous = cause_pareto(&records, &causes, CauseSide::Previous);
    let names: Vec<&str> = previous.iter().map(|r| r.cause.as_str()).collect();
    // Drop cable and Other tie on one; the name breaks the tie. Top 2 kept.
    assert_eq!(names, vec!["Connector", "Drop cable"]);
    assert_eq!(previous[0].count, 2);
    assert!((previous[0].percent - 50.0).abs() < 1e-9);
    assert!((previous[1].percent - 25.0).abs() < 1e-9);
    assert!((previous[1].cumulative_percent - 75.0).abs() < 1e-9);

    let closing = cause_pareto(&records, &causes, CauseSide::Closing);
    assert_eq!(closing.len(), 2);
    assert_eq!((closing[0].cause.as_str(), closing[0].count), ("Drop cable", 3));
    assert_eq!((closing[1].cause.as_str(), closing[1].count), ("Other", 1));
    assert!((closing[1].cumulative_percent - 100.0).abs() < 1e-9);
}

#[test]
fn unallocated_team_rows_are_dropped_from_team_rankings() {
    let config = KpiConfig::default_test();
    let records = classify(&[
        op("Bob (TR1)", None, Some("02/02/2026 09:00"), SUCCESS, false),
        // Not on the roster.
        op("Ghost (TR8)", Some("Old (TR9)"), Some("02/02/2026 10:00"), FAILURE, true),
    ]);

    let raw = aggregate(&records, GroupBy::Supervisor);
    assert!(raw.iter().any(|r| r.key == "Unallocated"));
    let supervisors = drop_unallocated(raw, GroupBy::Supervisor, &config.roster);
    let keys: Vec<&str> = supervisors.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, vec!["Alice"]);

    let coordinators = drop_unallocated(
        aggregate(&records, GroupBy::Coordinator),
        GroupBy::Coordinator,
        &config.roster,
    );
    assert!(coordinators.iter().all(|r| r.key == "Carla"));

    let technicians = drop_unallocated(
        aggregate(&records, GroupBy::Technician),
        GroupBy::Technician,
        &config.roster,
    );
    assert_eq!(technicians.len(), 2);
}

#[test]
fn empty_input_is_neutral() {
    assert!(aggregate(&[], GroupBy::Supervisor).is_empty());
    assert!(daily_counts(&[]).is_empty());
    let totals = summarize(&[]);
    assert_eq!(totals.total, 0);
    assert_eq!(totals.field_rate_percent, 0.0);
    assert_eq!(team_daily_average(&[], 28), 0.0);
}

#[test]
fn coverage_reports_roster_resolution() {
    let config = KpiConfig::default_test();
    let cov = coverage(&sample(), &config.roster);
    assert_eq!(cov.total_records, 8);
    assert_eq!(cov.identified_by_code, 7);
    assert_eq!(cov.with_supervisor, 7);
    assert_eq!(cov.unidentified, 1);
    assert_eq!(cov.with_city, 6);
}

#[test]
fn hour_bands_fold_off_hours_together() {
    let config = KpiConfig::default_test();
    let table = hourly_bands(&sample(), &config.hours);

    assert_eq!(table.bands.len(), 12);
    assert_eq!(table.bands[0], HourBand::Hour(8));
    assert_eq!(table.bands[11], HourBand::OffHours);
    assert_eq!(table.bands[0].label(), "08h");

    let bob = table.rows.iter().find(|r| r.code == "TR1").unwrap();
    assert_eq!(bob.total, 4);
    assert_eq!(bob.counts[0], 2); // 08h
    assert_eq!(bob.counts[6], 1); // 14h
    assert_eq!(bob.counts[11], 1); // 20:30

    // 08h and off-hours both hold 2; the earlier band wins the tie.
    assert_eq!(table.peak_band(), Some((HourBand::Hour(8), 2)));
    assert_eq!(table.grand_total(), 6);
    assert_eq!(table.quietest_band(), Some((HourBand::Hour(10), 1)));
    assert!((table.off_hours_percent() - 100.0 / 3.0).abs() < 1e-9);
    assert!((table.business_hour_average() - 4.0 / 11.0).abs() < 1e-9);
    // Undated and unattributable rows never reach the table.
    assert!(table.rows.iter().all(|r| !r.code.is_empty()));
}

#[test]
fn team_average_divides_by_technicians_and_calendar_days() {
    let rows = aggregate(&sample(), GroupBy::Technician);
    // 5 successes, 3 technicians, 28 days.
    let avg = team_daily_average(&rows, 28);
    assert!((avg - 5.0 / 84.0).abs() < 1e-12);
}
