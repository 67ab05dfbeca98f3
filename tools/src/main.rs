//! kpi-runner: command-line front end for field-technician KPI reports.
//!
//! Usage:
//!   kpi-runner report --ops ops.csv --roster roster.csv [--period 2026-02]
//!                     [--supervisor NAME] [--viewer TR123] [--top 10] [--json]
//!   kpi-runner sync --ops base.xlsx --db orders.db
//!   kpi-runner periods --ops ops.csv --roster roster.csv

use anyhow::{bail, Context, Result};
use fieldkpi_core::{
    aggregate::{AggregateRow, GroupBy, ParetoRow},
    config::KpiConfig,
    dashboard::{Dashboard, DashboardContext, DashboardView, ViewerScope},
    source::{read_operations_path, read_orders_path, read_roster_path},
    store::OrderStore,
    sync::SyncDriver,
};
use std::env;

#[derive(serde::Serialize)]
struct ReportEnvelope<'a> {
    generated_at: String,
    available_periods: Vec<String>,
    view: &'a DashboardView,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("help");
    let data_dir = parse_str(&args, "--data-dir").unwrap_or("./data");

    let config = load_config(data_dir)?;

    match command {
        "report" => run_report(&args, config),
        "sync" => run_sync(&args, &config),
        "periods" => {
            let dashboard = build_dashboard(&args, config)?;
            for period in dashboard.available_periods() {
                println!("{period}");
            }
            Ok(())
        }
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn load_config(data_dir: &str) -> Result<KpiConfig> {
    let path = format!("{data_dir}/kpi_config.json");
    if std::path::Path::new(&path).exists() {
        Ok(KpiConfig::load(data_dir)?)
    } else {
        log::warn!("{path} not found, using built-in defaults");
        Ok(KpiConfig::default())
    }
}

fn build_dashboard(args: &[String], config: KpiConfig) -> Result<Dashboard> {
    let ops_path = required(args, "--ops")?;
    let roster_path = required(args, "--roster")?;

    let ops = read_operations_path(ops_path, &config.columns)
        .with_context(|| format!("reading operations export {ops_path}"))?;
    let roster = read_roster_path(roster_path, &config.columns)
        .with_context(|| format!("reading roster export {roster_path}"))?;
    Ok(Dashboard::build(config, &ops, &roster)?)
}

fn run_report(args: &[String], config: KpiConfig) -> Result<()> {
    let dashboard = build_dashboard(args, config)?;

    let viewer = match parse_str(args, "--viewer") {
        Some(code) => ViewerScope::Technician(code.to_string()),
        None => ViewerScope::Supervisor,
    };
    // Default to the newest period, the way the dashboard opens.
    let period = parse_str(args, "--period")
        .map(str::to_string)
        .or_else(|| dashboard.available_periods().into_iter().next());
    let ctx = DashboardContext {
        viewer,
        period,
        supervisor: parse_str(args, "--supervisor").map(str::to_string),
    };
    let view = dashboard.view(&ctx)?;

    if args.iter().any(|a| a == "--json") {
        let envelope = ReportEnvelope {
            generated_at: chrono::Local::now()
                .naive_local()
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            available_periods: dashboard.available_periods(),
            view: &view,
        };
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    } else {
        let top = parse_arg(args, "--top", 10usize);
        print_report(&view, top);
    }
    Ok(())
}

fn run_sync(args: &[String], config: &KpiConfig) -> Result<()> {
    let ops_path = required(args, "--ops")?;
    let db = required(args, "--db")?;

    let rows = read_orders_path(ops_path, &config.columns)
        .with_context(|| format!("reading service-order export {ops_path}"))?;
    let store = OrderStore::open(db)?;
    store.migrate()?;

    let report = SyncDriver::new(config).run(&store, &rows)?;

    println!("=== SYNC SUMMARY ===");
    println!("  run_id:            {}", report.run_id);
    match report.watermark {
        Some(mark) => println!("  watermark:         {mark}"),
        None => println!("  watermark:         (empty destination)"),
    }
    println!("  rows seen:         {}", report.rows_seen);
    println!("  dropped by status: {}", report.dropped_by_status);
    println!("  not newer:         {}", report.not_newer);
    println!("  unparseable:       {}", report.unparseable);
    println!("  missing timestamp: {}", report.missing);
    println!("  inserted:          {}", report.inserted);
    println!("  orders in store:   {}", store.order_count()?);
    Ok(())
}

fn print_report(view: &DashboardView, top: usize) {
    let t = &view.totals;
    let scope = match &view.context.viewer {
        ViewerScope::Supervisor => "supervisor".to_string(),
        ViewerScope::Technician(code) => format!("technician {code}"),
    };

    println!("=== KPI SUMMARY ===");
    println!("  viewer:          {scope}");
    println!(
        "  period:          {}",
        view.context.period.as_deref().unwrap_or("(all)")
    );
    if let Some(sup) = &view.context.supervisor {
        println!("  supervisor:      {sup}");
    }
    println!("  records:         {}", t.total);
    println!("  success:         {} ({:.2}%)", t.success, t.efficacy_percent);
    println!("  failure:         {}", t.failure);
    println!(
        "  repeats:         {} overall ({:.2}%), {} field ({:.2}%)",
        t.repeat_overall, t.overall_rate_percent, t.repeat_field, t.field_rate_percent
    );
    println!("  unattributable:  {}", t.unattributable);
    if let Some(avg) = view.team_daily_average {
        println!("  team daily avg:  {avg:.2}");
    }
    let dataset = &view.dataset_report;
    if dataset.unparseable_timestamps > 0 {
        println!(
            "  (whole export: {} row(s) with unparseable timestamps left out of date views)",
            dataset.unparseable_timestamps
        );
    }

    let c = &view.coverage;
    println!();
    println!("=== ROSTER COVERAGE ===");
    println!("  identified by code: {}/{}", c.identified_by_code, c.total_records);
    println!("  with supervisor:    {}", c.with_supervisor);
    println!("  with city:          {}", c.with_city);
    println!("  unidentified:       {}", c.unidentified);

    for group_by in GroupBy::ALL {
        println!();
        println!("=== BY {} ===", group_by.as_str().to_uppercase());
        print_rows(view.rows(group_by), top);
    }

    println!();
    println!("=== QUARTILE RANKING ===");
    if view.ranking.is_empty() {
        println!("  (no technicians)");
    }
    for r in &view.ranking {
        let previous = r
            .previous_rate_percent
            .map(|p| format!("{p:.2}%"))
            .unwrap_or_else(|| "-".into());
        println!(
            "  {:<24} {:>7.2}% (prev {:>7}) | {:<12} | {}",
            r.label,
            r.rate_percent,
            previous,
            r.quartile.as_str(),
            r.evolution.as_str()
        );
    }

    if !view.monthly.is_empty() {
        println!();
        println!("=== MONTHLY REPEAT RATE ===");
        for point in &view.monthly {
            println!(
                "  {:<10} total {:>5} | overall {:>6.2}% | field {:>6.2}%",
                point.period,
                point.counts.total,
                point.counts.overall_rate_percent,
                point.counts.field_rate_percent
            );
        }
    }
    if !view.weekly.is_empty() {
        println!();
        println!("=== WEEKLY REPEAT RATE ===");
        for point in &view.weekly {
            println!(
                "  {:<10} total {:>5} | overall {:>6.2}% | field {:>6.2}%",
                point.label,
                point.counts.total,
                point.counts.overall_rate_percent,
                point.counts.field_rate_percent
            );
        }
    }
    print_pareto("REPEAT CAUSES (PREVIOUS VISIT)", &view.previous_causes);
    print_pareto("REPEAT CAUSES (REPEAT VISIT)", &view.closing_causes);

    let hourly = &view.hourly;
    if let Some((band, count)) = hourly.peak_band() {
        println!();
        println!("=== HOUR BANDS ===");
        println!("  peak:            {} ({count} completions)", band.label());
        if let Some((quiet, quiet_count)) = hourly.quietest_band() {
            println!("  quietest:        {} ({quiet_count} completions)", quiet.label());
        }
        println!("  per band avg:    {:.1}", hourly.business_hour_average());
        println!("  off-hours share: {:.1}%", hourly.off_hours_percent());
    }
}

fn print_rows(rows: &[AggregateRow], top: usize) {
    if rows.is_empty() {
        println!("  (no records)");
        return;
    }
    for row in rows.iter().take(top) {
        println!(
            "  {:<24} total {:>5} | ok {:>5} | repeat {:>4} ({:>6.2}%) | {:.2}/day",
            row.label,
            row.total_count,
            row.success_count,
            row.repeat_count,
            row.rate_percent,
            row.daily_average
        );
    }
    if rows.len() > top {
        println!("  ... {} more", rows.len() - top);
    }
}

fn print_pareto(title: &str, rows: &[ParetoRow]) {
    if rows.is_empty() {
        return;
    }
    println!();
    println!("=== {title} ===");
    for row in rows {
        println!(
            "  {:<28} {:>5} | {:>6.2}% | cum {:>6.2}%",
            row.cause, row.count, row.percent, row.cumulative_percent
        );
    }
}

fn print_usage() {
    println!("kpi-runner: field-technician KPI reconciliation");
    println!();
    println!("  kpi-runner report --ops FILE --roster FILE [--data-dir DIR] [--period YYYY-MM]");
    println!("                    [--supervisor NAME] [--viewer CODE] [--top N] [--json]");
    println!("  kpi-runner sync --ops FILE --db FILE [--data-dir DIR]");
    println!("  kpi-runner periods --ops FILE --roster FILE [--data-dir DIR]");
}

fn parse_str<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn required<'a>(args: &'a [String], flag: &str) -> Result<&'a str> {
    match parse_str(args, flag) {
        Some(value) => Ok(value),
        None => bail!("missing required argument {flag}"),
    }
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
