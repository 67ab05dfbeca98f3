//! One parameterised dashboard over the classified records.
//!
//! Who is looking and which slice they picked travel in an explicit
//! `DashboardContext`; nothing is remembered between calls. `view` rebuilds
//! every table from the classified snapshot on each call.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{
    aggregate::{
        aggregate, cause_pareto, coverage, daily_counts, drop_unallocated, hourly_bands,
        monthly_series, summarize, team_daily_average, weekly_series, AggregateRow, CauseSide,
        Coverage, GroupBy, HourlyTable, MonthlyPoint, ParetoRow, RepeatCounts, Totals,
        WeeklyPoint,
    },
    classify::{Classification, ClassificationReport, ClassifiedRecord, Classifier, OperationRow},
    config::KpiConfig,
    error::{KpiError, KpiResult},
    identifier::CodeExtractor,
    ranking::{rank_technicians, RankedTechnician},
    roster::{RosterCollision, RosterIndex, RosterRow},
    types::{Period, TechCode},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "code", rename_all = "snake_case")]
pub enum ViewerScope {
    /// Sees every technician, optionally narrowed to one supervisor's team.
    Supervisor,
    /// Sees only records attributed to this code.
    Technician(TechCode),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardContext {
    pub viewer: ViewerScope,
    /// `YYYY-MM`; `None` means every period.
    pub period: Option<Period>,
    pub supervisor: Option<String>,
}

impl DashboardContext {
    pub fn supervisor_view() -> Self {
        Self {
            viewer: ViewerScope::Supervisor,
            period: None,
            supervisor: None,
        }
    }

    pub fn technician_view(code: impl Into<TechCode>) -> Self {
        Self {
            viewer: ViewerScope::Technician(code.into()),
            period: None,
            supervisor: None,
        }
    }

    pub fn with_period(mut self, period: impl Into<Period>) -> Self {
        self.period = Some(period.into());
        self
    }

    pub fn with_supervisor(mut self, supervisor: impl Into<String>) -> Self {
        self.supervisor = Some(supervisor.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub context: DashboardContext,
    pub previous_period: Option<Period>,
    pub totals: Totals,
    pub coverage: Coverage,
    pub by_technician: Vec<AggregateRow>,
    pub by_supervisor: Vec<AggregateRow>,
    pub by_coordinator: Vec<AggregateRow>,
    pub by_city: Vec<AggregateRow>,
    pub daily: BTreeMap<NaiveDate, RepeatCounts>,
    pub weekly: Vec<WeeklyPoint>,
    /// Every period for the same viewer and supervisor, ignoring the period
    /// filter.
    pub monthly: Vec<MonthlyPoint>,
    /// Field-repeat causes charged to the repeated visit.
    pub previous_causes: Vec<ParetoRow>,
    /// Field-repeat causes recorded on the repeat visit.
    pub closing_causes: Vec<ParetoRow>,
    pub hourly: HourlyTable,
    pub ranking: Vec<RankedTechnician>,
    /// Successes per technician per calendar day. Supervisor viewers with a
    /// period selected only.
    pub team_daily_average: Option<f64>,
    /// Counters for the whole export, before any viewer or filter applies.
    pub dataset_report: ClassificationReport,
    pub roster_collisions: Vec<RosterCollision>,
}

impl DashboardView {
    pub fn rows(&self, group_by: GroupBy) -> &[AggregateRow] {
        match group_by {
            GroupBy::Technician => &self.by_technician,
            GroupBy::Supervisor => &self.by_supervisor,
            GroupBy::Coordinator => &self.by_coordinator,
            GroupBy::City => &self.by_city,
        }
    }
}

pub struct Dashboard {
    config: KpiConfig,
    roster: RosterIndex,
    classification: Classification,
    extractor: CodeExtractor,
}

impl Dashboard {
    /// Build the roster snapshot and classify every operations row once.
    pub fn build(
        config: KpiConfig,
        ops_rows: &[OperationRow],
        roster_rows: &[RosterRow],
    ) -> KpiResult<Self> {
        config.validate()?;
        let roster = RosterIndex::build(roster_rows, &config.roster)?;
        let classification = Classifier::new(&roster, &config)?.classify_all(ops_rows);
        let extractor = CodeExtractor::new(&config.identifiers)?;
        Ok(Self {
            config,
            roster,
            classification,
            extractor,
        })
    }

    pub fn config(&self) -> &KpiConfig {
        &self.config
    }

    pub fn roster(&self) -> &RosterIndex {
        &self.roster
    }

    pub fn records(&self) -> &[ClassifiedRecord] {
        &self.classification.records
    }

    /// Distinct periods present in the data, newest first.
    pub fn available_periods(&self) -> Vec<Period> {
        let periods: BTreeSet<&Period> = self
            .classification
            .records
            .iter()
            .filter_map(|r| r.period.as_ref())
            .collect();
        periods.into_iter().rev().cloned().collect()
    }

    /// Supervisors present in the data, alphabetically.
    pub fn supervisors(&self) -> Vec<String> {
        let names: BTreeSet<&String> = self
            .classification
            .records
            .iter()
            .filter(|r| r.is_attributable())
            .map(|r| &r.supervisor)
            .collect();
        names.into_iter().cloned().collect()
    }

    fn viewer_code(&self, viewer: &ViewerScope) -> KpiResult<Option<TechCode>> {
        match viewer {
            ViewerScope::Supervisor => Ok(None),
            ViewerScope::Technician(code) => {
                let code = code.trim().to_uppercase();
                if !self.extractor.is_code(&code) {
                    return Err(KpiError::InvalidTechnicianCode { value: code });
                }
                Ok(Some(code))
            }
        }
    }

    fn select(
        &self,
        period: Option<&str>,
        supervisor: Option<&str>,
        viewer_code: Option<&str>,
    ) -> Vec<ClassifiedRecord> {
        self.classification
            .records
            .iter()
            .filter(|r| period.map_or(true, |p| r.period.as_deref() == Some(p)))
            .filter(|r| supervisor.map_or(true, |s| r.supervisor == s))
            .filter(|r| viewer_code.map_or(true, |c| r.responsible_code == c))
            .cloned()
            .collect()
    }

    fn team_rows(&self, records: &[ClassifiedRecord], group_by: GroupBy) -> Vec<AggregateRow> {
        drop_unallocated(aggregate(records, group_by), group_by, &self.config.roster)
    }

    pub fn view(&self, ctx: &DashboardContext) -> KpiResult<DashboardView> {
        let viewer_code = self.viewer_code(&ctx.viewer)?;
        let period = ctx.period.as_deref().map(str::trim).filter(|p| !p.is_empty());
        let supervisor = ctx
            .supervisor
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let records = self.select(period, supervisor, viewer_code.as_deref());

        let previous_period = period
            .and_then(previous_period)
            .filter(|p| self.available_periods().contains(p));
        let previous_rows = match &previous_period {
            Some(prev) => aggregate(
                &self.select(Some(prev), supervisor, viewer_code.as_deref()),
                GroupBy::Technician,
            ),
            None => Vec::new(),
        };

        let history = self.select(None, supervisor, viewer_code.as_deref());
        let by_technician = aggregate(&records, GroupBy::Technician);
        let ranking = rank_technicians(&by_technician, &previous_rows, &self.config.ranking);
        let team_daily_average = match (&ctx.viewer, period.and_then(days_in_month)) {
            (ViewerScope::Supervisor, Some(days)) => {
                Some(team_daily_average(&by_technician, days))
            }
            _ => None,
        };

        log::debug!(
            "dashboard: {} record(s) in view {:?} / {:?}",
            records.len(),
            period,
            supervisor
        );

        Ok(DashboardView {
            context: ctx.clone(),
            previous_period,
            totals: summarize(&records),
            coverage: coverage(&records, &self.config.roster),
            by_supervisor: self.team_rows(&records, GroupBy::Supervisor),
            by_coordinator: self.team_rows(&records, GroupBy::Coordinator),
            by_city: aggregate(&records, GroupBy::City),
            daily: daily_counts(&records),
            weekly: weekly_series(&records),
            monthly: monthly_series(&history),
            previous_causes: cause_pareto(&records, &self.config.causes, CauseSide::Previous),
            closing_causes: cause_pareto(&records, &self.config.causes, CauseSide::Closing),
            hourly: hourly_bands(&records, &self.config.hours),
            by_technician,
            ranking,
            team_daily_average,
            dataset_report: self.classification.report.clone(),
            roster_collisions: self.roster.collisions().to_vec(),
        })
    }
}

fn first_of_month(period: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{}-01", period.trim()), "%Y-%m-%d").ok()
}

/// `"2026-03"` → `"2026-02"`.
pub fn previous_period(period: &str) -> Option<Period> {
    let first = first_of_month(period)?;
    let prev = first.checked_sub_months(Months::new(1))?;
    Some(format!("{:04}-{:02}", prev.year(), prev.month()))
}

pub fn days_in_month(period: &str) -> Option<u32> {
    let first = first_of_month(period)?;
    let next = first.checked_add_months(Months::new(1))?;
    Some((next - first).num_days() as u32)
}
