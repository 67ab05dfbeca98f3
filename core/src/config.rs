use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{KpiError, KpiResult};

// ── Outcomes ───────────────────────────────────────────────────────

/// The two status labels that participate in aggregation.
/// Every other status is dropped before classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutcomeConfig {
    pub success: String,
    pub failure: String,
}

impl Default for OutcomeConfig {
    fn default() -> Self {
        Self {
            success: "completed successfully".into(),
            failure: "completed unsuccessfully".into(),
        }
    }
}

impl OutcomeConfig {
    /// True when `status` (trimmed) is one of the two whitelisted labels.
    pub fn accepts(&self, status: &str) -> bool {
        let status = status.trim();
        status == self.success || status == self.failure
    }
}

// ── Identifiers ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifierConfig {
    pub prefixes: Vec<String>,
    /// When true, `tr123` matches and is folded to `TR123`.
    pub case_insensitive: bool,
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        Self {
            prefixes: vec!["TR".into(), "TT".into(), "TC".into()],
            case_insensitive: false,
        }
    }
}

// ── Roster ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    #[default]
    FirstWriteWins,
    LastWriteWins,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterConfig {
    pub collision_policy: CollisionPolicy,
    pub unallocated_supervisor: String,
    pub default_status: String,
    pub not_found_status: String,
    pub unknown_city: String,
    pub unknown_coordinator: String,
    /// Cell values treated as empty (spreadsheet exports write NaN as text).
    pub placeholders: Vec<String>,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            collision_policy: CollisionPolicy::FirstWriteWins,
            unallocated_supervisor: "Unallocated".into(),
            default_status: "Active".into(),
            not_found_status: "Not found".into(),
            unknown_city: "Not informed".into(),
            unknown_coordinator: "Unallocated".into(),
            placeholders: vec!["".into(), "nan".into(), "None".into()],
        }
    }
}

impl RosterConfig {
    pub fn is_placeholder(&self, value: &str) -> bool {
        let value = value.trim();
        self.placeholders.iter().any(|p| p == value)
    }
}

// ── Timestamps ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimestampConfig {
    /// Tried in order; the first successful parse wins.
    pub formats: Vec<String>,
}

impl Default for TimestampConfig {
    fn default() -> Self {
        Self {
            formats: vec![
                "%d/%m/%Y %H:%M".into(),
                "%d/%m/%Y %H:%M:%S".into(),
                "%Y-%m-%d %H:%M:%S".into(),
                "%Y-%m-%dT%H:%M:%S".into(),
                "%Y-%m-%d %H:%M".into(),
                "%d/%m/%Y".into(),
                "%Y-%m-%d".into(),
            ],
        }
    }
}

// ── Sync / ranking / hours ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { batch_size: 100 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Below this many data points every technician is labelled N/A.
    pub min_population: usize,
    pub target_rate_percent: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            min_population: 4,
            target_rate_percent: 9.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HourConfig {
    pub first_hour: u32,
    pub last_hour: u32,
}

impl Default for HourConfig {
    fn default() -> Self {
        Self {
            first_hour: 8,
            last_hour: 18,
        }
    }
}

// ── Columns ────────────────────────────────────────────────────────

/// Header names for one operations-style export. Mandatory headers are
/// plain strings; a configured `Option` header is looked up but may be
/// absent from the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationColumns {
    pub technician: String,
    pub previous_technician: Option<String>,
    pub executed_at: String,
    /// Mandatory when configured.
    pub order_number: Option<String>,
    /// Mandatory when configured.
    pub status: Option<String>,
    /// Status written to every row of an export that has no status column.
    pub assumed_status: Option<String>,
    pub repeat_flag: Option<String>,
    pub period: Option<String>,
    pub closure_code: Option<String>,
    pub previous_closure_code: Option<String>,
}

impl Default for OperationColumns {
    fn default() -> Self {
        Self {
            technician: "technician".into(),
            previous_technician: Some("previous_technician".into()),
            executed_at: "executed_at".into(),
            order_number: Some("order_number".into()),
            status: Some("status".into()),
            assumed_status: None,
            repeat_flag: Some("repeat_flag".into()),
            period: None,
            closure_code: Some("closure_code".into()),
            previous_closure_code: Some("previous_closure_code".into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterColumns {
    pub primary_code: String,
    pub alias_code: Option<String>,
    pub display_name: String,
    pub supervisor: String,
    pub coordinator: Option<String>,
    pub city: Option<String>,
    pub status: Option<String>,
}

impl Default for RosterColumns {
    fn default() -> Self {
        Self {
            primary_code: "code".into(),
            alias_code: Some("alias_code".into()),
            display_name: "name".into(),
            supervisor: "supervisor".into(),
            coordinator: Some("coordinator".into()),
            city: Some("city".into()),
            status: Some("status".into()),
        }
    }
}

/// Where each export keeps its header. `*_header_row` counts the banner
/// rows above the header; `*_sheet` names the worksheet when the file is a
/// workbook (`None` takes the first sheet). CSV files ignore the sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    /// The repeat-analysis export the dashboard reads.
    pub operations: OperationColumns,
    /// The service-order export the sync loads into the store.
    pub orders: OperationColumns,
    pub roster: RosterColumns,
    pub delimiter: char,
    pub operations_header_row: usize,
    pub orders_header_row: usize,
    pub roster_header_row: usize,
    pub operations_sheet: Option<String>,
    pub orders_sheet: Option<String>,
    pub roster_sheet: Option<String>,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            operations: OperationColumns::default(),
            orders: OperationColumns::default(),
            roster: RosterColumns::default(),
            delimiter: ',',
            operations_header_row: 0,
            orders_header_row: 0,
            roster_header_row: 0,
            operations_sheet: None,
            orders_sheet: None,
            roster_sheet: None,
        }
    }
}

// ── Causes ─────────────────────────────────────────────────────────

/// Closure code → macro cause, used by the repeat-cause Pareto.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CauseConfig {
    pub codes: BTreeMap<String, String>,
    /// Cause for codes missing from `codes`, blank codes included.
    pub fallback: String,
    /// Pareto rows kept after sorting.
    pub top: usize,
}

impl Default for CauseConfig {
    fn default() -> Self {
        Self {
            codes: BTreeMap::new(),
            fallback: "Other".into(),
            top: 9,
        }
    }
}

impl CauseConfig {
    pub fn macro_cause(&self, code: &str) -> &str {
        self.codes
            .get(code.trim())
            .map(String::as_str)
            .unwrap_or(&self.fallback)
    }
}

// ── Root ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KpiConfig {
    pub outcomes: OutcomeConfig,
    pub repeat_flag_affirmative: String,
    pub identifiers: IdentifierConfig,
    pub roster: RosterConfig,
    pub timestamps: TimestampConfig,
    pub sync: SyncConfig,
    pub ranking: RankingConfig,
    pub hours: HourConfig,
    pub causes: CauseConfig,
    pub columns: ColumnConfig,
}

impl Default for KpiConfig {
    fn default() -> Self {
        Self {
            outcomes: OutcomeConfig::default(),
            repeat_flag_affirmative: "SIM".into(),
            identifiers: IdentifierConfig::default(),
            roster: RosterConfig::default(),
            timestamps: TimestampConfig::default(),
            sync: SyncConfig::default(),
            ranking: RankingConfig::default(),
            hours: HourConfig::default(),
            causes: CauseConfig::default(),
            columns: ColumnConfig::default(),
        }
    }
}

impl KpiConfig {
    /// Load `{data_dir}/kpi_config.json`.
    pub fn load(data_dir: &str) -> KpiResult<Self> {
        let path = format!("{data_dir}/kpi_config.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: KpiConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// English labels, comma-separated columns with plain snake_case headers.
    pub fn default_test() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> KpiResult<()> {
        if self.outcomes.success.trim().is_empty() || self.outcomes.failure.trim().is_empty() {
            return Err(KpiError::InvalidConfig {
                message: "outcome labels must not be empty".into(),
            });
        }
        if self.identifiers.prefixes.is_empty() {
            return Err(KpiError::InvalidConfig {
                message: "at least one identifier prefix is required".into(),
            });
        }
        if self.sync.batch_size == 0 {
            return Err(KpiError::InvalidConfig {
                message: "sync.batch_size must be positive".into(),
            });
        }
        if self.hours.first_hour > self.hours.last_hour || self.hours.last_hour > 23 {
            return Err(KpiError::InvalidConfig {
                message: format!(
                    "hour bands {}..={} are out of order",
                    self.hours.first_hour, self.hours.last_hour
                ),
            });
        }
        for (name, cols) in [
            ("operations", &self.columns.operations),
            ("orders", &self.columns.orders),
        ] {
            if cols.status.is_none() && cols.assumed_status.is_none() {
                return Err(KpiError::InvalidConfig {
                    message: format!(
                        "columns.{name} needs a status column or an assumed_status"
                    ),
                });
            }
        }
        Ok(())
    }
}
