//! Readers for the operations, service-order and roster exports.
//!
//! Columns are located by header name (trimmed, case-insensitive), never by
//! position. CSV files that are not valid UTF-8 are decoded as Latin-1, which
//! is what the spreadsheet tool writes by default. Workbooks (`.xlsx`,
//! `.xlsm`, `.xlsb`, `.xls`, `.ods`) are read through calamine, from a named
//! sheet or the first one.

use std::{collections::HashMap, fs, io::Read, path::Path};

use calamine::{open_workbook_auto, Data, Reader};

use crate::{
    classify::OperationRow,
    config::{ColumnConfig, OperationColumns},
    error::{KpiError, KpiResult},
    roster::RosterRow,
    timestamp::format_canonical,
};

const OPERATIONS: &str = "operations export";
const ORDERS: &str = "service-order export";
const ROSTER: &str = "roster export";

const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

fn decode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        // Latin-1 maps every byte to the code point of the same value.
        Err(err) => err.into_bytes().iter().map(|&b| b as char).collect(),
    }
}

fn normalize_header(name: &str) -> String {
    name.trim().trim_start_matches('\u{feff}').trim().to_lowercase()
}

/// Text of one workbook cell, shaped like the same cell exported to CSV.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        // Codes and order numbers come back as floats; keep them integral.
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|ts| format_canonical(&ts))
            .unwrap_or_else(|| dt.as_f64().to_string()),
        _ => String::new(),
    }
}

fn is_workbook(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| WORKBOOK_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Header row plus data records, after dropping the banner rows.
struct Table {
    columns: HashMap<String, usize>,
    records: Vec<Vec<String>>,
    source_name: &'static str,
}

impl Table {
    fn new(header: Vec<String>, records: Vec<Vec<String>>, source_name: &'static str) -> Self {
        let columns = header
            .iter()
            .enumerate()
            .map(|(idx, name)| (normalize_header(name), idx))
            .collect();
        Self {
            columns,
            records,
            source_name,
        }
    }

    fn from_csv(
        mut reader: impl Read,
        delimiter: char,
        banner_rows: usize,
        source_name: &'static str,
    ) -> KpiResult<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let text = decode(bytes);
        let body: String = text
            .split_inclusive('\n')
            .skip(banner_rows)
            .collect();

        if !delimiter.is_ascii() {
            return Err(KpiError::InvalidConfig {
                message: format!("delimiter '{delimiter}' is not a single byte"),
            });
        }
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(delimiter as u8)
            .flexible(true)
            .has_headers(true)
            .from_reader(body.as_bytes());

        let header = csv_reader.headers()?.iter().map(str::to_string).collect();
        let records = csv_reader
            .records()
            .map(|record| record.map(|r| r.iter().map(str::to_string).collect()))
            .collect::<Result<Vec<_>, csv::Error>>()?;
        Ok(Self::new(header, records, source_name))
    }

    fn from_workbook(
        path: &Path,
        sheet: Option<&str>,
        banner_rows: usize,
        source_name: &'static str,
    ) -> KpiResult<Self> {
        let mut workbook = open_workbook_auto(path)?;
        let sheet_name = match sheet {
            Some(name) => name.to_string(),
            None => workbook
                .sheet_names()
                .first()
                .cloned()
                .ok_or_else(|| KpiError::InvalidConfig {
                    message: format!("{} has no worksheets", path.display()),
                })?,
        };
        let range = workbook.worksheet_range(&sheet_name)?;

        // The range starts at the first used cell, not at A1.
        let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);
        let mut rows = range
            .rows()
            .skip(banner_rows.saturating_sub(first_row))
            .map(|row| row.iter().map(cell_text).collect::<Vec<_>>());
        let header = rows.next().unwrap_or_default();
        let records = rows.collect();

        log::debug!("source: read sheet '{sheet_name}' of {}", path.display());
        Ok(Self::new(header, records, source_name))
    }

    fn open(
        path: &Path,
        config: &ColumnConfig,
        sheet: Option<&str>,
        banner_rows: usize,
        source_name: &'static str,
    ) -> KpiResult<Self> {
        if is_workbook(path) {
            Self::from_workbook(path, sheet, banner_rows, source_name)
        } else {
            Self::from_csv(fs::File::open(path)?, config.delimiter, banner_rows, source_name)
        }
    }

    fn required(&self, column: &str) -> KpiResult<usize> {
        self.columns
            .get(&normalize_header(column))
            .copied()
            .ok_or_else(|| KpiError::MissingColumn {
                column: column.to_string(),
                source_name: self.source_name.to_string(),
            })
    }

    fn optional(&self, column: Option<&str>) -> Option<usize> {
        let column = column?;
        let idx = self.columns.get(&normalize_header(column)).copied();
        if idx.is_none() {
            log::warn!(
                "source: optional column '{column}' not found in {}",
                self.source_name
            );
        }
        idx
    }

    /// A configured header must be present; an unconfigured one is skipped.
    fn configured(&self, column: Option<&str>) -> KpiResult<Option<usize>> {
        column.map(|name| self.required(name)).transpose()
    }
}

fn cell(record: &[String], idx: Option<usize>) -> Option<String> {
    let value = record.get(idx?)?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn operation_rows(table: &Table, cols: &OperationColumns) -> KpiResult<Vec<OperationRow>> {
    let technician = table.required(&cols.technician)?;
    let executed_at = table.required(&cols.executed_at)?;
    let order_number = table.configured(cols.order_number.as_deref())?;
    let status = table.configured(cols.status.as_deref())?;
    let previous = table.optional(cols.previous_technician.as_deref());
    let repeat_flag = table.optional(cols.repeat_flag.as_deref());
    let period = table.optional(cols.period.as_deref());
    let closure = table.optional(cols.closure_code.as_deref());
    let previous_closure = table.optional(cols.previous_closure_code.as_deref());

    let rows: Vec<OperationRow> = table
        .records
        .iter()
        .map(|record| OperationRow {
            technician_name: cell(record, Some(technician)),
            previous_technician_name: cell(record, previous),
            executed_at: cell(record, Some(executed_at)),
            order_number: cell(record, order_number).unwrap_or_default(),
            status: match status {
                Some(idx) => cell(record, Some(idx)).unwrap_or_default(),
                None => cols.assumed_status.clone().unwrap_or_default(),
            },
            repeat_flag: cell(record, repeat_flag),
            period: cell(record, period),
            closure_code: cell(record, closure),
            previous_closure_code: cell(record, previous_closure),
        })
        .collect();

    log::info!("source: read {} row(s) from {}", rows.len(), table.source_name);
    Ok(rows)
}

fn roster_rows(table: &Table, config: &ColumnConfig) -> KpiResult<Vec<RosterRow>> {
    let cols = &config.roster;
    let primary = table.required(&cols.primary_code)?;
    let display_name = table.required(&cols.display_name)?;
    let supervisor = table.required(&cols.supervisor)?;
    let alias = table.optional(cols.alias_code.as_deref());
    let coordinator = table.optional(cols.coordinator.as_deref());
    let city = table.optional(cols.city.as_deref());
    let status = table.optional(cols.status.as_deref());

    let rows: Vec<RosterRow> = table
        .records
        .iter()
        .map(|record| RosterRow {
            primary_code: cell(record, Some(primary)),
            alias_code: cell(record, alias),
            display_name: cell(record, Some(display_name)),
            supervisor: cell(record, Some(supervisor)),
            coordinator: cell(record, coordinator),
            city: cell(record, city),
            employment_status: cell(record, status),
        })
        .collect();

    log::info!("source: read {} roster row(s)", rows.len());
    Ok(rows)
}

/// The repeat-analysis export behind the dashboard, as CSV.
pub fn read_operations(reader: impl Read, config: &ColumnConfig) -> KpiResult<Vec<OperationRow>> {
    let table = Table::from_csv(reader, config.delimiter, config.operations_header_row, OPERATIONS)?;
    operation_rows(&table, &config.operations)
}

/// The service-order export the sync loads, as CSV.
pub fn read_orders(reader: impl Read, config: &ColumnConfig) -> KpiResult<Vec<OperationRow>> {
    let table = Table::from_csv(reader, config.delimiter, config.orders_header_row, ORDERS)?;
    operation_rows(&table, &config.orders)
}

pub fn read_roster(reader: impl Read, config: &ColumnConfig) -> KpiResult<Vec<RosterRow>> {
    let table = Table::from_csv(reader, config.delimiter, config.roster_header_row, ROSTER)?;
    roster_rows(&table, config)
}

pub fn read_operations_path(
    path: impl AsRef<Path>,
    config: &ColumnConfig,
) -> KpiResult<Vec<OperationRow>> {
    let table = Table::open(
        path.as_ref(),
        config,
        config.operations_sheet.as_deref(),
        config.operations_header_row,
        OPERATIONS,
    )?;
    operation_rows(&table, &config.operations)
}

pub fn read_orders_path(
    path: impl AsRef<Path>,
    config: &ColumnConfig,
) -> KpiResult<Vec<OperationRow>> {
    let table = Table::open(
        path.as_ref(),
        config,
        config.orders_sheet.as_deref(),
        config.orders_header_row,
        ORDERS,
    )?;
    operation_rows(&table, &config.orders)
}

pub fn read_roster_path(path: impl AsRef<Path>, config: &ColumnConfig) -> KpiResult<Vec<RosterRow>> {
    let table = Table::open(
        path.as_ref(),
        config,
        config.roster_sheet.as_deref(),
        config.roster_header_row,
        ROSTER,
    )?;
    roster_rows(&table, config)
}
