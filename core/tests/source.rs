//! CSV readers: header lookup, banner rows, delimiters and encodings.

use fieldkpi_core::{
    config::{ColumnConfig, KpiConfig, OperationColumns, RosterColumns},
    error::KpiError,
    dashboard::{Dashboard, DashboardContext},
    source::{read_operations, read_operations_path, read_orders, read_roster},
};

fn latin1(text: &str) -> Vec<u8> {
    text.chars().map(|c| c as u32 as u8).collect()
}

/// Service-order and roster layout with a two-line banner.
fn export_columns() -> ColumnConfig {
    ColumnConfig {
        orders: OperationColumns {
            technician: "Técnico Atribuído".into(),
            previous_technician: Some("tecnico_anterior".into()),
            executed_at: "Início Execução".into(),
            order_number: Some("Número SA".into()),
            status: Some("Estado".into()),
            repeat_flag: Some("in_flag_indicador".into()),
            ..OperationColumns::default()
        },
        roster: RosterColumns {
            primary_code: "TR".into(),
            alias_code: Some("TT".into()),
            display_name: "FUNCIONÁRIO".into(),
            supervisor: "SUPERVISOR".into(),
            coordinator: Some("COORDENADOR".into()),
            city: None,
            status: None,
        },
        delimiter: ';',
        orders_header_row: 2,
        ..ColumnConfig::default()
    }
}

fn production_config() -> KpiConfig {
    KpiConfig::load(concat!(env!("CARGO_MANIFEST_DIR"), "/../data")).unwrap()
}

#[test]
fn operations_read_by_header_name_in_any_order() {
    let csv = "status,Order_Number,TECHNICIAN,executed_at,repeat_flag,previous_technician\n\
               completed successfully,SA-1,Bob (TR001),03/02/2026 14:30,SIM,Carol (TR002)\n\
               completed unsuccessfully,SA-2,,,,\n";
    let config = KpiConfig::default_test();
    let rows = read_operations(csv.as_bytes(), &config.columns).unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].technician_name.as_deref(), Some("Bob (TR001)"));
    assert_eq!(rows[0].previous_technician_name.as_deref(), Some("Carol (TR002)"));
    assert_eq!(rows[0].executed_at.as_deref(), Some("03/02/2026 14:30"));
    assert_eq!(rows[0].order_number, "SA-1");
    assert_eq!(rows[0].repeat_flag.as_deref(), Some("SIM"));
    assert_eq!(rows[1].technician_name, None);
    assert_eq!(rows[1].executed_at, None);
    assert_eq!(rows[1].status, "completed unsuccessfully");
}

#[test]
fn missing_mandatory_column_is_an_error() {
    let csv = "technician,executed_at,order_number\nBob (TR001),03/02/2026 14:30,SA-1\n";
    let config = KpiConfig::default_test();
    match read_operations(csv.as_bytes(), &config.columns) {
        Err(KpiError::MissingColumn { column, .. }) => assert_eq!(column, "status"),
        other => panic!("expected MissingColumn, got {other:?}"),
    }
}

#[test]
fn missing_optional_columns_read_as_none() {
    let csv = "technician,executed_at,order_number,status\n\
               Bob (TR001),03/02/2026 14:30,SA-1,completed successfully\n";
    let config = KpiConfig::default_test();
    let rows = read_operations(csv.as_bytes(), &config.columns).unwrap();
    assert_eq!(rows[0].previous_technician_name, None);
    assert_eq!(rows[0].repeat_flag, None);
}

#[test]
fn latin1_order_export_with_banner_rows_and_semicolons() {
    let text = "Relatório de Operações\n\
                Gerado em 10/02/2026\n\
                Número SA;Técnico Atribuído;Início Execução;Estado;tecnico_anterior;in_flag_indicador\n\
                SA-9;JOÃO SILVA (TR12345);10/02/2026 08:00;Concluído com sucesso;;NÃO\n";
    let rows = read_orders(latin1(text).as_slice(), &export_columns()).unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].order_number, "SA-9");
    assert_eq!(rows[0].technician_name.as_deref(), Some("JOÃO SILVA (TR12345)"));
    assert_eq!(rows[0].status, "Concluído com sucesso");
    assert_eq!(rows[0].previous_technician_name, None);
    assert_eq!(rows[0].repeat_flag.as_deref(), Some("NÃO"));
}

#[test]
fn roster_reads_optional_alias_and_blank_cells() {
    let text = "TR;TT;FUNCIONÁRIO;SUPERVISOR;COORDENADOR\n\
                TR001;TT001;Bob Builder;Alice;Carla\n\
                TR002;;Dan;;\n";
    let rows = read_roster(text.as_bytes(), &export_columns()).unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].primary_code.as_deref(), Some("TR001"));
    assert_eq!(rows[0].alias_code.as_deref(), Some("TT001"));
    assert_eq!(rows[0].display_name.as_deref(), Some("Bob Builder"));
    assert_eq!(rows[0].coordinator.as_deref(), Some("Carla"));
    assert_eq!(rows[1].alias_code, None);
    assert_eq!(rows[1].supervisor, None);
    assert_eq!(rows[1].city, None);
}

#[test]
fn roster_without_code_column_is_rejected() {
    let text = "FUNCIONÁRIO;SUPERVISOR\nBob;Alice\n";
    match read_roster(text.as_bytes(), &export_columns()) {
        Err(KpiError::MissingColumn {
            column,
            source_name,
        }) => {
            assert_eq!(column, "TR");
            assert_eq!(source_name, "roster export");
        }
        other => panic!("expected MissingColumn, got {other:?}"),
    }
}

#[test]
fn production_config_file_parses() {
    let config = production_config();
    assert_eq!(config.outcomes.success, "Concluído com sucesso");
    assert_eq!(config.columns.orders_header_row, 11);
    assert_eq!(config.columns.operations_header_row, 0);
    assert_eq!(config.columns.roster_sheet.as_deref(), Some("Técnicos"));
    assert_eq!(config.columns.delimiter, ';');
    assert_eq!(config.roster.unallocated_supervisor, "Não alocado");
    assert_eq!(config.causes.top, 9);
}

const REPEAT_EXPORT: &str = "\
uf;mes;tecnico;tecnico_anterior;dat_abertura;in_flag_indicador;cod_fechamento;cod_fechamento_anterior;municipio
SC;2026-02;JOÃO SILVA (TR100);MARIA (TR200);2026-02-10 08:31:00;SIM;F01;F02;Joinville
SC;2026-02;JOÃO SILVA (TR100);;2026-02-11 14:00:00;NÃO;F01;;Joinville
SC;2026-02;;MARIA (TR200);2026-02-12 09:15:00;SIM;;F02;Blumenau
";

#[test]
fn repeat_export_reads_through_the_shipped_config() {
    let config = production_config();
    let rows = read_operations(latin1(REPEAT_EXPORT).as_slice(), &config.columns).unwrap();

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].technician_name.as_deref(), Some("JOÃO SILVA (TR100)"));
    assert_eq!(rows[0].previous_technician_name.as_deref(), Some("MARIA (TR200)"));
    assert_eq!(rows[0].executed_at.as_deref(), Some("2026-02-10 08:31:00"));
    assert_eq!(rows[0].repeat_flag.as_deref(), Some("SIM"));
    assert_eq!(rows[0].closure_code.as_deref(), Some("F01"));
    assert_eq!(rows[0].previous_closure_code.as_deref(), Some("F02"));
    // No status column: every row carries the configured status.
    assert!(rows.iter().all(|r| r.status == "Concluído com sucesso"));
    assert_eq!(rows[2].technician_name, None);

    let dash = Dashboard::build(config, &rows, &[]).unwrap();
    assert_eq!(dash.available_periods(), vec!["2026-02"]);
    let view = dash.view(&DashboardContext::supervisor_view()).unwrap();
    assert_eq!(view.totals.total, 3);
    assert_eq!(view.totals.repeat_overall, 2);
    assert_eq!(view.totals.repeat_field, 2);
    assert_eq!(view.dataset_report.dropped_by_status, 0);
    assert_eq!(view.dataset_report.unparseable_timestamps, 0);
}

#[test]
fn status_column_is_mandatory_once_configured() {
    let csv = "tecnico;dat_abertura\nBob (TR1);2026-02-10\n";
    let mut config = production_config();
    config.columns.operations.status = Some("Estado".into());
    match read_operations(csv.as_bytes(), &config.columns) {
        Err(KpiError::MissingColumn { column, .. }) => assert_eq!(column, "Estado"),
        other => panic!("expected MissingColumn, got {other:?}"),
    }
}

#[test]
fn missing_file_is_an_io_error() {
    let config = KpiConfig::default_test();
    match read_operations_path("/nonexistent/export.csv", &config.columns) {
        Err(KpiError::Io(_)) => {}
        other => panic!("expected Io, got {other:?}"),
    }
    assert!(read_operations_path("/nonexistent/base.xlsx", &config.columns).is_err());
}

#[test]
fn export_without_status_needs_an_assumed_status() {
    let mut config = KpiConfig::default_test();
    config.columns.operations.status = None;
    assert!(matches!(config.validate(), Err(KpiError::InvalidConfig { .. })));

    config.columns.operations.assumed_status = Some("completed successfully".into());
    assert!(config.validate().is_ok());
}
