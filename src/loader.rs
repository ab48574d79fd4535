use crate::error::RefreshError;
use crate::types::{
    CostRecord, DeliveryRecord, RawCostRow, RawRow, OUTCOME_FAILURE, OUTCOME_UNDEFINED,
    RETURNED_YES, STATUS_DONE,
};
use crate::util::{
    clean_text, competence_of, parse_competence, parse_datetime_safe, parse_f64_or_nan,
};
use chrono::{Duration, NaiveDateTime};
use csv::{ByteRecord, ReaderBuilder, StringRecord};
use std::io::Read;
use tracing::{debug, info, warn};

/// Minutes added to a known timestamp when the export lacks a column.
const ARRIVAL_AFTER_INVOICE_MIN: i64 = 90;
const COMPLETION_AFTER_INVOICE_MIN: i64 = 120;
const ROUTE_AFTER_ORDER_MIN: i64 = 30;

/// Which optional columns the source header actually carries.
///
/// Absence is a property of the whole export, not of a cell: a present column
/// with blank cells keeps its nulls, an absent one gets synthesized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceColumns {
    pub invoice_timestamp: bool,
    pub route_assigned_timestamp: bool,
    pub arrived_timestamp: bool,
    pub completed_timestamp: bool,
    pub status: bool,
    pub outcome_status: bool,
}

impl SourceColumns {
    pub fn from_headers(headers: &StringRecord) -> Self {
        let has = |name: &str| headers.iter().any(|h| h.trim() == name);
        Self {
            invoice_timestamp: has("data_hora_nf"),
            route_assigned_timestamp: has("Rota Atribuida"),
            arrived_timestamp: has("Chegou no Local"),
            completed_timestamp: has("Concluida"),
            status: has("situacao"),
            outcome_status: has("situacao_finalizado"),
        }
    }
}

/// Rows of the export plus what its header looked like.
#[derive(Debug, Default)]
pub struct RawTable {
    pub columns: SourceColumns,
    pub rows: Vec<RawRow>,
    pub parse_errors: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub total_rows: usize,
    pub normalized_rows: usize,
    pub parse_errors: usize,
    pub synthesized_columns: Vec<&'static str>,
}

/// Cells are decoded one by one; bytes that are not UTF-8 (a Latin-1 export,
/// say) degrade that cell only instead of dropping the row.
fn lossy_record(record: &ByteRecord) -> StringRecord {
    record
        .iter()
        .map(|cell| String::from_utf8_lossy(cell).into_owned())
        .collect()
}

pub fn read_raw<R: Read>(reader: R) -> Result<RawTable, csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);
    let headers = lossy_record(rdr.byte_headers()?);
    let columns = SourceColumns::from_headers(&headers);

    let mut rows = Vec::new();
    let mut parse_errors = 0usize;
    let mut record = ByteRecord::new();
    while rdr.read_byte_record(&mut record)? {
        match lossy_record(&record).deserialize::<RawRow>(Some(&headers)) {
            Ok(r) => rows.push(r),
            Err(e) => {
                debug!(error = %e, "Skipping unreadable source row");
                parse_errors += 1;
            }
        }
    }
    Ok(RawTable {
        columns,
        rows,
        parse_errors,
    })
}

/// Opens the export at `path`. A missing or unreadable file is reported as
/// [`RefreshError::SourceUnavailable`] so refresh can keep the old cache.
pub fn read_raw_file(path: &str) -> Result<RawTable, RefreshError> {
    let file = std::fs::File::open(path).map_err(|e| {
        warn!(path, error = %e, "Delivery source not available");
        RefreshError::SourceUnavailable(path.to_string())
    })?;
    read_raw(file).map_err(|e| {
        warn!(path, error = %e, "Delivery source unreadable");
        RefreshError::SourceUnavailable(path.to_string())
    })
}

fn shifted(ts: Option<NaiveDateTime>, minutes: i64) -> Option<NaiveDateTime> {
    ts.map(|t| t + Duration::minutes(minutes))
}

/// Brings a raw export into canonical shape. Pure: the same table always
/// yields the same records.
///
/// Without an invoice timestamp column there is no business date at all, so
/// the result is empty.
pub fn normalize(raw: &RawTable) -> Vec<DeliveryRecord> {
    let cols = raw.columns;
    if !cols.invoice_timestamp {
        warn!("Source has no data_hora_nf column; nothing to normalize");
        return Vec::new();
    }

    raw.rows
        .iter()
        .map(|row| {
            let order_timestamp = parse_datetime_safe(row.order_timestamp.as_deref());
            let invoice_timestamp = parse_datetime_safe(row.invoice_timestamp.as_deref());
            let date = invoice_timestamp.map(|ts| ts.date());
            let returned = clean_text(row.returned.clone());

            let status = if cols.status {
                clean_text(row.status.clone())
            } else {
                Some(STATUS_DONE.to_string())
            };
            let outcome_status = if cols.outcome_status {
                clean_text(row.outcome_status.clone())
            } else if returned.as_deref() == Some(RETURNED_YES) {
                Some(OUTCOME_FAILURE.to_string())
            } else {
                Some(OUTCOME_UNDEFINED.to_string())
            };

            let arrived_timestamp = if cols.arrived_timestamp {
                parse_datetime_safe(row.arrived_timestamp.as_deref())
            } else {
                shifted(invoice_timestamp, ARRIVAL_AFTER_INVOICE_MIN)
            };
            let completed_timestamp = if cols.completed_timestamp {
                parse_datetime_safe(row.completed_timestamp.as_deref())
            } else {
                shifted(invoice_timestamp, COMPLETION_AFTER_INVOICE_MIN)
            };
            let route_assigned_timestamp = if cols.route_assigned_timestamp {
                parse_datetime_safe(row.route_assigned_timestamp.as_deref())
            } else {
                shifted(order_timestamp, ROUTE_AFTER_ORDER_MIN)
            };

            DeliveryRecord {
                order_timestamp,
                invoice_timestamp,
                route_assigned_timestamp,
                arrived_timestamp,
                completed_timestamp,
                invoice_value: parse_f64_or_nan(row.invoice_value.as_deref()),
                freight_value: parse_f64_or_nan(row.freight_value.as_deref()),
                zone: clean_text(row.zone.clone()),
                rider: clean_text(row.rider.clone()),
                client: clean_text(row.client.clone()),
                seller: clean_text(row.seller.clone()),
                route_name: clean_text(row.route_name.clone()),
                service_title: clean_text(row.service_title.clone()),
                returned,
                status,
                outcome_status,
                date,
                competence: date.map(competence_of),
            }
        })
        .collect()
}

fn synthesized(cols: SourceColumns) -> Vec<&'static str> {
    let mut out = Vec::new();
    if !cols.status {
        out.push("situacao");
    }
    if !cols.outcome_status {
        out.push("situacao_finalizado");
    }
    if !cols.arrived_timestamp {
        out.push("Chegou no Local");
    }
    if !cols.completed_timestamp {
        out.push("Concluida");
    }
    if !cols.route_assigned_timestamp {
        out.push("Rota Atribuida");
    }
    out
}

/// Reads and normalizes the export in one go.
pub fn load_and_clean(path: &str) -> Result<(Vec<DeliveryRecord>, LoadReport), RefreshError> {
    let raw = read_raw_file(path)?;
    let records = normalize(&raw);
    let report = LoadReport {
        total_rows: raw.rows.len() + raw.parse_errors,
        normalized_rows: records.len(),
        parse_errors: raw.parse_errors,
        synthesized_columns: if raw.columns.invoice_timestamp {
            synthesized(raw.columns)
        } else {
            Vec::new()
        },
    };
    info!(
        path,
        total_rows = report.total_rows,
        normalized_rows = report.normalized_rows,
        parse_errors = report.parse_errors,
        synthesized = ?report.synthesized_columns,
        "Delivery source normalized"
    );
    Ok((records, report))
}

pub fn read_costs<R: Read>(reader: R) -> Result<Vec<CostRecord>, csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);
    let mut out = Vec::new();
    for result in rdr.deserialize::<RawCostRow>() {
        let row = match result {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "Skipping unreadable cost row");
                continue;
            }
        };
        out.push(CostRecord {
            competence: parse_competence(row.competence.as_deref()),
            region: clean_text(row.region),
            total_cost: parse_f64_or_nan(row.total_cost.as_deref()),
        });
    }
    Ok(out)
}

/// Rider cost ledger. An unavailable ledger is an empty one: costs then read
/// as zero rather than blocking the dashboard.
pub fn load_costs(path: &str) -> Vec<CostRecord> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) => {
            warn!(path, error = %e, "Cost ledger not available");
            return Vec::new();
        }
    };
    match read_costs(file) {
        Ok(costs) => {
            info!(path, rows = costs.len(), "Cost ledger loaded");
            costs
        }
        Err(e) => {
            warn!(path, error = %e, "Cost ledger unreadable");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OUTCOME_SUCCESS, STATUS_CANCELLED};
    use chrono::NaiveDate;

    const FULL_CSV: &str = "\
data_hora_pedido,data_hora_nf,Rota Atribuida,Chegou no Local,Concluida,valor_nf,valor_frete,zona,motoqueiro,Cliente,vendedor,rota_nome,servico_titulo,devolucao,situacao,situacao_finalizado
2024-03-05 08:00:00,2024-03-05 09:00:00,2024-03-05 08:20:00,2024-03-05 09:30:00,2024-03-05 09:40:00,150.50,12,IGARASSU,João,Loja A,Ana,R1,Entrega,NAO,Realizada,Sucesso
bad,2024-03-05 10:00:00,,,,abc,,,,,,,,,Cancelada,
";

    fn ts(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0).unwrap()
    }

    #[test]
    fn test_full_header_keeps_cells() {
        let raw = read_raw(FULL_CSV.as_bytes()).unwrap();
        assert_eq!(raw.rows.len(), 2);
        let records = normalize(&raw);

        let r = &records[0];
        assert_eq!(r.invoice_timestamp, Some(ts(2024, 3, 5, 9, 0)));
        assert_eq!(r.date, NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(r.competence.as_deref(), Some("2024-03"));
        assert_eq!(r.invoice_value, 150.5);
        assert_eq!(r.freight_value, 12.0);
        assert_eq!(r.zone.as_deref(), Some("IGARASSU"));
        assert_eq!(r.status.as_deref(), Some(STATUS_DONE));
        assert_eq!(r.outcome_status.as_deref(), Some(OUTCOME_SUCCESS));
    }

    #[test]
    fn test_bad_cells_become_null_or_nan() {
        let raw = read_raw(FULL_CSV.as_bytes()).unwrap();
        let r = &normalize(&raw)[1];
        assert_eq!(r.order_timestamp, None);
        assert_eq!(r.arrived_timestamp, None);
        assert!(r.invoice_value.is_nan());
        assert!(r.freight_value.is_nan());
        assert_eq!(r.zone, None);
        assert_eq!(r.status.as_deref(), Some(STATUS_CANCELLED));
        // Column exists, so a blank outcome stays blank.
        assert_eq!(r.outcome_status, None);
    }

    #[test]
    fn test_missing_columns_are_synthesized() {
        let csv = "\
data_hora_pedido,data_hora_nf,devolucao
2024-03-05 08:00:00,2024-03-05 09:00:00,SIM
2024-03-05 08:00:00,2024-03-05 09:00:00,NAO
,2024-03-05 09:00:00,
";
        let raw = read_raw(csv.as_bytes()).unwrap();
        let records = normalize(&raw);

        for r in &records {
            assert_eq!(r.status.as_deref(), Some(STATUS_DONE));
            assert_eq!(r.arrived_timestamp, Some(ts(2024, 3, 5, 10, 30)));
            assert_eq!(r.completed_timestamp, Some(ts(2024, 3, 5, 11, 0)));
        }
        assert_eq!(records[0].outcome_status.as_deref(), Some(OUTCOME_FAILURE));
        assert_eq!(records[1].outcome_status.as_deref(), Some(OUTCOME_UNDEFINED));
        assert_eq!(records[2].outcome_status.as_deref(), Some(OUTCOME_UNDEFINED));

        assert_eq!(records[0].route_assigned_timestamp, Some(ts(2024, 3, 5, 8, 30)));
        assert_eq!(records[2].route_assigned_timestamp, None);
    }

    #[test]
    fn test_latin1_cells_do_not_drop_rows() {
        let mut bytes = b"data_hora_nf,valor_nf,zona,motoqueiro\n\
2024-03-05 09:00:00,10,IGARASSU,Maria\n"
            .to_vec();
        bytes.extend_from_slice(b"2024-03-05 10:00:00,20,JABOAT\xc3O,Jo\xe3o\n");

        let raw = read_raw(bytes.as_slice()).unwrap();
        assert_eq!(raw.rows.len(), 2);
        assert_eq!(raw.parse_errors, 0);

        let records = normalize(&raw);
        assert_eq!(records.len(), 2);
        let r = &records[1];
        assert_eq!(r.invoice_value, 20.0);
        assert_eq!(r.invoice_timestamp, Some(ts(2024, 3, 5, 10, 0)));
        assert_eq!(r.rider.as_deref(), Some("Jo\u{fffd}o"));
        assert!(r.zone.as_deref().is_some_and(|z| z.starts_with("JABOAT")));
    }

    #[test]
    fn test_without_invoice_column_result_is_empty() {
        let csv = "data_hora_pedido,valor_nf\n2024-03-05 08:00:00,10\n";
        let raw = read_raw(csv.as_bytes()).unwrap();
        assert!(normalize(&raw).is_empty());
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let raw = read_raw(FULL_CSV.as_bytes()).unwrap();
        let a = normalize(&raw);
        let b = normalize(&raw);
        assert_eq!(bincode::serialize(&a).unwrap(), bincode::serialize(&b).unwrap());
    }

    #[test]
    fn test_missing_file_is_source_unavailable() {
        let err = load_and_clean("/nonexistent/dados.csv").unwrap_err();
        assert!(matches!(err, RefreshError::SourceUnavailable(_)));
    }

    #[test]
    fn test_read_costs() {
        let csv = "\
competencia,regiao,valor_competencia
2024/03,Norte,1000.50
2024/03,Sul,\"2.000,00\"
ruim,Sul,5
2024/04,Norte,x
";
        let costs = read_costs(csv.as_bytes()).unwrap();
        assert_eq!(costs.len(), 4);
        assert_eq!(costs[0].competence.as_deref(), Some("2024-03"));
        assert_eq!(costs[1].total_cost, 2000.0);
        assert_eq!(costs[2].competence, None);
        assert!(costs[3].total_cost.is_nan());
    }

    #[test]
    fn test_missing_cost_ledger_is_empty() {
        assert!(load_costs("/nonexistent/custos.csv").is_empty());
    }
}
