use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tabled::Tabled;

/// One row of the delivery export exactly as it appears in the source file.
/// Every cell is kept as text; `loader` decides what each one means.
#[derive(Debug, Default, Deserialize)]
pub struct RawRow {
    #[serde(rename = "data_hora_pedido")]
    pub order_timestamp: Option<String>,
    #[serde(rename = "data_hora_nf")]
    pub invoice_timestamp: Option<String>,
    #[serde(rename = "Rota Atribuida")]
    pub route_assigned_timestamp: Option<String>,
    #[serde(rename = "Chegou no Local")]
    pub arrived_timestamp: Option<String>,
    #[serde(rename = "Concluida")]
    pub completed_timestamp: Option<String>,
    #[serde(rename = "valor_nf")]
    pub invoice_value: Option<String>,
    #[serde(rename = "valor_frete")]
    pub freight_value: Option<String>,
    #[serde(rename = "zona")]
    pub zone: Option<String>,
    #[serde(rename = "motoqueiro")]
    pub rider: Option<String>,
    #[serde(rename = "Cliente")]
    pub client: Option<String>,
    #[serde(rename = "vendedor")]
    pub seller: Option<String>,
    #[serde(rename = "rota_nome")]
    pub route_name: Option<String>,
    #[serde(rename = "servico_titulo")]
    pub service_title: Option<String>,
    #[serde(rename = "devolucao")]
    pub returned: Option<String>,
    #[serde(rename = "situacao")]
    pub status: Option<String>,
    #[serde(rename = "situacao_finalizado")]
    pub outcome_status: Option<String>,
}

/// Canonical delivery row produced by the normalizer.
///
/// Monetary values use `f64::NAN` for cells that could not be parsed so they
/// drop out of sums; everything else that can be missing is an `Option`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub order_timestamp: Option<NaiveDateTime>,
    pub invoice_timestamp: Option<NaiveDateTime>,
    pub route_assigned_timestamp: Option<NaiveDateTime>,
    pub arrived_timestamp: Option<NaiveDateTime>,
    pub completed_timestamp: Option<NaiveDateTime>,
    pub invoice_value: f64,
    pub freight_value: f64,
    pub zone: Option<String>,
    pub rider: Option<String>,
    pub client: Option<String>,
    pub seller: Option<String>,
    pub route_name: Option<String>,
    pub service_title: Option<String>,
    pub returned: Option<String>,
    pub status: Option<String>,
    pub outcome_status: Option<String>,
    /// Calendar date of the invoice timestamp.
    pub date: Option<NaiveDate>,
    /// `YYYY-MM` period of `date`.
    pub competence: Option<String>,
}

impl DeliveryRecord {
    /// Order placement to arrival at the delivery location.
    pub fn cycle_time(&self) -> Option<Duration> {
        non_negative_span(self.order_timestamp, self.arrived_timestamp)
    }

    /// Route assignment to arrival at the delivery location.
    pub fn route_time(&self) -> Option<Duration> {
        non_negative_span(self.route_assigned_timestamp, self.arrived_timestamp)
    }

    pub fn completed_date(&self) -> Option<NaiveDate> {
        self.completed_timestamp.map(|ts| ts.date())
    }

    pub fn is_returned(&self) -> bool {
        self.returned.as_deref() == Some(RETURNED_YES)
    }
}

fn non_negative_span(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Option<Duration> {
    match (start, end) {
        (Some(start), Some(end)) if end >= start => Some(end - start),
        _ => None,
    }
}

pub const RETURNED_YES: &str = "SIM";
pub const STATUS_DONE: &str = "Realizada";
pub const STATUS_CANCELLED: &str = "Cancelada";
pub const OUTCOME_SUCCESS: &str = "Sucesso";
pub const OUTCOME_FAILURE: &str = "Falha";
pub const OUTCOME_UNDEFINED: &str = "Indefinida";

/// Raw row of the rider cost ledger.
#[derive(Debug, Default, Deserialize)]
pub struct RawCostRow {
    #[serde(rename = "competencia")]
    pub competence: Option<String>,
    #[serde(rename = "regiao")]
    pub region: Option<String>,
    #[serde(rename = "valor_competencia")]
    pub total_cost: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    /// `YYYY-MM`, or `None` when the source period was unreadable.
    pub competence: Option<String>,
    pub region: Option<String>,
    pub total_cost: f64,
}

/// A rendered indicator card: title plus the display-ready value.
#[derive(Debug, Serialize, Tabled, Clone)]
pub struct CardRow {
    #[serde(rename = "Indicador")]
    #[tabled(rename = "Indicador")]
    pub title: String,
    #[serde(rename = "Valor")]
    #[tabled(rename = "Valor")]
    pub value: String,
}
