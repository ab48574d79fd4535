use serde::Serialize;
use std::error::Error;
use tabled::{settings::Style, Table, Tabled};

use crate::indicators::{Indicators, UNDEFINED};
use crate::regions::RegionPanel;
use crate::session::DashboardView;
use crate::types::CardRow;
use crate::util::{format_brl, format_int, format_number, format_pct};

pub const NOT_DEFINED: &str = "Não definido";
pub const NO_DATA_NOTICE: &str = "Nenhum dado encontrado para os filtros selecionados.";

pub fn write_csv<T: Serialize>(path: &str, rows: &[T]) -> Result<(), Box<dyn Error>> {
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &str, value: &T) -> Result<(), Box<dyn Error>> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

fn card(title: &str, value: String) -> CardRow {
    CardRow {
        title: title.to_string(),
        value,
    }
}

fn text_or_not_defined(s: Option<&str>) -> String {
    match s {
        Some(v) if v != UNDEFINED => v.to_string(),
        _ => NOT_DEFINED.to_string(),
    }
}

/// Indicator cards grouped the way the dashboard lays them out.
pub fn indicator_cards(ind: &Indicators, panel: &RegionPanel) -> Vec<(&'static str, Vec<CardRow>)> {
    vec![
        (
            "Indicadores Gerais",
            vec![
                card("Entregas", format_int(ind.deliveries as u64)),
                card("Viagens", format_int(ind.trips as u64)),
                card("Faturamento", format_brl(ind.invoice_total)),
                card("Receita Frete", format_brl(ind.freight_total)),
                card("Frete Grátis (%)", format_pct(ind.free_freight_pct)),
                card("Devoluções (%)", format_pct(ind.returns_pct)),
                card("Entregas Viradas (%)", format_pct(ind.overdue_pct)),
                card("Entregas Acima do Tempo (%)", format_pct(ind.cycle_over_ideal_pct)),
            ],
        ),
        (
            "Indicadores de Desempenho",
            vec![
                card("Entregas p/ Viagem", format_number(ind.deliveries_per_trip, 1)),
                card("Viagens com +3 Entregas", format_int(ind.trips_over_3 as u64)),
                card("Ticket Médio", format_brl(ind.avg_ticket)),
                card("Custo por Entrega", format_brl(ind.cost_per_delivery)),
                card("Receita Média p/ Viagem", format_brl(ind.avg_revenue_per_trip)),
                card("Resultado Projetado", format_brl(ind.projected_result)),
                card("Entregas p/ Motoqueiro", format_number(ind.deliveries_per_rider, 1)),
                card("Resultado (%)", format_pct(ind.result_pct)),
            ],
        ),
        (
            "Parâmetros por Região",
            vec![
                card("Tempo de Ciclo", text_or_not_defined(Some(ind.avg_cycle_time.as_str()))),
                card("Tempo Parametrizado", text_or_not_defined(panel.ideal_duration.as_deref())),
                card("Tempo de Rota", text_or_not_defined(Some(ind.avg_route_time.as_str()))),
                card("Horário Corte", text_or_not_defined(panel.cutoff_time.as_deref())),
            ],
        ),
    ]
}

pub fn table_string<T>(rows: &[T]) -> String
where
    T: Tabled + Clone,
{
    if rows.is_empty() {
        return "(no rows)".to_string();
    }
    Table::new(rows.to_vec()).with(Style::markdown()).to_string()
}

/// Full text rendering of a dashboard view.
pub fn render_dashboard(view: &DashboardView) -> String {
    let mut out = format!("Última atualização: {}\n", view.last_update);
    out.push_str(&format!(
        "Período: {} a {}\n\n",
        view.filters.date_from.format("%d/%m/%Y"),
        view.filters.date_to.format("%d/%m/%Y")
    ));
    match &view.indicators {
        Ok(ind) => {
            for (group, cards) in indicator_cards(ind, &view.region_panel) {
                out.push_str(&format!("## {}\n\n{}\n\n", group, table_string(&cards)));
            }
        }
        Err(_) => {
            out.push_str(NO_DATA_NOTICE);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::filters::FilterSpec;
    use chrono::NaiveDate;

    fn indicators() -> Indicators {
        Indicators {
            deliveries: 1234,
            trips: 10,
            trips_over_3: 4,
            free_freight_count: 1,
            free_freight_pct: 25.0,
            returns_count: 0,
            returns_pct: 0.0,
            invoice_total: 1234.5,
            freight_total: 30.0,
            overdue_count: 0,
            overdue_pct: 0.0,
            cycle_over_ideal_count: 0,
            cycle_over_ideal_pct: 0.0,
            avg_ticket: 50.0,
            avg_revenue_per_trip: 200.0,
            deliveries_per_trip: 4.0,
            rider_count: 1,
            deliveries_per_rider: 4.0,
            total_cost: 0.0,
            cost_per_delivery: 0.0,
            projected_result: -30.0,
            result_pct: 0.0,
            avg_cycle_time: "01:02:03".to_string(),
            avg_route_time: UNDEFINED.to_string(),
        }
    }

    fn view(indicators: Result<Indicators, EngineError>) -> DashboardView {
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        DashboardView {
            last_update: "05/03/2024 09:00:00".to_string(),
            filters: FilterSpec::new(d, d),
            indicators,
            region_panel: RegionPanel {
                ideal_duration: None,
                cutoff_time: None,
            },
        }
    }

    fn find<'a>(groups: &'a [(&'static str, Vec<CardRow>)], title: &str) -> &'a str {
        groups
            .iter()
            .flat_map(|(_, cards)| cards.iter())
            .find(|c| c.title == title)
            .map(|c| c.value.as_str())
            .unwrap()
    }

    #[test]
    fn test_cards_are_formatted_ptbr() {
        let panel = RegionPanel {
            ideal_duration: Some("03:00:00".to_string()),
            cutoff_time: None,
        };
        let groups = indicator_cards(&indicators(), &panel);
        assert_eq!(groups.len(), 3);
        assert_eq!(find(&groups, "Entregas"), "1.234");
        assert_eq!(find(&groups, "Faturamento"), "R$ 1.234,5");
        assert_eq!(find(&groups, "Frete Grátis (%)"), "25,0%");
        assert_eq!(find(&groups, "Resultado Projetado"), "R$ -30,0");
        assert_eq!(find(&groups, "Tempo de Ciclo"), "01:02:03");
        assert_eq!(find(&groups, "Tempo de Rota"), NOT_DEFINED);
        assert_eq!(find(&groups, "Tempo Parametrizado"), "03:00:00");
        assert_eq!(find(&groups, "Horário Corte"), NOT_DEFINED);
    }

    #[test]
    fn test_render_dashboard_sections() {
        let text = render_dashboard(&view(Ok(indicators())));
        assert!(text.contains("Última atualização: 05/03/2024 09:00:00"));
        assert!(text.contains("## Indicadores Gerais"));
        assert!(text.contains("| Entregas"));
    }

    #[test]
    fn test_render_no_data_notice() {
        let text = render_dashboard(&view(Err(EngineError::NoData)));
        assert!(text.contains(NO_DATA_NOTICE));
        assert!(!text.contains("Indicadores Gerais"));
    }

    #[test]
    fn test_write_json_exports_view() {
        let path = format!("{}/delivery_kpis_view_test.json", std::env::temp_dir().display());
        write_json(&path, &view(Err(EngineError::NoData))).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("no_data"));
        std::fs::remove_file(&path).unwrap();
    }
}
