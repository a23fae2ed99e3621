use super::ui;
use crate::estimate::{EstimationReport, EstimationResult, FundNavEstimator, HoldingContribution};
use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

pub async fn run(
    estimator: &FundNavEstimator,
    fund_code: &str,
    amount: f64,
    details: bool,
    json: bool,
) -> Result<()> {
    let report = estimator
        .estimate_with_details(fund_code, amount)
        .await
        .context("Estimation failed")?;

    if json {
        let output = if details {
            serde_json::to_string_pretty(&report)
        } else {
            serde_json::to_string_pretty(&report.result.to_map())
        }
        .context("Failed to serialize estimate")?;
        println!("{output}");
        return Ok(());
    }

    display_report(&report, details);
    Ok(())
}

fn display_report(report: &EstimationReport, details: bool) {
    let result = &report.result;
    let title = match &result.fund_name {
        Some(name) => format!("{name} ({})", result.fund_code),
        None => result.fund_code.clone(),
    };
    println!("\nFund: {}", ui::style_text(&title, ui::StyleType::Title));
    if let Some(date) = result.holding_date {
        println!(
            "{}",
            ui::style_text(&format!("Holdings as of {date}"), ui::StyleType::Subtle)
        );
    }
    println!("{}", results_table(std::slice::from_ref(result)));

    if details && !report.contributions.is_empty() {
        println!("\n{}", contributions_table(&report.contributions));
    }
}

/// One row per estimate.
pub fn results_table(results: &[EstimationResult]) -> Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Fund"),
        ui::header_cell("Name"),
        ui::header_cell("Status"),
        ui::header_cell("Est. Change"),
        ui::header_cell("Top Holdings"),
        ui::header_cell("Position"),
        ui::header_cell("Est. Profit"),
    ]);

    for result in results {
        table.add_row(vec![
            Cell::new(&result.fund_code),
            Cell::new(result.fund_name.as_deref().unwrap_or(ui::MISSING)),
            ui::status_cell(result.status),
            ui::change_cell(result.estimated_change),
            ui::format_optional_cell(result.top_holdings_weight, ui::format_percent),
            ui::format_optional_cell(
                Some(result.position_amount).filter(|a| a.is_finite()),
                ui::format_amount,
            ),
            ui::format_optional_cell(result.estimated_profit, ui::format_amount),
        ]);
    }
    table
}

pub fn contributions_table(contributions: &[HoldingContribution]) -> Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Code"),
        ui::header_cell("Name"),
        ui::header_cell("Weight"),
        ui::header_cell("Price"),
        ui::header_cell("Change"),
    ]);

    for c in contributions {
        table.add_row(vec![
            Cell::new(&c.code),
            Cell::new(&c.name),
            ui::format_optional_cell(Some(c.weight), ui::format_percent),
            ui::format_optional_cell(c.price, |p| format!("{p:.3}")),
            ui::change_cell(c.percent_change),
        ]);
    }
    table
}
