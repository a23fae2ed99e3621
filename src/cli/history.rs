use super::ui;
use crate::core::fund::NavRecord;
use crate::estimate::FundNavEstimator;
use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

pub async fn run(
    estimator: &FundNavEstimator,
    fund_code: &str,
    days: usize,
    json: bool,
) -> Result<()> {
    let records = estimator
        .nav_history(fund_code, days)
        .await
        .with_context(|| format!("Failed to get NAV history for fund: {}", fund_code.trim()))?;

    if json {
        let output =
            serde_json::to_string_pretty(&records).context("Failed to serialize NAV history")?;
        println!("{output}");
        return Ok(());
    }

    if records.is_empty() {
        println!("No published NAVs for {}", fund_code.trim());
        return Ok(());
    }
    println!(
        "\n{}",
        ui::style_text(
            &format!("NAV history of {}", fund_code.trim()),
            ui::StyleType::Title
        )
    );
    println!("{}", history_table(&records));
    Ok(())
}

pub fn history_table(records: &[NavRecord]) -> Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell("NAV"),
        ui::header_cell("Acc. NAV"),
        ui::header_cell("Change"),
    ]);

    for record in records {
        table.add_row(vec![
            Cell::new(record.date.format("%Y-%m-%d")),
            ui::format_optional_cell(Some(record.nav), format_nav),
            ui::format_optional_cell(record.accumulated_nav, format_nav),
            ui::change_cell(record.daily_change),
        ]);
    }
    table
}

fn format_nav(value: f64) -> String {
    format!("{value:.4}")
}
