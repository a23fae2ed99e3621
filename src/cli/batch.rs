use super::{estimate, ui};
use crate::core::config::Position;
use crate::core::error::FundNavError;
use crate::estimate::{EstimationResult, FundNavEstimator, assembler};
use anyhow::{Context, Result};
use tracing::warn;

pub async fn run(estimator: &FundNavEstimator, positions: &[Position], json: bool) -> Result<()> {
    if positions.is_empty() {
        println!("No positions configured. Add some under `positions:` in the config file.");
        return Ok(());
    }

    let pb = ui::new_progress_bar(positions.len() as u64, false);
    let results = estimator
        .estimate_batch_with_progress(positions, || pb.inc(1))
        .await;
    pb.finish_and_clear();

    let estimates = rows(positions, results);

    if json {
        let maps: Vec<_> = estimates.iter().map(EstimationResult::to_map).collect();
        let output = serde_json::to_string_pretty(&maps).context("Failed to serialize estimates")?;
        println!("{output}");
        return Ok(());
    }

    println!(
        "\n{}",
        ui::style_text("Estimated NAV changes", ui::StyleType::Title)
    );
    println!("{}", estimate::results_table(&estimates));

    let failed = estimates
        .iter()
        .filter(|e| e.estimated_change.is_none())
        .count();
    if failed > 0 {
        println!(
            "{}",
            ui::style_text(
                &format!("{failed} position(s) could not be estimated"),
                ui::StyleType::Error
            )
        );
    }
    Ok(())
}

/// One row per position. A position the estimator rejects, such as one with a
/// non-finite amount, becomes an error row instead of failing the whole batch.
fn rows(
    positions: &[Position],
    results: Vec<Result<EstimationResult, FundNavError>>,
) -> Vec<EstimationResult> {
    positions
        .iter()
        .zip(results)
        .map(|(position, result)| {
            result.unwrap_or_else(|e| {
                warn!(error = %e, "Estimation failed for fund: {}", position.fund_code);
                assembler::failure(position.fund_code.trim(), position.amount, &e)
            })
        })
        .collect()
}
