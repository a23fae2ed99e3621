use crate::estimate::EstimationStatus;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Placeholder shown for values that could not be computed.
pub const MISSING: &str = "--";

/// Defines different styles for text elements.
pub enum StyleType {
    Title,
    Error,
    Subtle,
}

/// Applies a consistent style to a string.
pub fn style_text(text: &str, style_type: StyleType) -> String {
    let styled = match style_type {
        StyleType::Title => style(text).bold().underlined(),
        StyleType::Error => style(text).red(),
        StyleType::Subtle => style(text).dim(),
    };
    styled.to_string()
}

/// Creates a new `comfy_table::Table` with standard styling.
pub fn new_styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Creates a styled header cell for a table.
pub fn header_cell(text: &str) -> Cell {
    Cell::new(text)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

/// Formats an `Option<T>` into a `Cell`. `None` is displayed as the missing placeholder.
pub fn format_optional_cell<T>(value: Option<T>, format_fn: impl Fn(T) -> String) -> Cell {
    value.map_or(
        Cell::new(MISSING)
            .fg(Color::DarkGrey)
            .set_alignment(CellAlignment::Right),
        |v| Cell::new(format_fn(v)).set_alignment(CellAlignment::Right),
    )
}

/// Creates a cell for displaying percentage change with color coding.
pub fn change_cell(change: Option<f64>) -> Cell {
    let Some(change) = change else {
        return format_optional_cell(None::<f64>, format_percent);
    };
    let color = if change >= 0.0 {
        Color::Green
    } else {
        Color::Red
    };
    Cell::new(format_signed_percent(change))
        .fg(color)
        .set_alignment(CellAlignment::Right)
}

pub fn status_cell(status: EstimationStatus) -> Cell {
    let color = match status {
        EstimationStatus::Ok => Color::Green,
        EstimationStatus::Partial => Color::Yellow,
        EstimationStatus::NoHoldingsData | EstimationStatus::NotFound => Color::DarkGrey,
        EstimationStatus::Error => Color::Red,
    };
    Cell::new(status.as_str()).fg(color)
}

pub fn format_percent(value: f64) -> String {
    format!("{value:.2}%")
}

pub fn format_signed_percent(value: f64) -> String {
    format!("{value:+.2}%")
}

pub fn format_amount(value: f64) -> String {
    format!("{value:.2}")
}

/// Creates a new `indicatif::ProgressBar` with standard styling.
pub fn new_progress_bar(len: u64, with_message: bool) -> ProgressBar {
    let template = if with_message {
        "{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})"
    } else {
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})"
    };

    let style = ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    let pb = ProgressBar::new(len);
    pb.set_style(style);
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formatting() {
        assert_eq!(format_percent(70.0), "70.00%");
        assert_eq!(format_signed_percent(1.234), "+1.23%");
        assert_eq!(format_signed_percent(-0.5), "-0.50%");
        assert_eq!(format_amount(1234.5), "1234.50");
    }

    #[test]
    fn test_missing_values_use_placeholder() {
        assert_eq!(change_cell(None).content(), MISSING);
        assert_eq!(
            format_optional_cell(None::<f64>, format_amount).content(),
            MISSING
        );
        assert_eq!(change_cell(Some(2.0)).content(), "+2.00%");
    }
}
