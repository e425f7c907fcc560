//! Plain-text rendering shared by the row and garden commands.

use rowplan_core::layout::RowUsage;
use rowplan_core::transition::Transition;
use rowplan_db::models::{Plant, PlantInstance, Row};
use serde::Serialize;

const BAR_WIDTH: usize = 30;

/// `[#########.....................]  31%`, with `!` when over capacity.
pub fn usage_bar(usage: &RowUsage) -> String {
    let filled = (usize::from(usage.percentage) * BAR_WIDTH).div_ceil(100).min(BAR_WIDTH);
    let marker = if usage.over_capacity { " !" } else { "" };
    format!(
        "[{}{}] {:>3}%{marker}",
        "#".repeat(filled),
        ".".repeat(BAR_WIDTH - filled),
        usage.percentage
    )
}

/// Truncate `name` to `max` characters, ending in `...` when cut.
pub fn truncate(name: &str, max: usize) -> String {
    if name.chars().count() <= max {
        return name.to_string();
    }
    let kept: String = name.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

pub fn plant_header() -> String {
    format!(
        "{:>6}  {:<24} {:>8} {:>6} {:>6} {:>9}",
        "ID", "NAME", "SPACING", "OWNED", "PLACED", "AVAILABLE"
    )
}

pub fn plant_line(plant: &Plant) -> String {
    format!(
        "{:>6}  {:<24} {:>8} {:>6} {:>6} {:>9}",
        plant.id,
        truncate(&plant.name, 24),
        plant.spacing,
        plant.quantity,
        plant.used_count,
        plant.available()
    )
}

pub fn row_header() -> String {
    format!(
        "{:>6}  {:<24} {:>7} {:>5} {:>7}  USAGE",
        "ID", "NAME", "LENGTH", "ENDS", "PLANTS"
    )
}

pub fn row_line(row: &Row, usage: &RowUsage) -> String {
    format!(
        "{:>6}  {:<24} {:>7} {:>5} {:>7}  {}",
        row.id,
        truncate(&row.name, 24),
        row.length,
        row.row_ends,
        row.plants.len(),
        usage_bar(usage)
    )
}

/// Instances of a row in position order, one per line.
pub fn instance_lines(row: &Row) -> Vec<String> {
    let mut ordered: Vec<&PlantInstance> = row.plants.iter().collect();
    ordered.sort_by_key(|p| p.position);
    ordered
        .iter()
        .map(|p| {
            format!(
                "  @{:<6} #{:<6} {:<24} spacing {}",
                p.position,
                p.id,
                truncate(&p.plant_name, 24),
                p.spacing
            )
        })
        .collect()
}

pub fn transition_label(transition: Transition) -> &'static str {
    match transition {
        Transition::Entering => "entering",
        Transition::Exiting => "exiting",
        Transition::MovingLeft => "moving-left",
        Transition::MovingRight => "moving-right",
    }
}

/// JSON shape of `row show --json`.
#[derive(Debug, Serialize)]
pub struct RowReport<'a> {
    #[serde(flatten)]
    pub row: &'a Row,
    pub usage: RowUsage,
}
