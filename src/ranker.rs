use std::cmp::Ordering;

use crate::catalog::CatalogSnapshot;
use crate::models::{CatalogRow, Intent};

/// Largest list the reply prompt is written for.
pub const MAX_RESULT_CAP: usize = 3;
pub const DEFAULT_RESULT_CAP: usize = MAX_RESULT_CAP;

/// Filter the snapshot by the intent's constraints, order by price and keep the
/// first `cap` rows.
///
/// Pure and deterministic. An unconstrained intent keeps every row. Rows
/// without a parsable price sort last in catalog order.
pub fn select(intent: &Intent, snapshot: &CatalogSnapshot, cap: usize) -> Vec<CatalogRow> {
    let stone = needle(intent.stone.as_deref());
    let color = needle(intent.color.as_deref());

    let mut matched: Vec<(Option<f64>, &CatalogRow)> = snapshot
        .rows()
        .iter()
        .filter(|row| contains_folded(Some(row.name.as_str()), stone.as_deref()))
        .filter(|row| contains_folded(row.color.as_deref(), color.as_deref()))
        .map(|row| (row.price_value(), row))
        .filter(|(price, _)| within_budget(*price, intent.budget_max))
        .collect();

    // sort_by is stable, so equal prices keep catalog order
    matched.sort_by(|(a, _), (b, _)| compare_prices(*a, *b));

    matched
        .into_iter()
        .take(cap)
        .map(|(_, row)| row.clone())
        .collect()
}

fn needle(constraint: Option<&str>) -> Option<String> {
    constraint
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
}

fn contains_folded(haystack: Option<&str>, needle: Option<&str>) -> bool {
    let Some(needle) = needle else {
        return true;
    };
    match haystack.map(str::trim) {
        Some(h) if !h.is_empty() => h.to_lowercase().contains(needle),
        _ => false,
    }
}

fn within_budget(price: Option<f64>, budget_max: Option<f64>) -> bool {
    match budget_max {
        None => true,
        Some(max) => price.is_some_and(|p| p <= max),
    }
}

fn compare_prices(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
