//! Derived numbers for the trip and budget views. All of this is a
//! single pass over the day documents already loaded from the store.

use std::collections::BTreeMap;

use crate::models::day::ItineraryDay;

/// Activities without a category are grouped under this label.
pub const DEFAULT_CATEGORY: &str = "other";

/// Warn once spending reaches this share of the budget.
const BUDGET_WARNING_RATIO: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetStatus {
    Good,
    Warning,
    Over,
}

impl BudgetStatus {
    pub fn label(&self) -> &'static str {
        match self {
            BudgetStatus::Good => "im Rahmen",
            BudgetStatus::Warning => "wird knapp",
            BudgetStatus::Over => "überzogen",
        }
    }

    pub fn css_class(&self) -> &'static str {
        match self {
            BudgetStatus::Good => "budget-good",
            BudgetStatus::Warning => "budget-warning",
            BudgetStatus::Over => "budget-over",
        }
    }
}

pub fn trip_total_cost(days: &[ItineraryDay]) -> f64 {
    days.iter()
        .flat_map(|day| day.activities.iter())
        .map(|activity| activity.cost_or_zero())
        .sum()
}

pub fn trip_activity_count(days: &[ItineraryDay]) -> usize {
    days.iter().map(|day| day.activities.len()).sum()
}

pub fn category_breakdown(days: &[ItineraryDay]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for activity in days.iter().flat_map(|day| day.activities.iter()) {
        let category = activity
            .category
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(DEFAULT_CATEGORY);
        *counts.entry(category.to_string()).or_insert(0) += 1;
    }
    counts
}

pub fn budget_status(budget: f64, spent: f64) -> BudgetStatus {
    if spent >= budget {
        BudgetStatus::Over
    } else if spent >= budget * BUDGET_WARNING_RATIO {
        BudgetStatus::Warning
    } else {
        BudgetStatus::Good
    }
}

/// May go negative once the trip is over budget.
pub fn budget_remaining(budget: f64, spent: f64) -> f64 {
    budget - spent
}
