//! Probability-weighted revenue forecast over the deal pipeline.
//!
//! Deals qualify when they carry a forecast amount and a forecast date
//! (`expected_closing_date`, falling back to `expected_payment_date`).
//! Deals missing either are excluded entirely rather than bucketed under
//! an "unknown" period.

use axum::extract::{Query, State};
use axum::Json;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use super::Deal;
use crate::shared::{AppState, CrmError};

/// Probability assumed for deals that never had one estimated.
const DEFAULT_PROBABILITY: u8 = 50;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ForecastGrouping {
    Month,
    Week,
}

#[derive(Debug, Deserialize)]
pub struct ForecastQuery {
    pub group_by: Option<ForecastGrouping>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastDeal {
    pub id: Uuid,
    pub client_name: String,
    pub forecast_amount: f64,
    pub forecast_probability: u8,
    pub forecast_date: NaiveDate,
    pub weighted_value: f64,
}

#[derive(Debug, Serialize)]
pub struct ForecastPeriod {
    /// `YYYY-MM` for months, `YYYY-Wnn` for ISO weeks. Lexicographic order
    /// of these keys is chronological order.
    pub period: String,
    pub deals: Vec<ForecastDeal>,
    pub total: f64,
}

#[derive(Debug, Serialize)]
pub struct ForecastReport {
    pub group_by: ForecastGrouping,
    pub periods: Vec<ForecastPeriod>,
    pub grand_total: f64,
}

fn forecast_date(deal: &Deal) -> Option<NaiveDate> {
    deal.expected_closing_date.or(deal.expected_payment_date)
}

fn period_key(date: NaiveDate, grouping: ForecastGrouping) -> String {
    match grouping {
        ForecastGrouping::Month => date.format("%Y-%m").to_string(),
        ForecastGrouping::Week => {
            let iso = date.iso_week();
            format!("{}-W{:02}", iso.year(), iso.week())
        }
    }
}

pub fn weighted_value(deal: &Deal) -> f64 {
    let probability = deal.forecast_probability.unwrap_or(DEFAULT_PROBABILITY);
    deal.forecast_amount.unwrap_or(0.0) * f64::from(probability) / 100.0
}

/// Buckets qualifying deals by period, ascending. The sum of all period
/// totals equals the sum over qualifying deals; nothing is double counted
/// or silently dropped.
pub fn aggregate(deals: &[Deal], grouping: ForecastGrouping) -> ForecastReport {
    let mut buckets: BTreeMap<String, Vec<ForecastDeal>> = BTreeMap::new();

    for deal in deals {
        if deal.is_lost() {
            continue;
        }
        let Some(date) = forecast_date(deal) else {
            continue;
        };
        let Some(amount) = deal.forecast_amount else {
            continue;
        };
        let entry = ForecastDeal {
            id: deal.id,
            client_name: deal.client_name.clone(),
            forecast_amount: amount,
            forecast_probability: deal.forecast_probability.unwrap_or(DEFAULT_PROBABILITY),
            forecast_date: date,
            weighted_value: weighted_value(deal),
        };
        buckets.entry(period_key(date, grouping)).or_default().push(entry);
    }

    let mut grand_total = 0.0;
    let periods = buckets
        .into_iter()
        .map(|(period, mut deals)| {
            deals.sort_by_key(|d| d.forecast_date);
            let total: f64 = deals.iter().map(|d| d.weighted_value).sum();
            grand_total += total;
            ForecastPeriod {
                period,
                deals,
                total,
            }
        })
        .collect();

    ForecastReport {
        group_by: grouping,
        periods,
        grand_total,
    }
}

pub async fn forecast_report(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ForecastQuery>,
) -> Result<Json<ForecastReport>, CrmError> {
    let deals = state.deals.all().await;
    let grouping = query.group_by.unwrap_or(ForecastGrouping::Month);
    Ok(Json(aggregate(&deals, grouping)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_week_keys_sort_chronologically() {
        let late_dec = NaiveDate::from_ymd_opt(2025, 12, 29).unwrap();
        // 2025-12-29 falls in ISO week 1 of 2026.
        assert_eq!(period_key(late_dec, ForecastGrouping::Week), "2026-W01");
        let march = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
        assert_eq!(period_key(march, ForecastGrouping::Month), "2026-03");
    }
}
