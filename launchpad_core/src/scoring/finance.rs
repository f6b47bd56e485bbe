use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const PROJECTION_MONTHS: u32 = 36;
/// Steepness of the revenue ramp; month 1 opens at half of steady-state
/// revenue and reaches ~90% by month 3.
pub const RAMP_GROWTH: f64 = 0.9;
pub const DAYS_PER_MONTH: f64 = 30.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonthProjection {
    pub month: u32,
    pub revenue: f64,
    pub expenses: f64,
    pub net: f64,
    pub cumulative: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinancialModel {
    pub currency_code: String,
    pub startup_costs: BTreeMap<String, f64>,
    pub monthly_fixed_costs: BTreeMap<String, f64>,
    pub total_startup: f64,
    pub total_monthly: f64,
    pub daily_customers: f64,
    pub avg_ticket_price: f64,
    pub monthly_revenue: f64,
    pub monthly_profit: f64,
    pub break_even_month: Option<u32>,
    pub projection: Vec<MonthProjection>,
    pub sources_used: Vec<String>,
}

/// Revenue fraction reached in `month` (1-based) on the sigmoid ramp.
pub fn ramp(month: u32) -> f64 {
    let x = f64::from(month.saturating_sub(1));
    1.0 / (1.0 + (-RAMP_GROWTH * x).exp())
}

/// Month 0 carries the setup spend plus the first month of fixed costs; from
/// month 1 revenue follows [`ramp`].
pub fn project(total_startup: f64, total_monthly: f64, monthly_revenue: f64) -> Vec<MonthProjection> {
    let opening = -(total_startup + total_monthly);
    let mut projection = vec![MonthProjection {
        month: 0,
        revenue: 0.0,
        expenses: total_startup + total_monthly,
        net: opening,
        cumulative: opening,
    }];
    let mut cumulative = opening;
    for month in 1..=PROJECTION_MONTHS {
        let revenue = monthly_revenue * ramp(month);
        let net = revenue - total_monthly;
        cumulative += net;
        projection.push(MonthProjection {
            month,
            revenue,
            expenses: total_monthly,
            net,
            cumulative,
        });
    }
    projection
}

/// First month whose cumulative cash flow is non-negative.
pub fn break_even_month(projection: &[MonthProjection]) -> Option<u32> {
    projection
        .iter()
        .find(|m| m.cumulative >= 0.0)
        .map(|m| m.month)
}

pub fn build_model(
    currency_code: &str,
    startup_costs: BTreeMap<String, f64>,
    monthly_fixed_costs: BTreeMap<String, f64>,
    daily_customers: f64,
    avg_ticket_price: f64,
    sources_used: Vec<String>,
) -> FinancialModel {
    let total_startup = startup_costs.values().filter(|v| v.is_finite()).sum::<f64>();
    let total_monthly = monthly_fixed_costs
        .values()
        .filter(|v| v.is_finite())
        .sum::<f64>();
    let monthly_revenue = daily_customers.max(0.0) * avg_ticket_price.max(0.0) * DAYS_PER_MONTH;
    let projection = project(total_startup, total_monthly, monthly_revenue);
    FinancialModel {
        currency_code: currency_code.to_string(),
        startup_costs,
        monthly_fixed_costs,
        total_startup,
        total_monthly,
        daily_customers,
        avg_ticket_price,
        monthly_revenue,
        monthly_profit: monthly_revenue - total_monthly,
        break_even_month: break_even_month(&projection),
        projection,
        sources_used,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_inputs_break_even_in_month_fifteen() {
        let projection = project(30_000.0, 5_000.0, 8_000.0);
        assert_eq!(projection[0].cumulative, -35_000.0);
        assert_eq!(projection.len(), 37);
        assert_eq!(break_even_month(&projection), Some(15));
        assert!(projection[14].cumulative < 0.0);
    }

    #[test]
    fn unprofitable_business_never_breaks_even() {
        let model = build_model(
            "USD",
            BTreeMap::from([("fit-out".to_string(), 10_000.0)]),
            BTreeMap::from([("rent".to_string(), 4_000.0)]),
            10.0,
            10.0,
            Vec::new(),
        );
        assert_eq!(model.monthly_revenue, 3_000.0);
        assert_eq!(model.monthly_profit, -1_000.0);
        assert_eq!(model.break_even_month, None);
    }

    #[test]
    fn ramp_starts_at_half() {
        assert_eq!(ramp(1), 0.5);
        assert!(ramp(4) > 0.93 && ramp(4) < 0.94);
        assert!(ramp(36) > 0.999);
    }
}
