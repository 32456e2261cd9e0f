use caseserver::catalog::{CaseStage, CaseType, DealStage};
use caseserver::config::AppConfig;
use caseserver::deals::forecast::{aggregate, ForecastGrouping};
use caseserver::deals::{CreateDealRequest, ListDealsQuery};
use caseserver::shared::{AppState, CrmError};
use chrono::NaiveDate;

fn new_state() -> AppState {
    AppState::new(AppConfig::default())
}

fn deal_request(client_name: &str, quote: f64) -> CreateDealRequest {
    CreateDealRequest {
        client_name: client_name.to_string(),
        email: None,
        phone: None,
        nationality: None,
        case_type: CaseType::StudyVisa,
        lead_id: None,
        assigned_to: None,
        quote_amount: Some(quote),
        discount_amount: None,
        forecast_amount: None,
        forecast_probability: None,
        expected_closing_date: None,
        expected_payment_date: None,
        tags: None,
    }
}

#[tokio::test]
async fn won_deal_creates_exactly_one_project() {
    // Scenario A: quote 10000, opportunity -> quote_sent -> quote_accepted,
    // then a confirmed won produces one project at stage 1.
    let state = new_state();
    let deal = state.deals.create(deal_request("Amira Hassan", 10_000.0)).await;

    state
        .deals
        .move_stage(deal.id, DealStage::QuoteSent)
        .await
        .unwrap();
    state
        .deals
        .move_stage(deal.id, DealStage::QuoteAccepted)
        .await
        .unwrap();

    let outcome = state.bridge.mark_deal_won(deal.id, true).await.unwrap();
    assert!(outcome.project_created);

    let project = state.projects.get(outcome.project_id).await.unwrap();
    assert_eq!(project.stage, CaseStage::NewClient);
    assert_eq!(project.deal_id, Some(deal.id));

    // Checklist rows were seeded from the case type template.
    let checklist = state.checklists.list(project.id).await;
    assert!(!checklist.is_empty());

    // A repeat of the won call conflicts; re-attempting project creation
    // returns the existing project instead of a second one.
    let repeat = state.bridge.mark_deal_won(deal.id, true).await;
    assert!(matches!(repeat, Err(CrmError::Conflict(_))));

    let won_deal = state.deals.get(deal.id).await.unwrap();
    let again = state.bridge.create_project(&won_deal).await.unwrap();
    assert!(!again.created);
    assert_eq!(again.project.id, project.id);
    assert_eq!(state.projects.list().await.len(), 1);
}

#[tokio::test]
async fn winning_requires_explicit_confirmation() {
    let state = new_state();
    let deal = state.deals.create(deal_request("Confirm Me", 100.0)).await;

    let unconfirmed = state.bridge.mark_deal_won(deal.id, false).await;
    assert!(matches!(unconfirmed, Err(CrmError::Validation(_))));

    // Drag-dropping onto the won column is also refused.
    let dragged = state.deals.move_stage(deal.id, DealStage::Won).await;
    assert!(matches!(dragged, Err(CrmError::Validation(_))));
}

#[tokio::test]
async fn directional_controls_follow_canonical_order() {
    let state = new_state();
    let deal = state.deals.create(deal_request("Directional", 0.0)).await;

    // First stage has no Back.
    assert!(matches!(
        state.deals.move_back(deal.id).await,
        Err(CrmError::Validation(_))
    ));

    let next = state.deals.move_next(deal.id).await.unwrap();
    assert_eq!(next.pipeline_stage, DealStage::ContactMade);
    let back = state.deals.move_back(deal.id).await.unwrap();
    assert_eq!(back.pipeline_stage, DealStage::Opportunity);

    // The last pre-won stage has no Next; Won goes through confirmation.
    state
        .deals
        .move_stage(deal.id, DealStage::InvoiceSent)
        .await
        .unwrap();
    assert!(matches!(
        state.deals.move_next(deal.id).await,
        Err(CrmError::Validation(_))
    ));
}

#[tokio::test]
async fn same_column_drop_is_a_no_op() {
    let state = new_state();
    let deal = state.deals.create(deal_request("Drop", 0.0)).await;
    let before = state.deals.get(deal.id).await.unwrap();
    let after = state
        .deals
        .move_stage(deal.id, DealStage::Opportunity)
        .await
        .unwrap();
    assert_eq!(after.updated_at, before.updated_at);
}

#[tokio::test]
async fn lost_deals_leave_every_aggregate() {
    // Scenario E plus the toggle property: losing a deal removes it from
    // the totals, the counts, and both sides of the conversion rate;
    // recovering puts it back without double counting.
    let state = new_state();
    let d1 = state.deals.create(deal_request("Keep", 4_000.0)).await;
    let d2 = state.deals.create(deal_request("Lose", 6_000.0)).await;
    state
        .deals
        .move_stage(d1.id, DealStage::QuoteAccepted)
        .await
        .unwrap();

    let stats = state.deals.stats().await;
    assert_eq!(stats.total_deals, 2);
    assert_eq!(stats.total_pipeline_value, 10_000.0);
    assert_eq!(stats.avg_deal_size, 5_000.0);
    assert_eq!(stats.won_count, 1);
    assert_eq!(stats.conversion_rate, 0.5);

    state
        .deals
        .mark_lost(d2.id, "went with a competitor".to_string())
        .await
        .unwrap();
    let stats = state.deals.stats().await;
    assert_eq!(stats.total_deals, 1);
    assert_eq!(stats.total_pipeline_value, 4_000.0);
    assert_eq!(stats.conversion_rate, 1.0);
    let per_stage: f64 = stats.stages.iter().map(|s| s.value).sum();
    assert_eq!(per_stage, stats.total_pipeline_value);

    state.deals.recover(d2.id).await.unwrap();
    let stats = state.deals.stats().await;
    assert_eq!(stats.total_deals, 2);
    assert_eq!(stats.total_pipeline_value, 10_000.0);

    // A lost deal cannot be moved or re-lost without recovery.
    state.deals.mark_lost(d2.id, "again".to_string()).await.unwrap();
    assert!(matches!(
        state.deals.move_stage(d2.id, DealStage::QuoteSent).await,
        Err(CrmError::Conflict(_))
    ));
    assert!(matches!(
        state.deals.mark_lost(d2.id, "twice".to_string()).await,
        Err(CrmError::Conflict(_))
    ));
}

#[tokio::test]
async fn empty_pipeline_reports_zeroes() {
    let state = new_state();
    let stats = state.deals.stats().await;
    assert_eq!(stats.total_deals, 0);
    assert_eq!(stats.avg_deal_size, 0.0);
    assert_eq!(stats.conversion_rate, 0.0);
}

#[tokio::test]
async fn quote_validation_rejects_bad_amounts() {
    let state = new_state();
    let deal = state.deals.create(deal_request("Quote", 0.0)).await;
    assert!(matches!(
        state.deals.set_quote(deal.id, -1.0, 0.0).await,
        Err(CrmError::Validation(_))
    ));
    assert!(matches!(
        state.deals.set_quote(deal.id, 100.0, 200.0).await,
        Err(CrmError::Validation(_))
    ));
    let updated = state.deals.set_quote(deal.id, 2_500.0, 500.0).await.unwrap();
    assert_eq!(updated.quote_amount, 2_500.0);
    assert_eq!(updated.discount_amount, 500.0);
}

#[tokio::test]
async fn forecast_buckets_by_month_with_weighted_values() {
    // Scenario D: 20000 at 25% expected in March lands in the March bucket
    // with a weighted value of 5000.
    let state = new_state();
    let mut req = deal_request("March Deal", 0.0);
    req.forecast_amount = Some(20_000.0);
    req.forecast_probability = Some(25);
    req.expected_closing_date = NaiveDate::from_ymd_opt(2026, 3, 10);
    state.deals.create(req).await;

    // Probability defaults to 50 when never estimated; the payment date is
    // the fallback grouping date.
    let mut req = deal_request("April Deal", 0.0);
    req.forecast_amount = Some(8_000.0);
    req.expected_payment_date = NaiveDate::from_ymd_opt(2026, 4, 2);
    state.deals.create(req).await;

    // No forecast date at all: excluded entirely, not bucketed as unknown.
    let mut req = deal_request("Dateless", 0.0);
    req.forecast_amount = Some(99_999.0);
    state.deals.create(req).await;

    let deals = state.deals.all().await;
    let report = aggregate(&deals, ForecastGrouping::Month);

    assert_eq!(report.periods.len(), 2);
    assert_eq!(report.periods[0].period, "2026-03");
    assert_eq!(report.periods[0].total, 5_000.0);
    assert_eq!(report.periods[1].period, "2026-04");
    assert_eq!(report.periods[1].total, 4_000.0);

    // Sum over periods equals sum over qualifying deals.
    let period_sum: f64 = report.periods.iter().map(|p| p.total).sum();
    assert_eq!(period_sum, report.grand_total);
    assert_eq!(report.grand_total, 9_000.0);
}

#[tokio::test]
async fn forecast_excludes_lost_deals_and_supports_weeks() {
    let state = new_state();
    let mut req = deal_request("Weekly", 0.0);
    req.forecast_amount = Some(1_000.0);
    req.forecast_probability = Some(100);
    req.expected_closing_date = NaiveDate::from_ymd_opt(2026, 3, 10);
    let live = state.deals.create(req).await;

    let mut req = deal_request("Lost Forecast", 0.0);
    req.forecast_amount = Some(50_000.0);
    req.forecast_probability = Some(100);
    req.expected_closing_date = NaiveDate::from_ymd_opt(2026, 3, 11);
    let lost = state.deals.create(req).await;
    state
        .deals
        .mark_lost(lost.id, "withdrew".to_string())
        .await
        .unwrap();

    let deals = state.deals.all().await;
    let report = aggregate(&deals, ForecastGrouping::Week);
    assert_eq!(report.periods.len(), 1);
    assert_eq!(report.periods[0].period, "2026-W11");
    assert_eq!(report.periods[0].deals.len(), 1);
    assert_eq!(report.periods[0].deals[0].id, live.id);
    assert_eq!(report.grand_total, 1_000.0);
}

#[tokio::test]
async fn list_filters_by_stage_and_status() {
    let state = new_state();
    let a = state.deals.create(deal_request("A", 0.0)).await;
    let b = state.deals.create(deal_request("B", 0.0)).await;
    state
        .deals
        .move_stage(b.id, DealStage::Negotiation)
        .await
        .unwrap();

    let in_negotiation = state
        .deals
        .list(&ListDealsQuery {
            stage: Some(DealStage::Negotiation),
            status: None,
        })
        .await;
    assert_eq!(in_negotiation.len(), 1);
    assert_eq!(in_negotiation[0].id, b.id);

    let all = state
        .deals
        .list(&ListDealsQuery {
            stage: None,
            status: None,
        })
        .await;
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, a.id, "listing is ordered by creation time");
}
