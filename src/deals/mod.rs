//! Sales pipeline for qualified opportunities.
//!
//! A deal moves through the 14-token catalog in `catalog::DealStage`.
//! Drag-and-drop may set any stage from any other; the directional
//! Back/Next controls respect canonical order. Won/lost are terminal
//! resolutions, with `status` as the canonical flag (the `won` stage token
//! is a kept alias). Lost deals drop out of every aggregate.

use axum::{
    extract::{Path, Query, State},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::catalog::{CaseType, DealStage};
use crate::leads::Lead;
use crate::shared::{AppState, CrmError};

pub mod forecast;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    Open,
    Won,
    Lost,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    pub id: Uuid,
    pub lead_id: Option<Uuid>,
    pub client_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub nationality: Option<String>,
    pub case_type: CaseType,
    pub assigned_to: Option<Uuid>,
    pub pipeline_stage: DealStage,
    pub status: DealStatus,
    pub quote_amount: f64,
    pub discount_amount: f64,
    pub forecast_amount: Option<f64>,
    pub forecast_probability: Option<u8>,
    pub expected_closing_date: Option<NaiveDate>,
    pub expected_payment_date: Option<NaiveDate>,
    pub lost_reason: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deal {
    pub fn is_lost(&self) -> bool {
        self.status == DealStatus::Lost
    }

    /// A deal counts as won once the status flag says so or it sits in one
    /// of the late closing stages.
    pub fn counts_as_won(&self) -> bool {
        self.status == DealStatus::Won || self.pipeline_stage.counts_as_won()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateDealRequest {
    pub client_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub nationality: Option<String>,
    pub case_type: CaseType,
    pub lead_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub quote_amount: Option<f64>,
    pub discount_amount: Option<f64>,
    pub forecast_amount: Option<f64>,
    pub forecast_probability: Option<u8>,
    pub expected_closing_date: Option<NaiveDate>,
    pub expected_payment_date: Option<NaiveDate>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct MoveStageRequest {
    pub stage_id: DealStage,
}

#[derive(Debug, Deserialize)]
pub struct MarkWonRequest {
    /// The UI must show an explicit confirmation step before winning a
    /// deal; an unconfirmed call is rejected.
    #[serde(default)]
    pub confirmed: bool,
}

#[derive(Debug, Deserialize)]
pub struct MarkLostRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct SetQuoteRequest {
    pub amount: f64,
    #[serde(default)]
    pub discount: f64,
}

#[derive(Debug, Deserialize)]
pub struct AddTagsRequest {
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListDealsQuery {
    pub stage: Option<DealStage>,
    pub status: Option<DealStatus>,
}

#[derive(Debug, Serialize)]
pub struct PipelineStats {
    pub total_deals: usize,
    pub total_pipeline_value: f64,
    pub avg_deal_size: f64,
    pub won_count: usize,
    pub conversion_rate: f64,
    pub stages: Vec<StageStats>,
}

#[derive(Debug, Serialize)]
pub struct StageStats {
    pub stage: DealStage,
    pub count: usize,
    pub value: f64,
}

pub struct DealService {
    deals: Arc<RwLock<HashMap<Uuid, Deal>>>,
}

impl DealService {
    pub fn new() -> Self {
        Self {
            deals: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn create(&self, req: CreateDealRequest) -> Deal {
        let now = Utc::now();
        let deal = Deal {
            id: Uuid::new_v4(),
            lead_id: req.lead_id,
            client_name: req.client_name,
            email: req.email,
            phone: req.phone,
            nationality: req.nationality,
            case_type: req.case_type,
            assigned_to: req.assigned_to,
            pipeline_stage: DealStage::Opportunity,
            status: DealStatus::Open,
            quote_amount: req.quote_amount.unwrap_or(0.0),
            discount_amount: req.discount_amount.unwrap_or(0.0),
            forecast_amount: req.forecast_amount,
            forecast_probability: req.forecast_probability,
            expected_closing_date: req.expected_closing_date,
            expected_payment_date: req.expected_payment_date,
            lost_reason: None,
            tags: req.tags.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };
        let mut deals = self.deals.write().await;
        deals.insert(deal.id, deal.clone());
        deal
    }

    /// Used by the conversion bridge: a converted lead lands at the first
    /// pipeline stage with its contact data and assignment copied over.
    pub async fn create_from_lead(&self, lead: &Lead) -> Deal {
        let now = Utc::now();
        let deal = Deal {
            id: Uuid::new_v4(),
            lead_id: Some(lead.id),
            client_name: lead.name.clone(),
            email: lead.email.clone(),
            phone: lead.phone.clone(),
            nationality: lead.nationality.clone(),
            case_type: lead.case_type,
            assigned_to: lead.assigned_to,
            pipeline_stage: DealStage::Opportunity,
            status: DealStatus::Open,
            quote_amount: 0.0,
            discount_amount: 0.0,
            forecast_amount: None,
            forecast_probability: None,
            expected_closing_date: None,
            expected_payment_date: None,
            lost_reason: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        let mut deals = self.deals.write().await;
        deals.insert(deal.id, deal.clone());
        deal
    }

    pub async fn get(&self, id: Uuid) -> Option<Deal> {
        self.deals.read().await.get(&id).cloned()
    }

    pub async fn find_by_lead(&self, lead_id: Uuid) -> Option<Deal> {
        let deals = self.deals.read().await;
        deals.values().find(|d| d.lead_id == Some(lead_id)).cloned()
    }

    pub async fn list(&self, query: &ListDealsQuery) -> Vec<Deal> {
        let deals = self.deals.read().await;
        let mut out: Vec<Deal> = deals
            .values()
            .filter(|d| query.stage.map_or(true, |s| d.pipeline_stage == s))
            .filter(|d| query.status.map_or(true, |s| d.status == s))
            .cloned()
            .collect();
        out.sort_by_key(|d| d.created_at);
        out
    }

    /// Unconditional stage write used by both the explicit controls and
    /// drag-and-drop. Only a same-column drop is a no-op guard; winning
    /// always goes through the confirmed won path.
    pub async fn move_stage(&self, id: Uuid, to_stage: DealStage) -> Result<Deal, CrmError> {
        let mut deals = self.deals.write().await;
        let deal = deals
            .get_mut(&id)
            .ok_or_else(|| CrmError::not_found("deal", id))?;
        if deal.status == DealStatus::Lost {
            return Err(CrmError::Conflict(format!(
                "deal {id} is marked lost; recover it before moving stages"
            )));
        }
        if deal.status == DealStatus::Won {
            return Err(CrmError::Conflict(format!("deal {id} is already won")));
        }
        if to_stage == DealStage::Won {
            return Err(CrmError::Validation(
                "Winning a deal requires explicit confirmation; use the won endpoint".to_string(),
            ));
        }
        if deal.pipeline_stage == to_stage {
            return Ok(deal.clone());
        }
        deal.pipeline_stage = to_stage;
        deal.updated_at = Utc::now();
        tracing::debug!(deal_id = %id, stage = ?to_stage, "deal stage moved");
        Ok(deal.clone())
    }

    pub async fn move_back(&self, id: Uuid) -> Result<Deal, CrmError> {
        let current = self
            .get(id)
            .await
            .ok_or_else(|| CrmError::not_found("deal", id))?
            .pipeline_stage;
        let prev = current.prev().ok_or_else(|| {
            CrmError::Validation("The first pipeline stage has no previous stage".to_string())
        })?;
        self.move_stage(id, prev).await
    }

    pub async fn move_next(&self, id: Uuid) -> Result<Deal, CrmError> {
        let current = self
            .get(id)
            .await
            .ok_or_else(|| CrmError::not_found("deal", id))?
            .pipeline_stage;
        let next = current.next().ok_or_else(|| {
            CrmError::Validation(
                "The last pipeline stage has no next stage; use the won endpoint".to_string(),
            )
        })?;
        self.move_stage(id, next).await
    }

    /// Flips the canonical status flag and writes the `won` alias token.
    /// Project creation is the bridge's job; this only resolves the deal.
    pub async fn mark_won(&self, id: Uuid, confirmed: bool) -> Result<Deal, CrmError> {
        if !confirmed {
            return Err(CrmError::Validation(
                "Winning a deal requires explicit confirmation".to_string(),
            ));
        }
        let mut deals = self.deals.write().await;
        let deal = deals
            .get_mut(&id)
            .ok_or_else(|| CrmError::not_found("deal", id))?;
        match deal.status {
            DealStatus::Won => {
                return Err(CrmError::Conflict(format!("deal {id} is already won")))
            }
            DealStatus::Lost => {
                return Err(CrmError::Conflict(format!(
                    "deal {id} is marked lost; recover it first"
                )))
            }
            DealStatus::Open => {}
        }
        deal.status = DealStatus::Won;
        deal.pipeline_stage = DealStage::Won;
        deal.updated_at = Utc::now();
        tracing::info!(deal_id = %id, "deal won");
        Ok(deal.clone())
    }

    pub async fn mark_lost(&self, id: Uuid, reason: String) -> Result<Deal, CrmError> {
        let mut deals = self.deals.write().await;
        let deal = deals
            .get_mut(&id)
            .ok_or_else(|| CrmError::not_found("deal", id))?;
        if deal.status == DealStatus::Lost {
            return Err(CrmError::Conflict(format!("deal {id} is already lost")));
        }
        deal.status = DealStatus::Lost;
        deal.lost_reason = Some(reason);
        deal.updated_at = Utc::now();
        tracing::info!(deal_id = %id, "deal lost");
        Ok(deal.clone())
    }

    /// Clears the lost flag; the deal keeps the stage it was lost from and
    /// rejoins every aggregate.
    pub async fn recover(&self, id: Uuid) -> Result<Deal, CrmError> {
        let mut deals = self.deals.write().await;
        let deal = deals
            .get_mut(&id)
            .ok_or_else(|| CrmError::not_found("deal", id))?;
        if deal.status != DealStatus::Lost {
            return Err(CrmError::Conflict(format!("deal {id} is not lost")));
        }
        deal.status = DealStatus::Open;
        deal.lost_reason = None;
        deal.updated_at = Utc::now();
        Ok(deal.clone())
    }

    pub async fn set_quote(&self, id: Uuid, amount: f64, discount: f64) -> Result<Deal, CrmError> {
        if amount < 0.0 || discount < 0.0 {
            return Err(CrmError::Validation(
                "Quote and discount amounts must be non-negative".to_string(),
            ));
        }
        if discount > amount {
            return Err(CrmError::Validation(
                "Discount cannot exceed the quote amount".to_string(),
            ));
        }
        let mut deals = self.deals.write().await;
        let deal = deals
            .get_mut(&id)
            .ok_or_else(|| CrmError::not_found("deal", id))?;
        if deal.status == DealStatus::Lost {
            return Err(CrmError::Conflict(format!("deal {id} is marked lost")));
        }
        deal.quote_amount = amount;
        deal.discount_amount = discount;
        deal.updated_at = Utc::now();
        Ok(deal.clone())
    }

    pub async fn add_tags(&self, id: Uuid, tags: Vec<String>) -> Result<Deal, CrmError> {
        let mut deals = self.deals.write().await;
        let deal = deals
            .get_mut(&id)
            .ok_or_else(|| CrmError::not_found("deal", id))?;
        for tag in tags {
            if !deal.tags.contains(&tag) {
                deal.tags.push(tag);
            }
        }
        deal.updated_at = Utc::now();
        Ok(deal.clone())
    }

    /// Pipeline aggregates. Lost deals appear in none of them, regardless
    /// of the stage token they were lost from.
    pub async fn stats(&self) -> PipelineStats {
        let deals = self.deals.read().await;
        let active: Vec<&Deal> = deals.values().filter(|d| !d.is_lost()).collect();

        let total_pipeline_value: f64 = active.iter().map(|d| d.quote_amount).sum();
        let won_count = active.iter().filter(|d| d.counts_as_won()).count();
        let total_deals = active.len();

        let stages = DealStage::ORDER
            .iter()
            .map(|&stage| {
                let in_stage: Vec<&&Deal> = active
                    .iter()
                    .filter(|d| d.pipeline_stage == stage)
                    .collect();
                StageStats {
                    stage,
                    count: in_stage.len(),
                    value: in_stage.iter().map(|d| d.quote_amount).sum(),
                }
            })
            .collect();

        PipelineStats {
            total_deals,
            total_pipeline_value,
            avg_deal_size: if total_deals == 0 {
                0.0
            } else {
                total_pipeline_value / total_deals as f64
            },
            won_count,
            conversion_rate: if total_deals == 0 {
                0.0
            } else {
                won_count as f64 / total_deals as f64
            },
            stages,
        }
    }

    pub async fn all(&self) -> Vec<Deal> {
        self.deals.read().await.values().cloned().collect()
    }
}

impl Default for DealService {
    fn default() -> Self {
        Self::new()
    }
}

async fn create_deal(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateDealRequest>,
) -> Result<Json<Deal>, CrmError> {
    Ok(Json(state.deals.create(req).await))
}

async fn list_deals(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListDealsQuery>,
) -> Json<Vec<Deal>> {
    Json(state.deals.list(&query).await)
}

async fn get_deal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Deal>, CrmError> {
    state
        .deals
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| CrmError::not_found("deal", id))
}

async fn move_stage(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<MoveStageRequest>,
) -> Result<Json<Deal>, CrmError> {
    Ok(Json(state.deals.move_stage(id, req.stage_id).await?))
}

async fn move_back(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Deal>, CrmError> {
    Ok(Json(state.deals.move_back(id).await?))
}

async fn move_next(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Deal>, CrmError> {
    Ok(Json(state.deals.move_next(id).await?))
}

async fn mark_won(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<MarkWonRequest>,
) -> Result<Json<crate::conversion::WonOutcome>, CrmError> {
    Ok(Json(state.bridge.mark_deal_won(id, req.confirmed).await?))
}

async fn mark_lost(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<MarkLostRequest>,
) -> Result<Json<Deal>, CrmError> {
    Ok(Json(state.deals.mark_lost(id, req.reason).await?))
}

async fn recover_deal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Deal>, CrmError> {
    Ok(Json(state.deals.recover(id).await?))
}

async fn set_quote(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetQuoteRequest>,
) -> Result<Json<Deal>, CrmError> {
    Ok(Json(state.deals.set_quote(id, req.amount, req.discount).await?))
}

async fn add_tags(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddTagsRequest>,
) -> Result<Json<Deal>, CrmError> {
    Ok(Json(state.deals.add_tags(id, req.tags).await?))
}

async fn pipeline_stats(State(state): State<Arc<AppState>>) -> Json<PipelineStats> {
    Json(state.deals.stats().await)
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/crm/deals", get(list_deals).post(create_deal))
        .route("/api/crm/deals/stats", get(pipeline_stats))
        .route("/api/crm/deals/:id", get(get_deal))
        .route("/api/crm/deals/:id/stage", patch(move_stage))
        .route("/api/crm/deals/:id/back", post(move_back))
        .route("/api/crm/deals/:id/next", post(move_next))
        .route("/api/crm/deals/:id/won", post(mark_won))
        .route("/api/crm/deals/:id/lost", patch(mark_lost))
        .route("/api/crm/deals/:id/recover", patch(recover_deal))
        .route("/api/crm/deals/:id/quote", patch(set_quote))
        .route("/api/crm/deals/:id/tags", post(add_tags))
        .route("/api/crm/forecast", get(forecast::forecast_report))
}
