//! First-contact funnel for cold leads.
//!
//! A lead walks the four-stage catalog until it reaches the conversion
//! stage, at which point the conversion bridge turns it into a deal. Lost
//! leads disappear from active views but are kept for recovery; hard
//! deletion is reserved for confirmed duplicates.

use axum::{
    extract::{Path, Query, State},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::catalog::{CaseType, LeadStage};
use crate::conversion::AdvanceOutcome;
use crate::shared::{AppState, CrmError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub nationality: Option<String>,
    pub case_type: CaseType,
    pub assigned_to: Option<Uuid>,
    pub stage: LeadStage,
    pub comments: Vec<LeadComment>,
    pub lost: bool,
    pub lost_reason: Option<String>,
    pub converted_deal_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only; comments are never edited or removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadComment {
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateLeadRequest {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub nationality: Option<String>,
    pub case_type: CaseType,
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct SetLeadStageRequest {
    pub stage_id: LeadStage,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub employee_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AddCommentRequest {
    pub author: String,
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct MarkLostRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchDeleteRequest {
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct BatchDeleteReport {
    pub total: usize,
    pub deleted: usize,
    pub missing: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ListLeadsQuery {
    #[serde(default)]
    pub include_lost: bool,
}

pub struct LeadService {
    leads: Arc<RwLock<HashMap<Uuid, Lead>>>,
}

impl LeadService {
    pub fn new() -> Self {
        Self {
            leads: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn create(&self, req: CreateLeadRequest) -> Lead {
        let now = Utc::now();
        let lead = Lead {
            id: Uuid::new_v4(),
            name: req.name,
            email: req.email,
            phone: req.phone,
            nationality: req.nationality,
            case_type: req.case_type,
            assigned_to: req.assigned_to,
            stage: LeadStage::FirstContact,
            comments: Vec::new(),
            lost: false,
            lost_reason: None,
            converted_deal_id: None,
            created_at: now,
            updated_at: now,
        };
        let mut leads = self.leads.write().await;
        leads.insert(lead.id, lead.clone());
        lead
    }

    pub async fn get(&self, id: Uuid) -> Option<Lead> {
        self.leads.read().await.get(&id).cloned()
    }

    pub async fn list(&self, include_lost: bool) -> Vec<Lead> {
        let leads = self.leads.read().await;
        let mut out: Vec<Lead> = leads
            .values()
            .filter(|l| include_lost || !l.lost)
            .cloned()
            .collect();
        out.sort_by_key(|l| l.created_at);
        out
    }

    /// Raw stage write used by the conversion bridge, including the revert
    /// after a failed conversion. Carries no side effects of its own.
    pub async fn set_stage(&self, id: Uuid, stage: LeadStage) -> Result<Lead, CrmError> {
        let mut leads = self.leads.write().await;
        let lead = leads
            .get_mut(&id)
            .ok_or_else(|| CrmError::not_found("lead", id))?;
        if lead.lost {
            return Err(CrmError::Conflict(format!(
                "lead {id} is marked lost; recover it before moving stages"
            )));
        }
        lead.stage = stage;
        lead.updated_at = Utc::now();
        Ok(lead.clone())
    }

    pub async fn record_conversion(&self, id: Uuid, deal_id: Uuid) -> Result<Lead, CrmError> {
        let mut leads = self.leads.write().await;
        let lead = leads
            .get_mut(&id)
            .ok_or_else(|| CrmError::not_found("lead", id))?;
        lead.converted_deal_id = Some(deal_id);
        lead.updated_at = Utc::now();
        Ok(lead.clone())
    }

    pub async fn assign(&self, id: Uuid, employee_id: Option<Uuid>) -> Result<Lead, CrmError> {
        let mut leads = self.leads.write().await;
        let lead = leads
            .get_mut(&id)
            .ok_or_else(|| CrmError::not_found("lead", id))?;
        lead.assigned_to = employee_id;
        lead.updated_at = Utc::now();
        Ok(lead.clone())
    }

    pub async fn add_comment(
        &self,
        id: Uuid,
        author: String,
        body: String,
    ) -> Result<Lead, CrmError> {
        if body.trim().is_empty() {
            return Err(CrmError::Validation("Comment body is empty".to_string()));
        }
        let mut leads = self.leads.write().await;
        let lead = leads
            .get_mut(&id)
            .ok_or_else(|| CrmError::not_found("lead", id))?;
        lead.comments.push(LeadComment {
            author,
            body,
            created_at: Utc::now(),
        });
        lead.updated_at = Utc::now();
        Ok(lead.clone())
    }

    pub async fn mark_lost(&self, id: Uuid, reason: String) -> Result<Lead, CrmError> {
        let mut leads = self.leads.write().await;
        let lead = leads
            .get_mut(&id)
            .ok_or_else(|| CrmError::not_found("lead", id))?;
        if lead.lost {
            return Err(CrmError::Conflict(format!("lead {id} is already lost")));
        }
        lead.lost = true;
        lead.lost_reason = Some(reason);
        lead.updated_at = Utc::now();
        tracing::info!(lead_id = %id, "lead lost");
        Ok(lead.clone())
    }

    pub async fn recover(&self, id: Uuid) -> Result<Lead, CrmError> {
        let mut leads = self.leads.write().await;
        let lead = leads
            .get_mut(&id)
            .ok_or_else(|| CrmError::not_found("lead", id))?;
        if !lead.lost {
            return Err(CrmError::Conflict(format!("lead {id} is not lost")));
        }
        lead.lost = false;
        lead.lost_reason = None;
        lead.updated_at = Utc::now();
        Ok(lead.clone())
    }

    /// Hard delete, reserved for confirmed duplicates.
    pub async fn delete(&self, id: Uuid) -> bool {
        self.leads.write().await.remove(&id).is_some()
    }

    /// Deletes every id it can and reports the rest; never aborts on the
    /// first failure.
    pub async fn batch_delete(&self, ids: &[Uuid]) -> BatchDeleteReport {
        let mut leads = self.leads.write().await;
        let mut deleted = 0;
        let mut missing = Vec::new();
        for id in ids {
            if leads.remove(id).is_some() {
                deleted += 1;
            } else {
                missing.push(*id);
            }
        }
        BatchDeleteReport {
            total: ids.len(),
            deleted,
            missing,
        }
    }
}

impl Default for LeadService {
    fn default() -> Self {
        Self::new()
    }
}

async fn create_lead(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateLeadRequest>,
) -> Json<Lead> {
    Json(state.leads.create(req).await)
}

async fn list_leads(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListLeadsQuery>,
) -> Json<Vec<Lead>> {
    Json(state.leads.list(query.include_lost).await)
}

async fn get_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Lead>, CrmError> {
    state
        .leads
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| CrmError::not_found("lead", id))
}

async fn advance_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<AdvanceOutcome>, CrmError> {
    Ok(Json(state.bridge.advance_lead(id).await?))
}

async fn set_lead_stage(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetLeadStageRequest>,
) -> Result<Json<AdvanceOutcome>, CrmError> {
    Ok(Json(state.bridge.set_lead_stage(id, req.stage_id).await?))
}

async fn assign_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignRequest>,
) -> Result<Json<Lead>, CrmError> {
    Ok(Json(state.leads.assign(id, req.employee_id).await?))
}

async fn add_comment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddCommentRequest>,
) -> Result<Json<Lead>, CrmError> {
    Ok(Json(state.leads.add_comment(id, req.author, req.body).await?))
}

async fn mark_lost(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<MarkLostRequest>,
) -> Result<Json<Lead>, CrmError> {
    Ok(Json(state.leads.mark_lost(id, req.reason).await?))
}

async fn recover_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Lead>, CrmError> {
    Ok(Json(state.leads.recover(id).await?))
}

async fn delete_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, CrmError> {
    if state.leads.delete(id).await {
        Ok(Json(serde_json::json!({"success": true})))
    } else {
        Err(CrmError::not_found("lead", id))
    }
}

async fn batch_delete_leads(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchDeleteRequest>,
) -> Result<Json<BatchDeleteReport>, CrmError> {
    let report = state.leads.batch_delete(&req.ids).await;
    if report.missing.is_empty() {
        Ok(Json(report))
    } else {
        Err(CrmError::PartialBatch {
            total: report.total,
            failed: report.missing.len(),
        })
    }
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/crm/leads", get(list_leads).post(create_lead))
        .route("/api/crm/leads/batch-delete", post(batch_delete_leads))
        .route("/api/crm/leads/:id", get(get_lead).delete(delete_lead))
        .route("/api/crm/leads/:id/advance", post(advance_lead))
        .route("/api/crm/leads/:id/stage", patch(set_lead_stage))
        .route("/api/crm/leads/:id/assign", patch(assign_lead))
        .route("/api/crm/leads/:id/comments", post(add_comment))
        .route("/api/crm/leads/:id/lost", patch(mark_lost))
        .route("/api/crm/leads/:id/recover", patch(recover_lead))
}
