//! Cross-entity side effects: lead-to-deal conversion and won-deal-to-
//! project creation. Both are idempotent, and the caller always gets an
//! in-band signal of whether anything was actually created.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::catalog::LeadStage;
use crate::deals::{Deal, DealService, DealStatus};
use crate::leads::{Lead, LeadService};
use crate::projects::{CreateProjectRequest, Project, ProjectService};
use crate::shared::{AppState, CrmError};

/// Result of a lead funnel move. `deal` is set when the move landed on the
/// conversion stage; `deal_created` distinguishes a fresh deal from the
/// idempotent re-use of an earlier conversion.
#[derive(Debug, Serialize)]
pub struct AdvanceOutcome {
    pub lead: Lead,
    pub deal: Option<Deal>,
    pub deal_created: bool,
}

#[derive(Debug, Serialize)]
pub struct WonOutcome {
    pub deal: Deal,
    pub project_id: Uuid,
    pub project_created: bool,
}

#[derive(Debug, Serialize)]
pub struct ProjectOutcome {
    pub project: Project,
    pub created: bool,
}

/// Answer to "does every won deal have a project?".
#[derive(Debug, Serialize)]
pub struct ReconciliationReport {
    pub won_deals: usize,
    pub with_project: usize,
    pub missing_project_deal_ids: Vec<Uuid>,
}

pub struct ConversionBridge {
    leads: Arc<LeadService>,
    deals: Arc<DealService>,
    projects: Arc<ProjectService>,
}

impl ConversionBridge {
    pub fn new(
        leads: Arc<LeadService>,
        deals: Arc<DealService>,
        projects: Arc<ProjectService>,
    ) -> Self {
        Self {
            leads,
            deals,
            projects,
        }
    }

    /// Moves a lead to the next funnel stage, or re-attempts conversion
    /// when it already sits on the terminal conversion stage. Repeated
    /// calls never create a second deal.
    pub async fn advance_lead(&self, id: Uuid) -> Result<AdvanceOutcome, CrmError> {
        let lead = self
            .leads
            .get(id)
            .await
            .ok_or_else(|| CrmError::not_found("lead", id))?;
        if lead.lost {
            return Err(CrmError::Conflict(format!("lead {id} is marked lost")));
        }
        match lead.stage.next() {
            Some(next) => {
                let updated = self.leads.set_stage(id, next).await?;
                if next.is_conversion_stage() {
                    self.convert_with_revert(id, lead.stage).await
                } else {
                    Ok(AdvanceOutcome {
                        lead: updated,
                        deal: None,
                        deal_created: false,
                    })
                }
            }
            // Already at the conversion stage; reverting is a no-op here.
            None => self.convert_with_revert(id, lead.stage).await,
        }
    }

    /// Drag-and-drop direct set. Only a drop on the conversion stage has a
    /// side effect; a same-column drop is a no-op.
    pub async fn set_lead_stage(
        &self,
        id: Uuid,
        stage: LeadStage,
    ) -> Result<AdvanceOutcome, CrmError> {
        let lead = self
            .leads
            .get(id)
            .await
            .ok_or_else(|| CrmError::not_found("lead", id))?;
        if lead.lost {
            return Err(CrmError::Conflict(format!(
                "lead {id} is marked lost; recover it before moving stages"
            )));
        }
        if lead.stage == stage {
            return Ok(AdvanceOutcome {
                lead,
                deal: None,
                deal_created: false,
            });
        }
        let updated = self.leads.set_stage(id, stage).await?;
        if stage.is_conversion_stage() {
            self.convert_with_revert(id, lead.stage).await
        } else {
            Ok(AdvanceOutcome {
                lead: updated,
                deal: None,
                deal_created: false,
            })
        }
    }

    /// A failed conversion must not leave the lead sitting on the
    /// conversion stage with no deal behind it; the stage is put back to
    /// where it was before the attempt.
    async fn convert_with_revert(
        &self,
        id: Uuid,
        prior_stage: LeadStage,
    ) -> Result<AdvanceOutcome, CrmError> {
        match self.convert_to_deal(id).await {
            Ok((deal, created)) => {
                let lead = self
                    .leads
                    .get(id)
                    .await
                    .ok_or_else(|| CrmError::not_found("lead", id))?;
                Ok(AdvanceOutcome {
                    lead,
                    deal: Some(deal),
                    deal_created: created,
                })
            }
            Err(err) => {
                let _ = self.leads.set_stage(id, prior_stage).await;
                Err(err)
            }
        }
    }

    /// Idempotent upsert: an already-converted lead gets its existing deal
    /// back instead of a duplicate.
    pub async fn convert_to_deal(&self, lead_id: Uuid) -> Result<(Deal, bool), CrmError> {
        let lead = self
            .leads
            .get(lead_id)
            .await
            .ok_or_else(|| CrmError::not_found("lead", lead_id))?;

        if let Some(deal_id) = lead.converted_deal_id {
            if let Some(deal) = self.deals.get(deal_id).await {
                return Ok((deal, false));
            }
        }
        // Secondary check in case the linkage was never recorded.
        if let Some(deal) = self.deals.find_by_lead(lead_id).await {
            self.leads.record_conversion(lead_id, deal.id).await?;
            return Ok((deal, false));
        }

        let deal = self.deals.create_from_lead(&lead).await;
        self.leads.record_conversion(lead_id, deal.id).await?;
        tracing::info!(lead_id = %lead_id, deal_id = %deal.id, "lead converted to deal");
        Ok((deal, true))
    }

    /// Wins the deal and creates its delivery project. When the project
    /// cannot be created the deal stays won and the error is the distinct
    /// partial-failure variant, so callers can tell the two apart.
    pub async fn mark_deal_won(&self, id: Uuid, confirmed: bool) -> Result<WonOutcome, CrmError> {
        let deal = self.deals.mark_won(id, confirmed).await?;
        match self.create_project(&deal).await {
            Ok(outcome) => Ok(WonOutcome {
                deal,
                project_id: outcome.project.id,
                project_created: outcome.created,
            }),
            Err(err) => {
                tracing::error!(deal_id = %id, error = %err, "deal won but project creation failed");
                Err(CrmError::Conversion(err.to_string()))
            }
        }
    }

    /// Exactly-once per deal: an existing linked project is returned with
    /// `created = false` before any new one is synthesized.
    pub async fn create_project(&self, deal: &Deal) -> Result<ProjectOutcome, CrmError> {
        if let Some(existing) = self.projects.find_by_deal(deal.id).await {
            return Ok(ProjectOutcome {
                project: existing,
                created: false,
            });
        }
        let project = self
            .projects
            .create(CreateProjectRequest {
                client_name: deal.client_name.clone(),
                case_type: deal.case_type,
                deal_id: Some(deal.id),
            })
            .await;
        tracing::info!(deal_id = %deal.id, project_id = %project.id, "project created for won deal");
        Ok(ProjectOutcome {
            project,
            created: true,
        })
    }

    pub async fn reconcile(&self) -> ReconciliationReport {
        let deals = self.deals.all().await;
        let mut won = 0;
        let mut with_project = 0;
        let mut missing = Vec::new();
        for deal in deals.iter().filter(|d| d.status == DealStatus::Won) {
            won += 1;
            if self.projects.find_by_deal(deal.id).await.is_some() {
                with_project += 1;
            } else {
                missing.push(deal.id);
            }
        }
        if !missing.is_empty() {
            tracing::warn!(count = missing.len(), "won deals without a project");
        }
        ReconciliationReport {
            won_deals: won,
            with_project,
            missing_project_deal_ids: missing,
        }
    }
}

async fn reconciliation(State(state): State<Arc<AppState>>) -> Json<ReconciliationReport> {
    Json(state.bridge.reconcile().await)
}

/// Recovery path for the won-without-project failure mode: re-attempts
/// project creation for a deal that is already won.
async fn create_project_for_deal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProjectOutcome>, CrmError> {
    let deal = state
        .deals
        .get(id)
        .await
        .ok_or_else(|| CrmError::not_found("deal", id))?;
    if deal.status != DealStatus::Won {
        return Err(CrmError::Validation(
            "Deal must be won before its project is created".to_string(),
        ));
    }
    Ok(Json(state.bridge.create_project(&deal).await?))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/crm/reconciliation", get(reconciliation))
        .route("/api/crm/deals/:id/project", post(create_project_for_deal))
}
