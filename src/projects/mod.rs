//! Delivery workflow for won cases.
//!
//! A project walks the six stages in `catalog::CaseStage`, forward-only
//! except for the two explicit Back affordances (submission-status back to
//! submission, tracking back to submission-status). Three of the forward
//! edges are guarded; a failed guard rejects the advance and mutates
//! nothing, so repeated attempts are harmless. Stage bumps that depend on
//! data (submission status, tracking fields) happen in the same write as
//! that data.

use axum::{
    extract::{Path, State},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::catalog::{CaseStage, CaseType};
use crate::shared::{AppState, CrmError};

pub mod checklist;

use checklist::ChecklistService;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub deal_id: Option<Uuid>,
    pub client_name: String,
    pub case_type: CaseType,
    pub stage: CaseStage,
    pub progress_pct: u8,
    pub supervisor_reviewed: bool,
    pub submitted: bool,
    pub submission_status: SubmissionStatus,
    pub tracking: TrackingInfo,
    pub status_note: Option<String>,
    pub storage_folder: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Submitted,
    OnHold,
    Returned,
}

/// The six tracking fields that close out a case. All must be present
/// before the workflow reaches its terminal stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackingInfo {
    pub submission_type: Option<String>,
    pub submission_center: Option<String>,
    pub submission_date: Option<NaiveDate>,
    pub visa_reference: Option<String>,
    pub vfs_receipt: Option<String>,
    pub receipt_number: Option<String>,
}

impl TrackingInfo {
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.submission_type.is_none() {
            missing.push("submission_type");
        }
        if self.submission_center.is_none() {
            missing.push("submission_center");
        }
        if self.submission_date.is_none() {
            missing.push("submission_date");
        }
        if self.visa_reference.is_none() {
            missing.push("visa_reference");
        }
        if self.vfs_receipt.is_none() {
            missing.push("vfs_receipt");
        }
        if self.receipt_number.is_none() {
            missing.push("receipt_number");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub client_name: String,
    pub case_type: CaseType,
    pub deal_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct SetTaskFlagsRequest {
    pub supervisor_reviewed: Option<bool>,
    pub submitted: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SetSubmissionStatusRequest {
    pub submission_status: SubmissionStatus,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Deserialize)]
pub struct SaveTrackingRequest {
    pub submission_type: Option<String>,
    pub submission_center: Option<String>,
    pub submission_date: Option<NaiveDate>,
    pub visa_reference: Option<String>,
    pub vfs_receipt: Option<String>,
    pub receipt_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetStatusNoteRequest {
    pub status: String,
}

pub struct ProjectService {
    projects: Arc<RwLock<HashMap<Uuid, Project>>>,
    checklists: Arc<ChecklistService>,
}

impl ProjectService {
    pub fn new(checklists: Arc<ChecklistService>) -> Self {
        Self {
            projects: Arc::new(RwLock::new(HashMap::new())),
            checklists,
        }
    }

    pub async fn create(&self, req: CreateProjectRequest) -> Project {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let folder_stub: String = req
            .client_name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect();
        let project = Project {
            id,
            deal_id: req.deal_id,
            client_name: req.client_name,
            case_type: req.case_type,
            stage: CaseStage::NewClient,
            progress_pct: CaseStage::NewClient.progress_pct(),
            supervisor_reviewed: false,
            submitted: false,
            submission_status: SubmissionStatus::Pending,
            tracking: TrackingInfo::default(),
            status_note: None,
            storage_folder: format!("cases/{folder_stub}-{}", &id.to_string()[..8]),
            created_at: now,
            updated_at: now,
        };
        let mut projects = self.projects.write().await;
        projects.insert(project.id, project.clone());
        self.checklists
            .seed_for_project(project.id, project.case_type)
            .await;
        project
    }

    pub async fn get(&self, id: Uuid) -> Option<Project> {
        self.projects.read().await.get(&id).cloned()
    }

    pub async fn find_by_deal(&self, deal_id: Uuid) -> Option<Project> {
        let projects = self.projects.read().await;
        projects
            .values()
            .find(|p| p.deal_id == Some(deal_id))
            .cloned()
    }

    pub async fn list(&self) -> Vec<Project> {
        let projects = self.projects.read().await;
        let mut out: Vec<Project> = projects.values().cloned().collect();
        out.sort_by_key(|p| p.created_at);
        out
    }

    /// Attempts the forward transition out of the current stage. Guard
    /// failures leave the project untouched and name what is missing.
    pub async fn advance(&self, id: Uuid) -> Result<Project, CrmError> {
        // Evaluated outside the write lock; the checklist has its own.
        let current = self
            .get(id)
            .await
            .ok_or_else(|| CrmError::not_found("project", id))?;

        match current.stage {
            CaseStage::NewClient => {
                self.set_stage_from(id, CaseStage::NewClient, CaseStage::DocumentPreparation)
                    .await
            }
            CaseStage::DocumentPreparation => {
                if !self.checklists.is_complete(id).await {
                    return Err(CrmError::Validation(
                        "Required documents missing".to_string(),
                    ));
                }
                self.set_stage_from(id, CaseStage::DocumentPreparation, CaseStage::Submission)
                    .await
            }
            CaseStage::Submission => {
                if !(current.supervisor_reviewed && current.submitted) {
                    return Err(CrmError::Validation("Tasks incomplete".to_string()));
                }
                self.set_stage_from(id, CaseStage::Submission, CaseStage::SubmissionStatus)
                    .await
            }
            CaseStage::SubmissionStatus => Err(CrmError::Validation(
                "Set submission status to \"submitted\" to advance this case".to_string(),
            )),
            CaseStage::Tracking => {
                let missing = current.tracking.missing_fields();
                if !missing.is_empty() {
                    return Err(CrmError::Validation(format!(
                        "Missing tracking fields: {}",
                        missing.join(", ")
                    )));
                }
                self.set_stage_from(id, CaseStage::Tracking, CaseStage::Completed)
                    .await
            }
            CaseStage::Completed => Err(CrmError::Conflict(format!(
                "project {id} is already completed"
            ))),
        }
    }

    /// The only two Back affordances the workflow offers.
    pub async fn back(&self, id: Uuid) -> Result<Project, CrmError> {
        let current = self
            .get(id)
            .await
            .ok_or_else(|| CrmError::not_found("project", id))?;
        match current.stage {
            CaseStage::SubmissionStatus => {
                self.set_stage_from(id, CaseStage::SubmissionStatus, CaseStage::Submission)
                    .await
            }
            CaseStage::Tracking => {
                self.set_stage_from(id, CaseStage::Tracking, CaseStage::SubmissionStatus)
                    .await
            }
            _ => Err(CrmError::Validation(format!(
                "Stage {} has no back transition",
                current.stage.number()
            ))),
        }
    }

    pub async fn set_task_flags(
        &self,
        id: Uuid,
        supervisor_reviewed: Option<bool>,
        submitted: Option<bool>,
    ) -> Result<Project, CrmError> {
        let mut projects = self.projects.write().await;
        let project = projects
            .get_mut(&id)
            .ok_or_else(|| CrmError::not_found("project", id))?;
        if let Some(reviewed) = supervisor_reviewed {
            project.supervisor_reviewed = reviewed;
        }
        if let Some(submitted) = submitted {
            project.submitted = submitted;
        }
        project.updated_at = Utc::now();
        Ok(project.clone())
    }

    /// Persists the submission status; the `submitted` value also bumps a
    /// stage-4 case to tracking in the same write. Any other value keeps
    /// the stage where it is.
    pub async fn set_submission_status(
        &self,
        id: Uuid,
        status: SubmissionStatus,
    ) -> Result<Project, CrmError> {
        let mut projects = self.projects.write().await;
        let project = projects
            .get_mut(&id)
            .ok_or_else(|| CrmError::not_found("project", id))?;
        project.submission_status = status;
        if status == SubmissionStatus::Submitted && project.stage == CaseStage::SubmissionStatus {
            project.stage = CaseStage::Tracking;
            project.progress_pct = CaseStage::Tracking.progress_pct();
            tracing::info!(project_id = %id, "case submitted, moved to tracking");
        }
        project.updated_at = Utc::now();
        Ok(project.clone())
    }

    /// Merges the given tracking fields. Once all six are present on a
    /// stage-5 case, the same write moves it to the terminal stage, so a
    /// crash can never leave the data and the stage disagreeing.
    pub async fn save_tracking(
        &self,
        id: Uuid,
        update: SaveTrackingRequest,
    ) -> Result<Project, CrmError> {
        let mut projects = self.projects.write().await;
        let project = projects
            .get_mut(&id)
            .ok_or_else(|| CrmError::not_found("project", id))?;
        let t = &mut project.tracking;
        if update.submission_type.is_some() {
            t.submission_type = update.submission_type;
        }
        if update.submission_center.is_some() {
            t.submission_center = update.submission_center;
        }
        if update.submission_date.is_some() {
            t.submission_date = update.submission_date;
        }
        if update.visa_reference.is_some() {
            t.visa_reference = update.visa_reference;
        }
        if update.vfs_receipt.is_some() {
            t.vfs_receipt = update.vfs_receipt;
        }
        if update.receipt_number.is_some() {
            t.receipt_number = update.receipt_number;
        }
        if project.stage == CaseStage::Tracking && project.tracking.is_complete() {
            project.stage = CaseStage::Completed;
            project.progress_pct = CaseStage::Completed.progress_pct();
            tracing::info!(project_id = %id, "all tracking fields present, case completed");
        }
        project.updated_at = Utc::now();
        Ok(project.clone())
    }

    pub async fn set_status_note(&self, id: Uuid, note: String) -> Result<Project, CrmError> {
        let mut projects = self.projects.write().await;
        let project = projects
            .get_mut(&id)
            .ok_or_else(|| CrmError::not_found("project", id))?;
        project.status_note = Some(note);
        project.updated_at = Utc::now();
        Ok(project.clone())
    }

    pub async fn delete(&self, id: Uuid) -> bool {
        let removed = self.projects.write().await.remove(&id).is_some();
        if removed {
            self.checklists.delete_for_project(id).await;
        }
        removed
    }

    /// Compare-and-set stage write: the guard was evaluated against a
    /// snapshot, so the transition only lands if the stage is still the
    /// one the guard saw.
    async fn set_stage_from(
        &self,
        id: Uuid,
        from: CaseStage,
        to: CaseStage,
    ) -> Result<Project, CrmError> {
        let mut projects = self.projects.write().await;
        let project = projects
            .get_mut(&id)
            .ok_or_else(|| CrmError::not_found("project", id))?;
        if project.stage != from {
            return Err(CrmError::Conflict(format!(
                "project {id} stage changed underneath the caller"
            )));
        }
        project.stage = to;
        project.progress_pct = to.progress_pct();
        project.updated_at = Utc::now();
        tracing::debug!(project_id = %id, stage = to.number(), "project stage changed");
        Ok(project.clone())
    }
}

async fn create_project(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProjectRequest>,
) -> Json<Project> {
    Json(state.projects.create(req).await)
}

async fn list_projects(State(state): State<Arc<AppState>>) -> Json<Vec<Project>> {
    Json(state.projects.list().await)
}

async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Project>, CrmError> {
    state
        .projects
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| CrmError::not_found("project", id))
}

async fn advance_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Project>, CrmError> {
    Ok(Json(state.projects.advance(id).await?))
}

async fn back_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Project>, CrmError> {
    Ok(Json(state.projects.back(id).await?))
}

async fn set_task_flags(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetTaskFlagsRequest>,
) -> Result<Json<Project>, CrmError> {
    Ok(Json(
        state
            .projects
            .set_task_flags(id, req.supervisor_reviewed, req.submitted)
            .await?,
    ))
}

async fn set_submission_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetSubmissionStatusRequest>,
) -> Result<Json<Project>, CrmError> {
    Ok(Json(
        state
            .projects
            .set_submission_status(id, req.submission_status)
            .await?,
    ))
}

async fn save_tracking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<SaveTrackingRequest>,
) -> Result<Json<Project>, CrmError> {
    Ok(Json(state.projects.save_tracking(id, req).await?))
}

async fn set_status_note(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetStatusNoteRequest>,
) -> Result<Json<Project>, CrmError> {
    Ok(Json(state.projects.set_status_note(id, req.status).await?))
}

async fn delete_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, CrmError> {
    if state.projects.delete(id).await {
        Ok(Json(serde_json::json!({"success": true})))
    } else {
        Err(CrmError::not_found("project", id))
    }
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/crm/projects", get(list_projects).post(create_project))
        .route("/api/crm/projects/:id", get(get_project).delete(delete_project))
        .route("/api/crm/projects/:id/advance", post(advance_project))
        .route("/api/crm/projects/:id/back", post(back_project))
        .route("/api/crm/projects/:id/tasks", patch(set_task_flags))
        .route(
            "/api/crm/projects/:id/submission-status",
            patch(set_submission_status),
        )
        .route("/api/crm/projects/:id/tracking", patch(save_tracking))
        .route("/api/crm/projects/:id/status", patch(set_status_note))
        .route(
            "/api/crm/projects/:id/checklist",
            get(checklist::list_checklist).post(checklist::add_checklist_item),
        )
        .route(
            "/api/crm/projects/:id/checklist/reminders",
            post(checklist::send_reminders),
        )
        .route(
            "/api/crm/checklist/:item_id/received",
            patch(checklist::set_received),
        )
        .route(
            "/api/crm/checklist/:item_id/notes",
            patch(checklist::update_notes),
        )
}
