//! Document checklist rows and the completeness gate they feed.
//!
//! Required items gate the document-preparation stage of the case
//! workflow; optional items never block anything. Reminder stamping is a
//! bulk, idempotent write that never touches the case stage.

use axum::extract::{Path, State};
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::catalog::{checklist_template, CaseType};
use crate::shared::{AppState, CrmError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: Uuid,
    pub project_id: Uuid,
    pub category: String,
    pub name: String,
    pub is_required: bool,
    pub is_received: bool,
    pub received_date: Option<NaiveDate>,
    pub reminder_sent_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub category: String,
    pub name: String,
    #[serde(default)]
    pub is_required: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetReceivedRequest {
    pub is_received: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateNotesRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReminderReport {
    pub reminders_sent: usize,
    pub already_reminded: usize,
    pub not_required: usize,
}

pub struct ChecklistService {
    items: Arc<RwLock<HashMap<Uuid, ChecklistItem>>>,
}

impl ChecklistService {
    pub fn new() -> Self {
        Self {
            items: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Seeds the case type's template rows onto a freshly created project.
    pub async fn seed_for_project(&self, project_id: Uuid, case_type: CaseType) -> Vec<ChecklistItem> {
        let mut items = self.items.write().await;
        let mut seeded = Vec::new();
        for (category, name, is_required) in checklist_template(case_type) {
            let item = ChecklistItem {
                id: Uuid::new_v4(),
                project_id,
                category: category.to_string(),
                name: name.to_string(),
                is_required,
                is_received: false,
                received_date: None,
                reminder_sent_date: None,
                notes: None,
            };
            items.insert(item.id, item.clone());
            seeded.push(item);
        }
        seeded
    }

    pub async fn list(&self, project_id: Uuid) -> Vec<ChecklistItem> {
        let items = self.items.read().await;
        let mut out: Vec<ChecklistItem> = items
            .values()
            .filter(|i| i.project_id == project_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| (&a.category, &a.name).cmp(&(&b.category, &b.name)));
        out
    }

    /// True iff there are no required items or every required item has
    /// been received. Optional items never block.
    pub async fn is_complete(&self, project_id: Uuid) -> bool {
        let items = self.items.read().await;
        items
            .values()
            .filter(|i| i.project_id == project_id && i.is_required)
            .all(|i| i.is_received)
    }

    pub async fn missing_required(&self, project_id: Uuid) -> Vec<ChecklistItem> {
        let items = self.items.read().await;
        items
            .values()
            .filter(|i| i.project_id == project_id && i.is_required && !i.is_received)
            .cloned()
            .collect()
    }

    pub async fn add_item(&self, project_id: Uuid, req: AddItemRequest) -> ChecklistItem {
        let item = ChecklistItem {
            id: Uuid::new_v4(),
            project_id,
            category: req.category,
            name: req.name,
            is_required: req.is_required,
            is_received: false,
            received_date: None,
            reminder_sent_date: None,
            notes: None,
        };
        let mut items = self.items.write().await;
        items.insert(item.id, item.clone());
        item
    }

    pub async fn set_received(
        &self,
        item_id: Uuid,
        received: bool,
    ) -> Result<ChecklistItem, CrmError> {
        let mut items = self.items.write().await;
        let item = items
            .get_mut(&item_id)
            .ok_or_else(|| CrmError::not_found("checklist item", item_id))?;
        item.is_received = received;
        item.received_date = received.then(|| Utc::now().date_naive());
        Ok(item.clone())
    }

    pub async fn update_notes(
        &self,
        item_id: Uuid,
        notes: Option<String>,
    ) -> Result<ChecklistItem, CrmError> {
        let mut items = self.items.write().await;
        let item = items
            .get_mut(&item_id)
            .ok_or_else(|| CrmError::not_found("checklist item", item_id))?;
        item.notes = notes;
        Ok(item.clone())
    }

    /// Stamps `reminder_sent_date` on every required item still missing.
    /// Already-stamped items are skipped, so repeated calls settle into the
    /// same state. Never mutates the case stage.
    pub async fn send_reminders(&self, project_id: Uuid) -> ReminderReport {
        let today = Utc::now().date_naive();
        let mut items = self.items.write().await;
        let mut sent = 0;
        let mut already = 0;
        let mut not_required = 0;
        for item in items.values_mut().filter(|i| i.project_id == project_id) {
            if !item.is_required {
                not_required += 1;
            } else if item.is_received {
                // Nothing to remind about.
            } else if item.reminder_sent_date.is_some() {
                already += 1;
            } else {
                item.reminder_sent_date = Some(today);
                sent += 1;
            }
        }
        tracing::debug!(%project_id, sent, already, "checklist reminders stamped");
        ReminderReport {
            reminders_sent: sent,
            already_reminded: already,
            not_required,
        }
    }

    pub async fn delete_for_project(&self, project_id: Uuid) {
        let mut items = self.items.write().await;
        items.retain(|_, i| i.project_id != project_id);
    }
}

impl Default for ChecklistService {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn list_checklist(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<ChecklistItem>>, CrmError> {
    state
        .projects
        .get(project_id)
        .await
        .ok_or_else(|| CrmError::not_found("project", project_id))?;
    Ok(Json(state.checklists.list(project_id).await))
}

pub async fn add_checklist_item(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<ChecklistItem>, CrmError> {
    state
        .projects
        .get(project_id)
        .await
        .ok_or_else(|| CrmError::not_found("project", project_id))?;
    Ok(Json(state.checklists.add_item(project_id, req).await))
}

pub async fn send_reminders(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ReminderReport>, CrmError> {
    state
        .projects
        .get(project_id)
        .await
        .ok_or_else(|| CrmError::not_found("project", project_id))?;
    Ok(Json(state.checklists.send_reminders(project_id).await))
}

pub async fn set_received(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<Uuid>,
    Json(req): Json<SetReceivedRequest>,
) -> Result<Json<ChecklistItem>, CrmError> {
    Ok(Json(
        state.checklists.set_received(item_id, req.is_received).await?,
    ))
}

pub async fn update_notes(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<Uuid>,
    Json(req): Json<UpdateNotesRequest>,
) -> Result<Json<ChecklistItem>, CrmError> {
    Ok(Json(state.checklists.update_notes(item_id, req.notes).await?))
}
