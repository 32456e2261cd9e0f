use std::sync::Arc;

use crate::config::AppConfig;
use crate::conversion::ConversionBridge;
use crate::deals::DealService;
use crate::leads::LeadService;
use crate::projects::checklist::ChecklistService;
use crate::projects::ProjectService;

/// Shared application state handed to every handler. Services are
/// in-memory and shared through `Arc`s.
pub struct AppState {
    pub config: AppConfig,
    pub leads: Arc<LeadService>,
    pub deals: Arc<DealService>,
    pub projects: Arc<ProjectService>,
    pub checklists: Arc<ChecklistService>,
    pub bridge: Arc<ConversionBridge>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let leads = Arc::new(LeadService::new());
        let deals = Arc::new(DealService::new());
        let checklists = Arc::new(ChecklistService::new());
        let projects = Arc::new(ProjectService::new(checklists.clone()));
        let bridge = Arc::new(ConversionBridge::new(
            leads.clone(),
            deals.clone(),
            projects.clone(),
        ));
        Self {
            config,
            leads,
            deals,
            projects,
            checklists,
            bridge,
        }
    }
}
