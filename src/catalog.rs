//! Static, read-only stage catalogs and checklist templates.
//!
//! Every pipeline in the system (lead funnel, deal pipeline, case workflow)
//! is driven by one of the ordered catalogs below. Loosely-typed stage
//! tokens coming off the wire are parsed into these enums at the handler
//! boundary; business logic never sees raw strings.

use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LeadStage {
    FirstContact,
    SecondContact,
    ThirdContact,
    ConvertToOpportunity,
}

impl LeadStage {
    pub const ALL: [LeadStage; 4] = [
        LeadStage::FirstContact,
        LeadStage::SecondContact,
        LeadStage::ThirdContact,
        LeadStage::ConvertToOpportunity,
    ];

    pub fn next(self) -> Option<LeadStage> {
        let idx = Self::ALL.iter().position(|s| *s == self)?;
        Self::ALL.get(idx + 1).copied()
    }

    /// Dropping a lead onto this stage triggers lead-to-deal conversion.
    pub fn is_conversion_stage(self) -> bool {
        self == LeadStage::ConvertToOpportunity
    }
}

/// The canonical 14-token sales pipeline. Order matters: Back/Next use it,
/// and the last token is the deprecated `won` alias (the orthogonal deal
/// status is the canonical "won" signal, see `DealStatus`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DealStage {
    Opportunity,
    ContactMade,
    NeedsAssessment,
    EligibilityCheck,
    ProposalDrafted,
    QuoteSent,
    FollowUp,
    Negotiation,
    VerbalAgreement,
    ContractSent,
    QuoteAccepted,
    EngagementSent,
    InvoiceSent,
    Won,
}

impl DealStage {
    pub const ORDER: [DealStage; 14] = [
        DealStage::Opportunity,
        DealStage::ContactMade,
        DealStage::NeedsAssessment,
        DealStage::EligibilityCheck,
        DealStage::ProposalDrafted,
        DealStage::QuoteSent,
        DealStage::FollowUp,
        DealStage::Negotiation,
        DealStage::VerbalAgreement,
        DealStage::ContractSent,
        DealStage::QuoteAccepted,
        DealStage::EngagementSent,
        DealStage::InvoiceSent,
        DealStage::Won,
    ];

    pub fn index(self) -> usize {
        Self::ORDER
            .iter()
            .position(|s| *s == self)
            .unwrap_or_default()
    }

    /// Next stage via the directional control. The last pre-won stage has
    /// no Next; reaching `Won` goes through the confirmed won path instead.
    pub fn next(self) -> Option<DealStage> {
        match Self::ORDER.get(self.index() + 1).copied() {
            Some(DealStage::Won) | None => None,
            some => some,
        }
    }

    pub fn prev(self) -> Option<DealStage> {
        let idx = self.index();
        if idx == 0 {
            None
        } else {
            Self::ORDER.get(idx - 1).copied()
        }
    }

    /// Late-pipeline stages that count as won in aggregates even when the
    /// orthogonal status flag has not been flipped yet.
    pub fn counts_as_won(self) -> bool {
        matches!(
            self,
            DealStage::QuoteAccepted
                | DealStage::EngagementSent
                | DealStage::InvoiceSent
                | DealStage::Won
        )
    }
}

/// The six-step delivery workflow a won case moves through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CaseStage {
    NewClient,
    DocumentPreparation,
    Submission,
    SubmissionStatus,
    Tracking,
    Completed,
}

impl CaseStage {
    pub const ALL: [CaseStage; 6] = [
        CaseStage::NewClient,
        CaseStage::DocumentPreparation,
        CaseStage::Submission,
        CaseStage::SubmissionStatus,
        CaseStage::Tracking,
        CaseStage::Completed,
    ];

    pub fn number(self) -> u8 {
        Self::ALL.iter().position(|s| *s == self).unwrap_or_default() as u8 + 1
    }

    pub fn from_number(n: u8) -> Option<CaseStage> {
        if n == 0 {
            return None;
        }
        Self::ALL.get(n as usize - 1).copied()
    }

    pub fn next(self) -> Option<CaseStage> {
        Self::ALL.get(self.number() as usize).copied()
    }

    pub fn is_terminal(self) -> bool {
        self == CaseStage::Completed
    }

    /// Coarse completion percentage shown on dashboards.
    pub fn progress_pct(self) -> u8 {
        (self.number() - 1) * 20
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaseType {
    StudyVisa,
    WorkPermit,
    VisitorVisa,
    PermanentResidence,
}

/// One row of a checklist template: (category, document name, required).
pub type TemplateRow = (&'static str, &'static str, bool);

const COMMON_DOCS: &[TemplateRow] = &[
    ("identity", "Passport (all pages)", true),
    ("identity", "Passport-size photographs", true),
    ("identity", "National ID card", false),
    ("financial", "Bank statements (6 months)", true),
];

const STUDY_VISA_DOCS: &[TemplateRow] = &[
    ("academic", "Letter of acceptance", true),
    ("academic", "Transcripts and diplomas", true),
    ("academic", "Language test results", true),
    ("financial", "Tuition payment receipt", false),
    ("supporting", "Statement of purpose", false),
];

const WORK_PERMIT_DOCS: &[TemplateRow] = &[
    ("employment", "Job offer letter", true),
    ("employment", "Employment contract", true),
    ("employment", "Labour market opinion", false),
    ("supporting", "CV / resume", true),
    ("supporting", "Reference letters", false),
];

const VISITOR_VISA_DOCS: &[TemplateRow] = &[
    ("supporting", "Invitation letter", false),
    ("supporting", "Travel itinerary", true),
    ("supporting", "Travel insurance", true),
];

const PERMANENT_RESIDENCE_DOCS: &[TemplateRow] = &[
    ("identity", "Birth certificate", true),
    ("identity", "Police clearance certificate", true),
    ("identity", "Medical examination report", true),
    ("supporting", "Proof of residence history", true),
    ("supporting", "Marriage certificate", false),
];

/// Checklist rows seeded onto a new project for the given case type.
pub fn checklist_template(case_type: CaseType) -> Vec<TemplateRow> {
    let extra = match case_type {
        CaseType::StudyVisa => STUDY_VISA_DOCS,
        CaseType::WorkPermit => WORK_PERMIT_DOCS,
        CaseType::VisitorVisa => VISITOR_VISA_DOCS,
        CaseType::PermanentResidence => PERMANENT_RESIDENCE_DOCS,
    };
    COMMON_DOCS.iter().chain(extra.iter()).copied().collect()
}

/// All three read-only stage catalogs, in canonical order, for pipeline
/// column rendering.
pub async fn stage_catalogs() -> Json<serde_json::Value> {
    let cases: Vec<serde_json::Value> = CaseStage::ALL
        .iter()
        .map(|s| serde_json::json!({ "stage": s, "number": s.number(), "progress_pct": s.progress_pct() }))
        .collect();
    Json(serde_json::json!({
        "lead_stages": LeadStage::ALL,
        "deal_stages": DealStage::ORDER,
        "case_stages": cases,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deal_pipeline_has_fourteen_stages_ending_in_won() {
        assert_eq!(DealStage::ORDER.len(), 14);
        assert_eq!(DealStage::ORDER[13], DealStage::Won);
    }

    #[test]
    fn directional_controls_respect_canonical_order() {
        assert_eq!(DealStage::Opportunity.prev(), None);
        assert_eq!(DealStage::Opportunity.next(), Some(DealStage::ContactMade));
        // Last pre-won stage has no Next; Won is reached via the won path.
        assert_eq!(DealStage::InvoiceSent.next(), None);
        assert_eq!(DealStage::Won.prev(), Some(DealStage::InvoiceSent));
    }

    #[test]
    fn case_stage_numbers_round_trip() {
        for stage in CaseStage::ALL {
            assert_eq!(CaseStage::from_number(stage.number()), Some(stage));
        }
        assert_eq!(CaseStage::from_number(0), None);
        assert_eq!(CaseStage::from_number(7), None);
        assert_eq!(CaseStage::Completed.progress_pct(), 100);
    }

    #[test]
    fn lead_funnel_terminates_at_conversion() {
        assert_eq!(
            LeadStage::ThirdContact.next(),
            Some(LeadStage::ConvertToOpportunity)
        );
        assert_eq!(LeadStage::ConvertToOpportunity.next(), None);
        assert!(LeadStage::ConvertToOpportunity.is_conversion_stage());
        assert!(!LeadStage::ThirdContact.is_conversion_stage());
    }

    #[test]
    fn every_template_carries_required_rows() {
        for case_type in [
            CaseType::StudyVisa,
            CaseType::WorkPermit,
            CaseType::VisitorVisa,
            CaseType::PermanentResidence,
        ] {
            let rows = checklist_template(case_type);
            assert!(rows.iter().any(|(_, _, required)| *required));
        }
    }
}
