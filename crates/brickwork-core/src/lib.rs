//! Core domain model, session capabilities, and configuration for Brickwork.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "brickwork-core";

/// Sentinel accepted by categorical browse filters meaning "no constraint".
pub const FILTER_ALL: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfessionalKind {
    BuyersAgent,
    Conveyancer,
    BuildingInspector,
    PestInspector,
    MortgageBroker,
    PropertyManager,
}

impl ProfessionalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BuyersAgent => "buyers_agent",
            Self::Conveyancer => "conveyancer",
            Self::BuildingInspector => "building_inspector",
            Self::PestInspector => "pest_inspector",
            Self::MortgageBroker => "mortgage_broker",
            Self::PropertyManager => "property_manager",
        }
    }
}

/// Verified professional listed in the directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Professional {
    pub id: Uuid,
    pub display_name: String,
    pub kind: ProfessionalKind,
    pub city: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub specializations: Vec<String>,
    pub verified: bool,
    pub rating: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Off-market property listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: Uuid,
    pub lister_id: Uuid,
    pub title: String,
    pub address: String,
    pub suburb: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub currency: String,
    pub asking_price: i64,
    pub bedrooms: u8,
    pub bathrooms: u8,
    pub parking: u8,
    pub off_market: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Building,
    Pest,
    Combined,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Building => "building",
            Self::Pest => "pest",
            Self::Combined => "combined",
        }
    }
}

/// Inspection job status. Forward-only; see [`JobStatus::can_advance_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Open,
    Assigned,
    ReportSubmitted,
    Closed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Assigned => "assigned",
            Self::ReportSubmitted => "report_submitted",
            Self::Closed => "closed",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Open => 0,
            Self::Assigned => 1,
            Self::ReportSubmitted => 2,
            Self::Closed => 3,
        }
    }

    pub fn can_advance_to(&self, next: JobStatus) -> bool {
        next.rank() > self.rank()
    }
}

/// Inspection job posted by a requester and bid on by inspectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionJob {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub property_address: String,
    pub suburb: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub service_type: ServiceType,
    pub status: JobStatus,
    pub agreed_price: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Inspector's offer on an open job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub id: Uuid,
    pub job_id: Uuid,
    pub inspector_id: Uuid,
    pub amount: i64,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BriefPriority {
    MustHave,
    NiceToHave,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BriefRequirement {
    pub text: String,
    pub priority: BriefPriority,
}

/// Buyer requirement form used to match properties and seed report brief-matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientBrief {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub suburb_focus: String,
    pub budget: i64,
    pub requirements: Vec<BriefRequirement>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    HighlyRecommend,
    WorthConsidering,
    NotRecommended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Meets,
    Partial,
    Doesnt,
    Unset,
}

/// One row of the report's requirement checklist, seeded once from the
/// linked [`ClientBrief`] and mutated in place afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BriefMatch {
    pub requirement: String,
    pub status: MatchStatus,
    pub notes: String,
}

impl BriefMatch {
    pub fn from_requirement(req: &BriefRequirement) -> Self {
        Self {
            requirement: req.text.clone(),
            status: MatchStatus::Unset,
            notes: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionCondition {
    Good,
    Fair,
    Poor,
    NotInspected,
}

/// Findings for a single report section. Every field is valid partial.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionEntry {
    pub condition: Option<SectionCondition>,
    pub notes: String,
}

/// The 16 fixed, independently optional report sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSections {
    pub site_and_grounds: Option<SectionEntry>,
    pub exterior_walls: Option<SectionEntry>,
    pub roof_exterior: Option<SectionEntry>,
    pub roof_space: Option<SectionEntry>,
    pub subfloor: Option<SectionEntry>,
    pub foundation: Option<SectionEntry>,
    pub windows_and_doors: Option<SectionEntry>,
    pub interior_rooms: Option<SectionEntry>,
    pub kitchen: Option<SectionEntry>,
    pub bathrooms_and_wet_areas: Option<SectionEntry>,
    pub plumbing: Option<SectionEntry>,
    pub electrical: Option<SectionEntry>,
    pub heating_and_cooling: Option<SectionEntry>,
    pub moisture_and_damp: Option<SectionEntry>,
    pub pest_evidence: Option<SectionEntry>,
    pub safety_hazards: Option<SectionEntry>,
}

/// Identifier for one of the fixed sections, used by the editing surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionId {
    SiteAndGrounds,
    ExteriorWalls,
    RoofExterior,
    RoofSpace,
    Subfloor,
    Foundation,
    WindowsAndDoors,
    InteriorRooms,
    Kitchen,
    BathroomsAndWetAreas,
    Plumbing,
    Electrical,
    HeatingAndCooling,
    MoistureAndDamp,
    PestEvidence,
    SafetyHazards,
}

impl SectionId {
    pub const ALL: [SectionId; 16] = [
        Self::SiteAndGrounds,
        Self::ExteriorWalls,
        Self::RoofExterior,
        Self::RoofSpace,
        Self::Subfloor,
        Self::Foundation,
        Self::WindowsAndDoors,
        Self::InteriorRooms,
        Self::Kitchen,
        Self::BathroomsAndWetAreas,
        Self::Plumbing,
        Self::Electrical,
        Self::HeatingAndCooling,
        Self::MoistureAndDamp,
        Self::PestEvidence,
        Self::SafetyHazards,
    ];
}

impl ReportSections {
    pub fn entry_mut(&mut self, id: SectionId) -> &mut Option<SectionEntry> {
        match id {
            SectionId::SiteAndGrounds => &mut self.site_and_grounds,
            SectionId::ExteriorWalls => &mut self.exterior_walls,
            SectionId::RoofExterior => &mut self.roof_exterior,
            SectionId::RoofSpace => &mut self.roof_space,
            SectionId::Subfloor => &mut self.subfloor,
            SectionId::Foundation => &mut self.foundation,
            SectionId::WindowsAndDoors => &mut self.windows_and_doors,
            SectionId::InteriorRooms => &mut self.interior_rooms,
            SectionId::Kitchen => &mut self.kitchen,
            SectionId::BathroomsAndWetAreas => &mut self.bathrooms_and_wet_areas,
            SectionId::Plumbing => &mut self.plumbing,
            SectionId::Electrical => &mut self.electrical,
            SectionId::HeatingAndCooling => &mut self.heating_and_cooling,
            SectionId::MoistureAndDamp => &mut self.moisture_and_damp,
            SectionId::PestEvidence => &mut self.pest_evidence,
            SectionId::SafetyHazards => &mut self.safety_hazards,
        }
    }

    pub fn entry(&self, id: SectionId) -> Option<&SectionEntry> {
        match id {
            SectionId::SiteAndGrounds => self.site_and_grounds.as_ref(),
            SectionId::ExteriorWalls => self.exterior_walls.as_ref(),
            SectionId::RoofExterior => self.roof_exterior.as_ref(),
            SectionId::RoofSpace => self.roof_space.as_ref(),
            SectionId::Subfloor => self.subfloor.as_ref(),
            SectionId::Foundation => self.foundation.as_ref(),
            SectionId::WindowsAndDoors => self.windows_and_doors.as_ref(),
            SectionId::InteriorRooms => self.interior_rooms.as_ref(),
            SectionId::Kitchen => self.kitchen.as_ref(),
            SectionId::BathroomsAndWetAreas => self.bathrooms_and_wet_areas.as_ref(),
            SectionId::Plumbing => self.plumbing.as_ref(),
            SectionId::Electrical => self.electrical.as_ref(),
            SectionId::HeatingAndCooling => self.heating_and_cooling.as_ref(),
            SectionId::MoistureAndDamp => self.moisture_and_damp.as_ref(),
            SectionId::PestEvidence => self.pest_evidence.as_ref(),
            SectionId::SafetyHazards => self.safety_hazards.as_ref(),
        }
    }

    /// Fraction of sections with any findings recorded, for the progress bar.
    pub fn completion(&self) -> f64 {
        let filled = SectionId::ALL
            .iter()
            .filter(|id| self.entry(**id).is_some())
            .count();
        filled as f64 / SectionId::ALL.len() as f64
    }
}

/// Persisted report record. At most one non-submitted draft exists per
/// `(job_id, inspector_id)`; the backend assigns `id` on first insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDraft {
    pub id: Option<Uuid>,
    pub job_id: Uuid,
    pub inspector_id: Uuid,
    pub sections: ReportSections,
    pub score: Option<f64>,
    pub recommendation: Option<Recommendation>,
    pub summary: String,
    pub brief_matches: Vec<BriefMatch>,
    pub last_saved_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub time_spent_minutes: Option<u64>,
}

impl ReportDraft {
    pub fn new(job_id: Uuid, inspector_id: Uuid) -> Self {
        Self {
            id: None,
            job_id,
            inspector_id,
            sections: ReportSections::default(),
            score: None,
            recommendation: None,
            summary: String::new(),
            brief_matches: Vec::new(),
            last_saved_at: None,
            submitted_at: None,
            time_spent_minutes: None,
        }
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted_at.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Buyer,
    Professional,
    Inspector,
    Admin,
}

/// Closed permission set. Resolved once per session from the role and then
/// passed by reference; screens never recompute it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    BrowseDirectory,
    BrowseMarketplace,
    ListProperty,
    PostInspectionJob,
    BidOnJob,
    AuthorReport,
    ViewReports,
    ManageListings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitySet {
    caps: Vec<Capability>,
}

impl CapabilitySet {
    pub fn resolve(role: Role) -> Self {
        use Capability::*;
        let caps = match role {
            Role::Buyer => vec![
                BrowseDirectory,
                BrowseMarketplace,
                PostInspectionJob,
                ViewReports,
            ],
            Role::Professional => vec![BrowseDirectory, BrowseMarketplace, ListProperty],
            Role::Inspector => vec![BrowseDirectory, BrowseMarketplace, BidOnJob, AuthorReport],
            Role::Admin => vec![
                BrowseDirectory,
                BrowseMarketplace,
                ListProperty,
                PostInspectionJob,
                BidOnJob,
                AuthorReport,
                ViewReports,
                ManageListings,
            ],
        };
        Self { caps }
    }

    pub fn allows(&self, cap: Capability) -> bool {
        self.caps.contains(&cap)
    }
}

/// Marketplace-wide configuration, loaded once from the environment.
#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    pub backend_base_url: String,
    /// Fraction of the agreed job price paid out to the inspector.
    pub payout_split: f64,
    pub autosave_interval_secs: u64,
    pub http_timeout_secs: u64,
}

impl MarketplaceConfig {
    pub fn from_env() -> Self {
        Self {
            backend_base_url: std::env::var("BRICKWORK_BACKEND_URL")
                .unwrap_or_else(|_| "http://localhost:8090".to_string()),
            payout_split: std::env::var("BRICKWORK_PAYOUT_SPLIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.90),
            autosave_interval_secs: std::env::var("BRICKWORK_AUTOSAVE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            http_timeout_secs: std::env::var("BRICKWORK_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
        }
    }
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            backend_base_url: "http://localhost:8090".to_string(),
            payout_split: 0.90,
            autosave_interval_secs: 30,
            http_timeout_secs: 20,
        }
    }
}

/// Inspector payout for an agreed price. The split lives in configuration,
/// never as a literal at call sites.
pub fn inspector_payout(agreed_price: i64, config: &MarketplaceConfig) -> i64 {
    (agreed_price as f64 * config.payout_split).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_is_forward_only() {
        assert!(JobStatus::Open.can_advance_to(JobStatus::Assigned));
        assert!(JobStatus::Assigned.can_advance_to(JobStatus::ReportSubmitted));
        assert!(JobStatus::ReportSubmitted.can_advance_to(JobStatus::Closed));
        assert!(!JobStatus::ReportSubmitted.can_advance_to(JobStatus::Open));
        assert!(!JobStatus::Closed.can_advance_to(JobStatus::ReportSubmitted));
        assert!(!JobStatus::Open.can_advance_to(JobStatus::Open));
    }

    #[test]
    fn capability_set_is_resolved_per_role() {
        let buyer = CapabilitySet::resolve(Role::Buyer);
        assert!(buyer.allows(Capability::PostInspectionJob));
        assert!(!buyer.allows(Capability::AuthorReport));

        let inspector = CapabilitySet::resolve(Role::Inspector);
        assert!(inspector.allows(Capability::BidOnJob));
        assert!(inspector.allows(Capability::AuthorReport));
        assert!(!inspector.allows(Capability::ListProperty));
    }

    #[test]
    fn payout_uses_configured_split() {
        let config = MarketplaceConfig::default();
        assert_eq!(inspector_payout(1000, &config), 900);

        let custom = MarketplaceConfig {
            payout_split: 0.85,
            ..MarketplaceConfig::default()
        };
        assert_eq!(inspector_payout(1000, &custom), 850);
    }

    #[test]
    fn section_completion_counts_filled_sections() {
        let mut sections = ReportSections::default();
        assert_eq!(sections.completion(), 0.0);

        *sections.entry_mut(SectionId::Kitchen) = Some(SectionEntry {
            condition: Some(SectionCondition::Good),
            notes: "renovated 2023".into(),
        });
        *sections.entry_mut(SectionId::RoofExterior) = Some(SectionEntry::default());
        assert!((sections.completion() - 2.0 / 16.0).abs() < f64::EPSILON);
    }

    #[test]
    fn brief_match_seeds_unset_with_empty_notes() {
        let req = BriefRequirement {
            text: "North-facing backyard".into(),
            priority: BriefPriority::MustHave,
        };
        let m = BriefMatch::from_requirement(&req);
        assert_eq!(m.status, MatchStatus::Unset);
        assert_eq!(m.requirement, "North-facing backyard");
        assert!(m.notes.is_empty());
    }

    #[test]
    fn status_wire_names_are_snake_case() {
        let json = serde_json::to_string(&JobStatus::ReportSubmitted).unwrap();
        assert_eq!(json, "\"report_submitted\"");
        let rec = serde_json::to_string(&Recommendation::HighlyRecommend).unwrap();
        assert_eq!(rec, "\"highly_recommend\"");
    }
}
