//! Artifact records produced by the SD1 backend and cached by the production
//! store. Every field carries a serde default so a partially-shaped payload
//! still loads; consumers treat missing sub-fields as empty rather than
//! rejecting the whole artifact.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ── Artifact slots ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ArtifactKind {
    Script,
    OneLiner,
    Character,
    Schedule,
    Budget,
    Storyboard,
}

impl ArtifactKind {
    pub(crate) const ALL: [ArtifactKind; 6] = [
        Self::Script,
        Self::OneLiner,
        Self::Character,
        Self::Schedule,
        Self::Budget,
        Self::Storyboard,
    ];

    /// Artifacts cleared when the script artifact is cleared.
    pub(crate) const SCRIPT_DEPENDENTS: [ArtifactKind; 5] = [
        Self::OneLiner,
        Self::Character,
        Self::Schedule,
        Self::Budget,
        Self::Storyboard,
    ];

    /// Fixed key in the persistent medium.
    pub(crate) fn storage_key(&self) -> &'static str {
        match self {
            Self::Script => "SCRIPT_DATA",
            Self::OneLiner => "ONE_LINER_DATA",
            Self::Character => "CHARACTER_DATA",
            Self::Schedule => "SCHEDULE_DATA",
            Self::Budget => "BUDGET_DATA",
            Self::Storyboard => "STORYBOARD_DATA",
        }
    }

    pub(crate) fn from_storage_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.storage_key() == key)
    }

    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::OneLiner => "one-liner",
            Self::Character => "characters",
            Self::Schedule => "schedule",
            Self::Budget => "budget",
            Self::Storyboard => "storyboard",
        }
    }

    pub(crate) fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "script" => Some(Self::Script),
            "one-liner" | "oneliner" => Some(Self::OneLiner),
            "characters" | "character" => Some(Self::Character),
            "schedule" => Some(Self::Schedule),
            "budget" => Some(Self::Budget),
            "storyboard" | "storyboards" => Some(Self::Storyboard),
            _ => None,
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── ScriptData ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct ScriptData {
    #[serde(default)]
    pub(crate) metadata: ScriptMetadata,
    #[serde(default)]
    pub(crate) parsed_data: ParsedData,
    #[serde(default)]
    pub(crate) validation: Validation,
    #[serde(default)]
    pub(crate) characters: HashMap<String, ScriptCharacter>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct ScriptMetadata {
    #[serde(default)]
    pub(crate) global_requirements: GlobalRequirements,
    #[serde(default)]
    pub(crate) scene_metadata: Vec<SceneMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct GlobalRequirements {
    #[serde(default)]
    pub(crate) equipment: Vec<String>,
    #[serde(default)]
    pub(crate) props: Vec<String>,
    #[serde(default)]
    pub(crate) special_effects: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct SceneMetadata {
    #[serde(default)]
    pub(crate) scene_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) lighting: Option<Lighting>,
    #[serde(default)]
    pub(crate) props: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub(crate) technical: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub(crate) department_notes: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Lighting {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub(crate) kind: Option<String>,
    #[serde(default)]
    pub(crate) requirements: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct ParsedData {
    #[serde(default)]
    pub(crate) scenes: Vec<Scene>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) timeline: Option<Timeline>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Scene {
    #[serde(default)]
    pub(crate) scene_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) scene_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) location: Option<SceneLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) time: Option<String>,
    #[serde(default)]
    pub(crate) technical_cues: Vec<String>,
    #[serde(default)]
    pub(crate) department_notes: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub(crate) main_characters: Vec<String>,
    #[serde(default)]
    pub(crate) complexity_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct SceneLocation {
    #[serde(default)]
    pub(crate) place: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Timeline {
    #[serde(default)]
    pub(crate) total_duration: String,
    #[serde(default)]
    pub(crate) average_scene_duration: f64,
    #[serde(default)]
    pub(crate) total_pages: u32,
    #[serde(default)]
    pub(crate) scene_breakdown: Vec<SceneSlot>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct SceneSlot {
    #[serde(default)]
    pub(crate) scene_number: u32,
    #[serde(default)]
    pub(crate) start_time: String,
    #[serde(default)]
    pub(crate) end_time: String,
    #[serde(default)]
    pub(crate) location: String,
    #[serde(default)]
    pub(crate) characters: Vec<String>,
    #[serde(default)]
    pub(crate) technical_complexity: f64,
    #[serde(default)]
    pub(crate) setup_time: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Validation {
    #[serde(default)]
    pub(crate) validation_report: ValidationReport,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct ValidationReport {
    #[serde(default)]
    pub(crate) technical_validation: TechnicalValidation,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct TechnicalValidation {
    #[serde(default)]
    pub(crate) department_conflicts: Vec<DepartmentConflict>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct DepartmentConflict {
    #[serde(default)]
    pub(crate) scene_number: u32,
    #[serde(default)]
    pub(crate) conflict: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct ScriptCharacter {
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) description: String,
    #[serde(default)]
    pub(crate) traits: Vec<String>,
    #[serde(default)]
    pub(crate) relationships: Vec<String>,
}

// ── OneLinerData ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct OneLinerData {
    #[serde(default)]
    pub(crate) scenes: Vec<OneLinerScene>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct OneLinerScene {
    #[serde(default)]
    pub(crate) scene_number: u32,
    #[serde(default)]
    pub(crate) one_liner: String,
    #[serde(default)]
    pub(crate) description: String,
    #[serde(default)]
    pub(crate) location: String,
    #[serde(default)]
    pub(crate) time: String,
}

// ── CharacterData ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct CharacterData {
    #[serde(default)]
    pub(crate) characters: HashMap<String, CharacterProfile>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct CharacterProfile {
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) objective: String,
    #[serde(default)]
    pub(crate) traits: Vec<String>,
    #[serde(default)]
    pub(crate) relationships: Vec<CharacterRelationship>,
    #[serde(default)]
    pub(crate) scenes: Vec<u32>,
    #[serde(default)]
    pub(crate) arc: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct CharacterRelationship {
    #[serde(default)]
    pub(crate) character: String,
    #[serde(default)]
    pub(crate) relationship: String,
}

// ── ScheduleData ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct ScheduleData {
    #[serde(default)]
    pub(crate) schedule: Vec<ShootDay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) summary: Option<ScheduleSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct ShootDay {
    #[serde(default)]
    pub(crate) day: u32,
    #[serde(default)]
    pub(crate) date: String,
    #[serde(default)]
    pub(crate) scenes: Vec<ScheduledScene>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct ScheduledScene {
    #[serde(default)]
    pub(crate) scene_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) scene_id: Option<String>,
    #[serde(default)]
    pub(crate) location: String,
    #[serde(default)]
    pub(crate) start_time: String,
    #[serde(default)]
    pub(crate) end_time: String,
    #[serde(default)]
    pub(crate) duration: f64,
    #[serde(default)]
    pub(crate) setup_time: f64,
    #[serde(default)]
    pub(crate) crew_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct ScheduleSummary {
    #[serde(default)]
    pub(crate) total_days: u32,
    #[serde(default)]
    pub(crate) total_scenes: u32,
    #[serde(default)]
    pub(crate) total_pages: f64,
}

// ── BudgetData ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct BudgetData {
    #[serde(default)]
    pub(crate) budget: Budget,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Budget {
    #[serde(default)]
    pub(crate) categories: HashMap<String, BudgetCategory>,
    #[serde(default)]
    pub(crate) total: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct BudgetCategory {
    #[serde(default)]
    pub(crate) items: Vec<BudgetItem>,
    #[serde(default)]
    pub(crate) total: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct BudgetItem {
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) cost: f64,
    #[serde(default)]
    pub(crate) quantity: f64,
}

// ── StoryboardData ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct StoryboardData {
    #[serde(default)]
    pub(crate) storyboards: Vec<SceneStoryboard>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct SceneStoryboard {
    #[serde(default)]
    pub(crate) scene_number: u32,
    #[serde(default)]
    pub(crate) panels: Vec<StoryboardPanel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct StoryboardPanel {
    #[serde(default)]
    pub(crate) panel_number: u32,
    #[serde(default)]
    pub(crate) description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) image_url: Option<String>,
}
