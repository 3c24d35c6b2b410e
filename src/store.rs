//! Production-data store: the six pipeline artifacts, mirrored to a
//! persistent key-value medium and replayed to subscribers.
//!
//! The store is the sole writer. Pages of work (CLI operations, the serve
//! loop) read through the getters and write through the update functions.
//! The medium is a reload cache, not a source of truth: a malformed or
//! missing entry loads as None and is never an error to the caller.

#[cfg(test)]
use std::collections::HashMap;
use std::sync::mpsc::{Receiver, Sender};
#[cfg(test)]
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::store_db::GatewayDb;
use crate::types::{
    ArtifactKind, BudgetData, CharacterData, OneLinerData, ScheduleData, ScriptData,
    StoryboardData,
};

// ── Persistence port ─────────────────────────────────────────────────────

pub(crate) trait StorageMedium {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), String>;
    fn remove(&self, key: &str) -> Result<(), String>;
}

impl StorageMedium for GatewayDb {
    fn get(&self, key: &str) -> Option<String> {
        self.artifact_get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        self.artifact_set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), String> {
        self.artifact_remove(key).map(|_| ())
    }
}

/// In-memory medium. Clones share the same map, which doubles as the
/// "other execution context" in cross-context tests.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct MemoryMedium {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

#[cfg(test)]
impl StorageMedium for MemoryMedium {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        let mut map = self.inner.lock().map_err(|_| "medium poisoned".to_string())?;
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), String> {
        let mut map = self.inner.lock().map_err(|_| "medium poisoned".to_string())?;
        map.remove(key);
        Ok(())
    }
}

// ── Events ───────────────────────────────────────────────────────────────

/// Delivered to subscribers after every slot change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
pub(crate) struct StoreEvent {
    pub(crate) kind: ArtifactKind,
    pub(crate) present: bool,
}

/// Change notice from another execution context that wrote the same medium.
/// Carries the storage key only; the store re-reads the medium on receipt.
#[derive(Debug, Clone)]
pub(crate) struct ExternalChange {
    pub(crate) key: String,
}

// ── Store ────────────────────────────────────────────────────────────────

pub(crate) struct ProductionStore {
    medium: Box<dyn StorageMedium>,
    script: Option<ScriptData>,
    one_liner: Option<OneLinerData>,
    character: Option<CharacterData>,
    schedule: Option<ScheduleData>,
    budget: Option<BudgetData>,
    storyboard: Option<StoryboardData>,
    observers: Vec<Sender<StoreEvent>>,
    external: Option<Receiver<ExternalChange>>,
}

fn load_slot<T: DeserializeOwned>(medium: &dyn StorageMedium, kind: ArtifactKind) -> Option<T> {
    let raw = medium.get(kind.storage_key())?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            eprintln!("[store] discarding malformed {kind} entry: {e}");
            None
        }
    }
}

impl ProductionStore {
    pub(crate) fn new(medium: Box<dyn StorageMedium>) -> Self {
        let script = load_slot(medium.as_ref(), ArtifactKind::Script);
        let one_liner = load_slot(medium.as_ref(), ArtifactKind::OneLiner);
        let character = load_slot(medium.as_ref(), ArtifactKind::Character);
        let schedule = load_slot(medium.as_ref(), ArtifactKind::Schedule);
        let budget = load_slot(medium.as_ref(), ArtifactKind::Budget);
        let storyboard = load_slot(medium.as_ref(), ArtifactKind::Storyboard);
        ProductionStore {
            medium,
            script,
            one_liner,
            character,
            schedule,
            budget,
            storyboard,
            observers: Vec::new(),
            external: None,
        }
    }

    // ── Getters ──────────────────────────────────────────────────────

    pub(crate) fn script_data(&self) -> Option<&ScriptData> {
        self.script.as_ref()
    }

    pub(crate) fn one_liner_data(&self) -> Option<&OneLinerData> {
        self.one_liner.as_ref()
    }

    pub(crate) fn character_data(&self) -> Option<&CharacterData> {
        self.character.as_ref()
    }

    pub(crate) fn schedule_data(&self) -> Option<&ScheduleData> {
        self.schedule.as_ref()
    }

    pub(crate) fn budget_data(&self) -> Option<&BudgetData> {
        self.budget.as_ref()
    }

    pub(crate) fn storyboard_data(&self) -> Option<&StoryboardData> {
        self.storyboard.as_ref()
    }

    pub(crate) fn has(&self, kind: ArtifactKind) -> bool {
        match kind {
            ArtifactKind::Script => self.script.is_some(),
            ArtifactKind::OneLiner => self.one_liner.is_some(),
            ArtifactKind::Character => self.character.is_some(),
            ArtifactKind::Schedule => self.schedule.is_some(),
            ArtifactKind::Budget => self.budget.is_some(),
            ArtifactKind::Storyboard => self.storyboard.is_some(),
        }
    }

    /// Current in-memory value serialized for display. None when absent.
    pub(crate) fn artifact_json(&self, kind: ArtifactKind) -> Option<serde_json::Value> {
        fn to_value<T: Serialize>(v: &Option<T>) -> Option<serde_json::Value> {
            v.as_ref().and_then(|v| serde_json::to_value(v).ok())
        }
        match kind {
            ArtifactKind::Script => to_value(&self.script),
            ArtifactKind::OneLiner => to_value(&self.one_liner),
            ArtifactKind::Character => to_value(&self.character),
            ArtifactKind::Schedule => to_value(&self.schedule),
            ArtifactKind::Budget => to_value(&self.budget),
            ArtifactKind::Storyboard => to_value(&self.storyboard),
        }
    }

    // ── Updates ──────────────────────────────────────────────────────

    pub(crate) fn update_script_data(&mut self, data: Option<ScriptData>) {
        let present = data.is_some();
        self.persist(ArtifactKind::Script, data.as_ref());
        self.script = data;
        self.notify(ArtifactKind::Script, present);
        if !present {
            self.cascade_clear_dependents();
        }
    }

    pub(crate) fn update_one_liner_data(&mut self, data: Option<OneLinerData>) {
        self.warn_if_out_of_order(ArtifactKind::OneLiner, data.is_some());
        let present = data.is_some();
        self.persist(ArtifactKind::OneLiner, data.as_ref());
        self.one_liner = data;
        self.notify(ArtifactKind::OneLiner, present);
    }

    pub(crate) fn update_character_data(&mut self, data: Option<CharacterData>) {
        self.warn_if_out_of_order(ArtifactKind::Character, data.is_some());
        let present = data.is_some();
        self.persist(ArtifactKind::Character, data.as_ref());
        self.character = data;
        self.notify(ArtifactKind::Character, present);
    }

    pub(crate) fn update_schedule_data(&mut self, data: Option<ScheduleData>) {
        self.warn_if_out_of_order(ArtifactKind::Schedule, data.is_some());
        let present = data.is_some();
        self.persist(ArtifactKind::Schedule, data.as_ref());
        self.schedule = data;
        self.notify(ArtifactKind::Schedule, present);
    }

    pub(crate) fn update_budget_data(&mut self, data: Option<BudgetData>) {
        self.warn_if_out_of_order(ArtifactKind::Budget, data.is_some());
        let present = data.is_some();
        self.persist(ArtifactKind::Budget, data.as_ref());
        self.budget = data;
        self.notify(ArtifactKind::Budget, present);
    }

    pub(crate) fn update_storyboard_data(&mut self, data: Option<StoryboardData>) {
        self.warn_if_out_of_order(ArtifactKind::Storyboard, data.is_some());
        let present = data.is_some();
        self.persist(ArtifactKind::Storyboard, data.as_ref());
        self.storyboard = data;
        self.notify(ArtifactKind::Storyboard, present);
    }

    pub(crate) fn clear_artifact(&mut self, kind: ArtifactKind) {
        match kind {
            ArtifactKind::Script => self.update_script_data(None),
            ArtifactKind::OneLiner => self.update_one_liner_data(None),
            ArtifactKind::Character => self.update_character_data(None),
            ArtifactKind::Schedule => self.update_schedule_data(None),
            ArtifactKind::Budget => self.update_budget_data(None),
            ArtifactKind::Storyboard => self.update_storyboard_data(None),
        }
    }

    /// Clearing the script cascades through every dependent slot.
    pub(crate) fn clear_all(&mut self) {
        self.update_script_data(None);
    }

    fn cascade_clear_dependents(&mut self) {
        for kind in ArtifactKind::SCRIPT_DEPENDENTS {
            if !self.has(kind) {
                // Still remove any stale persisted entry the memory copy never saw.
                let _ = self.medium.remove(kind.storage_key());
                continue;
            }
            match kind {
                ArtifactKind::OneLiner => self.one_liner = None,
                ArtifactKind::Character => self.character = None,
                ArtifactKind::Schedule => self.schedule = None,
                ArtifactKind::Budget => self.budget = None,
                ArtifactKind::Storyboard => self.storyboard = None,
                ArtifactKind::Script => {}
            }
            if let Err(e) = self.medium.remove(kind.storage_key()) {
                eprintln!("[store] cascade remove {kind}: {e}");
            }
            self.notify(kind, false);
        }
    }

    fn persist<T: Serialize>(&self, kind: ArtifactKind, value: Option<&T>) {
        match value {
            Some(v) => match serde_json::to_string(v) {
                Ok(text) => {
                    if let Err(e) = self.medium.set(kind.storage_key(), &text) {
                        eprintln!("[store] persist {kind}: {e}");
                    }
                }
                Err(e) => eprintln!("[store] serialize {kind}: {e}"),
            },
            None => {
                if let Err(e) = self.medium.remove(kind.storage_key()) {
                    eprintln!("[store] remove {kind}: {e}");
                }
            }
        }
    }

    /// Dependency order is advisory: out-of-order writes are accepted and
    /// logged, never rejected.
    fn warn_if_out_of_order(&self, kind: ArtifactKind, writing_value: bool) {
        if !writing_value {
            return;
        }
        let missing = match kind {
            ArtifactKind::OneLiner | ArtifactKind::Character | ArtifactKind::Storyboard
                if self.script.is_none() =>
            {
                Some(ArtifactKind::Script)
            }
            ArtifactKind::Schedule if self.character.is_none() => Some(ArtifactKind::Character),
            ArtifactKind::Budget if self.schedule.is_none() => Some(ArtifactKind::Schedule),
            _ => None,
        };
        if let Some(upstream) = missing {
            eprintln!("[store] warning: writing {kind} while {upstream} is absent");
        }
    }

    // ── Gating ───────────────────────────────────────────────────────

    /// Fixed step table. Unknown tab names are never reachable.
    pub(crate) fn can_proceed_to_tab(&self, tab_name: &str) -> bool {
        match tab_name {
            "upload-script" => true,
            "script-analysis" => self.script.is_some(),
            "one-liner" => self.script.is_some(),
            "character-breakdown" => self.script.is_some() && self.one_liner.is_some(),
            "schedule" => self.script.is_some() && self.character.is_some(),
            "budget" => self.script.is_some() && self.schedule.is_some(),
            "storyboard" => self.script.is_some(),
            "project-overview" => self.script.is_some(),
            _ => false,
        }
    }

    // ── Notification ─────────────────────────────────────────────────

    fn notify(&mut self, kind: ArtifactKind, present: bool) {
        self.observers
            .retain(|tx| tx.send(StoreEvent { kind, present }).is_ok());
    }
}

// ── Subscription and cross-context sync ──────────────────────────────────
// Embedding surface: long-lived hosts register observers and a change bus;
// one-shot command invocations never do.
#[allow(dead_code)]
impl ProductionStore {
    pub(crate) fn subscribe(&mut self) -> Receiver<StoreEvent> {
        let (tx, rx) = std::sync::mpsc::channel();
        self.observers.push(tx);
        rx
    }

    pub(crate) fn attach_change_bus(&mut self, rx: Receiver<ExternalChange>) {
        self.external = Some(rx);
    }

    /// Drain pending external change notices and re-read the affected slots
    /// from the medium. Last writer wins; no merging. Returns the number of
    /// slots refreshed.
    pub(crate) fn pump_external(&mut self) -> usize {
        let mut changed = Vec::new();
        if let Some(rx) = &self.external {
            while let Ok(notice) = rx.try_recv() {
                if let Some(kind) = ArtifactKind::from_storage_key(&notice.key) {
                    changed.push(kind);
                }
            }
        }
        for kind in &changed {
            self.refresh_slot(*kind);
        }
        changed.len()
    }

    fn refresh_slot(&mut self, kind: ArtifactKind) {
        match kind {
            ArtifactKind::Script => {
                self.script = load_slot(self.medium.as_ref(), kind);
            }
            ArtifactKind::OneLiner => {
                self.one_liner = load_slot(self.medium.as_ref(), kind);
            }
            ArtifactKind::Character => {
                self.character = load_slot(self.medium.as_ref(), kind);
            }
            ArtifactKind::Schedule => {
                self.schedule = load_slot(self.medium.as_ref(), kind);
            }
            ArtifactKind::Budget => {
                self.budget = load_slot(self.medium.as_ref(), kind);
            }
            ArtifactKind::Storyboard => {
                self.storyboard = load_slot(self.medium.as_ref(), kind);
            }
        }
        self.notify(kind, self.has(kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OneLinerScene, ShootDay};
    use std::sync::mpsc;

    fn store_with_medium() -> (ProductionStore, MemoryMedium) {
        let medium = MemoryMedium::default();
        let store = ProductionStore::new(Box::new(medium.clone()));
        (store, medium)
    }

    fn sample_script() -> ScriptData {
        let mut script = ScriptData::default();
        script.parsed_data.scenes.push(crate::types::Scene {
            scene_number: 1,
            main_characters: vec!["ANA".to_string()],
            ..Default::default()
        });
        script
    }

    fn sample_one_liner() -> OneLinerData {
        OneLinerData {
            scenes: vec![OneLinerScene {
                scene_number: 1,
                one_liner: "Ana finds the door".to_string(),
                ..Default::default()
            }],
        }
    }

    fn fill_all(store: &mut ProductionStore) {
        store.update_script_data(Some(sample_script()));
        store.update_one_liner_data(Some(sample_one_liner()));
        store.update_character_data(Some(CharacterData::default()));
        store.update_schedule_data(Some(ScheduleData {
            schedule: vec![ShootDay::default()],
            summary: None,
        }));
        store.update_budget_data(Some(BudgetData::default()));
        store.update_storyboard_data(Some(StoryboardData::default()));
    }

    #[test]
    fn test_gating_table() {
        let (mut store, _) = store_with_medium();
        assert!(store.can_proceed_to_tab("upload-script"));
        assert!(!store.can_proceed_to_tab("script-analysis"));
        assert!(!store.can_proceed_to_tab("character-breakdown"));

        store.update_script_data(Some(sample_script()));
        assert!(store.can_proceed_to_tab("script-analysis"));
        assert!(store.can_proceed_to_tab("one-liner"));
        assert!(store.can_proceed_to_tab("storyboard"));
        assert!(store.can_proceed_to_tab("project-overview"));
        assert!(!store.can_proceed_to_tab("character-breakdown"));
        assert!(!store.can_proceed_to_tab("schedule"));
        assert!(!store.can_proceed_to_tab("budget"));

        store.update_one_liner_data(Some(sample_one_liner()));
        assert!(store.can_proceed_to_tab("character-breakdown"));

        store.update_character_data(Some(CharacterData::default()));
        assert!(store.can_proceed_to_tab("schedule"));

        store.update_schedule_data(Some(ScheduleData::default()));
        assert!(store.can_proceed_to_tab("budget"));

        assert!(!store.can_proceed_to_tab("no-such-tab"));
        assert!(!store.can_proceed_to_tab(""));
    }

    #[test]
    fn test_gating_flips_when_upstream_cleared() {
        let (mut store, _) = store_with_medium();
        fill_all(&mut store);
        assert!(store.can_proceed_to_tab("budget"));

        // Clearing only the schedule flips budget, leaves storyboard alone.
        store.update_schedule_data(None);
        assert!(!store.can_proceed_to_tab("budget"));
        assert!(store.can_proceed_to_tab("storyboard"));
    }

    #[test]
    fn test_cascade_clear_completeness() {
        let (mut store, medium) = store_with_medium();
        fill_all(&mut store);
        for kind in ArtifactKind::ALL {
            assert!(store.has(kind), "{kind} should be set");
            assert!(medium.get(kind.storage_key()).is_some());
        }

        store.update_script_data(None);
        for kind in ArtifactKind::ALL {
            assert!(!store.has(kind), "{kind} should be cleared");
            assert!(
                medium.get(kind.storage_key()).is_none(),
                "{kind} key should be removed"
            );
        }
    }

    #[test]
    fn test_cascade_removes_stale_persisted_entries() {
        let (mut store, medium) = store_with_medium();
        store.update_script_data(Some(sample_script()));
        // Entry written by another context that this store never loaded.
        medium.set("BUDGET_DATA", "{\"budget\":{\"categories\":{},\"total\":1}}").unwrap();

        store.update_script_data(None);
        assert!(medium.get("BUDGET_DATA").is_none());
    }

    #[test]
    fn test_round_trip_idempotence() {
        let (mut store, medium) = store_with_medium();
        fill_all(&mut store);

        // A fresh store over the same medium sees deep-equal values.
        let reloaded = ProductionStore::new(Box::new(medium));
        assert_eq!(reloaded.script_data(), store.script_data());
        assert_eq!(reloaded.one_liner_data(), store.one_liner_data());
        assert_eq!(reloaded.character_data(), store.character_data());
        assert_eq!(reloaded.schedule_data(), store.schedule_data());
        assert_eq!(reloaded.budget_data(), store.budget_data());
        assert_eq!(reloaded.storyboard_data(), store.storyboard_data());
    }

    #[test]
    fn test_malformed_entry_loads_as_absent() {
        let medium = MemoryMedium::default();
        medium.set("SCRIPT_DATA", "definitely not json").unwrap();
        medium.set("BUDGET_DATA", "[1, 2").unwrap();

        let store = ProductionStore::new(Box::new(medium));
        assert!(store.script_data().is_none());
        assert!(store.budget_data().is_none());
    }

    #[test]
    fn test_observers_see_updates_and_cascade() {
        let (mut store, _) = store_with_medium();
        let rx = store.subscribe();
        fill_all(&mut store);
        store.update_script_data(None);

        let events: Vec<StoreEvent> = rx.try_iter().collect();
        // Six writes, then the script clear plus five cascade clears.
        assert_eq!(events.len(), 12);
        assert_eq!(
            events[6],
            StoreEvent { kind: ArtifactKind::Script, present: false }
        );
        assert!(events[7..].iter().all(|e| !e.present));
    }

    #[test]
    fn test_external_change_last_writer_wins() {
        let medium = MemoryMedium::default();
        let mut store = ProductionStore::new(Box::new(medium.clone()));
        let (tx, rx) = mpsc::channel();
        store.attach_change_bus(rx);
        store.update_script_data(Some(sample_script()));

        // Another context replaces the script and clears the budget key.
        let mut other = sample_script();
        other.parsed_data.scenes[0].scene_number = 42;
        medium
            .set("SCRIPT_DATA", &serde_json::to_string(&other).unwrap())
            .unwrap();
        tx.send(ExternalChange { key: "SCRIPT_DATA".to_string() }).unwrap();
        tx.send(ExternalChange { key: "UNRELATED".to_string() }).unwrap();

        assert_eq!(store.pump_external(), 1);
        assert_eq!(store.script_data().unwrap().parsed_data.scenes[0].scene_number, 42);
    }

    #[test]
    fn test_external_removal_clears_slot() {
        let medium = MemoryMedium::default();
        let mut store = ProductionStore::new(Box::new(medium.clone()));
        let (tx, rx) = mpsc::channel();
        store.attach_change_bus(rx);
        store.update_script_data(Some(sample_script()));

        medium.remove("SCRIPT_DATA").unwrap();
        tx.send(ExternalChange { key: "SCRIPT_DATA".to_string() }).unwrap();
        store.pump_external();
        assert!(store.script_data().is_none());
    }
}
