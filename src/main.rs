mod auth;
mod backend;
mod billing;
mod cli;
mod proxy;
mod roles;
mod server;
mod store;
mod store_db;
mod types;
mod util;

use std::path::{Path, PathBuf};

use clap::Parser;
use serde_json::Value;

use crate::auth::{Identity, issue_token};
use crate::backend::BackendClient;
use crate::billing::{BillingConfig, get_customer_by_user_id};
use crate::cli::{Cli, Command};
use crate::roles::{AccessGate, GateDecision, PermissionMode, Role, RoleInfo, RoleResolution};
use crate::store::ProductionStore;
use crate::store_db::GatewayDb;
use crate::types::ArtifactKind;
use crate::util::env_optional;

fn resolve_db_path(cli: Option<PathBuf>) -> PathBuf {
    if let Some(path) = cli {
        return path;
    }
    if let Some(value) = env_optional("CALLSHEET_DB") {
        return PathBuf::from(value);
    }
    PathBuf::from("callsheet.sqlite")
}

fn open_store(db_path: &Path) -> Result<ProductionStore, Box<dyn std::error::Error>> {
    let db = GatewayDb::open(db_path)?;
    Ok(ProductionStore::new(Box::new(db)))
}

fn read_constraints(path: Option<PathBuf>) -> Result<Value, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| format!("read {}: {e}", path.display()))?;
            Ok(serde_json::from_str(&text)
                .map_err(|e| format!("parse {}: {e}", path.display()))?)
        }
        None => Ok(serde_json::json!({})),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Init { db } => {
            let db_path = resolve_db_path(db);
            let db = GatewayDb::open_or_create(&db_path)?;
            if let Some(seed_id) = env_optional("SEED_USER_ID") {
                db.user_upsert(&seed_id, "", &serde_json::json!({"role": "admin"}))?;
                println!("Seeded admin user {seed_id}");
            }
            println!("Created {}", db_path.display());
            Ok(())
        }

        Command::Serve { db, bind, port } => {
            let db_path = resolve_db_path(db);
            server::run_server(&bind, port, &db_path)
        }

        Command::Analyze { db, file, text, validation_level } => {
            let db_path = resolve_db_path(db);
            let mut store = open_store(&db_path)?;
            let client = BackendClient::from_env()?;

            let result = match (&file, &text) {
                (Some(path), None) => client.upload_script(path, &validation_level),
                (None, Some(script)) => client.analyze_text(script, &validation_level),
                _ => return Err("provide exactly one of --file or --text".into()),
            };

            match result {
                Ok(script) => {
                    println!(
                        "Stored script analysis: {} scenes, {} characters",
                        script.parsed_data.scenes.len(),
                        script.characters.len()
                    );
                    store.update_script_data(Some(script));
                    Ok(())
                }
                Err(e) => {
                    eprintln!("[analyze] backend failed: {e}");
                    if store.script_data().is_some() {
                        println!("Keeping previously stored script analysis");
                        Ok(())
                    } else {
                        Err(e.into())
                    }
                }
            }
        }

        Command::Generate { artifact, db, start_date, constraints } => {
            let db_path = resolve_db_path(db);
            let kind = ArtifactKind::parse(&artifact)
                .ok_or_else(|| format!("unknown artifact: {artifact}"))?;
            if kind == ArtifactKind::Script {
                return Err("the script artifact comes from `callsheet analyze`".into());
            }
            let mut store = open_store(&db_path)?;
            cmd_generate(&mut store, kind, start_date, constraints)
        }

        Command::Show { artifact, db, json } => {
            let db_path = resolve_db_path(db);
            let store = open_store(&db_path)?;
            match artifact {
                Some(name) => {
                    let kind = ArtifactKind::parse(&name)
                        .ok_or_else(|| format!("unknown artifact: {name}"))?;
                    match store.artifact_json(kind) {
                        Some(value) if json => {
                            println!("{}", serde_json::to_string_pretty(&value)?)
                        }
                        Some(_) => println!("{}", summarize(&store, kind)),
                        None => println!("{kind}: (not set)"),
                    }
                }
                None => {
                    for kind in ArtifactKind::ALL {
                        if store.has(kind) {
                            println!("{}", summarize(&store, kind));
                        } else {
                            println!("{kind}: (not set)");
                        }
                    }
                }
            }
            Ok(())
        }

        Command::Clear { artifact, db } => {
            let db_path = resolve_db_path(db);
            let mut store = open_store(&db_path)?;
            match artifact {
                Some(name) => {
                    let kind = ArtifactKind::parse(&name)
                        .ok_or_else(|| format!("unknown artifact: {name}"))?;
                    store.clear_artifact(kind);
                    if kind == ArtifactKind::Script {
                        println!("Cleared script and all dependent artifacts");
                    } else {
                        println!("Cleared {kind}");
                    }
                }
                None => {
                    store.clear_all();
                    println!("Cleared all stored artifacts");
                }
            }
            Ok(())
        }

        Command::Gate { tab, db } => {
            let db_path = resolve_db_path(db);
            let store = open_store(&db_path)?;
            if store.can_proceed_to_tab(&tab) {
                println!("{tab}: allowed");
            } else {
                println!("{tab}: blocked");
            }
            Ok(())
        }

        Command::Access { id, roles, permissions, mode, project, db } => {
            let db_path = resolve_db_path(db);
            let db = GatewayDb::open(&db_path)?;
            let mode = PermissionMode::parse(&mode)
                .ok_or_else(|| format!("unknown permission mode: {mode}"))?;
            let allowed_roles = roles
                .iter()
                .map(|name| Role::parse(name).ok_or_else(|| format!("unknown role: {name}")))
                .collect::<Result<Vec<Role>, String>>()?;

            // A missing user resolves to no role, not an error.
            let info = match db.user_get(&id) {
                Some(user) => Identity::from_user(&user).info,
                None => RoleInfo::default(),
            };
            let gate = AccessGate {
                allowed_roles,
                required_permissions: permissions,
                mode,
            };
            let decision = gate.decide(&RoleResolution::Ready(info.clone()));
            let role = info
                .role
                .map(|r| r.as_str().to_string())
                .unwrap_or_else(|| "(none)".to_string());
            match decision {
                GateDecision::Allow => println!("allow (role: {role})"),
                GateDecision::Deny => println!("deny (role: {role})"),
                GateDecision::Loading => println!("loading"),
            }
            if let Some(project_id) = project {
                if info.has_project_access(&project_id) {
                    println!("project {project_id}: accessible");
                } else {
                    println!("project {project_id}: no access");
                }
            }
            Ok(())
        }

        Command::UserAdd { id, email, role, db } => {
            let db_path = resolve_db_path(db);
            let db = GatewayDb::open(&db_path)?;
            let mut metadata = serde_json::Map::new();
            if let Some(name) = role {
                let role = Role::parse(&name).ok_or_else(|| format!("unknown role: {name}"))?;
                metadata.insert("role".to_string(), Value::String(role.as_str().to_string()));
            }
            db.user_upsert(&id, &email, &Value::Object(metadata))?;
            println!("User {id} saved");
            Ok(())
        }

        Command::UserRole { id, role, db } => {
            let db_path = resolve_db_path(db);
            let db = GatewayDb::open(&db_path)?;
            let role = Role::parse(&role).ok_or_else(|| format!("unknown role: {role}"))?;
            let metadata = serde_json::json!({
                "role": role.as_str(),
                "permissions": role.permissions(),
            });
            if !db.user_set_provider_metadata(&id, &metadata)? {
                return Err(format!("unknown user: {id}").into());
            }
            println!("Assigned {role} to {id}");
            Ok(())
        }

        Command::UserToken { id, db } => {
            let db_path = resolve_db_path(db);
            let db = GatewayDb::open(&db_path)?;
            let token = issue_token(&db, &id)?;
            println!("{token}");
            Ok(())
        }

        Command::UserShow { id, db } => {
            let db_path = resolve_db_path(db);
            let record = get_customer_by_user_id(&db_path, &id);
            println!("user:         {}", record.user_id);
            println!("membership:   {}", record.membership);
            println!("role:         {}", record.role);
            println!("permissions:  {}", record.permissions.join(", "));
            println!("projects:     {}", record.project_access.join(", "));
            if let Some(customer) = &record.stripe_customer_id {
                println!("customer:     {customer}");
            }
            if let Some(subscription) = &record.stripe_subscription_id {
                println!("subscription: {subscription}");
            }
            if record.membership == "free" {
                if let Ok(billing) = BillingConfig::from_env() {
                    if let Some(link) = billing.payment_link("monthly") {
                        println!("upgrade:      {link}");
                    }
                }
            }
            Ok(())
        }
    }
}

/// The tab each artifact's generation step sits behind.
fn gate_tab(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::Script => "upload-script",
        ArtifactKind::OneLiner => "one-liner",
        ArtifactKind::Character => "character-breakdown",
        ArtifactKind::Schedule => "schedule",
        ArtifactKind::Budget => "budget",
        ArtifactKind::Storyboard => "storyboard",
    }
}

fn cmd_generate(
    store: &mut ProductionStore,
    kind: ArtifactKind,
    start_date: Option<String>,
    constraints: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let tab = gate_tab(kind);
    if !store.can_proceed_to_tab(tab) {
        return Err(format!("cannot generate {kind} yet: the {tab} step is blocked").into());
    }
    let client = BackendClient::from_env()?;
    let constraints = read_constraints(constraints)?;

    // The gate above guarantees the script is present.
    let Some(script) = store.script_data().cloned() else {
        return Err("no stored script analysis".into());
    };

    let result: Result<(), String> = match kind {
        ArtifactKind::OneLiner => client.generate_one_liner(&script).map(|data| {
            println!("Stored one-liners for {} scenes", data.scenes.len());
            store.update_one_liner_data(Some(data));
        }),
        ArtifactKind::Character => client.generate_characters(&script).map(|data| {
            println!("Stored breakdown for {} characters", data.characters.len());
            store.update_character_data(Some(data));
        }),
        ArtifactKind::Schedule => {
            let characters = store
                .character_data()
                .cloned()
                .ok_or("no stored character breakdown")?;
            let start_date = start_date.ok_or("--start-date is required for the schedule")?;
            client
                .generate_schedule(
                    &script,
                    &characters,
                    &start_date,
                    constraints.get("location_constraints").unwrap_or(&Value::Null),
                    constraints.get("schedule_constraints").unwrap_or(&Value::Null),
                )
                .map(|data| {
                    println!("Stored schedule with {} shoot days", data.schedule.len());
                    store.update_schedule_data(Some(data));
                })
        }
        ArtifactKind::Budget => {
            let characters = store
                .character_data()
                .cloned()
                .ok_or("no stored character breakdown")?;
            let schedule = store.schedule_data().cloned().ok_or("no stored schedule")?;
            client
                .generate_budget(&script, &characters, &schedule, &constraints)
                .map(|data| {
                    println!("Stored budget, total {:.2}", data.budget.total);
                    store.update_budget_data(Some(data));
                })
        }
        ArtifactKind::Storyboard => client.generate_storyboards(&script, &constraints).map(|data| {
            let panels: usize = data.storyboards.iter().map(|s| s.panels.len()).sum();
            println!(
                "Stored storyboards for {} scenes ({panels} panels)",
                data.storyboards.len()
            );
            store.update_storyboard_data(Some(data));
        }),
        ArtifactKind::Script => {
            return Err("the script artifact comes from `callsheet analyze`".into());
        }
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("[generate] backend failed: {e}");
            if store.has(kind) {
                println!("Keeping previously stored {kind}");
                Ok(())
            } else {
                Err(e.into())
            }
        }
    }
}

fn summarize(store: &ProductionStore, kind: ArtifactKind) -> String {
    match kind {
        ArtifactKind::Script => match store.script_data() {
            Some(script) => format!(
                "script: {} scenes, {} characters, {} conflicts",
                script.parsed_data.scenes.len(),
                script.characters.len(),
                script
                    .validation
                    .validation_report
                    .technical_validation
                    .department_conflicts
                    .len()
            ),
            None => "script: (not set)".to_string(),
        },
        ArtifactKind::OneLiner => match store.one_liner_data() {
            Some(data) => format!("one-liner: {} scenes", data.scenes.len()),
            None => "one-liner: (not set)".to_string(),
        },
        ArtifactKind::Character => match store.character_data() {
            Some(data) => format!("characters: {} profiles", data.characters.len()),
            None => "characters: (not set)".to_string(),
        },
        ArtifactKind::Schedule => match store.schedule_data() {
            Some(data) => format!("schedule: {} shoot days", data.schedule.len()),
            None => "schedule: (not set)".to_string(),
        },
        ArtifactKind::Budget => match store.budget_data() {
            Some(data) => format!(
                "budget: {} categories, total {:.2}",
                data.budget.categories.len(),
                data.budget.total
            ),
            None => "budget: (not set)".to_string(),
        },
        ArtifactKind::Storyboard => match store.storyboard_data() {
            Some(data) => {
                let panels: usize = data.storyboards.iter().map(|s| s.panels.len()).sum();
                format!("storyboard: {} scenes, {panels} panels", data.storyboards.len())
            }
            None => "storyboard: (not set)".to_string(),
        },
    }
}
