//! Payment-provider adapter. Webhook events are checked for signature
//! material, deduplicated, recorded, and logged; the handlers themselves are
//! pass-throughs. Cryptographic signature verification belongs to the
//! provider SDK.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use serde_json::Value;

use crate::auth::DEFAULT_ROLE;
use crate::roles::{CachedUser, RoleInfo};
use crate::store_db::GatewayDb;
use crate::util::{blake3_hash, env_optional, env_required};

const CUSTOMER_LOOKUP_TIMEOUT_MS: u64 = 5_000;

pub(crate) const RELEVANT_EVENTS: [&str; 3] = [
    "checkout.session.completed",
    "customer.subscription.updated",
    "customer.subscription.deleted",
];

// ── Configuration ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub(crate) struct BillingConfig {
    #[allow(dead_code)]
    pub(crate) secret_key: String,
    pub(crate) webhook_secret: Option<String>,
    pub(crate) payment_link_monthly: Option<String>,
    pub(crate) payment_link_yearly: Option<String>,
}

impl BillingConfig {
    /// Fail-fast: the payment client cannot exist without its secret key.
    pub(crate) fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(BillingConfig {
            secret_key: env_required("STRIPE_SECRET_KEY")?,
            webhook_secret: env_optional("STRIPE_WEBHOOK_SECRET"),
            payment_link_monthly: env_optional("STRIPE_PAYMENT_LINK_MONTHLY"),
            payment_link_yearly: env_optional("STRIPE_PAYMENT_LINK_YEARLY"),
        })
    }

    pub(crate) fn payment_link(&self, plan: &str) -> Option<&str> {
        match plan {
            "monthly" => self.payment_link_monthly.as_deref(),
            "yearly" => self.payment_link_yearly.as_deref(),
            _ => None,
        }
    }
}

// ── Webhook intake ───────────────────────────────────────────────────────

pub(crate) fn handle_webhook(
    db: &GatewayDb,
    config: &BillingConfig,
    body: &[u8],
    signature: Option<&str>,
) -> (u16, Value) {
    if signature.map(|s| s.trim().is_empty()).unwrap_or(true) || config.webhook_secret.is_none() {
        eprintln!("[billing] webhook rejected: secret or signature missing");
        return (400, serde_json::json!({"error": "Webhook secret or signature missing"}));
    }

    let event: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("[billing] webhook rejected: {e}");
            return (400, serde_json::json!({"error": format!("Malformed event: {e}")}));
        }
    };
    let Some(event_type) = event.get("type").and_then(|v| v.as_str()) else {
        return (400, serde_json::json!({"error": "Event has no type"}));
    };

    let dedup_key = event
        .get("id")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| blake3_hash(body).to_hex().to_string());
    match db.webhook_record(&dedup_key, event_type) {
        Ok(true) => {}
        Ok(false) => {
            eprintln!("[billing] duplicate delivery of {dedup_key}, ignoring");
            return (200, serde_json::json!({"received": true}));
        }
        Err(e) => eprintln!("[billing] failed to record event: {e}"),
    }

    if RELEVANT_EVENTS.contains(&event_type) {
        let handled = match event_type {
            "customer.subscription.updated" | "customer.subscription.deleted" => {
                handle_subscription_change(&event)
            }
            "checkout.session.completed" => handle_checkout_session(&event),
            _ => Err("Unhandled relevant event!".to_string()),
        };
        if let Err(e) = handled {
            eprintln!("[billing] webhook handler failed for {event_type}: {e}");
            return (
                400,
                serde_json::json!({"error": "Webhook handler failed. View your function logs."}),
            );
        }
    }

    (200, serde_json::json!({"received": true}))
}

fn handle_subscription_change(event: &Value) -> Result<(), String> {
    let subscription = event
        .get("data")
        .and_then(|d| d.get("object"))
        .ok_or("event has no data object")?;
    let customer = subscription
        .get("customer")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    eprintln!("[billing] subscription change for customer {customer} (no-op)");
    Ok(())
}

fn handle_checkout_session(event: &Value) -> Result<(), String> {
    let session = event
        .get("data")
        .and_then(|d| d.get("object"))
        .ok_or("event has no data object")?;
    let customer = session
        .get("customer")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    eprintln!("[billing] checkout completed for customer {customer} (no-op)");
    Ok(())
}

// ── Customer lookup ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub(crate) struct CustomerRecord {
    pub(crate) user_id: String,
    pub(crate) membership: String,
    pub(crate) role: String,
    pub(crate) permissions: Vec<String>,
    pub(crate) project_access: Vec<String>,
    pub(crate) stripe_customer_id: Option<String>,
    pub(crate) stripe_subscription_id: Option<String>,
}

impl CustomerRecord {
    /// Fallback record returned when the lookup times out or fails.
    pub(crate) fn default_for(user_id: &str) -> Self {
        CustomerRecord {
            user_id: user_id.to_string(),
            membership: "free".to_string(),
            role: DEFAULT_ROLE.to_string(),
            permissions: Vec::new(),
            project_access: Vec::new(),
            stripe_customer_id: None,
            stripe_subscription_id: None,
        }
    }
}

/// Customer lookup raced against a fixed 5-second timer. The query runs on
/// its own connection so a wedged database cannot block the caller past the
/// deadline.
pub(crate) fn get_customer_by_user_id(db_path: &Path, user_id: &str) -> CustomerRecord {
    let (tx, rx) = mpsc::channel();
    let path: PathBuf = db_path.to_path_buf();
    let id = user_id.to_string();
    std::thread::spawn(move || {
        let record = query_customer(&path, &id);
        let _ = tx.send(record);
    });

    match rx.recv_timeout(Duration::from_millis(CUSTOMER_LOOKUP_TIMEOUT_MS)) {
        Ok(Some(record)) => record,
        Ok(None) => CustomerRecord::default_for(user_id),
        Err(_) => {
            eprintln!("[billing] customer lookup timed out for {user_id}");
            CustomerRecord::default_for(user_id)
        }
    }
}

fn query_customer(db_path: &Path, user_id: &str) -> Option<CustomerRecord> {
    let db = match GatewayDb::open(db_path) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("[billing] customer lookup failed: {e}");
            return None;
        }
    };
    let user = db.user_get(user_id)?;
    let info = RoleInfo::from_source(&CachedUser { user: &user });
    Some(CustomerRecord {
        user_id: user.id.clone(),
        membership: user.membership.clone(),
        role: info
            .role
            .map(|r| r.as_str().to_string())
            .unwrap_or_else(|| DEFAULT_ROLE.to_string()),
        permissions: info.permissions,
        project_access: info.projects,
        stripe_customer_id: user.stripe_customer_id.clone(),
        stripe_subscription_id: user.stripe_subscription_id.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_db_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("callsheet_test");
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(format!("test_{}_{name}.sqlite", std::process::id()))
    }

    fn config() -> BillingConfig {
        BillingConfig {
            secret_key: "sk_test_x".to_string(),
            webhook_secret: Some("whsec_x".to_string()),
            payment_link_monthly: Some("plink_m".to_string()),
            payment_link_yearly: None,
        }
    }

    fn open_db(name: &str) -> (GatewayDb, PathBuf) {
        let path = temp_db_path(name);
        let _ = std::fs::remove_file(&path);
        (GatewayDb::open_or_create(&path).unwrap(), path)
    }

    #[test]
    fn test_webhook_requires_signature_and_secret() {
        let (db, path) = open_db("wh_sig");
        let body = br#"{"id": "evt_1", "type": "checkout.session.completed", "data": {"object": {}}}"#;

        let (status, _) = handle_webhook(&db, &config(), body, None);
        assert_eq!(status, 400);

        let mut no_secret = config();
        no_secret.webhook_secret = None;
        let (status, _) = handle_webhook(&db, &no_secret, body, Some("t=1,v1=abc"));
        assert_eq!(status, 400);

        let (status, value) = handle_webhook(&db, &config(), body, Some("t=1,v1=abc"));
        assert_eq!(status, 200);
        assert_eq!(value["received"], true);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_webhook_duplicate_delivery_acknowledged_once() {
        let (db, path) = open_db("wh_dup");
        let body = br#"{"id": "evt_2", "type": "customer.subscription.updated", "data": {"object": {"customer": "cus_1"}}}"#;

        let (status, _) = handle_webhook(&db, &config(), body, Some("sig"));
        assert_eq!(status, 200);
        let (status, value) = handle_webhook(&db, &config(), body, Some("sig"));
        assert_eq!(status, 200);
        assert_eq!(value["received"], true);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_webhook_irrelevant_event_still_received() {
        let (db, path) = open_db("wh_other");
        let body = br#"{"id": "evt_3", "type": "invoice.paid", "data": {"object": {}}}"#;
        let (status, value) = handle_webhook(&db, &config(), body, Some("sig"));
        assert_eq!(status, 200);
        assert_eq!(value["received"], true);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_webhook_malformed_body() {
        let (db, path) = open_db("wh_bad");
        let (status, _) = handle_webhook(&db, &config(), b"not json", Some("sig"));
        assert_eq!(status, 400);
        let (status, _) = handle_webhook(&db, &config(), b"{\"no_type\": 1}", Some("sig"));
        assert_eq!(status, 400);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_relevant_handler_missing_object_fails() {
        let (db, path) = open_db("wh_noobj");
        let body = br#"{"id": "evt_4", "type": "checkout.session.completed"}"#;
        let (status, _) = handle_webhook(&db, &config(), body, Some("sig"));
        assert_eq!(status, 400);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_customer_lookup_falls_back_to_default() {
        let missing = temp_db_path("cust_missing_db");
        let _ = std::fs::remove_file(&missing);
        let record = get_customer_by_user_id(&missing, "user_9");
        assert_eq!(record.user_id, "user_9");
        assert_eq!(record.membership, "free");
        assert_eq!(record.role, "team_member");
        assert!(record.permissions.is_empty());
    }

    #[test]
    fn test_customer_lookup_reads_user_row() {
        let (db, path) = open_db("cust_row");
        db.user_upsert(
            "user_5",
            "p@example.com",
            &serde_json::json!({"role": "producer", "projects": ["prj_1"]}),
        )
        .unwrap();
        db.user_set_membership("user_5", "pro").unwrap();
        drop(db);

        let record = get_customer_by_user_id(&path, "user_5");
        assert_eq!(record.membership, "pro");
        assert_eq!(record.role, "producer");
        assert!(record.permissions.contains(&"projects:create".to_string()));
        assert_eq!(record.project_access, vec!["prj_1"]);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_payment_links() {
        let c = config();
        assert_eq!(c.payment_link("monthly"), Some("plink_m"));
        assert_eq!(c.payment_link("yearly"), None);
        assert_eq!(c.payment_link("weekly"), None);
    }
}
