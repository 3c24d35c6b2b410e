//! Typed client for the SD1 backend endpoints.
//!
//! Responses arrive in three shapes: a bare payload, `{data}` or
//! `{success, data}`. `unwrap_envelope` is the single place that sniffs the
//! shape; every call goes through it.

use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::proxy::ProxyConfig;
use crate::types::{
    BudgetData, CharacterData, OneLinerData, ScheduleData, ScriptData, StoryboardData,
};
use crate::util::env_u32;

const RETRY_BASE_MS: u64 = 500;
const RETRY_MAX_MS: u64 = 4_000;

// ── Envelope ─────────────────────────────────────────────────────────────

pub(crate) fn unwrap_envelope(value: Value) -> Result<Value, String> {
    let Some(obj) = value.as_object() else {
        return Ok(value);
    };
    if let Some(success) = obj.get("success").and_then(|v| v.as_bool()) {
        if !success {
            let message = obj
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("API returned error status");
            return Err(message.to_string());
        }
        return Ok(obj.get("data").cloned().unwrap_or(value));
    }
    if let Some(data) = obj.get("data") {
        return Ok(data.clone());
    }
    Ok(value)
}

fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, String> {
    serde_json::from_value(value).map_err(|e| format!("unexpected {what} payload: {e}"))
}

fn retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

// ── Client ───────────────────────────────────────────────────────────────

pub(crate) struct BackendClient {
    base_url: String,
    agent: ureq::Agent,
    timeout: Duration,
    retries: u32,
}

impl BackendClient {
    pub(crate) fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = ProxyConfig::from_env()?;
        let retries = env_u32("BACKEND_RETRIES", 2)?;
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(config.timeout)
            .timeout_read(config.timeout)
            .timeout_write(config.timeout)
            .build();
        Ok(BackendClient {
            base_url: config.base_url,
            agent,
            timeout: config.timeout,
            retries,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn post_json(&self, path: &str, payload: &Value) -> Result<Value, String> {
        let url = self.endpoint(path);
        let mut last_err = String::new();
        for attempt in 0..=self.retries {
            if attempt > 0 {
                let delay = (RETRY_BASE_MS << (attempt - 1)).min(RETRY_MAX_MS);
                std::thread::sleep(Duration::from_millis(delay));
            }
            let response = self
                .agent
                .post(&url)
                .set("content-type", "application/json")
                .send_json(payload.clone());
            match response {
                Ok(resp) => {
                    let body = resp
                        .into_string()
                        .map_err(|e| format!("read response from {path}: {e}"))?;
                    return serde_json::from_str(&body)
                        .map_err(|e| format!("non-JSON response from {path}: {e}"));
                }
                Err(ureq::Error::Status(code, resp)) => {
                    let text = resp.into_string().unwrap_or_default();
                    last_err = format!("{path} returned {code}: {text}");
                    if !retryable_status(code) {
                        return Err(last_err);
                    }
                }
                Err(ureq::Error::Transport(err)) => {
                    last_err = format!("{path} transport error: {err}");
                }
            }
        }
        Err(last_err)
    }

    // ── Script intake ────────────────────────────────────────────────

    pub(crate) fn upload_script(
        &self,
        file: &Path,
        validation_level: &str,
    ) -> Result<ScriptData, String> {
        let bytes = std::fs::read(file).map_err(|e| format!("read {}: {e}", file.display()))?;
        let filename = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "script.txt".to_string());

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| format!("http client: {e}"))?;
        let form = reqwest::blocking::multipart::Form::new()
            .part(
                "file",
                reqwest::blocking::multipart::Part::bytes(bytes).file_name(filename),
            )
            .text("validation_level", validation_level.to_string());

        let response = client
            .post(self.endpoint("/api/script/upload"))
            .multipart(form)
            .send()
            .map_err(|e| format!("upload failed: {e}"))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|e| format!("read upload response: {e}"))?;
        if status >= 300 {
            return Err(format!("/api/script/upload returned {status}: {text}"));
        }
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| format!("non-JSON response from /api/script/upload: {e}"))?;
        decode(unwrap_envelope(value)?, "script")
    }

    pub(crate) fn analyze_text(
        &self,
        script: &str,
        validation_level: &str,
    ) -> Result<ScriptData, String> {
        let payload = serde_json::json!({
            "script": script,
            "validation_level": validation_level,
        });
        let value = self.post_json("/api/script/text", &payload)?;
        decode(unwrap_envelope(value)?, "script")
    }

    // ── Downstream artifacts ─────────────────────────────────────────

    pub(crate) fn generate_one_liner(&self, script: &ScriptData) -> Result<OneLinerData, String> {
        let payload = serde_json::to_value(script).map_err(|e| format!("encode script: {e}"))?;
        let value = self.post_json("/api/one-liner", &payload)?;
        decode(unwrap_envelope(value)?, "one-liner")
    }

    pub(crate) fn generate_characters(&self, script: &ScriptData) -> Result<CharacterData, String> {
        let payload = serde_json::json!({ "script_data": script });
        let value = self.post_json("/api/characters", &payload)?;
        decode(unwrap_envelope(value)?, "characters")
    }

    pub(crate) fn generate_schedule(
        &self,
        script: &ScriptData,
        characters: &CharacterData,
        start_date: &str,
        location_constraints: &Value,
        schedule_constraints: &Value,
    ) -> Result<ScheduleData, String> {
        let payload = serde_json::json!({
            "script_results": script,
            "character_results": characters,
            "start_date": start_date,
            "location_constraints": location_constraints,
            "schedule_constraints": schedule_constraints,
        });
        let value = self.post_json("/api/schedule", &payload)?;
        decode(unwrap_envelope(value)?, "schedule")
    }

    pub(crate) fn generate_budget(
        &self,
        script: &ScriptData,
        characters: &CharacterData,
        schedule: &ScheduleData,
        budget_constraints: &Value,
    ) -> Result<BudgetData, String> {
        let payload = serde_json::json!({
            "production_data": {
                "script_results": script,
                "character_results": characters,
                "schedule_results": schedule,
            },
            "budget_constraints": budget_constraints,
        });
        let value = self.post_json("/api/budget", &payload)?;
        decode(unwrap_envelope(value)?, "budget")
    }

    pub(crate) fn generate_storyboards(
        &self,
        script: &ScriptData,
        shot_settings: &Value,
    ) -> Result<StoryboardData, String> {
        let payload = serde_json::json!({
            "script_results": script,
            "shot_settings": shot_settings,
        });
        let value = self.post_json("/api/storyboard/batch", &payload)?;
        decode(unwrap_envelope(value)?, "storyboard")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_bare_payload() {
        let value = serde_json::json!({"scenes": [{"scene_number": 1}]});
        assert_eq!(unwrap_envelope(value.clone()).unwrap(), value);
    }

    #[test]
    fn test_unwrap_data_wrapper() {
        let value = serde_json::json!({"data": {"scenes": []}});
        assert_eq!(unwrap_envelope(value).unwrap(), serde_json::json!({"scenes": []}));
    }

    #[test]
    fn test_unwrap_success_wrapper() {
        let value = serde_json::json!({"success": true, "data": {"budget": {"total": 0}}});
        assert_eq!(
            unwrap_envelope(value).unwrap(),
            serde_json::json!({"budget": {"total": 0}})
        );
    }

    #[test]
    fn test_unwrap_success_without_data_keeps_payload() {
        let value = serde_json::json!({"success": true, "scenes": []});
        assert_eq!(unwrap_envelope(value.clone()).unwrap(), value);
    }

    #[test]
    fn test_unwrap_failure_carries_message() {
        let value = serde_json::json!({"success": false, "error": "parse failed"});
        assert_eq!(unwrap_envelope(value).unwrap_err(), "parse failed");

        let bare_failure = serde_json::json!({"success": false});
        assert_eq!(
            unwrap_envelope(bare_failure).unwrap_err(),
            "API returned error status"
        );
    }

    #[test]
    fn test_unwrap_non_object_passthrough() {
        let value = serde_json::json!([1, 2, 3]);
        assert_eq!(unwrap_envelope(value.clone()).unwrap(), value);
    }

    #[test]
    fn test_decode_one_liner_from_envelope() {
        let value = serde_json::json!({
            "success": true,
            "data": {"scenes": [{"scene_number": 2, "one_liner": "Chase on the bridge"}]}
        });
        let data: OneLinerData = decode(unwrap_envelope(value).unwrap(), "one-liner").unwrap();
        assert_eq!(data.scenes.len(), 1);
        assert_eq!(data.scenes[0].scene_number, 2);
        assert_eq!(data.scenes[0].one_liner, "Chase on the bridge");
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        let value = serde_json::json!({"scenes": "not a list"});
        assert!(decode::<OneLinerData>(value, "one-liner").is_err());
    }
}
