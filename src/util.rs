use std::env;
use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

use blake3::Hash;

pub(crate) fn blake3_hash(bytes: &[u8]) -> Hash {
    blake3::hash(bytes)
}

pub(crate) fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Mint an opaque session token. The raw token goes to the caller once; only
/// its digest is ever persisted.
pub(crate) fn mint_session_token(user_id: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let salt = env_optional("CALLSHEET_SESSION_SALT").unwrap_or_default();
    let seed = format!("{user_id}:{nanos}:{}:{salt}", std::process::id());
    blake3_hash(seed.as_bytes()).to_hex().to_string()
}

pub(crate) fn token_digest(token: &str) -> String {
    blake3_hash(token.trim().as_bytes()).to_hex().to_string()
}

pub(crate) fn env_required(name: &str) -> Result<String, Box<dyn std::error::Error>> {
    let value = env::var(name).unwrap_or_default();
    if value.trim().is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, format!("Missing {name}")).into());
    }
    Ok(value)
}

pub(crate) fn env_optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

pub(crate) fn env_u64(name: &str, default: u64) -> Result<u64, Box<dyn std::error::Error>> {
    match env_optional(name) {
        Some(value) => Ok(value
            .parse::<u64>()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("Invalid {name}")))?),
        None => Ok(default),
    }
}

pub(crate) fn env_u32(name: &str, default: u32) -> Result<u32, Box<dyn std::error::Error>> {
    match env_optional(name) {
        Some(value) => Ok(value
            .parse::<u32>()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("Invalid {name}")))?),
        None => Ok(default),
    }
}
