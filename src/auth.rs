// ABOUTME: Container registry credential resolution.
// ABOUTME: Parses ~/.docker/config.json and matches auth entries to images.

use crate::runtime::RegistryAuth;
use base64::Engine as _;
use serde::Deserialize;
use std::collections::HashMap;

const DEFAULT_INDEX: &str = "docker.io";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("home directory could not be determined")]
    NoHome,

    #[error("credentials file unreadable: {0}")]
    Io(#[from] std::io::Error),

    #[error("credentials file malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("no auth configured for registry")]
    NoEntry,

    #[error("auth string malformed, expected 2 parts")]
    MalformedAuth,

    #[error("no auth options provided for registry")]
    NoCredentials,
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthEntry {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    auth: String,
}

/// Resolve the registry index an image reference belongs to.
///
/// Bare names ("nginx", "library/nginx") belong to the default Docker index;
/// a first path component containing a dot, a colon, or equal to "localhost"
/// names an explicit registry.
pub fn registry_index(image: &str) -> String {
    // Strip any digest, then any tag. A colon after the last slash is a tag
    // separator, not a registry port.
    let name = image.split('@').next().unwrap_or(image);
    let name = match name.rsplit_once(':') {
        Some((before, after)) if !after.contains('/') => before,
        _ => name,
    };

    match name.split_once('/') {
        Some((first, _))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            first.to_string()
        }
        _ => DEFAULT_INDEX.to_string(),
    }
}

/// Pull the auth entry for a registry index out of a credentials file.
///
/// When the entry carries a combined base64 `auth` blob, it is split into
/// username and password.
pub fn extract_auth(config_bytes: &[u8], index: &str) -> Result<RegistryAuth, AuthError> {
    let file: CredentialsFile = serde_json::from_slice(config_bytes)?;
    let entry = file.auths.get(index).ok_or(AuthError::NoEntry)?;

    let (username, password) = if !entry.auth.is_empty() {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&entry.auth)
            .map_err(|_| AuthError::MalformedAuth)?;
        let decoded = String::from_utf8(decoded).map_err(|_| AuthError::MalformedAuth)?;
        let (user, pass) = decoded.split_once(':').ok_or(AuthError::MalformedAuth)?;
        if pass.contains(':') {
            return Err(AuthError::MalformedAuth);
        }
        (user.to_string(), pass.to_string())
    } else {
        (entry.username.clone(), entry.password.clone())
    };

    if username.is_empty() {
        return Err(AuthError::NoCredentials);
    }

    Ok(RegistryAuth {
        username,
        password,
        server: Some(index.to_string()),
    })
}

/// Resolve credentials for pulling `image` from the local engine
/// credentials file.
pub fn auth_for_image(image: &str) -> Result<RegistryAuth, AuthError> {
    let home = dirs::home_dir().ok_or(AuthError::NoHome)?;
    let data = std::fs::read(home.join(".docker/config.json"))?;
    let index = registry_index(image);
    extract_auth(&data, &index)
}
