//! Environment and sender configuration loading.
//!
//! Everything here fails before any contact is touched: a missing API token
//! or an empty sender list aborts the run up front rather than partway
//! through a page.
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

use crate::senders::Sender;

const API_TOKEN_VAR: &str = "HUBSPOT_API_KEY";

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SenderFile {
    senders: Vec<SenderEntry>,
}

#[derive(Deserialize)]
struct SenderEntry {
    email: String,
    #[serde(rename = "userId")]
    user_id: String,
}

/// Read the HubSpot API token from the environment.
pub(crate) fn api_token() -> Result<String> {
    let token =
        env::var(API_TOKEN_VAR).with_context(|| format!("read {API_TOKEN_VAR} from env"))?;
    if token.trim().is_empty() {
        return Err(anyhow!("{API_TOKEN_VAR} is set but empty"));
    }
    Ok(token)
}

/// Load sender identities from the configuration JSON.
///
/// An absent file or an empty `senders` array is a configuration error; the
/// enrollment job cannot run without at least one authorized sender.
pub(crate) fn load_senders(path: &Path) -> Result<Vec<Sender>> {
    let bytes = fs::read(path)
        .with_context(|| format!("read sender configuration {}", path.display()))?;
    let file: SenderFile = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse sender configuration {}", path.display()))?;
    if file.senders.is_empty() {
        return Err(anyhow!(
            "no senders configured in {}",
            path.display()
        ));
    }
    Ok(file
        .senders
        .into_iter()
        .map(|entry| Sender {
            email: entry.email,
            user_id: entry.user_id,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_senders(dir: &Path, contents: &str) -> std::path::PathBuf {
        let path = dir.join("sender_emails.json");
        std::fs::write(&path, contents.as_bytes()).expect("write sender config");
        path
    }

    #[test]
    fn load_senders_reads_email_and_user_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_senders(
            dir.path(),
            r#"{"senders": [{"email": "a@example.com", "userId": "101"},
                            {"email": "b@example.com", "userId": "102"}]}"#,
        );
        let senders = load_senders(&path).expect("load senders");
        assert_eq!(senders.len(), 2);
        assert_eq!(senders[0].email, "a@example.com");
        assert_eq!(senders[1].user_id, "102");
    }

    #[test]
    fn load_senders_rejects_missing_file_and_empty_list() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(load_senders(&dir.path().join("absent.json")).is_err());

        let path = write_senders(dir.path(), r#"{"senders": []}"#);
        let err = load_senders(&path).expect_err("empty sender list");
        assert!(err.to_string().contains("no senders configured"));
    }
}
