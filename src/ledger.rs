//! Persisted per-contact enrollment outcomes.
//!
//! One JSON file per (list, sequence) pair. The ledger is rewritten in full
//! after every recorded outcome, so a killed run resumes from the last
//! contact that completed. A record with status `1` (succeeded) is final; a
//! `0` (failed) record may be overwritten by a later run.
use anyhow::{Context, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Final state of one enrollment attempt. Encoded as `1`/`0` on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecordStatus {
    Failed,
    Succeeded,
}

impl Serialize for RecordStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(match self {
            RecordStatus::Failed => 0,
            RecordStatus::Succeeded => 1,
        })
    }
}

impl<'de> Deserialize<'de> for RecordStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match u8::deserialize(deserializer)? {
            0 => Ok(RecordStatus::Failed),
            1 => Ok(RecordStatus::Succeeded),
            other => Err(D::Error::custom(format!(
                "invalid enrollment status {other}, expected 0 or 1"
            ))),
        }
    }
}

/// Outcome of the most recent enrollment attempt for one contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct EnrollmentRecord {
    pub(crate) id: String,
    pub(crate) status: RecordStatus,
    pub(crate) error: Option<String>,
    pub(crate) timestamp: u64,
}

#[derive(Serialize, Deserialize)]
struct LedgerFile {
    enrolled_contacts: Vec<EnrollmentRecord>,
    last_updated: u64,
}

/// Counts over the in-memory records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LedgerSummary {
    pub(crate) total: usize,
    pub(crate) succeeded: usize,
    pub(crate) failed: usize,
}

/// Idempotent record of per-contact outcomes for one (list, sequence) pair.
pub(crate) struct EnrollmentLedger {
    path: PathBuf,
    records: BTreeMap<String, EnrollmentRecord>,
}

impl EnrollmentLedger {
    /// Load the persisted ledger, or start empty when no file exists.
    ///
    /// A file that exists but cannot be parsed is an error: defaulting to
    /// empty would forget prior successes and double-enroll on the next run.
    pub(crate) fn load(dir: &Path, list_id: &str, sequence_id: &str) -> Result<Self> {
        let path = dir.join(format!("enrollments_{list_id}_{sequence_id}.json"));
        let records = match fs::read(&path) {
            Ok(bytes) => {
                let file: LedgerFile = serde_json::from_slice(&bytes)
                    .with_context(|| format!("parse enrollment ledger {}", path.display()))?;
                file.enrolled_contacts
                    .into_iter()
                    .map(|record| (record.id.clone(), record))
                    .collect()
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("read enrollment ledger {}", path.display()))
            }
        };
        Ok(Self { path, records })
    }

    /// Whether the engine should attempt this contact.
    ///
    /// Succeeded records are always skipped; failed records are skipped
    /// unless `ignore_failed` asks to retry them.
    pub(crate) fn should_process(&self, contact_id: &str, ignore_failed: bool) -> bool {
        match self.records.get(contact_id) {
            None => true,
            Some(record) => match record.status {
                RecordStatus::Succeeded => false,
                RecordStatus::Failed => ignore_failed,
            },
        }
    }

    /// Previously recorded outcome, for skip reporting.
    pub(crate) fn record(&self, contact_id: &str) -> Option<&EnrollmentRecord> {
        self.records.get(contact_id)
    }

    /// Upsert the outcome for a contact and synchronously rewrite the file.
    pub(crate) fn mark_outcome(
        &mut self,
        contact_id: &str,
        succeeded: bool,
        error: Option<String>,
    ) -> Result<()> {
        let timestamp = now_epoch_ms()?;
        self.records.insert(
            contact_id.to_string(),
            EnrollmentRecord {
                id: contact_id.to_string(),
                status: if succeeded {
                    RecordStatus::Succeeded
                } else {
                    RecordStatus::Failed
                },
                error,
                timestamp,
            },
        );
        self.save()
    }

    pub(crate) fn summary(&self) -> LedgerSummary {
        let succeeded = self
            .records
            .values()
            .filter(|record| record.status == RecordStatus::Succeeded)
            .count();
        LedgerSummary {
            total: self.records.len(),
            succeeded,
            failed: self.records.len() - succeeded,
        }
    }

    fn save(&self) -> Result<()> {
        let file = LedgerFile {
            enrolled_contacts: self.records.values().cloned().collect(),
            last_updated: now_epoch_ms()?,
        };
        let text = serde_json::to_string_pretty(&file).context("serialize enrollment ledger")?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create ledger dir {}", parent.display()))?;
        }
        fs::write(&self.path, text.as_bytes())
            .with_context(|| format!("write {}", self.path.display()))?;
        Ok(())
    }
}

pub(crate) fn now_epoch_ms() -> Result<u64> {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("compute timestamp")?
        .as_millis();
    u64::try_from(millis).context("timestamp overflow")
}
