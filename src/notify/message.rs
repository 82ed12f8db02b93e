//! Alert payloads.
//!
//! The long form carries a subject, a body and up to `MAX_ATTACHMENTS`
//! evidence images in ascending file-name order. The short form is plain text
//! for message gateways and never carries attachments.

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::capture::evidence_files;

/// Hard cap on attachments per alert.
pub const MAX_ATTACHMENTS: usize = 5;

pub const ALERT_SUBJECT: &str = "Accident Detected - Crash Sentinel Alert";

pub const ALERT_BODY: &str = "Crash Sentinel system generated alert.\n\n\
Attached are the accident frames captured automatically by Crash Sentinel.\n\n\
This is an automated message. No reply is needed.\n\n\
Regards,\nCrash Sentinel";

pub const ALERT_SHORT_TEXT: &str = "Accident Detected - Crash Sentinel Alert\n\n\
Accident detected by the Crash Sentinel system!\n\
Check the camera feed immediately.\n\n\
- Crash Sentinel";

/// One evidence image attached to an alert.
#[derive(Clone, Debug)]
pub struct Attachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn sha256_hex(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }
}

/// Fully built alert, shared by every channel.
#[derive(Clone, Debug)]
pub struct AlertMessage {
    pub subject: String,
    pub body: String,
    pub short_text: String,
    pub source_id: String,
    pub attachments: Vec<Attachment>,
}

impl AlertMessage {
    /// Alert with the fixed templates and no attachments.
    pub fn new(source_id: &str) -> Self {
        Self {
            subject: ALERT_SUBJECT.to_string(),
            body: ALERT_BODY.to_string(),
            short_text: ALERT_SHORT_TEXT.to_string(),
            source_id: source_id.to_string(),
            attachments: Vec::new(),
        }
    }

    /// Alert carrying up to `max_attachments` evidence images from `evidence_dir`.
    pub fn with_evidence(source_id: &str, evidence_dir: &Path, max_attachments: usize) -> Result<Self> {
        let mut message = Self::new(source_id);
        for path in evidence_files(evidence_dir, max_attachments.min(MAX_ATTACHMENTS))? {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("failed to read evidence {}", path.display()))?;
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            message.attachments.push(Attachment { file_name, bytes });
        }
        Ok(message)
    }

    /// JSON manifest describing the alert without attachment bytes.
    pub fn manifest(&self) -> AlertManifest<'_> {
        AlertManifest {
            subject: &self.subject,
            body: &self.body,
            source_id: &self.source_id,
            attachments: self
                .attachments
                .iter()
                .map(|a| AttachmentEntry {
                    file_name: &a.file_name,
                    bytes: a.bytes.len(),
                    sha256: a.sha256_hex(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AlertManifest<'a> {
    pub subject: &'a str,
    pub body: &'a str,
    pub source_id: &'a str,
    pub attachments: Vec<AttachmentEntry<'a>>,
}

#[derive(Debug, Serialize)]
pub struct AttachmentEntry<'a> {
    pub file_name: &'a str,
    pub bytes: usize,
    pub sha256: String,
}
