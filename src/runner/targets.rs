//! Directory lists fed to the simulation.
//!
//! Accepts either a bare JSON array of directories or a URL-check report of the
//! form `{"results": [...]}`. Entries marked inaccessible are skipped.

use std::path::Path;

use serde::Deserialize;

use crate::domain::SubmissionTarget;
use crate::error::Result;

/// One directory from a targets file
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DirectoryEntry {
    #[serde(default)]
    pub directory_id: Option<String>,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub submission_url: Option<String>,
    #[serde(default = "default_accessible")]
    pub accessible: bool,
    #[serde(default)]
    pub domain_authority: Option<u32>,
    #[serde(default)]
    pub priority_tier: Option<u8>,
}

fn default_accessible() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TargetsFile {
    List(Vec<DirectoryEntry>),
    Report { results: Vec<DirectoryEntry> },
}

/// The business every simulated submission is for.
#[derive(Debug, Clone, PartialEq)]
pub struct BusinessProfile {
    pub id: String,
    pub name: String,
}

impl Default for BusinessProfile {
    fn default() -> Self {
        Self {
            id: "biz-demo".to_string(),
            name: "Demo Business".to_string(),
        }
    }
}

impl DirectoryEntry {
    /// The explicit id, or one derived from the name ("Yellow Pages" -> "yellow-pages")
    pub fn directory_id(&self) -> String {
        if let Some(id) = self.directory_id.as_deref().filter(|id| !id.trim().is_empty()) {
            return id.to_string();
        }
        let slug: Vec<String> = self
            .name
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|part| !part.is_empty())
            .map(|part| part.to_ascii_lowercase())
            .collect();
        slug.join("-")
    }

    pub fn to_target(&self, business: &BusinessProfile) -> SubmissionTarget {
        let url = self.submission_url.as_deref().unwrap_or(&self.url);
        let mut payload = serde_json::Map::new();
        if let Some(authority) = self.domain_authority {
            payload.insert("domain_authority".into(), authority.into());
        }
        SubmissionTarget::new(self.directory_id(), url, &business.id, &business.name)
            .with_payload(serde_json::Value::Object(payload))
    }
}

/// Read a targets file, dropping inaccessible entries.
pub fn load_targets(path: &Path) -> Result<Vec<DirectoryEntry>> {
    let content = std::fs::read_to_string(path)?;
    let entries = match serde_json::from_str::<TargetsFile>(&content)? {
        TargetsFile::List(entries) | TargetsFile::Report { results: entries } => entries,
    };
    let total = entries.len();
    let accessible: Vec<DirectoryEntry> = entries.into_iter().filter(|e| e.accessible).collect();
    if accessible.len() < total {
        tracing::info!(
            skipped = total - accessible.len(),
            path = %path.display(),
            "Skipping inaccessible directories"
        );
    }
    Ok(accessible)
}

/// Generated directories for runs without a targets file.
pub fn synthetic_targets(count: usize) -> Vec<DirectoryEntry> {
    (0..count)
        .map(|i| DirectoryEntry {
            directory_id: None,
            name: format!("Directory {:03}", i),
            url: format!("https://directory-{:03}.example.com", i),
            submission_url: Some(format!("https://directory-{:03}.example.com/add-listing", i)),
            accessible: true,
            domain_authority: Some(((i * 37) % 100) as u32),
            priority_tier: Some((i % 4) as u8),
        })
        .collect()
}
