//! JSONL-backed repository with in-memory caching.
//!
//! Each collection is one append-only file. A write appends the full record; on
//! open the last line per id wins and the file is compacted to one line per id.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use super::{HasId, JobRepository};
use crate::domain::SubmissionJob;
use crate::error::{Result, SubmitrError};
use crate::resilience::BreakerSnapshot;

const JOBS: &str = "jobs";
const BREAKERS: &str = "breakers";

/// One JSONL file plus its cache.
#[derive(Debug)]
struct Collection<T> {
    path: PathBuf,
    cache: RwLock<HashMap<String, T>>,
    // Serializes appends so lines never interleave
    writer: Mutex<()>,
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned + HasId + Clone,
{
    fn open(base: &Path, name: &str) -> Result<Self> {
        let path = base.join(format!("{}.jsonl", name));
        let mut records = HashMap::new();
        let mut lines = 0usize;

        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                lines += 1;
                match serde_json::from_str::<T>(&line) {
                    Ok(record) => {
                        records.insert(record.id().to_string(), record);
                    }
                    // A torn final write must not make the whole file unreadable
                    Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable record"),
                }
            }
        }

        let collection = Self {
            path,
            cache: RwLock::new(records),
            writer: Mutex::new(()),
        };
        if lines > collection.len()? {
            collection.compact()?;
        }
        Ok(collection)
    }

    fn len(&self) -> Result<usize> {
        Ok(self.cache.read().map_err(poisoned)?.len())
    }

    fn compact(&self) -> Result<()> {
        let _guard = self.writer.lock().map_err(poisoned)?;
        let cache = self.cache.read().map_err(poisoned)?;

        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let mut file = File::create(&tmp)?;
            for record in cache.values() {
                writeln!(file, "{}", serde_json::to_string(record)?)?;
            }
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), records = cache.len(), "Compacted collection");
        Ok(())
    }

    fn upsert(&self, record: &T) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let _guard = self.writer.lock().map_err(poisoned)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", line)?;
        self.cache
            .write()
            .map_err(poisoned)?
            .insert(record.id().to_string(), record.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<T>> {
        Ok(self.cache.read().map_err(poisoned)?.get(id).cloned())
    }

    fn filter(&self, keep: impl Fn(&T) -> bool) -> Result<Vec<T>> {
        Ok(self
            .cache
            .read()
            .map_err(poisoned)?
            .values()
            .filter(|r| keep(r))
            .cloned()
            .collect())
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> SubmitrError {
    SubmitrError::Persistence(e.to_string())
}

/// Repository writing `jobs.jsonl` and `breakers.jsonl` under one directory.
#[derive(Debug)]
pub struct JsonlRepository {
    base_path: PathBuf,
    jobs: Collection<SubmissionJob>,
    breakers: Collection<BreakerSnapshot>,
}

impl JsonlRepository {
    /// Open or create the repository at `base_path`.
    pub fn open(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        Ok(Self {
            jobs: Collection::open(&base_path, JOBS)?,
            breakers: Collection::open(&base_path, BREAKERS)?,
            base_path,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Rewrite both files with one line per record.
    pub fn compact(&self) -> Result<()> {
        self.jobs.compact()?;
        self.breakers.compact()
    }
}

#[async_trait]
impl JobRepository for JsonlRepository {
    async fn upsert_job(&self, job: &SubmissionJob) -> Result<()> {
        self.jobs.upsert(job)
    }

    async fn get_job(&self, id: &str) -> Result<Option<SubmissionJob>> {
        self.jobs.get(id)
    }

    async fn list_active_jobs(&self) -> Result<Vec<SubmissionJob>> {
        let mut active = self.jobs.filter(|j| !j.status.is_terminal())?;
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(active)
    }

    async fn upsert_breaker(&self, snapshot: &BreakerSnapshot) -> Result<()> {
        self.breakers.upsert(snapshot)
    }

    async fn list_breakers(&self) -> Result<Vec<BreakerSnapshot>> {
        let mut all = self.breakers.filter(|_| true)?;
        all.sort_by(|a, b| a.service_name.cmp(&b.service_name));
        Ok(all)
    }
}
