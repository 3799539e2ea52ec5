//! Content-addressed evidence store: raw/derived/labels/cases directory
//! layout, hard-link fan-out, append-only custody ledger, atomic
//! temp-file-then-rename writes.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use fs2::FileExt;

use crate::error::{EtError, EtResult};
use crate::hashing;
use crate::schema::{
    AnalysisRecord, ChainOfCustodyEntry, CorrelationResult, CustodyAction, DerivedArtifacts, EvidenceBundle, EvidenceType, FileMetadata,
    RiskFlag, Validate,
};

const LOCK_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// Outcome of `Store::ingest` (spec §4.3).
#[derive(Debug, Clone)]
pub struct IngestResult {
    pub sha256: String,
    pub evidence_type: EvidenceType,
    /// False when the content hash already existed in raw storage (spec
    /// §4.3: "re-ingesting the same bytes is a no-op beyond possibly adding
    /// a case link and appending a custody entry").
    pub newly_stored: bool,
}

/// Per-hash in-process lock table, layered under the OS advisory lock on
/// the custody file (spec §4.3, §5: "per-hash in-process lock plus an OS
/// advisory lock"). A plain `AtomicBool` spinlock avoids a self-referential
/// `MutexGuard` living alongside the `Store`.
#[derive(Default)]
struct LockTable {
    locks: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

impl LockTable {
    fn flag_for(&self, sha256: &str) -> Arc<AtomicBool> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(sha256.to_string()).or_insert_with(|| Arc::new(AtomicBool::new(false))).clone()
    }
}

pub struct Store {
    root: PathBuf,
    locks: LockTable,
}

impl Store {
    pub fn open(root: impl Into<PathBuf>) -> EtResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        fs::create_dir_all(root.join("raw"))?;
        fs::create_dir_all(root.join("derived"))?;
        fs::create_dir_all(root.join("labels"))?;
        fs::create_dir_all(root.join("cases"))?;
        Ok(Store {
            root,
            locks: LockTable::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn raw_dir(&self, sha256: &str) -> PathBuf {
        self.root.join("raw").join(format!("sha256={sha256}"))
    }

    fn derived_dir(&self, sha256: &str) -> PathBuf {
        self.root.join("derived").join(format!("sha256={sha256}"))
    }

    fn custody_path(&self, sha256: &str) -> PathBuf {
        self.derived_dir(sha256).join("chain_of_custody.json")
    }

    fn bundle_path(&self, sha256: &str) -> PathBuf {
        self.derived_dir(sha256).join("evidence_bundle.v1.json")
    }

    fn analysis_path(&self, sha256: &str) -> PathBuf {
        self.derived_dir(sha256).join("analysis.v1.json")
    }

    fn case_dir(&self, case_id: &str) -> PathBuf {
        self.root.join("cases").join(case_id)
    }

    fn correlation_path(&self, case_id: &str) -> PathBuf {
        self.case_dir(case_id).join("correlation_analysis.v1.json")
    }

    /// Write `bytes` to `dir/name` via a same-directory temp file, fsync,
    /// then rename, so a crash mid-write never leaves a half-written file
    /// at the final path (spec §4.3).
    fn atomic_write(dir: &Path, name: &str, bytes: &[u8]) -> EtResult<()> {
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(dir.join(name)).map_err(|e| EtError::Storage(e.to_string()))?;
        Ok(())
    }

    fn atomic_write_json<T: serde::Serialize>(dir: &Path, name: &str, value: &T) -> EtResult<()> {
        let json = serde_json::to_vec_pretty(value)?;
        Self::atomic_write(dir, name, &json)
    }

    /// Ingest one file (spec §4.3 `ingest`). Hashes, stores raw bytes if
    /// absent, extracts derived artifacts, links into the case if given, and
    /// appends an `ingest` custody entry.
    pub fn ingest(&self, path: &Path, case_id: Option<&str>, actor: &str) -> EtResult<IngestResult> {
        if !path.exists() {
            return Err(EtError::NotFound(path.to_path_buf()));
        }
        let sha256 = hashing::sha256_file(path)?;
        let guard = self.acquire_lock(&sha256)?;

        let extension = path.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();
        let raw_dir = self.raw_dir(&sha256);
        let raw_file = raw_dir.join(format!("original{extension}"));

        let newly_stored = !raw_file.exists();
        if newly_stored {
            let bytes = fs::read(path)?;
            Self::atomic_write(&raw_dir, &format!("original{extension}"), &bytes)?;
            // I3: the stored copy must hash identically to what we read.
            let verify = hashing::sha256_file(&raw_file)?;
            if verify != sha256 {
                return Err(EtError::Storage(format!("hash mismatch on write-back for {sha256}")));
            }
        }

        let evidence_type = hashing::classify(path);
        let size = fs::metadata(path)?.len();
        let source_modified_at = fs::metadata(path).ok().and_then(|m| m.modified().ok()).map(chrono::DateTime::<Utc>::from);

        if newly_stored {
            let metadata = FileMetadata {
                sha256: sha256.clone(),
                size,
                mime_type: hashing::mime_guess(path),
                original_filename: path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
                extension: extension.clone(),
                ingested_at: Utc::now(),
                source_modified_at,
                evidence_type,
            };
            metadata.validate().map_err(EtError::SchemaViolation)?;
            Self::atomic_write_json(&self.derived_dir(&sha256), "metadata.json", &metadata)?;

            let derived = self.extract_derived_artifacts(path, evidence_type)?;
            Self::atomic_write_json(&self.derived_dir(&sha256), "derived.json", &derived)?;
            if let Some(exif) = &derived.exif {
                Self::atomic_write_json(&self.derived_dir(&sha256), "exif.json", exif)?;
            }
            if let Some(phash) = &derived.perceptual_hash {
                Self::atomic_write(&self.derived_dir(&sha256), "phash.txt", phash.as_bytes())?;
            }

            let bundle = EvidenceBundle::new(metadata, case_id.map(|c| c.to_string()));
            bundle.validate().map_err(EtError::SchemaViolation)?;
            Self::atomic_write_json(&self.derived_dir(&sha256), "evidence_bundle.v1.json", &bundle)?;
        }

        if let Some(case_id) = case_id {
            self.link_to_case_locked(&sha256, &extension, case_id)?;
        }

        self.append_custody_locked(
            &sha256,
            ChainOfCustodyEntry::new(actor, CustodyAction::Ingest, Some(format!("ingested {}", path.display()))),
        )?;
        drop(guard);

        Ok(IngestResult {
            sha256,
            evidence_type,
            newly_stored,
        })
    }

    fn extract_derived_artifacts(&self, path: &Path, evidence_type: EvidenceType) -> EtResult<DerivedArtifacts> {
        let mime = hashing::mime_guess(path);
        match evidence_type {
            EvidenceType::Image => Ok(DerivedArtifacts {
                mime,
                exif: Some(hashing::extract_exif(path)),
                perceptual_hash: hashing::perceptual_hash(path).ok(),
                text_extractable: None,
            }),
            EvidenceType::Document if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("pdf")) => Ok(DerivedArtifacts {
                mime,
                exif: None,
                perceptual_hash: None,
                text_extractable: Some(hashing::has_extractable_pdf_text(path)),
            }),
            _ => Ok(DerivedArtifacts {
                mime,
                exif: None,
                perceptual_hash: None,
                text_extractable: None,
            }),
        }
    }

    /// Hard-link (or copy, on cross-device/unsupported filesystems) the raw
    /// file into `cases/<case_id>/` (spec §4.3 `link_to_case`, invariant I3).
    pub fn link_to_case(&self, sha256: &str, case_id: &str) -> EtResult<()> {
        let _guard = self.acquire_lock(sha256)?;
        self.link_to_case_locked(sha256, &self.extension_for(sha256)?, case_id)
    }

    fn link_to_case_locked(&self, sha256: &str, extension: &str, case_id: &str) -> EtResult<()> {
        self.link_into(sha256, extension, &self.root.join("cases").join(case_id))
    }

    /// Hard-link the raw file into `labels/<label>/` (spec §4.3 layout; used
    /// by `write_analysis` for risk-flag-derived label links).
    fn link_label(&self, sha256: &str, extension: &str, label: &str) -> EtResult<()> {
        self.link_into(sha256, extension, &self.root.join("labels").join(label))
    }

    fn link_into(&self, sha256: &str, extension: &str, dir: &Path) -> EtResult<()> {
        fs::create_dir_all(dir)?;
        let target = dir.join(format!("{sha256}{extension}"));
        if target.exists() {
            return Ok(());
        }
        let source = self.raw_dir(sha256).join(format!("original{extension}"));
        match fs::hard_link(&source, &target) {
            Ok(()) => {}
            Err(_) => {
                fs::copy(&source, &target)?;
            }
        }
        let verify = hashing::sha256_file(&target)?;
        if verify != sha256 {
            return Err(EtError::Storage(format!("case/label link hash mismatch for {sha256}")));
        }
        Ok(())
    }

    fn extension_for(&self, sha256: &str) -> EtResult<String> {
        let metadata = self.read_metadata(sha256)?;
        Ok(metadata.extension)
    }

    fn read_metadata(&self, sha256: &str) -> EtResult<FileMetadata> {
        let path = self.derived_dir(sha256).join("metadata.json");
        let bytes = fs::read(&path).map_err(|_| EtError::Storage(format!("no metadata for {sha256}")))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Persist a completed analysis (spec §4.3 `write_analysis`): writes
    /// analysis.v1.json and evidence_bundle.v1.json atomically, appends an
    /// `analyze` custody entry, and creates label links for the analysis's
    /// risk flags (up to `max_labels`).
    pub fn write_analysis(&self, sha256: &str, record: AnalysisRecord, actor: &str, max_labels: usize) -> EtResult<()> {
        record.validate().map_err(EtError::SchemaViolation)?;
        let _guard = self.acquire_lock(sha256)?;

        Self::atomic_write_json(&self.derived_dir(sha256), "analysis.v1.json", &record)?;

        let mut bundle = self.read_bundle_unlocked(sha256)?.ok_or_else(|| EtError::Storage(format!("no bundle for {sha256}")))?;
        bundle.analyses.push(record.clone());
        bundle.validate().map_err(EtError::SchemaViolation)?;
        Self::atomic_write_json(&self.derived_dir(sha256), "evidence_bundle.v1.json", &bundle)?;

        self.append_custody_locked(
            sha256,
            ChainOfCustodyEntry::new(actor, CustodyAction::Analyze, Some(format!("analysis {}", record.analysis_id))),
        )?;

        let labels = risk_flag_labels(&record);
        if !labels.is_empty() {
            let extension = bundle.evidence.extension.clone();
            for label in labels.into_iter().take(max_labels) {
                self.link_label(sha256, &extension, &label)?;
            }
        }
        Ok(())
    }

    /// Read the evidence bundle for a hash, if it exists (spec §4.3
    /// `read_bundle`).
    pub fn read_bundle(&self, sha256: &str) -> EtResult<Option<EvidenceBundle>> {
        let _guard = self.acquire_lock(sha256)?;
        self.read_bundle_unlocked(sha256)
    }

    fn read_bundle_unlocked(&self, sha256: &str) -> EtResult<Option<EvidenceBundle>> {
        let path = self.bundle_path(sha256);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let bundle: EvidenceBundle = serde_json::from_slice(&bytes)?;
        bundle.validate().map_err(EtError::SchemaViolation)?;
        Ok(Some(bundle))
    }

    /// Whether an analysis with this id is already stored (spec §4.5, §4.7
    /// idempotency: "checked by existence of analysis.v1.json with the
    /// expected analysis_id").
    pub fn has_analysis(&self, sha256: &str, analysis_id: &str) -> EtResult<bool> {
        Ok(self.read_bundle(sha256)?.is_some_and(|b| b.analyses.iter().any(|a| a.analysis_id == analysis_id)))
    }

    /// List every hash belonging to a case, or every known hash when
    /// `case_id` is `None` (spec §4.3 `list`).
    pub fn list(&self, case_id: Option<&str>) -> EtResult<Vec<String>> {
        let dir = match case_id {
            Some(case_id) => self.root.join("cases").join(case_id),
            None => self.root.join("raw"),
        };
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut hashes = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let hash = match case_id {
                Some(_) => name.split('.').next().unwrap_or(&name).to_string(),
                None => name.strip_prefix("sha256=").map(str::to_string).unwrap_or(name),
            };
            if hash.len() == 64 {
                hashes.push(hash);
            }
        }
        hashes.sort_unstable();
        hashes.dedup();
        Ok(hashes)
    }

    /// Persist a case's correlation result and append a `correlate` custody
    /// entry to every member hash (spec §4.3, §4.6: correlation output is
    /// case-scoped, not per-evidence, but custody tracking stays per-hash).
    pub fn write_correlation(&self, case_id: &str, result: &CorrelationResult, actor: &str) -> EtResult<()> {
        result.validate().map_err(EtError::SchemaViolation)?;
        let dir = self.case_dir(case_id);
        fs::create_dir_all(&dir)?;
        Self::atomic_write_json(&dir, "correlation_analysis.v1.json", result)?;

        for sha256 in self.list(Some(case_id))? {
            self.append_custody(
                &sha256,
                ChainOfCustodyEntry::new(actor, CustodyAction::Correlate, Some(format!("correlated for case {case_id}"))),
            )?;
        }
        Ok(())
    }

    /// Append a `package` custody entry to every evidence hash in a case
    /// (spec §3 CustodyAction::Package, §4.7 Package stage).
    pub fn record_package_custody(&self, case_id: &str, actor: &str) -> EtResult<()> {
        for sha256 in self.list(Some(case_id))? {
            self.append_custody(
                &sha256,
                ChainOfCustodyEntry::new(actor, CustodyAction::Package, Some(format!("packaged for case {case_id}"))),
            )?;
        }
        Ok(())
    }

    /// Read a case's persisted correlation result, if one has been written.
    pub fn read_correlation(&self, case_id: &str) -> EtResult<Option<CorrelationResult>> {
        let path = self.correlation_path(case_id);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let result: CorrelationResult = serde_json::from_slice(&bytes)?;
        result.validate().map_err(EtError::SchemaViolation)?;
        Ok(Some(result))
    }

    /// Append one custody entry under the per-hash lock, enforcing
    /// timestamp monotonicity (spec §4.3 `append_custody`, invariant I2).
    pub fn append_custody(&self, sha256: &str, entry: ChainOfCustodyEntry) -> EtResult<()> {
        let _guard = self.acquire_lock(sha256)?;
        self.append_custody_locked(sha256, entry)
    }

    fn append_custody_locked(&self, sha256: &str, mut entry: ChainOfCustodyEntry) -> EtResult<()> {
        let path = self.custody_path(sha256);
        let mut log: Vec<ChainOfCustodyEntry> = if path.exists() {
            serde_json::from_slice(&fs::read(&path)?)?
        } else {
            Vec::new()
        };

        if let Some(last) = log.last() {
            if entry.timestamp < last.timestamp {
                entry.timestamp = last.timestamp;
            }
        }
        log.push(entry);
        Self::atomic_write_json(&self.derived_dir(sha256), "chain_of_custody.json", &log)?;

        if let Ok(Some(mut bundle)) = self.read_bundle_unlocked(sha256) {
            bundle.chain_of_custody = log;
            if bundle.validate().is_ok() {
                let _ = Self::atomic_write_json(&self.derived_dir(sha256), "evidence_bundle.v1.json", &bundle);
            }
        }
        Ok(())
    }

    /// Acquire the in-process lock for `sha256`, plus an OS advisory lock on
    /// its custody file, bounded by `LOCK_TIMEOUT` (spec §4.3, §7:
    /// "concurrency errors: lock acquisition timeout (60 s) → item
    /// failure").
    fn acquire_lock(&self, sha256: &str) -> EtResult<StoreGuard> {
        let flag = self.locks.flag_for(sha256);
        let start = std::time::Instant::now();
        while flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed).is_err() {
            if start.elapsed() >= LOCK_TIMEOUT {
                return Err(EtError::LockTimeout(LOCK_TIMEOUT));
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        let derived_dir = self.derived_dir(sha256);
        fs::create_dir_all(&derived_dir)?;
        let lock_path = derived_dir.join(".lock");
        let file = File::options().create(true).write(true).open(&lock_path)?;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => break,
                Err(_) if start.elapsed() < LOCK_TIMEOUT => std::thread::sleep(std::time::Duration::from_millis(25)),
                Err(_) => {
                    flag.store(false, Ordering::Release);
                    return Err(EtError::LockTimeout(LOCK_TIMEOUT));
                }
            }
        }

        Ok(StoreGuard { file, flag })
    }
}

/// Holds both lock layers until dropped: the OS advisory lock on the
/// custody file, and the in-process flag serializing same-hash callers
/// within this process (spec §4.3, §5).
struct StoreGuard {
    file: File,
    flag: Arc<AtomicBool>,
}

impl Drop for StoreGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        self.flag.store(false, Ordering::Release);
    }
}

fn risk_flag_labels(record: &AnalysisRecord) -> Vec<String> {
    let flags: Vec<RiskFlag> = match &record.outputs {
        crate::schema::AnalysisOutputs::Document(d) => d.ai.risk_flags.clone(),
        crate::schema::AnalysisOutputs::Email(e) => e.risk_flags.clone(),
        crate::schema::AnalysisOutputs::Image(i) => i.risk_flags.clone(),
    };
    flags
        .into_iter()
        .filter_map(|f| serde_json::to_string(&f).ok())
        .map(|s| s.trim_matches('"').to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn sample_store() -> (tempfile::TempDir, Store) {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open(tmp.path().join("store")).unwrap();
        (tmp, store)
    }

    fn sample_file(tmp: &tempfile::TempDir, name: &str, contents: &[u8]) -> PathBuf {
        let path = tmp.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(contents).unwrap();
        path
    }

    #[test]
    fn ingest_then_read_bundle_round_trips() {
        let (tmp, store) = sample_store();
        let file = sample_file(&tmp, "letter.txt", b"Hello, this is a forensic letter of some length.");
        let result = store.ingest(&file, Some("CASE-1"), "tester").unwrap();
        assert!(result.newly_stored);
        let bundle = store.read_bundle(&result.sha256).unwrap().unwrap();
        assert_eq!(bundle.evidence.sha256, result.sha256);
        assert_eq!(bundle.chain_of_custody.len(), 1);
    }

    #[test]
    fn re_ingesting_identical_bytes_is_a_no_op_for_raw_storage() {
        let (tmp, store) = sample_store();
        let file = sample_file(&tmp, "letter.txt", b"Same bytes both times.");
        let first = store.ingest(&file, None, "tester").unwrap();
        let second = store.ingest(&file, None, "tester").unwrap();
        assert_eq!(first.sha256, second.sha256);
        assert!(!second.newly_stored);
        let bundle = store.read_bundle(&first.sha256).unwrap().unwrap();
        assert_eq!(bundle.chain_of_custody.len(), 2);
    }

    #[test]
    fn list_returns_case_members() {
        let (tmp, store) = sample_store();
        let file = sample_file(&tmp, "a.txt", b"evidence item A contents here");
        let result = store.ingest(&file, Some("CASE-X"), "tester").unwrap();
        let members = store.list(Some("CASE-X")).unwrap();
        assert_eq!(members, vec![result.sha256]);
    }
}
