// Fitted model snapshots: bincode + gzip, written atomically
use anyhow::{anyhow, Result};
use atomicwrites::{AllowOverwrite, AtomicFile};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use homefind_core::{Catalog, VectorModel, VectorizerConfig};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const SNAPSHOT_EXTENSION: &str = "model";
const FORMAT_VERSION: u32 = 1;

/// Snapshot description for listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDescription {
    pub fingerprint: String,
    pub created_at: Option<String>,
    pub size: u64,
}

#[derive(Serialize, Deserialize)]
struct ModelSnapshot {
    version: u32,
    fingerprint: String,
    created_at: DateTime<Utc>,
    model: VectorModel,
}

/// Identity of a fitted model: every description in catalog order plus the
/// vectorizer settings. Any change to either yields a new fingerprint.
pub fn fingerprint(catalog: &Catalog, config: &VectorizerConfig) -> String {
    let mut hasher = Sha256::new();
    hasher.update(FORMAT_VERSION.to_le_bytes());
    hasher.update((config.max_features as u64).to_le_bytes());
    hasher.update([config.stop_words as u8]);
    hasher.update((catalog.len() as u64).to_le_bytes());
    for description in catalog.descriptions() {
        hasher.update((description.len() as u64).to_le_bytes());
        hasher.update(description.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Directory of fitted [`VectorModel`] snapshots keyed by fingerprint.
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_path(&self, fingerprint: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", fingerprint, SNAPSHOT_EXTENSION))
    }

    pub fn save(&self, fingerprint: &str, model: &VectorModel) -> Result<SnapshotDescription> {
        let snapshot = ModelSnapshot {
            version: FORMAT_VERSION,
            fingerprint: fingerprint.to_string(),
            created_at: Utc::now(),
            model: model.clone(),
        };
        let data = bincode::serialize(&snapshot)
            .map_err(|e| anyhow!("Serialization error: {}", e))?;

        let path = self.snapshot_path(fingerprint);
        AtomicFile::new(&path, AllowOverwrite)
            .write(|file| {
                let mut encoder = GzEncoder::new(file, Compression::default());
                encoder.write_all(&data)?;
                encoder.finish().map(|_| ())
            })
            .map_err(|e| anyhow!("Failed to write snapshot {}: {}", path.display(), e))?;

        let size = fs::metadata(&path)?.len();
        info!(
            fingerprint,
            features = model.vocabulary_size(),
            size,
            "Saved model snapshot"
        );

        Ok(SnapshotDescription {
            fingerprint: fingerprint.to_string(),
            created_at: Some(format_time(snapshot.created_at)),
            size,
        })
    }

    /// Load the snapshot for `fingerprint`; `Ok(None)` if there is none.
    pub fn load(&self, fingerprint: &str) -> Result<Option<VectorModel>> {
        let path = self.snapshot_path(fingerprint);
        if !path.exists() {
            return Ok(None);
        }

        let file = File::open(&path)?;
        let mut decoder = GzDecoder::new(BufReader::new(file));
        let mut data = Vec::new();
        decoder.read_to_end(&mut data)?;

        let snapshot: ModelSnapshot = bincode::deserialize(&data)
            .map_err(|e| anyhow!("Deserialization error in {}: {}", path.display(), e))?;

        if snapshot.version != FORMAT_VERSION {
            return Err(anyhow!(
                "Snapshot {} has format version {}, expected {}",
                path.display(),
                snapshot.version,
                FORMAT_VERSION
            ));
        }
        if snapshot.fingerprint != fingerprint {
            return Err(anyhow!(
                "Snapshot {} belongs to fingerprint {}",
                path.display(),
                snapshot.fingerprint
            ));
        }

        Ok(Some(snapshot.model))
    }

    /// Reuse the stored model for this catalog, or fit and store a new one.
    ///
    /// Returns the model and whether it came from disk. Unreadable snapshots
    /// are logged and replaced.
    pub fn load_or_fit(
        &self,
        catalog: &Catalog,
        config: &VectorizerConfig,
    ) -> Result<(VectorModel, bool)> {
        let fingerprint = fingerprint(catalog, config);

        match self.load(&fingerprint) {
            Ok(Some(model)) => {
                info!(%fingerprint, "Loaded fitted model from snapshot");
                return Ok((model, true));
            }
            Ok(None) => {}
            Err(e) => warn!(%fingerprint, error = %e, "Discarding unreadable model snapshot"),
        }

        let model = VectorModel::fit(catalog.descriptions(), config)?;
        self.save(&fingerprint, &model)?;
        Ok((model, false))
    }

    pub fn list(&self) -> Result<Vec<SnapshotDescription>> {
        let mut snapshots = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some(SNAPSHOT_EXTENSION) {
                continue;
            }
            let Some(fingerprint) = path.file_stem().and_then(|n| n.to_str()) else {
                continue;
            };

            let metadata = fs::metadata(&path)?;
            let created_at = metadata
                .modified()
                .ok()
                .map(|t| format_time(DateTime::<Utc>::from(t)));

            snapshots.push(SnapshotDescription {
                fingerprint: fingerprint.to_string(),
                created_at,
                size: metadata.len(),
            });
        }

        snapshots.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        Ok(snapshots)
    }

    pub fn delete(&self, fingerprint: &str) -> Result<bool> {
        let path = self.snapshot_path(fingerprint);
        if path.exists() {
            fs::remove_file(&path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

fn format_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
