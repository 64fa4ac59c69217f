//! On-disk checkpoints.
//!
//! A checkpoint is a directory:
//!
//! ```text
//! checkpoint_phase1/
//!   main.json       main estimator
//!   target.json     target estimator
//!   trainer.json    TrainerState, curriculum, RNG, replay buffer, config
//!   manifest.json   format version + SHA-256 of the three files above
//! ```
//!
//! It is assembled in `<dir>.tmp` and renamed into place, so a reader never
//! sees a half-written checkpoint. Loading verifies every digest before
//! anything is handed back to the caller.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::{BufferPersistence, RewardMatrix, TrainerConfig};
use crate::curriculum::Curriculum;
use crate::error::{FdsError, Result};
use crate::replay::Experience;
use crate::trainer::TrainerState;
use crate::traits::ValueEstimator;

pub const CHECKPOINT_VERSION: u32 = 1;

pub const MAIN_FILE: &str = "main.json";
pub const TARGET_FILE: &str = "target.json";
pub const TRAINER_FILE: &str = "trainer.json";
pub const MANIFEST_FILE: &str = "manifest.json";

const MEMBERS: [&str; 3] = [MAIN_FILE, TARGET_FILE, TRAINER_FILE];

/// Writes `bytes` to a sibling temp file, syncs it, then renames over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, bytes)?;
    fs::File::open(&temp_path)?.sync_all()?;
    fs::rename(&temp_path, path)?;
    debug!(path = %path.display(), bytes = bytes.len(), "atomically wrote file");
    Ok(())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckpointManifest {
    pub version: u32,
    pub created_at: String,
    /// File name to lowercase hex SHA-256.
    pub files: BTreeMap<String, String>,
}

/// Everything a trainer needs besides its two estimators.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainerSnapshot {
    pub state: TrainerState,
    pub curriculum: Curriculum,
    pub rng: ChaCha8Rng,
    pub config: TrainerConfig,
    pub rewards: RewardMatrix,
    pub buffer_capacity: usize,
    /// Oldest first.
    pub buffer: Vec<Experience>,
    /// False when `BufferPersistence::Sampled` dropped older experiences.
    pub buffer_complete: bool,
}

impl TrainerSnapshot {
    /// Applies the persistence policy to the full buffer contents.
    pub fn buffer_for_persistence(persistence: BufferPersistence, experiences: Vec<Experience>) -> (Vec<Experience>, bool) {
        match persistence {
            BufferPersistence::Full => (experiences, true),
            BufferPersistence::Sampled { max } if experiences.len() > max => {
                let skip = experiences.len() - max;
                (experiences.into_iter().skip(skip).collect(), false)
            }
            BufferPersistence::Sampled { .. } => (experiences, true),
        }
    }
}

/// A fully verified checkpoint, ready to be installed into a trainer.
pub struct LoadedCheckpoint<E> {
    pub main: E,
    pub target: E,
    pub snapshot: TrainerSnapshot,
    pub manifest: CheckpointManifest,
}

fn staging_dir(dir: &Path) -> Result<PathBuf> {
    let name = dir
        .file_name()
        .ok_or_else(|| FdsError::Config(format!("checkpoint path {:?} has no directory name", dir)))?;
    let mut staged = name.to_os_string();
    staged.push(".tmp");
    Ok(dir.with_file_name(staged))
}

pub fn save_checkpoint<E: ValueEstimator>(dir: &Path, main: &E, target: &E, snapshot: &TrainerSnapshot) -> Result<()> {
    let staging = staging_dir(dir)?;
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    main.save(&staging.join(MAIN_FILE))?;
    target.save(&staging.join(TARGET_FILE))?;
    write_atomic(&staging.join(TRAINER_FILE), &serde_json::to_vec(snapshot)?)?;

    let mut files = BTreeMap::new();
    for member in MEMBERS {
        let bytes = fs::read(staging.join(member))?;
        files.insert(member.to_string(), sha256_hex(&bytes));
    }
    let manifest = CheckpointManifest {
        version: CHECKPOINT_VERSION,
        created_at: chrono::Utc::now().to_rfc3339(),
        files,
    };
    write_atomic(&staging.join(MANIFEST_FILE), &serde_json::to_vec_pretty(&manifest)?)?;

    if dir.exists() {
        let retired = dir.with_file_name(format!(
            "{}.old",
            dir.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
        ));
        if retired.exists() {
            fs::remove_dir_all(&retired)?;
        }
        fs::rename(dir, &retired)?;
        fs::rename(&staging, dir)?;
        fs::remove_dir_all(&retired)?;
    } else {
        fs::rename(&staging, dir)?;
    }

    info!(
        dir = %dir.display(),
        epoch = snapshot.state.current_epoch,
        buffer = snapshot.buffer.len(),
        "checkpoint written"
    );
    Ok(())
}

fn corrupt(dir: &Path, what: impl std::fmt::Display) -> FdsError {
    FdsError::CheckpointCorruption(format!("{}: {}", dir.display(), what))
}

/// Reads and checks the manifest and every member file.
pub fn verify_checkpoint(dir: &Path) -> Result<CheckpointManifest> {
    let manifest_bytes = fs::read(dir.join(MANIFEST_FILE)).map_err(|e| corrupt(dir, format!("manifest unreadable ({})", e)))?;
    let manifest: CheckpointManifest =
        serde_json::from_slice(&manifest_bytes).map_err(|e| corrupt(dir, format!("manifest undecodable ({})", e)))?;
    if manifest.version != CHECKPOINT_VERSION {
        return Err(corrupt(
            dir,
            format!("format version {} (expected {})", manifest.version, CHECKPOINT_VERSION),
        ));
    }
    for member in MEMBERS {
        let expected = manifest
            .files
            .get(member)
            .ok_or_else(|| corrupt(dir, format!("manifest does not list {}", member)))?;
        let bytes = fs::read(dir.join(member)).map_err(|e| corrupt(dir, format!("{} unreadable ({})", member, e)))?;
        let actual = sha256_hex(&bytes);
        if &actual != expected {
            return Err(corrupt(dir, format!("{} digest mismatch", member)));
        }
    }
    Ok(manifest)
}

pub fn load_checkpoint<E: ValueEstimator>(dir: &Path) -> Result<LoadedCheckpoint<E>> {
    let manifest = verify_checkpoint(dir)?;
    let main = E::load(&dir.join(MAIN_FILE)).map_err(|e| corrupt(dir, format!("main estimator ({})", e)))?;
    let target = E::load(&dir.join(TARGET_FILE)).map_err(|e| corrupt(dir, format!("target estimator ({})", e)))?;
    let trainer_bytes = fs::read(dir.join(TRAINER_FILE))?;
    let snapshot: TrainerSnapshot =
        serde_json::from_slice(&trainer_bytes).map_err(|e| corrupt(dir, format!("trainer state ({})", e)))?;

    if main.feature_dim() != target.feature_dim() {
        return Err(corrupt(dir, "main and target estimators disagree on feature width"));
    }
    if snapshot.buffer.len() > snapshot.buffer_capacity {
        return Err(corrupt(dir, "buffer holds more experiences than its capacity"));
    }
    if snapshot.state.current_phase > snapshot.curriculum.len()
        || snapshot.state.current_epoch > snapshot.curriculum.total_epochs()
    {
        return Err(corrupt(dir, "trainer position lies outside the curriculum"));
    }

    debug!(dir = %dir.display(), epoch = snapshot.state.current_epoch, "checkpoint verified");
    Ok(LoadedCheckpoint {
        main,
        target,
        snapshot,
        manifest,
    })
}
