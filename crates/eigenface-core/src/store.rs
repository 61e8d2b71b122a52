//! On-disk model store.
//!
//! A model directory holds two files:
//!
//! ```text
//! manifest.json   format version, id, timestamp, labels, array shapes, payload digest
//! arrays.bin      little-endian f64: mean, eigenfaces, eigenvalues, projected, training
//! ```
//!
//! The payload is written first and the manifest is renamed into place last.
//! `load` verifies the SHA-256 digest and every shape before returning, so a
//! torn write surfaces as `CorruptModel`, never as a usable model.

use crate::error::{EigenfaceError, Result};
use crate::types::TrainedModel;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const MANIFEST_FILE: &str = "manifest.json";
const PAYLOAD_FILE: &str = "arrays.bin";
const FORMAT_VERSION: u32 = 1;
const F64_BYTES: usize = std::mem::size_of::<f64>();

const MEAN_FACE: &str = "mean_face";
const EIGENFACES: &str = "eigenfaces";
const EIGENVALUES: &str = "eigenvalues";
const PROJECTED: &str = "projected";
const TRAINING: &str = "training";

/// Location and shape of one array inside the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayEntry {
    pub name: String,
    /// `[rows, cols]`; vectors are stored as a single column.
    pub shape: [usize; 2],
    /// Offset into the payload, in `f64` elements.
    pub offset: usize,
}

/// Model metadata stored next to the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelManifest {
    pub format_version: u32,
    pub model_id: String,
    /// RFC 3339 timestamp of the save.
    pub created_at: String,
    pub engine_version: String,
    pub dimension: usize,
    pub image_count: usize,
    pub eigenface_count: usize,
    pub labels: Vec<String>,
    pub arrays: Vec<ArrayEntry>,
    pub payload_sha256: String,
}

impl ModelManifest {
    /// Number of distinct people.
    pub fn label_count(&self) -> usize {
        self.labels.iter().collect::<std::collections::BTreeSet<_>>().len()
    }
}

/// Persist `model` into directory `dir`, creating it if needed.
pub fn save(model: &TrainedModel, dir: &Path) -> Result<ModelManifest> {
    fs::create_dir_all(dir)?;

    let mut payload: Vec<u8> = Vec::new();
    let mut arrays = Vec::new();
    let sections: [(&str, ArrayView2<'_, f64>); 5] = [
        (MEAN_FACE, model.mean_face().insert_axis(Axis(1))),
        (EIGENFACES, model.eigenfaces()),
        (EIGENVALUES, model.eigenvalues().insert_axis(Axis(1))),
        (PROJECTED, model.projected()),
        (TRAINING, model.training()),
    ];
    for (name, array) in sections {
        arrays.push(ArrayEntry {
            name: name.to_string(),
            shape: [array.nrows(), array.ncols()],
            offset: payload.len() / F64_BYTES,
        });
        // Logical (row-major) order regardless of memory layout.
        for value in array.iter() {
            payload.extend_from_slice(&value.to_le_bytes());
        }
    }

    let manifest = ModelManifest {
        format_version: FORMAT_VERSION,
        model_id: uuid::Uuid::new_v4().to_string(),
        created_at: chrono::Utc::now().to_rfc3339(),
        engine_version: env!("CARGO_PKG_VERSION").to_string(),
        dimension: model.dimension(),
        image_count: model.image_count(),
        eigenface_count: model.eigenface_count(),
        labels: model.labels().to_vec(),
        arrays,
        payload_sha256: format!("{:x}", Sha256::digest(&payload)),
    };

    write_atomic(&dir.join(PAYLOAD_FILE), &payload)?;
    write_atomic(&dir.join(MANIFEST_FILE), &serde_json::to_vec_pretty(&manifest)?)?;

    tracing::info!(
        dir = %dir.display(),
        model_id = %manifest.model_id,
        bytes = payload.len(),
        "model saved"
    );
    Ok(manifest)
}

/// Read only the manifest of the model in `dir`.
pub fn read_manifest(dir: &Path) -> Result<ModelManifest> {
    if !dir.is_dir() {
        return Err(EigenfaceError::ModelNotFound(dir.to_path_buf()));
    }
    let bytes = read_artifact(&dir.join(MANIFEST_FILE))?;
    let manifest: ModelManifest = serde_json::from_slice(&bytes)
        .map_err(|e| EigenfaceError::CorruptModel(format!("unreadable manifest: {e}")))?;
    if manifest.format_version != FORMAT_VERSION {
        return Err(EigenfaceError::CorruptModel(format!(
            "unsupported format version {} (expected {FORMAT_VERSION})",
            manifest.format_version
        )));
    }
    Ok(manifest)
}

/// Load and fully validate the model in `dir`.
pub fn load(dir: &Path) -> Result<TrainedModel> {
    let manifest = read_manifest(dir)?;
    let payload = read_artifact(&dir.join(PAYLOAD_FILE))?;

    let digest = format!("{:x}", Sha256::digest(&payload));
    if digest != manifest.payload_sha256 {
        return Err(EigenfaceError::CorruptModel(format!(
            "payload digest mismatch: manifest {}, payload {digest}",
            manifest.payload_sha256
        )));
    }
    if payload.len() % F64_BYTES != 0 {
        return Err(EigenfaceError::CorruptModel(format!(
            "payload length {} is not a multiple of {F64_BYTES}",
            payload.len()
        )));
    }
    let values: Vec<f64> = payload
        .chunks_exact(F64_BYTES)
        .map(|chunk| {
            let mut bytes = [0u8; F64_BYTES];
            bytes.copy_from_slice(chunk);
            f64::from_le_bytes(bytes)
        })
        .collect();

    let mean_face = vector(&manifest, &values, MEAN_FACE)?;
    let eigenfaces = matrix(&manifest, &values, EIGENFACES)?;
    let eigenvalues = vector(&manifest, &values, EIGENVALUES)?;
    let projected = matrix(&manifest, &values, PROJECTED)?;
    let training = matrix(&manifest, &values, TRAINING)?;

    let model = TrainedModel::from_parts(
        mean_face,
        eigenfaces,
        eigenvalues,
        projected,
        training,
        manifest.labels.clone(),
    )?;

    let declared = (manifest.dimension, manifest.image_count, manifest.eigenface_count);
    let actual = (model.dimension(), model.image_count(), model.eigenface_count());
    if declared != actual {
        return Err(EigenfaceError::CorruptModel(format!(
            "manifest declares (D, N, K) = {declared:?}, arrays hold {actual:?}"
        )));
    }

    tracing::info!(
        dir = %dir.display(),
        model_id = %manifest.model_id,
        images = model.image_count(),
        eigenfaces = model.eigenface_count(),
        "model loaded"
    );
    Ok(model)
}

fn read_artifact(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => EigenfaceError::ModelNotFound(path.to_path_buf()),
        _ => EigenfaceError::Io(e),
    })
}

/// Write through a sibling temp file so readers never see a partial file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = PathBuf::from(path);
    tmp.set_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn slice<'a>(manifest: &ModelManifest, values: &'a [f64], name: &str) -> Result<(&'a [f64], [usize; 2])> {
    let entry = manifest
        .arrays
        .iter()
        .find(|a| a.name == name)
        .ok_or_else(|| EigenfaceError::CorruptModel(format!("manifest lists no `{name}` array")))?;
    let [rows, cols] = entry.shape;
    let len = rows
        .checked_mul(cols)
        .ok_or_else(|| EigenfaceError::CorruptModel(format!("`{name}` shape overflows")))?;
    let end = entry
        .offset
        .checked_add(len)
        .filter(|&end| end <= values.len())
        .ok_or_else(|| {
            EigenfaceError::CorruptModel(format!(
                "`{name}` ({rows}x{cols} at {}) runs past the payload ({} values)",
                entry.offset,
                values.len()
            ))
        })?;
    Ok((&values[entry.offset..end], entry.shape))
}

fn matrix(manifest: &ModelManifest, values: &[f64], name: &str) -> Result<Array2<f64>> {
    let (data, [rows, cols]) = slice(manifest, values, name)?;
    Array2::from_shape_vec((rows, cols), data.to_vec())
        .map_err(|e| EigenfaceError::CorruptModel(format!("`{name}`: {e}")))
}

fn vector(manifest: &ModelManifest, values: &[f64], name: &str) -> Result<Array1<f64>> {
    let (data, [_, cols]) = slice(manifest, values, name)?;
    if cols != 1 {
        return Err(EigenfaceError::CorruptModel(format!(
            "`{name}` must be a single column, got {cols}"
        )));
    }
    Ok(Array1::from(data.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("eigenface-store-{}", uuid::Uuid::new_v4()))
    }

    fn model() -> TrainedModel {
        TrainedModel::from_parts(
            array![0.1, 0.2, 0.3],
            array![[0.6, 0.0], [0.8, 0.0], [0.0, 1.0]],
            array![4.25, 1.0 / 3.0],
            array![[1.5, -1.5], [0.25, -0.25]],
            array![[0.9, -0.7], [1.3, -0.9], [0.55, 0.05]],
            vec!["ana".into(), "budi".into()],
        )
        .unwrap()
    }

    #[test]
    fn test_round_trip_is_bit_exact() {
        let dir = scratch_dir();
        let original = model();
        let manifest = save(&original, &dir).unwrap();
        assert_eq!(manifest.eigenface_count, 2);
        assert_eq!(manifest.label_count(), 2);

        let loaded = load(&dir).unwrap();
        assert_eq!(loaded, original);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_directory() {
        let err = load(&scratch_dir()).unwrap_err();
        assert!(matches!(err, EigenfaceError::ModelNotFound(_)));
    }

    #[test]
    fn test_missing_payload() {
        let dir = scratch_dir();
        save(&model(), &dir).unwrap();
        fs::remove_file(dir.join(PAYLOAD_FILE)).unwrap();
        assert!(matches!(load(&dir), Err(EigenfaceError::ModelNotFound(_))));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_tampered_payload_is_corrupt() {
        let dir = scratch_dir();
        save(&model(), &dir).unwrap();
        let path = dir.join(PAYLOAD_FILE);
        let mut bytes = fs::read(&path).unwrap();
        bytes[3] ^= 0xff;
        fs::write(&path, bytes).unwrap();
        assert!(matches!(load(&dir), Err(EigenfaceError::CorruptModel(_))));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_inconsistent_shapes_are_corrupt() {
        let dir = scratch_dir();
        save(&model(), &dir).unwrap();

        // Drop one label: projected columns no longer match the label count.
        let mut manifest = read_manifest(&dir).unwrap();
        manifest.labels.pop();
        fs::write(dir.join(MANIFEST_FILE), serde_json::to_vec(&manifest).unwrap()).unwrap();

        match load(&dir) {
            Err(EigenfaceError::CorruptModel(msg)) => assert!(msg.contains("label count"), "{msg}"),
            other => panic!("expected CorruptModel, got {other:?}"),
        }
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_garbage_manifest_is_corrupt() {
        let dir = scratch_dir();
        save(&model(), &dir).unwrap();
        fs::write(dir.join(MANIFEST_FILE), b"{ not json").unwrap();
        assert!(matches!(load(&dir), Err(EigenfaceError::CorruptModel(_))));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_resave_replaces_previous_model() {
        let dir = scratch_dir();
        let first = save(&model(), &dir).unwrap();
        let second = save(&model(), &dir).unwrap();
        assert_ne!(first.model_id, second.model_id);
        assert_eq!(read_manifest(&dir).unwrap().model_id, second.model_id);
        assert!(!dir.join("manifest.tmp").exists());
        fs::remove_dir_all(&dir).unwrap();
    }
}
