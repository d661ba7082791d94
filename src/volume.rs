//! Dense N-d label and intensity volumes.
//!
//! Volumes are stored row-major with an explicit shape. Two voxels are
//! neighbors when they differ by one along exactly one axis.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ProofreadError, Result};

/// A row-major N-d array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume<T> {
    shape: Vec<usize>,
    data: Vec<T>,
}

/// Fragment labels of an over-segmentation, or ground-truth segment labels.
pub type LabelVolume = Volume<u64>;

/// Intensity image aligned with a label volume.
pub type ImageVolume = Volume<f64>;

impl<T> Volume<T> {
    /// Create a volume, checking that `data` fills `shape` exactly.
    pub fn new(shape: Vec<usize>, data: Vec<T>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if shape.is_empty() || expected != data.len() {
            return Err(ProofreadError::invalid_config(format!(
                "shape {shape:?} expects {expected} values, got {}",
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// An empty volume, used when no intensity image is available.
    pub fn empty() -> Self {
        Self {
            shape: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Row-major stride of each axis.
    fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.shape.len()];
        for axis in (0..self.shape.len().saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * self.shape[axis + 1];
        }
        strides
    }

    /// Visit every unordered pair of face-adjacent voxel indices once.
    ///
    /// Each voxel is paired with its successor along every axis.
    pub fn for_each_face_pair<F: FnMut(usize, usize)>(&self, mut visit: F) {
        let strides = self.strides();
        for index in 0..self.data.len() {
            for (axis, &stride) in strides.iter().enumerate() {
                let coordinate = (index / stride) % self.shape[axis];
                if coordinate + 1 < self.shape[axis] {
                    visit(index, index + stride);
                }
            }
        }
    }
}

impl<T: Serialize + DeserializeOwned> Volume<T> {
    /// Load a volume from a JSON file of the form `{"shape": [..], "data": [..]}`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let raw: Volume<T> = serde_json::from_str(&content)?;
        Volume::new(raw.shape, raw.data)
    }

    /// Save the volume as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }
}

impl LabelVolume {
    /// Sorted distinct labels, excluding `boundary_body`.
    pub fn fragments(&self, boundary_body: u64) -> Vec<u64> {
        self.data
            .iter()
            .copied()
            .filter(|&label| label != boundary_body)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Check that `other` has the same shape as this volume.
    pub fn check_aligned<T>(&self, other: &Volume<T>) -> Result<()> {
        if self.shape != other.shape {
            return Err(ProofreadError::invalid_config(format!(
                "volume shapes differ: {:?} vs {:?}",
                self.shape, other.shape
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_rejected() {
        assert!(LabelVolume::new(vec![2, 2], vec![1, 2, 3]).is_err());
        assert!(LabelVolume::new(vec![], vec![]).is_err());
        assert!(LabelVolume::new(vec![2, 2], vec![1, 2, 3, 4]).is_ok());
    }

    #[test]
    fn test_face_pairs_2d() {
        let volume = LabelVolume::new(vec![2, 3], vec![0; 6]).unwrap();
        let mut pairs = Vec::new();
        volume.for_each_face_pair(|a, b| pairs.push((a, b)));
        pairs.sort();
        // 2 rows x 2 horizontal pairs + 3 vertical pairs
        assert_eq!(pairs, vec![(0, 1), (0, 3), (1, 2), (1, 4), (2, 5), (3, 4), (4, 5)]);
    }

    #[test]
    fn test_fragments_exclude_boundary() {
        let volume = LabelVolume::new(vec![5], vec![3, 0, 1, 3, 2]).unwrap();
        assert_eq!(volume.fragments(0), vec![1, 2, 3]);
        assert_eq!(volume.fragments(9), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.json");
        let volume = LabelVolume::new(vec![1, 4], vec![1, 2, 3, 4]).unwrap();
        volume.save(&path).unwrap();
        assert_eq!(LabelVolume::load(&path).unwrap(), volume);
    }
}
