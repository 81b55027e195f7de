//! Persisted model state for inference-only reload.
//!
//! A snapshot carries the parameter space alongside the flat values so a
//! loader can reshape groups exactly as the evaluator laid them out.
//! Encoding is bincode, which round-trips `f64` bit patterns exactly.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::candidate::Candidate;
use crate::errors::{DsResult, ModelError};
use crate::space::{ParameterSpace, SlotRole};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub space: ParameterSpace,
    pub values: Vec<f64>,
    pub loss: f64,
    /// Generation at which this candidate was accepted.
    pub generation: usize,
}

impl ModelSnapshot {
    pub fn new(space: ParameterSpace, candidate: &Candidate, generation: usize) -> DsResult<Self> {
        let snapshot = Self {
            space,
            values: candidate.values.clone(),
            loss: candidate.loss,
            generation,
        };
        snapshot.check()?;
        Ok(snapshot)
    }

    fn check(&self) -> DsResult<()> {
        if self.values.len() != self.space.len() {
            return Err(ModelError::Inconsistent {
                values: self.values.len(),
                space: self.space.len(),
            }
            .into());
        }
        Ok(())
    }

    pub fn candidate(&self) -> Candidate {
        Candidate {
            values: self.values.clone(),
            loss: self.loss,
        }
    }

    pub fn group(&self, name: &str, role: SlotRole) -> DsResult<&[f64]> {
        self.space.slice(&self.values, name, role)
    }

    pub fn to_bytes(&self) -> DsResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| ModelError::Encode(e.to_string()).into())
    }

    pub fn from_bytes(bytes: &[u8]) -> DsResult<Self> {
        let snapshot: Self =
            bincode::deserialize(bytes).map_err(|e| ModelError::Decode(e.to_string()))?;
        snapshot.check()?;
        Ok(snapshot)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> DsResult<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        bincode::serialize_into(&mut writer, self)
            .map_err(|e| ModelError::Encode(e.to_string()))?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> DsResult<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let snapshot: Self =
            bincode::deserialize_from(reader).map_err(|e| ModelError::Decode(e.to_string()))?;
        snapshot.check()?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DsError;

    fn sample_snapshot() -> ModelSnapshot {
        let space = ParameterSpace::new().add_layer("encoder", 3, 2);
        let candidate = Candidate {
            values: vec![0.1, -2.5, 1e-300, f64::MAX, -0.0, 3.25, 7.0, -7.0],
            loss: 0.125,
        };
        ModelSnapshot::new(space, &candidate, 42).unwrap()
    }

    #[test]
    fn file_round_trip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");

        let snapshot = sample_snapshot();
        snapshot.save(&path).unwrap();
        let loaded = ModelSnapshot::load(&path).unwrap();

        assert_eq!(loaded, snapshot);
        for (a, b) in loaded.values.iter().zip(&snapshot.values) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        assert_eq!(loaded.group("encoder", SlotRole::Bias).unwrap(), &[7.0, -7.0]);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let space = ParameterSpace::new().add_scalars("x", 3);
        let result = ModelSnapshot::new(space, &Candidate::new(vec![1.0]), 0);
        assert!(matches!(
            result,
            Err(DsError::Model(ModelError::Inconsistent { values: 1, space: 3 }))
        ));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let result = ModelSnapshot::from_bytes(&[1, 2, 3]);
        assert!(matches!(result, Err(DsError::Model(ModelError::Decode(_)))));

        let bytes = sample_snapshot().to_bytes().unwrap();
        assert_eq!(ModelSnapshot::from_bytes(&bytes).unwrap(), sample_snapshot());
    }
}
