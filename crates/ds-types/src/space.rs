//! Parameter space definitions: the flat slot layout an evaluator expects.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::errors::{ConfigError, DsResult, ModelError};

/// Semantic role of a group of slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotRole {
    Weight,
    Bias,
    /// Free-standing scalars with no matrix interpretation.
    Scalar,
}

/// A named, contiguous group of slots with a matrix shape.
///
/// Data is row-major: row `r` holds `cols` consecutive values, so for a weight
/// group row `r` is the incoming weights of output neuron `r`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterGroup {
    /// Human-readable group name (e.g. "layer1", "encoder").
    pub name: String,
    pub role: SlotRole,
    pub cols: usize,
    pub rows: usize,
    /// Index of the first slot of this group in the flat vector.
    pub offset: usize,
}

impl ParameterGroup {
    pub fn len(&self) -> usize {
        self.cols * self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len()
    }
}

/// The full parameter space: an ordered list of groups.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParameterSpace {
    groups: Vec<ParameterGroup>,
}

impl ParameterSpace {
    pub fn new() -> Self {
        Self { groups: Vec::new() }
    }

    fn push(mut self, name: impl Into<String>, role: SlotRole, cols: usize, rows: usize) -> Self {
        let offset = self.len();
        self.groups.push(ParameterGroup {
            name: name.into(),
            role,
            cols,
            rows,
            offset,
        });
        self
    }

    /// Append a `cols × rows` weight matrix.
    pub fn add_weights(self, name: impl Into<String>, cols: usize, rows: usize) -> Self {
        self.push(name, SlotRole::Weight, cols, rows)
    }

    /// Append a bias vector with one slot per row.
    pub fn add_bias(self, name: impl Into<String>, rows: usize) -> Self {
        self.push(name, SlotRole::Bias, 1, rows)
    }

    /// Append `count` free scalars.
    pub fn add_scalars(self, name: impl Into<String>, count: usize) -> Self {
        self.push(name, SlotRole::Scalar, count, 1)
    }

    /// Convenience for a dense layer: weights plus bias under one name.
    pub fn add_layer(self, name: &str, inputs: usize, outputs: usize) -> Self {
        self.add_weights(name, inputs, outputs).add_bias(name, outputs)
    }

    /// Total number of slots.
    pub fn len(&self) -> usize {
        self.groups.last().map(|g| g.offset + g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn groups(&self) -> &[ParameterGroup] {
        &self.groups
    }

    pub fn group(&self, name: &str, role: SlotRole) -> Option<&ParameterGroup> {
        self.groups.iter().find(|g| g.name == name && g.role == role)
    }

    /// Borrow the values belonging to one group out of a flat vector.
    pub fn slice<'a>(&self, values: &'a [f64], name: &str, role: SlotRole) -> DsResult<&'a [f64]> {
        let group = self
            .group(name, role)
            .ok_or_else(|| ModelError::GroupNotFound {
                name: name.to_string(),
            })?;
        values.get(group.range()).ok_or_else(|| {
            ModelError::Inconsistent {
                values: values.len(),
                space: self.len(),
            }
            .into()
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.is_empty() {
            return Err(ConfigError::EmptySpace);
        }
        for (i, group) in self.groups.iter().enumerate() {
            if group.is_empty() {
                return Err(ConfigError::InvalidGroup {
                    group: group.name.clone(),
                    message: "group has zero slots".to_string(),
                });
            }
            let duplicate = self.groups[..i]
                .iter()
                .any(|g| g.name == group.name && g.role == group.role);
            if duplicate {
                return Err(ConfigError::InvalidGroup {
                    group: group.name.clone(),
                    message: format!("duplicate {:?} group", group.role),
                });
            }
        }
        Ok(())
    }

    /// Partition the slots into correlation blocks.
    ///
    /// Every row of a weight group that has a same-named bias group with a
    /// matching row count becomes one block: that neuron's incoming weights
    /// followed by its bias. Slots not covered by such a pairing are returned
    /// as singleton blocks. Every slot appears in exactly one block.
    pub fn neuron_blocks(&self) -> Vec<Vec<usize>> {
        let mut covered = vec![false; self.len()];
        let mut blocks = Vec::new();

        for weights in self.groups.iter().filter(|g| g.role == SlotRole::Weight) {
            let Some(bias) = self
                .group(&weights.name, SlotRole::Bias)
                .filter(|b| b.rows == weights.rows)
            else {
                continue;
            };
            for row in 0..weights.rows {
                let start = weights.offset + row * weights.cols;
                let mut block: Vec<usize> = (start..start + weights.cols).collect();
                block.push(bias.offset + row);
                for &slot in &block {
                    covered[slot] = true;
                }
                blocks.push(block);
            }
        }

        blocks.extend(
            covered
                .iter()
                .enumerate()
                .filter(|&(_, &c)| !c)
                .map(|(slot, _)| vec![slot]),
        );
        blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_layer() -> ParameterSpace {
        ParameterSpace::new()
            .add_layer("layer1", 4, 3)
            .add_layer("layer2", 6, 2)
    }

    #[test]
    fn offsets_follow_insertion_order() {
        let space = two_layer();
        assert_eq!(space.len(), 4 * 3 + 3 + 6 * 2 + 2);

        let l1b = space.group("layer1", SlotRole::Bias).unwrap();
        assert_eq!(l1b.offset, 12);
        let l2w = space.group("layer2", SlotRole::Weight).unwrap();
        assert_eq!(l2w.range(), 15..27);
    }

    #[test]
    fn slice_reshapes_flat_vector() {
        let space = ParameterSpace::new().add_scalars("a", 2).add_bias("b", 3);
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(space.slice(&values, "b", SlotRole::Bias).unwrap(), &[3.0, 4.0, 5.0]);
        assert!(space.slice(&values, "missing", SlotRole::Bias).is_err());
        assert!(space.slice(&values[..3], "b", SlotRole::Bias).is_err());
    }

    #[test]
    fn validate_rejects_empty_and_duplicates() {
        assert_eq!(ParameterSpace::new().validate(), Err(ConfigError::EmptySpace));

        let dup = ParameterSpace::new().add_bias("x", 2).add_bias("x", 2);
        assert!(matches!(dup.validate(), Err(ConfigError::InvalidGroup { .. })));

        let zero = ParameterSpace::new().add_scalars("a", 1).add_weights("w", 0, 3);
        assert!(matches!(zero.validate(), Err(ConfigError::InvalidGroup { .. })));

        assert!(two_layer().validate().is_ok());
    }

    #[test]
    fn neuron_blocks_pair_rows_with_bias() {
        let space = ParameterSpace::new()
            .add_layer("hidden", 2, 2)
            .add_scalars("extra", 1);
        let blocks = space.neuron_blocks();

        assert_eq!(blocks[0], vec![0, 1, 4]);
        assert_eq!(blocks[1], vec![2, 3, 5]);
        assert_eq!(blocks[2], vec![6]);

        let mut all: Vec<usize> = blocks.into_iter().flatten().collect();
        all.sort_unstable();
        assert_eq!(all, (0..space.len()).collect::<Vec<_>>());
    }
}
