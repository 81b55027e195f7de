//! Two-layer classifier: inputs → hidden (split rectification) → outputs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use ds_types::{ConfigError, DsResult, Evaluator, ParameterSpace, SlotRole};

use crate::matrix::Matrix;

const HIDDEN: &str = "hidden";
const OUTPUT: &str = "output";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledSample {
    pub features: Vec<f64>,
    pub label: usize,
}

/// A labelled classification dataset with a fixed feature width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub samples: Vec<LabeledSample>,
    /// Class names, indexed by label.
    pub classes: Vec<String>,
}

impl Dataset {
    pub fn new(samples: Vec<LabeledSample>, classes: Vec<String>) -> Result<Self, ConfigError> {
        let Some(first) = samples.first() else {
            return Err(ConfigError::InvalidDataset {
                message: "dataset has no samples".to_string(),
            });
        };
        let width = first.features.len();
        if width == 0 {
            return Err(ConfigError::InvalidDataset {
                message: "samples have no features".to_string(),
            });
        }
        for (i, sample) in samples.iter().enumerate() {
            if sample.features.len() != width {
                return Err(ConfigError::InvalidDataset {
                    message: format!(
                        "sample {i} has {} features, expected {width}",
                        sample.features.len()
                    ),
                });
            }
            if sample.label >= classes.len() {
                return Err(ConfigError::InvalidDataset {
                    message: format!("sample {i} has unknown label {}", sample.label),
                });
            }
        }
        Ok(Self { samples, classes })
    }

    /// The four XOR points, classes "0" and "1".
    pub fn xor() -> Self {
        let samples = [([0.0, 0.0], 0), ([0.0, 1.0], 1), ([1.0, 0.0], 1), ([1.0, 1.0], 0)]
            .into_iter()
            .map(|(features, label)| LabeledSample {
                features: features.to_vec(),
                label,
            })
            .collect();
        Self {
            samples,
            classes: vec!["0".to_string(), "1".to_string()],
        }
    }

    /// Load a CSV whose last column is the class name and whose other columns
    /// are numeric features. Class indices follow first appearance.
    pub fn load_csv<P: AsRef<Path>>(path: P, has_headers: bool) -> DsResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::DatasetNotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        info!("Loading dataset from: {}", path.display());

        let invalid = |message: String| ConfigError::InvalidDataset { message };
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(has_headers)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| invalid(format!("failed to open {}: {e}", path.display())))?;

        let mut classes: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut samples = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|e| invalid(format!("record {}: {e}", line + 1)))?;
            if record.len() < 2 {
                let message = format!("record {} has fewer than two columns", line + 1);
                return Err(invalid(message).into());
            }
            let (label_field, feature_fields) = (&record[record.len() - 1], record.len() - 1);
            let features = (0..feature_fields)
                .map(|i| {
                    record[i]
                        .parse::<f64>()
                        .map_err(|e| invalid(format!("record {} column {i}: {e}", line + 1)))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let label = *index.entry(label_field.to_string()).or_insert_with(|| {
                classes.push(label_field.to_string());
                classes.len() - 1
            });
            samples.push(LabeledSample { features, label });
        }

        let dataset = Self::new(samples, classes)?.normalized();
        info!(
            samples = dataset.samples.len(),
            classes = dataset.classes.len(),
            "Loaded dataset"
        );
        Ok(dataset)
    }

    /// Every feature row scaled to unit length.
    pub fn normalized(mut self) -> Self {
        for sample in &mut self.samples {
            let features = std::mem::take(&mut sample.features);
            sample.features = Matrix::row(features).normalize().data;
        }
        self
    }

    pub fn features(&self) -> usize {
        self.samples.first().map_or(0, |s| s.features.len())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Classifier evaluator; loss is the summed squared error against one-hot
/// labels over the whole dataset.
#[derive(Debug, Clone)]
pub struct FeedForward {
    dataset: Dataset,
    hidden: usize,
    space: ParameterSpace,
}

impl FeedForward {
    pub fn new(dataset: Dataset, hidden: usize) -> Result<Self, ConfigError> {
        if hidden == 0 {
            return Err(ConfigError::Invalid {
                message: "hidden layer width must be positive".to_string(),
            });
        }
        let space = ParameterSpace::new()
            .add_layer(HIDDEN, dataset.features(), hidden)
            .add_layer(OUTPUT, 2 * hidden, dataset.classes.len());
        Ok(Self {
            dataset,
            hidden,
            space,
        })
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn hidden(&self) -> usize {
        self.hidden
    }

    /// Raw output scores for one feature vector.
    pub fn forward(&self, parameters: &[f64], features: &[f64]) -> DsResult<Matrix> {
        let layer = |name: &str, cols: usize, rows: usize| -> DsResult<(Matrix, Matrix)> {
            let weights = self.space.slice(parameters, name, SlotRole::Weight)?;
            let bias = self.space.slice(parameters, name, SlotRole::Bias)?;
            Ok((
                Matrix::new(cols, rows, weights.to_vec())?,
                Matrix::row(bias.to_vec()),
            ))
        };
        let (w1, b1) = layer(HIDDEN, self.dataset.features(), self.hidden)?;
        let (w2, b2) = layer(OUTPUT, 2 * self.hidden, self.dataset.classes.len())?;

        let input = Matrix::row(features.to_vec());
        let hidden = w1.mul_t(&input)?.add(&b1)?.everett();
        w2.mul_t(&hidden)?.add(&b2)
    }

    /// Fraction of samples whose highest output is their label.
    pub fn accuracy(&self, parameters: &[f64]) -> DsResult<f64> {
        let mut correct = 0usize;
        for sample in &self.dataset.samples {
            if self.forward(parameters, &sample.features)?.argmax() == sample.label {
                correct += 1;
            }
        }
        debug!(correct, total = self.dataset.len(), "accuracy computed");
        Ok(correct as f64 / self.dataset.len() as f64)
    }
}

impl Evaluator for FeedForward {
    fn space(&self) -> &ParameterSpace {
        &self.space
    }

    fn evaluate(&self, parameters: &[f64]) -> DsResult<f64> {
        let mut loss = 0.0;
        for sample in &self.dataset.samples {
            let output = self.forward(parameters, &sample.features)?;
            for (class, value) in output.data.iter().enumerate() {
                let expected = if class == sample.label { 1.0 } else { 0.0 };
                loss += (value - expected) * (value - expected);
            }
        }
        Ok(loss)
    }

    fn name(&self) -> &str {
        "feedforward"
    }
}
