//! Attention-based byte model.
//!
//! Each byte is encoded with split rectification and projected into query,
//! key and value vectors. Queries and values are written into a rolling
//! context of `context` slots; the key attends over that context and a
//! Taylor-softmax decoder predicts the next byte.

use serde::{Deserialize, Serialize};
use std::path::Path;

use ds_types::{ConfigError, DsResult, Evaluator, ModelSnapshot, ParameterSpace, SlotRole};

use crate::encdec::{draw_window_starts, one_hot_error, read_corpus, VOCABULARY};
use crate::matrix::Matrix;

const ENCODER: &str = "encoder";
const QUERY: &str = "query";
const KEY: &str = "key";
const VALUE: &str = "value";
const DECODER: &str = "decoder";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrnnShape {
    /// Width of the encoded byte and of every projection.
    pub width: usize,
    /// Slots in the rolling attention context.
    pub context: usize,
    /// Bytes per scoring window.
    pub window: usize,
    /// Number of scoring windows drawn from the corpus.
    pub windows: usize,
    pub seed: u64,
}

impl Default for TrnnShape {
    fn default() -> Self {
        Self {
            width: 32,
            context: 256,
            window: 64,
            windows: 16,
            seed: 1,
        }
    }
}

impl TrnnShape {
    pub fn space(&self) -> ParameterSpace {
        let w = self.width;
        ParameterSpace::new()
            .add_layer(ENCODER, VOCABULARY, w)
            .add_weights(QUERY, 2 * w, w)
            .add_weights(KEY, 2 * w, w)
            .add_weights(VALUE, 2 * w, w)
            .add_layer(DECODER, w, VOCABULARY)
    }
}

/// Rolling context of past queries and values.
struct Context {
    queries: Matrix,
    values: Matrix,
    next: usize,
}

/// Weights of one candidate, reshaped for inference.
#[derive(Debug, Clone)]
pub struct AttentionModel {
    width: usize,
    context: usize,
    encoder_weights: Matrix,
    encoder_bias: Matrix,
    query: Matrix,
    key: Matrix,
    value: Matrix,
    decoder_weights: Matrix,
    decoder_bias: Matrix,
}

impl AttentionModel {
    /// Whether `space` has the layout of an attention model.
    pub fn fits(space: &ParameterSpace) -> bool {
        [QUERY, KEY, VALUE]
            .iter()
            .all(|name| space.group(name, SlotRole::Weight).is_some())
    }

    pub fn from_parameters(
        space: &ParameterSpace,
        parameters: &[f64],
        context: usize,
    ) -> DsResult<Self> {
        if context == 0 {
            return Err(ConfigError::Invalid {
                message: "attention context must have at least one slot".to_string(),
            }
            .into());
        }
        let width = space
            .group(ENCODER, SlotRole::Bias)
            .map(|g| g.rows)
            .unwrap_or(0);
        let weights = |name: &str, cols: usize, rows: usize| -> DsResult<Matrix> {
            Matrix::new(cols, rows, space.slice(parameters, name, SlotRole::Weight)?.to_vec())
        };
        let bias = |name: &str| -> DsResult<Matrix> {
            Ok(Matrix::row(space.slice(parameters, name, SlotRole::Bias)?.to_vec()))
        };
        Ok(Self {
            width,
            context,
            encoder_weights: weights(ENCODER, VOCABULARY, width)?,
            encoder_bias: bias(ENCODER)?,
            query: weights(QUERY, 2 * width, width)?,
            key: weights(KEY, 2 * width, width)?,
            value: weights(VALUE, 2 * width, width)?,
            decoder_weights: weights(DECODER, width, VOCABULARY)?,
            decoder_bias: bias(DECODER)?,
        })
    }

    pub fn from_snapshot(snapshot: &ModelSnapshot, context: usize) -> DsResult<Self> {
        Self::from_parameters(&snapshot.space, &snapshot.values, context)
    }

    fn empty_context(&self) -> Context {
        Context {
            queries: Matrix::zeros(self.width, self.context),
            values: Matrix::zeros(self.width, self.context),
            next: 0,
        }
    }

    /// Feed one byte; returns the next-byte distribution.
    fn step(&self, context: &mut Context, symbol: u8) -> DsResult<Matrix> {
        let mut input = vec![0.0; VOCABULARY];
        input[symbol as usize] = 1.0;
        let encoded = self
            .encoder_weights
            .mul_t(&Matrix::row(input))?
            .add(&self.encoder_bias)?
            .everett();

        let query = self.query.mul_t(&encoded)?;
        let key = self.key.mul_t(&encoded)?;
        let value = self.value.mul_t(&encoded)?;
        let slot = context.next * self.width..(context.next + 1) * self.width;
        context.queries.data[slot.clone()].copy_from_slice(&query.data);
        context.values.data[slot].copy_from_slice(&value.data);
        context.next = (context.next + 1) % self.context;

        let attended = Matrix::self_attention(&context.queries, &key, &context.values)?;
        Ok(self
            .decoder_weights
            .mul_t(&attended)?
            .add(&self.decoder_bias)?
            .taylor_softmax())
    }

    fn sequence_loss(&self, data: &[u8]) -> DsResult<f64> {
        let mut context = self.empty_context();
        let mut loss = 0.0;
        for pair in data.windows(2) {
            let predicted = self.step(&mut context, pair[0])?;
            loss += one_hot_error(&predicted.data, pair[1]);
        }
        Ok(loss)
    }

    /// Feed `prompt`, then greedily emit `length` bytes.
    pub fn generate(&self, prompt: &[u8], length: usize) -> DsResult<Vec<u8>> {
        let mut context = self.empty_context();
        let mut next = 0;
        for &symbol in prompt {
            next = self.step(&mut context, symbol)?.argmax() as u8;
        }

        let mut generated = Vec::with_capacity(length);
        for _ in 0..length {
            generated.push(next);
            next = self.step(&mut context, next)?.argmax() as u8;
        }
        Ok(generated)
    }
}

/// Next-byte prediction with the attention model over fixed corpus windows.
#[derive(Debug, Clone)]
pub struct TransformerRnn {
    corpus: Vec<u8>,
    shape: TrnnShape,
    starts: Vec<usize>,
    space: ParameterSpace,
}

impl TransformerRnn {
    pub fn new(corpus: Vec<u8>, shape: TrnnShape) -> Result<Self, ConfigError> {
        if shape.width == 0 || shape.context == 0 {
            return Err(ConfigError::Invalid {
                message: "attention model needs a positive width and context".to_string(),
            });
        }
        let starts = draw_window_starts(corpus.len(), shape.window, shape.windows, shape.seed)?;
        Ok(Self {
            corpus,
            space: shape.space(),
            shape,
            starts,
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P, shape: TrnnShape) -> DsResult<Self> {
        Ok(Self::new(read_corpus(path.as_ref())?, shape)?)
    }

    pub fn shape(&self) -> &TrnnShape {
        &self.shape
    }
}

impl Evaluator for TransformerRnn {
    fn space(&self) -> &ParameterSpace {
        &self.space
    }

    fn evaluate(&self, parameters: &[f64]) -> DsResult<f64> {
        let model = AttentionModel::from_parameters(&self.space, parameters, self.shape.context)?;
        let mut loss = 0.0;
        for &start in &self.starts {
            loss += model.sequence_loss(&self.corpus[start..start + self.shape.window])?;
        }
        let predictions = self.starts.len() * (self.shape.window - 1);
        Ok(loss / predictions as f64)
    }

    fn name(&self) -> &str {
        "trnn"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_shape() -> TrnnShape {
        TrnnShape {
            width: 3,
            context: 4,
            window: 6,
            windows: 2,
            seed: 5,
        }
    }

    fn corpus() -> Vec<u8> {
        b"attention is all you need, or so they say".to_vec()
    }

    #[test]
    fn space_has_projection_groups() {
        let task = TransformerRnn::new(corpus(), small_shape()).unwrap();
        let space = task.space();
        assert_eq!(space.len(), 256 * 3 + 3 + 3 * (6 * 3) + 3 * 256 + 256);
        assert!(AttentionModel::fits(space));
        assert!(!AttentionModel::fits(&crate::EncDecShape::default().space()));
    }

    #[test]
    fn zero_model_predicts_uniformly() {
        let task = TransformerRnn::new(corpus(), small_shape()).unwrap();
        let loss = task.evaluate(&vec![0.0; task.space().len()]).unwrap();
        // Every prediction is 1/256 per symbol.
        let expected = (1.0 - 1.0 / 256.0) / 256.0;
        assert!((loss - expected).abs() < 1e-12, "loss = {loss}");
    }

    #[test]
    fn context_wraps_around() {
        let shape = small_shape();
        let space = shape.space();
        let parameters: Vec<f64> = (0..space.len())
            .map(|i| ((i % 7) as f64 - 3.0) / 10.0)
            .collect();
        let model = AttentionModel::from_parameters(&space, &parameters, shape.context).unwrap();

        let mut context = model.empty_context();
        for (i, &symbol) in b"abcdef".iter().enumerate() {
            let predicted = model.step(&mut context, symbol).unwrap();
            assert_eq!(predicted.data.len(), VOCABULARY);
            assert!((predicted.data.iter().sum::<f64>() - 1.0).abs() < 1e-9);
            assert_eq!(context.next, (i + 1) % shape.context);
        }
    }

    #[test]
    fn generation_follows_decoder_bias() {
        let shape = small_shape();
        let space = shape.space();
        let mut parameters = vec![0.0; space.len()];
        let bias = space.group("decoder", SlotRole::Bias).unwrap();
        parameters[bias.offset + b'z' as usize] = 2.0;

        let model = AttentionModel::from_parameters(&space, &parameters, shape.context).unwrap();
        assert_eq!(model.generate(b"hi", 3).unwrap(), b"zzz".to_vec());
        assert_eq!(model.generate(b"", 2).unwrap(), vec![0, b'z']);
    }

    #[test]
    fn snapshot_reload_rebuilds_model() {
        let space = small_shape().space();
        let candidate = ds_types::Candidate::new(vec![0.01; space.len()]);
        let snapshot = ModelSnapshot::new(space, &candidate, 0).unwrap();
        let model = AttentionModel::from_snapshot(&snapshot, 4).unwrap();
        assert_eq!(model.generate(b"x", 4).unwrap().len(), 4);
        assert!(AttentionModel::from_snapshot(&snapshot, 0).is_err());
    }

    #[test]
    fn invalid_shapes_are_rejected() {
        let mut shape = small_shape();
        shape.context = 0;
        assert!(TransformerRnn::new(corpus(), shape).is_err());
        assert!(matches!(
            TransformerRnn::new(b"tiny".to_vec(), small_shape()),
            Err(ConfigError::InvalidDataset { .. })
        ));
    }
}
