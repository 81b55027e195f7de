//! Recurrent byte model: a step-activated encoder carries state across the
//! input, and a linear decoder predicts the next byte from it.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use ds_types::{
    internal_error, ConfigError, DsResult, Evaluator, ModelError, ModelSnapshot, ParameterSpace,
    SlotRole,
};

use crate::matrix::Matrix;

/// Symbols are bytes.
pub const VOCABULARY: usize = 256;

const ENCODER: &str = "encoder";
const DECODER: &str = "decoder";

/// Model width and how the corpus is sampled for scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncDecShape {
    /// Width of the recurrent state.
    pub hidden: usize,
    /// Bytes per scoring window.
    pub window: usize,
    /// Number of scoring windows drawn from the corpus.
    pub windows: usize,
    /// Seed for choosing window positions.
    pub seed: u64,
}

impl Default for EncDecShape {
    fn default() -> Self {
        Self {
            hidden: 32,
            window: 64,
            windows: 16,
            seed: 1,
        }
    }
}

impl EncDecShape {
    pub fn space(&self) -> ParameterSpace {
        ParameterSpace::new()
            .add_layer(ENCODER, self.hidden + VOCABULARY, self.hidden)
            .add_layer(DECODER, self.hidden, VOCABULARY)
    }
}

/// Weights of one candidate, reshaped for inference.
#[derive(Debug, Clone)]
pub struct ByteModel {
    hidden: usize,
    encoder_weights: Matrix,
    encoder_bias: Matrix,
    decoder_weights: Matrix,
    decoder_bias: Matrix,
}

impl ByteModel {
    pub fn from_parameters(space: &ParameterSpace, parameters: &[f64]) -> DsResult<Self> {
        let encoder = space
            .group(ENCODER, SlotRole::Weight)
            .ok_or_else(|| ModelError::GroupNotFound {
                name: ENCODER.to_string(),
            })?;
        let hidden = encoder.rows;
        if encoder.cols != hidden + VOCABULARY {
            return Err(internal_error!(
                "encoder has {} inputs, expected {}",
                encoder.cols,
                hidden + VOCABULARY
            ));
        }
        let weights = |name: &str, cols: usize, rows: usize| -> DsResult<Matrix> {
            Matrix::new(cols, rows, space.slice(parameters, name, SlotRole::Weight)?.to_vec())
        };
        let bias = |name: &str| -> DsResult<Matrix> {
            Ok(Matrix::row(space.slice(parameters, name, SlotRole::Bias)?.to_vec()))
        };
        Ok(Self {
            hidden,
            encoder_weights: weights(ENCODER, hidden + VOCABULARY, hidden)?,
            encoder_bias: bias(ENCODER)?,
            decoder_weights: weights(DECODER, hidden, VOCABULARY)?,
            decoder_bias: bias(DECODER)?,
        })
    }

    pub fn from_snapshot(snapshot: &ModelSnapshot) -> DsResult<Self> {
        Self::from_parameters(&snapshot.space, &snapshot.values)
    }

    fn initial_state(&self) -> Vec<f64> {
        vec![0.0; self.hidden + VOCABULARY]
    }

    /// Feed one byte; returns the decoder scores for the next byte.
    fn step(&self, state: &mut [f64], symbol: u8) -> DsResult<Matrix> {
        let input = &mut state[self.hidden..];
        input.iter_mut().for_each(|v| *v = -1.0);
        input[symbol as usize] = 1.0;

        let output = self
            .encoder_weights
            .mul_t(&Matrix::row(state.to_vec()))?
            .add(&self.encoder_bias)?
            .step();
        state[..self.hidden].copy_from_slice(&output.data);
        self.decoder_weights.mul_t(&output)?.add(&self.decoder_bias)
    }

    /// Mean squared error of the next-byte prediction over one sequence.
    fn sequence_loss(&self, data: &[u8]) -> DsResult<f64> {
        let mut state = self.initial_state();
        let mut loss = 0.0;
        for pair in data.windows(2) {
            let predicted = self.step(&mut state, pair[0])?;
            loss += one_hot_error(&predicted.data, pair[1]);
        }
        Ok(loss)
    }

    /// Feed `prompt`, then greedily emit `length` bytes.
    pub fn generate(&self, prompt: &[u8], length: usize) -> DsResult<Vec<u8>> {
        let mut state = self.initial_state();
        let mut scores = None;
        for &symbol in prompt {
            scores = Some(self.step(&mut state, symbol)?);
        }
        let mut next = match scores {
            Some(scores) => scores.argmax() as u8,
            None => 0,
        };

        let mut generated = Vec::with_capacity(length);
        for _ in 0..length {
            generated.push(next);
            next = self.step(&mut state, next)?.argmax() as u8;
        }
        Ok(generated)
    }
}

/// Mean squared error of `predicted` against the one-hot encoding of `target`.
pub(crate) fn one_hot_error(predicted: &[f64], target: u8) -> f64 {
    let target = target as usize;
    predicted
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let expected = if i == target { 1.0 } else { 0.0 };
            (expected - v) * (expected - v)
        })
        .sum::<f64>()
        / VOCABULARY as f64
}

/// Start offsets of `windows` scoring windows of `window` bytes each, drawn
/// once from `seed`.
pub(crate) fn draw_window_starts(
    corpus: usize,
    window: usize,
    windows: usize,
    seed: u64,
) -> Result<Vec<usize>, ConfigError> {
    if windows == 0 || window < 2 {
        return Err(ConfigError::Invalid {
            message: "need at least one scoring window of two or more bytes".to_string(),
        });
    }
    if corpus < window {
        return Err(ConfigError::InvalidDataset {
            message: format!("corpus has {corpus} bytes, shorter than one {window}-byte window"),
        });
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Ok((0..windows)
        .map(|_| rng.gen_range(0..=corpus - window))
        .collect())
}

/// Read a corpus file.
pub(crate) fn read_corpus(path: &Path) -> DsResult<Vec<u8>> {
    if !path.exists() {
        return Err(ConfigError::DatasetNotFound {
            path: path.display().to_string(),
        }
        .into());
    }
    let corpus = std::fs::read(path)?;
    info!(bytes = corpus.len(), "Loaded corpus from: {}", path.display());
    Ok(corpus)
}

/// Next-byte prediction over fixed windows of a corpus.
#[derive(Debug, Clone)]
pub struct EncoderDecoder {
    corpus: Vec<u8>,
    shape: EncDecShape,
    starts: Vec<usize>,
    space: ParameterSpace,
}

impl EncoderDecoder {
    pub fn new(corpus: Vec<u8>, shape: EncDecShape) -> Result<Self, ConfigError> {
        if shape.hidden == 0 {
            return Err(ConfigError::Invalid {
                message: "encoder/decoder needs a positive hidden width".to_string(),
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

    pub fn from_file<P: AsRef<Path>>(path: P, shape: EncDecShape) -> DsResult<Self> {
        Ok(Self::new(read_corpus(path.as_ref())?, shape)?)
    }

    pub fn shape(&self) -> &EncDecShape {
        &self.shape
    }

    /// Window start offsets into the corpus, fixed at construction.
    pub fn window_starts(&self) -> &[usize] {
        &self.starts
    }
}

impl Evaluator for EncoderDecoder {
    fn space(&self) -> &ParameterSpace {
        &self.space
    }

    /// Mean over every prediction in every window.
    fn evaluate(&self, parameters: &[f64]) -> DsResult<f64> {
        let model = ByteModel::from_parameters(&self.space, parameters)?;
        let mut loss = 0.0;
        for &start in &self.starts {
            loss += model.sequence_loss(&self.corpus[start..start + self.shape.window])?;
        }
        let predictions = self.starts.len() * (self.shape.window - 1);
        Ok(loss / predictions as f64)
    }

    fn name(&self) -> &str {
        "encdec"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_shape() -> EncDecShape {
        EncDecShape {
            hidden: 4,
            window: 8,
            windows: 3,
            seed: 7,
        }
    }

    fn corpus() -> Vec<u8> {
        b"the quick brown fox jumps over the lazy dog".to_vec()
    }

    #[test]
    fn space_has_encoder_and_decoder_layers() {
        let task = EncoderDecoder::new(corpus(), small_shape()).unwrap();
        let space = task.space();
        assert_eq!(space.len(), (4 + 256) * 4 + 4 + 4 * 256 + 256);
        assert_eq!(space.group("decoder", SlotRole::Bias).unwrap().rows, 256);
    }

    #[test]
    fn zero_model_misses_every_one_hot_target() {
        let task = EncoderDecoder::new(corpus(), small_shape()).unwrap();
        let zeros = vec![0.0; task.space().len()];
        let loss = task.evaluate(&zeros).unwrap();
        assert!((loss - 1.0 / 256.0).abs() < 1e-12, "loss = {loss}");
    }

    #[test]
    fn windows_are_fixed_by_seed() {
        let a = EncoderDecoder::new(corpus(), small_shape()).unwrap();
        let b = EncoderDecoder::new(corpus(), small_shape()).unwrap();
        assert_eq!(a.window_starts(), b.window_starts());
        assert!(a.window_starts().iter().all(|&s| s + 8 <= corpus().len()));
    }

    #[test]
    fn generation_follows_decoder_bias() {
        let shape = small_shape();
        let space = shape.space();
        let mut parameters = vec![0.0; space.len()];
        let bias = space.group("decoder", SlotRole::Bias).unwrap();
        parameters[bias.offset + b'a' as usize] = 1.0;

        let model = ByteModel::from_parameters(&space, &parameters).unwrap();
        assert_eq!(model.generate(b"xy", 3).unwrap(), b"aaa".to_vec());
        assert_eq!(model.generate(b"", 2).unwrap(), vec![0, b'a']);
    }

    #[test]
    fn short_corpus_is_rejected() {
        assert!(matches!(
            EncoderDecoder::new(b"abc".to_vec(), small_shape()),
            Err(ConfigError::InvalidDataset { .. })
        ));
    }

    #[test]
    fn snapshot_reload_rebuilds_model() {
        let space = small_shape().space();
        let candidate = ds_types::Candidate::new(vec![0.5; space.len()]);
        let snapshot = ModelSnapshot::new(space, &candidate, 3).unwrap();
        assert!(ByteModel::from_snapshot(&snapshot).is_ok());
    }
}
