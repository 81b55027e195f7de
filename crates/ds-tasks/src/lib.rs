//! # ds-tasks
//!
//! Evaluators the optimizer can be pointed at. Each one owns its read-only
//! task data, declares the flat [`ParameterSpace`](ds_types::ParameterSpace)
//! it expects and turns a candidate into a scalar loss.

pub mod brainfuck;
pub mod encdec;
pub mod feedforward;
pub mod matrix;
pub mod quadratic;
pub mod trnn;

pub use brainfuck::{Execution, Instruction, Machine, Program, ProgramSynthesis};
pub use encdec::{ByteModel, EncDecShape, EncoderDecoder};
pub use feedforward::{Dataset, FeedForward, LabeledSample};
pub use matrix::Matrix;
pub use quadratic::Quadratic;
pub use trnn::{AttentionModel, TransformerRnn, TrnnShape};
