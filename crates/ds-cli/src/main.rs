use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::Receiver;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ds_optimizer::{Distribution, GenerationReport, Optimizer, OptimizerConfig, RunOutcome};
use ds_tasks::{
    AttentionModel, ByteModel, Dataset, EncDecShape, EncoderDecoder, FeedForward,
    ProgramSynthesis, Quadratic, TransformerRnn, TrnnShape,
};
use ds_types::{Evaluator, ModelSnapshot};

mod settings;

use settings::Tuning;

#[derive(Parser)]
#[command(
    name = "dsearch",
    version,
    about = "Train small networks and programs by Gaussian distribution search"
)]
struct Cli {
    /// JSON file with optimizer settings; flags take precedence
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Append one JSON line per generation to this file
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    #[command(flatten)]
    tuning: Tuning,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Minimise the squared distance to a target point
    Quadratic {
        /// Target coordinates
        #[arg(
            long,
            value_delimiter = ',',
            allow_hyphen_values = true,
            default_values_t = vec![3.0, -1.0]
        )]
        target: Vec<f64>,

        /// Initial stddev of every coordinate
        #[arg(long, default_value_t = 5.0)]
        spread: f64,
    },

    /// Train a two-layer classifier (XOR unless a CSV dataset is given)
    Forward {
        /// CSV with numeric features and the class name in the last column
        #[arg(long)]
        data: Option<PathBuf>,

        /// The CSV has a header row
        #[arg(long)]
        headers: bool,

        #[arg(long, default_value_t = 8)]
        hidden: usize,

        /// Save the best network here
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Train the recurrent byte model on a text corpus
    Encdec {
        corpus: PathBuf,

        #[arg(long, default_value_t = 32)]
        hidden: usize,

        /// Bytes per scoring window
        #[arg(long, default_value_t = 64)]
        window_bytes: usize,

        /// Scoring windows drawn from the corpus
        #[arg(long, default_value_t = 16)]
        windows: usize,

        #[arg(long, default_value = "encdec.bin")]
        save: PathBuf,
    },

    /// Train the attention byte model on a text corpus
    Trnn {
        corpus: PathBuf,

        /// Width of the encoding and of each projection
        #[arg(long, default_value_t = 32)]
        width: usize,

        /// Slots in the rolling attention context
        #[arg(long, default_value_t = 256)]
        context: usize,

        #[arg(long, default_value_t = 64)]
        window_bytes: usize,

        #[arg(long, default_value_t = 16)]
        windows: usize,

        /// Initial stddev of every weight
        #[arg(long, default_value_t = 0.01)]
        spread: f64,

        #[arg(long, default_value = "trnn.bin")]
        save: PathBuf,
    },

    /// Search for a Brainfuck program that prints a target string
    Brainfuck {
        #[arg(long)]
        target: String,

        /// Program length in instructions
        #[arg(long, default_value_t = 32)]
        length: usize,

        /// Bytes available to `,`
        #[arg(long, default_value = "")]
        input: String,
    },

    /// Generate text from a saved byte model (encdec or trnn)
    Infer {
        #[arg(long, default_value = "encdec.bin")]
        model: PathBuf,

        /// Attention context slots; only used by trnn models
        #[arg(long, default_value_t = 256)]
        context: usize,

        #[arg(long, default_value = "")]
        prompt: String,

        #[arg(long, default_value_t = 128)]
        length: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let report = cli.report.as_deref();

    match cli.command {
        Command::Quadratic { target, spread } => {
            let config = settings::resolve(cli.config.as_deref(), &cli.tuning)?;
            let task = Quadratic::new(target);
            let start = Distribution::uniform(task.space(), 0.0, spread);
            let (outcome, _) = search(config, &task, start, report)?;
            println!("best point: {:?}", outcome.best.values);
            println!("loss: {}", outcome.best_loss);
        }

        Command::Forward {
            data,
            headers,
            hidden,
            save,
        } => {
            let config = settings::resolve(cli.config.as_deref(), &cli.tuning)?;
            let dataset = match data {
                Some(path) => Dataset::load_csv(path, headers)?,
                None => Dataset::xor(),
            };
            let net = FeedForward::new(dataset, hidden)?;
            let start = Distribution::uniform(net.space(), 0.0, 1.0);
            let (outcome, snapshot) = search(config, &net, start, report)?;

            let accuracy = net.accuracy(&outcome.best.values)?;
            println!("loss: {}", outcome.best_loss);
            println!("accuracy: {:.3} over {} samples", accuracy, net.dataset().len());
            if let Some(path) = save {
                snapshot.save(&path)?;
                info!("Saved network to: {}", path.display());
            }
        }

        Command::Encdec {
            corpus,
            hidden,
            window_bytes,
            windows,
            save,
        } => {
            let config = top_half_span(settings::resolve(cli.config.as_deref(), &cli.tuning)?);
            let shape = EncDecShape {
                hidden,
                window: window_bytes,
                windows,
                seed: config.seed,
            };
            let task = EncoderDecoder::from_file(&corpus, shape)?;
            let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
            let start = Distribution::he(task.space(), &mut rng);
            let (outcome, snapshot) = search(config, &task, start, report)?;

            snapshot.save(&save)?;
            println!("loss: {}", outcome.best_loss);
            info!("Saved model to: {}", save.display());
        }

        Command::Trnn {
            corpus,
            width,
            context,
            window_bytes,
            windows,
            spread,
            save,
        } => {
            let config = top_half_span(settings::resolve(cli.config.as_deref(), &cli.tuning)?);
            let shape = TrnnShape {
                width,
                context,
                window: window_bytes,
                windows,
                seed: config.seed,
            };
            let task = TransformerRnn::from_file(&corpus, shape)?;
            let start = Distribution::uniform(task.space(), 0.0, spread);
            let (outcome, snapshot) = search(config, &task, start, report)?;

            snapshot.save(&save)?;
            println!("loss: {}", outcome.best_loss);
            info!("Saved model to: {}", save.display());
        }

        Command::Brainfuck {
            target,
            length,
            input,
        } => {
            let config = settings::resolve(cli.config.as_deref(), &cli.tuning)?;
            let task =
                ProgramSynthesis::new(target.into_bytes(), length)?.with_input(input.into_bytes());
            // Centre every slot on the middle of the instruction range.
            let start = Distribution::uniform(task.space(), 4.0, 2.0);
            let (outcome, _) = search(config, &task, start, report)?;

            let execution = task.execute(&outcome.best.values);
            println!("program: {}", task.decode(&outcome.best.values));
            println!("output: {:?}", String::from_utf8_lossy(&execution.output));
            println!("loss: {}", outcome.best_loss);
        }

        Command::Infer {
            model,
            context,
            prompt,
            length,
        } => {
            let snapshot = ModelSnapshot::load(&model)
                .with_context(|| format!("loading model {}", model.display()))?;
            let text = if AttentionModel::fits(&snapshot.space) {
                AttentionModel::from_snapshot(&snapshot, context)?
                    .generate(prompt.as_bytes(), length)?
            } else {
                ByteModel::from_snapshot(&snapshot)?.generate(prompt.as_bytes(), length)?
            };
            println!("{}{}", prompt, String::from_utf8_lossy(&text));
        }
    }

    Ok(())
}

/// Byte models scan the better half of the ranking unless a span is set.
fn top_half_span(config: OptimizerConfig) -> OptimizerConfig {
    if config.selection_span.is_some() {
        return config;
    }
    let span = (config.population / 2).max(config.selection.width());
    config.with_selection_span(span)
}

/// Run one optimizer to completion and capture its best model.
fn search<E: Evaluator>(
    config: OptimizerConfig,
    evaluator: E,
    start: Distribution,
    report: Option<&Path>,
) -> Result<(RunOutcome, ModelSnapshot)> {
    let mut optimizer = Optimizer::new(config, evaluator, start)?;
    let writer = match report {
        Some(path) => {
            let (tx, rx) = crossbeam_channel::unbounded();
            optimizer = optimizer.with_observer(tx);
            Some(spawn_report_writer(path, rx)?)
        }
        None => None,
    };

    let result = optimizer.run().and_then(|outcome| {
        let snapshot = optimizer.snapshot()?;
        Ok((outcome, snapshot))
    });
    // Dropping the optimizer closes the report channel.
    drop(optimizer);

    if let Some(handle) = writer {
        handle
            .join()
            .map_err(|_| anyhow!("report writer panicked"))??;
    }
    Ok(result?)
}

fn spawn_report_writer(
    path: &Path,
    reports: Receiver<GenerationReport>,
) -> Result<JoinHandle<Result<()>>> {
    let file = File::create(path).with_context(|| format!("creating report {}", path.display()))?;
    let mut out = BufWriter::new(file);
    let handle = thread::Builder::new()
        .name("ds-report".to_string())
        .spawn(move || -> Result<()> {
            for report in reports {
                serde_json::to_writer(&mut out, &report)?;
                writeln!(out)?;
            }
            out.flush()?;
            Ok(())
        })?;
    Ok(handle)
}
