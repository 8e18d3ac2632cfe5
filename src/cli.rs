use std::path::PathBuf;

use anyhow::Context;
use burn::{config::Config, module::AutodiffModule, tensor::backend::AutodiffBackend};
use clap::{Args, Parser, Subcommand};

use crate::{
    checkpoint,
    dataset::{MnistSource, MnistSplit},
    evaluation::evaluate,
    training::{self, TrainingConfig},
};

#[derive(Parser, Debug)]
#[command(version, about = "Train a softmax classifier on MNIST and save the parameters")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a new model and write a checkpoint.
    Train(TrainArgs),
    /// Score a saved checkpoint on the test split.
    Eval(EvalArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Directory holding the MNIST IDX files (raw or `.gz`).
    /// Falls back to burn's download cache when omitted.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    #[command(flatten)]
    pub data: DataArgs,
    /// Checkpoint path; `.mpk` and `.json` files are written next to it.
    #[arg(long, default_value = "./mnist_softmax")]
    pub model_file: PathBuf,
    /// JSON training config to start from; flags below override it.
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub num_steps: Option<usize>,
    #[arg(long)]
    pub batch_size: Option<usize>,
    #[arg(long)]
    pub learning_rate: Option<f64>,
    #[arg(long)]
    pub seed: Option<u64>,
    /// Do not score the trained model on the test split.
    #[arg(long, default_value_t = false)]
    pub skip_test: bool,
}

#[derive(Args, Debug, Clone)]
pub struct EvalArgs {
    #[command(flatten)]
    pub data: DataArgs,
    #[arg(long, default_value = "./mnist_softmax")]
    pub model_file: PathBuf,
    #[arg(long, default_value_t = 100)]
    pub batch_size: usize,
}

impl TrainArgs {
    /// The config file (or defaults) with command-line overrides applied.
    pub fn training_config(&self) -> anyhow::Result<TrainingConfig> {
        let mut config = match &self.config {
            Some(path) => TrainingConfig::load(path)
                .map_err(|err| anyhow::anyhow!("{err}"))
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => TrainingConfig::default(),
        };

        if let Some(num_steps) = self.num_steps {
            config.num_steps = num_steps;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(learning_rate) = self.learning_rate {
            config.learning_rate = learning_rate;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }

        Ok(config)
    }
}

pub fn execute<B: AutodiffBackend>(cli: Cli, device: B::Device) -> anyhow::Result<()> {
    match cli.command {
        Commands::Train(args) => train::<B>(args, device),
        Commands::Eval(args) => eval::<B>(args, device),
    }
}

fn train<B: AutodiffBackend>(args: TrainArgs, device: B::Device) -> anyhow::Result<()> {
    let config = args.training_config()?;
    let source = MnistSource::from_data_dir(args.data.data_dir.clone());

    let (model, report) =
        training::run::<B>(&config, &source, device.clone()).context("training failed")?;
    log::info!(
        "Trained for {} steps over {} passes, final loss {:.4}",
        report.steps,
        report.epochs_started,
        report.final_loss
    );

    let model = model.valid();
    checkpoint::save(model.clone(), &config, &args.model_file).with_context(|| {
        format!(
            "failed to save checkpoint to {}",
            args.model_file.display()
        )
    })?;

    if !args.skip_test {
        let test = source.load(MnistSplit::Test)?;
        let evaluation = evaluate(&model, &test, config.batch_size, &device)?;
        log::info!("[Test] {evaluation}");
    }

    Ok(())
}

fn eval<B: AutodiffBackend>(args: EvalArgs, device: B::Device) -> anyhow::Result<()> {
    let (model, _) = checkpoint::load::<B::InnerBackend, _>(&args.model_file, &device)
        .with_context(|| format!("failed to load checkpoint {}", args.model_file.display()))?;

    let source = MnistSource::from_data_dir(args.data.data_dir);
    let test = source.load(MnistSplit::Test)?;
    let evaluation = evaluate(&model, &test, args.batch_size, &device)?;
    log::info!("[Test] {evaluation}");

    Ok(())
}
