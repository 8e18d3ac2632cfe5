use crate::{
    data::{MnistBatch, MnistBatcher},
    dataset::{split_validation, MnistSource, MnistSplit},
    error::Error,
    evaluation::{evaluate, Evaluation},
    model::{Softmax, SoftmaxConfig},
};
use burn::{
    data::{
        dataloader::DataLoaderBuilder,
        dataset::{vision::MnistItem, Dataset},
    },
    module::AutodiffModule,
    optim::{Optimizer, SgdConfig},
    prelude::*,
    tensor::backend::AutodiffBackend,
    train::TrainStep,
};

#[derive(Config)]
pub struct TrainingConfig {
    /// Optimizer steps to run, regardless of how many passes over the data that takes.
    #[config(default = 1000)]
    pub num_steps: usize,
    #[config(default = 100)]
    pub batch_size: usize,
    #[config(default = 0.5)]
    pub learning_rate: f64,
    /// Items held out from the end of the train split.
    #[config(default = 5000)]
    pub validation_size: usize,
    #[config(default = 1)]
    pub num_workers: usize,
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = 100)]
    pub log_interval: usize,
    pub model: SoftmaxConfig,
    pub optimizer: SgdConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self::new(SoftmaxConfig::new(), SgdConfig::new())
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |msg: &str| Err(Error::InvalidConfig(msg.to_string()));

        if self.num_steps == 0 {
            return invalid("num_steps must be positive");
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be positive");
        }
        if !(self.learning_rate > 0.0) {
            return invalid("learning_rate must be positive");
        }
        if self.num_workers == 0 {
            return invalid("num_workers must be positive");
        }
        if !self.model.is_mnist() {
            return invalid("model must map 784 pixels to 10 classes");
        }

        Ok(())
    }
}

/// Outcome of a training run.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub steps: usize,
    /// Passes over the training data that were started, the last one possibly partial.
    pub epochs_started: usize,
    /// Loss of the last optimizer step.
    pub final_loss: f32,
    pub validation: Option<Evaluation>,
}

/// Load the train split from `source` and train on it.
pub fn run<B: AutodiffBackend>(
    config: &TrainingConfig,
    source: &MnistSource,
    device: B::Device,
) -> Result<(Softmax<B>, TrainingReport), Error> {
    let dataset = source.load(MnistSplit::Train)?;

    train::<B, _>(config, dataset, device)
}

/// Train for exactly `config.num_steps` steps of plain gradient descent.
///
/// The tail of `dataset` (`config.validation_size` items) is held out and scored once
/// training ends. The loader is restarted, reshuffled, each time it runs dry.
pub fn train<B, D>(
    config: &TrainingConfig,
    dataset: D,
    device: B::Device,
) -> Result<(Softmax<B>, TrainingReport), Error>
where
    B: AutodiffBackend,
    D: Dataset<MnistItem> + 'static,
{
    config.validate()?;
    if config.validation_size >= dataset.len() {
        return Err(Error::InvalidConfig(format!(
            "validation_size {} leaves no training data out of {} items",
            config.validation_size,
            dataset.len()
        )));
    }

    B::seed(config.seed);

    let (dataset_train, dataset_valid) = split_validation(dataset, config.validation_size);
    log::info!(
        "Training on {} items, {} held out for validation",
        dataset_train.len(),
        dataset_valid.len()
    );

    let dataloader_train = DataLoaderBuilder::new(MnistBatcher::<B>::new(device.clone()))
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .build(dataset_train);

    let mut model: Softmax<B> = config.model.init(&device);
    let mut optim = config.optimizer.init::<B, Softmax<B>>();

    let mut iterator = dataloader_train.iter();
    let mut epoch = 1;
    let mut final_loss = f32::NAN;
    let mut running_loss = 0.0;
    let mut running_steps = 0;

    for step in 1..=config.num_steps {
        let batch = match iterator.next() {
            Some(batch) => batch,
            None => {
                epoch += 1;
                log::debug!("Starting pass {epoch} over the training data");
                iterator = dataloader_train.iter();
                iterator.next().ok_or(Error::EmptyDataset)?
            }
        };

        let (updated, loss) = sgd_step(model, &mut optim, config.learning_rate, batch);
        model = updated;

        final_loss = loss;
        running_loss += loss;
        running_steps += 1;

        if step % config.log_interval.max(1) == 0 || step == config.num_steps {
            log::info!(
                "[Train - Step {step}/{} - Epoch {epoch}] Loss {:.4}",
                config.num_steps,
                running_loss / running_steps as f32
            );
            running_loss = 0.0;
            running_steps = 0;
        }
    }

    let validation = if dataset_valid.is_empty() {
        None
    } else {
        let evaluation = evaluate(&model.valid(), &dataset_valid, config.batch_size, &device)?;
        log::info!("[Valid] {evaluation}");
        Some(evaluation)
    };

    let report = TrainingReport {
        steps: config.num_steps,
        epochs_started: epoch,
        final_loss,
        validation,
    };

    Ok((model, report))
}

/// One gradient-descent step on a single batch, returning the loss before the update.
pub fn sgd_step<B, O>(
    model: Softmax<B>,
    optim: &mut O,
    learning_rate: f64,
    batch: MnistBatch<B>,
) -> (Softmax<B>, f32)
where
    B: AutodiffBackend,
    O: Optimizer<Softmax<B>, B>,
{
    let output = model.step(batch);
    let loss = output.item.loss.into_scalar().elem::<f32>();
    let model = optim.step(learning_rate, model, output.grads);

    (model, loss)
}
