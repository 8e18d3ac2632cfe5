use burn::{
    data::{
        dataloader::batcher::Batcher,
        dataset::{vision::MnistItem, Dataset},
    },
    prelude::*,
    train::ValidStep,
};

use crate::{data::MnistBatcher, error::Error, model::Softmax};

/// Loss and accuracy of a model over a whole dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Mean cross-entropy per item.
    pub loss: f32,
    /// Fraction of correct predictions, in `[0, 1]`.
    pub accuracy: f32,
    pub num_items: usize,
}

impl core::fmt::Display for Evaluation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "loss {:.4} | accuracy {:.2} % ({} items)",
            self.loss,
            self.accuracy * 100.0,
            self.num_items
        )
    }
}

/// Number of correct argmax predictions in a batch.
pub fn num_correct<B: Backend>(output: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let predictions = output.argmax(1).squeeze::<1>(1);

    predictions
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize
}

/// Run the model over `dataset` in order, `batch_size` items at a time.
pub fn evaluate<B, D>(
    model: &Softmax<B>,
    dataset: &D,
    batch_size: usize,
    device: &B::Device,
) -> Result<Evaluation, Error>
where
    B: Backend,
    D: Dataset<MnistItem>,
{
    if dataset.is_empty() {
        return Err(Error::EmptyDataset);
    }
    if batch_size == 0 {
        return Err(Error::InvalidConfig("batch_size must be positive".into()));
    }

    let batcher = MnistBatcher::<B>::new(device.clone());
    let len = dataset.len();

    let mut loss_sum = 0.0f64;
    let mut correct = 0;

    for start in (0..len).step_by(batch_size) {
        let items: Vec<_> = (start..usize::min(start + batch_size, len))
            .filter_map(|index| dataset.get(index))
            .collect();
        let num_items = items.len();

        let output = model.step(batcher.batch(items));

        loss_sum += output.loss.into_scalar().elem::<f64>() * num_items as f64;
        correct += num_correct(output.output, output.targets);
    }

    Ok(Evaluation {
        loss: (loss_sum / len as f64) as f32,
        accuracy: correct as f32 / len as f32,
        num_items: len,
    })
}
