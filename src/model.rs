use crate::data::MnistBatch;
use crate::dataset::{HEIGHT, NUM_CLASSES, WIDTH};
use burn::{
    nn::{loss::CrossEntropyLossConfig, Initializer, Linear, LinearConfig},
    prelude::*,
    tensor::{activation::softmax, backend::AutodiffBackend},
    train::{ClassificationOutput, TrainOutput, TrainStep, ValidStep},
};

/// Multinomial logistic regression: a single affine map from pixels to class logits.
#[derive(Module, Debug)]
pub struct Softmax<B: Backend> {
    linear: Linear<B>,
}

#[derive(Config)]
pub struct SoftmaxConfig {
    #[config(default = 784)]
    pub num_features: usize,
    #[config(default = 10)]
    pub num_classes: usize,
    /// Weights and bias both start from this initializer.
    #[config(default = "Initializer::Zeros")]
    pub initializer: Initializer,
}

impl Default for SoftmaxConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftmaxConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Softmax<B> {
        let linear = LinearConfig::new(self.num_features, self.num_classes)
            .with_bias(true)
            .with_initializer(self.initializer.clone())
            .init(device);

        Softmax { linear }
    }

    /// The layout the MNIST batcher produces.
    pub fn is_mnist(&self) -> bool {
        self.num_features == WIDTH * HEIGHT && self.num_classes == NUM_CLASSES
    }
}

impl<B: Backend> Softmax<B> {
    /// # Shapes
    ///   - Images [batch_size, num_features]
    ///   - Output [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 2>) -> Tensor<B, 2> {
        self.linear.forward(images)
    }

    /// Class probabilities, each row summing to one.
    pub fn probabilities(&self, images: Tensor<B, 2>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }

    pub fn forward_classification(&self, item: MnistBatch<B>) -> ClassificationOutput<B> {
        let targets = item.targets;
        let output = self.forward(item.images);
        // Mean over the batch of the cross-entropy computed from raw logits.
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput {
            loss,
            output,
            targets,
        }
    }
}

impl<B: AutodiffBackend> TrainStep<MnistBatch<B>, ClassificationOutput<B>> for Softmax<B> {
    fn step(&self, item: MnistBatch<B>) -> TrainOutput<ClassificationOutput<B>> {
        let item = self.forward_classification(item);

        TrainOutput::new(self, item.loss.backward(), item)
    }
}

impl<B: Backend> ValidStep<MnistBatch<B>, ClassificationOutput<B>> for Softmax<B> {
    fn step(&self, item: MnistBatch<B>) -> ClassificationOutput<B> {
        self.forward_classification(item)
    }
}
