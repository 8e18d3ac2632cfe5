use std::path::{Path, PathBuf};

use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
};

use crate::{error::Error, model::Softmax, training::TrainingConfig};

type CheckpointRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Paths a checkpoint occupies on disk for a given model file stem.
///
/// The recorder replaces any extension of the stem with `mpk`, so `model` and
/// `model.bin` both end up as `model.mpk`; the config sits next to it as JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointPaths {
    pub record: PathBuf,
    pub config: PathBuf,
}

impl CheckpointPaths {
    pub fn new<P: AsRef<Path>>(model_file: P) -> Self {
        let stem = model_file.as_ref();

        Self {
            record: stem.with_extension("mpk"),
            config: stem.with_extension("json"),
        }
    }
}

/// Write the model parameters and the config that produced them.
pub fn save<B: Backend, P: AsRef<Path>>(
    model: Softmax<B>,
    config: &TrainingConfig,
    model_file: P,
) -> Result<CheckpointPaths, Error> {
    let paths = CheckpointPaths::new(&model_file);

    if let Some(parent) = paths.record.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    model
        .save_file(model_file.as_ref().to_path_buf(), &CheckpointRecorder::new())
        .map_err(Error::Recorder)?;
    config.save(&paths.config)?;

    log::info!("model saved to {}", paths.record.display());

    Ok(paths)
}

/// Rebuild a model from a checkpoint written by [`save`].
pub fn load<B: Backend, P: AsRef<Path>>(
    model_file: P,
    device: &B::Device,
) -> Result<(Softmax<B>, TrainingConfig), Error> {
    let paths = CheckpointPaths::new(&model_file);

    let config = TrainingConfig::load(&paths.config).map_err(Error::Config)?;
    let model = config
        .model
        .init::<B>(device)
        .load_file(
            model_file.as_ref().to_path_buf(),
            &CheckpointRecorder::new(),
            device,
        )
        .map_err(Error::Recorder)?;

    log::info!("model loaded from {}", paths.record.display());

    Ok((model, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SoftmaxConfig;
    use burn::{backend::NdArray, nn::Initializer, optim::SgdConfig};

    type TestBackend = NdArray<f32>;

    #[test]
    fn paths_replace_the_extension() {
        let paths = CheckpointPaths::new("out/mnist_softmax.bin");

        assert_eq!(paths.record, PathBuf::from("out/mnist_softmax.mpk"));
        assert_eq!(paths.config, PathBuf::from("out/mnist_softmax.json"));
    }

    #[test]
    fn saved_checkpoint_reloads_identically() {
        let dir = tempfile::tempdir().unwrap();
        let model_file = dir.path().join("nested").join("mnist_softmax");
        let device = Default::default();

        let model_config = SoftmaxConfig::new().with_initializer(Initializer::Uniform {
            min: -1.0,
            max: 1.0,
        });
        let config = TrainingConfig::new(model_config, SgdConfig::new()).with_num_steps(12);
        let model = config.model.init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 2>::random(
            [2, 784],
            burn::tensor::Distribution::Default,
            &device,
        );
        let expected = model.forward(images.clone()).into_data();

        let paths = save(model, &config, &model_file).unwrap();
        assert!(paths.record.is_file());
        assert!(paths.config.is_file());

        let (loaded, loaded_config) = load::<TestBackend, _>(&model_file, &device).unwrap();

        assert_eq!(loaded_config.num_steps, 12);
        loaded
            .forward(images)
            .into_data()
            .assert_approx_eq(&expected, 6);
    }

    #[test]
    fn missing_checkpoint_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();

        let result = load::<TestBackend, _>(dir.path().join("absent"), &device);

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn failed_record_leaves_no_config_behind() {
        let dir = tempfile::tempdir().unwrap();
        let model_file = dir.path().join("mnist_softmax");
        let paths = CheckpointPaths::new(&model_file);
        // A directory where the record should go makes the recorder fail.
        std::fs::create_dir_all(&paths.record).unwrap();

        let model = SoftmaxConfig::new().init::<TestBackend>(&Default::default());
        let result = save(model, &TrainingConfig::default(), &model_file);

        assert!(matches!(result, Err(Error::Recorder(_))));
        assert!(!paths.config.exists());
    }
}
