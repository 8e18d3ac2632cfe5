use std::path::Path;

use burn::{
    backend::{ndarray::NdArrayDevice, Autodiff, NdArray},
    config::Config,
    module::AutodiffModule,
};
use clap::Parser;
use mnist_softmax::{
    checkpoint,
    cli::{execute, Cli},
    dataset::{MnistSource, MnistSplit},
    evaluation::evaluate,
    training::{self, TrainingConfig},
    DatasetError, Error,
};

type TestBackend = Autodiff<NdArray<f32>>;

/// Ten synthetic digits: class `k` lights rows `2k..2k+2` of the image.
fn write_split(dir: &Path, images_name: &str, labels_name: &str, len: usize) {
    let mut images = Vec::new();
    images.extend_from_slice(&0x0803u32.to_be_bytes());
    images.extend_from_slice(&(len as u32).to_be_bytes());
    images.extend_from_slice(&28u32.to_be_bytes());
    images.extend_from_slice(&28u32.to_be_bytes());

    let mut labels = Vec::new();
    labels.extend_from_slice(&0x0801u32.to_be_bytes());
    labels.extend_from_slice(&(len as u32).to_be_bytes());

    for i in 0..len {
        let label = (i % 10) as u8;
        for row in 0..28 {
            let lit = row / 2 == label as usize;
            images.extend(std::iter::repeat(if lit { 255u8 } else { 0 }).take(28));
        }
        labels.push(label);
    }

    std::fs::write(dir.join(images_name), images).unwrap();
    std::fs::write(dir.join(labels_name), labels).unwrap();
}

fn synthetic_mnist(dir: &Path) {
    write_split(
        dir,
        "train-images-idx3-ubyte",
        "train-labels-idx1-ubyte",
        200,
    );
    write_split(dir, "t10k-images-idx3-ubyte", "t10k-labels-idx1-ubyte", 50);
}

#[test]
fn trains_saves_and_reloads() {
    let data_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    synthetic_mnist(data_dir.path());

    let device = NdArrayDevice::Cpu;
    let source = MnistSource::Dir(data_dir.path().to_path_buf());
    let config = TrainingConfig::default()
        .with_num_steps(60)
        .with_batch_size(20)
        .with_validation_size(40)
        .with_log_interval(10);

    let (model, report) = training::run::<TestBackend>(&config, &source, device.clone()).unwrap();

    assert_eq!(report.steps, 60);
    // 160 training items in batches of 20 is 8 steps per pass.
    assert_eq!(report.epochs_started, 8);
    assert_eq!(report.validation.unwrap().accuracy, 1.0);

    let model_file = out_dir.path().join("mnist_softmax");
    let paths = checkpoint::save(model.valid(), &config, &model_file).unwrap();
    assert!(paths.record.ends_with("mnist_softmax.mpk"));

    let (loaded, loaded_config) =
        checkpoint::load::<NdArray<f32>, _>(&model_file, &device).unwrap();
    assert_eq!(loaded_config.num_steps, 60);

    let test = source.load(MnistSplit::Test).unwrap();
    let evaluation = evaluate(&loaded, &test, 16, &device).unwrap();

    assert_eq!(evaluation.num_items, 50);
    assert_eq!(evaluation.accuracy, 1.0);
    assert!(evaluation.loss < 0.1);
}

#[test]
fn missing_data_dir_files_fail_cleanly() {
    let data_dir = tempfile::tempdir().unwrap();
    let source = MnistSource::Dir(data_dir.path().to_path_buf());

    let result = training::run::<TestBackend>(
        &TrainingConfig::default(),
        &source,
        Default::default(),
    );

    assert!(matches!(
        result,
        Err(Error::Dataset(DatasetError::MissingFile { .. }))
    ));
}

fn cli_train(data_dir: &Path, model_file: &Path, config_file: &Path, extra: &[&str]) -> Cli {
    let mut args = vec![
        "mnist-softmax",
        "train",
        "--data-dir",
        data_dir.to_str().unwrap(),
        "--model-file",
        model_file.to_str().unwrap(),
        "--config",
        config_file.to_str().unwrap(),
        "--num-steps",
        "30",
    ];
    args.extend_from_slice(extra);
    Cli::parse_from(args)
}

#[test]
fn cli_trains_then_evaluates_the_checkpoint() {
    let data_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    write_split(
        data_dir.path(),
        "train-images-idx3-ubyte",
        "train-labels-idx1-ubyte",
        100,
    );

    let config_file = out_dir.path().join("config.json");
    TrainingConfig::default()
        .with_batch_size(20)
        .with_validation_size(20)
        .save(&config_file)
        .unwrap();
    let model_file = out_dir.path().join("mnist_softmax");
    let paths = checkpoint::CheckpointPaths::new(&model_file);

    // No test split on disk: scoring it after the save must fail.
    let cli = cli_train(data_dir.path(), &model_file, &config_file, &[]);
    assert!(execute::<TestBackend>(cli, NdArrayDevice::Cpu).is_err());
    assert!(paths.record.is_file());
    assert!(paths.config.is_file());

    std::fs::remove_file(&paths.record).unwrap();
    std::fs::remove_file(&paths.config).unwrap();
    let cli = cli_train(data_dir.path(), &model_file, &config_file, &["--skip-test"]);
    execute::<TestBackend>(cli, NdArrayDevice::Cpu).unwrap();
    assert!(paths.record.is_file());

    let (_, saved) = checkpoint::load::<NdArray<f32>, _>(&model_file, &NdArrayDevice::Cpu).unwrap();
    assert_eq!(saved.num_steps, 30);
    assert_eq!(saved.validation_size, 20);

    write_split(
        data_dir.path(),
        "t10k-images-idx3-ubyte",
        "t10k-labels-idx1-ubyte",
        30,
    );
    let cli = cli_train(data_dir.path(), &model_file, &config_file, &[]);
    execute::<TestBackend>(cli, NdArrayDevice::Cpu).unwrap();

    let cli = Cli::parse_from([
        "mnist-softmax",
        "eval",
        "--data-dir",
        data_dir.path().to_str().unwrap(),
        "--model-file",
        model_file.to_str().unwrap(),
        "--batch-size",
        "7",
    ]);
    execute::<TestBackend>(cli, NdArrayDevice::Cpu).unwrap();
}

#[test]
fn cli_eval_without_checkpoint_fails() {
    let data_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    synthetic_mnist(data_dir.path());

    let cli = Cli::parse_from([
        "mnist-softmax",
        "eval",
        "--data-dir",
        data_dir.path().to_str().unwrap(),
        "--model-file",
        out_dir.path().join("absent").to_str().unwrap(),
    ]);

    assert!(execute::<TestBackend>(cli, NdArrayDevice::Cpu).is_err());
}
