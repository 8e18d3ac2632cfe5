use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::data::dataset::{
    transform::PartialDataset,
    vision::{MnistDataset, MnistItem},
    Dataset,
};
use flate2::read::GzDecoder;

use crate::error::DatasetError;

const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

const IMAGES_MAGIC: u32 = 0x0000_0803;
const LABELS_MAGIC: u32 = 0x0000_0801;

pub const WIDTH: usize = 28;
pub const HEIGHT: usize = 28;
pub const NUM_CLASSES: usize = 10;

/// Which half of MNIST to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MnistSplit {
    Train,
    Test,
}

impl MnistSplit {
    fn file_names(&self) -> (&'static str, &'static str) {
        match self {
            MnistSplit::Train => (TRAIN_IMAGES, TRAIN_LABELS),
            MnistSplit::Test => (TEST_IMAGES, TEST_LABELS),
        }
    }
}

/// Where MNIST items come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MnistSource {
    /// Burn's downloader, cached under the burn-dataset cache directory.
    Cache,
    /// IDX files already present in a local directory.
    Dir(PathBuf),
}

impl MnistSource {
    pub fn from_data_dir(data_dir: Option<PathBuf>) -> Self {
        match data_dir {
            Some(dir) => MnistSource::Dir(dir),
            None => MnistSource::Cache,
        }
    }

    pub fn load(&self, split: MnistSplit) -> Result<SourceDataset, DatasetError> {
        match self {
            MnistSource::Cache => {
                log::info!("Loading MNIST {split:?} split from the burn dataset cache");
                let dataset = match split {
                    MnistSplit::Train => MnistDataset::train(),
                    MnistSplit::Test => MnistDataset::test(),
                };
                Ok(SourceDataset::Cache(dataset))
            }
            MnistSource::Dir(dir) => {
                log::info!("Loading MNIST {split:?} split from {}", dir.display());
                IdxDataset::from_dir(dir, split).map(SourceDataset::Local)
            }
        }
    }
}

/// A loaded MNIST split, whichever source it came from.
pub enum SourceDataset {
    Cache(MnistDataset),
    Local(IdxDataset),
}

impl Dataset<MnistItem> for SourceDataset {
    fn get(&self, index: usize) -> Option<MnistItem> {
        match self {
            SourceDataset::Cache(dataset) => dataset.get(index),
            SourceDataset::Local(dataset) => dataset.get(index),
        }
    }

    fn len(&self) -> usize {
        match self {
            SourceDataset::Cache(dataset) => dataset.len(),
            SourceDataset::Local(dataset) => dataset.len(),
        }
    }
}

/// MNIST images and labels parsed from IDX files.
///
/// Pixels stay as bytes in memory and are expanded to an [`MnistItem`] on access,
/// so the 60k train split costs ~47MB instead of four times that.
#[derive(Debug, Clone)]
pub struct IdxDataset {
    pixels: Vec<u8>,
    labels: Vec<u8>,
}

impl IdxDataset {
    /// Read a split from `dir`. Each file may be stored raw or gzip-compressed (`.gz`);
    /// the raw file is preferred when both exist.
    pub fn from_dir<P: AsRef<Path>>(dir: P, split: MnistSplit) -> Result<Self, DatasetError> {
        let (images_name, labels_name) = split.file_names();
        let images_path = locate(dir.as_ref(), images_name)?;
        let labels_path = locate(dir.as_ref(), labels_name)?;

        let pixels = parse_images(&images_path, &read_file(&images_path)?)?;
        let labels = parse_labels(&labels_path, &read_file(&labels_path)?)?;

        Self::new(pixels, labels)
    }

    /// Build from a flat `[n * 784]` pixel buffer and `n` labels.
    pub fn new(pixels: Vec<u8>, labels: Vec<u8>) -> Result<Self, DatasetError> {
        let images = pixels.len() / (WIDTH * HEIGHT);
        if pixels.len() % (WIDTH * HEIGHT) != 0 || images != labels.len() {
            return Err(DatasetError::CountMismatch {
                images,
                labels: labels.len(),
            });
        }

        if let Some((index, label)) = labels
            .iter()
            .enumerate()
            .find(|(_, label)| **label as usize >= NUM_CLASSES)
        {
            return Err(DatasetError::InvalidLabel {
                index,
                label: *label,
            });
        }

        Ok(Self { pixels, labels })
    }
}

impl Dataset<MnistItem> for IdxDataset {
    fn get(&self, index: usize) -> Option<MnistItem> {
        let label = *self.labels.get(index)?;
        let start = index * WIDTH * HEIGHT;
        let bytes = &self.pixels[start..start + WIDTH * HEIGHT];

        let mut image = [[0f32; WIDTH]; HEIGHT];
        for (row, chunk) in image.iter_mut().zip(bytes.chunks_exact(WIDTH)) {
            for (pixel, byte) in row.iter_mut().zip(chunk) {
                *pixel = *byte as f32;
            }
        }

        Some(MnistItem { image, label })
    }

    fn len(&self) -> usize {
        self.labels.len()
    }
}

/// Split a train set into `(train, valid)`, the last `num_valid` items being held out.
pub fn split_validation<D>(
    dataset: D,
    num_valid: usize,
) -> (
    PartialDataset<Arc<D>, MnistItem>,
    PartialDataset<Arc<D>, MnistItem>,
)
where
    D: Dataset<MnistItem>,
{
    let dataset = Arc::new(dataset);
    let len = dataset.len();
    let boundary = len.saturating_sub(num_valid);

    let train = PartialDataset::new(dataset.clone(), 0, boundary);
    let valid = PartialDataset::new(dataset, boundary, len);

    (train, valid)
}

fn locate(dir: &Path, name: &'static str) -> Result<PathBuf, DatasetError> {
    let raw = dir.join(name);
    if raw.is_file() {
        return Ok(raw);
    }

    let gz = dir.join(format!("{name}.gz"));
    if gz.is_file() {
        return Ok(gz);
    }

    Err(DatasetError::MissingFile {
        dir: dir.to_path_buf(),
        name,
    })
}

fn read_file(path: &Path) -> Result<Vec<u8>, DatasetError> {
    let io_err = |source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(io_err)?;
    let mut bytes = Vec::new();

    if path.extension().is_some_and(|ext| ext == "gz") {
        GzDecoder::new(file).read_to_end(&mut bytes).map_err(io_err)?;
    } else {
        let mut file = file;
        file.read_to_end(&mut bytes).map_err(io_err)?;
    }

    Ok(bytes)
}

/// Read the big-endian `u32` header words following the magic number.
fn read_header<const N: usize>(
    path: &Path,
    bytes: &[u8],
    magic: u32,
) -> Result<[usize; N], DatasetError> {
    let header_len = 4 * (N + 1);
    let truncated = || DatasetError::Truncated {
        path: path.to_path_buf(),
        expected: header_len,
        found: bytes.len(),
    };

    let word = |i: usize| {
        bytes
            .get(i..i + 4)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            .ok_or_else(truncated)
    };

    let found = word(0)?;
    if found != magic {
        return Err(DatasetError::BadMagic {
            path: path.to_path_buf(),
            expected: magic,
            found,
        });
    }
    if bytes.len() < header_len {
        return Err(truncated());
    }

    let mut dims = [0usize; N];
    for (i, dim) in dims.iter_mut().enumerate() {
        *dim = word(4 * (i + 1))? as usize;
    }

    Ok(dims)
}

fn payload(path: &Path, bytes: &[u8], offset: usize, len: usize) -> Result<Vec<u8>, DatasetError> {
    let found = bytes.len() - offset;
    if found < len {
        return Err(DatasetError::Truncated {
            path: path.to_path_buf(),
            expected: len,
            found,
        });
    }
    if found > len {
        return Err(DatasetError::TrailingBytes {
            path: path.to_path_buf(),
            expected: len,
            found,
        });
    }

    Ok(bytes[offset..].to_vec())
}

fn parse_images(path: &Path, bytes: &[u8]) -> Result<Vec<u8>, DatasetError> {
    let [count, rows, cols] = read_header::<3>(path, bytes, IMAGES_MAGIC)?;
    if rows != HEIGHT || cols != WIDTH {
        return Err(DatasetError::BadDimensions {
            path: path.to_path_buf(),
            rows,
            cols,
        });
    }

    payload(path, bytes, 16, count * rows * cols)
}

fn parse_labels(path: &Path, bytes: &[u8]) -> Result<Vec<u8>, DatasetError> {
    let [count] = read_header::<1>(path, bytes, LABELS_MAGIC)?;

    payload(path, bytes, 8, count)
}
