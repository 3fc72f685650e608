// MNIST dataset: download, IDX parsing and seeded sampling
//
// The MNIST database consists of 4 gzip-compressed files:
//   - train-images-idx3-ubyte.gz  (60,000  28×28 images)
//   - train-labels-idx1-ubyte.gz  (60,000  labels 0-9)
//   - t10k-images-idx3-ubyte.gz   (10,000  28×28 images)
//   - t10k-labels-idx1-ubyte.gz   (10,000  labels 0-9)
//
// IDX format (all values big-endian):
//   images: magic(2051) | count(u32) | rows(u32) | cols(u32) | pixel_data(u8...)
//   labels: magic(2049) | count(u32) | label_data(u8...)
//
// Both files of a split are loaded eagerly. Images are flattened to
// [count, rows*cols] and divided by 255 into f32; the configured DType is
// applied on top of that when a sample is drawn.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ReadBytesExt};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::{Array1, Array2, Array3, ArrayView1, Axis, Slice};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use vole_core::ops::{one_hot, partial_flatten, worker_chunk};
use vole_core::{DType, Error, Result};

use crate::dataset::Dataset;
use crate::download::DataDownloader;

/// Mirror the archives are fetched from.
pub const BASE_URL: &str = "https://storage.googleapis.com/cvdf-datasets/mnist/";
/// Cache namespace under the data root.
pub const NAMESPACE: &str = "mnist";
/// Width of one-hot label rows.
pub const NUM_CLASSES: usize = 10;
/// `worker_init` only ever partitions this many leading examples.
pub const WORKER_SAMPLE_CAP: usize = 5000;

const LABEL_MAGIC: u32 = 2049;
const IMAGE_MAGIC: u32 = 2051;

/// Which split of MNIST to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MnistSplit {
    Train,
    Test,
}

impl MnistSplit {
    /// `(images, labels)` archive names for this split.
    pub fn file_names(&self) -> (&'static str, &'static str) {
        match self {
            MnistSplit::Train => ("train-images-idx3-ubyte.gz", "train-labels-idx1-ubyte.gz"),
            MnistSplit::Test => ("t10k-images-idx3-ubyte.gz", "t10k-labels-idx1-ubyte.gz"),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            MnistSplit::Train => "MNIST-train",
            MnistSplit::Test => "MNIST-test",
        }
    }
}

/// Configuration for loading MNIST.
#[derive(Debug, Clone)]
pub struct MnistConfig {
    /// Load the training split (otherwise the test split).
    pub train: bool,
    /// Output representation of sampled images.
    pub dtype: DType,
    /// Encode labels as width-10 indicator rows.
    pub one_hot: bool,
    /// Seed for the sampling generator.
    pub seed: u64,
    /// Cache root; `None` uses the downloader's default.
    pub data_dir: Option<PathBuf>,
    /// Where archives are downloaded from.
    pub base_url: String,
    /// `log` target for messages emitted by this instance.
    pub log_target: String,
}

impl Default for MnistConfig {
    fn default() -> Self {
        Self {
            train: true,
            dtype: DType::Int8,
            one_hot: false,
            seed: 0,
            data_dir: None,
            base_url: BASE_URL.to_string(),
            log_target: "vole_data::mnist".to_string(),
        }
    }
}

impl MnistConfig {
    pub fn train(mut self, t: bool) -> Self {
        self.train = t;
        self
    }

    pub fn dtype(mut self, d: DType) -> Self {
        self.dtype = d;
        self
    }

    pub fn one_hot(mut self, o: bool) -> Self {
        self.one_hot = o;
        self
    }

    pub fn seed(mut self, s: u64) -> Self {
        self.seed = s;
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn log_target(mut self, target: impl Into<String>) -> Self {
        self.log_target = target.into();
        self
    }

    pub fn split(&self) -> MnistSplit {
        if self.train {
            MnistSplit::Train
        } else {
            MnistSplit::Test
        }
    }

    fn downloader(&self, file_name: &str) -> DataDownloader {
        let url = format!("{}{file_name}", self.base_url);
        let d = DataDownloader::new(url, NAMESPACE, file_name);
        match &self.data_dir {
            Some(dir) => d.root(dir),
            None => d,
        }
    }
}

/// All labels of a split, stored either as class indices or one-hot rows.
#[derive(Debug, Clone, PartialEq)]
pub enum Labels {
    Classes(Array1<u8>),
    OneHot(Array2<u8>),
}

impl Labels {
    pub fn len(&self) -> usize {
        match self {
            Labels::Classes(l) => l.len(),
            Labels::OneHot(l) => l.nrows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The label of example `i`. Panics if `i` is out of range.
    pub fn get(&self, i: usize) -> Label {
        match self {
            Labels::Classes(l) => Label::Class(l[i]),
            Labels::OneHot(l) => Label::OneHot(l.row(i).to_owned()),
        }
    }

    fn head(&self, n: usize) -> Labels {
        let s = Slice::from(0..n);
        match self {
            Labels::Classes(l) => Labels::Classes(l.slice_axis(Axis(0), s).to_owned()),
            Labels::OneHot(l) => Labels::OneHot(l.slice_axis(Axis(0), s).to_owned()),
        }
    }

    fn chunk(&self, worker_id: usize, num_workers: usize) -> Result<Labels> {
        Ok(match self {
            Labels::Classes(l) => Labels::Classes(worker_chunk(l, worker_id, num_workers)?),
            Labels::OneHot(l) => Labels::OneHot(worker_chunk(l, worker_id, num_workers)?),
        })
    }
}

/// The label half of a sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Label {
    Class(u8),
    OneHot(Array1<u8>),
}

impl Label {
    /// The class index, whichever encoding is used.
    pub fn class(&self) -> Option<u8> {
        match self {
            Label::Class(c) => Some(*c),
            Label::OneHot(row) => row.iter().position(|&v| v == 1).map(|p| p as u8),
        }
    }
}

/// A loaded MNIST split stored entirely in memory.
///
/// `images[i]` and `labels[i]` always describe the same example; partitioning
/// slices both arrays with the same range.
#[derive(Debug)]
pub struct Mnist {
    train: bool,
    dtype: DType,
    one_hot: bool,
    images: Array2<f32>,
    labels: Labels,
    rows: usize,
    cols: usize,
    rng: StdRng,
    log_target: String,
}

impl Mnist {
    /// Download (if needed) and load the split described by `config`.
    pub fn new(config: MnistConfig) -> Result<Self> {
        let (images_name, labels_name) = config.split().file_names();
        let images_path = config.downloader(images_name).ensure_downloaded()?;
        let labels_path = config.downloader(labels_name).ensure_downloaded()?;
        Self::from_paths(&images_path, &labels_path, config)
    }

    /// Training split with default settings.
    pub fn train_split() -> Result<Self> {
        Self::new(MnistConfig::default().train(true))
    }

    /// Test split with default settings.
    pub fn test_split() -> Result<Self> {
        Self::new(MnistConfig::default().train(false))
    }

    /// Load from two local gzip archives.
    pub fn from_paths(
        images_path: &Path,
        labels_path: &Path,
        config: MnistConfig,
    ) -> Result<Self> {
        log::debug!(
            target: config.log_target.as_str(),
            "parsing {} and {}",
            images_path.display(),
            labels_path.display()
        );
        let images = BufReader::new(File::open(images_path)?);
        let labels = BufReader::new(File::open(labels_path)?);
        Self::from_readers(images, labels, config)
    }

    /// Load from two gzip-compressed IDX streams.
    pub fn from_readers<I: Read, L: Read>(images: I, labels: L, config: MnistConfig) -> Result<Self> {
        let labels = parse_idx1_labels(GzDecoder::new(labels))?;
        let images = parse_idx3_images(GzDecoder::new(images))?;

        let (count, rows, cols) = images.dim();
        if count != labels.len() {
            return Err(Error::format(format!(
                "count mismatch: {count} images vs {} labels",
                labels.len()
            )));
        }

        let labels = if config.one_hot {
            Labels::OneHot(one_hot(&labels, NUM_CLASSES)?)
        } else {
            Labels::Classes(labels)
        };
        let images = partial_flatten(images)?.mapv(|p| p as f32) / 255.0;

        log::info!(
            target: config.log_target.as_str(),
            "loaded {}: {count} examples of {rows}x{cols}",
            config.split().name()
        );

        Ok(Self {
            train: config.train,
            dtype: config.dtype,
            one_hot: config.one_hot,
            images,
            labels,
            rows,
            cols,
            rng: StdRng::seed_from_u64(config.seed),
            log_target: config.log_target,
        })
    }

    /// Apply this instance's output dtype to an image.
    pub fn as_dtype(&self, image: Array1<f32>) -> Array1<f32> {
        self.dtype.apply(image)
    }

    /// Number of examples currently held.
    pub fn len(&self) -> usize {
        self.images.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Image dimensions: (rows, cols).
    pub fn image_dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Normalized images, one flattened row per example.
    pub fn images(&self) -> &Array2<f32> {
        &self.images
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    /// The stored (normalized, pre-dtype) image of example `i`.
    pub fn image(&self, i: usize) -> ArrayView1<'_, f32> {
        self.images.row(i)
    }

    pub fn is_train(&self) -> bool {
        self.train
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn is_one_hot(&self) -> bool {
        self.one_hot
    }

    /// Reseed the sampling generator, restarting the draw sequence.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn split(&self) -> MnistSplit {
        if self.train {
            MnistSplit::Train
        } else {
            MnistSplit::Test
        }
    }
}

impl Dataset for Mnist {
    type Item = (Array1<f32>, Label);

    fn next(&mut self) -> Result<Self::Item> {
        if self.is_empty() {
            return Err(Error::Empty);
        }
        let index = self.rng.gen_range(0..self.len());
        let image = self.as_dtype(self.images.row(index).to_owned());
        Ok((image, self.labels.get(index)))
    }

    fn worker_init(self, worker_id: usize, num_workers: usize) -> Result<Self> {
        let keep = self.len().min(WORKER_SAMPLE_CAP);
        let head = self.images.slice_axis(Axis(0), Slice::from(0..keep));
        let images = worker_chunk(&head, worker_id, num_workers)?;
        let labels = self.labels.head(keep).chunk(worker_id, num_workers)?;

        log::debug!(
            target: self.log_target.as_str(),
            "worker {worker_id}/{num_workers} keeps {} of {keep} examples",
            images.nrows()
        );

        Ok(Self {
            images,
            labels,
            ..self
        })
    }

    fn name(&self) -> &str {
        self.split().name()
    }
}

// IDX file format parsing

fn read_header<R: Read>(r: &mut R, what: &str, magic: u32, dims: usize) -> Result<Vec<usize>> {
    let got = r
        .read_u32::<BigEndian>()
        .map_err(|e| Error::format(format!("{what}: truncated header: {e}")))?;
    if got != magic {
        return Err(Error::format(format!(
            "{what}: invalid magic: expected {magic:#06x}, got {got:#06x}"
        )));
    }
    (0..dims)
        .map(|_| {
            r.read_u32::<BigEndian>()
                .map(|v| v as usize)
                .map_err(|e| Error::format(format!("{what}: truncated header: {e}")))
        })
        .collect()
}

/// Parse an IDX1 stream (labels): magic=2049, count, data.
///
/// The stream is drained; anything other than exactly `count` label bytes
/// after the header is a format error.
pub fn parse_idx1_labels<R: Read>(mut r: R) -> Result<Array1<u8>> {
    let header = read_header(&mut r, "IDX1", LABEL_MAGIC, 1)?;
    let count = header[0];

    let mut data = Vec::new();
    r.read_to_end(&mut data)?;
    if data.len() != count {
        return Err(Error::format(format!(
            "IDX1: expected {count} label bytes, got {}",
            data.len()
        )));
    }
    Ok(Array1::from(data))
}

/// Parse an IDX3 stream (images): magic=2051, count, rows, cols, data.
pub fn parse_idx3_images<R: Read>(mut r: R) -> Result<Array3<u8>> {
    let header = read_header(&mut r, "IDX3", IMAGE_MAGIC, 3)?;
    let (count, rows, cols) = (header[0], header[1], header[2]);
    let expected = count
        .checked_mul(rows)
        .and_then(|n| n.checked_mul(cols))
        .ok_or_else(|| Error::format(format!("IDX3: {count}x{rows}x{cols} overflows")))?;

    let mut data = Vec::new();
    r.read_to_end(&mut data)?;
    if data.len() != expected {
        return Err(Error::format(format!(
            "IDX3: expected {expected} pixel bytes, got {}",
            data.len()
        )));
    }
    Array3::from_shape_vec((count, rows, cols), data)
        .map_err(|e| Error::format(format!("IDX3: {e}")))
}

// Builder helpers

/// Build IDX3 image bytes from raw image data (useful for tests).
pub fn build_idx3_bytes(images: &[&[u8]], rows: u32, cols: u32) -> Vec<u8> {
    let count = images.len() as u32;
    let mut buf = Vec::new();
    buf.extend_from_slice(&IMAGE_MAGIC.to_be_bytes());
    buf.extend_from_slice(&count.to_be_bytes());
    buf.extend_from_slice(&rows.to_be_bytes());
    buf.extend_from_slice(&cols.to_be_bytes());
    for img in images {
        buf.extend_from_slice(img);
    }
    buf
}

/// Build IDX1 label bytes (useful for tests).
pub fn build_idx1_bytes(labels: &[u8]) -> Vec<u8> {
    let count = labels.len() as u32;
    let mut buf = Vec::new();
    buf.extend_from_slice(&LABEL_MAGIC.to_be_bytes());
    buf.extend_from_slice(&count.to_be_bytes());
    buf.extend_from_slice(labels);
    buf
}

/// Wrap bytes in a gzip envelope, as the published archives are.
pub fn gzip_bytes(data: &[u8]) -> Result<Vec<u8>> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data)?;
    Ok(enc.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    fn load(images: &[&[u8]], labels: &[u8], config: MnistConfig) -> Result<Mnist> {
        let img = gzip_bytes(&build_idx3_bytes(images, 2, 2))?;
        let lbl = gzip_bytes(&build_idx1_bytes(labels))?;
        Mnist::from_readers(&img[..], &lbl[..], config)
    }

    #[test]
    fn test_parse_idx3() {
        let img1 = vec![0u8; 4]; // 2×2 image
        let img2 = vec![255u8; 4];
        let bytes = build_idx3_bytes(&[&img1, &img2], 2, 2);
        let images = parse_idx3_images(&bytes[..]).unwrap();
        assert_eq!(images.dim(), (2, 2, 2));
        assert_eq!(images[[0, 1, 1]], 0);
        assert_eq!(images[[1, 0, 1]], 255);
    }

    #[test]
    fn test_parse_idx1() {
        let labels_in = vec![0, 1, 2, 9, 5];
        let bytes = build_idx1_bytes(&labels_in);
        let labels = parse_idx1_labels(&bytes[..]).unwrap();
        assert_eq!(labels.to_vec(), labels_in);
    }

    #[test]
    fn test_invalid_magic_idx3() {
        let mut bytes = build_idx3_bytes(&[&[0u8; 4]], 2, 2);
        bytes[3] = 99; // corrupt magic
        let err = parse_idx3_images(&bytes[..]).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_invalid_magic_idx1() {
        let mut bytes = build_idx1_bytes(&[0, 1]);
        bytes[3] = 99;
        let err = parse_idx1_labels(&bytes[..]).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_truncated_header() {
        let bytes = build_idx3_bytes(&[], 2, 2);
        let err = parse_idx3_images(&bytes[..10]).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_short_and_trailing_data() {
        let mut short = build_idx3_bytes(&[&[1u8; 4]], 2, 2);
        short.pop();
        assert!(matches!(parse_idx3_images(&short[..]), Err(Error::Format(_))));

        let mut long = build_idx1_bytes(&[1, 2]);
        long.push(3);
        assert!(matches!(parse_idx1_labels(&long[..]), Err(Error::Format(_))));
    }

    #[test]
    fn test_count_mismatch() {
        let err = load(&[&[0u8; 4]], &[0, 1], MnistConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_two_example_archive() {
        let ds = load(&[&[0, 51, 102, 255], &[255, 0, 0, 0]], &[3, 7], MnistConfig::default())
            .unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.image_dims(), (2, 2));
        assert_eq!(ds.labels(), &Labels::Classes(arr1(&[3, 7])));
        assert_eq!(ds.image(0).to_vec(), vec![0.0, 0.2, 0.4, 1.0]);
        assert_eq!(ds.image(1).to_vec(), vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(ds.name(), "MNIST-train");
    }

    #[test]
    fn test_one_hot_labels() {
        let ds = load(
            &[&[0u8; 4], &[0u8; 4]],
            &[0, 9],
            MnistConfig::default().one_hot(true),
        )
        .unwrap();
        assert!(ds.is_one_hot());
        match ds.labels() {
            Labels::OneHot(l) => {
                assert_eq!(l.dim(), (2, NUM_CLASSES));
                assert_eq!(l[[0, 0]], 1);
                assert_eq!(l[[1, 9]], 1);
                assert_eq!(l.sum(), 2);
            }
            other => panic!("expected one-hot labels, got {other:?}"),
        }
        assert_eq!(ds.labels().get(1).class(), Some(9));
    }

    #[test]
    fn test_one_hot_out_of_range_label() {
        let err = load(&[&[0u8; 4]], &[12], MnistConfig::default().one_hot(true)).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_next_float32_divides_again() {
        let mut ds = load(
            &[&[255u8; 4]],
            &[1],
            MnistConfig::default().dtype(DType::Float32),
        )
        .unwrap();
        let (image, label) = ds.next().unwrap();
        assert_eq!(label, Label::Class(1));
        for v in image.iter() {
            assert_eq!(*v, 1.0 / 255.0);
        }
    }

    #[test]
    fn test_next_is_deterministic_per_seed() {
        let pixels: Vec<[u8; 4]> = (0..10u8).map(|i| [i; 4]).collect();
        let images: Vec<&[u8]> = pixels.iter().map(|p| &p[..]).collect();
        let labels: Vec<u8> = (0..10).collect();

        let draw = |seed: u64| {
            let mut ds = load(&images, &labels, MnistConfig::default().seed(seed)).unwrap();
            (0..20)
                .map(|_| ds.next().unwrap().1.class().unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(draw(0), draw(0));
        assert_ne!(draw(0), draw(1));
    }

    #[test]
    fn test_reseed_restarts_sequence() {
        let mut ds = load(&[&[0u8; 4], &[1u8; 4], &[2u8; 4]], &[0, 1, 2], MnistConfig::default())
            .unwrap();
        let first: Vec<_> = (0..8).map(|_| ds.next().unwrap().1).collect();
        ds.reseed(0);
        let again: Vec<_> = (0..8).map(|_| ds.next().unwrap().1).collect();
        assert_eq!(first, again);
    }

    #[test]
    fn test_worker_init_small_split() {
        let ds = load(
            &[&[0u8; 4], &[1u8; 4], &[2u8; 4]],
            &[0, 1, 2],
            MnistConfig::default(),
        )
        .unwrap();
        let ds = ds.worker_init(1, 2).unwrap();
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.labels().len(), 1);
        assert_eq!(ds.labels().get(0), Label::Class(2));
    }

    #[test]
    fn test_empty_shard_cannot_sample() {
        let ds = load(&[&[0u8; 4]], &[0], MnistConfig::default()).unwrap();
        let mut ds = ds.worker_init(1, 2).unwrap();
        assert!(ds.is_empty());
        assert!(matches!(ds.next(), Err(Error::Empty)));
    }

    #[test]
    fn test_worker_init_invalid_partition() {
        let ds = load(&[&[0u8; 4]], &[0], MnistConfig::default()).unwrap();
        assert!(matches!(ds.worker_init(0, 0), Err(Error::Config(_))));
    }

    #[test]
    fn test_split_file_names() {
        assert_eq!(
            MnistSplit::Test.file_names(),
            ("t10k-images-idx3-ubyte.gz", "t10k-labels-idx1-ubyte.gz")
        );
        assert_eq!(MnistConfig::default().train(false).split(), MnistSplit::Test);
    }
}
