use itertools::Itertools;
use log::info;
use rand::{seq::SliceRandom, SeedableRng};
use rand_isaac::Isaac64Rng;
use std::path::{Path, PathBuf};

use crate::config::SplitConfig;
use crate::error::{Error, Result};
use crate::feature::{build_from_files, label_and_concat, save_feature_table, FeatureInputs, FeatureRow};

pub const FINAL_DATASET: &str = "final_dataset.csv";
pub const TRAIN_DATASET: &str = "train_dataset.csv";
pub const TEST_DATASET: &str = "test_dataset.csv";

/// Stratified train/test partition of a dataset.
#[derive(Debug, Clone)]
pub struct Split {
    pub train: Vec<FeatureRow>,
    pub test: Vec<FeatureRow>,
}

/// Split rows into train and test sets while preserving the label ratio.
///
/// The test set has `ceil(test_size * n)` rows, distributed across labels
/// in proportion to their frequency (largest remainder). The result only
/// depends on the input order and `seed`.
pub fn stratified_split(rows: &[FeatureRow], test_size: f64, seed: u64) -> Result<Split> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(Error::InvalidArgument(format!("test_size must be in (0, 1), got {}", test_size)));
    }
    let n = rows.len();
    if n == 0 {
        return Ok(Split { train: Vec::new(), test: Vec::new() });
    }
    let n_test = (test_size * n as f64).ceil() as usize;
    if n_test >= n {
        return Err(Error::InvalidArgument(format!(
            "test_size {} leaves no training rows out of {}", test_size, n
        )));
    }

    let mut rng = Isaac64Rng::seed_from_u64(seed);
    let classes: Vec<(u8, Vec<usize>)> = rows.iter().enumerate()
        .map(|(i, x)| (x.label, i))
        .into_group_map()
        .into_iter()
        .sorted_by_key(|(label, _)| *label)
        .collect();

    // Largest remainder allocation of the test rows.
    let quotas: Vec<f64> = classes.iter()
        .map(|(_, idx)| n_test as f64 * idx.len() as f64 / n as f64)
        .collect();
    let mut alloc: Vec<usize> = quotas.iter().map(|q| q.floor() as usize).collect();
    let remaining = n_test - alloc.iter().sum::<usize>();
    let by_remainder: Vec<usize> = (0..classes.len())
        .sorted_by(|a, b| (quotas[*b] - quotas[*b].floor())
            .total_cmp(&(quotas[*a] - quotas[*a].floor()))
            .then(a.cmp(b)))
        .collect();
    let bumped: Vec<usize> = by_remainder.into_iter().filter(|&i| alloc[i] < classes[i].1.len())
        .take(remaining).collect();
    bumped.into_iter().for_each(|i| alloc[i] += 1);

    let mut train_idx = Vec::with_capacity(n - n_test);
    let mut test_idx = Vec::with_capacity(n_test);
    for ((_, mut idx), k) in classes.into_iter().zip(alloc) {
        idx.shuffle(&mut rng);
        test_idx.extend_from_slice(&idx[..k]);
        train_idx.extend_from_slice(&idx[k..]);
    }
    train_idx.shuffle(&mut rng);
    test_idx.shuffle(&mut rng);

    Ok(Split {
        train: train_idx.into_iter().map(|i| rows[i].clone()).collect(),
        test: test_idx.into_iter().map(|i| rows[i].clone()).collect(),
    })
}

/// Uniformly sample `n` rows without replacement.
pub fn downsample(rows: &[FeatureRow], n: usize, seed: u64) -> Result<Vec<FeatureRow>> {
    if n > rows.len() {
        return Err(Error::InvalidArgument(format!(
            "cannot sample {} rows from a table with {} rows", n, rows.len()
        )));
    }
    let mut rng = Isaac64Rng::seed_from_u64(seed);
    Ok(rand::seq::index::sample(&mut rng, rows.len(), n).into_iter()
        .map(|i| rows[i].clone())
        .collect())
}

/// Paths written by [`build_dataset`].
#[derive(Debug, Clone)]
pub struct DatasetFiles {
    pub combined: PathBuf,
    pub train: PathBuf,
    pub test: PathBuf,
    pub n_positive: usize,
    pub n_negative: usize,
}

/// Build the labelled dataset from positive and negative inputs and save
/// the combined table along with its train/test split.
pub fn build_dataset<P: AsRef<Path>>(
    positive: &FeatureInputs,
    negative: &FeatureInputs,
    out_dir: P,
    split: &SplitConfig,
) -> Result<DatasetFiles> {
    let pos = build_from_files(positive)?;
    let neg = build_from_files(negative)?;
    let (n_positive, n_negative) = (pos.len(), neg.len());
    let rows = label_and_concat(pos, neg);
    let Split { train, test } = stratified_split(&rows, split.test_size, split.seed)?;

    let out_dir = out_dir.as_ref();
    std::fs::create_dir_all(out_dir)
        .map_err(|source| Error::File { path: out_dir.to_path_buf(), source })?;
    let files = DatasetFiles {
        combined: out_dir.join(FINAL_DATASET),
        train: out_dir.join(TRAIN_DATASET),
        test: out_dir.join(TEST_DATASET),
        n_positive,
        n_negative,
    };
    save_feature_table(&files.combined, &rows)?;
    info!("Saved {} with {} examples ({} positive, {} negative)",
        files.combined.display(), rows.len(), n_positive, n_negative);
    save_feature_table(&files.train, &train)?;
    save_feature_table(&files.test, &test)?;
    info!("Saved {} training and {} testing examples", train.len(), test.len());
    Ok(files)
}
