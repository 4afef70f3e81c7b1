use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

use crate::data::batch::{Batch, Sample};
use crate::error::{Result, TrainError};

/// Source of mini-batches for one epoch.
///
/// The iterator owns what it needs, so the caller can keep mutating the
/// model and optimizer while pulling batches. Whatever prefetching an
/// implementation does stays behind this seam.
pub trait BatchLoader {
    /// Number of batches the next call to `batches` will yield.
    fn num_batches(&self) -> usize;

    fn batches(&mut self) -> Box<dyn Iterator<Item = Result<Batch>>>;
}

/// Loader over samples held in memory.
pub struct InMemoryLoader {
    samples: Arc<[Sample]>,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    rng: StdRng,
}

impl InMemoryLoader {
    /// Training loader: reshuffles every epoch and drops the trailing
    /// incomplete batch.
    pub fn new(samples: Vec<Sample>, batch_size: usize, seed: u64) -> Result<InMemoryLoader> {
        if batch_size == 0 {
            return Err(TrainError::config("batch_size must be at least 1"));
        }
        Ok(InMemoryLoader {
            samples: samples.into(),
            batch_size,
            shuffle: true,
            drop_last: true,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Evaluation loader: fixed order, keeps the trailing partial batch.
    pub fn sequential(samples: Vec<Sample>, batch_size: usize) -> Result<InMemoryLoader> {
        let mut loader = InMemoryLoader::new(samples, batch_size, 0)?;
        loader.shuffle = false;
        loader.drop_last = false;
        Ok(loader)
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }
}

impl BatchLoader for InMemoryLoader {
    fn num_batches(&self) -> usize {
        let n = self.samples.len();
        if self.drop_last { n / self.batch_size } else { n.div_ceil(self.batch_size) }
    }

    fn batches(&mut self) -> Box<dyn Iterator<Item = Result<Batch>>> {
        let mut order: Vec<usize> = (0..self.samples.len()).collect();
        if self.shuffle {
            order.shuffle(&mut self.rng);
        }
        order.truncate(self.num_batches() * self.batch_size);

        let samples = Arc::clone(&self.samples);
        let batch_size = self.batch_size;
        let n_batches = self.num_batches();
        Box::new((0..n_batches).map(move |k| {
            let end = ((k + 1) * batch_size).min(order.len());
            let picked: Vec<&Sample> = order[k * batch_size..end].iter().map(|&i| &samples[i]).collect();
            Batch::collate(&picked)
        }))
    }
}

/// Randomly partitions `samples` into a training and a held-out part.
///
/// The training part receives `floor(n · fraction)` samples, plus the one
/// sample left over when the two floors do not add up to `n`; that is,
/// `ceil(n · fraction)`.
pub fn random_split<R: Rng + ?Sized>(
    mut samples: Vec<Sample>,
    fraction: f64,
    rng: &mut R,
) -> Result<(Vec<Sample>, Vec<Sample>)> {
    if !(fraction > 0.0 && fraction <= 1.0) {
        return Err(TrainError::config(format!("split fraction {fraction} must lie in (0, 1]")));
    }
    let n = samples.len();
    // The epsilon absorbs representation error such as 10 · 0.8 = 8.000…1.
    let train_len = (((n as f64) * fraction - 1e-9).ceil().max(0.0) as usize).min(n);
    samples.shuffle(rng);
    let rest = samples.split_off(train_len);
    Ok((samples, rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::tensor::Tensor;

    fn samples(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| Sample {
                image: Tensor::filled(&[1, 2, 2, 2], i as f32),
                label: Tensor::zeros(&[1, 2, 2, 2]),
            })
            .collect()
    }

    #[test]
    fn drop_last_discards_trailing_partial_batch() {
        let mut loader = InMemoryLoader::new(samples(7), 2, 1).unwrap();
        assert_eq!(loader.num_batches(), 3);
        let batches: Vec<Batch> = loader.batches().collect::<Result<_>>().unwrap();
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| b.len() == 2));
    }

    #[test]
    fn sequential_keeps_order_and_remainder() {
        let mut loader = InMemoryLoader::sequential(samples(5), 2).unwrap();
        assert_eq!(loader.num_batches(), 3);
        let batches: Vec<Batch> = loader.batches().collect::<Result<_>>().unwrap();
        assert_eq!(batches[2].len(), 1);
        assert_eq!(batches[0].image.data[0], 0.0);
        assert_eq!(batches[2].image.data[0], 4.0);
    }

    #[test]
    fn shuffling_covers_each_sample_once_per_epoch() {
        let mut loader = InMemoryLoader::new(samples(6), 3, 9).unwrap();
        for _ in 0..3 {
            let mut seen: Vec<u32> = loader.batches()
                .map(|b| b.unwrap())
                .flat_map(|b| (0..b.len()).map(move |i| b.image.sample(i).unwrap().data[0] as u32))
                .collect();
            seen.sort_unstable();
            assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);
        }
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        assert!(matches!(InMemoryLoader::new(samples(2), 0, 0), Err(TrainError::Config(_))));
    }

    #[test]
    fn random_split_sizes() {
        let mut rng = StdRng::seed_from_u64(0);
        let (train, held) = random_split(samples(10), 0.8, &mut rng).unwrap();
        assert_eq!((train.len(), held.len()), (8, 2));
        let (train, held) = random_split(samples(7), 0.8, &mut rng).unwrap();
        assert_eq!((train.len(), held.len()), (6, 1));
        let (train, held) = random_split(samples(3), 1.0, &mut rng).unwrap();
        assert_eq!((train.len(), held.len()), (3, 0));
        assert!(random_split(samples(3), 0.0, &mut rng).is_err());
    }
}
