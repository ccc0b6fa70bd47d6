use std::sync::Arc;
use std::sync::atomic::{
    AtomicBool,
    Ordering,
};
use std::time::{
    Duration,
    Instant,
};

use indicatif::{
    ParallelProgressIterator,
    ProgressBar,
};
use rayon::prelude::*;
use serde::{
    Deserialize,
    Serialize,
};
use tracing::{
    info,
    instrument,
    warn,
};

use super::buckets::{
    MzBucketer,
    PartialAggregate,
};
use super::config::{
    AggregationConfig,
    AggregationMode,
};
use crate::errors::{
    MsiQueryError,
    Result,
};
use crate::models::Spectrum;

/// Which spectra an aggregation runs over.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    #[default]
    All,
    Indices(Vec<usize>),
}

impl Selection {
    /// Spectrum indices in aggregation order.
    pub fn resolve(&self, n_spectra: usize) -> Result<Vec<usize>> {
        let indices: Vec<usize> = match self {
            Selection::All => (0..n_spectra).collect(),
            Selection::Indices(indices) => {
                if let Some(bad) = indices.iter().find(|i| **i >= n_spectra) {
                    return Err(MsiQueryError::invalid(
                        "spectrum index",
                        bad,
                        "index past the last spectrum",
                    ));
                }
                indices.clone()
            }
        };
        if indices.is_empty() {
            return Err(MsiQueryError::EmptySelection {
                context: "no spectra selected for aggregation".into(),
            });
        }
        Ok(indices)
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Selection::All)
    }
}

/// Shared flag checked before every aggregation batch.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AggregationStats {
    pub n_spectra: usize,
    pub batches: usize,
    pub workers: usize,
    /// Output m/z buckets.
    pub n_buckets: usize,
    pub skipped_points: usize,
    pub elapsed: Duration,
}

/// Spectra selected for one run, with an optional per-spectrum weight.
pub(crate) struct AggregationPlan<'a> {
    pub spectra: &'a [Spectrum],
    pub indices: &'a [usize],
    pub weights: Option<&'a [f64]>,
}

impl<'a> AggregationPlan<'a> {
    pub fn new(spectra: &'a [Spectrum], indices: &'a [usize]) -> Self {
        Self {
            spectra,
            indices,
            weights: None,
        }
    }

    fn batches(&self, batch_size: usize) -> Vec<(&'a [usize], Option<&'a [f64]>)> {
        match self.weights {
            Some(weights) => self
                .indices
                .chunks(batch_size)
                .zip(weights.chunks(batch_size))
                .map(|(i, w)| (i, Some(w)))
                .collect(),
            None => self
                .indices
                .chunks(batch_size)
                .map(|i| (i, None))
                .collect(),
        }
    }

    fn partial(
        &self,
        bucketer: &MzBucketer,
        indices: &[usize],
        weights: Option<&[f64]>,
    ) -> PartialAggregate {
        PartialAggregate::accumulate(
            bucketer,
            indices.iter().enumerate().map(|(k, &i)| {
                let weight = weights.map_or(1.0, |w| w[k]);
                (&self.spectra[i], weight)
            }),
        )
    }
}

fn finish(
    partials: Vec<PartialAggregate>,
    bucketer: &MzBucketer,
    mode: AggregationMode,
) -> Result<(Spectrum, usize, usize)> {
    // Merged in batch order, the result does not depend on which worker
    // finished first
    let merged = partials
        .into_iter()
        .fold(PartialAggregate::default(), |acc, x| acc.merge(&x));
    let n_spectra = merged.n_spectra;
    let skipped = merged.skipped_points;
    let divisor = match mode {
        AggregationMode::Sum => 1.0,
        AggregationMode::Mean => n_spectra.max(1) as f64,
    };
    Ok((merged.into_spectrum(bucketer, divisor)?, n_spectra, skipped))
}

/// Group-by-sum of the selected spectra on the calling thread.
///
/// The spectra are cut into the same batches as [`aggregate_batched`], so
/// both paths return bit-identical spectra.
///
/// ```
/// use msiquery::Spectrum;
/// use msiquery::aggregation::{AggregationConfig, aggregate_sequential};
///
/// let spectra = vec![
///     Spectrum::try_new(vec![100.0, 101.0], vec![5.0, 10.0]).unwrap(),
///     Spectrum::try_new(vec![100.0, 101.0], vec![3.0, 7.0]).unwrap(),
///     Spectrum::try_new(vec![101.0], vec![2.0]).unwrap(),
/// ];
/// let out = aggregate_sequential(&spectra, &[0, 1, 2], &AggregationConfig::default()).unwrap();
/// assert_eq!(out.mz(), &[100.0, 101.0]);
/// assert_eq!(out.intensity(), &[8.0, 19.0]);
/// ```
pub fn aggregate_sequential(
    spectra: &[Spectrum],
    indices: &[usize],
    config: &AggregationConfig,
) -> Result<Spectrum> {
    let plan = AggregationPlan::new(spectra, indices);
    Ok(run_sequential(&plan, config)?.0)
}

pub(crate) fn run_sequential(
    plan: &AggregationPlan<'_>,
    config: &AggregationConfig,
) -> Result<(Spectrum, AggregationStats)> {
    config.validate()?;
    check_plan(plan)?;
    let st = Instant::now();
    let bucketer = MzBucketer::new(config.decimals)?;
    let batches = plan.batches(config.batch_size);
    let n_batches = batches.len();
    let partials = batches
        .into_iter()
        .map(|(indices, weights)| plan.partial(&bucketer, indices, weights))
        .collect();
    let (spectrum, n_spectra, skipped_points) = finish(partials, &bucketer, config.mode)?;
    let stats = AggregationStats {
        n_spectra,
        batches: n_batches,
        workers: 1,
        n_buckets: spectrum.len(),
        skipped_points,
        elapsed: st.elapsed(),
    };
    Ok((spectrum, stats))
}

/// Batched map-reduce over the selected spectra.
///
/// Batches of `config.batch_size` spectra are aggregated independently on
/// a dedicated pool of `config.workers()` threads, then the partial
/// results are merged sequentially in batch order. Cancellation is checked
/// before each batch starts.
pub fn aggregate_batched(
    spectra: &[Spectrum],
    indices: &[usize],
    config: &AggregationConfig,
    cancel: &CancellationToken,
    progress: &ProgressBar,
) -> Result<(Spectrum, AggregationStats)> {
    run_batched(&AggregationPlan::new(spectra, indices), config, cancel, progress)
}

#[instrument(skip_all, fields(n_spectra = plan.indices.len()))]
pub(crate) fn run_batched(
    plan: &AggregationPlan<'_>,
    config: &AggregationConfig,
    cancel: &CancellationToken,
    progress: &ProgressBar,
) -> Result<(Spectrum, AggregationStats)> {
    config.validate()?;
    check_plan(plan)?;
    let st = Instant::now();
    let bucketer = MzBucketer::new(config.decimals)?;
    let batches = plan.batches(config.batch_size);
    let n_batches = batches.len();
    let workers = config.workers().min(n_batches).max(1);
    info!(
        "Aggregating {} spectra in {} batches on {} workers",
        plan.indices.len(),
        n_batches,
        workers
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("msiquery-agg-{}", i))
        .build()
        .map_err(|e| MsiQueryError::Worker(format!("Failed to build the worker pool: {}", e)))?;

    progress.set_length(n_batches as u64);
    let partials: Result<Vec<PartialAggregate>> = pool.install(|| {
        batches
            .par_iter()
            .progress_with(progress.clone())
            .map(|(indices, weights)| {
                if cancel.is_cancelled() {
                    return Err(MsiQueryError::Cancelled);
                }
                Ok(plan.partial(&bucketer, indices, *weights))
            })
            .collect()
    });
    let partials = match partials {
        Ok(x) => x,
        Err(e) => {
            if matches!(e, MsiQueryError::Cancelled) {
                warn!("Aggregation cancelled after {:#.2?}", st.elapsed());
            }
            progress.abandon();
            return Err(e);
        }
    };
    if cancel.is_cancelled() {
        warn!("Aggregation cancelled before the merge");
        progress.abandon();
        return Err(MsiQueryError::Cancelled);
    }

    let (spectrum, n_spectra, skipped_points) = finish(partials, &bucketer, config.mode)?;
    progress.finish_and_clear();
    let stats = AggregationStats {
        n_spectra,
        batches: n_batches,
        workers,
        n_buckets: spectrum.len(),
        skipped_points,
        elapsed: st.elapsed(),
    };
    if skipped_points > 0 {
        warn!("{} points with non-finite m/z left out of the aggregate", skipped_points);
    }
    info!(
        "Aggregated {} spectra into {} m/z buckets in {:#.2?}",
        stats.n_spectra, stats.n_buckets, stats.elapsed
    );
    Ok((spectrum, stats))
}

fn check_plan(plan: &AggregationPlan<'_>) -> Result<()> {
    if plan.indices.is_empty() {
        return Err(MsiQueryError::EmptySelection {
            context: "no spectra selected for aggregation".into(),
        });
    }
    if let Some(bad) = plan.indices.iter().find(|i| **i >= plan.spectra.len()) {
        return Err(MsiQueryError::invalid(
            "spectrum index",
            bad,
            "index past the last spectrum",
        ));
    }
    if let Some(weights) = plan.weights {
        if weights.len() != plan.indices.len() {
            return Err(crate::errors::DataProcessingError::ExpectedSlicesSameLength {
                expected: plan.indices.len(),
                other: weights.len(),
                context: "(aggregation weights)".into(),
            }
            .into());
        }
    }
    Ok(())
}
