/*!
 * Spread fetch tasks over a pool of worker threads.
 *
 * Tasks are cut into contiguous batches, one per worker, and handed out through a queue. Workers
 * send each per-file outcome to a collector thread that keeps the tally.
 */

use crate::{
    archive::ArchiveClient,
    catalog::BurstCatalog,
    config::ArchiveConfig,
    matcher::BurstMatcher,
    pipeline::{Pipeline, StepResult},
    planner::{DayPlan, FetchPlanner, FetchTask},
    CallistoResult,
};
use chrono::NaiveDate;
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, info, warn};
use rustc_hash::FxHashSet as HashSet;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    thread::JoinHandle,
    time::{Duration, Instant},
};

const CHANNEL_SIZE: usize = 256;

/// Split `items` into `n` contiguous slices whose lengths differ by at most one.
///
/// The first `len % n` slices get the extra item. Asking for zero slices gives none.
pub fn partition<T: Clone>(items: &[T], n: usize) -> Vec<Vec<T>> {
    if n == 0 {
        return vec![];
    }

    let base = items.len() / n;
    let extra = items.len() % n;

    let mut slices = Vec::with_capacity(n);
    let mut start = 0;
    for i in 0..n {
        let len = base + if i < extra { 1 } else { 0 };
        slices.push(items[start..start + len].to_vec());
        start += len;
    }

    slices
}

/// The contiguous run of tasks one worker processes in order.
#[derive(Debug, Clone)]
pub struct WorkerBatch {
    pub id: usize,
    pub tasks: Vec<FetchTask>,
}

/// Tally of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Archive files converted, not output files written.
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
    pub dates_without_data: usize,
    pub listing_failures: usize,
    pub elapsed: Duration,
}

/// Messages from workers to the collector.
enum Outcome {
    File(StepResult),
    NoData(NaiveDate),
    ListingFailed(NaiveDate),
}

/// Runs fetch tasks on a fixed pool of threads.
pub struct BatchDriver<C> {
    client: Arc<C>,
    config: ArchiveConfig,
    exclusion: Arc<HashSet<String>>,
    matcher: BurstMatcher,
    num_workers: usize,
}

impl<C> BatchDriver<C>
where
    C: ArchiveClient + Send + Sync + 'static,
{
    /// A driver with one worker per CPU.
    pub fn new(client: C, config: ArchiveConfig, exclusion: HashSet<String>, matcher: BurstMatcher) -> Self {
        BatchDriver {
            client: Arc::new(client),
            config,
            exclusion: Arc::new(exclusion),
            matcher,
            num_workers: num_cpus::get(),
        }
    }

    pub fn with_workers(self, num_workers: usize) -> Self {
        BatchDriver {
            num_workers: num_workers.max(1),
            ..self
        }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Fetch and convert everything the tasks select.
    pub fn run(&self, tasks: &[FetchTask], pipeline: &Pipeline) -> CallistoResult<RunSummary> {
        let start = Instant::now();
        let batches = self.queue_batches(tasks)?;

        let (to_collector, from_workers) = bounded(CHANNEL_SIZE);
        let collector = collector_thread(from_workers)?;

        let mut handles = Vec::with_capacity(self.num_workers);
        for i in 0..self.num_workers {
            let batches = batches.clone();
            let to_collector = to_collector.clone();
            let client = Arc::clone(&self.client);
            let exclusion = Arc::clone(&self.exclusion);
            let config = self.config.clone();
            let matcher = self.matcher.clone();
            let pipeline = pipeline.clone();

            let jh = std::thread::Builder::new()
                .name(format!("callisto-fetch-{}", i))
                .spawn(move || -> CallistoResult<()> {
                    let planner = FetchPlanner::new(&*client, &config, &exclusion, &matcher);

                    for batch in batches {
                        debug!(target: "driver", "batch {} with {} dates", batch.id, batch.tasks.len());

                        for task in &batch.tasks {
                            match planner.plan(task) {
                                Ok(DayPlan::NoData) => {
                                    to_collector.send(Outcome::NoData(task.date))?;
                                }
                                Ok(DayPlan::Files(files)) => {
                                    for file in &files {
                                        let result = pipeline.process(&*client, file);
                                        to_collector.send(Outcome::File(result))?;
                                    }
                                    info!(target: "driver", "{} done, {} files", task.date, files.len());
                                }
                                Err(err) => {
                                    warn!(target: "driver", "unable to list {}: {}", task.date, err);
                                    to_collector.send(Outcome::ListingFailed(task.date))?;
                                }
                            }
                        }
                    }

                    Ok(())
                })?;

            handles.push(jh);
        }
        drop(to_collector);

        let (_, joined) = join_all(handles);

        let mut summary = collector
            .join()
            .map_err(|_| "collector thread panicked")?;
        joined?;
        summary.elapsed = start.elapsed();

        info!(
            target: "driver",
            "{} written, {} skipped, {} failed, {} dates without data in {:.1}s",
            summary.written,
            summary.skipped,
            summary.failed,
            summary.dates_without_data,
            summary.elapsed.as_secs_f64()
        );

        Ok(summary)
    }

    /// Record the names of the files the tasks select in the catalog's burst file table.
    ///
    /// Each batch writes to its own partial catalog in `scratch_dir`. The partials are merged into
    /// `catalog_path` once every worker is done, then deleted, even when a worker failed. Returns
    /// the number of new names.
    pub fn update_catalog<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        tasks: &[FetchTask],
        catalog_path: P,
        scratch_dir: Q,
    ) -> CallistoResult<usize> {
        let scratch_dir = scratch_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&scratch_dir)?;

        let batches = self.queue_batches(tasks)?;

        let mut handles: Vec<JoinHandle<CallistoResult<()>>> = Vec::with_capacity(self.num_workers);
        for i in 0..self.num_workers {
            let batches = batches.clone();
            let client = Arc::clone(&self.client);
            let exclusion = Arc::clone(&self.exclusion);
            let config = self.config.clone();
            let matcher = self.matcher.clone();
            let scratch_dir = scratch_dir.clone();

            let jh = std::thread::Builder::new()
                .name(format!("callisto-catalog-{}", i))
                .spawn(move || -> CallistoResult<()> {
                    let planner = FetchPlanner::new(&*client, &config, &exclusion, &matcher);

                    for batch in batches {
                        let mut partial = BurstCatalog::connect(partial_path(&scratch_dir, batch.id))?;

                        for task in &batch.tasks {
                            match planner.plan(task) {
                                Ok(DayPlan::Files(files)) => {
                                    let n = partial.add_burst_files(files.iter().map(|f| &f.fname))?;
                                    info!(target: "driver", "{}: {} burst files", task.date, n);
                                }
                                Ok(DayPlan::NoData) => {}
                                Err(err) => {
                                    warn!(target: "driver", "unable to list {}: {}", task.date, err);
                                }
                            }
                        }
                    }

                    Ok(())
                })?;

            handles.push(jh);
        }

        let (_, joined) = join_all(handles);

        let partials: Vec<PathBuf> = (0..self.num_workers)
            .map(|id| partial_path(&scratch_dir, id))
            .filter(|path| path.is_file())
            .collect();

        let merged = merge_partials(catalog_path, &partials);
        for path in partials.iter().filter(|path| path.exists()) {
            if let Err(err) = std::fs::remove_file(path) {
                warn!(target: "driver", "unable to remove {}: {}", path.display(), err);
            }
        }

        joined?;
        merged
    }

    fn queue_batches(&self, tasks: &[FetchTask]) -> CallistoResult<Receiver<WorkerBatch>> {
        let batches: Vec<WorkerBatch> = partition(tasks, self.num_workers)
            .into_iter()
            .enumerate()
            .filter(|(_, tasks)| !tasks.is_empty())
            .map(|(id, tasks)| WorkerBatch { id, tasks })
            .collect();

        let (to_workers, from_queue): (Sender<WorkerBatch>, Receiver<WorkerBatch>) =
            bounded(batches.len().max(1));
        for batch in batches {
            to_workers.send(batch)?;
        }

        Ok(from_queue)
    }
}

fn partial_path(scratch_dir: &Path, batch_id: usize) -> PathBuf {
    scratch_dir.join(format!("partial_{}.sqlite", batch_id))
}

/// Copy every partial catalog's burst files into the main catalog and delete the partials.
fn merge_partials<P: AsRef<Path>>(catalog_path: P, partials: &[PathBuf]) -> CallistoResult<usize> {
    let mut catalog = BurstCatalog::connect(catalog_path)?;
    let mut added = 0;

    for path in partials {
        let names = {
            let partial = BurstCatalog::open_existing(path)?;
            partial.burst_files(None)?
        };

        added += catalog.add_burst_files(names.iter())?;
        std::fs::remove_file(path)?;
    }

    info!(target: "driver", "merged {} partial catalogs, {} new burst files", partials.len(), added);

    Ok(added)
}

fn collector_thread(from_workers: Receiver<Outcome>) -> CallistoResult<JoinHandle<RunSummary>> {
    let jh = std::thread::Builder::new()
        .name("callisto-collector".to_owned())
        .spawn(move || {
            let mut summary = RunSummary::default();

            for outcome in from_workers {
                match outcome {
                    Outcome::File(StepResult::Written(_)) => summary.written += 1,
                    Outcome::File(StepResult::Skipped(_)) => summary.skipped += 1,
                    Outcome::File(StepResult::Failed(_)) => summary.failed += 1,
                    Outcome::NoData(date) => {
                        info!(target: "driver", "no data for {}", date);
                        summary.dates_without_data += 1;
                    }
                    Outcome::ListingFailed(_) => summary.listing_failures += 1,
                }
            }

            summary
        })?;

    Ok(jh)
}

/// Join every worker, keeping the values of those that finished and the first failure.
fn join_all<T>(handles: Vec<JoinHandle<CallistoResult<T>>>) -> (Vec<T>, CallistoResult<()>) {
    let mut values = Vec::with_capacity(handles.len());
    let mut first_err = Ok(());

    for jh in handles {
        let result = match jh.join() {
            Ok(result) => result,
            Err(_) => Err("worker thread panicked".into()),
        };

        match result {
            Ok(val) => values.push(val),
            Err(err) => {
                warn!(target: "driver", "worker failed: {}", err);
                if first_err.is_ok() {
                    first_err = Err(err);
                }
            }
        }
    }

    (values, first_err)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partition() {
        let items: Vec<u32> = (0..10).collect();
        let parts = partition(&items, 4);

        let lens: Vec<usize> = parts.iter().map(|p| p.len()).collect();
        assert_eq!(lens, vec![3, 3, 2, 2]);

        let joined: Vec<u32> = parts.concat();
        assert_eq!(joined, items);
    }

    #[test]
    fn test_partition_edges() {
        let items = [1, 2];
        let lens: Vec<usize> = partition(&items, 4).iter().map(|p| p.len()).collect();
        assert_eq!(lens, vec![1, 1, 0, 0]);

        assert!(partition(&items, 0).is_empty());
        assert_eq!(partition::<u8>(&[], 3), vec![vec![], vec![], vec![]]);
    }

    #[test]
    fn test_join_all_waits_for_every_worker() {
        let (tx, rx) = bounded(4);

        let handles: Vec<JoinHandle<CallistoResult<u32>>> = (0..4u32)
            .map(|i| {
                let tx = tx.clone();
                std::thread::spawn(move || -> CallistoResult<u32> {
                    if i == 0 {
                        return Err("first worker failed".into());
                    }
                    std::thread::sleep(Duration::from_millis(20));
                    tx.send(i)?;
                    Ok(i)
                })
            })
            .collect();
        drop(tx);

        let (values, joined) = join_all(handles);

        assert_eq!(values, vec![1, 2, 3]);
        assert!(joined.is_err());

        // Every surviving worker finished before join_all returned.
        let mut sent: Vec<u32> = rx.try_iter().collect();
        sent.sort_unstable();
        assert_eq!(sent, vec![1, 2, 3]);
    }
}
