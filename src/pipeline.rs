// Threaded diff pipeline.
//
//   producer ──▶ [revision queue ×N] ──▶ worker ×N ──▶ [diff queue ×N] ──▶ consumer
//
// Articles are routed to shards by id, so every article is handled by one
// worker that owns its own `DiffDriver`; shards share no mutable state.
// Queues are bounded and every blocking send/receive gives up after the
// configured timeout, surfacing a stalled stage as `PipelineError::Timeout`.
//
// Article-level driver errors (task order, verification) are logged and
// collected in the report; they do not stop the worker.

use std::thread;
use std::time::Duration;

use crossbeam_channel::{
    self as channel, Receiver, RecvTimeoutError, Select, SendTimeoutError, Sender,
};
use log::{debug, warn};
use thiserror::Error;

use crate::config::DiffConfig;
use crate::diff::Diff;
use crate::driver::{DiffDriver, DriverError, DriverStats};
use crate::revision::Revision;
use crate::task::Task;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} queue: no progress within {timeout:?}")]
    Timeout {
        stage: &'static str,
        timeout: Duration,
    },
    #[error("{stage} queue closed")]
    Closed { stage: &'static str },
    #[error("shard {shard} worker panicked")]
    WorkerPanicked { shard: usize },
    #[error("producer thread panicked")]
    ProducerPanicked,
    #[error("consumer failed: {0}")]
    Consumer(String),
    #[error(transparent)]
    Driver(#[from] DriverError),
}

// ---------------------------------------------------------------------------
// Bounded queues
// ---------------------------------------------------------------------------

/// Sending half of a bounded stage queue.
#[derive(Debug, Clone)]
pub struct TaskSender<T> {
    inner: Sender<T>,
    stage: &'static str,
    timeout: Duration,
}

/// Receiving half of a bounded stage queue.
#[derive(Debug)]
pub struct TaskReceiver<T> {
    inner: Receiver<T>,
    stage: &'static str,
    timeout: Duration,
}

/// Bounded queue for one pipeline stage.
pub fn queue<T>(
    stage: &'static str,
    capacity: usize,
    timeout: Duration,
) -> (TaskSender<T>, TaskReceiver<T>) {
    let (tx, rx) = channel::bounded(capacity);
    (
        TaskSender {
            inner: tx,
            stage,
            timeout,
        },
        TaskReceiver {
            inner: rx,
            stage,
            timeout,
        },
    )
}

impl<T> TaskSender<T> {
    /// Block until there is room, at most for the queue timeout.
    pub fn send(&self, item: T) -> Result<(), PipelineError> {
        self.inner
            .send_timeout(item, self.timeout)
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => PipelineError::Timeout {
                    stage: self.stage,
                    timeout: self.timeout,
                },
                SendTimeoutError::Disconnected(_) => PipelineError::Closed { stage: self.stage },
            })
    }
}

impl<T> TaskReceiver<T> {
    /// Next item; `Ok(None)` once every sender is gone and the queue drained.
    pub fn recv(&self) -> Result<Option<T>, PipelineError> {
        match self.inner.recv_timeout(self.timeout) {
            Ok(item) => Ok(Some(item)),
            Err(RecvTimeoutError::Disconnected) => Ok(None),
            Err(RecvTimeoutError::Timeout) => Err(PipelineError::Timeout {
                stage: self.stage,
                timeout: self.timeout,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

/// Outcome of one shard worker.
#[derive(Debug, Default)]
pub struct WorkerReport {
    pub shard: usize,
    pub tasks_in: u64,
    pub stats: DriverStats,
    pub errors: Vec<DriverError>,
}

/// Shard an article is routed to.
pub fn shard_for(article_id: u64, shards: usize) -> usize {
    (article_id % shards.max(1) as u64) as usize
}

/// Drive `input` through `driver` until the queue closes.
pub fn run_worker(
    shard: usize,
    mut driver: DiffDriver,
    input: TaskReceiver<Task<Revision>>,
    output: TaskSender<Task<Diff>>,
) -> Result<WorkerReport, PipelineError> {
    let mut report = WorkerReport {
        shard,
        ..Default::default()
    };
    while let Some(task) = input.recv()? {
        report.tasks_in += 1;
        match driver.process(task) {
            Ok(done) => {
                for task in done {
                    output.send(task)?;
                }
            }
            Err(err) => {
                warn!("shard {shard}: {err}");
                report.errors.push(err);
            }
        }
    }
    driver.reset();
    report.stats = *driver.stats();
    debug!(
        "shard {shard} done: {} tasks in, {} diffs out",
        report.tasks_in, report.stats.diffs_out
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// Sharded pipeline
// ---------------------------------------------------------------------------

/// Totals over all shards.
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub tasks_in: u64,
    pub tasks_out: u64,
    pub stats: DriverStats,
    /// Article-level failures; the rest of the pipeline kept running.
    pub errors: Vec<DriverError>,
}

/// Run `tasks` through `shards` workers and hand every diff task to
/// `consume` on the calling thread.
///
/// Tasks of one article reach `consume` in part order. The first consumer
/// error stops the pipeline and is returned.
pub fn run_sharded<I, F>(
    config: &DiffConfig,
    shards: usize,
    tasks: I,
    mut consume: F,
) -> Result<PipelineReport, PipelineError>
where
    I: IntoIterator<Item = Task<Revision>>,
    I::IntoIter: Send,
    F: FnMut(Task<Diff>) -> Result<(), PipelineError>,
{
    config.validate().map_err(DriverError::from)?;
    let shards = shards.max(1);
    let (capacity, timeout) = (config.queue_capacity, config.queue_timeout);

    thread::scope(|scope| {
        let mut inputs = Vec::with_capacity(shards);
        let mut outputs = Vec::with_capacity(shards);
        let mut workers = Vec::with_capacity(shards);
        for shard in 0..shards {
            let (in_tx, in_rx) = queue("revision", capacity, timeout);
            let (out_tx, out_rx) = queue("diff", capacity, timeout);
            let driver = DiffDriver::new(config.clone())?;
            workers.push(scope.spawn(move || run_worker(shard, driver, in_rx, out_tx)));
            inputs.push(in_tx);
            outputs.push(out_rx);
        }

        let source = tasks.into_iter();
        let producer = scope.spawn(move || -> Result<u64, PipelineError> {
            let mut sent = 0;
            for task in source {
                inputs[shard_for(task.article_id(), inputs.len())].send(task)?;
                sent += 1;
            }
            Ok(sent)
        });

        let consumed = drain(&outputs, timeout, &mut consume);
        // Unblocks workers (and through them the producer) after a failure.
        drop(outputs);

        let produced = producer
            .join()
            .map_err(|_| PipelineError::ProducerPanicked)?;
        let mut report = PipelineReport::default();
        let mut worker_failure = None;
        for (shard, handle) in workers.into_iter().enumerate() {
            match handle.join() {
                Ok(Ok(worker)) => {
                    report.stats.merge(&worker.stats);
                    report.errors.extend(worker.errors);
                }
                Ok(Err(err)) => {
                    worker_failure.get_or_insert(err);
                }
                Err(_) => {
                    worker_failure.get_or_insert(PipelineError::WorkerPanicked { shard });
                }
            }
        }

        report.tasks_out = consumed?;
        report.tasks_in = produced?;
        if let Some(err) = worker_failure {
            return Err(err);
        }
        Ok(report)
    })
}

/// Receive from every shard until all of them have closed.
fn drain<F>(
    outputs: &[TaskReceiver<Task<Diff>>],
    timeout: Duration,
    consume: &mut F,
) -> Result<u64, PipelineError>
where
    F: FnMut(Task<Diff>) -> Result<(), PipelineError>,
{
    let mut open: Vec<usize> = (0..outputs.len()).collect();
    let mut received = 0;
    while !open.is_empty() {
        let mut select = Select::new();
        for &shard in &open {
            select.recv(&outputs[shard].inner);
        }
        let op = select
            .select_timeout(timeout)
            .map_err(|_| PipelineError::Timeout {
                stage: "diff",
                timeout,
            })?;
        let slot = op.index();
        match op.recv(&outputs[open[slot]].inner) {
            Ok(task) => {
                consume(task)?;
                received += 1;
            }
            Err(_) => {
                open.remove(slot);
            }
        }
    }
    Ok(received)
}

// ---------------------------------------------------------------------------
// Data-parallel variant
// ---------------------------------------------------------------------------

/// Diff whole articles concurrently, one driver per article.
///
/// `articles` holds each article's revision tasks in part order. Results
/// come back in input order.
#[cfg(feature = "parallel")]
pub fn diff_articles_parallel(
    config: &DiffConfig,
    articles: Vec<Vec<Task<Revision>>>,
) -> Vec<Result<Vec<Task<Diff>>, DriverError>> {
    articles
        .into_par_iter()
        .map(|tasks| {
            let mut driver = DiffDriver::new(config.clone())?;
            let mut out = Vec::new();
            for task in tasks {
                out.extend(driver.process(task)?);
            }
            Ok(out)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskHeader, TaskType};
    use chrono::{TimeZone, Utc};

    fn article(id: u64, revisions: usize) -> Task<Revision> {
        let payload = (0..revisions)
            .map(|i| {
                let ts = Utc.timestamp_opt(1_100_000_000 + i as i64, 0).unwrap();
                let text = format!("article {id} body, edit {i}");
                Revision::new(i as u64, id * 1000 + i as u64, ts, text)
            })
            .collect();
        Task::with_payload(TaskHeader::new(id, format!("A{id}")), 0, TaskType::Full, payload)
    }

    #[test]
    fn queue_times_out_when_full() {
        let (tx, _rx) = queue::<u32>("test", 1, Duration::from_millis(10));
        tx.send(1).unwrap();
        assert!(matches!(
            tx.send(2),
            Err(PipelineError::Timeout { stage: "test", .. })
        ));
    }

    #[test]
    fn queue_reports_end_and_timeout() {
        let (tx, rx) = queue::<u32>("test", 4, Duration::from_millis(10));
        assert!(matches!(rx.recv(), Err(PipelineError::Timeout { .. })));
        tx.send(7).unwrap();
        drop(tx);
        assert_eq!(rx.recv().unwrap(), Some(7));
        assert_eq!(rx.recv().unwrap(), None);
    }

    #[test]
    fn send_to_closed_queue_fails() {
        let (tx, rx) = queue::<u32>("test", 4, Duration::from_millis(10));
        drop(rx);
        assert!(matches!(tx.send(1), Err(PipelineError::Closed { .. })));
    }

    #[test]
    fn shard_routing_is_stable() {
        assert_eq!(shard_for(10, 4), 2);
        assert_eq!(shard_for(10, 0), 0);
    }

    #[test]
    fn sharded_run_processes_every_article() {
        let config = DiffConfig::default();
        let tasks: Vec<_> = (1..=12).map(|id| article(id, 5)).collect();
        let mut seen = Vec::new();
        let report = run_sharded(&config, 3, tasks, |task| {
            seen.push(task.article_id());
            Ok(())
        })
        .unwrap();
        seen.sort_unstable();
        assert_eq!(seen, (1..=12).collect::<Vec<_>>());
        assert_eq!(report.tasks_in, 12);
        assert_eq!(report.tasks_out, 12);
        assert_eq!(report.stats.revisions_in, 60);
        assert_eq!(report.stats.diffs_out, 60);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn consumer_error_stops_the_run() {
        let config = DiffConfig {
            queue_capacity: 1,
            ..Default::default()
        };
        let tasks: Vec<_> = (1..=20).map(|id| article(id, 2)).collect();
        let err = run_sharded(&config, 2, tasks, |_| {
            Err(PipelineError::Consumer("disk full".into()))
        })
        .unwrap_err();
        assert!(matches!(err, PipelineError::Consumer(_)));
    }

    #[test]
    fn article_errors_are_collected() {
        let config = DiffConfig::default();
        let orphan =
            Task::with_payload(TaskHeader::new(4, "orphan"), 3, TaskType::Partial, vec![]);
        let tasks = vec![article(1, 2), orphan, article(2, 2)];
        let report = run_sharded(&config, 1, tasks, |_| Ok(())).unwrap();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].article_id(), Some(4));
        assert_eq!(report.tasks_out, 2);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn parallel_articles_match_sequential() {
        let config = DiffConfig::default();
        let articles: Vec<_> = (1..=6).map(|id| vec![article(id, 4)]).collect();
        let results = diff_articles_parallel(&config, articles.clone());
        for (tasks, result) in articles.into_iter().zip(results) {
            let mut driver = DiffDriver::new(config.clone()).unwrap();
            let expected: Vec<_> = tasks
                .into_iter()
                .flat_map(|t| driver.process(t).unwrap())
                .collect();
            assert_eq!(result.unwrap(), expected);
        }
    }
}
