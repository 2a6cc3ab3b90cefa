use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

use crate::embedding::embedding_generator::{EmbeddingError, EmbeddingGenerator, FaceEmbedder};
use crate::pipeline::batch_executor::{embed_file, BatchExecutor, FileResult};
use crate::shared::config::FaceIndexConfig;

/// Builds the embedder a worker owns for its whole lifetime.
pub type EmbedderFactory =
    Arc<dyn Fn() -> Result<Box<dyn FaceEmbedder>, EmbeddingError> + Send + Sync>;

/// Factory giving each worker its own ONNX-backed generator.
pub fn onnx_factory(config: FaceIndexConfig) -> EmbedderFactory {
    Arc::new(move || -> Result<Box<dyn FaceEmbedder>, EmbeddingError> {
        Ok(Box::new(EmbeddingGenerator::with_onnx_models(&config)?))
    })
}

struct Job {
    slot: usize,
    path: PathBuf,
}

struct Done {
    slot: usize,
    result: FileResult,
}

/// Fixed pool of long-lived embedding workers.
///
/// Layout: `driver → job channel → N workers → done channel → driver`
///
/// Each worker builds its own embedder (and therefore its own model
/// sessions) once, then serves jobs until the executor is dropped.
pub struct ThreadedBatchExecutor {
    job_tx: Option<Sender<Job>>,
    done_rx: Receiver<Done>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadedBatchExecutor {
    pub fn new(worker_count: usize, factory: EmbedderFactory) -> Self {
        let worker_count = worker_count.max(1);
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<Job>();
        let (done_tx, done_rx) = crossbeam_channel::unbounded::<Done>();

        let workers = (0..worker_count)
            .map(|id| spawn_worker(id, factory.clone(), job_rx.clone(), done_tx.clone()))
            .collect();
        log::info!("Started {worker_count} embedding workers");

        Self {
            job_tx: Some(job_tx),
            done_rx,
            workers,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

fn spawn_worker(
    id: usize,
    factory: EmbedderFactory,
    job_rx: Receiver<Job>,
    done_tx: Sender<Done>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut embedder = match factory() {
            Ok(embedder) => Some(embedder),
            Err(e) => {
                log::error!("Worker {id} could not load models: {e}");
                None
            }
        };

        for job in job_rx {
            let result = match embedder.as_mut() {
                Some(embedder) => {
                    panic::catch_unwind(AssertUnwindSafe(|| embed_file(&mut **embedder, &job.path)))
                        .unwrap_or_else(|_| FileResult::Failed("worker panicked".into()))
                }
                None => FileResult::Failed("models unavailable in worker".into()),
            };
            if done_tx.send(Done { slot: job.slot, result }).is_err() {
                break;
            }
        }
        log::debug!("Worker {id} stopped");
    })
}

impl BatchExecutor for ThreadedBatchExecutor {
    fn process(&mut self, batch: &[PathBuf]) -> Vec<FileResult> {
        let mut results: Vec<Option<FileResult>> = vec![None; batch.len()];
        let Some(job_tx) = self.job_tx.as_ref() else {
            return vec![FileResult::Failed("executor shut down".into()); batch.len()];
        };

        let mut sent = 0;
        for (slot, path) in batch.iter().enumerate() {
            if job_tx
                .send(Job {
                    slot,
                    path: path.clone(),
                })
                .is_err()
            {
                break;
            }
            sent += 1;
        }

        for _ in 0..sent {
            match self.done_rx.recv() {
                Ok(done) => results[done.slot] = Some(done.result),
                Err(_) => break,
            }
        }

        results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| FileResult::Failed("worker pool stopped".into())))
            .collect()
    }
}

impl Drop for ThreadedBatchExecutor {
    fn drop(&mut self) {
        // Closing the job channel ends every worker loop.
        self.job_tx.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::warn!("Embedding worker panicked during shutdown");
            }
        }
    }
}
