use nalgebra::DMatrix;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{SaveParameters, ScenarioParameters};
use crate::domain::grid2d::{CellSize2D, GridDimensions2D, GridState};
use crate::error::CheckpointError;

/// Cell-centred velocity snapshot handed to a [`CheckpointSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub chunk_index: usize,
    pub step: usize,
    pub time: f64,
    pub velx: DMatrix<f64>,
    pub vely: DMatrix<f64>,
}

impl Checkpoint {
    /// Copies `velx`/`vely` out of `state`; call `update_cell_centered` first.
    pub fn capture(state: &GridState, chunk_index: usize, step: usize, time: f64) -> Self {
        Self {
            chunk_index,
            step,
            time,
            velx: state.velx.clone(),
            vely: state.vely.clone(),
        }
    }
}

/// Receives checkpoints on the dispatcher's worker thread.
pub trait CheckpointSink: Send {
    fn on_checkpoint(&mut self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub written: usize,
    pub failed: usize,
}

/// Checkpoints that may wait for the worker before new ones are dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4;

/// Moves checkpoints off the solver thread.
///
/// `dispatch` only enqueues, so the stepping loop never waits on a sink. The
/// queue is bounded: a checkpoint arriving while it is full is rejected
/// rather than blocking. A sink error is logged and counted; it does not
/// stop the worker.
#[derive(Debug)]
pub struct CheckpointDispatcher {
    sender: Option<SyncSender<Checkpoint>>,
    worker: Option<JoinHandle<DispatchStats>>,
}

impl CheckpointDispatcher {
    pub fn spawn<S>(sink: S) -> Result<Self, CheckpointError>
    where
        S: CheckpointSink + 'static,
    {
        Self::with_capacity(sink, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity<S>(mut sink: S, capacity: usize) -> Result<Self, CheckpointError>
    where
        S: CheckpointSink + 'static,
    {
        let (sender, receiver) = mpsc::sync_channel::<Checkpoint>(capacity.max(1));
        let worker = thread::Builder::new()
            .name("checkpoint-writer".to_string())
            .spawn(move || {
                let mut stats = DispatchStats::default();
                for checkpoint in receiver {
                    match sink.on_checkpoint(&checkpoint) {
                        Ok(()) => stats.written += 1,
                        Err(e) => {
                            stats.failed += 1;
                            warn!(chunk = checkpoint.chunk_index, "Checkpoint failed: {}", e);
                        }
                    }
                }
                stats
            })?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    pub fn dispatch(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        let sender = self.sender.as_ref().ok_or(CheckpointError::DispatcherClosed)?;
        let chunk_index = checkpoint.chunk_index;
        debug!(chunk = chunk_index, step = checkpoint.step, "Queueing checkpoint");
        sender.try_send(checkpoint).map_err(|e| match e {
            TrySendError::Full(_) => CheckpointError::QueueFull { chunk_index },
            TrySendError::Disconnected(_) => CheckpointError::DispatcherClosed,
        })
    }

    /// Closes the queue and waits for every pending checkpoint to be handled.
    pub fn finish(mut self) -> Result<DispatchStats, CheckpointError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<DispatchStats, CheckpointError> {
        drop(self.sender.take());
        match self.worker.take() {
            Some(worker) => worker.join().map_err(|_| CheckpointError::WorkerPanicked),
            None => Ok(DispatchStats::default()),
        }
    }
}

impl Drop for CheckpointDispatcher {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Checkpoint worker did not shut down cleanly: {}", e);
        }
    }
}

// --- JSON sink ---

#[derive(Serialize, Debug, Clone)]
struct Metadata {
    nx: usize,
    ny: usize,
    dx: f64,
    dy: f64,
    dt: f64,
    density: f64,
    viscosity: f64,
}

#[derive(Serialize, Debug)]
struct CheckpointFile<'a> {
    metadata: &'a Metadata,
    chunk_index: usize,
    step: usize,
    time: f64,
    // Column-major, ny x nx
    velx: &'a [f64],
    vely: &'a [f64],
}

/// Writes each checkpoint to `<directory>/velocity_<chunk>.json`.
#[derive(Debug)]
pub struct JsonCheckpointWriter {
    directory: PathBuf,
    metadata: Metadata,
    space_limit: u64,
    bytes_written: u64,
}

impl JsonCheckpointWriter {
    pub fn new(
        directory: impl AsRef<Path>,
        scenario: &ScenarioParameters,
        save: &SaveParameters,
    ) -> Result<Self, CheckpointError> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)?;
        info!("Ensured output directory exists: {}", directory.display());

        let dimensions = scenario.dimensions();
        let GridDimensions2D(nx, ny) = dimensions;
        let CellSize2D(dx, dy) = dimensions.unit_cell_size();
        Ok(Self {
            directory,
            metadata: Metadata {
                nx,
                ny,
                dx,
                dy,
                dt: scenario.dt,
                density: scenario.density,
                viscosity: scenario.viscosity,
            },
            space_limit: save.space_limit_bytes(),
            bytes_written: 0,
        })
    }

    pub fn path_for(&self, chunk_index: usize) -> PathBuf {
        self.directory.join(format!("velocity_{chunk_index:05}.json"))
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl CheckpointSink for JsonCheckpointWriter {
    fn on_checkpoint(&mut self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let output_start = Instant::now();
        let file_data = CheckpointFile {
            metadata: &self.metadata,
            chunk_index: checkpoint.chunk_index,
            step: checkpoint.step,
            time: checkpoint.time,
            velx: checkpoint.velx.as_slice(),
            vely: checkpoint.vely.as_slice(),
        };
        let json_string = serde_json::to_string_pretty(&file_data)?;

        let needed = json_string.len() as u64;
        if self.bytes_written + needed > self.space_limit {
            return Err(CheckpointError::SpaceLimitExceeded {
                needed,
                used: self.bytes_written,
                limit: self.space_limit,
            });
        }

        let path = self.path_for(checkpoint.chunk_index);
        let mut writer = BufWriter::new(File::create(&path)?);
        writer.write_all(json_string.as_bytes())?;
        writer.flush()?;
        self.bytes_written += needed;

        info!(
            "Wrote checkpoint {} in {}ms",
            path.display(),
            output_start.elapsed().as_millis()
        );
        Ok(())
    }
}
