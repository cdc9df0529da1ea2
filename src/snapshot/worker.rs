/// Off-thread snapshot serialization
///
/// The worker receives fully-owned snapshot structures over a channel and
/// turns them into JSON strings; the sim thread polls finished results and
/// hands the parsed values to observers. When the worker is gone,
/// serialization happens inline so observers never starve.
use bevy::prelude::*;
use serde_json::Value;
use std::cell::RefCell;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::JoinHandle;

use super::cache::{FullSnapshot, TickSnapshot};
use super::delta::DeltaSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    Full,
    Tick,
    Delta,
}

impl SnapshotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::Full => "full",
            SnapshotKind::Tick => "tick",
            SnapshotKind::Delta => "delta",
        }
    }
}

enum Job {
    Full(Box<FullSnapshot>),
    Tick(Box<TickSnapshot>),
    Delta(Box<DeltaSnapshot>),
    Shutdown,
}

pub struct SerializedSnapshot {
    pub kind: SnapshotKind,
    pub json: String,
}

fn serialize_job(job: &Job) -> Option<SerializedSnapshot> {
    let (kind, result) = match job {
        Job::Full(snapshot) => (SnapshotKind::Full, serde_json::to_string(snapshot)),
        Job::Tick(snapshot) => (SnapshotKind::Tick, serde_json::to_string(snapshot)),
        Job::Delta(snapshot) => (SnapshotKind::Delta, serde_json::to_string(snapshot)),
        Job::Shutdown => return None,
    };
    match result {
        Ok(json) => Some(SerializedSnapshot { kind, json }),
        Err(e) => {
            error!("snapshot serialization failed: {}", e);
            None
        }
    }
}

pub struct SnapshotWorker {
    jobs: Sender<Job>,
    results: Receiver<SerializedSnapshot>,
    /// Inline fallback output when the worker thread is unavailable
    inline: RefCell<Vec<SerializedSnapshot>>,
    handle: Option<JoinHandle<()>>,
}

impl SnapshotWorker {
    pub fn spawn() -> Self {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (result_tx, result_rx) = mpsc::channel::<SerializedSnapshot>();

        let handle = std::thread::Builder::new()
            .name("snapshot-serializer".to_string())
            .spawn(move || {
                while let Ok(job) = job_rx.recv() {
                    if matches!(job, Job::Shutdown) {
                        break;
                    }
                    if let Some(result) = serialize_job(&job) {
                        if result_tx.send(result).is_err() {
                            break;
                        }
                    }
                }
            })
            .expect("spawn snapshot worker");

        Self {
            jobs: job_tx,
            results: result_rx,
            inline: RefCell::new(Vec::new()),
            handle: Some(handle),
        }
    }

    fn submit(&self, job: Job) {
        if let Err(failed) = self.jobs.send(job) {
            // Worker is gone; degrade to inline serialization
            if let Some(result) = serialize_job(&failed.0) {
                warn!("snapshot worker unavailable, serialized inline");
                self.inline.borrow_mut().push(result);
            }
        }
    }

    pub fn submit_full(&self, snapshot: FullSnapshot) {
        self.submit(Job::Full(Box::new(snapshot)));
    }

    pub fn submit_tick(&self, snapshot: TickSnapshot) {
        self.submit(Job::Tick(Box::new(snapshot)));
    }

    pub fn submit_delta(&self, snapshot: DeltaSnapshot) {
        self.submit(Job::Delta(Box::new(snapshot)));
    }

    /// Drain finished serializations, parsing each back into a value for
    /// observer fan-out
    pub fn poll(&self) -> Vec<(SnapshotKind, Value)> {
        let mut ready = Vec::new();
        loop {
            match self.results.try_recv() {
                Ok(result) => ready.push(result),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        ready.append(&mut self.inline.borrow_mut());

        ready
            .into_iter()
            .filter_map(|result| match serde_json::from_str(&result.json) {
                Ok(value) => Some((result.kind, value)),
                Err(e) => {
                    error!("snapshot parse failed: {}", e);
                    None
                }
            })
            .collect()
    }

    pub fn shutdown(&mut self) {
        let _ = self.jobs.send(Job::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SnapshotWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
