//! Worker fanout and in-order emission — the part of the writer facade that
//! actually runs concurrently.
//!
//! One [`Pipeline`] backs one compression session. `reset` tears the whole
//! thing down: a fresh [`Pipeline`] (fresh channels, fresh threads) is built
//! for the next sink, and the old one's generation counter is bumped so any
//! block it had already handed to a worker is discarded by the emitter
//! rather than written to the sink it no longer owns.

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use flate2::Compression;

use crate::block::{Block, CompressResult};
use crate::crc::crc32_combine;
use crate::deflate::compress_block;
use crate::error::{Error, Result};
use crate::header::{xfl_for_level, Header};
use crate::pool::BufferPool;

/// A request sent from the writer thread to the emitter: "tell me once
/// `seq` has been written to the sink", optionally also writing the trailer
/// and ending the session once it has (`close`).
pub(crate) struct Barrier {
    pub(crate) seq: u64,
    pub(crate) close: bool,
    pub(crate) done: Sender<Result<()>>,
}

pub(crate) enum EmitterMsg {
    Result(CompressResult),
    Barrier(Barrier),
}

pub(crate) struct Pipeline<W> {
    block_tx: Sender<Block>,
    ctrl_tx: Sender<EmitterMsg>,
    worker_handles: Vec<JoinHandle<()>>,
    emitter_handle: Option<JoinHandle<W>>,
    current_generation: Arc<AtomicU64>,
    latched_error: Arc<Mutex<Option<Error>>>,
}

impl<W> Pipeline<W>
where
    W: Write + Send + 'static,
{
    /// Spawns the worker pool and the emitter thread for one session.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn spawn(
        sink: W,
        header: Header,
        level: Compression,
        pool: Arc<BufferPool>,
        blocks: usize,
        generation: u64,
        total_uncompressed: Arc<AtomicU64>,
    ) -> Self {
        let (block_tx, block_rx) = crossbeam_channel::bounded::<Block>(2 * blocks);
        let (ctrl_tx, ctrl_rx) = crossbeam_channel::bounded::<EmitterMsg>(2 * blocks);
        let current_generation = Arc::new(AtomicU64::new(generation));
        let latched_error = Arc::new(Mutex::new(None));

        let worker_handles = (0..blocks)
            .map(|_| spawn_worker(block_rx.clone(), ctrl_tx.clone(), level))
            .collect();

        let xfl = xfl_for_level(level);
        let emitter_handle = Some(spawn_emitter(
            sink,
            header,
            xfl,
            ctrl_rx,
            pool,
            current_generation.clone(),
            total_uncompressed,
            latched_error.clone(),
        ));

        Self {
            block_tx,
            ctrl_tx,
            worker_handles,
            emitter_handle,
            current_generation,
            latched_error,
        }
    }

    pub(crate) fn submit(&self, block: Block) -> std::result::Result<(), ()> {
        self.block_tx.send(block).map_err(|_| ())
    }

    /// Registers a flush or close barrier and blocks until the emitter
    /// resolves it.
    pub(crate) fn wait_for(&self, seq: u64, close: bool) -> Result<()> {
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        if self
            .ctrl_tx
            .send(EmitterMsg::Barrier(Barrier {
                seq,
                close,
                done: done_tx,
            }))
            .is_err()
        {
            return Err(Error::InvalidState("pipeline is no longer running"));
        }
        done_rx
            .recv()
            .unwrap_or(Err(Error::InvalidState("emitter thread exited unexpectedly")))
    }

    /// The first error, if any, observed by the emitter so far. Polled by
    /// the writer before and after every operation; the first error observed
    /// latches into the session and is handed back unchanged afterward.
    pub(crate) fn latched_error(&self) -> Option<Error> {
        self.latched_error.lock().unwrap().clone()
    }

    /// Bumps this pipeline's generation so that any block a worker already
    /// popped off `block_rx` before `shutdown` is called has its result
    /// discarded by the emitter instead of written to the sink.
    pub(crate) fn mark_stale(&self) {
        self.current_generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Hard cancel: drop both channels so every thread's `recv()` wakes with
    /// a disconnect error, then join. Used by both `reset` and the graceful
    /// teardown after `close`. Returns the sink so the caller can recover
    /// it (e.g. `Writer<Vec<u8>>::into_inner`).
    pub(crate) fn shutdown(mut self) -> Option<W> {
        drop(self.block_tx_take());
        drop(self.ctrl_tx_take());
        for handle in self.worker_handles.drain(..) {
            let _ = handle.join();
        }
        self.emitter_handle.take().and_then(|h| h.join().ok())
    }

    fn block_tx_take(&mut self) -> Sender<Block> {
        std::mem::replace(&mut self.block_tx, crossbeam_channel::bounded(0).0)
    }

    fn ctrl_tx_take(&mut self) -> Sender<EmitterMsg> {
        std::mem::replace(&mut self.ctrl_tx, crossbeam_channel::bounded(0).0)
    }
}

fn spawn_worker(
    block_rx: Receiver<Block>,
    ctrl_tx: Sender<EmitterMsg>,
    level: Compression,
) -> JoinHandle<()> {
    thread::spawn(move || {
        while let Ok(block) = block_rx.recv() {
            let crc = {
                let mut hasher = crate::crc::Crc32::new();
                hasher.update(&block.input);
                hasher.finalize()
            };

            let result = match compress_block(&block.input, level, block.is_last) {
                Ok(compressed) => CompressResult {
                    seq: block.seq,
                    compressed,
                    uncompressed_len: block.input.len() as u32,
                    crc,
                    generation: block.generation,
                    input: block.input,
                    error: None,
                },
                Err(e) => CompressResult {
                    seq: block.seq,
                    compressed: Vec::new(),
                    uncompressed_len: block.input.len() as u32,
                    crc,
                    generation: block.generation,
                    input: block.input,
                    error: Some(e),
                },
            };

            if ctrl_tx.send(EmitterMsg::Result(result)).is_err() {
                break;
            }
        }
    })
}

fn write_trailer<W: Write>(sink: &mut W, crc: u32, total: u64) -> Result<()> {
    sink.write_all(&crc.to_le_bytes()).map_err(Error::sink_write)?;
    sink.write_all(&(total as u32).to_le_bytes())
        .map_err(Error::sink_write)?;
    sink.flush().map_err(Error::sink_write)?;
    Ok(())
}

/// Runs the emit loop. Returns `Err` on the first sink (or worker-surfaced
/// codec) error; `waiters` is left populated with anyone not yet notified so
/// the caller can fail them out after this returns.
#[allow(clippy::too_many_arguments)]
fn emitter_loop<W: Write>(
    sink: &mut W,
    header: &Header,
    xfl: u8,
    ctrl_rx: &Receiver<EmitterMsg>,
    pool: &BufferPool,
    current_generation: &AtomicU64,
    total_uncompressed: &AtomicU64,
    waiters: &mut HashMap<u64, Vec<(bool, Sender<Result<()>>)>>,
) -> Result<()> {
    let mut header_written = false;
    let mut pending: HashMap<u64, CompressResult> = HashMap::new();
    let mut next_emit_seq = 0u64;
    let mut running_crc = 0u32;
    let mut total = 0u64;

    while let Ok(msg) = ctrl_rx.recv() {
        if !header_written {
            header.write_to(sink, xfl).map_err(Error::sink_write)?;
            header_written = true;
        }

        match msg {
            EmitterMsg::Result(r) => {
                if r.generation != current_generation.load(Ordering::Acquire) {
                    continue;
                }
                if let Some(e) = r.error {
                    return Err(e);
                }
                pending.insert(r.seq, r);
            }
            EmitterMsg::Barrier(barrier) => {
                if barrier.seq < next_emit_seq {
                    if barrier.close {
                        write_trailer(sink, running_crc, total)?;
                        let _ = barrier.done.send(Ok(()));
                        return Ok(());
                    }
                    let _ = barrier.done.send(Ok(()));
                } else {
                    waiters
                        .entry(barrier.seq)
                        .or_default()
                        .push((barrier.close, barrier.done));
                }
                continue;
            }
        }

        while let Some(r) = pending.remove(&next_emit_seq) {
            sink.write_all(&r.compressed).map_err(Error::sink_write)?;
            running_crc = crc32_combine(running_crc, r.crc, r.uncompressed_len as u64);
            total += r.uncompressed_len as u64;
            total_uncompressed.store(total, Ordering::Release);
            pool.release(r.input);

            let emitted_seq = next_emit_seq;
            next_emit_seq += 1;

            if let Some(woken) = waiters.remove(&emitted_seq) {
                for (close, done) in woken {
                    if close {
                        write_trailer(sink, running_crc, total)?;
                        let _ = done.send(Ok(()));
                        return Ok(());
                    }
                    let _ = done.send(Ok(()));
                }
            }
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn spawn_emitter<W>(
    mut sink: W,
    header: Header,
    xfl: u8,
    ctrl_rx: Receiver<EmitterMsg>,
    pool: Arc<BufferPool>,
    current_generation: Arc<AtomicU64>,
    total_uncompressed: Arc<AtomicU64>,
    latched_error: Arc<Mutex<Option<Error>>>,
) -> JoinHandle<W>
where
    W: Write + Send + 'static,
{
    thread::spawn(move || {
        let mut waiters: HashMap<u64, Vec<(bool, Sender<Result<()>>)>> = HashMap::new();

        let result = emitter_loop(
            &mut sink,
            &header,
            xfl,
            &ctrl_rx,
            &pool,
            &current_generation,
            &total_uncompressed,
            &mut waiters,
        );

        if let Err(e) = result {
            *latched_error.lock().unwrap() = Some(e.clone());
            for (_, waiting) in waiters.drain() {
                for (_, done) in waiting {
                    let _ = done.send(Err(e.clone()));
                }
            }
        }

        sink
    })
}
