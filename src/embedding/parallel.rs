//! Parallel embedding search over the work-stealing stack
//!
//! Workers share one `WorkStack` of partial embeddings and send complete
//! embeddings to the calling thread over a bounded channel. The caller
//! consumes while the workers run, so a slow consumer applies backpressure.

use super::search::{Matcher, StartPoint};
use super::stack::WorkStack;
use super::Embedding;
use crate::cancel::CancelToken;
use crate::graph::Indices;
use crate::pattern::Pattern;
use crossbeam_channel::{bounded, Sender};
use std::thread;
use tracing::debug;

const RESULT_BUFFER: usize = 256;

/// Stats from a single worker
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerStats {
    pub expanded: usize,
    pub found: usize,
}

/// Every embedding of `pattern` in `indices`, found by `workers` threads.
///
/// Order is unspecified. Stops early, returning what was found, when
/// `cancel` fires.
pub fn par_embeddings(
    pattern: &Pattern,
    indices: &Indices,
    start: StartPoint,
    workers: usize,
    cancel: &CancelToken,
) -> Vec<Embedding> {
    let mut out = Vec::new();
    run(pattern, indices, start, workers, cancel, |emb| {
        out.push(emb);
        true
    });
    out
}

/// Whether any embedding exists; all workers stop at the first hit
pub fn par_embedded_in(pattern: &Pattern, indices: &Indices, workers: usize) -> bool {
    let mut found = false;
    run(
        pattern,
        indices,
        StartPoint::default(),
        workers,
        &CancelToken::new(),
        |_| {
            found = true;
            false
        },
    );
    found
}

/// Drive the search, handing complete embeddings to `consume` until it
/// returns false
fn run(
    pattern: &Pattern,
    indices: &Indices,
    start: StartPoint,
    workers: usize,
    cancel: &CancelToken,
    mut consume: impl FnMut(Embedding) -> bool,
) {
    if pattern.is_empty() {
        return;
    }
    let workers = workers.max(1);
    let matcher = Matcher::new(pattern, indices);
    let start = matcher.start_vertex(start);
    let chain = matcher.edge_chain(start);

    let stack: WorkStack<(Embedding, usize)> = WorkStack::new(workers);
    for seed in matcher.seeds(start) {
        stack.push(0, (seed, 0));
    }
    let tids: Vec<usize> = (0..workers).map(|_| stack.add_worker()).collect();

    let (tx, rx) = bounded::<Embedding>(RESULT_BUFFER);
    let totals = thread::scope(|s| {
        let handles: Vec<_> = tids
            .into_iter()
            .map(|tid| {
                let tx = tx.clone();
                let (stack, chain) = (&stack, &chain);
                s.spawn(move || worker(tid, matcher, chain, stack, tx, cancel))
            })
            .collect();
        // Drop our copy of tx so rx ends when the workers do
        drop(tx);

        for emb in rx.iter() {
            if !consume(emb) {
                stack.close();
                break;
            }
        }
        drop(rx);

        handles
            .into_iter()
            .filter_map(|h| h.join().ok())
            .fold(WorkerStats::default(), |acc, w| WorkerStats {
                expanded: acc.expanded + w.expanded,
                found: acc.found + w.found,
            })
    });
    debug!(
        "Parallel search of {} on {} workers: {} expanded, {} found",
        pattern, workers, totals.expanded, totals.found
    );
}

fn worker(
    tid: usize,
    matcher: Matcher<'_>,
    chain: &[usize],
    stack: &WorkStack<(Embedding, usize)>,
    tx: Sender<Embedding>,
    cancel: &CancelToken,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    while let Some((emb, eid)) = stack.pop(tid) {
        if cancel.is_cancelled() {
            stack.close();
            break;
        }
        if eid >= chain.len() {
            stats.found += 1;
            if tx.send(emb).is_err() {
                // Consumer hung up
                stack.close();
                break;
            }
            continue;
        }
        stats.expanded += 1;
        matcher.extend_embedding(&emb, chain[eid], |ext| stack.push(tid, (ext, eid + 1)));
    }
    stats
}
