//! Trailing-edge debounce with serialized re-entry.
//!
//! A `Debouncer` owns one async operation.  `trigger(args)` (re)starts a quiet
//! window; when the window elapses without a newer trigger the operation runs
//! with the most recent arguments.  Earlier arguments are dropped.
//!
//! ```text
//!  Idle ──trigger──▶ Scheduled ──window elapsed──▶ Running ──done──▶ Idle
//!                      ▲  │ trigger (restart)        │ trigger
//!                      │  ▼                          ▼
//!                      └─────────done──────── RunningWithPending
//! ```
//!
//! The operation never runs twice at once.  A request that arrives while it
//! runs is held and starts as soon as the run completes, or once its own
//! window elapses if that is later.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

/// Cloneable handle; the worker task exits once every handle is dropped,
/// after running any request still pending.
pub struct Debouncer<A> {
    tx: mpsc::UnboundedSender<A>,
}

impl<A> Clone for Debouncer<A> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

enum Phase<A> {
    Idle,
    Scheduled { args: A, deadline: Instant },
    Running,
    RunningWithPending { args: A, deadline: Instant },
}

impl<A> Phase<A> {
    fn label(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Scheduled { .. } => "scheduled",
            Phase::Running => "running",
            Phase::RunningWithPending { .. } => "running+pending",
        }
    }
}

impl<A: Send + 'static> Debouncer<A> {
    /// Spawn the worker on the current tokio runtime.
    pub fn new<F, Fut>(name: &'static str, window: Duration, op: F) -> Self
    where
        F: FnMut(A) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(worker(name, window, rx, op));
        Self { tx }
    }

    pub fn trigger(&self, args: A) {
        // The worker only goes away after every handle is dropped.
        let _ = self.tx.send(args);
    }
}

async fn worker<A, F, Fut>(
    name: &'static str,
    window: Duration,
    mut rx: mpsc::UnboundedReceiver<A>,
    mut op: F,
) where
    F: FnMut(A) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut phase = Phase::Idle;
    let mut closed = false;

    loop {
        trace!("debounce[{}]: {}", name, phase.label());
        phase = match phase {
            Phase::Idle => {
                if closed {
                    break;
                }
                match rx.recv().await {
                    Some(args) => Phase::Scheduled {
                        args,
                        deadline: Instant::now() + window,
                    },
                    None => break,
                }
            }

            Phase::Scheduled { args, deadline } => {
                if closed {
                    sleep_until(deadline).await;
                    run(window, &mut rx, &mut closed, op(args)).await
                } else {
                    tokio::select! {
                        biased;
                        msg = rx.recv() => match msg {
                            Some(newer) => Phase::Scheduled {
                                args: newer,
                                deadline: Instant::now() + window,
                            },
                            None => {
                                closed = true;
                                Phase::Scheduled { args, deadline }
                            }
                        },
                        _ = sleep_until(deadline) => {
                            run(window, &mut rx, &mut closed, op(args)).await
                        }
                    }
                }
            }

            // `run` resolves both running phases before returning.
            Phase::Running | Phase::RunningWithPending { .. } => Phase::Idle,
        };
    }

    trace!("debounce[{}]: worker exiting", name);
}

/// Drive one execution to completion while collecting newer requests.
async fn run<A, Fut>(
    window: Duration,
    rx: &mut mpsc::UnboundedReceiver<A>,
    closed: &mut bool,
    fut: Fut,
) -> Phase<A>
where
    Fut: Future<Output = ()>,
{
    tokio::pin!(fut);
    let mut phase = Phase::Running;

    loop {
        tokio::select! {
            _ = &mut fut => break,
            msg = rx.recv(), if !*closed => match msg {
                Some(args) => {
                    phase = Phase::RunningWithPending {
                        args,
                        deadline: Instant::now() + window,
                    };
                }
                None => *closed = true,
            },
        }
    }

    match phase {
        Phase::RunningWithPending { args, deadline } => Phase::Scheduled { args, deadline },
        _ => Phase::Idle,
    }
}
