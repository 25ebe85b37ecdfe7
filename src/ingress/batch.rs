//! Buffered ingress writer: coalesces per-envelope writes into size- or
//! time-triggered batches.
//!
//! Envelopes are telemetry, not transactions. A slow downstream must never
//! block a producer, so `send` only moves envelopes into a bounded
//! drop-oldest queue and returns; the background batcher owns all RPC I/O.
//! Loss is visible through the `dropped` and `send_failure` counters, never
//! through errors on the write path.

use crate::rpc::{IngressClient, RpcError};
use crate::types::{Envelope, SendRequest};
use crossbeam_queue::ArrayQueue;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Capacity of the envelope queue between producers and the batcher.
pub const BUFFER_CAPACITY: usize = 10_000;

/// Hard deadline on each downstream write.
const SEND_DEADLINE: Duration = Duration::from_secs(3);

/// How long the batcher sleeps when the queue is empty. Bounds idle CPU
/// while keeping latency under the flush interval once envelopes arrive.
const IDLE_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Flush as soon as this many envelopes are buffered.
    pub batch_size: usize,
    /// Flush whatever is buffered once this much time has passed since the
    /// last flush.
    pub flush_interval: Duration,
    /// Outgoing batches carry `local_only = true` unless disabled.
    pub local_only_disabled: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval: Duration::from_millis(250),
            local_only_disabled: false,
        }
    }
}

pub struct BatchedIngressClient {
    queue: Arc<ArrayQueue<Envelope>>,
    dropped: Arc<AtomicU64>,
    batcher: JoinHandle<()>,
}

impl BatchedIngressClient {
    /// Spawn the batcher over `downstream`. Evicted envelopes advance
    /// `dropped`; failed downstream writes advance `send_failure`.
    pub fn new<I>(
        config: BatchConfig,
        downstream: I,
        dropped: Arc<AtomicU64>,
        send_failure: Arc<AtomicU64>,
    ) -> Self
    where
        I: IngressClient + 'static,
    {
        let queue = Arc::new(ArrayQueue::new(BUFFER_CAPACITY));
        let batcher = tokio::spawn(run_batcher(
            Arc::clone(&queue),
            config,
            downstream,
            send_failure,
        ));

        Self {
            queue,
            dropped,
            batcher,
        }
    }
}

impl Drop for BatchedIngressClient {
    fn drop(&mut self) {
        self.batcher.abort();
    }
}

impl IngressClient for BatchedIngressClient {
    /// Enqueue and return. The queue evicts its oldest envelope when full,
    /// so this never blocks and never fails.
    async fn send(&self, req: SendRequest) -> Result<(), RpcError> {
        for envelope in req.envelopes {
            if self.queue.force_push(envelope).is_some() {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!("ingress buffer full, {} envelopes dropped so far", total);
            }
        }
        Ok(())
    }
}

async fn run_batcher<I: IngressClient>(
    queue: Arc<ArrayQueue<Envelope>>,
    config: BatchConfig,
    downstream: I,
    send_failure: Arc<AtomicU64>,
) {
    let local_only = !config.local_only_disabled;
    let mut batch: Vec<Envelope> = Vec::with_capacity(config.batch_size);
    let mut last_flush = Instant::now();

    loop {
        while batch.len() < config.batch_size {
            match queue.pop() {
                Some(envelope) => batch.push(envelope),
                None => break,
            }
        }

        let interval_elapsed = last_flush.elapsed() >= config.flush_interval;
        if batch.len() >= config.batch_size || (interval_elapsed && !batch.is_empty()) {
            let req = SendRequest {
                local_only,
                envelopes: std::mem::take(&mut batch),
            };
            let count = req.envelopes.len();

            // No retry: the batch is lost on failure and the counter is the
            // signal. Retrying would amplify load during partial outages.
            match tokio::time::timeout(SEND_DEADLINE, downstream.send(req)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    send_failure.fetch_add(1, Ordering::Relaxed);
                    warn!("failed to write batch of {} envelopes: {}", count, e);
                }
                Err(_) => {
                    send_failure.fetch_add(1, Ordering::Relaxed);
                    warn!("write of {} envelopes exceeded {:?}", count, SEND_DEADLINE);
                }
            }

            last_flush = Instant::now();
            batch = Vec::with_capacity(config.batch_size);
        }

        if queue.is_empty() {
            tokio::time::sleep(IDLE_POLL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LogStream, Payload};
    use std::collections::HashMap;
    use std::future::Future;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeIngress {
        requests: Arc<Mutex<Vec<SendRequest>>>,
        fail: bool,
    }

    impl IngressClient for FakeIngress {
        async fn send(&self, req: SendRequest) -> Result<(), RpcError> {
            self.requests.lock().unwrap().push(req);
            if self.fail {
                Err(RpcError::Unavailable("down".into()))
            } else {
                Ok(())
            }
        }
    }

    fn envelope(timestamp: i64) -> Envelope {
        Envelope {
            timestamp,
            source_id: "a".into(),
            instance_id: "0".into(),
            tags: HashMap::new(),
            payload: Payload::Log {
                payload: b"line".to_vec(),
                stream: LogStream::Stdout,
            },
        }
    }

    fn single(timestamp: i64) -> SendRequest {
        SendRequest {
            local_only: false,
            envelopes: vec![envelope(timestamp)],
        }
    }

    fn counters() -> (Arc<AtomicU64>, Arc<AtomicU64>) {
        (Arc::new(AtomicU64::new(0)), Arc::new(AtomicU64::new(0)))
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..100 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("condition not reached within 2s");
    }

    #[tokio::test]
    async fn flushes_when_the_batch_size_is_reached() {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let downstream = FakeIngress {
            requests: requests.clone(),
            fail: false,
        };
        let (dropped, send_failure) = counters();
        let config = BatchConfig {
            batch_size: 5,
            flush_interval: Duration::from_secs(3600),
            local_only_disabled: false,
        };
        let client = BatchedIngressClient::new(config, downstream, dropped, send_failure);

        for ts in 0..5 {
            client.send(single(ts)).await.unwrap();
        }

        wait_until(|| !requests.lock().unwrap().is_empty()).await;
        let got = requests.lock().unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].envelopes.len(), 5);
        assert!(got[0].local_only);
    }

    #[tokio::test]
    async fn flushes_when_the_interval_elapses() {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let downstream = FakeIngress {
            requests: requests.clone(),
            fail: false,
        };
        let (dropped, send_failure) = counters();
        let config = BatchConfig {
            batch_size: 5,
            flush_interval: Duration::from_micros(1),
            local_only_disabled: false,
        };
        let client = BatchedIngressClient::new(config, downstream, dropped, send_failure);

        client.send(single(1)).await.unwrap();

        wait_until(|| !requests.lock().unwrap().is_empty()).await;
        let got = requests.lock().unwrap();
        assert_eq!(got[0].envelopes.len(), 1);
    }

    #[tokio::test]
    async fn local_only_can_be_disabled() {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let downstream = FakeIngress {
            requests: requests.clone(),
            fail: false,
        };
        let (dropped, send_failure) = counters();
        let config = BatchConfig {
            batch_size: 1,
            flush_interval: Duration::from_micros(1),
            local_only_disabled: true,
        };
        let client = BatchedIngressClient::new(config, downstream, dropped, send_failure);

        client.send(single(1)).await.unwrap();

        wait_until(|| !requests.lock().unwrap().is_empty()).await;
        assert!(!requests.lock().unwrap()[0].local_only);
    }

    #[tokio::test]
    async fn overflow_drops_oldest_and_counts() {
        // The batcher task never runs: this test has no await before the
        // assertions, so on the current-thread runtime the queue only fills.
        let (dropped, send_failure) = counters();
        let client = BatchedIngressClient::new(
            BatchConfig::default(),
            FakeIngress::default(),
            dropped.clone(),
            send_failure,
        );

        let produced = BUFFER_CAPACITY + 500;
        for ts in 0..produced {
            // Poll the enqueue future directly; it is always immediately
            // ready.
            poll_ready(client.send(single(ts as i64))).unwrap();
        }

        assert_eq!(dropped.load(Ordering::Relaxed), 500);
    }

    /// Drive an already-ready future to completion without an executor.
    fn poll_ready<F: Future>(fut: F) -> F::Output {
        let mut fut = std::pin::pin!(fut);
        let waker = std::task::Waker::noop();
        let mut cx = std::task::Context::from_waker(waker);
        match fut.as_mut().poll(&mut cx) {
            std::task::Poll::Ready(out) => out,
            std::task::Poll::Pending => panic!("enqueue future was not ready"),
        }
    }

    #[tokio::test]
    async fn failed_flushes_count_and_do_not_retry() {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let downstream = FakeIngress {
            requests: requests.clone(),
            fail: true,
        };
        let (dropped, send_failure) = counters();
        let config = BatchConfig {
            batch_size: 1,
            flush_interval: Duration::from_micros(1),
            local_only_disabled: false,
        };
        let client = BatchedIngressClient::new(
            config,
            downstream,
            dropped,
            send_failure.clone(),
        );

        client.send(single(1)).await.unwrap();

        wait_until(|| send_failure.load(Ordering::Relaxed) == 1).await;
        // The lost batch was handed down exactly once.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(requests.lock().unwrap().len(), 1);
    }
}
