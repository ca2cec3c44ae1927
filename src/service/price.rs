//! Background price worker. Requests arrive over a queue, fetches run on the
//! blocking pool through a [PriceSource], and results flow back over oneshot
//! replies. The worker never sees a fit.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

const WORKER: &str = "price";
const QUEUE_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Price {
    pub item_id: u32,
    /// `None` when the source had no quote for the item.
    pub value: Option<f64>,
    pub fetched_at: DateTime<Utc>,
}

/// Blocking price lookup; called off the async runtime.
pub trait PriceSource: Send + Sync + 'static {
    fn fetch(&self, item_ids: &[u32]) -> Result<HashMap<u32, f64>>;
}

/// Fixed price table, for offline use and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticPriceSource {
    prices: HashMap<u32, f64>,
}

impl StaticPriceSource {
    pub fn new(prices: impl IntoIterator<Item = (u32, f64)>) -> Self {
        Self {
            prices: prices.into_iter().collect(),
        }
    }
}

impl PriceSource for StaticPriceSource {
    fn fetch(&self, item_ids: &[u32]) -> Result<HashMap<u32, f64>> {
        Ok(item_ids
            .iter()
            .filter_map(|id| self.prices.get(id).map(|price| (*id, *price)))
            .collect())
    }
}

enum Command {
    Fetch {
        item_ids: Vec<u32>,
        reply: oneshot::Sender<Result<Vec<Price>>>,
    },
    WaitFor {
        item_id: u32,
        reply: oneshot::Sender<Price>,
    },
    Cached {
        item_id: u32,
        reply: oneshot::Sender<Option<Price>>,
    },
    Clear,
}

/// Cloneable handle for talking to a running [PriceWorker].
#[derive(Debug, Clone)]
pub struct PriceHandle {
    tx: mpsc::Sender<Command>,
}

/// Pending notification registered through [PriceHandle::wait_for].
#[derive(Debug)]
pub struct PriceWait {
    rx: oneshot::Receiver<Price>,
}

impl PriceWait {
    pub async fn recv(self) -> Result<Price> {
        self.rx.await.map_err(|_| Error::WorkerClosed { worker: WORKER })
    }
}

impl PriceHandle {
    /// Prices for every requested id in request order; stale or missing entries are refetched.
    pub async fn fetch(&self, item_ids: Vec<u32>) -> Result<Vec<Price>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Fetch { item_ids, reply }).await?;
        rx.await.map_err(|_| Error::WorkerClosed { worker: WORKER })?
    }

    /// Register interest in an item; resolves after the next fetch that covers it.
    pub async fn wait_for(&self, item_id: u32) -> Result<PriceWait> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::WaitFor { item_id, reply }).await?;
        Ok(PriceWait { rx })
    }

    pub async fn cached(&self, item_id: u32) -> Result<Option<Price>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Cached { item_id, reply }).await?;
        rx.await.map_err(|_| Error::WorkerClosed { worker: WORKER })
    }

    pub async fn clear(&self) -> Result<()> {
        self.send(Command::Clear).await
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| Error::WorkerClosed { worker: WORKER })
    }
}

pub struct PriceWorker<S: PriceSource> {
    source: Arc<S>,
    max_age: Duration,
    cache: HashMap<u32, Price>,
    waiting: HashMap<u32, Vec<oneshot::Sender<Price>>>,
    rx: mpsc::Receiver<Command>,
}

impl<S: PriceSource> PriceWorker<S> {
    fn new(source: S, max_age: Duration) -> (Self, PriceHandle) {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let worker = Self {
            source: Arc::new(source),
            max_age,
            cache: HashMap::new(),
            waiting: HashMap::new(),
            rx,
        };
        (worker, PriceHandle { tx })
    }

    /// Start the worker on the current runtime. It stops once every handle is dropped.
    pub fn spawn(source: S, max_age: Duration) -> (PriceHandle, JoinHandle<()>) {
        let (worker, handle) = Self::new(source, max_age);
        let task = tokio::spawn(worker.run());
        (handle, task)
    }

    async fn run(mut self) {
        tracing::debug!("price_worker.started");
        while let Some(command) = self.rx.recv().await {
            self.prune_waiters();
            match command {
                Command::Fetch { item_ids, reply } => {
                    let result = self.fetch(&item_ids).await;
                    let _ = reply.send(result);
                }
                Command::WaitFor { item_id, reply } => {
                    self.waiting.entry(item_id).or_default().push(reply);
                }
                Command::Cached { item_id, reply } => {
                    let _ = reply.send(self.cache.get(&item_id).cloned());
                }
                Command::Clear => {
                    tracing::info!(entries = self.cache.len(), "price_cache.cleared");
                    self.cache.clear();
                }
            }
        }
        tracing::debug!("price_worker.stopped");
    }

    /// Drop waiters whose receiver is gone, and ids nobody waits on anymore.
    fn prune_waiters(&mut self) {
        let before: usize = self.waiting.values().map(Vec::len).sum();
        self.waiting.retain(|_, waiters| {
            waiters.retain(|waiter| !waiter.is_closed());
            !waiters.is_empty()
        });
        let after: usize = self.waiting.values().map(Vec::len).sum();
        if after < before {
            tracing::debug!(pruned = before - after, "price_waiters.pruned");
        }
    }

    fn is_fresh(&self, price: &Price, now: DateTime<Utc>) -> bool {
        now - price.fetched_at < self.max_age
    }

    async fn fetch(&mut self, item_ids: &[u32]) -> Result<Vec<Price>> {
        let now = Utc::now();
        let mut stale: Vec<u32> = item_ids
            .iter()
            .copied()
            .filter(|id| {
                self.cache
                    .get(id)
                    .map(|price| !self.is_fresh(price, now))
                    .unwrap_or(true)
            })
            .collect();
        stale.sort_unstable();
        stale.dedup();

        if !stale.is_empty() {
            let source = Arc::clone(&self.source);
            let ids = stale.clone();
            let quotes = tokio::task::spawn_blocking(move || source.fetch(&ids))
                .await
                .map_err(|err| Error::PriceSource {
                    message: format!("fetch task failed: {err}"),
                })??;
            let fetched_at = Utc::now();
            tracing::debug!(requested = stale.len(), quoted = quotes.len(), "price.fetched");
            for id in &stale {
                let price = Price {
                    item_id: *id,
                    value: quotes.get(id).copied(),
                    fetched_at,
                };
                self.cache.insert(*id, price);
            }
        }

        let prices: Vec<Price> = item_ids
            .iter()
            .filter_map(|id| self.cache.get(id).cloned())
            .collect();
        for price in &prices {
            if let Some(waiters) = self.waiting.remove(&price.item_id) {
                for waiter in waiters {
                    let _ = waiter.send(price.clone());
                }
            }
        }
        Ok(prices)
    }
}
