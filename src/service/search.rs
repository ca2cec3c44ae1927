//! Background search worker. Only the most recent request is served; requests
//! superseded while the worker was busy resolve to `None`.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::data::item::ItemDefinition;
use crate::error::{Error, Result};
use crate::service::market::{Market, SearchFilter};
use crate::service::ready::ReadyWaiter;

struct SearchRequest {
    query: String,
    filter: SearchFilter,
    reply: oneshot::Sender<Vec<Arc<ItemDefinition>>>,
}

#[derive(Debug, Clone)]
pub struct SearchHandle {
    tx: mpsc::UnboundedSender<SearchRequest>,
}

/// Reply slot for one scheduled search.
#[derive(Debug)]
pub struct SearchTicket {
    rx: oneshot::Receiver<Vec<Arc<ItemDefinition>>>,
}

impl SearchTicket {
    /// Results, or `None` if a newer search replaced this one.
    pub async fn recv(self) -> Option<Vec<Arc<ItemDefinition>>> {
        self.rx.await.ok()
    }
}

impl SearchHandle {
    pub fn schedule(&self, query: impl Into<String>, filter: SearchFilter) -> Result<SearchTicket> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SearchRequest {
                query: query.into(),
                filter,
                reply,
            })
            .map_err(|_| Error::WorkerClosed { worker: "search" })?;
        Ok(SearchTicket { rx })
    }
}

pub struct SearchWorker {
    market: Arc<Market>,
    ready: ReadyWaiter,
    rx: mpsc::UnboundedReceiver<SearchRequest>,
}

impl SearchWorker {
    /// Start the worker; it serves nothing until `ready` fires.
    pub fn spawn(market: Arc<Market>, ready: ReadyWaiter) -> (SearchHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Self { market, ready, rx };
        (SearchHandle { tx }, tokio::spawn(worker.run()))
    }

    async fn run(mut self) {
        if let Err(err) = self.ready.wait().await {
            tracing::warn!(error = %err, "search_worker.not_started");
            return;
        }
        while let Some(mut request) = self.rx.recv().await {
            while let Ok(newer) = self.rx.try_recv() {
                tracing::debug!(query = %request.query, "search.superseded");
                request = newer;
            }
            let results = self.market.search(&request.query, &request.filter);
            tracing::debug!(query = %request.query, results = results.len(), "search.done");
            let _ = request.reply.send(results);
        }
    }
}
