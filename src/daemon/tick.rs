//! Tick loop
//!
//! Each tick snapshots the active requests and asks the scheduler to start a
//! watch for every one of them. Requests that already have a live entry are
//! skipped by the scheduler itself.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::booking::{BookingEngine, resolve_request};
use crate::domain::{NewRequest, WatchRequest};
use crate::error::{Result, SlotwatchError};
use crate::portal::PortalClient;
use crate::scheduler::{WatchAction, WatchScheduler};
use crate::store::RequestStore;

/// Configuration for the daemon tick loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickConfig {
    /// Interval between ticks
    pub tick_interval: Duration,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
        }
    }
}

/// Poll action for one request: log in, then evaluate
pub fn watch_action(portal: Arc<dyn PortalClient>, engine: Arc<BookingEngine>, request: WatchRequest) -> WatchAction {
    Arc::new(move |cancel: CancellationToken| {
        let portal = Arc::clone(&portal);
        let engine = Arc::clone(&engine);
        let request = request.clone();
        async move {
            if cancel.is_cancelled() {
                return Err(SlotwatchError::Cancelled);
            }
            let session = portal.login(&request.credentials).await?;
            engine.evaluate(session.as_ref(), &request, &cancel).await
        }
        .boxed()
    })
}

pub struct Daemon {
    config: TickConfig,
    store: Arc<RequestStore>,
    scheduler: WatchScheduler,
    portal: Arc<dyn PortalClient>,
    engine: Arc<BookingEngine>,
}

impl Daemon {
    pub fn new(
        config: TickConfig,
        store: Arc<RequestStore>,
        scheduler: WatchScheduler,
        portal: Arc<dyn PortalClient>,
        engine: Arc<BookingEngine>,
    ) -> Self {
        Self {
            config,
            store,
            scheduler,
            portal,
            engine,
        }
    }

    pub fn store(&self) -> &Arc<RequestStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &WatchScheduler {
        &self.scheduler
    }

    /// Validate a new request against the portal and add it to the active set
    pub async fn submit(&self, new: NewRequest) -> Result<WatchRequest> {
        let session = self.portal.login(&new.credentials).await?;
        let request = resolve_request(session.as_ref(), new).await?;
        self.store.add(request.clone());
        log::info!("Watching {} for {} (request {})", request.service, request.login(), request.id);
        Ok(request)
    }

    /// Start a watch for every active request; returns how many were started
    pub fn tick(&self) -> usize {
        let started = self
            .store
            .list_active()
            .into_iter()
            .filter(|request| {
                let action = watch_action(Arc::clone(&self.portal), Arc::clone(&self.engine), request.clone());
                self.scheduler.start(request.clone(), action)
            })
            .count();
        if started > 0 {
            log::debug!("Tick started {} watch(es), {} running", started, self.scheduler.len());
        }
        started
    }

    /// Tick on the configured interval until `shutdown` resolves, then cancel
    /// every running watch.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        log::info!("Daemon started, ticking every {:?}", self.config.tick_interval);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    self.tick();
                }
            }
        }

        let running = self.scheduler.list();
        for snapshot in &running {
            self.scheduler.cancel(&snapshot.id);
        }
        log::info!("Daemon stopped, cancelled {} watch(es)", running.len());
    }
}
