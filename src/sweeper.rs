//! Deadline sweeper
//!
//! Background task that periodically cancels `InProgress` assignments
//! past their deadline, so time-boxed slots free up even with no read
//! traffic. Read paths run the same scan opportunistically; the sweep
//! is the guarantee, not the only trigger.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::assignments;
use crate::config::MarketConfig;
use crate::notify::{Notification, NotificationEvent, NotificationSink};
use crate::store::MarketStore;
use crate::MarketResult;

/// Periodic deadline scan over in-progress assignments
pub struct DeadlineSweeper {
    store: Arc<MarketStore>,
    notifier: Arc<dyn NotificationSink>,
    interval: Duration,
}

impl DeadlineSweeper {
    pub fn new(
        config: &MarketConfig,
        store: Arc<MarketStore>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            notifier,
            interval: Duration::from_secs(config.sweep_interval_secs),
        }
    }

    /// Run one sweep; returns how many claims were released
    pub async fn run_once(&self) -> MarketResult<usize> {
        let expired = self
            .store
            .transaction(|state| Ok(assignments::expire_overdue(state)))
            .await?;

        if expired.is_empty() {
            debug!("Deadline sweep found nothing overdue");
            return Ok(0);
        }

        let count = expired.len();
        info!("Deadline sweep released {} overdue claims", count);
        for claim in expired {
            self.notifier
                .deliver(Notification::to_account(
                    claim.worker,
                    NotificationEvent::AssignmentExpired {
                        order: claim.order,
                        title: claim.title,
                    },
                ))
                .await;
        }
        Ok(count)
    }

    /// Spawn the sweep loop on the runtime; drop the handle to let it
    /// run for the process lifetime, or abort it on shutdown
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // First tick fires immediately; skip it so a fresh engine
            // does not sweep before anything can be overdue
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    tracing::warn!("Deadline sweep failed: {}", e);
                }
            }
        })
    }
}
