use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::services::deposit_service::{DepositService, PassReport};
use crate::services::saweria_service::SaweriaService;

fn log_report(engine: &str, report: PassReport) {
    if report.settled > 0 || report.expired > 0 || report.failed > 0 {
        info!(
            engine,
            settled = report.settled,
            expired = report.expired,
            failed = report.failed,
            "Reconciliation pass finished"
        );
    } else {
        debug!(engine, gateway_unavailable = report.gateway_unavailable, "Reconciliation pass idle");
    }
}

/// Polls both gateways on a fixed interval until shutdown.
///
/// A slow pass delays the next tick instead of bunching passes together, so
/// one engine never runs two passes at once.
pub struct ReconcileScheduler {
    deposits: DepositService,
    saweria: SaweriaService,
    interval: Duration,
}

impl ReconcileScheduler {
    pub fn new(deposits: DepositService, saweria: SaweriaService, interval: Duration) -> Self {
        Self {
            deposits,
            saweria,
            interval,
        }
    }

    pub fn spawn(self, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        info!("Starting reconciliation loops every {:?}", self.interval);

        let qris = {
            let deposits = self.deposits.clone();
            let mut stop = shutdown.subscribe();
            let period = self.interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => log_report("qris", deposits.reconcile_pass().await),
                        _ = stop.recv() => {
                            info!("QRIS reconciliation loop stopped");
                            break;
                        }
                    }
                }
            })
        };

        let saweria = {
            let saweria = self.saweria.clone();
            let mut stop = shutdown.subscribe();
            let period = self.interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => log_report("saweria", saweria.pass().await),
                        _ = stop.recv() => {
                            info!("Saweria reconciliation loop stopped");
                            break;
                        }
                    }
                }
            })
        };

        vec![qris, saweria]
    }
}
