//! CASH: Capacity Sharing.
//!
//! Early completions deposit their residual budget into a shared spare
//! pool; a server exhausting its budget draws the whole pool at once before
//! falling back to the standard CBS postponement. Servers never enter
//! NonContending under CASH.

use crate::prelude::*;
use crate::sched::reclamation::track_active_utilization;

#[derive(Debug, Default)]
pub struct CashPolicy {
    active_utilization: f64,
    spare_budget: Duration,
}

impl CashPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spare_budget(&self) -> Duration {
        self.spare_budget
    }
}

impl ReclamationPolicy for CashPolicy {
    fn on_early_completion(&mut self, _server: &CbsServer, residual: Duration) -> bool {
        self.spare_budget += residual.clamped();
        false
    }

    fn on_budget_exhausted(&mut self, server: &CbsServer) -> Duration {
        if !self.spare_budget.is_positive() {
            return Duration::ZERO;
        }

        // Grant the pool, capped at the server's own maximum so its budget
        // invariant holds; any surplus stays pooled.
        let granted = self.spare_budget.min(server.max_budget());
        self.spare_budget = (self.spare_budget - granted).clamped();
        granted
    }

    fn compute_virtual_time(&self, server: &CbsServer, vt: TimePoint, exec: Duration) -> TimePoint {
        vt + exec / server.utilization().max(MIN_UTILIZATION)
    }

    fn budget_drain_factor(&self, _server: &CbsServer) -> f64 {
        1.0
    }

    fn on_server_state_change(&mut self, server: &CbsServer, change: ServerStateChange) {
        track_active_utilization(&mut self.active_utilization, server, change);
    }

    fn active_utilization(&self) -> f64 {
        self.active_utilization
    }
}

// =============================================================================

#[cfg(test)]
fn server(utilization: f64) -> CbsServer {
    CbsServer::new(
        ServerId(0),
        TaskId(0),
        Duration::secs(utilization * 10.0),
        Duration::secs(10.0),
    )
}

#[test]
fn residuals_pool_and_drain_at_once() {
    let mut policy = CashPolicy::new();
    let serv = server(0.3);

    assert!(!policy.on_early_completion(&serv, Duration::secs(1.0)));
    assert!(!policy.on_early_completion(&serv, Duration::secs(0.5)));
    assert_eq!(policy.spare_budget(), Duration::secs(1.5));

    // Exhaustion draws the full pool.
    assert_eq!(policy.on_budget_exhausted(&serv), Duration::secs(1.5));
    assert_eq!(policy.spare_budget(), Duration::ZERO);

    // Nothing left: standard postponement.
    assert_eq!(policy.on_budget_exhausted(&serv), Duration::ZERO);
}
