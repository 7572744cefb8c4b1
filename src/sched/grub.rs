//! GRUB: Greedy Reclamation of Unused Bandwidth.
//!
//! Virtual time advances at rate `U_active / U_i`, so an underloaded system
//! wastes no bandwidth: a lone server sees its budget drain at `U_active`
//! per executed unit and can greedily use the whole processor. Early
//! completions park the server in NonContending until its virtual deadline,
//! keeping its bandwidth counted in `U_active` until then.

use crate::prelude::*;
use crate::sched::reclamation::track_active_utilization;

#[derive(Debug, Default)]
pub struct GrubPolicy {
    active_utilization: f64,
}

impl GrubPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReclamationPolicy for GrubPolicy {
    fn on_early_completion(&mut self, _server: &CbsServer, _residual: Duration) -> bool {
        // Keep the bandwidth reserved until the virtual deadline.
        true
    }

    fn on_budget_exhausted(&mut self, _server: &CbsServer) -> Duration {
        Duration::ZERO
    }

    fn compute_virtual_time(&self, server: &CbsServer, vt: TimePoint, exec: Duration) -> TimePoint {
        let u = server.utilization().max(MIN_UTILIZATION);
        vt + exec * (self.drain_rate(server) / u)
    }

    fn budget_drain_factor(&self, server: &CbsServer) -> f64 {
        self.drain_rate(server)
    }

    fn on_server_state_change(&mut self, server: &CbsServer, change: ServerStateChange) {
        // Entering NonContending keeps the bandwidth counted; it is released
        // at DeadlineReached instead.
        if change == ServerStateChange::NonContending {
            return;
        }
        track_active_utilization(&mut self.active_utilization, server, change);
    }

    fn active_utilization(&self) -> f64 {
        self.active_utilization
    }
}

impl GrubPolicy {
    /// Budget drained per executed reference unit: the contending bandwidth,
    /// never below the server's own share and never above full rate.
    fn drain_rate(&self, server: &CbsServer) -> f64 {
        let u = server.utilization().max(MIN_UTILIZATION);
        self.active_utilization.clamp(u, 1.0)
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
fn lone_server_reclaims_slack() {
    let mut policy = GrubPolicy::new();
    let serv = server(0.5);
    policy.on_server_state_change(&serv, ServerStateChange::Activated);

    // Only half the bandwidth is contending: budget drains at half rate,
    // virtual time advances at U_active / U = 1.
    assert_eq!(policy.budget_drain_factor(&serv), 0.5);
    let vt = policy.compute_virtual_time(&serv, TimePoint::ZERO, Duration::secs(2.0));
    assert_eq!(vt, TimePoint::secs(2.0));
}

#[test]
fn noncontending_retains_bandwidth_until_deadline() {
    let mut policy = GrubPolicy::new();
    let serv = server(0.5);

    policy.on_server_state_change(&serv, ServerStateChange::Activated);
    assert_eq!(policy.active_utilization(), 0.5);
    assert!(policy.on_early_completion(&serv, Duration::secs(1.0)));

    // NonContending releases the bandwidth only at the virtual deadline.
    policy.on_server_state_change(&serv, ServerStateChange::DeadlineReached);
    assert_eq!(policy.active_utilization(), 0.0);
}

#[test]
fn resumed_server_keeps_its_bandwidth_counted() {
    let mut policy = GrubPolicy::new();
    let serv = server(0.5);

    policy.on_server_state_change(&serv, ServerStateChange::Activated);
    policy.on_server_state_change(&serv, ServerStateChange::Resumed);
    assert_eq!(policy.active_utilization(), 0.5);
}
