use crate::prelude::*;

/// Utilization floor avoiding division by zero in the virtual-time formulas.
pub const MIN_UTILIZATION: f64 = 0.01;

/// Bandwidth-reclamation plug-in of an EDF scheduler.
///
/// The scheduler funnels every budget- and virtual-time computation through
/// this interface, so exchanging the policy never touches the dispatch
/// logic.
pub trait ReclamationPolicy {
    /// A job completed with `residual` budget left and no queued successor.
    /// Returning true sends the server to NonContending instead of Inactive.
    fn on_early_completion(&mut self, server: &CbsServer, residual: Duration) -> bool;

    /// The server ran out of budget. A positive grant lets it continue
    /// without postponing; zero triggers the standard CBS postponement.
    fn on_budget_exhausted(&mut self, server: &CbsServer) -> Duration;

    /// Advance a server's virtual time after executing `exec` reference
    /// units.
    fn compute_virtual_time(&self, server: &CbsServer, vt: TimePoint, exec: Duration) -> TimePoint;

    /// Budget drained per executed reference unit. 1 for plain CBS; GRUB
    /// scales it by the contending bandwidth so slack is reclaimed.
    fn budget_drain_factor(&self, server: &CbsServer) -> f64;

    /// Track a server state transition.
    fn on_server_state_change(&mut self, server: &CbsServer, change: ServerStateChange);

    /// Sum of utilizations of currently contending servers.
    fn active_utilization(&self) -> f64;
}

/// Plain CBS: no reclamation, `vt' = vt + exec / U`.
#[derive(Debug, Default)]
pub struct CbsPolicy {
    active_utilization: f64,
}

impl CbsPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReclamationPolicy for CbsPolicy {
    fn on_early_completion(&mut self, _server: &CbsServer, _residual: Duration) -> bool {
        false
    }

    fn on_budget_exhausted(&mut self, _server: &CbsServer) -> Duration {
        Duration::ZERO
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

/// Shared bookkeeping of the contending bandwidth, clamped at zero against
/// floating-point drift.
pub(crate) fn track_active_utilization(
    active: &mut f64,
    server: &CbsServer,
    change: ServerStateChange,
) {
    use ServerStateChange::*;

    match change {
        Activated => *active += server.utilization(),
        Completed | NonContending | DeadlineReached | Detached => {
            *active -= server.utilization();
        }
        Dispatched | Preempted | Resumed => {}
    }

    if *active < 0.0 {
        *active = 0.0;
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
fn cbs_virtual_time_rate() {
    let policy = CbsPolicy::new();
    let serv = server(0.5);

    let vt = policy.compute_virtual_time(&serv, TimePoint::ZERO, Duration::secs(1.0));
    assert_eq!(vt, TimePoint::secs(2.0));
    assert_eq!(policy.budget_drain_factor(&serv), 1.0);
}

#[test]
fn cbs_tracks_active_utilization() {
    let mut policy = CbsPolicy::new();
    let serv = server(0.25);

    policy.on_server_state_change(&serv, ServerStateChange::Activated);
    assert_eq!(policy.active_utilization(), 0.25);

    policy.on_server_state_change(&serv, ServerStateChange::Dispatched);
    assert_eq!(policy.active_utilization(), 0.25);

    policy.on_server_state_change(&serv, ServerStateChange::Completed);
    assert_eq!(policy.active_utilization(), 0.0);

    // Drift clamps at zero.
    policy.on_server_state_change(&serv, ServerStateChange::Completed);
    assert_eq!(policy.active_utilization(), 0.0);
}
