//! Post-start health verification
//!
//! The service manager's "active" state is authoritative. It is polled a
//! bounded number of times with a fixed delay. The HTTP probe is advisory:
//! its failure is a warning only.

use std::thread;

use tracing::{debug, info, warn};

use crate::config::settings::HealthSettings;
use crate::error::StewardResult;
use crate::system::{HealthProbe, ServiceManager, ServiceStatus};

/// Start every service in order
pub fn start_all(services: &dyn ServiceManager, names: &[String]) -> StewardResult<()> {
    for name in names {
        services.start(name)?;
    }
    Ok(())
}

/// Stop every service, last started first; stopping is idempotent
pub fn stop_all(services: &dyn ServiceManager, names: &[String]) -> StewardResult<()> {
    for name in names.iter().rev() {
        services.stop(name)?;
    }
    Ok(())
}

/// Poll until every service is active or attempts run out
///
/// Returns the final statuses either way; `Err` means at least one service
/// never became active.
pub fn wait_until_active(
    services: &dyn ServiceManager,
    names: &[String],
    health: &HealthSettings,
) -> Result<Vec<ServiceStatus>, Vec<ServiceStatus>> {
    let attempts = health.attempts.max(1);
    let mut statuses = Vec::new();

    for attempt in 1..=attempts {
        statuses = services.statuses(names);
        if statuses.iter().all(|s| s.active) {
            info!(attempt, "All services active");
            return Ok(statuses);
        }
        let waiting: Vec<&str> = statuses
            .iter()
            .filter(|s| !s.active)
            .map(|s| s.name.as_str())
            .collect();
        debug!(attempt, attempts, ?waiting, "Waiting for services");
        if attempt < attempts {
            thread::sleep(health.interval());
        }
    }

    warn!(attempts, "Services did not become active");
    Err(statuses)
}

/// Names of services that are not active
pub fn inactive(statuses: &[ServiceStatus]) -> Vec<String> {
    statuses
        .iter()
        .filter(|s| !s.active)
        .map(|s| s.name.clone())
        .collect()
}

/// Best-effort HTTP check; `None` when no probe is configured
pub fn advisory_probe(probe: &dyn HealthProbe, health: &HealthSettings) -> Option<bool> {
    let url = health.probe_url.as_deref()?;
    match probe.check(url) {
        Ok(()) => {
            info!(url, "HTTP probe succeeded");
            Some(true)
        }
        Err(e) => {
            warn!(url, "HTTP probe failed (advisory only): {}", e);
            Some(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeProbe, FakeServices};

    fn health(attempts: u32) -> HealthSettings {
        HealthSettings {
            attempts,
            interval_ms: 0,
            probe_url: Some("http://127.0.0.1/".into()),
            probe_timeout_secs: 1,
        }
    }

    fn names() -> Vec<String> {
        vec!["web.service".into(), "worker.service".into()]
    }

    #[test]
    fn test_all_active() {
        let (services, _state) = FakeServices::new();
        start_all(&services, &names()).unwrap();
        let statuses = wait_until_active(&services, &names(), &health(3)).unwrap();
        assert!(statuses.iter().all(|s| s.active));
    }

    #[test]
    fn test_gives_up_after_attempts() {
        let (services, state) = FakeServices::new();
        state.borrow_mut().never_active.insert("worker.service".into());
        start_all(&services, &names()).unwrap();

        let statuses = wait_until_active(&services, &names(), &health(3)).unwrap_err();
        assert_eq!(inactive(&statuses), vec!["worker.service".to_string()]);
        assert_eq!(state.borrow().status_queries, 3);
    }

    #[test]
    fn test_stop_all_reverses_order() {
        let (services, state) = FakeServices::new();
        start_all(&services, &names()).unwrap();
        stop_all(&services, &names()).unwrap();
        let calls = state.borrow().calls.clone();
        assert_eq!(
            calls,
            vec![
                "start web.service",
                "start worker.service",
                "stop worker.service",
                "stop web.service"
            ]
        );
    }

    #[test]
    fn test_probe_is_advisory() {
        let (probe, state) = FakeProbe::new();
        assert_eq!(advisory_probe(&probe, &health(1)), Some(true));
        state.borrow_mut().fail = true;
        assert_eq!(advisory_probe(&probe, &health(1)), Some(false));

        let mut no_url = health(1);
        no_url.probe_url = None;
        assert_eq!(advisory_probe(&probe, &no_url), None);
    }
}
