//! Interrupt suppression around destructive steps
//!
//! Dropping a database or deleting a tree cannot be safely stopped halfway,
//! so SIGINT, SIGTERM and SIGHUP are ignored while any `InterruptGuard`
//! lives. Child processes spawned meanwhile inherit the ignored disposition,
//! so `psql` and friends are shielded too. Guards nest: the previous handlers
//! come back when the outermost guard is dropped.

use std::sync::{Mutex, MutexGuard};

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use tracing::{debug, warn};

use crate::error::StewardResult;

const SHIELDED: [Signal; 3] = [Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP];

struct Shield {
    depth: usize,
    previous: Vec<(Signal, SigAction)>,
}

static SHIELD: Mutex<Option<Shield>> = Mutex::new(None);

fn shield() -> MutexGuard<'static, Option<Shield>> {
    SHIELD.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Ignores interrupt signals until dropped
pub struct InterruptGuard {
    step: &'static str,
}

impl InterruptGuard {
    pub fn new(step: &'static str) -> StewardResult<Self> {
        let mut state = shield();
        match state.as_mut() {
            Some(active) => active.depth += 1,
            None => {
                let ignore =
                    SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
                let mut previous = Vec::with_capacity(SHIELDED.len());
                for signal in SHIELDED {
                    // SAFETY: installing SIG_IGN runs no code in signal context
                    match unsafe { sigaction(signal, &ignore) } {
                        Ok(old) => previous.push((signal, old)),
                        Err(e) => {
                            restore(previous);
                            return Err(e.into());
                        }
                    }
                }
                *state = Some(Shield { depth: 1, previous });
            }
        }
        debug!(step, "Interrupts ignored");
        Ok(Self { step })
    }

    /// Some guard is alive in this process
    pub fn is_engaged() -> bool {
        shield().is_some()
    }
}

fn restore(previous: Vec<(Signal, SigAction)>) {
    for (signal, old) in previous.into_iter().rev() {
        // SAFETY: reinstates the disposition that was active before
        if let Err(e) = unsafe { sigaction(signal, &old) } {
            warn!(%signal, "Failed to restore signal handler: {}", e);
        }
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        let mut state = shield();
        let outermost = match state.as_mut() {
            Some(active) => {
                active.depth -= 1;
                active.depth == 0
            }
            None => false,
        };
        if outermost {
            if let Some(active) = state.take() {
                restore(active.previous);
            }
            debug!(step = self.step, "Interrupts restored");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current(signal: Signal) -> SigHandler {
        let _state = shield();
        let probe = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
        let old = unsafe { sigaction(signal, &probe) }.unwrap();
        unsafe { sigaction(signal, &old) }.unwrap();
        old.handler()
    }

    #[test]
    fn test_guard_ignores_interrupts() {
        let _guard = InterruptGuard::new("test").unwrap();
        for signal in SHIELDED {
            assert_eq!(current(signal), SigHandler::SigIgn);
        }
    }

    #[test]
    fn test_guards_nest() {
        let outer = InterruptGuard::new("outer").unwrap();
        {
            let _inner = InterruptGuard::new("inner").unwrap();
        }
        assert_eq!(current(Signal::SIGTERM), SigHandler::SigIgn);
        assert!(InterruptGuard::is_engaged());
        drop(outer);
    }
}
