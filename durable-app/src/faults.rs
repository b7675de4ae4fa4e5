//! Injectable fault points for crash-recovery demonstrations.
//!
//! The workflow calls [`FaultHook::trip`] at named points between steps.
//! The binary wires in [`CrashAt`] to hard-kill the process at a chosen
//! point; tests install hooks that merely return errors.

/// Hook invoked at named points between workflow steps.
pub trait FaultHook: Send + Sync {
    /// Called when execution passes `point`. Returning an error aborts
    /// the attempt; implementations may instead terminate the process to
    /// simulate a hard crash.
    fn trip(&self, point: &str) -> anyhow::Result<()>;
}

/// Never fires.
pub struct NoFault;

impl FaultHook for NoFault {
    fn trip(&self, _point: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Kills the process when execution reaches the configured point.
pub struct CrashAt {
    point: String,
}

impl CrashAt {
    pub fn new(point: impl Into<String>) -> Self {
        Self {
            point: point.into(),
        }
    }
}

impl FaultHook for CrashAt {
    fn trip(&self, point: &str) -> anyhow::Result<()> {
        if point == self.point {
            tracing::warn!(point, "fault point reached, terminating process");
            std::process::exit(1);
        }
        Ok(())
    }
}
