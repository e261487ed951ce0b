//! Recovery from CDM hardware failures.
//!
//! A hardware error leaves the CDM wedged. The only way out is to stop the
//! CDM helper process and terminate the player so that its supervisor
//! restarts playback. [`FatalExit`] makes sure this happens at most once.

use log::{error, warn};
use std::{
    process::{self, Command, Stdio},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

/// The environment specific part of the fatal exit.
pub trait FatalRecovery: Send + Sync {
    /// Best effort shutdown of the process hosting the CDM.
    fn stop_cdm_helpers(&self);
    /// Terminate the player. Production implementations do not return.
    fn terminate(&self);
}

/// Stops the first running helper with `pkill -9` and aborts the player.
pub struct HelperProcessRecovery {
    helpers: Vec<String>,
}

impl HelperProcessRecovery {
    pub fn new(helpers: Vec<String>) -> Self {
        Self { helpers }
    }

    fn run(program: &str, args: &[&str]) -> bool {
        Command::new(program)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|x| x.success())
            .unwrap_or(false)
    }
}

impl FatalRecovery for HelperProcessRecovery {
    fn stop_cdm_helpers(&self) {
        let Some(helper) = self.helpers.iter().find(|x| Self::run("pgrep", &[x.as_str()])) else {
            warn!("no CDM helper process is running");
            return;
        };

        if !Self::run("pkill", &["-9", helper.as_str()]) {
            warn!("unable to shutdown {helper} process");
        }
    }

    fn terminate(&self) {
        process::abort();
    }
}

/// Once-only guard around a [`FatalRecovery`].
pub struct FatalExit {
    fired: AtomicBool,
    flush_delay: Duration,
    recovery: Arc<dyn FatalRecovery>,
}

impl FatalExit {
    pub fn new(recovery: Arc<dyn FatalRecovery>, flush_delay: Duration) -> Self {
        Self {
            fired: AtomicBool::new(false),
            flush_delay,
            recovery,
        }
    }

    /// Run the fatal exit. Returns `false` when it already ran.
    pub fn trigger(&self, reason: &str) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            warn!("fatal exit already in progress, ignoring: {reason}");
            return false;
        }

        error!("{reason}, restarting CDM and terminating player");
        self.recovery.stop_cdm_helpers();
        log::logger().flush();
        thread::sleep(self.flush_delay);
        self.recovery.terminate();
        true
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}
