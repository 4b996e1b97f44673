// src/hooks.rs

//! Lifecycle hook execution
//!
//! Hook scripts may touch process-wide state, so every execution across all
//! concurrently installing packages holds one shared guard.

use crate::error::{Error, Result};
use crate::packages::HookKind;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Attempts made when the freshly chmod'ed script is still open for writing
/// in a concurrently forked child
const SPAWN_ATTEMPTS: u32 = 5;

#[derive(Debug, Default)]
pub struct HookRunner {
    guard: Mutex<()>,
}

impl HookRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `hook` (relative to `package_dir`) for `package`
    ///
    /// `None` is a no-op. The script runs with `package_dir` as its working
    /// directory and the caller's standard streams.
    pub fn run(
        &self,
        package: &str,
        kind: HookKind,
        package_dir: &Path,
        hook: Option<&str>,
    ) -> Result<()> {
        let Some(hook) = hook else {
            debug!("No {} hook for {}", kind, package);
            return Ok(());
        };

        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);

        let script = package_dir.join(hook);
        let mut permissions = fs::metadata(&script)?.permissions();
        permissions.set_mode(0o755);
        fs::set_permissions(&script, permissions)?;

        info!("Running {} hook for {}: {}", kind, package, hook);
        let status = spawn_and_wait(&script, package_dir)?;

        if status.success() {
            debug!("{} hook for {} finished", kind, package);
            Ok(())
        } else {
            Err(Error::HookFailed {
                package: package.to_string(),
                hook: kind.to_string(),
                status: status.code(),
            })
        }
    }
}

fn spawn_and_wait(script: &Path, cwd: &Path) -> Result<ExitStatus> {
    let mut attempt = 1;
    loop {
        let result = Command::new(script)
            .current_dir(cwd)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status();

        match result {
            Err(e) if e.kind() == io::ErrorKind::ExecutableFileBusy && attempt < SPAWN_ATTEMPTS => {
                debug!("{} busy, retrying (attempt {})", script.display(), attempt);
                thread::sleep(Duration::from_millis(20 * u64::from(attempt)));
                attempt += 1;
            }
            other => return Ok(other?),
        }
    }
}
