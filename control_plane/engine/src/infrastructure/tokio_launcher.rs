//! Tokio Process Launcher
//! Real implementation of the ProcessLauncher port.
//!
//! Every child is started in its own session so signals sent to the daemon's
//! process group do not reach it. On Linux the child is also asked to receive
//! SIGKILL if the daemon dies first.

use crate::domain::ports::{LaunchConfig, LaunchResult, ProcessExitHandle, ProcessLauncher};
use crate::domain::value_objects::ChildExitStatus;
use crate::domain::DomainError;
use async_trait::async_trait;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
pub struct TokioProcessLauncher;

impl TokioProcessLauncher {
    pub fn new() -> Self {
        Self
    }

    fn configure_session(cmd: &mut Command) {
        unsafe {
            cmd.pre_exec(|| {
                // Fails only for a process that already leads a session
                libc::setsid();

                #[cfg(target_os = "linux")]
                {
                    const PR_SET_PDEATHSIG: libc::c_int = 1;
                    if libc::prctl(PR_SET_PDEATHSIG, libc::SIGKILL) != 0 {
                        return Err(std::io::Error::last_os_error());
                    }
                }
                Ok(())
            });
        }
    }

    fn create_exit_handle(mut child: std::process::Child, pid: u32) -> ProcessExitHandle {
        let (tx, rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let exit_result = tokio::task::spawn_blocking(move || match child.wait() {
                Ok(status) => {
                    let status = ChildExitStatus::from_std(status);
                    debug!(pid = pid, status = %status, "Process exited");
                    Ok(status)
                }
                Err(e) => {
                    error!(pid = pid, error = %e, "Failed to wait for process");
                    Err(DomainError::LaunchFailed {
                        id: pid.to_string(),
                        reason: format!("failed to wait for process: {e}"),
                    })
                }
            })
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "Blocking wait task panicked");
                Err(DomainError::LaunchFailed {
                    id: pid.to_string(),
                    reason: format!("wait task panicked: {e}"),
                })
            });
            let _ = tx.send(exit_result);
        });

        Box::pin(async move {
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(DomainError::LaunchFailed {
                    id: pid.to_string(),
                    reason: "process monitor task died unexpectedly".to_string(),
                }),
            }
        })
    }
}

#[async_trait]
impl ProcessLauncher for TokioProcessLauncher {
    async fn launch(&self, config: LaunchConfig) -> Result<LaunchResult, DomainError> {
        info!(
            program = %config.program,
            args = ?config.args,
            "Launching process"
        );

        if config.program.is_empty() {
            return Err(DomainError::LaunchFailed {
                id: String::new(),
                reason: "empty program path".to_string(),
            });
        }

        let mut cmd = Command::new(&config.program);
        cmd.args(&config.args);
        if let Some(ref dir) = config.working_dir {
            debug!(working_dir = %dir, "Setting working directory");
            cmd.current_dir(dir);
        }
        for (key, value) in &config.env_vars {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());
        Self::configure_session(&mut cmd);

        let child = cmd.spawn().map_err(|e| {
            error!(program = %config.program, error = %e, "Failed to launch process");
            DomainError::LaunchFailed {
                id: config.program.clone(),
                reason: e.to_string(),
            }
        })?;
        let pid = child.id();
        info!(pid = pid, program = %config.program, "Process launched");

        Ok(LaunchResult {
            pid,
            exit_handle: Self::create_exit_handle(child, pid),
        })
    }

    async fn signal(&self, pid: u32, signal: i32) -> Result<(), DomainError> {
        debug!(pid = pid, signal = signal, "Signalling process");
        let result = unsafe { libc::kill(pid as i32, signal) };
        if result != 0 {
            let err = std::io::Error::last_os_error();
            warn!(pid = pid, signal = signal, error = %err, "Failed to send signal to process");
            return Err(DomainError::LaunchFailed {
                id: pid.to_string(),
                reason: format!("failed to send signal {signal}: {err}"),
            });
        }
        Ok(())
    }

    async fn is_running(&self, pid: u32) -> bool {
        unsafe { libc::kill(pid as i32, 0) == 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::time::Duration;

    fn config(program: &str, args: &[&str]) -> LaunchConfig {
        LaunchConfig {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            working_dir: None,
            env_vars: Vec::new(),
        }
    }

    #[tokio::test]
    #[serial]
    async fn test_launch_reports_exit_code() {
        let launcher = TokioProcessLauncher::new();
        let result = launcher
            .launch(config("/bin/sh", &["-c", "exit 3"]))
            .await
            .unwrap();
        assert!(result.pid > 0);

        let status = tokio::time::timeout(Duration::from_secs(5), result.exit_handle)
            .await
            .expect("Timeout waiting for exit")
            .unwrap();
        assert_eq!(status, ChildExitStatus::Exited(3));
    }

    #[tokio::test]
    async fn test_launch_missing_program_fails() {
        let launcher = TokioProcessLauncher::new();
        let result = launcher.launch(config("/nonexistent/device", &[])).await;
        assert!(matches!(result, Err(DomainError::LaunchFailed { .. })));
    }

    #[tokio::test]
    #[serial]
    async fn test_sigterm_is_reported_as_signal() {
        let launcher = TokioProcessLauncher::new();
        let result = launcher
            .launch(config("/bin/sleep", &["30"]))
            .await
            .unwrap();
        assert!(launcher.is_running(result.pid).await);

        launcher.signal(result.pid, libc::SIGTERM).await.unwrap();
        let status = tokio::time::timeout(Duration::from_secs(5), result.exit_handle)
            .await
            .expect("Timeout waiting for exit")
            .unwrap();

        assert_eq!(status, ChildExitStatus::Signaled(libc::SIGTERM));
    }

    #[tokio::test]
    #[serial]
    async fn test_environment_and_working_dir_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let mut cfg = config("/bin/sh", &["-c", "echo \"$SDR_TEST_VALUE $(pwd)\" > out.txt"]);
        cfg.working_dir = Some(dir.path().to_string_lossy().to_string());
        cfg.env_vars = vec![("SDR_TEST_VALUE".to_string(), "hello".to_string())];

        let result = TokioProcessLauncher::new().launch(cfg).await.unwrap();
        result.exit_handle.await.unwrap();

        let written = std::fs::read_to_string(out).unwrap();
        assert!(written.starts_with("hello "));
    }
}
