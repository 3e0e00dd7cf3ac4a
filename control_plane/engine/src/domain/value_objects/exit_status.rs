//! How a supervised child process ended

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExitStatus {
    Exited(i32),
    Signaled(i32),
}

impl ChildExitStatus {
    #[cfg(unix)]
    pub fn from_std(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;

        match (status.code(), status.signal()) {
            (Some(code), _) => ChildExitStatus::Exited(code),
            (None, Some(signal)) => ChildExitStatus::Signaled(signal),
            (None, None) => ChildExitStatus::Exited(1),
        }
    }

    pub fn is_signaled(&self) -> bool {
        matches!(self, ChildExitStatus::Signaled(_))
    }
}

impl fmt::Display for ChildExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildExitStatus::Exited(code) => write!(f, "exited with status {code}"),
            ChildExitStatus::Signaled(signal) => write!(f, "terminated by signal {signal}"),
        }
    }
}
