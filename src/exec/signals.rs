//! Exit status decoding for plugin processes.
//!
//! Turns a reaped wait status plus the captured output into the exit code and
//! output text reported in a `ProcessResult`.

use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

/// Exit code reported when the real status could not be determined.
pub const SENTINEL_EXIT_CODE: u8 = 128;

/// How a plugin process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Normal exit with status code.
    Exited(i32),
    /// Killed by signal number.
    Signaled(i32),
    /// Raw status from a platform without signal semantics.
    ///
    /// Nothing on Unix produces this, since reaped statuses there always carry
    /// exit or signal information. Callers holding a bare status code can
    /// still build it to get the empty-output sentinel rule.
    Raw(i32),
    /// Stopped, continued, or anything else that is not a final exit.
    Unknown,
}

impl Termination {
    /// Decode the exit code and final output text.
    ///
    /// A signal death replaces the output with a message naming the signal.
    /// Codes outside 0–255 are clamped.
    pub fn decode(self, output: String) -> (u8, String) {
        match self {
            Self::Exited(code) => (clamp_exit_code(code), output),
            Self::Signaled(signal) => (
                SENTINEL_EXIT_CODE,
                format!("Process was terminated by signal {}", signal),
            ),
            Self::Raw(code) if code != 0 && output.is_empty() => (SENTINEL_EXIT_CODE, output),
            Self::Raw(code) => (clamp_exit_code(code), output),
            Self::Unknown => (SENTINEL_EXIT_CODE, output),
        }
    }

    /// Get a human-readable description.
    pub fn description(&self) -> String {
        match self {
            Self::Exited(code) | Self::Raw(code) => format!("exited with code {}", code),
            Self::Signaled(signal) => format!("killed by signal {}", signal),
            Self::Unknown => "unknown reason".to_string(),
        }
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl From<ExitStatus> for Termination {
    fn from(status: ExitStatus) -> Self {
        // Read the signal number straight from the status, so real-time
        // signals without a name decode like any other.
        match (status.code(), status.signal()) {
            (Some(code), _) => Self::Exited(code),
            (None, Some(signal)) => Self::Signaled(signal),
            (None, None) => Self::Unknown,
        }
    }
}

fn clamp_exit_code(code: i32) -> u8 {
    code.clamp(0, 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_exit_keeps_output() {
        let (code, output) = Termination::Exited(2).decode("DISK CRITICAL".to_string());
        assert_eq!(code, 2);
        assert_eq!(output, "DISK CRITICAL");
    }

    #[test]
    fn test_signal_replaces_output() {
        let (code, output) = Termination::Signaled(9).decode("partial output".to_string());
        assert_eq!(code, SENTINEL_EXIT_CODE);
        assert_eq!(output, "Process was terminated by signal 9");
    }

    #[test]
    fn test_unknown_termination_keeps_output() {
        let (code, output) = Termination::Unknown.decode("so far".to_string());
        assert_eq!(code, 128);
        assert_eq!(output, "so far");
    }

    #[test]
    fn test_raw_nonzero_without_output_is_sentinel() {
        assert_eq!(Termination::Raw(1).decode(String::new()).0, 128);
        assert_eq!(Termination::Raw(1).decode("warning".to_string()).0, 1);
        assert_eq!(Termination::Raw(0).decode(String::new()).0, 0);
    }

    #[test]
    fn test_exit_code_is_clamped() {
        assert_eq!(Termination::Exited(300).decode(String::new()).0, 255);
        assert_eq!(Termination::Exited(-1).decode(String::new()).0, 0);
    }

    #[test]
    fn test_from_exit_status() {
        assert_eq!(
            Termination::from(ExitStatus::from_raw(3 << 8)),
            Termination::Exited(3)
        );
        assert_eq!(
            Termination::from(ExitStatus::from_raw(15)),
            Termination::Signaled(15)
        );
        // Stopped by SIGSTOP: neither an exit nor a termination signal.
        assert_eq!(
            Termination::from(ExitStatus::from_raw(0x137f)),
            Termination::Unknown
        );
    }

    #[test]
    fn test_realtime_signal_decodes() {
        let termination = Termination::from(ExitStatus::from_raw(34));
        assert_eq!(termination, Termination::Signaled(34));

        let (code, output) = termination.decode("partial\n".to_string());
        assert_eq!(code, SENTINEL_EXIT_CODE);
        assert_eq!(output, "Process was terminated by signal 34");
    }

    #[test]
    fn test_display() {
        assert_eq!(Termination::Exited(0).to_string(), "exited with code 0");
        assert_eq!(Termination::Signaled(11).to_string(), "killed by signal 11");
    }
}
