use stampede_core::RunSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// Internal/runtime error (IO errors, a failed output sink).
    RuntimeError = 1,

    /// Invalid CLI flags, scenario document, fixture or workload.
    InvalidInput = 2,

    /// The run finished but every user that started was aborted.
    AllUsersAborted = 3,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_summary(summary: &RunSummary) -> Self {
        if summary.all_users_aborted() {
            Self::AllUsersAborted
        } else {
            Self::Success
        }
    }
}
