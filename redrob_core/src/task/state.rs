use std::fmt;
use std::ops::BitOr;

/// Lifecycle of a task thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TaskState {
    NotStarted = 0,
    Started = 1,
    SetupDone = 2,
    Executing = 3,
    Done = 4,
}

impl From<u8> for TaskState {
    fn from(value: u8) -> Self {
        match value {
            1 => TaskState::Started,
            2 => TaskState::SetupDone,
            3 => TaskState::Executing,
            4 => TaskState::Done,
            _ => TaskState::NotStarted,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::NotStarted => write!(f, "NotStarted"),
            TaskState::Started => write!(f, "Started"),
            TaskState::SetupDone => write!(f, "SetupDone"),
            TaskState::Executing => write!(f, "Executing"),
            TaskState::Done => write!(f, "Done"),
        }
    }
}

/// Failure bitmask of a task. `OK` means no bit raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TaskStatus(u32);

impl TaskStatus {
    pub const OK: TaskStatus = TaskStatus(0);
    pub const SETUP_FAILED: TaskStatus = TaskStatus(0x01);
    pub const EXECUTE_FAILED: TaskStatus = TaskStatus(0x02);
    pub const CLEANUP_FAILED: TaskStatus = TaskStatus(0x04);
    /// The thread could not publish its completion.
    pub const DONE_FAILED: TaskStatus = TaskStatus(0x08);

    pub const fn from_bits(bits: u32) -> Self {
        TaskStatus(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: TaskStatus) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }
}

impl BitOr for TaskStatus {
    type Output = TaskStatus;

    fn bitor(self, rhs: TaskStatus) -> TaskStatus {
        TaskStatus(self.0 | rhs.0)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return write!(f, "OK");
        }
        let names = [
            (TaskStatus::SETUP_FAILED, "SETUP_FAILED"),
            (TaskStatus::EXECUTE_FAILED, "EXECUTE_FAILED"),
            (TaskStatus::CLEANUP_FAILED, "CLEANUP_FAILED"),
            (TaskStatus::DONE_FAILED, "DONE_FAILED"),
        ];
        let raised: Vec<&str> = names
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{} (0x{:x})", raised.join("|"), self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_roundtrip_through_u8() {
        for state in [
            TaskState::NotStarted,
            TaskState::Started,
            TaskState::SetupDone,
            TaskState::Executing,
            TaskState::Done,
        ] {
            assert_eq!(TaskState::from(state as u8), state);
        }
        assert_eq!(TaskState::from(200), TaskState::NotStarted);
    }

    #[test]
    fn test_status_bits() {
        let status = TaskStatus::SETUP_FAILED | TaskStatus::CLEANUP_FAILED;
        assert!(!status.is_ok());
        assert!(status.contains(TaskStatus::SETUP_FAILED));
        assert!(!status.contains(TaskStatus::EXECUTE_FAILED));
        assert!(!status.contains(TaskStatus::OK));
        assert_eq!(status.bits(), 0x05);
        assert_eq!(status.to_string(), "SETUP_FAILED|CLEANUP_FAILED (0x5)");
        assert_eq!(TaskStatus::OK.to_string(), "OK");
    }
}
