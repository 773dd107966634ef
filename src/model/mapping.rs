use std::fmt;

use crate::error::MigrateError;

/// Azure DevOps work item type a Redmine tracker maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkItemType {
    Bug,
    Task,
    UserStory,
}

impl WorkItemType {
    pub fn from_tracker(tracker: &str) -> Result<Self, MigrateError> {
        match tracker {
            "Bug" => Ok(Self::Bug),
            "Task" => Ok(Self::Task),
            "User Story" => Ok(Self::UserStory),
            other => Err(MigrateError::UnmappedValue {
                field: "tracker",
                value: other.to_string(),
            }),
        }
    }

    /// Type name as the work item API expects it, before URL encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bug => "bug",
            Self::Task => "task",
            Self::UserStory => "user story",
        }
    }
}

impl fmt::Display for WorkItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkItemState {
    New,
    Active,
    Resolved,
    Closed,
}

impl WorkItemState {
    /// Maps a Redmine status for the given type. Tasks have no `Resolved`
    /// state, so a resolved task lands in `Active`.
    pub fn from_status(status: &str, kind: WorkItemType) -> Result<Self, MigrateError> {
        let state = match status {
            "New" => Self::New,
            "Ready for Review" | "In Review" | "In Progress" | "Ready for Testing"
            | "In Testing" | "Reopened" => Self::Active,
            "Resolved" => Self::Resolved,
            "Closed" => Self::Closed,
            other => {
                return Err(MigrateError::UnmappedValue {
                    field: "status",
                    value: other.to_string(),
                })
            }
        };
        if state == Self::Resolved && kind == WorkItemType::Task {
            return Ok(Self::Active);
        }
        Ok(state)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Active => "Active",
            Self::Resolved => "Resolved",
            Self::Closed => "Closed",
        }
    }
}

impl fmt::Display for WorkItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Microsoft.VSTS.Common.Priority` value, 1 (highest) to 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Priority(u8);

impl Priority {
    pub fn from_redmine(priority: &str) -> Result<Self, MigrateError> {
        match priority {
            "Low" => Ok(Self(4)),
            "Normal" => Ok(Self(3)),
            "High" => Ok(Self(2)),
            "Urgent" | "Immediate" => Ok(Self(1)),
            other => Err(MigrateError::UnmappedValue {
                field: "priority",
                value: other.to_string(),
            }),
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trackers_map_to_types() {
        assert_eq!(WorkItemType::from_tracker("Bug").unwrap(), WorkItemType::Bug);
        assert_eq!(WorkItemType::from_tracker("User Story").unwrap().as_str(), "user story");
    }

    #[test]
    fn unknown_tracker_is_an_error() {
        let err = WorkItemType::from_tracker("Epic").unwrap_err();
        assert!(matches!(err, MigrateError::UnmappedValue { field: "tracker", .. }));
    }

    #[test]
    fn review_and_testing_statuses_are_active() {
        for status in ["Ready for Review", "In Review", "In Testing", "Reopened"] {
            assert_eq!(
                WorkItemState::from_status(status, WorkItemType::Bug).unwrap(),
                WorkItemState::Active
            );
        }
    }

    #[test]
    fn resolved_task_becomes_active() {
        assert_eq!(
            WorkItemState::from_status("Resolved", WorkItemType::Task).unwrap(),
            WorkItemState::Active
        );
        assert_eq!(
            WorkItemState::from_status("Resolved", WorkItemType::UserStory).unwrap(),
            WorkItemState::Resolved
        );
    }

    #[test]
    fn unknown_status_is_an_error() {
        assert!(WorkItemState::from_status("Rejected", WorkItemType::Bug).is_err());
    }

    #[test]
    fn priorities_map_to_numeric_scale() {
        assert_eq!(Priority::from_redmine("Low").unwrap().value(), 4);
        assert_eq!(Priority::from_redmine("Normal").unwrap().value(), 3);
        assert_eq!(Priority::from_redmine("Immediate").unwrap().value(), 1);
        assert!(Priority::from_redmine("").is_err());
    }
}
