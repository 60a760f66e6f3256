use crate::engine::WorkflowState;

const ALL: [WorkflowState; 5] = [
    WorkflowState::Scheduled,
    WorkflowState::Running,
    WorkflowState::Completed,
    WorkflowState::Failed,
    WorkflowState::Cancelled,
];

#[test]
fn test_workflow_state_as_str() {
    assert_eq!(WorkflowState::Scheduled.as_str(), "scheduled");
    assert_eq!(WorkflowState::Running.as_str(), "running");
    assert_eq!(WorkflowState::Completed.as_str(), "completed");
    assert_eq!(WorkflowState::Failed.as_str(), "failed");
    assert_eq!(WorkflowState::Cancelled.as_str(), "cancelled");
}

#[test]
fn test_workflow_state_from_str() {
    for state in ALL {
        assert_eq!(WorkflowState::from_str(state.as_str()), Some(state));
    }
    assert_eq!(WorkflowState::from_str("invalid"), None);
}

#[test]
fn test_workflow_state_display() {
    assert_eq!(format!("{}", WorkflowState::Scheduled), "scheduled");
    assert_eq!(format!("{}", WorkflowState::Cancelled), "cancelled");
}

#[test]
fn test_happy_path_transitions() {
    assert!(WorkflowState::Scheduled.can_transition_to(WorkflowState::Running));
    assert!(WorkflowState::Running.can_transition_to(WorkflowState::Completed));
    assert!(WorkflowState::Running.can_transition_to(WorkflowState::Failed));
    assert!(WorkflowState::Scheduled.can_transition_to(WorkflowState::Cancelled));
}

#[test]
fn test_cannot_skip_running_to_complete() {
    assert!(!WorkflowState::Scheduled.can_transition_to(WorkflowState::Completed));
}

#[test]
fn test_terminal_states_are_final() {
    for from in ALL.into_iter().filter(|s| s.is_terminal()) {
        for to in ALL {
            assert!(
                !from.can_transition_to(to),
                "{} must not move to {}",
                from,
                to
            );
        }
    }
}
