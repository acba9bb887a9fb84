// ============================================================================
// lumen - Lifecycle Stages
// ============================================================================

use thiserror::Error;

/// Lifecycle stage of a component instance.
///
/// Stages advance along `Created -> Initializing -> Mounted`, then alternate
/// `Mounted <-> Updating` for the instance's working life. `Error` is
/// reachable from any live stage and can recover back into the mounted
/// cycle. `Destroyed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Created,
    Initializing,
    Mounted,
    Updating,
    Error,
    Destroyed,
}

impl Stage {
    pub fn is_live(self) -> bool {
        !matches!(self, Stage::Destroyed)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Created => "created",
            Stage::Initializing => "initializing",
            Stage::Mounted => "mounted",
            Stage::Updating => "updating",
            Stage::Error => "error",
            Stage::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("invalid stage transition: {from} -> {to}")]
    InvalidTransition { from: Stage, to: Stage },
}

/// Whether `from -> to` is a legal transition.
pub fn can_transition(from: Stage, to: Stage) -> bool {
    use Stage::*;
    match (from, to) {
        // Terminal: nothing leaves Destroyed
        (Destroyed, _) => false,
        // Any live stage may fail or be torn down
        (_, Error) | (_, Destroyed) => true,
        (Created, Initializing) => true,
        (Initializing, Mounted) => true,
        (Mounted, Updating) => true,
        (Updating, Mounted) => true,
        // Recovery after a boundary reset
        (Error, Mounted) | (Error, Updating) => true,
        _ => false,
    }
}

/// Advance `current` to `to`, rejecting illegal transitions.
pub fn transition(current: &mut Stage, to: Stage) -> Result<(), LifecycleError> {
    if !can_transition(*current, to) {
        return Err(LifecycleError::InvalidTransition { from: *current, to });
    }
    *current = to;
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_advances() {
        let mut stage = Stage::Created;
        transition(&mut stage, Stage::Initializing).unwrap();
        transition(&mut stage, Stage::Mounted).unwrap();
        transition(&mut stage, Stage::Updating).unwrap();
        transition(&mut stage, Stage::Mounted).unwrap();
        transition(&mut stage, Stage::Destroyed).unwrap();
    }

    #[test]
    fn destroyed_is_terminal() {
        let mut stage = Stage::Destroyed;
        let err = transition(&mut stage, Stage::Error).unwrap_err();
        assert_eq!(
            err,
            LifecycleError::InvalidTransition {
                from: Stage::Destroyed,
                to: Stage::Error
            }
        );
        assert!(!can_transition(Stage::Destroyed, Stage::Destroyed));
    }

    #[test]
    fn error_is_reachable_and_recoverable() {
        assert!(can_transition(Stage::Initializing, Stage::Error));
        assert!(can_transition(Stage::Updating, Stage::Error));
        assert!(can_transition(Stage::Error, Stage::Updating));
        assert!(can_transition(Stage::Error, Stage::Mounted));
    }

    #[test]
    fn skipping_stages_is_rejected() {
        assert!(!can_transition(Stage::Created, Stage::Mounted));
        assert!(!can_transition(Stage::Mounted, Stage::Initializing));
        assert!(!can_transition(Stage::Initializing, Stage::Updating));
    }
}
