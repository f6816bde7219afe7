//! Catalog generation: drives a connector and an LLM client through one
//! run and tracks where that run is.

pub mod generator;

use std::fmt;

pub use generator::{CatalogGenerator, CatalogRun, ColumnFailure, GeneratorOptions, TableFailure};

/// Lifecycle of one catalog run.
///
/// ```text
/// Idle -> Extracting -> Describing -> Rendered -> Done
///              \
///               -> Failed
/// ```
///
/// A run handed an already extracted snapshot goes straight from `Idle` to
/// `Describing`. Column failures never leave `Describing`; only a failed
/// extraction reaches `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogState {
    Idle,
    Extracting,
    Describing,
    Rendered,
    Done,
    Failed,
}

impl CatalogState {
    pub fn can_transition_to(self, next: CatalogState) -> bool {
        use CatalogState::*;
        matches!(
            (self, next),
            (Idle, Extracting)
                | (Idle, Describing)
                | (Extracting, Describing)
                | (Extracting, Failed)
                | (Describing, Rendered)
                | (Rendered, Done)
        )
    }
}

impl fmt::Display for CatalogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CatalogState::Idle => "idle",
            CatalogState::Extracting => "extracting",
            CatalogState::Describing => "describing",
            CatalogState::Rendered => "rendered",
            CatalogState::Done => "done",
            CatalogState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::CatalogState::*;

    #[test]
    fn test_happy_path_transitions() {
        assert!(Idle.can_transition_to(Extracting));
        assert!(Extracting.can_transition_to(Describing));
        assert!(Describing.can_transition_to(Rendered));
        assert!(Rendered.can_transition_to(Done));
    }

    #[test]
    fn test_failed_only_from_extracting() {
        assert!(Extracting.can_transition_to(Failed));
        assert!(!Describing.can_transition_to(Failed));
        assert!(!Rendered.can_transition_to(Failed));
        assert!(!Idle.can_transition_to(Failed));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for next in [Idle, Extracting, Describing, Rendered, Done, Failed] {
            assert!(!Done.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
    }
}
