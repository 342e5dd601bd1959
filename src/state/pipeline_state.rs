/// Pipeline state definitions for tracking node progress
///
/// This module defines all possible states a graph node can be in as it moves
/// through the fetch, process and load stages.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current state of a node in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Node exists in the graph but has not been scheduled
    Created,

    /// Node is queued for the Fetch stage
    AwaitingFetch,

    /// Node's page is being downloaded
    Fetching,

    /// Node's HTML is stashed and queued for the Process stage
    AwaitingProcessing,

    /// Node's content is being extracted and transformed
    Processing,

    /// A loader record for the node is queued for the Load stage
    AwaitingLoad,

    /// Node's record is being written to the store
    Loading,

    /// Node finished the pipeline
    Completed,

    /// Node failed at some stage
    Error,
}

impl PipelineState {
    /// Position of the state along the pipeline, Error last
    pub fn rank(&self) -> u8 {
        match self {
            Self::Created => 0,
            Self::AwaitingFetch => 1,
            Self::Fetching => 2,
            Self::AwaitingProcessing => 3,
            Self::Processing => 4,
            Self::AwaitingLoad => 5,
            Self::Loading => 6,
            Self::Completed => 7,
            Self::Error => 8,
        }
    }

    /// Returns true if the node needs no further work (Completed or Error)
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Returns true if this represents an error state
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    /// Checks whether moving from this state to `next` is a legal forward step
    ///
    /// Any state may move to Error. Rescheduling back to AwaitingFetch is not
    /// a forward step and is done explicitly by the graph node.
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;

        if next == Error {
            return true;
        }

        matches!(
            (self, next),
            (Created, AwaitingFetch)
                | (AwaitingFetch, Fetching)
                | (Fetching, AwaitingProcessing)
                | (Fetching, Completed)
                | (AwaitingProcessing, Processing)
                | (Processing, AwaitingLoad)
                | (AwaitingLoad, Loading)
                | (Loading, Completed)
        )
    }

    /// Converts the state to its string representation
    ///
    /// This is used for checkpoints and summaries.
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::AwaitingFetch => "awaiting_fetch",
            Self::Fetching => "fetching",
            Self::AwaitingProcessing => "awaiting_processing",
            Self::Processing => "processing",
            Self::AwaitingLoad => "awaiting_load",
            Self::Loading => "loading",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Parses a state from its string representation
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn from_db_string(s: &str) -> Option<Self> {
        Self::all_states()
            .into_iter()
            .find(|state| state.to_db_string() == s)
    }

    /// Returns all possible pipeline states in pipeline order
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Created,
            Self::AwaitingFetch,
            Self::Fetching,
            Self::AwaitingProcessing,
            Self::Processing,
            Self::AwaitingLoad,
            Self::Loading,
            Self::Completed,
            Self::Error,
        ]
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_settled() {
        assert!(PipelineState::Completed.is_settled());
        assert!(PipelineState::Error.is_settled());

        assert!(!PipelineState::Created.is_settled());
        assert!(!PipelineState::AwaitingFetch.is_settled());
        assert!(!PipelineState::Loading.is_settled());
    }

    #[test]
    fn test_forward_transitions() {
        use PipelineState::*;

        assert!(Created.can_transition_to(AwaitingFetch));
        assert!(AwaitingFetch.can_transition_to(Fetching));
        assert!(Fetching.can_transition_to(AwaitingProcessing));
        assert!(Fetching.can_transition_to(Completed));
        assert!(AwaitingProcessing.can_transition_to(Processing));
        assert!(Processing.can_transition_to(AwaitingLoad));
        assert!(AwaitingLoad.can_transition_to(Loading));
        assert!(Loading.can_transition_to(Completed));
    }

    #[test]
    fn test_illegal_transitions() {
        use PipelineState::*;

        assert!(!Created.can_transition_to(Fetching));
        assert!(!AwaitingFetch.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(AwaitingFetch));
        assert!(!Processing.can_transition_to(Completed));
        assert!(!Loading.can_transition_to(Loading));
    }

    #[test]
    fn test_any_state_can_fail() {
        for state in PipelineState::all_states() {
            assert!(state.can_transition_to(PipelineState::Error));
        }
    }

    #[test]
    fn test_rank_follows_pipeline_order() {
        let ranks: Vec<u8> = PipelineState::all_states()
            .iter()
            .map(|s| s.rank())
            .collect();
        let mut sorted = ranks.clone();
        sorted.sort();
        assert_eq!(ranks, sorted);
    }

    #[test]
    fn test_db_string_round_trip() {
        for state in PipelineState::all_states() {
            let s = state.to_db_string();
            assert_eq!(PipelineState::from_db_string(s), Some(state));
        }

        assert_eq!(PipelineState::from_db_string("invalid"), None);
    }

    #[test]
    fn test_serde_names_match_db_strings() {
        let json = serde_json::to_string(&PipelineState::AwaitingProcessing).unwrap();
        assert_eq!(json, "\"awaiting_processing\"");
    }

    #[test]
    fn test_display() {
        assert_eq!(PipelineState::AwaitingLoad.to_string(), "awaiting_load");
        assert_eq!(PipelineState::Error.to_string(), "error");
    }
}
