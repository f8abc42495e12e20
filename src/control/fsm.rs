//! Finite state machine descriptions published by the robot

use serde::{Deserialize, Serialize};

/// Read-only description of one behaviour FSM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct FsmDescription {
    pub name: String,
    pub start: String,
    #[serde(default)]
    pub states: Vec<FsmState>,
    #[serde(default)]
    pub transitions: Vec<FsmTransition>,
    #[serde(default)]
    pub wildcard_transitions: Vec<FsmWildcardTransition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct FsmState {
    pub id: String,
}

/// Transition between two named states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct FsmTransition {
    #[serde(alias = "label")]
    pub id: String,
    pub from: String,
    pub to: String,
}

/// Transition that may fire from any state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct FsmWildcardTransition {
    #[serde(alias = "label")]
    pub id: String,
    pub to: String,
}

impl FsmDescription {
    pub fn state(&self, id: &str) -> Option<&FsmState> {
        self.states.iter().find(|state| state.id == id)
    }

    /// Transitions leaving `state`, wildcard transitions excluded.
    pub fn transitions_from<'a>(&'a self, state: &'a str) -> impl Iterator<Item = &'a FsmTransition> + 'a {
        self.transitions.iter().filter(move |transition| transition.from == state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_robot_fsm_json() {
        let fsm: FsmDescription = serde_json::from_value(json!({
            "name": "play-mode",
            "start": "idle",
            "states": [{"id": "idle"}, {"id": "playing"}],
            "transitions": [{"id": "start", "from": "idle", "to": "playing"}],
            "wildcardTransitions": [{"id": "stop", "to": "idle"}]
        }))
        .unwrap();

        assert_eq!(fsm.start, "idle");
        assert!(fsm.state("playing").is_some());
        assert_eq!(fsm.transitions_from("idle").count(), 1);
        assert_eq!(fsm.wildcard_transitions[0].to, "idle");
    }

    #[test]
    fn lists_default_to_empty() {
        let fsm: FsmDescription = serde_json::from_value(json!({"name": "x", "start": "a"})).unwrap();
        assert!(fsm.states.is_empty() && fsm.transitions.is_empty());
    }
}
