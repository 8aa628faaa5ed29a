//! Actions and the action queue
//!
//! The fluent builder only records what to do. Nothing is validated here;
//! a bad option set is reported when the queue is executed.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::filters::FilterOptions;

/// How two mixed tracks of different length decide the output length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationPolicy {
    Shortest,
    #[default]
    Longest,
    /// Length of the track already in the pipeline
    First,
}

impl DurationPolicy {
    /// Engine-native name of the policy
    pub fn as_str(&self) -> &'static str {
        match self {
            DurationPolicy::Shortest => "shortest",
            DurationPolicy::Longest => "longest",
            DurationPolicy::First => "first",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MixOptions {
    pub duration: DurationPolicy,
}

impl MixOptions {
    pub fn with_duration(duration: DurationPolicy) -> Self {
        Self { duration }
    }
}

/// Silence trimming and padding; unset fields use `TrimDefaults`.
///
/// Recipes use snake_case keys like every other action; the camelCase
/// spellings are accepted too.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimOptions {
    /// Minimum non-silent run (seconds) that ends leading trimming
    #[serde(alias = "startDuration")]
    pub start_duration: Option<f64>,
    /// Level (dB) below which leading audio counts as silence
    #[serde(alias = "startThreshold")]
    pub start_threshold: Option<f64>,
    #[serde(alias = "stopDuration")]
    pub stop_duration: Option<f64>,
    #[serde(alias = "stopThreshold")]
    pub stop_threshold: Option<f64>,
    /// Silence added before the trimmed audio, in milliseconds
    #[serde(alias = "paddingStart")]
    pub padding_start: Option<u64>,
    /// Silence added after the trimmed audio, in milliseconds
    #[serde(alias = "paddingEnd")]
    pub padding_end: Option<u64>,
}

impl TrimOptions {
    pub fn padded(padding_start_ms: u64, padding_end_ms: u64) -> Self {
        Self {
            padding_start: Some(padding_start_ms),
            padding_end: Some(padding_end_ms),
            ..Self::default()
        }
    }
}

/// One recorded pipeline operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    Add {
        source: PathBuf,
    },
    Mix {
        source: PathBuf,
        #[serde(default)]
        options: MixOptions,
    },
    Silence {
        duration_ms: u64,
    },
    Filter {
        name: String,
        #[serde(default)]
        options: FilterOptions,
    },
    Trim {
        #[serde(default)]
        options: TrimOptions,
    },
}

impl Action {
    /// Short tag used for logging and scratch file names
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Add { .. } => "add",
            Action::Mix { .. } => "mix",
            Action::Silence { .. } => "silence",
            Action::Filter { .. } => "filter",
            Action::Trim { .. } => "trim",
        }
    }
}

/// Append-only list of pending actions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionQueue {
    actions: Vec<Action>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Action) {
        self.actions.push(action);
    }

    /// Record a mix; with nothing queued yet there is no base track, so the
    /// source simply becomes the first track.
    pub fn push_mix(&mut self, source: PathBuf, options: MixOptions) {
        if self.actions.is_empty() {
            self.actions.push(Action::Add { source });
        } else {
            self.actions.push(Action::Mix { source, options });
        }
    }

    /// Take every pending action, leaving the queue empty
    pub fn drain(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.actions)
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }
}

impl FromIterator<Action> for ActionQueue {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        let mut queue = ActionQueue::new();
        for action in iter {
            match action {
                Action::Mix { source, options } => queue.push_mix(source, options),
                other => queue.push(other),
            }
        }
        queue
    }
}
