use serde::{Deserialize, Serialize};

/// Tagged state of an asynchronous data source.
///
/// `Failed` carries an opaque, human-readable reason; callers do not
/// branch on its content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum FetchStatus<T> {
    #[default]
    Idle,
    Loading,
    Ready(T),
    Failed(String),
}

impl<T> FetchStatus<T> {
    pub fn is_idle(&self) -> bool {
        matches!(self, FetchStatus::Idle)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, FetchStatus::Loading)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, FetchStatus::Ready(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, FetchStatus::Failed(_))
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            FetchStatus::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&str> {
        match self {
            FetchStatus::Failed(reason) => Some(reason.as_str()),
            _ => None,
        }
    }
}
