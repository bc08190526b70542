//! Items: the individually downloadable units inside a job.

use serde::Serialize;

/// One resolved download unit, as handed to the engine by a resolver.
/// The engine never inspects `source_ref`; only the downloader does.
#[derive(Debug, Clone)]
pub struct ItemSpec {
    /// Identifier unique within the job (e.g. a video id).
    pub id: String,
    /// Opaque locator the downloader understands (e.g. a watch URL).
    pub source_ref: String,
    /// Human-readable title for status displays, when the resolver knows it.
    pub title: Option<String>,
    /// Expected size in bytes, when the resolver knows it.
    pub size_hint: Option<u64>,
}

impl ItemSpec {
    pub fn new(id: impl Into<String>, source_ref: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_ref: source_ref.into(),
            title: None,
            size_hint: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Display label for the "active" status list: title when known, id otherwise.
    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}

/// Lifecycle of one item. Transitions are driven exclusively by the worker
/// holding the item; `Completed` and `Failed` are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Pending,
    Active,
    Retrying,
    Completed,
    Failed,
}

impl ItemState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemState::Completed | ItemState::Failed)
    }
}

/// Per-item record owned by the job table.
#[derive(Debug, Clone)]
pub struct Item {
    pub spec: ItemSpec,
    pub state: ItemState,
    /// Attempts made so far (incremented at claim time).
    pub attempts: u32,
    /// Present when `state` is `Failed` or `Retrying`.
    pub last_error: Option<String>,
}

impl Item {
    pub fn new(spec: ItemSpec) -> Self {
        Self {
            spec,
            state: ItemState::Pending,
            attempts: 0,
            last_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_item_is_pending_with_no_attempts() {
        let item = Item::new(ItemSpec::new("abc123", "https://example.com/watch?v=abc123"));
        assert_eq!(item.state, ItemState::Pending);
        assert_eq!(item.attempts, 0);
        assert!(item.last_error.is_none());
    }

    #[test]
    fn terminal_states() {
        assert!(ItemState::Completed.is_terminal());
        assert!(ItemState::Failed.is_terminal());
        assert!(!ItemState::Pending.is_terminal());
        assert!(!ItemState::Active.is_terminal());
        assert!(!ItemState::Retrying.is_terminal());
    }

    #[test]
    fn label_prefers_title() {
        let spec = ItemSpec::new("abc123", "u").with_title("How to solder");
        assert_eq!(spec.label(), "How to solder");
        let untitled = ItemSpec::new("abc123", "u");
        assert_eq!(untitled.label(), "abc123");
    }
}
