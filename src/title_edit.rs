//! In-place title rename.

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TitleEdit {
    #[default]
    Idle,
    Editing {
        original: String,
    },
}

/// How an edit ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    Renamed(String),
    /// Committed text was blank or identical; title kept.
    Unchanged,
    /// Escape; the original title is shown again verbatim.
    Cancelled(String),
}

impl TitleEdit {
    pub fn is_editing(&self) -> bool {
        matches!(self, Self::Editing { .. })
    }

    /// Enter edit mode. A second call while editing is a no-op.
    pub fn begin(&mut self, current_title: &str) -> bool {
        if self.is_editing() {
            return false;
        }
        *self = Self::Editing { original: current_title.to_string() };
        true
    }

    /// Enter, focus loss and a click outside all end up here.
    pub fn commit(&mut self, text: &str) -> Option<EditOutcome> {
        let Self::Editing { original } = std::mem::take(self) else {
            return None;
        };
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == original {
            Some(EditOutcome::Unchanged)
        } else {
            Some(EditOutcome::Renamed(trimmed.to_string()))
        }
    }

    pub fn cancel(&mut self) -> Option<EditOutcome> {
        match std::mem::take(self) {
            Self::Editing { original } => Some(EditOutcome::Cancelled(original)),
            Self::Idle => None,
        }
    }
}
