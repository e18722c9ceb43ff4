use std::fmt;
use std::sync::Arc;

use super::Conversation;
use crate::message::IncomingMessage;

/// Callback invoked with the captured answer and the conversation it
/// belongs to. Call `convo.next()` to unblock the script.
pub type Callback =
    Arc<dyn Fn(&IncomingMessage, &mut Conversation) -> anyhow::Result<()> + Send + Sync>;

/// What a question does with its answer.
#[derive(Clone)]
pub enum Handler {
    /// One callback for every answer.
    Simple(Callback),
    /// First matching pattern wins; otherwise the first fallback branch.
    Patterns(Vec<PatternBranch>),
}

impl Handler {
    pub fn simple<F>(f: F) -> Self
    where
        F: Fn(&IncomingMessage, &mut Conversation) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::Simple(Arc::new(f))
    }

    #[must_use]
    pub const fn patterns(branches: Vec<PatternBranch>) -> Self {
        Self::Patterns(branches)
    }
}

impl From<Vec<PatternBranch>> for Handler {
    fn from(branches: Vec<PatternBranch>) -> Self {
        Self::Patterns(branches)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple(_) => f.write_str("Simple(<fn>)"),
            Self::Patterns(branches) => f.debug_tuple("Patterns").field(branches).finish(),
        }
    }
}

#[derive(Clone)]
pub struct PatternBranch {
    pub pattern: Option<String>,
    pub is_default: bool,
    pub callback: Callback,
}

impl PatternBranch {
    pub fn pattern<F>(pattern: impl Into<String>, f: F) -> Self
    where
        F: Fn(&IncomingMessage, &mut Conversation) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            pattern: Some(pattern.into()),
            is_default: false,
            callback: Arc::new(f),
        }
    }

    /// Branch taken when no pattern matched.
    pub fn fallback<F>(f: F) -> Self
    where
        F: Fn(&IncomingMessage, &mut Conversation) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            pattern: None,
            is_default: true,
            callback: Arc::new(f),
        }
    }
}

impl fmt::Debug for PatternBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternBranch")
            .field("pattern", &self.pattern)
            .field("is_default", &self.is_default)
            .finish_non_exhaustive()
    }
}
