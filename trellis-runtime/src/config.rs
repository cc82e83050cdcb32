/// How a loop renders its rows the first time it has any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowCreation {
    /// Create every row inside the pass that evaluated the loop.
    Eager,
    /// Spread creation over scheduler turns, `per_turn` rows at a time.
    /// Pending rows are cancelled when the loop is re-evaluated.
    Deferred { per_turn: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub row_creation: RowCreation,
    /// Turns [`crate::Runtime::settle`] may take before giving up.
    pub max_turns: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            row_creation: RowCreation::Deferred { per_turn: 32 },
            max_turns: 10_000,
        }
    }
}

impl EngineConfig {
    pub fn eager() -> Self {
        Self {
            row_creation: RowCreation::Eager,
            ..Self::default()
        }
    }

    pub fn deferred(per_turn: usize) -> Self {
        Self {
            row_creation: RowCreation::Deferred {
                per_turn: per_turn.max(1),
            },
            ..Self::default()
        }
    }
}
