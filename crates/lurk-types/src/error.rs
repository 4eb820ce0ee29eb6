use thiserror::Error;

/// Turn-level refusals. All of them happen before any provider is contacted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("no providers selected")]
    EmptySelection,

    #[error("too many providers selected: {count} (max {max})")]
    TooManyProviders { count: usize, max: usize },

    #[error("prompt and attachments are both empty")]
    EmptyPrompt,

    #[error("token budget exceeded: estimated {estimated}, remaining {remaining}")]
    BudgetExceeded { estimated: u64, remaining: u64 },
}

/// Errors related to best-of-N synthesis. Backend failures never show up
/// here; they produce a fallback result instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    #[error("missing providers: {}", .0.join(", "))]
    MissingProviders(Vec<String>),
}

/// Errors related to turn history.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("history record not found")]
    NotFound,
}

/// Errors raised while loading configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: '{value}'")]
    InvalidEnv { name: String, value: String },
}
