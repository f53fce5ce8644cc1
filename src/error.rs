use thiserror::Error;

/// Errors raised by the decision core
///
/// `Validation` and `DataInsufficiency` are the two conditions a caller can
/// hit from a direct calculator call. The decision engine never returns
/// either; it folds them into a non-executable decision instead.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("insufficient data for {context}: need {required} bars, have {available}")]
    DataInsufficiency {
        context: String,
        required: usize,
        available: usize,
    },

    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn insufficient(context: impl Into<String>, required: usize, available: usize) -> Self {
        Self::DataInsufficiency {
            context: context.into(),
            required,
            available,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_data_insufficiency(&self) -> bool {
        matches!(self, Self::DataInsufficiency { .. })
    }
}
