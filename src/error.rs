use thiserror::Error;

#[derive(Debug, Error)]
pub enum YellowTrackerError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

pub type Result<T> = std::result::Result<T, YellowTrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_category() {
        let err = YellowTrackerError::Config("x".to_string());
        assert!(format!("{err}").contains("configuration error"));
        let err = YellowTrackerError::Storage("locked".to_string());
        assert_eq!(err.to_string(), "storage error: locked");
    }
}
