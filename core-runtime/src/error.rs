use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_message_names_the_bridge() {
        let err = Error::CapabilityMissing {
            capability: "CodecProvider".to_string(),
            message: "inject one".to_string(),
        };
        assert_eq!(err.to_string(), "Capability missing: CodecProvider - inject one");
    }
}
