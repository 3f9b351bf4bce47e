//! Analyser error types

use thiserror::Error;
use vectorlink_codec::CodecError;
use vectorlink_network::TransportError;

/// Batch pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Pipeline parameters the scheduler cannot run with
    #[error("Invalid pipeline configuration: {message}")]
    Configuration { message: String },

    /// A producer could not assemble its batch
    #[error("Producer {producer} failed on batch {batch}: {source}")]
    Producer {
        producer: usize,
        batch: usize,
        #[source]
        source: TransportError,
    },

    /// Batch payload could not be decoded
    #[error("Failed to decode batch payload: {0}")]
    Decode(#[from] CodecError),

    /// Batch content unusable by the handler
    #[error("Handler rejected batch {batch} from producer {producer}: {message}")]
    Handler {
        producer: usize,
        batch: usize,
        message: String,
    },

    /// A spawned pipeline task panicked or was aborted
    #[error("Pipeline task {task} did not complete: {message}")]
    Task { task: String, message: String },
}

impl PipelineError {
    pub fn configuration(message: impl Into<String>) -> Self {
        PipelineError::Configuration {
            message: message.into(),
        }
    }

    /// Underlying transport failure, if any
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            PipelineError::Producer { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::Configuration { .. } => "configuration",
            PipelineError::Producer { source, .. } => source.category(),
            PipelineError::Decode(_) => "decode",
            PipelineError::Handler { .. } => "handler",
            PipelineError::Task { .. } => "task",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_error_keeps_transport_category() {
        let error = PipelineError::Producer {
            producer: 0,
            batch: 3,
            source: TransportError::SequenceFault {
                expected: 10,
                got: 14,
            },
        };
        assert_eq!(error.category(), "sequence_fault");
        assert!(error.transport().is_some());
        assert!(error.to_string().contains("batch 3"));
    }

    #[test]
    fn test_configuration_error_message() {
        let error = PipelineError::configuration("queue capacity must be at least 1");
        assert_eq!(error.category(), "configuration");
        assert!(error.transport().is_none());
        assert!(error.to_string().contains("queue capacity"));
    }
}
