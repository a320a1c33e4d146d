use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid base64 in image payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Undecodable image data: {0}")]
    ImageDecode(#[from] image::ImageError),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Model checkpoint not found at {0}")]
    ModelFileMissing(PathBuf),
    #[error("Model checkpoint does not match the network architecture: {0}")]
    ShapeMismatch(String),
}

impl Error {
    /// Whether this error is scoped to a single request.
    /// Request-scoped errors are reported back on the channel they arrived on;
    /// anything else is fatal at startup, before the listener binds.
    pub fn is_request_scoped(&self) -> bool {
        matches!(
            self,
            Error::Base64(_) | Error::ImageDecode(_) | Error::Inference(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_errors_are_not_request_scoped() {
        let missing = Error::ModelFileMissing(PathBuf::from("cnn_mnist_model.mpk"));
        let mismatch = Error::ShapeMismatch("fc2.weight".to_string());

        assert!(!missing.is_request_scoped());
        assert!(!mismatch.is_request_scoped());
        assert!(Error::Inference("nan".to_string()).is_request_scoped());
    }
}
