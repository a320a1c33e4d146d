use std::path::Path;

use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::activation::softmax;
use burn::tensor::backend::Backend;

use crate::error::Error;
use crate::model::{Model, ModelConfig, ModelRecord, FLATTENED_SIZE, NUM_CLASSES};
use crate::preprocessing::{self, ChannelPolicy};

/// Fixed checkpoint filename, relative to the working directory.
pub const DEFAULT_CHECKPOINT: &str = "cnn_mnist_model.mpk";

/// The digit recognition service.
///
/// Holds one loaded model instance; parameters are immutable after load.
/// They are materialized lazily, though, so the instance is not freely
/// shareable across threads: the server keeps it behind a mutex and takes
/// the lock for the duration of a forward pass. Construct it once at
/// startup and pass it into the request handler rather than reaching for
/// ambient state.
///
/// Inference runs on a non-autodiff backend, so the forward pass carries
/// no gradient bookkeeping.
pub struct Recognizer<B: Backend> {
    model: Model<B>,
    device: B::Device,
    policy: ChannelPolicy,
}

impl<B: Backend> Recognizer<B> {
    /// Load the trained parameters from a checkpoint file.
    ///
    /// Fails with `ModelFileMissing` if the file is absent and
    /// `ShapeMismatch` if the stored parameters do not line up with the
    /// network architecture. Both are meant to be fatal at startup,
    /// before the listener binds.
    pub fn from_checkpoint(
        path: &Path,
        device: B::Device,
        policy: ChannelPolicy,
    ) -> Result<Self, Error> {
        if !path.exists() {
            return Err(Error::ModelFileMissing(path.to_path_buf()));
        }

        let record: ModelRecord<B> = NamedMpkFileRecorder::<FullPrecisionSettings>::default()
            .load(path.to_path_buf(), &device)
            .map_err(|e| Error::ShapeMismatch(e.to_string()))?;

        let config = ModelConfig::new();
        validate_record(&record, &config)?;

        let model = config.init::<B>(&device).load_record(record);

        Ok(Self {
            model,
            device,
            policy,
        })
    }

    /// Wrap an already-constructed model. Used by tests and by callers
    /// that load parameters through a different recorder.
    pub fn with_model(model: Model<B>, device: B::Device, policy: ChannelPolicy) -> Self {
        Self {
            model,
            device,
            policy,
        }
    }

    /// Classify a drawing. `payload` is a base64 image, with or without a
    /// data-URL prefix.
    ///
    /// Returns ten probabilities, index i = probability of digit i,
    /// non-negative and summing to one. An empty canvas short-circuits to
    /// the uniform distribution without invoking the model; the network
    /// was never trained on blank input and would otherwise report high
    /// confidence for some arbitrary digit.
    pub fn predict(&self, payload: &str) -> Result<Vec<f32>, Error> {
        let input = preprocessing::decode_payload(payload, self.policy)?;

        if input.is_blank() {
            return Ok(vec![1.0 / NUM_CLASSES as f32; NUM_CLASSES]);
        }

        let tensor = input.to_tensor::<B>(&self.device);
        let scores = self.model.forward(tensor);
        let probabilities = softmax(scores, 1);

        probabilities
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| Error::Inference(format!("{e:?}")))
    }
}

/// Check every parameter tensor in the record against the shapes the
/// architecture dictates, so a stale or foreign checkpoint is rejected
/// with a message naming the offending layer.
fn validate_record<B: Backend>(record: &ModelRecord<B>, config: &ModelConfig) -> Result<(), Error> {
    let checks = [
        (
            "conv1.weight",
            vec![32, 1, 3, 3],
            record.conv1.weight.val().dims().to_vec(),
        ),
        (
            "conv2.weight",
            vec![64, 32, 3, 3],
            record.conv2.weight.val().dims().to_vec(),
        ),
        (
            "conv3.weight",
            vec![128, 64, 3, 3],
            record.conv3.weight.val().dims().to_vec(),
        ),
        (
            "fc1.weight",
            vec![FLATTENED_SIZE, config.hidden_size],
            record.fc1.weight.val().dims().to_vec(),
        ),
        (
            "fc2.weight",
            vec![config.hidden_size, config.num_classes],
            record.fc2.weight.val().dims().to_vec(),
        ),
    ];

    for (name, expected, found) in checks {
        if expected != found {
            return Err(Error::ShapeMismatch(format!(
                "{name}: expected shape {expected:?}, checkpoint has {found:?}"
            )));
        }
    }

    Ok(())
}
