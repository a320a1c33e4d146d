use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};
use burn::optim::AdamConfig;

use scrawl::model::ModelConfig;
use scrawl::training::{self, TrainingConfig};

const ARTIFACT_DIR: &str = "artifacts";

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    training::train::<Autodiff<NdArray<f32>>>(
        ARTIFACT_DIR,
        TrainingConfig::new(ModelConfig::new(), AdamConfig::new()),
        NdArrayDevice::default(),
    )
}
