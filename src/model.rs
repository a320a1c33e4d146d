use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{Linear, LinearConfig, PaddingConfig2d, Relu};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Number of digit classes (0 through 9).
pub const NUM_CLASSES: usize = 10;

/// Side length of the input canvas in pixels.
pub const IMAGE_SIDE: usize = 28;

/// Length of the flattened feature map entering the fully connected head:
/// two 3x3 same-padded convolutions at 28x28, one 2x2 max-pool down to
/// 14x14, one more convolution, so 128 * 14 * 14.
pub const FLATTENED_SIZE: usize = 128 * (IMAGE_SIDE / 2) * (IMAGE_SIDE / 2);

/// The digit classification network.
///
/// The topology is fixed: checkpoints are keyed by layer name and shaped to
/// exactly these layers, so any change here invalidates every saved
/// checkpoint. The forward pass holds no mutable state and can be invoked
/// concurrently against the same loaded parameters.
#[derive(Module, Debug)]
pub struct Model<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    pool: MaxPool2d,
    conv3: Conv2d<B>,
    fc1: Linear<B>,
    fc2: Linear<B>,
    activation: Relu,
}

#[derive(Config, Debug)]
pub struct ModelConfig {
    #[config(default = 10)]
    pub num_classes: usize,
    #[config(default = 256)]
    pub hidden_size: usize,
}

impl ModelConfig {
    /// Initialize the model with random parameters.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Model<B> {
        Model {
            conv1: Conv2dConfig::new([1, 32], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            conv2: Conv2dConfig::new([32, 64], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            conv3: Conv2dConfig::new([64, 128], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            fc1: LinearConfig::new(FLATTENED_SIZE, self.hidden_size).init(device),
            fc2: LinearConfig::new(self.hidden_size, self.num_classes).init(device),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> Model<B> {
    /// Maps a batch of single-channel 28x28 images to unnormalized class
    /// scores, shape (batch, num_classes). Softmax is left to the caller;
    /// training feeds the raw scores to the cross-entropy loss instead.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, _, _, _] = images.dims();

        let x = self.activation.forward(self.conv1.forward(images));
        let x = self.activation.forward(self.conv2.forward(x));
        let x = self.pool.forward(x);
        let x = self.activation.forward(self.conv3.forward(x));

        let x = x.reshape([batch_size, FLATTENED_SIZE]);
        let x = self.activation.forward(self.fc1.forward(x));

        self.fc2.forward(x)
    }
}
