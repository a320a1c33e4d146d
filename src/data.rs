use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::vision::MnistItem;
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Int, Tensor, TensorData};

/// Collates MNIST items into batches for training.
#[derive(Clone, Default)]
pub struct MnistBatcher;

#[derive(Clone, Debug)]
pub struct MnistBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> Batcher<B, MnistItem, MnistBatch<B>> for MnistBatcher {
    fn batch(&self, items: Vec<MnistItem>, device: &B::Device) -> MnistBatch<B> {
        let images = items
            .iter()
            .map(|item| TensorData::from(item.image).convert::<B::FloatElem>())
            .map(|data| Tensor::<B, 2>::from_data(data, device))
            .map(|tensor| tensor.reshape([1, 1, 28, 28]))
            // Scale to [0, 1], exactly what the serving-side preprocessor
            // produces. Training and inference must agree on this.
            .map(|tensor| tensor / 255)
            .collect();

        let targets = items
            .iter()
            .map(|item| {
                Tensor::<B, 1, Int>::from_data([(item.label as i64).elem::<B::IntElem>()], device)
            })
            .collect();

        MnistBatch {
            images: Tensor::cat(images, 0),
            targets: Tensor::cat(targets, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray<f32>;

    fn item(label: u8, fill: f32) -> MnistItem {
        MnistItem {
            image: [[fill; 28]; 28],
            label,
        }
    }

    #[test]
    fn batch_shapes_and_scaling() {
        let batcher = MnistBatcher;
        let device = Default::default();

        let batch: MnistBatch<TestBackend> =
            batcher.batch(vec![item(3, 255.0), item(7, 0.0)], &device);

        assert_eq!(batch.images.dims(), [2, 1, 28, 28]);
        assert_eq!(batch.targets.dims(), [2]);

        let pixels = batch.images.into_data().to_vec::<f32>().unwrap();
        let max = pixels.iter().cloned().fold(f32::MIN, f32::max);
        let min = pixels.iter().cloned().fold(f32::MAX, f32::min);
        assert_eq!(max, 1.0);
        assert_eq!(min, 0.0);

        let targets = batch.targets.into_data().to_vec::<i64>().unwrap();
        assert_eq!(targets, vec![3, 7]);
    }
}
