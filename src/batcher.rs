use crate::dataset::ExampleItem;
use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;

/// A batch of transformed examples, ready for the model.
///
/// The batcher's responsibility is to convert a Vec of items into stacked
/// tensors, one per feature group, plus the labels.
#[derive(Clone, Debug)]
pub struct ExampleBatch<B: Backend> {
    /// Scaled numeric features: shape [batch_size, numeric]
    pub numeric: Tensor<B, 2>,
    /// Vocabulary indices: shape [batch_size, categorical]
    pub categorical: Tensor<B, 2, Int>,
    /// Binary flags cast to float: shape [batch_size, binary]
    pub binary: Tensor<B, 2>,
    /// Labels: shape [batch_size, 1]
    pub labels: Tensor<B, 2>,
}

#[derive(Clone, Debug, Default)]
pub struct ExampleBatcher<B: Backend> {
    _phantom: core::marker::PhantomData<B>,
}

impl<B: Backend> ExampleBatcher<B> {
    pub fn new() -> Self {
        Self {
            _phantom: core::marker::PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, ExampleItem, ExampleBatch<B>> for ExampleBatcher<B> {
    fn batch(&self, items: Vec<ExampleItem>, device: &B::Device) -> ExampleBatch<B> {
        let batch_size = items.len();
        assert!(batch_size > 0, "Cannot create a batch from an empty Vec");

        let numeric_dim = items[0].numeric.len();
        let categorical_dim = items[0].categorical.len();
        let binary_dim = items[0].binary.len();

        // Pre-allocate with exact capacity so extend_from_slice never
        // reallocates while stacking
        let mut all_numeric = Vec::with_capacity(batch_size * numeric_dim);
        let mut all_categorical = Vec::with_capacity(batch_size * categorical_dim);
        let mut all_binary = Vec::with_capacity(batch_size * binary_dim);
        let mut all_labels = Vec::with_capacity(batch_size);

        for item in items.iter() {
            all_numeric.extend_from_slice(&item.numeric);
            all_categorical.extend_from_slice(&item.categorical);
            all_binary.extend_from_slice(&item.binary);
            all_labels.push(item.label);
        }

        let numeric = Tensor::<B, 2>::from_data(
            TensorData::new(all_numeric, [batch_size, numeric_dim]),
            device,
        );

        let categorical = Tensor::<B, 2, Int>::from_data(
            TensorData::new(all_categorical, [batch_size, categorical_dim]),
            device,
        );

        let binary = Tensor::<B, 2>::from_data(
            TensorData::new(all_binary, [batch_size, binary_dim]),
            device,
        );

        let labels =
            Tensor::<B, 2>::from_data(TensorData::new(all_labels, [batch_size, 1]), device);

        ExampleBatch {
            numeric,
            categorical,
            binary,
            labels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::backend::ndarray::NdArrayDevice;

    fn item(age: f32, gender: i64, label: f32) -> ExampleItem {
        ExampleItem {
            numeric: vec![age, 0.5, -0.5, 1.0],
            categorical: vec![gender, 0],
            binary: vec![0.0, 1.0],
            label,
        }
    }

    #[test]
    fn it_stacks_items_into_tensors() {
        let device = NdArrayDevice::default();
        let batcher = ExampleBatcher::<NdArray>::new();

        let batch = batcher.batch(vec![item(-1.0, 0, 0.0), item(1.0, 2, 1.0)], &device);

        assert_eq!(batch.numeric.dims(), [2, 4]);
        assert_eq!(batch.categorical.dims(), [2, 2]);
        assert_eq!(batch.binary.dims(), [2, 2]);
        assert_eq!(batch.labels.dims(), [2, 1]);

        let labels = batch.labels.into_data().to_vec::<f32>().unwrap();
        assert_eq!(labels, vec![0.0, 1.0]);

        let categorical = batch.categorical.into_data().to_vec::<i64>().unwrap();
        assert_eq!(categorical, vec![0, 0, 2, 0]);
    }
}
