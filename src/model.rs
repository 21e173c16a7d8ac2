use crate::batcher::ExampleBatch;
use crate::schema::{BINARY_FEATURES, NUMERIC_FEATURES};
use burn::nn;
use burn::prelude::*;
use burn::tensor::activation::{relu, sigmoid};
use serde::{Deserialize, Serialize};
use std::{fs, io};

const DENSE_1: usize = 128;
const DENSE_2: usize = 64;
const DENSE_3: usize = 32;
const DROPOUT_1: f64 = 0.3;
const DROPOUT_2: f64 = 0.2;

/// Embedding width for a categorical feature with `vocab_size` fitted tokens.
pub fn embedding_dim(vocab_size: usize) -> usize {
    usize::min(50, (vocab_size + 1) / 2)
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Everything needed to rebuild the model graph before loading a weight
/// record: the fitted vocabulary sizes, in canonical categorical order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskModelConfig {
    pub vocab_sizes: Vec<usize>,
}

impl RiskModelConfig {
    pub fn new(vocab_sizes: Vec<usize>) -> Self {
        Self { vocab_sizes }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> RiskModel<B> {
        let embeddings: Vec<nn::Embedding<B>> = self
            .vocab_sizes
            .iter()
            // One extra slot holds the out-of-vocabulary index
            .map(|&v| nn::EmbeddingConfig::new(v + 1, embedding_dim(v)).init(device))
            .collect();

        let embedded_width: usize = self.vocab_sizes.iter().map(|&v| embedding_dim(v)).sum();
        let input_width = NUMERIC_FEATURES.len() + BINARY_FEATURES.len() + embedded_width;

        RiskModel {
            embeddings,
            dense1: nn::LinearConfig::new(input_width, DENSE_1).init(device),
            dropout1: nn::DropoutConfig::new(DROPOUT_1).init(),
            dense2: nn::LinearConfig::new(DENSE_1, DENSE_2).init(device),
            dropout2: nn::DropoutConfig::new(DROPOUT_2).init(),
            dense3: nn::LinearConfig::new(DENSE_2, DENSE_3).init(device),
            output: nn::LinearConfig::new(DENSE_3, 1).init(device),
        }
    }

    pub fn save(&self, path: &str) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &str) -> Result<Self, Error> {
        let json = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        Ok(config)
    }
}

/// Feed-forward risk classifier over the transformed feature groups.
///
/// Numeric and binary inputs pass through as scalars, each categorical input
/// goes through its own embedding table and is flattened, and the
/// concatenated vector runs through three dense blocks into a single sigmoid
/// output.
#[derive(Module, Debug)]
pub struct RiskModel<B: Backend> {
    embeddings: Vec<nn::Embedding<B>>,
    dense1: nn::Linear<B>,
    dropout1: nn::Dropout,
    dense2: nn::Linear<B>,
    dropout2: nn::Dropout,
    dense3: nn::Linear<B>,
    output: nn::Linear<B>,
}

impl<B: Backend> RiskModel<B> {
    /// Probability of the positive class for each example in the batch.
    /// Output shape [batch_size, 1], every element in (0, 1).
    pub fn forward(
        &self,
        numeric: Tensor<B, 2>,
        categorical: Tensor<B, 2, Int>,
        binary: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let [batch_size, _] = numeric.dims();

        let mut encoded = vec![numeric];

        for (column, embedding) in self.embeddings.iter().enumerate() {
            let indices = categorical.clone().narrow(1, column, 1);
            // [batch, 1, dim] -> flatten to [batch, dim]
            let embedded = embedding.forward(indices);
            let dim = embedded.dims()[2];
            encoded.push(embedded.reshape([batch_size, dim]));
        }

        encoded.push(binary);

        let x = Tensor::cat(encoded, 1);

        let x = self.dropout1.forward(relu(self.dense1.forward(x)));
        let x = self.dropout2.forward(relu(self.dense2.forward(x)));
        let x = relu(self.dense3.forward(x));

        sigmoid(self.output.forward(x))
    }

    /// Forward over a batch, keeping labels out of the inputs.
    pub fn forward_batch(&self, batch: ExampleBatch<B>) -> Tensor<B, 2> {
        self.forward(batch.numeric, batch.categorical, batch.binary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batcher::ExampleBatcher;
    use crate::dataset::ExampleItem;
    use burn::backend::NdArray;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::data::dataloader::batcher::Batcher;

    #[test]
    fn it_computes_the_embedding_dim() {
        assert_eq!(embedding_dim(1), 1);
        assert_eq!(embedding_dim(3), 2);
        assert_eq!(embedding_dim(6), 3);
        assert_eq!(embedding_dim(99), 50);
        assert_eq!(embedding_dim(1000), 50);
    }

    #[test]
    fn it_outputs_one_probability_per_example() {
        let device = NdArrayDevice::default();
        let model = RiskModelConfig::new(vec![3, 6]).init::<NdArray>(&device);

        let batcher = ExampleBatcher::<NdArray>::new();
        let items = vec![
            ExampleItem {
                numeric: vec![0.1, -0.3, 1.5, 0.0],
                categorical: vec![0, 5],
                binary: vec![1.0, 0.0],
                label: 1.0,
            },
            ExampleItem {
                numeric: vec![-1.0, 0.3, 0.5, 2.0],
                // Out-of-vocabulary indices are valid embedding inputs
                categorical: vec![3, 6],
                binary: vec![0.0, 0.0],
                label: 0.0,
            },
        ];
        let batch = batcher.batch(items, &device);

        let output = model.forward_batch(batch);
        assert_eq!(output.dims(), [2, 1]);

        let probabilities = output.into_data().to_vec::<f32>().unwrap();
        for p in probabilities {
            assert!(p > 0.0 && p < 1.0, "probability out of range: {}", p);
        }
    }

    #[test]
    fn it_round_trips_the_model_config() {
        use std::time::{SystemTime, UNIX_EPOCH};
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = format!(
            "/tmp/diapred_model_config_test_{}_{}.json",
            std::process::id(),
            timestamp
        );

        let config = RiskModelConfig::new(vec![3, 6]);
        config.save(&path).unwrap();
        let loaded = RiskModelConfig::load(&path).unwrap();

        assert_eq!(loaded, config);
        std::fs::remove_file(&path).ok();
    }
}
