//! Export and serving of trained models.
//!
//! The export directory is the servable artifact: model weights, the model
//! config needed to rebuild the graph, the training config of the run, and a
//! copy of the fitted transform. Serving re-applies the transform to raw
//! serialized examples before inference, so clients send the same records
//! the pipeline ingests.

use crate::batcher::ExampleBatcher;
use crate::dataset::ExampleItem;
use crate::model::{RiskModel, RiskModelConfig};
use crate::schema::{LABEL_KEY, RawExample};
use crate::train_config::TrainConfig;
use crate::transform::TransformArtifact;
use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use burn::record::{CompactRecorder, Recorder};
use std::path::Path;

const MODEL_FILE: &str = "model";
const MODEL_CONFIG_FILE: &str = "model.json";
const TRAIN_CONFIG_FILE: &str = "train_config.json";
const TRANSFORM_DIR: &str = "transform";

/// Write the servable directory for a trained model.
pub fn export<B: Backend>(
    model: RiskModel<B>,
    model_config: &RiskModelConfig,
    train_config: &TrainConfig,
    artifact: &TransformArtifact,
    dir: &Path,
) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)?;

    let model_path = dir.join(MODEL_FILE);
    model
        .save_file(model_path.clone(), &CompactRecorder::new())
        .map_err(|e| anyhow::anyhow!("Failed to save model to {}: {}", model_path.display(), e))?;

    model_config.save(&dir.join(MODEL_CONFIG_FILE).display().to_string())?;
    train_config.save(&dir.join(TRAIN_CONFIG_FILE).display().to_string())?;
    artifact.save(&dir.join(TRANSFORM_DIR))?;

    Ok(())
}

/// A loaded servable: the model plus the transform it was trained behind.
pub struct Servable<B: Backend> {
    pub model: RiskModel<B>,
    pub model_config: RiskModelConfig,
    pub train_config: TrainConfig,
    artifact: TransformArtifact,
    device: B::Device,
}

impl<B: Backend> Servable<B> {
    /// Load a servable directory written by [`export`].
    pub fn load(dir: &Path, device: &B::Device) -> anyhow::Result<Self> {
        let model_config = RiskModelConfig::load(&dir.join(MODEL_CONFIG_FILE).display().to_string())?;
        let train_config = TrainConfig::load(&dir.join(TRAIN_CONFIG_FILE).display().to_string())?;
        let artifact = TransformArtifact::load(&dir.join(TRANSFORM_DIR))?;

        let model_path = dir.join(MODEL_FILE);
        let record = CompactRecorder::new()
            .load(model_path.clone(), device)
            .map_err(|e| {
                anyhow::anyhow!("Failed to load model from {}: {}", model_path.display(), e)
            })?;

        let model = model_config.init::<B>(device).load_record(record);

        Ok(Self {
            model,
            model_config,
            train_config,
            artifact,
            device: device.clone(),
        })
    }

    /// The serving signature: one serialized example in, one probability out.
    /// The example is a JSON object of raw features; no label is required.
    pub fn predict_serialized(&self, serialized: &str) -> anyhow::Result<f32> {
        let example: RawExample = serde_json::from_str(serialized)?;
        self.predict(&example)
    }

    /// Typed equivalent of [`Self::predict_serialized`].
    pub fn predict(&self, example: &RawExample) -> anyhow::Result<f32> {
        let mut transformed = self.artifact.apply_features(example)?;
        // Placeholder label, not used in inference
        transformed.insert_float(LABEL_KEY, 0.0);
        let item = ExampleItem::try_from(&transformed)?;

        // The batcher is a zero-sized struct, instantiating it here is
        // essentially free and keeps the code consistent with training
        let batcher = ExampleBatcher::<B>::new();
        let batch = batcher.batch(vec![item], &self.device);

        let output = self.model.forward_batch(batch);
        let probabilities = output
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("Failed to convert output tensor: {:?}", e))?;

        Ok(probabilities[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::backend::ndarray::NdArrayDevice;
    use std::path::PathBuf;

    fn create_temp_dir() -> PathBuf {
        use std::time::{SystemTime, UNIX_EPOCH};
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        PathBuf::from(format!(
            "/tmp/diapred_serving_test_{}_{}",
            std::process::id(),
            timestamp
        ))
    }

    fn example(age: f32, gender: &str, smoking: &str, label: Option<f32>) -> RawExample {
        let mut e = RawExample::new();
        e.insert_float("age", age);
        e.insert_float("bmi", 24.0 + age / 10.0);
        e.insert_float("HbA1c_level", 5.0 + age / 100.0);
        e.insert_float("blood_glucose_level", 100.0 + age);
        e.insert_text("gender", gender);
        e.insert_text("smoking_history", smoking);
        e.insert_float("hypertension", 0.0);
        e.insert_float("heart_disease", 0.0);
        if let Some(label) = label {
            e.insert_float(LABEL_KEY, label);
        }
        e
    }

    fn corpus() -> Vec<RawExample> {
        vec![
            example(25.0, "Female", "never", Some(0.0)),
            example(45.0, "Male", "former", Some(0.0)),
            example(65.0, "Female", "current", Some(1.0)),
            example(70.0, "Male", "never", Some(1.0)),
        ]
    }

    #[test]
    fn it_round_trips_a_servable_through_the_export_directory() {
        let device = NdArrayDevice::default();
        let corpus = corpus();
        let artifact = TransformArtifact::fit(&corpus).unwrap();

        let model_config = RiskModelConfig::new(artifact.vocab_sizes().unwrap());
        let model = model_config.init::<NdArray>(&device);
        let train_config = TrainConfig::default();

        let dir = create_temp_dir();
        let probe = example(50.0, "Female", "never", None);

        // Prediction before export must survive the round trip
        let before = {
            let servable = Servable::<NdArray> {
                model: model.clone(),
                model_config: model_config.clone(),
                train_config: train_config.clone(),
                artifact: artifact.clone(),
                device: device.clone(),
            };
            servable.predict(&probe).unwrap()
        };

        export(model, &model_config, &train_config, &artifact, &dir).unwrap();
        let servable = Servable::<NdArray>::load(&dir, &device).unwrap();

        let after = servable.predict(&probe).unwrap();
        assert!((before - after).abs() < 1e-6);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn it_serves_one_probability_for_one_serialized_example() {
        let device = NdArrayDevice::default();
        let corpus = corpus();
        let artifact = TransformArtifact::fit(&corpus).unwrap();

        let model_config = RiskModelConfig::new(artifact.vocab_sizes().unwrap());
        let model = model_config.init::<NdArray>(&device);

        let dir = create_temp_dir();
        export(model, &model_config, &TrainConfig::default(), &artifact, &dir).unwrap();
        let servable = Servable::<NdArray>::load(&dir, &device).unwrap();

        let serialized = serde_json::to_string(&example(33.0, "Male", "never", None)).unwrap();
        let probability = servable.predict_serialized(&serialized).unwrap();

        assert!(probability > 0.0 && probability < 1.0);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn it_rejects_malformed_serialized_examples() {
        let device = NdArrayDevice::default();
        let corpus = corpus();
        let artifact = TransformArtifact::fit(&corpus).unwrap();

        let model_config = RiskModelConfig::new(artifact.vocab_sizes().unwrap());
        let model = model_config.init::<NdArray>(&device);

        let dir = create_temp_dir();
        export(model, &model_config, &TrainConfig::default(), &artifact, &dir).unwrap();
        let servable = Servable::<NdArray>::load(&dir, &device).unwrap();

        assert!(servable.predict_serialized("not json").is_err());
        // An example missing required features fails through the schema path
        assert!(servable.predict_serialized("{\"age\": 50.0}").is_err());

        std::fs::remove_dir_all(&dir).ok();
    }
}
