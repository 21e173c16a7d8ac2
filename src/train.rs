use crate::batcher::{ExampleBatch, ExampleBatcher};
use crate::dataset::ExampleItem;
use crate::metrics::EpochMetrics;
use crate::model::RiskModel;
use crate::train_config::TrainConfig;
use burn::data::dataloader::Dataset;
use burn::data::dataloader::batcher::Batcher;
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

/// Clamp bound keeping log() finite at the sigmoid saturation points.
const PROBABILITY_EPSILON: f32 = 1e-7;

/// Binary cross-entropy over predicted probabilities.
fn binary_cross_entropy<B: Backend>(
    probabilities: Tensor<B, 2>,
    targets: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let p = probabilities.clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON);

    let loss = targets.clone() * p.clone().log()
        + (targets.ones_like() - targets) * (p.ones_like() - p).log();

    loss.mean().neg()
}

/// Compute average loss by dividing total accumulated loss by number of batches.
/// If no batches were processed, returns 0.0 to avoid division by zero.
fn compute_average_loss(total_loss: f32, num_batches: usize) -> f32 {
    if num_batches > 0 {
        total_loss / num_batches as f32
    } else {
        0.0
    }
}

/// Early stopping state update for a maximized validation metric. Given the
/// best and current validation AUC, returns
/// (should_stop, new_epochs_without_improvement, new_best_auc).
/// - If current > best: improvement detected; reset counter, update best
/// - Otherwise: no improvement; increment counter
/// - Triggers stop only if patience is Some and counter reaches it
fn update_early_stopping_state(
    best_valid_auc: f32,
    current_valid_auc: f32,
    epochs_without_improvement: usize,
    patience: Option<usize>,
) -> (bool, usize, f32) {
    if current_valid_auc > best_valid_auc {
        (false, 0, current_valid_auc)
    } else {
        let new_count = epochs_without_improvement + 1;
        let should_stop = patience.map_or(false, |p| new_count >= p);
        (should_stop, new_count, best_valid_auc)
    }
}

/// Run a single training batch through forward, backward, and optimizer step.
/// Returns the loss value for this batch and updated model.
fn process_training_batch<B, O>(
    model: RiskModel<B>,
    optimizer: &mut O,
    batch: ExampleBatch<B>,
    learning_rate: f64,
) -> (RiskModel<B>, f32)
where
    B: AutodiffBackend,
    O: Optimizer<RiskModel<B>, B>,
{
    let targets = batch.labels.clone();
    let probabilities = model.forward_batch(batch);
    let loss = binary_cross_entropy(probabilities, targets);

    // Extract scalar BEFORE backward to avoid keeping the loss tensor
    let loss_value = loss.clone().into_scalar().elem::<f32>();

    let grads = loss.backward();
    let grads_params = GradientsParams::from_grads(grads, &model);
    let updated_model = optimizer.step(learning_rate, model, grads_params);

    (updated_model, loss_value)
}

/// Run the complete training epoch over the dataset.
/// Returns (updated_model, average_training_loss).
fn run_training_epoch<B, O>(
    dataset: &impl Dataset<ExampleItem>,
    batcher: &ExampleBatcher<B>,
    device: &B::Device,
    model: RiskModel<B>,
    optimizer: &mut O,
    batch_size: usize,
    learning_rate: f64,
) -> (RiskModel<B>, f32)
where
    B: AutodiffBackend,
    O: Optimizer<RiskModel<B>, B>,
{
    let mut current_model = model;
    let mut total_loss = 0.0;
    let mut num_batches = 0;
    let dataset_len = dataset.len();

    // step_by(batch_size) partitions the dataset into non-overlapping groups
    // of items; each group becomes one forward/backward pass
    for start_idx in (0..dataset_len).step_by(batch_size) {
        let end_idx = (start_idx + batch_size).min(dataset_len);

        let items: Vec<_> = (start_idx..end_idx)
            .filter_map(|i| dataset.get(i))
            .collect();

        if items.is_empty() {
            continue;
        }

        let batch = batcher.batch(items, device);

        let (updated_model, loss_value) =
            process_training_batch(current_model, optimizer, batch, learning_rate);
        current_model = updated_model;

        total_loss += loss_value;
        num_batches += 1;
    }

    let avg_loss = compute_average_loss(total_loss, num_batches);
    (current_model, avg_loss)
}

/// Run the complete validation epoch, collecting probabilities and labels
/// for the fixed metric set.
fn run_validation_epoch<B: Backend>(
    dataset: &impl Dataset<ExampleItem>,
    batcher: &ExampleBatcher<B>,
    device: &B::Device,
    model: &RiskModel<B>,
    batch_size: usize,
) -> EpochMetrics {
    let mut total_loss = 0.0;
    let mut num_batches = 0;
    let mut probabilities = Vec::with_capacity(dataset.len());
    let mut labels = Vec::with_capacity(dataset.len());
    let dataset_len = dataset.len();

    for start_idx in (0..dataset_len).step_by(batch_size) {
        let end_idx = (start_idx + batch_size).min(dataset_len);

        let items: Vec<_> = (start_idx..end_idx)
            .filter_map(|i| dataset.get(i))
            .collect();

        if items.is_empty() {
            continue;
        }

        for item in items.iter() {
            labels.push(item.label);
        }

        let batch = batcher.batch(items, device);
        let targets = batch.labels.clone();

        // Validation forward pass (no gradients needed)
        let outputs = model.forward_batch(batch);
        let loss_value = binary_cross_entropy(outputs.clone(), targets)
            .into_scalar()
            .elem::<f32>();

        probabilities.extend(
            outputs
                .into_data()
                .to_vec::<f32>()
                .expect("Validation outputs convert to f32"),
        );

        total_loss += loss_value;
        num_batches += 1;
    }

    let avg_loss = compute_average_loss(total_loss, num_batches);
    EpochMetrics::compute(&probabilities, &labels, avg_loss)
}

/// Fit the model for up to `epochs` epochs, stopping early when validation
/// AUC has not improved for `patience` epochs. The snapshot taken at the
/// best validation AUC is the model returned, together with that AUC.
pub fn train<B: AutodiffBackend>(
    device: &B::Device,
    dataset_training: &impl Dataset<ExampleItem>,
    dataset_validation: &impl Dataset<ExampleItem>,
    mut model: RiskModel<B>,
    train_config: &TrainConfig,
) -> (RiskModel<B>, f32) {
    // Adam with the fixed learning rate from the config
    let mut optimizer = AdamConfig::new().init();

    let batcher_train = ExampleBatcher::<B>::new();
    let batcher_valid = ExampleBatcher::<B::InnerBackend>::new();

    let mut best_valid_auc = f32::NEG_INFINITY;
    let mut best_model = model.clone();
    let mut epochs_without_improvement = 0;

    for epoch in 0..train_config.epochs {
        // ============ Training Epoch ============
        let (updated_model, avg_train_loss) = run_training_epoch(
            dataset_training,
            &batcher_train,
            device,
            model,
            &mut optimizer,
            train_config.batch_size,
            train_config.learning_rate,
        );
        model = updated_model;

        // ============ Validation Epoch ============
        let valid_model = model.valid();
        let metrics = run_validation_epoch::<B::InnerBackend>(
            dataset_validation,
            &batcher_valid,
            device,
            &valid_model,
            train_config.batch_size,
        );

        // ============ Early Stopping Check ============
        let improved = metrics.auc > best_valid_auc;
        if improved {
            // Snapshot so the best weights can be restored after the loop
            best_model = model.clone();
        }

        let (should_stop, new_epochs_count, new_best_auc) = update_early_stopping_state(
            best_valid_auc,
            metrics.auc,
            epochs_without_improvement,
            train_config.patience,
        );
        best_valid_auc = new_best_auc;
        epochs_without_improvement = new_epochs_count;

        tracing::info!(
            epoch = epoch + 1,
            total_epochs = train_config.epochs,
            train_loss = avg_train_loss,
            valid_loss = metrics.loss,
            valid_accuracy = metrics.accuracy,
            valid_auc = metrics.auc,
            valid_precision = metrics.precision,
            valid_recall = metrics.recall,
            best_valid_auc = best_valid_auc,
            "Epoch completed",
        );

        if should_stop {
            tracing::info!(
                epoch = epoch + 1,
                best_valid_auc = best_valid_auc,
                "Early stopping triggered",
            );
            break;
        }
    }

    (best_model, best_valid_auc)
}
