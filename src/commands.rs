use crate::backend::{Backend, InferenceBackend, default_device};
use crate::dataset::ExampleDataset;
use crate::model::RiskModelConfig;
use crate::serving::{Servable, export};
use crate::train::train;
use crate::train_config::TrainConfig;
use crate::transform::TransformArtifact;
use crate::{ingestion, records};
use clap::Subcommand;
use std::path::{Path, PathBuf};

fn parse_fraction(s: &str) -> Result<f32, String> {
    let value = s
        .parse::<f32>()
        .map_err(|_| format!("Could not parse fraction as f32: {}", s))?;

    if !(0.0..=1.0).contains(&value) {
        return Err(format!(
            "Fraction must be a number between 0.0 and 1.0. Received {}",
            value
        ));
    }

    Ok(value)
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Convert the raw screening CSV into example record files
    Import {
        /// Path to the raw CSV
        #[arg(long, required = true)]
        csv: String,

        /// Where to write the training example file
        #[arg(long, required = true)]
        output: String,

        /// Where to write the held-out eval example file
        #[arg(long)]
        eval_output: Option<String>,

        /// Fraction of the corpus held out for eval
        #[arg(long, default_value = "0.2", value_parser = parse_fraction)]
        eval_fraction: f32,
    },

    /// Fit the transform on raw training examples and write transformed files
    FitTransform {
        /// Raw training example files or directories
        #[arg(long, required = true, num_args = 1..)]
        train_files: Vec<String>,

        /// Raw eval example files or directories
        #[arg(long, num_args = 1..)]
        eval_files: Vec<String>,

        /// Where to write the fitted transform artifact
        #[arg(long, required = true)]
        transform_dir: String,

        /// Where to write the transformed example files
        #[arg(long, required = true)]
        output_dir: String,
    },

    /// Train on transformed examples and export the servable model
    Train {
        /// Transformed training example files or directories
        #[arg(long, required = true, num_args = 1..)]
        train_files: Vec<String>,

        /// Transformed eval example files or directories
        #[arg(long, required = true, num_args = 1..)]
        eval_files: Vec<String>,

        /// The fitted transform artifact directory
        #[arg(long, required = true)]
        transform_dir: String,

        /// Where to write the servable export
        #[arg(long, required = true)]
        export_dir: String,

        /// Upper bound on training epochs
        #[arg(long, default_value = "20")]
        epochs: usize,

        /// Batch size for training and validation
        #[arg(long, default_value = "32")]
        batch_size: usize,

        /// Adam learning rate
        #[arg(long, default_value = "0.001")]
        learning_rate: f64,

        /// Early stopping patience on validation AUC
        #[arg(long, default_value = "5")]
        patience: usize,
    },

    /// Score one serialized example with an exported model
    Predict {
        /// The servable export directory
        #[arg(long, required = true)]
        export_dir: String,

        /// The serialized example (a JSON object of raw features)
        #[arg(long)]
        example: Option<String>,

        /// Read the serialized example from a file instead
        #[arg(long)]
        example_file: Option<String>,
    },
}

impl Command {
    pub fn execute(self) -> anyhow::Result<()> {
        match self {
            Self::Import {
                csv,
                output,
                eval_output,
                eval_fraction,
            } => import(&csv, &output, eval_output.as_deref(), eval_fraction),
            Self::FitTransform {
                train_files,
                eval_files,
                transform_dir,
                output_dir,
            } => fit_transform(&train_files, &eval_files, &transform_dir, &output_dir),
            Self::Train {
                train_files,
                eval_files,
                transform_dir,
                export_dir,
                epochs,
                batch_size,
                learning_rate,
                patience,
            } => {
                let train_config = TrainConfig::new(epochs, batch_size, learning_rate)?
                    .with_patience(patience)?;
                run_training(
                    &train_files,
                    &eval_files,
                    &transform_dir,
                    &export_dir,
                    train_config,
                )
            }
            Self::Predict {
                export_dir,
                example,
                example_file,
            } => predict(&export_dir, example, example_file),
        }
    }
}

fn import(
    csv: &str,
    output: &str,
    eval_output: Option<&str>,
    eval_fraction: f32,
) -> anyhow::Result<()> {
    let examples = ingestion::read_csv(csv)?;
    tracing::info!(count = examples.len(), csv = csv, "Ingested raw examples");

    match eval_output {
        Some(eval_output) => {
            let (train, eval) = ingestion::split(examples, eval_fraction)?;
            records::write_raw(Path::new(output), &train)?;
            records::write_raw(Path::new(eval_output), &eval)?;
            tracing::info!(
                train = train.len(),
                eval = eval.len(),
                "Wrote example record files"
            );
        }
        None => {
            records::write_raw(Path::new(output), &examples)?;
            tracing::info!(count = examples.len(), "Wrote example record file");
        }
    }

    Ok(())
}

fn fit_transform(
    train_files: &[String],
    eval_files: &[String],
    transform_dir: &str,
    output_dir: &str,
) -> anyhow::Result<()> {
    let train_examples = records::read_raw_many(train_files)?;

    let artifact = TransformArtifact::fit(&train_examples)?;
    artifact.save(Path::new(transform_dir))?;
    tracing::info!(
        corpus = train_examples.len(),
        transform_dir = transform_dir,
        "Fitted transform artifact"
    );

    let output_dir = PathBuf::from(output_dir);
    std::fs::create_dir_all(&output_dir)?;

    let transformed = artifact.apply_all(&train_examples)?;
    records::write_transformed(&output_dir.join("train.jsonl"), &transformed)?;

    if !eval_files.is_empty() {
        let eval_examples = records::read_raw_many(eval_files)?;
        let transformed = artifact.apply_all(&eval_examples)?;
        records::write_transformed(&output_dir.join("eval.jsonl"), &transformed)?;
        tracing::info!(eval = eval_examples.len(), "Transformed eval examples");
    }

    Ok(())
}

fn run_training(
    train_files: &[String],
    eval_files: &[String],
    transform_dir: &str,
    export_dir: &str,
    train_config: TrainConfig,
) -> anyhow::Result<()> {
    let device = default_device();

    let artifact = TransformArtifact::load(Path::new(transform_dir))?;
    let dataset_training = ExampleDataset::from_files(train_files)?;
    let dataset_validation = ExampleDataset::from_files(eval_files)?;

    let model_config = RiskModelConfig::new(artifact.vocab_sizes()?);
    let model = model_config.init::<Backend>(&device);

    let (model, best_valid_auc) = train(
        &device,
        &dataset_training,
        &dataset_validation,
        model,
        &train_config,
    );

    export(
        model,
        &model_config,
        &train_config,
        &artifact,
        Path::new(export_dir),
    )?;

    tracing::info!(
        best_valid_auc = best_valid_auc,
        export_dir = export_dir,
        "Training complete, servable exported"
    );

    Ok(())
}

fn predict(
    export_dir: &str,
    example: Option<String>,
    example_file: Option<String>,
) -> anyhow::Result<()> {
    let serialized = match (example, example_file) {
        (Some(example), None) => example,
        (None, Some(path)) => std::fs::read_to_string(path)?,
        _ => anyhow::bail!("Provide exactly one of --example and --example-file"),
    };

    let device = default_device();
    let servable = Servable::<InferenceBackend>::load(Path::new(export_dir), &device)?;
    let probability = servable.predict_serialized(serialized.trim())?;

    println!("{}", probability);
    Ok(())
}
