use serde::{Deserialize, Serialize};
use std::{fs, io};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrainConfig {
    /// Upper bound on training epochs
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Early stopping patience: number of epochs without validation AUC
    /// improvement before stopping. None = disabled
    pub patience: Option<usize>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 20,
            batch_size: 32,
            learning_rate: 1e-3,
            patience: Some(5),
        }
    }
}

impl TrainConfig {
    pub fn new(epochs: usize, batch_size: usize, learning_rate: f64) -> Result<Self, Error> {
        Self::validate_epochs(&epochs)?;
        Self::validate_batch_size(&batch_size)?;
        Self::validate_learning_rate(&learning_rate)?;

        Ok(Self {
            epochs,
            batch_size,
            learning_rate,
            patience: None,
        })
    }

    /// Builder method to set early stopping patience
    pub fn with_patience(mut self, patience: usize) -> Result<Self, Error> {
        Self::validate_patience(&patience)?;
        self.patience = Some(patience);
        Ok(self)
    }

    pub fn save(&self, path: &str) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &str) -> Result<Self, Error> {
        let json = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;

        Self::validate_epochs(&config.epochs)?;
        Self::validate_batch_size(&config.batch_size)?;
        Self::validate_learning_rate(&config.learning_rate)?;
        config
            .patience
            .as_ref()
            .map(|p| Self::validate_patience(p))
            .transpose()?;

        Ok(config)
    }

    fn validate_epochs(epochs: &usize) -> Result<(), Error> {
        if *epochs < 1 {
            return Err(Error::Validation("epochs must be greater than 0".to_string()));
        }
        Ok(())
    }

    fn validate_batch_size(batch_size: &usize) -> Result<(), Error> {
        if *batch_size < 1 {
            return Err(Error::Validation(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_learning_rate(learning_rate: &f64) -> Result<(), Error> {
        if *learning_rate <= 0.0 {
            return Err(Error::Validation(
                "learning_rate must be greater than 0.0".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_patience(patience: &usize) -> Result<(), Error> {
        if *patience < 1 {
            return Err(Error::Validation(
                "patience must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
