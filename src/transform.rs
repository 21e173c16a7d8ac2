//! The fitted transform: scaling statistics and categorical vocabularies.
//!
//! Fitting runs once over the training corpus. The resulting artifact is
//! consumed read-only by the training stage (for input shapes and vocabulary
//! sizes) and again at serving time to transform raw examples before
//! inference.

use crate::schema::{
    self, BINARY_FEATURES, CATEGORICAL_FEATURES, LABEL_KEY, NUMERIC_FEATURES, RawExample,
    TransformedExample,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Schema error: {0}")]
    Schema(#[from] schema::Error),
    #[error("Cannot fit a transform on an empty corpus")]
    EmptyCorpus,
    #[error("No vocabulary for feature '{0}'")]
    MissingVocabulary(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Mean and standard deviation of one numeric feature over the fitted corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Moments {
    pub mean: f32,
    pub std: f32,
}

#[derive(Debug, Clone)]
pub struct TransformArtifact {
    moments: BTreeMap<String, Moments>,
    vocabularies: BTreeMap<String, Vec<String>>,
}

const STATISTICS_FILE: &str = "statistics.json";

impl TransformArtifact {
    /// Fit statistics and vocabularies in a single pass over the corpus.
    ///
    /// Vocabularies are ordered by descending frequency, ties broken
    /// lexicographically, so indices are stable across refits on the same
    /// data.
    pub fn fit(examples: &[RawExample]) -> Result<Self, Error> {
        if examples.is_empty() {
            return Err(Error::EmptyCorpus);
        }

        let n = examples.len() as f64;
        let mut sums: HashMap<&str, (f64, f64)> = HashMap::new();
        let mut counts: HashMap<&str, HashMap<String, usize>> = HashMap::new();

        for example in examples {
            for feature in NUMERIC_FEATURES {
                let value = example.float(feature)? as f64;
                let entry = sums.entry(feature).or_insert((0.0, 0.0));
                entry.0 += value;
                entry.1 += value * value;
            }

            for feature in CATEGORICAL_FEATURES {
                let token = example.text(feature)?;
                *counts
                    .entry(feature)
                    .or_default()
                    .entry(token.to_string())
                    .or_insert(0) += 1;
            }
        }

        let mut moments = BTreeMap::new();
        for feature in NUMERIC_FEATURES {
            let (sum, sum_sq) = sums[feature];
            let mean = sum / n;
            let variance = (sum_sq / n - mean * mean).max(0.0);
            moments.insert(
                feature.to_string(),
                Moments {
                    mean: mean as f32,
                    std: variance.sqrt() as f32,
                },
            );
        }

        let mut vocabularies = BTreeMap::new();
        for feature in CATEGORICAL_FEATURES {
            let mut tokens: Vec<(String, usize)> =
                counts.remove(feature).unwrap_or_default().into_iter().collect();
            tokens.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            vocabularies.insert(
                feature.to_string(),
                tokens.into_iter().map(|(token, _)| token).collect(),
            );
        }

        Ok(Self {
            moments,
            vocabularies,
        })
    }

    /// Transform one raw example.
    ///
    /// Numeric features are z-scored with the fitted moments, categorical
    /// features become vocabulary indices, binary features and the label are
    /// cast through unchanged. Unseen categorical tokens map to the
    /// out-of-vocabulary index `vocab_size`.
    pub fn apply(&self, example: &RawExample) -> Result<TransformedExample, Error> {
        let mut out = self.apply_features(example)?;
        out.insert_float(LABEL_KEY, example.float(LABEL_KEY)?);
        Ok(out)
    }

    /// Transform the features of one raw example, ignoring the label.
    /// This is the serving-time path, where examples carry no label.
    pub fn apply_features(&self, example: &RawExample) -> Result<TransformedExample, Error> {
        let mut out = TransformedExample::new();

        for feature in NUMERIC_FEATURES {
            let value = example.float(feature)?;
            let m = &self.moments[feature];
            // All-identical corpus means std=0; the scaled value is then 0
            let scaled = if m.std == 0.0 {
                0.0
            } else {
                (value - m.mean) / m.std
            };
            out.insert_float(feature, scaled);
        }

        for feature in CATEGORICAL_FEATURES {
            let token = example.text(feature)?;
            let vocab = &self.vocabularies[feature];
            let index = vocab
                .iter()
                .position(|t| t == token)
                .unwrap_or(vocab.len());
            out.insert_index(feature, index as i64);
        }

        for feature in BINARY_FEATURES {
            out.insert_float(feature, example.float(feature)?);
        }

        Ok(out)
    }

    /// Transform a whole corpus, preserving order.
    pub fn apply_all(&self, examples: &[RawExample]) -> Result<Vec<TransformedExample>, Error> {
        examples.iter().map(|e| self.apply(e)).collect()
    }

    pub fn moments(&self, feature: &str) -> Option<&Moments> {
        self.moments.get(feature)
    }

    /// Number of distinct tokens seen while fitting. The out-of-vocabulary
    /// index is `vocab_size`, so embeddings need `vocab_size + 1` slots.
    pub fn vocab_size(&self, feature: &str) -> Result<usize, Error> {
        self.vocabularies
            .get(feature)
            .map(Vec::len)
            .ok_or_else(|| Error::MissingVocabulary(feature.to_string()))
    }

    /// Vocabulary sizes in canonical categorical feature order.
    pub fn vocab_sizes(&self) -> Result<Vec<usize>, Error> {
        CATEGORICAL_FEATURES
            .iter()
            .map(|feature| self.vocab_size(feature))
            .collect()
    }

    /// Persist as a directory: `statistics.json` plus one `<feature>.txt`
    /// vocabulary file per categorical feature, one token per line.
    pub fn save(&self, dir: &Path) -> Result<(), Error> {
        fs::create_dir_all(dir)?;

        let json = serde_json::to_string_pretty(&self.moments)?;
        fs::write(dir.join(STATISTICS_FILE), json)?;

        for (feature, vocab) in &self.vocabularies {
            let mut contents = vocab.join("\n");
            if !contents.is_empty() {
                contents.push('\n');
            }
            fs::write(dir.join(format!("{}.txt", feature)), contents)?;
        }

        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self, Error> {
        let json = fs::read_to_string(dir.join(STATISTICS_FILE))?;
        let moments: BTreeMap<String, Moments> = serde_json::from_str(&json)?;

        let mut vocabularies = BTreeMap::new();
        for feature in CATEGORICAL_FEATURES {
            let path = dir.join(format!("{}.txt", feature));
            let contents = fs::read_to_string(&path)
                .map_err(|_| Error::MissingVocabulary(feature.to_string()))?;
            let vocab: Vec<String> = contents.lines().map(str::to_string).collect();
            vocabularies.insert(feature.to_string(), vocab);
        }

        Ok(Self {
            moments,
            vocabularies,
        })
    }
}
