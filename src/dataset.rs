use crate::records;
use crate::schema::{
    self, BINARY_FEATURES, CATEGORICAL_FEATURES, LABEL_KEY, NUMERIC_FEATURES, TransformedExample,
};
use burn::data::dataset::Dataset;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Schema error: {0}")]
    Schema(#[from] schema::Error),
    #[error("Record error: {0}")]
    Records(#[from] records::Error),
}

/// One transformed example as dense arrays, columns in canonical order.
/// The label is extracted by key so the feature tensors never contain it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExampleItem {
    pub numeric: Vec<f32>,
    pub categorical: Vec<i64>,
    pub binary: Vec<f32>,
    pub label: f32,
}

impl TryFrom<&TransformedExample> for ExampleItem {
    type Error = Error;

    fn try_from(example: &TransformedExample) -> Result<Self, Self::Error> {
        let numeric = NUMERIC_FEATURES
            .iter()
            .map(|feature| example.float(feature))
            .collect::<Result<Vec<f32>, _>>()?;

        let categorical = CATEGORICAL_FEATURES
            .iter()
            .map(|feature| example.index(feature))
            .collect::<Result<Vec<i64>, _>>()?;

        let binary = BINARY_FEATURES
            .iter()
            .map(|feature| example.float(feature))
            .collect::<Result<Vec<f32>, _>>()?;

        Ok(Self {
            numeric,
            categorical,
            binary,
            label: example.float(LABEL_KEY)?,
        })
    }
}

/// In-memory dataset over transformed examples.
pub struct ExampleDataset {
    items: Vec<ExampleItem>,
}

impl ExampleDataset {
    pub fn new(examples: &[TransformedExample]) -> Result<Self, Error> {
        let items = examples
            .iter()
            .map(ExampleItem::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { items })
    }

    /// Load from transformed record files (each path a file or directory).
    pub fn from_files(patterns: &[String]) -> Result<Self, Error> {
        let examples = records::read_transformed_many(patterns)?;
        Self::new(&examples)
    }
}

impl Dataset<ExampleItem> for ExampleDataset {
    fn get(&self, index: usize) -> Option<ExampleItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transformed(age: f32, gender: i64, label: f32) -> TransformedExample {
        let mut e = TransformedExample::new();
        e.insert_float("age", age);
        e.insert_float("bmi", 0.1);
        e.insert_float("HbA1c_level", -0.5);
        e.insert_float("blood_glucose_level", 1.2);
        e.insert_index("gender", gender);
        e.insert_index("smoking_history", 0);
        e.insert_float("hypertension", 0.0);
        e.insert_float("heart_disease", 1.0);
        e.insert_float(LABEL_KEY, label);
        e
    }

    #[test]
    fn it_builds_items_in_canonical_column_order() {
        let dataset = ExampleDataset::new(&[transformed(-1.0, 1, 1.0)]).unwrap();

        let item = dataset.get(0).unwrap();
        assert_eq!(item.numeric, vec![-1.0, 0.1, -0.5, 1.2]);
        assert_eq!(item.categorical, vec![1, 0]);
        assert_eq!(item.binary, vec![0.0, 1.0]);
        assert_eq!(item.label, 1.0);
    }

    #[test]
    fn it_reports_length_and_bounds() {
        let dataset =
            ExampleDataset::new(&[transformed(0.0, 0, 0.0), transformed(1.0, 1, 1.0)]).unwrap();

        assert_eq!(dataset.len(), 2);
        assert!(dataset.get(2).is_none());
    }

    #[test]
    fn it_fails_on_an_incomplete_example() {
        let mut incomplete = TransformedExample::new();
        incomplete.insert_float("age", 0.0);

        let result = ExampleDataset::new(&[incomplete]);
        assert!(matches!(
            result,
            Err(Error::Schema(schema::Error::MissingFeature(_)))
        ));
    }
}
