//! CSV ingestion for the raw diabetes screening data.
//!
//! Converts survey rows into raw examples for the record files. Column
//! vocabulary follows the source dataset; anything outside it is an error.

use crate::schema::{LABEL_KEY, RawExample};
use csv::{Reader, StringRecord};
use std::fs::File;
use std::io;
use std::num::ParseFloatError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gender {
    Female,
    Male,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Female => "Female",
            Gender::Male => "Male",
            Gender::Other => "Other",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown gender: {0}")]
pub struct UnknownGender(String);

impl TryFrom<&str> for Gender {
    type Error = UnknownGender;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "Female" => Ok(Gender::Female),
            "Male" => Ok(Gender::Male),
            "Other" => Ok(Gender::Other),
            other => Err(UnknownGender(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmokingHistory {
    Never,
    NoInfo,
    Current,
    Former,
    Ever,
    NotCurrent,
}

impl SmokingHistory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SmokingHistory::Never => "never",
            SmokingHistory::NoInfo => "No Info",
            SmokingHistory::Current => "current",
            SmokingHistory::Former => "former",
            SmokingHistory::Ever => "ever",
            SmokingHistory::NotCurrent => "not current",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown smoking history: {0}")]
pub struct UnknownSmokingHistory(String);

impl TryFrom<&str> for SmokingHistory {
    type Error = UnknownSmokingHistory;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "never" => Ok(SmokingHistory::Never),
            "No Info" => Ok(SmokingHistory::NoInfo),
            "current" => Ok(SmokingHistory::Current),
            "former" => Ok(SmokingHistory::Former),
            "ever" => Ok(SmokingHistory::Ever),
            "not current" => Ok(SmokingHistory::NotCurrent),
            other => Err(UnknownSmokingHistory(other.to_string())),
        }
    }
}

#[derive(Debug)]
pub struct Row {
    pub gender: Gender,
    pub age: f32,
    pub hypertension: f32,
    pub heart_disease: f32,
    pub smoking_history: SmokingHistory,
    pub bmi: f32,
    pub hba1c_level: f32,
    pub blood_glucose_level: f32,
    pub diabetes: f32,
}

impl From<&Row> for RawExample {
    fn from(row: &Row) -> Self {
        let mut example = RawExample::new();
        example.insert_text("gender", row.gender.as_str());
        example.insert_float("age", row.age);
        example.insert_float("hypertension", row.hypertension);
        example.insert_float("heart_disease", row.heart_disease);
        example.insert_text("smoking_history", row.smoking_history.as_str());
        example.insert_float("bmi", row.bmi);
        example.insert_float("HbA1c_level", row.hba1c_level);
        example.insert_float("blood_glucose_level", row.blood_glucose_level);
        example.insert_float(LABEL_KEY, row.diabetes);
        example
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO Error")]
    IOError(#[from] io::Error),
    #[error("Parsing error")]
    ParseError(Box<dyn std::error::Error + Send + Sync>),
    #[error("Unknown gender: {0}")]
    UnknownGender(#[from] UnknownGender),
    #[error("Unknown smoking history: {0}")]
    UnknownSmokingHistory(#[from] UnknownSmokingHistory),
    #[error("Binary column must be 0 or 1, got: {0}")]
    InvalidBinary(String),
    #[error("Split fraction must be within [0, 1], got: {0}")]
    FractionOutOfBounds(f32),
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::ParseError(Box::new(err))
    }
}

impl From<ParseFloatError> for Error {
    fn from(err: ParseFloatError) -> Self {
        Error::ParseError(Box::new(err))
    }
}

pub struct RowIterator {
    reader: Reader<File>,
}

impl RowIterator {
    pub fn new(path: &str) -> Result<Self, Error> {
        let file = File::open(path)?;

        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(file);

        Ok(RowIterator { reader })
    }
}

impl Iterator for RowIterator {
    type Item = Result<Row, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.reader.records().next()? {
            Ok(r) => r,
            Err(err) => return Some(Err(Error::ParseError(Box::new(err)))),
        };

        Some(parse_row(&record))
    }
}

fn parse_binary(s: &str) -> Result<f32, Error> {
    match s.trim() {
        "0" => Ok(0.0),
        "1" => Ok(1.0),
        other => Err(Error::InvalidBinary(other.to_string())),
    }
}

fn parse_row(record: &StringRecord) -> Result<Row, Error> {
    Ok(Row {
        gender: Gender::try_from(record[0].trim())?,
        age: record[1].trim().parse()?,
        hypertension: parse_binary(&record[2])?,
        heart_disease: parse_binary(&record[3])?,
        smoking_history: SmokingHistory::try_from(record[4].trim())?,
        bmi: record[5].trim().parse()?,
        hba1c_level: record[6].trim().parse()?,
        blood_glucose_level: record[7].trim().parse()?,
        diabetes: parse_binary(&record[8])?,
    })
}

/// Read the whole CSV into raw examples.
pub fn read_csv(path: &str) -> Result<Vec<RawExample>, Error> {
    let mut examples = Vec::new();
    for row in RowIterator::new(path)? {
        examples.push(RawExample::from(&row?));
    }
    Ok(examples)
}

/// Hold out the tail of the corpus as the eval split.
pub fn split(
    examples: Vec<RawExample>,
    eval_fraction: f32,
) -> Result<(Vec<RawExample>, Vec<RawExample>), Error> {
    if !(0.0..=1.0).contains(&eval_fraction) {
        return Err(Error::FractionOutOfBounds(eval_fraction));
    }

    let split_idx = ((examples.len() as f32) * (1.0 - eval_fraction)) as usize;
    let mut train = examples;
    let eval = train.split_off(split_idx);

    Ok((train, eval))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn create_temp_csv(contents: &str) -> String {
        use std::time::{SystemTime, UNIX_EPOCH};
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = format!(
            "/tmp/diapred_ingest_test_{}_{}.csv",
            std::process::id(),
            timestamp
        );
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    const HEADER: &str =
        "gender,age,hypertension,heart_disease,smoking_history,bmi,HbA1c_level,blood_glucose_level,diabetes\n";

    #[test]
    fn it_parses_valid_rows() {
        let path = create_temp_csv(&format!(
            "{}Female,80.0,0,1,never,25.19,6.6,140,0\nMale,28.0,0,0,No Info,27.32,5.7,158,1\n",
            HEADER
        ));

        let examples = read_csv(&path).unwrap();
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].text("gender").unwrap(), "Female");
        assert_eq!(examples[0].float("heart_disease").unwrap(), 1.0);
        assert_eq!(examples[1].text("smoking_history").unwrap(), "No Info");
        assert_eq!(examples[1].float("diabetes").unwrap(), 1.0);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn it_rejects_unknown_vocabulary() {
        let path = create_temp_csv(&format!(
            "{}Female,80.0,0,1,occasionally,25.19,6.6,140,0\n",
            HEADER
        ));

        let result = read_csv(&path);
        assert!(matches!(result, Err(Error::UnknownSmokingHistory(_))));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn it_rejects_non_binary_flags() {
        let path = create_temp_csv(&format!("{}Male,40.0,2,0,never,22.0,5.0,100,0\n", HEADER));

        let result = read_csv(&path);
        assert!(matches!(result, Err(Error::InvalidBinary(_))));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn it_splits_off_the_eval_tail() {
        let examples: Vec<RawExample> = (0..10)
            .map(|i| {
                let mut e = RawExample::new();
                e.insert_float("age", i as f32);
                e
            })
            .collect();

        let (train, eval) = split(examples, 0.2).unwrap();
        assert_eq!(train.len(), 8);
        assert_eq!(eval.len(), 2);
        assert_eq!(eval[0].float("age").unwrap(), 8.0);
    }

    #[test]
    fn it_rejects_out_of_bounds_fractions() {
        let result = split(Vec::new(), 1.5);
        assert!(matches!(result, Err(Error::FractionOutOfBounds(_))));
    }
}
