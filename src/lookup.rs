use crate::error::{Result, StackError};
use log::{debug, info};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct LookupRow {
    #[serde(rename = "Category")]
    category: String,
    class_id: u32,
    #[serde(rename = "Producer", default)]
    producer: Option<f64>,
    #[serde(rename = "User", default)]
    user: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassRecord {
    pub code: u32,
    pub producer_accuracy: Option<f64>,
    pub user_accuracy: Option<f64>,
}

/// Minimum producer and user accuracy a class needs to be mosaicked
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccuracyThreshold {
    pub producer: f64,
    pub user: f64,
}

impl Default for AccuracyThreshold {
    fn default() -> Self {
        Self {
            producer: 0.5,
            user: 0.5,
        }
    }
}

impl AccuracyThreshold {
    pub fn new(producer: f64, user: f64) -> Result<Self> {
        for value in [producer, user] {
            if !(0.0..=1.0).contains(&value) {
                return Err(StackError::InvalidThreshold(value));
            }
        }
        Ok(Self { producer, user })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdOutcome {
    Met,
    NotMet {
        producer: Option<f64>,
        user: Option<f64>,
    },
}

/// Class name → code and accuracy, validated at load time
#[derive(Debug, Clone, Default)]
pub struct ClassLookup {
    classes: HashMap<String, ClassRecord>,
}

impl ClassLookup {
    pub fn from_path(path: &Path) -> Result<Self> {
        info!("Loading class lookup table: {}", path.display());
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut classes = HashMap::new();

        for row in csv_reader.deserialize() {
            let row: LookupRow = row?;
            let record = ClassRecord {
                code: row.class_id,
                producer_accuracy: row.producer,
                user_accuracy: row.user,
            };
            if classes.insert(row.category.clone(), record).is_some() {
                return Err(StackError::DuplicateClass(row.category));
            }
        }

        debug!("Lookup table holds {} classes", classes.len());
        Ok(Self { classes })
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn record(&self, class_name: &str) -> Result<&ClassRecord> {
        self.classes
            .get(class_name)
            .ok_or_else(|| StackError::UnknownClass(class_name.to_string()))
    }

    pub fn code(&self, class_name: &str) -> Result<u32> {
        Ok(self.record(class_name)?.code)
    }

    /// Both accuracies must be known and at least the threshold
    pub fn check_accuracy(
        &self,
        class_name: &str,
        threshold: &AccuracyThreshold,
    ) -> Result<ThresholdOutcome> {
        let record = self.record(class_name)?;
        let producer_ok = record.producer_accuracy.is_some_and(|p| p >= threshold.producer);
        let user_ok = record.user_accuracy.is_some_and(|u| u >= threshold.user);

        Ok(if producer_ok && user_ok {
            ThresholdOutcome::Met
        } else {
            ThresholdOutcome::NotMet {
                producer: record.producer_accuracy,
                user: record.user_accuracy,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
Category,class_id,Producer,User,Type
Corn,1,0.93,0.91,crop
Cotton,2,0.42,0.88,crop
Dbl Crop WinWht/Soybeans,26,0.61,,crop
";

    #[test]
    fn test_codes_by_name() {
        let lookup = ClassLookup::from_reader(TABLE.as_bytes()).unwrap();
        assert_eq!(lookup.len(), 3);
        assert_eq!(lookup.code("Corn").unwrap(), 1);
        assert_eq!(lookup.code("Dbl Crop WinWht/Soybeans").unwrap(), 26);
    }

    #[test]
    fn test_unknown_class() {
        let lookup = ClassLookup::from_reader(TABLE.as_bytes()).unwrap();
        assert!(matches!(
            lookup.code("Sorghum"),
            Err(StackError::UnknownClass(ref name)) if name == "Sorghum"
        ));
    }

    #[test]
    fn test_duplicate_class_rejected() {
        let table = "Category,class_id,Producer,User\nCorn,1,0.9,0.9\nCorn,5,0.9,0.9\n";
        assert!(matches!(
            ClassLookup::from_reader(table.as_bytes()),
            Err(StackError::DuplicateClass(_))
        ));
    }

    #[test]
    fn test_malformed_code_rejected() {
        let table = "Category,class_id,Producer,User\nCorn,one,0.9,0.9\n";
        assert!(matches!(
            ClassLookup::from_reader(table.as_bytes()),
            Err(StackError::LookupTable(_))
        ));
    }

    #[test]
    fn test_threshold_outcomes() {
        let lookup = ClassLookup::from_reader(TABLE.as_bytes()).unwrap();
        let threshold = AccuracyThreshold::default();

        assert_eq!(lookup.check_accuracy("Corn", &threshold).unwrap(), ThresholdOutcome::Met);
        assert_eq!(
            lookup.check_accuracy("Cotton", &threshold).unwrap(),
            ThresholdOutcome::NotMet {
                producer: Some(0.42),
                user: Some(0.88)
            }
        );
        // Missing user accuracy never passes
        assert!(matches!(
            lookup.check_accuracy("Dbl Crop WinWht/Soybeans", &threshold).unwrap(),
            ThresholdOutcome::NotMet { user: None, .. }
        ));
    }

    #[test]
    fn test_threshold_bounds() {
        assert!(AccuracyThreshold::new(0.0, 1.0).is_ok());
        assert!(matches!(
            AccuracyThreshold::new(1.5, 0.5),
            Err(StackError::InvalidThreshold(_))
        ));
    }
}
