//! Measurement list: which variables to read at each measurement point.

use crate::error::{AppResult, LabError};
use crate::instrument::Instrument;
use std::fmt;
use std::sync::Arc;

/// One measured column.
#[derive(Clone)]
pub struct Channel {
    /// Column label in the data file
    pub label: String,
    /// Instrument to read
    pub instrument: Arc<dyn Instrument>,
    /// Variable of the instrument
    pub variable: String,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}.{}", self.label, self.instrument.id(), self.variable)
    }
}

/// Check that `label` survives a round trip through a data file header.
///
/// Headers are comma separated, trimmed on read and a leading `#` marks a
/// comment line, so labels may not contain separators or quotes, start with
/// `#`, or carry surrounding whitespace.
pub fn validate_label(label: &str) -> AppResult<()> {
    let reason = if label.trim().is_empty() {
        "empty"
    } else if label.contains(|c| matches!(c, ',' | '"' | '\n' | '\r')) {
        "contains a separator"
    } else if label.starts_with('#') {
        "starts with '#'"
    } else if label.trim() != label {
        "surrounding whitespace"
    } else {
        return Ok(());
    };
    Err(LabError::InvalidLabel {
        label: label.to_string(),
        reason,
    })
}

/// Ordered list of labelled channels.
///
/// Labels are unique, well formed and every variable is readable; all are
/// checked when a channel is added, before any instrument is touched.
#[derive(Clone, Default, Debug)]
pub struct MeasurementList {
    channels: Vec<Channel>,
}

impl MeasurementList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a channel.
    pub fn add(
        &mut self,
        label: &str,
        instrument: Arc<dyn Instrument>,
        variable: &str,
    ) -> AppResult<()> {
        validate_label(label)?;
        if self.channels.iter().any(|c| c.label == label) {
            return Err(LabError::DuplicateLabel(label.to_string()));
        }
        instrument.ensure_readable(variable)?;
        self.channels.push(Channel {
            label: label.to_string(),
            instrument,
            variable: variable.to_string(),
        });
        Ok(())
    }

    /// Builder form of [`MeasurementList::add`]
    pub fn with(
        mut self,
        label: &str,
        instrument: Arc<dyn Instrument>,
        variable: &str,
    ) -> AppResult<Self> {
        self.add(label, instrument, variable)?;
        Ok(self)
    }

    /// Column labels in order
    pub fn labels(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.label.clone()).collect()
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::SimulatedInstrument;

    #[test]
    fn keeps_insertion_order() {
        let sim: Arc<dyn Instrument> = Arc::new(SimulatedInstrument::new("sim"));
        let list = MeasurementList::new()
            .with("I", sim.clone(), "current")
            .unwrap()
            .with("T", sim.clone(), "temperature")
            .unwrap()
            .with("V", sim, "dcv")
            .unwrap();
        assert_eq!(list.labels(), vec!["I", "T", "V"]);
        assert_eq!(format!("{:?}", list.channels()[0]), "I = sim.current");
    }

    #[test]
    fn rejects_duplicate_labels() {
        let sim: Arc<dyn Instrument> = Arc::new(SimulatedInstrument::new("sim"));
        let mut list = MeasurementList::new();
        list.add("I", sim.clone(), "current").unwrap();
        assert!(matches!(
            list.add("I", sim, "dcv"),
            Err(LabError::DuplicateLabel(label)) if label == "I"
        ));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn rejects_unknown_variables() {
        let sim: Arc<dyn Instrument> = Arc::new(SimulatedInstrument::new("sim"));
        let mut list = MeasurementList::new();
        assert!(matches!(
            list.add("X", sim, "resistance"),
            Err(LabError::UnknownVariable { .. })
        ));
        assert!(list.is_empty());
    }

    #[test]
    fn rejects_labels_that_break_the_header() {
        let sim: Arc<dyn Instrument> = Arc::new(SimulatedInstrument::new("sim"));
        let mut list = MeasurementList::new();
        for label in ["", "  ", "I, sample A", "a\nb", "x\r", "\"q\"", "#T", " T", "T "] {
            assert!(
                matches!(
                    list.add(label, sim.clone(), "current"),
                    Err(LabError::InvalidLabel { .. })
                ),
                "{label:?} accepted"
            );
        }
        assert!(list.is_empty());

        list.add("I (A)", sim.clone(), "current").unwrap();
        list.add("T_sample", sim, "temperature").unwrap();
        assert_eq!(list.labels(), vec!["I (A)", "T_sample"]);
    }
}
