use super::config::ClassMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MIN_COORDINATES: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LabelLineError {
    #[error("class id \"{0}\" is not an unsigned integer")]
    InvalidClassId(String),
    #[error("expected at least 4 coordinates, found {0}")]
    MissingCoordinates(usize),
    #[error("coordinate \"{0}\" is not a number")]
    InvalidCoordinate(String),
    #[error("class id {0} is not in the class map")]
    UnmappedClass(u32),
}

/// One object of a YOLO label file: `class_id cx cy w h`.
///
/// Coordinates are validated as numbers but kept as the original tokens, so a
/// remapped line differs from its source only in the class id.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelRecord {
    pub class_id: u32,
    coordinates: Vec<String>,
}

impl LabelRecord {
    pub fn coordinates(&self) -> &[String] {
        &self.coordinates
    }

    pub fn remap(self, class_map: &ClassMap) -> Result<Self, LabelLineError> {
        match class_map.get(&self.class_id) {
            Some(&class_id) => Ok(Self { class_id, ..self }),
            None => Err(LabelLineError::UnmappedClass(self.class_id)),
        }
    }
}

impl FromStr for LabelRecord {
    type Err = LabelLineError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let class_token = parts.next().unwrap_or_default();
        let class_id = class_token
            .parse::<u32>()
            .map_err(|_| LabelLineError::InvalidClassId(class_token.to_string()))?;
        let coordinates = parts.map(String::from).collect::<Vec<String>>();
        if coordinates.len() < MIN_COORDINATES {
            return Err(LabelLineError::MissingCoordinates(coordinates.len()));
        }
        if let Some(bad) = coordinates.iter().find(|c| c.parse::<f64>().is_err()) {
            return Err(LabelLineError::InvalidCoordinate(bad.clone()));
        }
        Ok(Self {
            class_id,
            coordinates,
        })
    }
}

impl fmt::Display for LabelRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.class_id, self.coordinates().join(" "))
    }
}

/// Outcome of remapping the content of a single label file.
#[derive(Debug, Default, PartialEq)]
pub struct RemappedLabels {
    pub lines: Vec<String>,
    pub dropped: Vec<(usize, LabelLineError)>,
}

impl RemappedLabels {
    /// Serialized file content, one record per line.
    pub fn content(&self) -> String {
        self.lines.iter().map(|l| format!("{}\n", l)).collect()
    }
}

/// Remaps every non-blank line of a label file. A line that fails to parse or
/// has no mapping is collected in `dropped` with its 1-based line number, the
/// rest of the file is still processed.
pub fn remap_labels(content: &str, class_map: &ClassMap) -> RemappedLabels {
    let mut remapped = RemappedLabels::default();
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match line
            .parse::<LabelRecord>()
            .and_then(|record| record.remap(class_map))
        {
            Ok(record) => remapped.lines.push(record.to_string()),
            Err(e) => remapped.dropped.push((idx + 1, e)),
        }
    }
    remapped
}
