use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One requested camera viewpoint: the label used for display and file
/// naming, and the text fragment spliced into the generation prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AngleSpec {
    pub label: String,
    pub fragment: String,
}

impl AngleSpec {
    pub fn new(label: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            fragment: fragment.into(),
        }
    }

    pub fn matches(&self, label: &str) -> bool {
        self.label.eq_ignore_ascii_case(label.trim())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AngleSetError {
    #[error("angle set is empty")]
    Empty,
    #[error("angle label is empty")]
    EmptyLabel,
    #[error("angle label '{0}' may only contain ASCII letters, digits, '-' and '_'")]
    InvalidLabel(String),
    #[error("angle label '{0}' is listed more than once")]
    Duplicate(String),
    #[error("angle '{0}' has no prompt fragment")]
    EmptyFragment(String),
    #[error("unknown angle '{label}' (available: {available})")]
    Unknown { label: String, available: String },
}

/// Ordered list of angles. Display order is generation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<AngleSpec>", into = "Vec<AngleSpec>")]
pub struct AngleSet {
    angles: Vec<AngleSpec>,
}

impl AngleSet {
    pub fn new(angles: Vec<AngleSpec>) -> Result<Self, AngleSetError> {
        if angles.is_empty() {
            return Err(AngleSetError::Empty);
        }
        let mut seen: Vec<String> = Vec::with_capacity(angles.len());
        for angle in &angles {
            let label = angle.label.trim();
            if label.is_empty() {
                return Err(AngleSetError::EmptyLabel);
            }
            if !label
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
            {
                return Err(AngleSetError::InvalidLabel(label.to_string()));
            }
            if angle.fragment.trim().is_empty() {
                return Err(AngleSetError::EmptyFragment(label.to_string()));
            }
            let folded = label.to_ascii_lowercase();
            if seen.contains(&folded) {
                return Err(AngleSetError::Duplicate(label.to_string()));
            }
            seen.push(folded);
        }
        Ok(Self {
            angles: angles
                .into_iter()
                .map(|angle| AngleSpec::new(angle.label.trim(), angle.fragment.trim()))
                .collect(),
        })
    }

    pub fn get(&self, label: &str) -> Option<&AngleSpec> {
        self.angles.iter().find(|angle| angle.matches(label))
    }

    pub fn labels(&self) -> Vec<String> {
        self.angles.iter().map(|angle| angle.label.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AngleSpec> {
        self.angles.iter()
    }

    pub fn len(&self) -> usize {
        self.angles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.angles.is_empty()
    }

    /// Keeps only the requested labels, in set order. Unknown labels are an
    /// error so a typo never silently shrinks a batch.
    pub fn subset(&self, labels: &[String]) -> Result<Self, AngleSetError> {
        if labels.is_empty() {
            return Ok(self.clone());
        }
        if let Some(label) = labels.iter().find(|label| self.get(label).is_none()) {
            return Err(AngleSetError::Unknown {
                label: label.trim().to_string(),
                available: self.labels().join(", "),
            });
        }
        let angles = self
            .angles
            .iter()
            .filter(|angle| labels.iter().any(|label| angle.matches(label)))
            .cloned()
            .collect();
        Ok(Self { angles })
    }
}

impl Default for AngleSet {
    fn default() -> Self {
        Self {
            angles: vec![
                AngleSpec::new(
                    "Front",
                    "Camera: straight-on front view at eye level, full body in frame.",
                ),
                AngleSpec::new(
                    "Quarter",
                    "Camera: three-quarter view, rotated about 45 degrees to the side of the figure, full body in frame.",
                ),
                AngleSpec::new(
                    "Low",
                    "Camera: low angle near the floor looking up at the figure, full body in frame.",
                ),
                AngleSpec::new(
                    "High",
                    "Camera: high angle above the figure looking down, full body in frame.",
                ),
            ],
        }
    }
}

impl TryFrom<Vec<AngleSpec>> for AngleSet {
    type Error = AngleSetError;

    fn try_from(value: Vec<AngleSpec>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AngleSet> for Vec<AngleSpec> {
    fn from(value: AngleSet) -> Self {
        value.angles
    }
}

impl<'a> IntoIterator for &'a AngleSet {
    type Item = &'a AngleSpec;
    type IntoIter = std::slice::Iter<'a, AngleSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.angles.iter()
    }
}
