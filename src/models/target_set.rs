use std::fmt::Display;

use thiserror::Error;

/// The ordered meter identifiers a run waits for. Never empty, no duplicates,
/// read-only once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSet {
    ids: Vec<String>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TargetSetError {
    #[error("At least one target meter id is required.")]
    Empty,
}

impl TargetSet {
    /// Trim each id, drop blanks and repeated ids. First occurrence wins so the
    /// export order follows the operator's order.
    pub fn new<I, S>(ids: I) -> Result<Self, TargetSetError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = vec![];
        for id in ids {
            let id = id.as_ref().trim();
            if id.is_empty() || unique.iter().any(|known| known == id) {
                continue;
            }
            unique.push(id.to_string());
        }

        if unique.is_empty() {
            return Err(TargetSetError::Empty);
        }
        Ok(Self { ids: unique })
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

impl Display for TargetSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.ids.join(", "))
    }
}
