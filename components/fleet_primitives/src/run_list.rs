use serde::{Deserialize, Serialize};

/// Ordered list of roles applied to a node during bootstrap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunList(Vec<String>);

impl RunList {
    pub fn new(roles: Vec<String>) -> Self {
        Self(roles)
    }

    pub fn roles(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Comma-joined form handed to the bootstrapper command line.
    pub fn as_argument(&self) -> String {
        self.0.join(",")
    }
}

impl FromIterator<String> for RunList {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
