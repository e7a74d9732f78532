use serde::{Deserialize, Serialize};

/// The remote write a resolved toggle requires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteOperation {
    /// No relation existed; insert one.
    Create,
    /// A relation exists and its value changes.
    Update,
    /// The resolved value is zero; remove the relation.
    Delete,
}
