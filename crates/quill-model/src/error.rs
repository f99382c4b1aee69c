use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// A document key violates the naming rules (leading `$` or embedded `.`).
    InvalidKey(String),
    /// A query document is malformed (bad operator, wrong operand type).
    InvalidQuery(String),
    /// An update document is malformed (unknown modifier, wrong operand type).
    InvalidModifier(String),
    /// An update attempted to change the `_id` of a document.
    IdImmutable,
    /// An update document mixes `$`-modifiers with plain fields.
    MixedFieldsAndModifiers,
    /// A record line could not be serialized or deserialized.
    Serialization(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::InvalidKey(key) => {
                write!(f, "field names cannot begin with $ or contain a .: {key}")
            }
            ModelError::InvalidQuery(msg) => write!(f, "invalid query: {msg}"),
            ModelError::InvalidModifier(msg) => write!(f, "invalid modifier: {msg}"),
            ModelError::IdImmutable => write!(f, "you cannot change a document's _id"),
            ModelError::MixedFieldsAndModifiers => {
                write!(f, "you cannot mix modifiers and normal fields in an update")
            }
            ModelError::Serialization(msg) => write!(f, "serialization error: {msg}"),
        }
    }
}

impl std::error::Error for ModelError {}

impl From<serde_json::Error> for ModelError {
    fn from(e: serde_json::Error) -> Self {
        ModelError::Serialization(e.to_string())
    }
}
