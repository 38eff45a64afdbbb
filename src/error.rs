use serde_json::{Map, Value};

/// Boxed error used at the seams with external collaborators (sinks, HTTP
/// context accessors).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure while assembling the structured property map of one record.
///
/// Any of these aborts the whole build; the fluent builder then substitutes
/// a minimal fallback record instead of losing the event.
#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error("An element with the same key already exists: {key}")]
    Collision {
        key: String,
        existing: Value,
        attempted: Value,
    },

    #[error("{field} truncation length must not be negative, got {length}")]
    NegativeTruncation { field: &'static str, length: i64 },

    #[error("failed to serialize property value: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl BuildError {
    /// Auxiliary data attached to the fallback record's exception snapshot.
    pub fn diagnostic_data(&self) -> Map<String, Value> {
        let mut data = Map::new();
        match self {
            BuildError::Collision {
                key,
                existing,
                attempted,
            } => {
                data.insert("Key".to_string(), Value::String(key.clone()));
                data.insert("ExistingValue".to_string(), existing.clone());
                data.insert("AttemptedValue".to_string(), attempted.clone());
            }
            BuildError::NegativeTruncation { field, length } => {
                data.insert("Field".to_string(), Value::String(field.to_string()));
                data.insert("Length".to_string(), Value::from(*length));
            }
            BuildError::Serialize(_) => {}
        }
        data
    }
}

/// Failure while constructing a [`Logger`](crate::logger::Logger) or its
/// configuration.
#[derive(thiserror::Error, Debug)]
pub enum SetupError {
    #[error("invalid sanitization pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid logging configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("no tokio runtime available to drive log delivery")]
    NoRuntime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collision_exposes_both_values() {
        let err = BuildError::Collision {
            key: "Url".to_string(),
            existing: Value::from("a"),
            attempted: Value::from("b"),
        };
        let data = err.diagnostic_data();
        assert_eq!(data["Key"], "Url");
        assert_eq!(data["ExistingValue"], "a");
        assert_eq!(data["AttemptedValue"], "b");
        assert!(err.to_string().contains("Url"));
    }
}
