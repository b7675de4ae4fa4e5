//! Logical step identity.

/// Identity of a step call: a scope-qualified id plus a zero-based call
/// sequence number.
///
/// Sequence numbers for one id are assigned strictly in call order by the
/// root context's shared counters, so a step id called K times within one
/// run persists under K distinct keys `id#0 .. id#K-1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StepKey {
    id: String,
    sequence: u32,
}

impl StepKey {
    pub fn new(id: impl Into<String>, sequence: u32) -> Self {
        Self {
            id: id.into(),
            sequence,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// The persisted form, `id#sequence`.
    pub fn key_string(&self) -> String {
        format!("{}#{}", self.id, self.sequence)
    }
}

impl std::fmt::Display for StepKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.id, self.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_string_joins_id_and_sequence() {
        let key = StepKey::new("parallel/provision-laptop", 0);
        assert_eq!(key.key_string(), "parallel/provision-laptop#0");
        assert_eq!(key.to_string(), key.key_string());
    }

    #[test]
    fn distinct_sequences_are_distinct_keys() {
        assert_ne!(
            StepKey::new("a", 0).key_string(),
            StepKey::new("a", 1).key_string()
        );
    }
}
