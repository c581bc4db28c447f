use crate::{ModelError, TaskKind};
use std::fmt;
use std::str::FromStr;

/// A `kind:id` reference, the wire form used by `depends_on` lists and `poll_tasks`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskRef {
    pub kind: TaskKind,
    pub id: String,
}

impl TaskRef {
    pub fn new(kind: TaskKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// Parse a `depends_on` column value (comma-separated `kind:id` pairs), skipping
    /// blank entries and tolerating unknown kinds by returning them as an error per entry.
    pub fn parse_list(depends_on: &str) -> Vec<Result<TaskRef, ModelError>> {
        depends_on
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(TaskRef::from_str)
            .collect()
    }

    pub fn format_list(refs: &[TaskRef]) -> String {
        refs.iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

impl FromStr for TaskRef {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| ModelError::MalformedRef(s.to_string()))?;
        if id.is_empty() {
            return Err(ModelError::MalformedRef(s.to_string()));
        }
        let kind = kind.parse::<TaskKind>().map_err(|_| {
            // Preserve the original unknown-kind token for the dependency resolver's
            // "unmet forever" handling rather than surfacing TaskKind's own error text.
            ModelError::UnknownKind(kind.to_string())
        })?;
        Ok(TaskRef::new(kind, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_ref() {
        let r: TaskRef = "image:abc-123".parse().unwrap();
        assert_eq!(r.kind, TaskKind::Image);
        assert_eq!(r.id, "abc-123");
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = "sprite:abc".parse::<TaskRef>().unwrap_err();
        assert!(matches!(err, ModelError::UnknownKind(k) if k == "sprite"));
    }

    #[test]
    fn parse_list_skips_blanks() {
        let results = TaskRef::parse_list(" image:a , ,video:b");
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
    }

    #[test]
    fn round_trips_through_display() {
        let r = TaskRef::new(TaskKind::Audio, "id-1");
        assert_eq!(r.to_string(), "audio:id-1");
    }
}
