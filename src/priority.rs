//! Priority classes for operation scheduling
//!
//! The queue itself orders on raw integers; these classes are the explicit
//! caller-side mapping from named urgency levels to those integers, resolved
//! before submission.

use serde::{Deserialize, Serialize};

/// Named priority class, convertible to the integer rank the queue orders on.
///
/// Higher values run first. Raw integers between or above these bands are
/// also valid priorities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PriorityClass {
    /// Work that may never be needed; runs only when nothing else wants the slot
    Speculative,
    /// Ordinary deferrable work
    #[default]
    Background,
    /// Work a user is actively waiting on
    UserInitiated,
}

impl PriorityClass {
    /// The integer rank submitted to the queue
    pub fn value(self) -> i32 {
        match self {
            Self::Speculative => 10,
            Self::Background => 20,
            Self::UserInitiated => 100,
        }
    }
}

impl From<PriorityClass> for i32 {
    fn from(class: PriorityClass) -> Self {
        class.value()
    }
}

impl std::fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Speculative => write!(f, "speculative"),
            Self::Background => write!(f, "background"),
            Self::UserInitiated => write!(f, "user-initiated"),
        }
    }
}

impl std::str::FromStr for PriorityClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "speculative" => Ok(Self::Speculative),
            "background" => Ok(Self::Background),
            "user-initiated" => Ok(Self::UserInitiated),
            _ => Err(format!("Unknown priority class: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_ordering() {
        assert!(PriorityClass::Speculative < PriorityClass::Background);
        assert!(PriorityClass::Background < PriorityClass::UserInitiated);
        assert!(PriorityClass::Speculative.value() < PriorityClass::Background.value());
        assert!(PriorityClass::Background.value() < PriorityClass::UserInitiated.value());
    }

    #[test]
    fn test_class_display() {
        assert_eq!(PriorityClass::Speculative.to_string(), "speculative");
        assert_eq!(PriorityClass::Background.to_string(), "background");
        assert_eq!(PriorityClass::UserInitiated.to_string(), "user-initiated");
    }

    #[test]
    fn test_class_parse() {
        assert_eq!(
            "speculative".parse::<PriorityClass>().unwrap(),
            PriorityClass::Speculative
        );
        assert_eq!(
            "USER-INITIATED".parse::<PriorityClass>().unwrap(),
            PriorityClass::UserInitiated
        );
        assert!("invalid".parse::<PriorityClass>().is_err());
    }

    #[test]
    fn test_class_serde() {
        let json = serde_json::to_string(&PriorityClass::UserInitiated).unwrap();
        assert_eq!(json, "\"user-initiated\"");

        let class: PriorityClass = serde_json::from_str("\"background\"").unwrap();
        assert_eq!(class, PriorityClass::Background);
    }

    #[test]
    fn test_into_i32() {
        let priority: i32 = PriorityClass::UserInitiated.into();
        assert_eq!(priority, 100);
    }
}
