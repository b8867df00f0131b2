use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Entities that run through the sync protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
  LearningPlans,
  Competencies,
  Competency,
  Certificate,
  CertificateDownload,
}

impl EntityType {
  pub const ALL: [EntityType; 5] = [
    EntityType::LearningPlans,
    EntityType::Competencies,
    EntityType::Competency,
    EntityType::Certificate,
    EntityType::CertificateDownload,
  ];

  fn default_message(self) -> &'static str {
    match self {
      EntityType::LearningPlans => "Error getting learning plans data.",
      EntityType::Competencies => "Error getting competencies data.",
      EntityType::Competency => "Error getting competency data.",
      EntityType::Certificate => "Error while getting the certificate",
      EntityType::CertificateDownload => "Error while downloading the certificate",
    }
  }
}

impl fmt::Display for EntityType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      EntityType::LearningPlans => "learning_plans",
      EntityType::Competencies => "competencies",
      EntityType::Competency => "competency",
      EntityType::Certificate => "certificate",
      EntityType::CertificateDownload => "certificate_download",
    };
    f.write_str(name)
  }
}

/// Fallback user-facing message per entity, for failures that carry none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessages {
  messages: HashMap<EntityType, String>,
}

impl ErrorMessages {
  /// Built-in messages with `overrides` applied on top.
  pub fn with_overrides(overrides: HashMap<EntityType, String>) -> Self {
    let mut messages = Self::default();
    messages.messages.extend(overrides);
    messages
  }

  pub fn get(&self, entity: EntityType) -> &str {
    self
      .messages
      .get(&entity)
      .map(String::as_str)
      .unwrap_or_else(|| entity.default_message())
  }
}

impl Default for ErrorMessages {
  fn default() -> Self {
    Self {
      messages: EntityType::ALL
        .iter()
        .map(|e| (*e, e.default_message().to_string()))
        .collect(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_cover_every_entity() {
    let messages = ErrorMessages::default();
    for entity in EntityType::ALL {
      assert!(!messages.get(entity).is_empty());
    }
    assert_eq!(
      messages.get(EntityType::Certificate),
      "Error while getting the certificate"
    );
  }

  #[test]
  fn test_overrides_replace_only_named_entities() {
    let messages = ErrorMessages::with_overrides(HashMap::from([(
      EntityType::Competency,
      "Could not load the competency".to_string(),
    )]));
    assert_eq!(messages.get(EntityType::Competency), "Could not load the competency");
    assert_eq!(
      messages.get(EntityType::LearningPlans),
      "Error getting learning plans data."
    );
  }
}
