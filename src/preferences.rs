use std::fmt;
use tracing::warn;

use crate::storage::{LocalStorage, DATA_MODE_KEY};

/// Which backend surface page data is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataMode {
  /// One REST request per page section
  #[default]
  Rest,
  /// One named GraphQL query per page
  GraphQl,
}

impl DataMode {
  pub fn as_str(&self) -> &'static str {
    match self {
      DataMode::Rest => "rest",
      DataMode::GraphQl => "graphql",
    }
  }

  pub fn toggled(&self) -> Self {
    match self {
      DataMode::Rest => DataMode::GraphQl,
      DataMode::GraphQl => DataMode::Rest,
    }
  }

  /// Read the persisted mode. Unknown values fall back to REST.
  pub fn load(storage: &dyn LocalStorage) -> Self {
    match storage.get_item(DATA_MODE_KEY) {
      Ok(Some(value)) => match value.trim() {
        "rest" => DataMode::Rest,
        "graphql" => DataMode::GraphQl,
        other => {
          warn!("Unknown data mode '{}', using rest", other);
          DataMode::default()
        }
      },
      Ok(None) => DataMode::default(),
      Err(e) => {
        warn!("Could not read data mode: {}", e);
        DataMode::default()
      }
    }
  }

  pub fn save(&self, storage: &dyn LocalStorage) {
    if let Err(e) = storage.set_item(DATA_MODE_KEY, self.as_str()) {
      warn!("Failed to save data mode: {}", e);
    }
  }
}

impl fmt::Display for DataMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      DataMode::Rest => write!(f, "REST"),
      DataMode::GraphQl => write!(f, "GraphQL"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::storage::{NoopStorage, SqliteStorage};

  #[test]
  fn test_round_trip() {
    let storage = SqliteStorage::in_memory(None).unwrap();
    assert_eq!(DataMode::load(&storage), DataMode::Rest);

    DataMode::GraphQl.save(&storage);
    assert_eq!(DataMode::load(&storage), DataMode::GraphQl);
    assert_eq!(storage.get_item(DATA_MODE_KEY).unwrap().as_deref(), Some("graphql"));
  }

  #[test]
  fn test_unknown_value_falls_back_to_rest() {
    let storage = SqliteStorage::in_memory(None).unwrap();
    storage.set_item(DATA_MODE_KEY, "soap").unwrap();
    assert_eq!(DataMode::load(&storage), DataMode::Rest);
  }

  #[test]
  fn test_noop_storage() {
    DataMode::GraphQl.save(&NoopStorage);
    assert_eq!(DataMode::load(&NoopStorage), DataMode::Rest);
  }
}
