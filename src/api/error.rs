use thiserror::Error;

/// Failure talking to the KPI backend.
///
/// Kept cloneable so cached error messages and query states can share it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
  #[error("network error: {0}")]
  Network(String),

  #[error("server returned {status}: {body}")]
  Http { status: u16, body: String },

  #[error("not found: {0}")]
  NotFound(String),

  #[error("graphql errors: {}", .0.join("; "))]
  GraphQl(Vec<String>),

  #[error("unexpected response: {0}")]
  Decode(String),

  #[error("{0}")]
  Io(String),
}

impl ApiError {
  /// Whether repeating the same request may succeed.
  pub fn is_retryable(&self) -> bool {
    !matches!(self, ApiError::NotFound(_) | ApiError::Io(_))
  }

  /// Map a non-success status code.
  pub fn from_status(status: reqwest::StatusCode, path: &str, body: String) -> Self {
    if status == reqwest::StatusCode::NOT_FOUND {
      ApiError::NotFound(path.to_string())
    } else {
      ApiError::Http {
        status: status.as_u16(),
        body,
      }
    }
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_decode() {
      ApiError::Decode(e.to_string())
    } else {
      ApiError::Network(e.to_string())
    }
  }
}

impl From<serde_json::Error> for ApiError {
  fn from(e: serde_json::Error) -> Self {
    ApiError::Decode(e.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_not_found_is_terminal() {
    let err = ApiError::from_status(reqwest::StatusCode::NOT_FOUND, "/api/x", String::new());
    assert_eq!(err, ApiError::NotFound("/api/x".to_string()));
    assert!(!err.is_retryable());
  }

  #[test]
  fn test_server_errors_are_retryable() {
    let err = ApiError::from_status(
      reqwest::StatusCode::BAD_GATEWAY,
      "/api/x",
      "upstream".to_string(),
    );
    assert!(err.is_retryable());
    assert_eq!(err.to_string(), "server returned 502: upstream");
  }

  #[test]
  fn test_graphql_message_joins_errors() {
    let err = ApiError::GraphQl(vec!["a".into(), "b".into()]);
    assert_eq!(err.to_string(), "graphql errors: a; b");
  }
}
