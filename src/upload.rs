//! Data file upload and ingestion status polling.
//!
//! The backend hands every upload to a warehouse ingestion job and returns a
//! task id. The task is then polled until it reaches a terminal state.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::api::{ApiClient, ApiError, IngestState, IngestStatus, IngestTask};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
  pub path: PathBuf,
  pub file_name: String,
  pub size_bytes: u64,
}

impl SelectedFile {
  /// Describe the file at `path`. Fails if it is missing or not a file.
  pub fn inspect(path: &Path) -> Result<Self, ApiError> {
    let metadata = std::fs::metadata(path)
      .map_err(|e| ApiError::Io(format!("Cannot read {}: {}", path.display(), e)))?;
    if !metadata.is_file() {
      return Err(ApiError::Io(format!("{} is not a file", path.display())));
    }
    Ok(Self {
      path: path.to_path_buf(),
      file_name: path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default(),
      size_bytes: metadata.len(),
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadState {
  Idle,
  Selected,
  Uploading,
  Processing {
    task_id: String,
    status: Option<IngestState>,
  },
  Completed {
    task_id: String,
    rows_ingested: Option<u64>,
  },
  /// Raw error message; the selected file is kept for a retry
  Failed { message: String },
}

/// Everything a background upload needs.
#[derive(Debug, Clone)]
pub struct UploadRequest {
  pub path: PathBuf,
  pub datasource_name: String,
}

/// Progress reported by [`spawn_upload`].
#[derive(Debug)]
pub enum UploadEvent {
  Uploaded(Result<IngestTask, ApiError>),
  Status(Result<IngestStatus, ApiError>),
}

/// Upload state machine.
#[derive(Debug)]
pub struct Uploader {
  datasource_name: String,
  file: Option<SelectedFile>,
  state: UploadState,
}

impl Uploader {
  pub fn new(datasource_name: impl Into<String>) -> Self {
    Self {
      datasource_name: datasource_name.into(),
      file: None,
      state: UploadState::Idle,
    }
  }

  pub fn state(&self) -> &UploadState {
    &self.state
  }

  pub fn file(&self) -> Option<&SelectedFile> {
    self.file.as_ref()
  }

  pub fn is_busy(&self) -> bool {
    matches!(
      self.state,
      UploadState::Uploading | UploadState::Processing { .. }
    )
  }

  /// Choose the file to upload. Ignored while an upload is running.
  pub fn select_file(&mut self, file: SelectedFile) -> bool {
    if self.is_busy() {
      return false;
    }
    self.file = Some(file);
    self.state = UploadState::Selected;
    true
  }

  pub fn can_submit(&self) -> bool {
    matches!(self.state, UploadState::Selected)
  }

  /// A failed upload can be retried with the same file.
  pub fn can_retry(&self) -> bool {
    matches!(self.state, UploadState::Failed { .. }) && self.file.is_some()
  }

  /// Move to `Uploading` and hand out the request to run.
  pub fn begin(&mut self) -> Option<UploadRequest> {
    if !(self.can_submit() || self.can_retry()) {
      return None;
    }
    let file = self.file.as_ref()?;
    self.state = UploadState::Uploading;
    Some(UploadRequest {
      path: file.path.clone(),
      datasource_name: self.datasource_name.clone(),
    })
  }

  pub fn upload_finished(&mut self, result: Result<IngestTask, ApiError>) {
    self.state = match result {
      Ok(task) => {
        info!(task_id = %task.task_id, "Upload accepted");
        UploadState::Processing {
          task_id: task.task_id,
          status: None,
        }
      }
      Err(e) => {
        warn!("Upload failed: {}", e);
        UploadState::Failed {
          message: e.to_string(),
        }
      }
    };
  }

  /// Apply a status poll. Returns `true` when ingestion just completed.
  pub fn status_received(&mut self, result: Result<IngestStatus, ApiError>) -> bool {
    let current = match &self.state {
      UploadState::Processing { task_id, .. } => task_id.clone(),
      _ => return false,
    };

    match result {
      Ok(status) if status.task_id != current => false,
      Ok(status) => match status.status {
        IngestState::Succeeded => {
          info!(task_id = %status.task_id, rows = ?status.rows_ingested, "Ingestion completed");
          self.state = UploadState::Completed {
            task_id: status.task_id,
            rows_ingested: status.rows_ingested,
          };
          true
        }
        IngestState::Failed => {
          self.state = UploadState::Failed {
            message: status
              .message
              .unwrap_or_else(|| "ingestion failed".to_string()),
          };
          false
        }
        pending => {
          self.state = UploadState::Processing {
            task_id: status.task_id,
            status: Some(pending),
          };
          false
        }
      },
      Err(e) => {
        self.state = UploadState::Failed {
          message: e.to_string(),
        };
        false
      }
    }
  }

  pub fn clear(&mut self) {
    if self.is_busy() {
      return;
    }
    self.file = None;
    self.state = UploadState::Idle;
  }
}

/// Upload in the background, then poll the ingestion task until it ends.
pub fn spawn_upload(
  api: ApiClient,
  request: UploadRequest,
  poll_interval: Duration,
) -> mpsc::UnboundedReceiver<UploadEvent> {
  let (tx, rx) = mpsc::unbounded_channel();

  tokio::spawn(async move {
    let uploaded = api.upload(&request.path, &request.datasource_name).await;
    let task_id = uploaded.as_ref().ok().map(|t| t.task_id.clone());
    if tx.send(UploadEvent::Uploaded(uploaded)).is_err() {
      return;
    }
    let Some(task_id) = task_id else {
      return;
    };

    loop {
      tokio::time::sleep(poll_interval).await;
      let status = api.ingest_status(&task_id).await;
      let done = match &status {
        Ok(s) => s.status.is_terminal(),
        Err(_) => true,
      };
      if tx.send(UploadEvent::Status(status)).is_err() || done {
        return;
      }
    }
  });

  rx
}
