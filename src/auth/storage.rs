//! Persisted sign-in state.

use std::fmt::Debug;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::AuthResponse;
use crate::Result;

/// Where a signed-in session survives restarts.
#[async_trait]
pub trait TokenStorage: Send + Sync + Debug {
   /// The stored session, or `None` when there is nothing usable.
   async fn load(&self) -> Result<Option<AuthResponse>>;

   async fn save(&self, auth: &AuthResponse) -> Result<()>;

   async fn clear(&self) -> Result<()>;
}

/// Session stored as one JSON document on disk.
///
/// Saves go through a sibling temp file and a rename so a crash never
/// leaves a half-written session behind.
#[derive(Debug, Clone)]
pub struct FileTokenStorage {
   path: PathBuf,
}

impl FileTokenStorage {
   pub fn new(path: impl AsRef<Path>) -> Self {
      Self {
         path: path.as_ref().to_path_buf(),
      }
   }

   pub fn path(&self) -> &Path {
      &self.path
   }
}

#[async_trait]
impl TokenStorage for FileTokenStorage {
   async fn load(&self) -> Result<Option<AuthResponse>> {
      let bytes = match tokio::fs::read(&self.path).await {
         Ok(bytes) => bytes,
         Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
         Err(e) => return Err(e.into()),
      };

      match serde_json::from_slice::<AuthResponse>(&bytes) {
         Ok(auth) if auth.validate().is_ok() => Ok(Some(auth)),
         Ok(_) => {
            warn!(path = %self.path.display(), "Stored session is invalid, ignoring it");
            Ok(None)
         }
         Err(e) => {
            warn!(path = %self.path.display(), error = %e, "Stored session is unreadable, ignoring it");
            Ok(None)
         }
      }
   }

   async fn save(&self, auth: &AuthResponse) -> Result<()> {
      if let Some(parent) = self.path.parent()
         && !parent.as_os_str().is_empty()
      {
         tokio::fs::create_dir_all(parent).await?;
      }

      let temp = self.path.with_extension("tmp");
      tokio::fs::write(&temp, serde_json::to_vec(auth)?).await?;
      tokio::fs::rename(&temp, &self.path).await?;
      debug!(path = %self.path.display(), "Session saved");
      Ok(())
   }

   async fn clear(&self) -> Result<()> {
      match tokio::fs::remove_file(&self.path).await {
         Ok(()) => Ok(()),
         Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
         Err(e) => Err(e.into()),
      }
   }
}
