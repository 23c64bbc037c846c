//! Applied-state persistence as a JSON file next to the stack configuration.

use std::path::{Path, PathBuf};

use stackplan_core::provision::AppliedState;

use crate::error::{CommandError, Result};

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the applied state, or an empty state when the file is missing.
    ///
    /// State recorded for a different stack is rejected.
    pub async fn load(&self, stack: &str) -> Result<AppliedState> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no state file, starting empty");
                return Ok(AppliedState::empty(stack));
            }
            Err(source) => {
                return Err(CommandError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let state: AppliedState =
            serde_json::from_str(&contents).map_err(|source| CommandError::State {
                path: self.path.clone(),
                source,
            })?;

        if state.stack != stack {
            return Err(CommandError::StackMismatch {
                expected: stack.to_string(),
                found: state.stack,
            });
        }

        Ok(state)
    }

    /// Writes the state to a temporary sibling file, then renames it over the
    /// previous one.
    pub async fn save(&self, state: &AppliedState) -> Result<()> {
        let write_error = |source| CommandError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_error)?;
        }

        let json = serde_json::to_string_pretty(state)?;
        let temp = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp, json).await.map_err(write_error)?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(write_error)?;

        tracing::debug!(
            path = %self.path.display(),
            resources = state.resources.len(),
            "state saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackplan_core::descriptor::ResourceId;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("stackplan-{}", uuid::Uuid::new_v4()))
            .join("state.json")
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty_state() {
        let store = StateStore::new(temp_path());

        let state = store.load("hello").await.unwrap();

        assert_eq!(state, AppliedState::empty("hello"));
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = StateStore::new(temp_path());
        let mut state = AppliedState::empty("hello");
        state
            .outputs
            .insert("ApiUrl".to_string(), "https://example.test/prod/".to_string());

        store.save(&state).await.unwrap();
        let loaded = store.load("hello").await.unwrap();

        assert_eq!(loaded, state);
        assert!(!loaded.contains(&ResourceId::table("users")));
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_state_of_another_stack_is_rejected() {
        let store = StateStore::new(temp_path());
        store.save(&AppliedState::empty("other")).await.unwrap();

        let error = store.load("hello").await.unwrap_err();

        assert!(matches!(error, CommandError::StackMismatch { .. }));
    }

    #[tokio::test]
    async fn test_corrupt_state_is_reported() {
        let store = StateStore::new(temp_path());
        tokio::fs::create_dir_all(store.path().parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(store.path(), "{ not json").await.unwrap();

        let error = store.load("hello").await.unwrap_err();

        assert!(matches!(error, CommandError::State { .. }));
    }
}
