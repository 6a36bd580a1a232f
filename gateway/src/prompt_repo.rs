//! Filesystem-backed prompt repository (§4.11, §6): `Get(prompt_id,
//! language)` reads `{root}/{language}/{prompt_id}.txt`, falling back to the
//! default language, else `NotFound`.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromptRepoError {
    #[error("prompt '{prompt_id}' not found for language '{language}' or default")]
    NotFound { prompt_id: String, language: String },
    #[error("failed reading prompt file: {0}")]
    Io(String),
}

#[async_trait]
pub trait PromptRepository: Send + Sync {
    async fn get(&self, prompt_id: &str, language: &str) -> Result<String, PromptRepoError>;
}

pub struct FilesystemPromptRepository {
    root: PathBuf,
    default_language: String,
}

impl FilesystemPromptRepository {
    pub fn new(root: impl Into<PathBuf>, default_language: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            default_language: default_language.into(),
        }
    }

    fn path_for(&self, prompt_id: &str, language: &str) -> PathBuf {
        self.root.join(language).join(format!("{prompt_id}.txt"))
    }
}

#[async_trait]
impl PromptRepository for FilesystemPromptRepository {
    async fn get(&self, prompt_id: &str, language: &str) -> Result<String, PromptRepoError> {
        let primary = self.path_for(prompt_id, language);
        if let Ok(contents) = tokio::fs::read_to_string(&primary).await {
            return Ok(contents);
        }

        if language != self.default_language {
            let fallback = self.path_for(prompt_id, &self.default_language);
            if let Ok(contents) = tokio::fs::read_to_string(&fallback).await {
                return Ok(contents);
            }
        }

        Err(PromptRepoError::NotFound {
            prompt_id: prompt_id.to_string(),
            language: language.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_language_specific_prompt() {
        let dir = tempdir();
        std::fs::create_dir_all(dir.join("en")).unwrap();
        std::fs::write(dir.join("en").join("greet.txt"), "hello").unwrap();

        let repo = FilesystemPromptRepository::new(&dir, "en");
        let text = repo.get("greet", "en").await.unwrap();
        assert_eq!(text, "hello");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn falls_back_to_default_language() {
        let dir = tempdir();
        std::fs::create_dir_all(dir.join("en")).unwrap();
        std::fs::write(dir.join("en").join("greet.txt"), "hello").unwrap();

        let repo = FilesystemPromptRepository::new(&dir, "en");
        let text = repo.get("greet", "pl").await.unwrap();
        assert_eq!(text, "hello");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn missing_prompt_is_not_found() {
        let dir = tempdir();
        std::fs::create_dir_all(&dir).unwrap();
        let repo = FilesystemPromptRepository::new(&dir, "en");
        let err = repo.get("missing", "en").await.unwrap_err();
        assert!(matches!(err, PromptRepoError::NotFound { .. }));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    fn tempdir() -> PathBuf {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("prompt_repo_test_{}_{id}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
