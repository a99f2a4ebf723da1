use std::path::{Path, PathBuf};

use hf_hub::api::tokio::ApiBuilder;
use hf_hub::{Repo, RepoType};
use tracing::{info, warn};

use crate::config::ModelConfig;
use crate::error::{Result, TranslateError};
use crate::model::{find_weights, CONFIG_FILE, PTH_WEIGHTS_FILE, WEIGHTS_FILE};
use crate::tokenizer::{SRC_SPM_FILE, SRC_VOCAB_FILE, TGT_VOCAB_FILE};

/// Files the engine reads from a checkpoint directory.
///
/// `model.safetensors` may be replaced by `pytorch_model.bin`.
pub const REQUIRED_FILES: &[&str] = &[
    CONFIG_FILE,
    WEIGHTS_FILE,
    SRC_SPM_FILE,
    SRC_VOCAB_FILE,
    TGT_VOCAB_FILE,
];

/// Names of required files absent from `dir`.
pub fn missing_files(dir: &Path) -> Vec<&'static str> {
    REQUIRED_FILES
        .iter()
        .copied()
        .filter(|&name| {
            if name == WEIGHTS_FILE {
                find_weights(dir).is_none()
            } else {
                !dir.join(name).is_file()
            }
        })
        .collect()
}

/// Returns a directory containing every required file.
///
/// A configured local path wins; otherwise files are fetched into the
/// Hugging Face cache (gated repos need `HF_TOKEN`).
pub async fn resolve_model_dir(config: &ModelConfig) -> Result<PathBuf> {
    if let Some(path) = &config.path {
        let missing = missing_files(path);
        if missing.is_empty() {
            info!(path = %path.display(), "Using local model directory");
            return Ok(path.clone());
        }
        if path.exists() {
            return Err(TranslateError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is missing {}", path.display(), missing.join(", ")),
            )));
        }
    }

    info!(repo = %config.repo_id, revision = %config.revision, "Fetching model from Hugging Face Hub");
    let api = ApiBuilder::new()
        .with_token(std::env::var("HF_TOKEN").ok())
        .build()?;
    let repo = api.repo(Repo::with_revision(
        config.repo_id.clone(),
        RepoType::Model,
        config.revision.clone(),
    ));

    let mut dir = None;
    for &name in REQUIRED_FILES {
        let path = match repo.get(name).await {
            Ok(path) => path,
            Err(e) if name == WEIGHTS_FILE => {
                warn!(error = %e, "No {}, falling back to {}", WEIGHTS_FILE, PTH_WEIGHTS_FILE);
                repo.get(PTH_WEIGHTS_FILE).await?
            }
            Err(e) => return Err(e.into()),
        };
        info!(file = name, path = %path.display(), "Model file ready");
        dir = path.parent().map(Path::to_path_buf);
    }

    dir.ok_or_else(|| {
        TranslateError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("could not resolve files for {}", config.repo_id),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_missing_checkpoint_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{}").unwrap();
        std::fs::write(dir.path().join(SRC_VOCAB_FILE), "{}").unwrap();

        let missing = missing_files(dir.path());
        assert_eq!(missing, vec![WEIGHTS_FILE, SRC_SPM_FILE, TGT_VOCAB_FILE]);
    }

    #[test]
    fn pytorch_weights_satisfy_the_weights_requirement() {
        let dir = tempfile::tempdir().unwrap();
        for name in [CONFIG_FILE, PTH_WEIGHTS_FILE, SRC_SPM_FILE, SRC_VOCAB_FILE, TGT_VOCAB_FILE] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }

        assert!(missing_files(dir.path()).is_empty());
        assert_eq!(
            find_weights(dir.path()),
            Some(dir.path().join(PTH_WEIGHTS_FILE))
        );

        std::fs::write(dir.path().join(WEIGHTS_FILE), "").unwrap();
        assert_eq!(find_weights(dir.path()), Some(dir.path().join(WEIGHTS_FILE)));
    }

    #[tokio::test]
    async fn local_directory_with_pytorch_weights_is_used() {
        let dir = tempfile::tempdir().unwrap();
        for name in [CONFIG_FILE, PTH_WEIGHTS_FILE, SRC_SPM_FILE, SRC_VOCAB_FILE, TGT_VOCAB_FILE] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let config = ModelConfig {
            path: Some(dir.path().to_path_buf()),
            ..ModelConfig::default()
        };
        assert_eq!(resolve_model_dir(&config).await.unwrap(), dir.path());
    }

    #[tokio::test]
    async fn incomplete_local_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = ModelConfig {
            path: Some(dir.path().to_path_buf()),
            ..ModelConfig::default()
        };
        let err = resolve_model_dir(&config).await.unwrap_err();
        assert!(err.to_string().contains("model.safetensors"));
    }
}
