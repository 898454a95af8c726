use std::path::{Path, PathBuf};

use llama_chat_core::{errors::BuildError, model_args::ModelArgs};

/// Longest context any supported checkpoint can be built with
pub const MAX_SUPPORTED_SEQ_LEN: usize = 8192;

const PARAMS_FILE: &str = "params.json";
const SHARD_EXTENSION: &str = "pth";

/// Checkpoint
/// A checkpoint directory: `params.json` plus one weight shard per model parallel rank.
/// Only the layout is inspected, weights are never read here.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    params: ModelArgs,
    shards: Vec<PathBuf>,
}

impl Checkpoint {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, BuildError> {
        let dir = dir.as_ref().to_path_buf();
        if !tokio::fs::metadata(&dir)
            .await
            .map(|metadata| metadata.is_dir())
            .unwrap_or(false)
        {
            return Err(BuildError::CheckpointNotFound(dir));
        }

        let mut shards = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(SHARD_EXTENSION) {
                shards.push(path);
            }
        }
        if shards.is_empty() {
            return Err(BuildError::NoCheckpointShards(dir));
        }
        shards.sort();

        let params_path = dir.join(PARAMS_FILE);
        let raw = tokio::fs::read(&params_path)
            .await
            .map_err(|source| BuildError::ReadParams {
                path: params_path.clone(),
                source,
            })?;
        let params = serde_json::from_slice::<ModelArgs>(&raw).map_err(|source| {
            BuildError::InvalidParams {
                path: params_path,
                source,
            }
        })?;

        Ok(Self {
            params,
            shards,
        })
    }

    pub fn params(&self) -> &ModelArgs {
        &self.params
    }

    /// Weight shards in rank order
    pub fn shards(&self) -> &[PathBuf] {
        &self.shards
    }

    /// Number of model parallel ranks this checkpoint was saved for
    pub fn model_parallel_size(&self) -> usize {
        self.shards.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_data(name: &str) -> PathBuf {
        let project_root = env!("CARGO_MANIFEST_DIR");
        PathBuf::from(format!(
            "{}/src/text_generation/test_data/{}",
            project_root, name
        ))
    }

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("llama-chat-{}", nanoid::nanoid!()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_open_text_checkpoint() {
        let checkpoint = Checkpoint::open(test_data("checkpoint")).await.unwrap();
        assert_eq!(checkpoint.model_parallel_size(), 1);
        assert_eq!(checkpoint.params().n_layers, 28);
        assert!(!checkpoint.params().supports_vision());
        assert!(checkpoint.shards()[0].ends_with("consolidated.00.pth"));
    }

    #[tokio::test]
    async fn test_open_vision_checkpoint() {
        let checkpoint = Checkpoint::open(test_data("vision_checkpoint"))
            .await
            .unwrap();
        assert_eq!(checkpoint.model_parallel_size(), 2);
        assert_eq!(checkpoint.params().vision_chunk_size, 560);
        assert!(checkpoint.shards()[1].ends_with("consolidated.01.pth"));
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let result = Checkpoint::open(test_data("does_not_exist")).await;
        assert!(matches!(result, Err(BuildError::CheckpointNotFound(_))));
    }

    #[tokio::test]
    async fn test_directory_without_shards() {
        let dir = scratch_dir();
        std::fs::write(dir.join("params.json"), "{}").unwrap();

        let result = Checkpoint::open(&dir).await;
        assert!(matches!(result, Err(BuildError::NoCheckpointShards(_))));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_missing_and_invalid_params() {
        let dir = scratch_dir();
        std::fs::write(dir.join("consolidated.00.pth"), b"").unwrap();

        let result = Checkpoint::open(&dir).await;
        assert!(matches!(result, Err(BuildError::ReadParams { .. })));

        std::fs::write(dir.join("params.json"), "{ not json").unwrap();
        let result = Checkpoint::open(&dir).await;
        assert!(matches!(result, Err(BuildError::InvalidParams { .. })));
        std::fs::remove_dir_all(dir).unwrap();
    }
}
