use std::{path::PathBuf, time::Duration};

use llama_chat_core::{
    device::Device,
    dialog::Batch,
    distributed::DistributedConfig,
    errors::{BuildError, GenerationError},
    generation::{token_channel, GenerationConfig, Generator, TokenStream},
    model_args::{ModelArgs, QuantizationMode},
    rendezvous::Rendezvous,
};
use nanoid::nanoid;
use slog::{info, Logger};

use super::{
    checkpoint::{Checkpoint, MAX_SUPPORTED_SEQ_LEN},
    ollama::OllamaClient,
};

/// Everything needed to build a [`TextGenerator`]
#[derive(Debug, Clone)]
pub struct TextGeneratorArgs {
    pub logger: Logger,

    /// Directory holding `params.json` and the `*.pth` shards
    pub ckpt_dir: PathBuf,

    pub max_seq_len: usize,
    pub max_batch_size: usize,

    /// Must agree with the distributed world size when given
    pub world_size: Option<usize>,

    /// One of "none", "fp8_mixed", "int4_mixed"
    pub quantization_mode: Option<String>,

    pub device: Device,

    /// Base url of the inference server
    pub ollama_url: String,

    /// Model tag served by the inference server
    pub model: String,

    pub rendezvous_timeout: Duration,
}

/// TextGenerator
/// A generator bound to a checkpoint, streaming tokens from an ollama compatible server
#[derive(Debug, Clone)]
pub struct TextGenerator {
    logger: Logger,
    args: ModelArgs,
    checkpoint: Checkpoint,
    device: Device,
    client: OllamaClient,
}

impl TextGenerator {
    /// Validate the checkpoint against the requested limits and join the distributed group.
    /// Every failure here is a startup error, nothing is retried.
    pub async fn build(
        args: TextGeneratorArgs,
        distributed: &DistributedConfig,
    ) -> Result<Self, BuildError> {
        if args.max_seq_len == 0 || args.max_seq_len > MAX_SUPPORTED_SEQ_LEN {
            return Err(BuildError::InvalidMaxSeqLen {
                got: args.max_seq_len,
                max: MAX_SUPPORTED_SEQ_LEN,
            });
        }
        if args.max_batch_size == 0 {
            return Err(BuildError::InvalidMaxBatchSize);
        }

        let world_size = match args.world_size {
            Some(requested) if requested != distributed.world_size => {
                return Err(BuildError::WorldSizeMismatch {
                    requested,
                    distributed: distributed.world_size,
                })
            }
            _ => distributed.world_size,
        };
        let quantization_mode = args
            .quantization_mode
            .as_deref()
            .map(str::parse::<QuantizationMode>)
            .transpose()?
            .unwrap_or_default();

        info!(
            args.logger,
            "opening checkpoint";
            "ckpt_dir" => args.ckpt_dir.display().to_string(),
            "rank" => distributed.rank,
            "world_size" => world_size
        );
        let checkpoint = Checkpoint::open(&args.ckpt_dir).await?;
        if checkpoint.model_parallel_size() != world_size {
            return Err(BuildError::ShardMismatch {
                shards: checkpoint.model_parallel_size(),
                world_size,
            });
        }

        Rendezvous::new(&args.logger, distributed)
            .with_timeout(args.rendezvous_timeout)
            .join()
            .await?;

        let client = OllamaClient::new(&args.logger, args.ollama_url, args.model)?;

        let mut model_args = checkpoint.params().clone();
        model_args.max_seq_len = args.max_seq_len;
        model_args.max_batch_size = args.max_batch_size;
        model_args.quantization_mode = quantization_mode;

        info!(
            args.logger,
            "generator ready";
            "model" => client.model(),
            "device" => args.device.to_string(),
            "quantization_mode" => quantization_mode.to_string(),
            "vision_chunk_size" => model_args.vision_chunk_size
        );

        Ok(Self {
            logger: args.logger,
            args: model_args,
            checkpoint,
            device: args.device,
            client,
        })
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}

impl Generator for TextGenerator {
    fn args(&self) -> &ModelArgs {
        &self.args
    }

    async fn chat_completion(
        &self,
        batch: Batch,
        config: &GenerationConfig,
    ) -> Result<Vec<TokenStream>, GenerationError> {
        if batch.is_empty() {
            return Err(GenerationError::EmptyBatch);
        }
        if batch.len() > self.args.max_batch_size {
            return Err(GenerationError::BatchTooLarge {
                len: batch.len(),
                max: self.args.max_batch_size,
            });
        }

        let request_id = nanoid!();
        info!(
            self.logger,
            "starting chat completion";
            "request_id" => &request_id,
            "dialogs" => batch.len(),
            "max_gen_len" => config.max_gen_len()
        );

        let mut streams = Vec::with_capacity(batch.len());
        for (position, dialog) in batch.into_iter().enumerate() {
            let (tx, stream) = token_channel();
            let client = self.client.clone();
            let config = *config;
            let max_seq_len = self.args.max_seq_len;
            let device = self.device.clone();
            let request_id = format!("{request_id}/{position}");
            tokio::spawn(async move {
                client
                    .stream_chat(&request_id, &dialog, &config, max_seq_len, &device, tx)
                    .await
            });
            streams.push(stream);
        }
        Ok(streams)
    }
}
