use anyhow::{anyhow, Result};
use clap::{Parser, ValueEnum};
use llama_chat_core::{
    device::Device,
    distributed::{bootstrap, DistributedConfig, ProcessConfig},
    generation::{GenerationConfig, Generator},
};
use llama_chat_plugins::text_generation::{TextGenerator, TextGeneratorArgs, DEFAULT_OLLAMA_URL};
use llama_chat_runtime::{build_batch, ChatDriver, ChatOutput, ConsoleOutput};
use slog::{info, Drain, Level, Logger};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, ValueEnum)]
enum LoggingMode {
    Stdout,
    File,
    None,
}

#[derive(Parser, Debug, Clone)]
struct Args {
    /// Checkpoint directory holding params.json and the *.pth shards
    #[clap(long, env)]
    pub ckpt_dir: PathBuf,

    /// Sampling temperature
    #[clap(long, default_value = "0.5", env)]
    pub temperature: f32,

    /// Nucleus sampling threshold
    #[clap(long, default_value = "0.8", env)]
    pub top_p: f32,

    /// Maximum sequence length, also used as the generation budget
    #[clap(long, default_value = "1024", env)]
    pub max_seq_len: usize,

    /// Maximum number of dialogs per batch
    #[clap(long, default_value = "4", env)]
    pub max_batch_size: usize,

    /// Number of cooperating processes, overrides WORLD_SIZE when it is unset
    #[clap(long)]
    pub world_size: Option<usize>,

    /// Quantization mode: none, fp8_mixed or int4_mixed
    #[clap(long, env)]
    pub quantization_mode: Option<String>,

    /// Image used by the vision example
    #[clap(long, default_value = "resources/dog.jpg", env)]
    pub image_path: PathBuf,

    /// Inference server base url
    #[clap(long, default_value = DEFAULT_OLLAMA_URL, env)]
    pub ollama_url: String,

    /// Model tag served by the inference server
    #[clap(long, default_value = "llama3.2", env)]
    pub model: String,

    /// Seconds to wait for every rank to join
    #[clap(long, default_value = "60", env)]
    pub rendezvous_timeout: u64,

    /// Logging mode
    #[clap(long, default_value = "none", env)]
    pub log_mode: LoggingMode,

    /// Log level
    #[clap(long, default_value = "info", env)]
    pub log_level: String,

    /// Log path
    #[clap(long, default_value = "./debug.log", env)]
    pub log_path: String,
}

impl Args {
    /// Sampling settings, checked before any slow startup work
    fn generation_config(&self) -> Result<GenerationConfig> {
        Ok(GenerationConfig::new(
            self.temperature,
            self.top_p,
            self.max_seq_len,
        )?)
    }
}

fn get_logger(args: &Args) -> Result<Logger> {
    let level = Level::from_str(&args.log_level)
        .map_err(|_| anyhow!("invalid log level: {}", args.log_level))?;

    match args.log_mode {
        LoggingMode::File => {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&args.log_path)?;

            let decorator = slog_term::PlainSyncDecorator::new(file);
            let drain = slog_term::FullFormat::new(decorator).build().fuse();
            let drain = slog_async::Async::new(drain)
                .overflow_strategy(slog_async::OverflowStrategy::Block)
                .build()
                .filter_level(level)
                .fuse();
            Ok(slog::Logger::root(drain, slog::o!()))
        }
        LoggingMode::Stdout => {
            let decorator = slog_term::TermDecorator::new().build();
            let drain = slog_term::FullFormat::new(decorator).build().fuse();
            let drain = slog_async::Async::new(drain)
                .overflow_strategy(slog_async::OverflowStrategy::Block)
                .build()
                .filter_level(level)
                .fuse();
            Ok(slog::Logger::root(drain, slog::o!()))
        }
        LoggingMode::None => Ok(slog::Logger::root(slog::Discard, slog::o!())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse the command line arguments
    let args = Args::parse();
    let config = args.generation_config()?;
    let logger = get_logger(&args)?;

    // Fill in whatever the launcher left unset, then read the result once
    let mut process_config = ProcessConfig::from_env();
    bootstrap(&mut process_config, args.world_size);
    let distributed = DistributedConfig::resolve(&process_config)?;
    let device = Device::select(&process_config);
    let logger = logger.new(slog::o!("rank" => distributed.rank));
    info!(logger, "starting"; "world_size" => distributed.world_size, "device" => device.to_string());

    // Build the generator, this joins the distributed group
    let generator = TextGenerator::build(
        TextGeneratorArgs {
            logger: logger.clone(),
            ckpt_dir: args.ckpt_dir.clone(),
            max_seq_len: args.max_seq_len,
            max_batch_size: args.max_batch_size,
            world_size: args.world_size,
            quantization_mode: args.quantization_mode.clone(),
            device,
            ollama_url: args.ollama_url.clone(),
            model: args.model.clone(),
            rendezvous_timeout: Duration::from_secs(args.rendezvous_timeout),
        },
        &distributed,
    )
    .await?;

    let mut output = ConsoleOutput::stdout();
    let plan = build_batch(&logger, generator.args(), &args.image_path).await?;
    if distributed.is_leader() {
        for notice in &plan.notices {
            output.notice(notice)?;
        }
    }

    // Run every dialog, one completion at a time, on the leader only
    let driver = ChatDriver::new(&logger, generator, config).with_leader(distributed.is_leader());
    driver.run(&plan.dialogs, &mut output).await?;

    Ok(())
}
