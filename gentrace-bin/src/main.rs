use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use futures_util::StreamExt;
use gentrace_core::{
    backend_factory::BackendKind,
    client::InstrumentedClient,
    config::Config,
    model::{EmbedConfig, GenerateConfig},
    telemetry::{MetricsRecorder, init_telemetry},
};
use tracing::info;

#[derive(Parser)]
#[command(author, version, about = "Instrumented generative-AI CLI", long_about = None)]
struct Cli {
    /// Config file (JSON or TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the offline echo backend instead of Gemini
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GenerationOpts {
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    temperature: Option<f32>,
    #[arg(long)]
    top_p: Option<f32>,
    #[arg(long)]
    top_k: Option<u32>,
    #[arg(long)]
    max_output_tokens: Option<u32>,
    #[arg(long = "stop")]
    stop_sequences: Vec<String>,
}

impl GenerationOpts {
    fn config(&self) -> Option<GenerateConfig> {
        let cfg = GenerateConfig {
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            max_output_tokens: self.max_output_tokens,
            stop_sequences: (!self.stop_sequences.is_empty()).then(|| self.stop_sequences.clone()),
        };
        (cfg != GenerateConfig::default()).then_some(cfg)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate content for a prompt
    Generate {
        #[arg(short, long, help = "Prompt text")]
        prompt: String,
        #[command(flatten)]
        opts: GenerationOpts,
    },
    /// Stream generated content (prints chunks live)
    Stream {
        #[arg(short, long, help = "Prompt text")]
        prompt: String,
        #[command(flatten)]
        opts: GenerationOpts,
    },
    /// Embed a piece of text
    Embed {
        #[arg(short, long, help = "Input text")]
        input: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        dimensions: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = match &cli.config {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };

    let (providers, instruments) = init_telemetry(&cfg.telemetry)?;
    let metrics: Arc<dyn MetricsRecorder> = instruments;

    let kind = if cli.offline {
        BackendKind::Null
    } else {
        BackendKind::Gemini
    };
    let result = match InstrumentedClient::from_config_with(kind, &cfg, metrics) {
        Ok(client) => run(&client, cli.command).await,
        Err(e) => Err(e.into()),
    };

    providers.shutdown();
    result
}

async fn run(client: &InstrumentedClient, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Generate { prompt, opts } => {
            let resp = client
                .generate_content(&prompt, opts.model.as_deref(), opts.config())
                .await?;
            println!("{}", resp.text);
            if let Some(ratings) = resp.safety_ratings {
                for r in ratings {
                    eprintln!("[safety: {} = {}]", r.category, r.probability);
                }
            }
        }
        Commands::Stream { prompt, opts } => {
            let mut stream = client
                .generate_content_stream(&prompt, opts.model.as_deref(), opts.config())
                .await?;
            let mut saw_chunk = false;
            while let Some(item) = stream.next().await {
                let chunk = item?;
                saw_chunk = true;
                print!("{}", chunk.text);
                io::stdout().flush().ok();
            }
            if saw_chunk {
                println!();
            }
        }
        Commands::Embed {
            input,
            model,
            dimensions,
        } => {
            let config = dimensions.map(|d| EmbedConfig {
                output_dimensionality: Some(d),
            });
            let values = client
                .embed_content(&input, model.as_deref(), config)
                .await?;
            info!(dimensions = values.len(), "embedding received");
            let preview: Vec<String> = values.iter().take(8).map(|v| format!("{v:.4}")).collect();
            println!("dim={} [{}]", values.len(), preview.join(", "));
        }
    }
    Ok(())
}
