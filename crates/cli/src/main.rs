#![deny(warnings)]

use anyhow::Context;
use clap::{ArgGroup, Args, Parser, Subcommand};
use script2self_core::config::{
    resolve_api_key, resolve_flag, resolve_port, resolve_string_with_default, ApiKeys, AppConfig,
    Env, LanguageModelConfig, ServerConfig, StdEnv, VoiceConfig, DEFAULT_ASSETS_DIR,
    DEFAULT_ELEVENLABS_BASE_URL, DEFAULT_ELEVENLABS_MODEL_ID, DEFAULT_ELEVENLABS_VOICE_ID,
    DEFAULT_FRONTEND_URL, DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL, ENV_ASSETS_DIR,
    ENV_DEV_MODE, ENV_ELEVENLABS_API_KEY, ENV_ELEVENLABS_BASE_URL, ENV_ELEVENLABS_MODEL_ID,
    ENV_ELEVENLABS_VOICE_ID, ENV_FRONTEND_URL, ENV_OPENAI_API_KEY, ENV_OPENAI_BASE_URL,
    ENV_OPENAI_MODEL, ENV_PORT,
};
use script2self_core::emotion::{EmotionClassifier, OpenAiEmotionClassifier};
use script2self_core::http;
use script2self_core::pipeline::Pipeline;
use script2self_core::video::FfmpegVideoAssembler;
use script2self_core::voice::{DisabledSpeechClient, ElevenLabsSpeechClient, SpeechClient};
use script2self_core::workspace::AssetDirs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "script2self")]
#[command(about = "Turn a short text into an emotion-styled, narrated video")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct CommonArgs {
    #[arg(long, global = true)]
    openai_api_key: Option<String>,

    #[arg(long, global = true)]
    openai_model: Option<String>,

    #[arg(long, global = true)]
    elevenlabs_api_key: Option<String>,

    #[arg(long, global = true)]
    elevenlabs_voice_id: Option<String>,

    /// Root for generated audio, video and frames.
    #[arg(long, global = true)]
    assets_dir: Option<String>,

    /// Use ffmpeg from PATH instead of fetching a copy on first use.
    #[arg(long, global = true)]
    no_ffmpeg_download: bool,

    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API.
    Serve(ServeArgs),
    /// Run the whole pipeline once and print the result as JSON.
    Generate(TextInput),
    /// Classify the text and print the emotion record as JSON.
    Analyze(TextInput),
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    frontend_url: Option<String>,

    /// Include internal error details in 5xx responses.
    #[arg(long)]
    dev: bool,
}

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("source")
        .required(true)
        .multiple(false)
        .args(["text", "text_file"])
))]
struct TextInput {
    #[arg(long)]
    text: Option<String>,

    #[arg(long)]
    text_file: Option<PathBuf>,
}

impl TextInput {
    async fn read(self) -> anyhow::Result<String> {
        match (self.text, self.text_file) {
            (Some(text), None) => Ok(text),
            (None, Some(path)) => tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display())),
            _ => anyhow::bail!("exactly one of --text or --text-file must be provided"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env must be applied before any config is resolved.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(&cli.common.log_level)?;

    let env = StdEnv;
    let cfg = build_config(&cli.common, &env)?;

    tracing::info!(
        assets_dir = %cfg.assets_dir.display(),
        model = %cfg.language_model.model,
        voice_enabled = cfg.api_keys.elevenlabs.is_some(),
        "config loaded"
    );

    let pipeline = build_pipeline(&cfg, !cli.common.no_ffmpeg_download)?;
    pipeline
        .assets()
        .ensure()
        .await
        .with_context(|| format!("failed to create {}", cfg.assets_dir.display()))?;

    match cli.command {
        Command::Serve(args) => {
            let server = build_server_config(args, &env)?;
            serve(pipeline, &server).await
        }
        Command::Generate(input) => {
            let text = input.read().await?;
            let output = pipeline.run(&text).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Command::Analyze(input) => {
            let text = input.read().await?;
            let record = pipeline.classify(&text).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
    }
}

fn build_pipeline(cfg: &AppConfig, auto_download_ffmpeg: bool) -> anyhow::Result<Pipeline> {
    let Some(openai_key) = cfg.api_keys.openai.clone() else {
        anyhow::bail!("OpenAI API key is required for emotion analysis (--openai-api-key or {ENV_OPENAI_API_KEY})");
    };
    let classifier: Arc<dyn EmotionClassifier> = Arc::new(OpenAiEmotionClassifier::from_config(
        openai_key,
        &cfg.language_model,
    ));

    let speech: Arc<dyn SpeechClient> = match cfg.api_keys.elevenlabs.clone() {
        Some(key) => Arc::new(ElevenLabsSpeechClient::from_config(key, &cfg.voice)),
        None => {
            tracing::warn!("no ElevenLabs API key, voice requests will return the local fallback");
            Arc::new(DisabledSpeechClient)
        }
    };

    Ok(Pipeline::new(
        classifier,
        speech,
        Arc::new(FfmpegVideoAssembler::new(auto_download_ffmpeg)),
        AssetDirs::new(&cfg.assets_dir),
    ))
}

async fn serve(pipeline: Pipeline, server: &ServerConfig) -> anyhow::Result<()> {
    let app = http::router(pipeline, server);
    let listener = tokio::net::TcpListener::bind(server.bind)
        .await
        .with_context(|| format!("failed to bind {}", server.bind))?;

    tracing::info!(
        addr = %server.bind,
        frontend = %server.frontend_origin,
        dev = server.expose_error_details,
        "server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn build_config(args: &CommonArgs, env: &impl Env) -> anyhow::Result<AppConfig> {
    let openai = resolve_api_key(args.openai_api_key.clone(), ENV_OPENAI_API_KEY, env)?;
    let elevenlabs = resolve_api_key(args.elevenlabs_api_key.clone(), ENV_ELEVENLABS_API_KEY, env)?;

    let language_model = LanguageModelConfig {
        base_url: resolve_string_with_default(None, ENV_OPENAI_BASE_URL, env, DEFAULT_OPENAI_BASE_URL),
        model: resolve_string_with_default(
            args.openai_model.clone(),
            ENV_OPENAI_MODEL,
            env,
            DEFAULT_OPENAI_MODEL,
        ),
    };

    let voice = VoiceConfig {
        base_url: resolve_string_with_default(
            None,
            ENV_ELEVENLABS_BASE_URL,
            env,
            DEFAULT_ELEVENLABS_BASE_URL,
        ),
        voice_id: resolve_string_with_default(
            args.elevenlabs_voice_id.clone(),
            ENV_ELEVENLABS_VOICE_ID,
            env,
            DEFAULT_ELEVENLABS_VOICE_ID,
        ),
        model_id: resolve_string_with_default(
            None,
            ENV_ELEVENLABS_MODEL_ID,
            env,
            DEFAULT_ELEVENLABS_MODEL_ID,
        ),
    };

    let assets_dir = PathBuf::from(resolve_string_with_default(
        args.assets_dir.clone(),
        ENV_ASSETS_DIR,
        env,
        DEFAULT_ASSETS_DIR,
    ));

    Ok(AppConfig {
        api_keys: ApiKeys { openai, elevenlabs },
        language_model,
        voice,
        assets_dir,
    })
}

fn build_server_config(args: ServeArgs, env: &impl Env) -> anyhow::Result<ServerConfig> {
    let port = resolve_port(args.port, ENV_PORT, env)?;
    Ok(ServerConfig {
        bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
        frontend_origin: resolve_string_with_default(
            args.frontend_url,
            ENV_FRONTEND_URL,
            env,
            DEFAULT_FRONTEND_URL,
        ),
        expose_error_details: resolve_flag(args.dev, ENV_DEV_MODE, env),
    })
}
