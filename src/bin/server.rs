use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use log::info;
use tokio::net::TcpListener;

use subcast::access::{AccessService, GenerateViewerTokenRequest, MemoryAccessStore};
use subcast::activity::{Activity, ActivityStatus, MemoryActivityStore};
use subcast::broadcast::SubtitleBroadcaster;
use subcast::config::{Config, SpeechBackend};
use subcast::pipeline::TranslationPipeline;
use subcast::server::{router, AppState};
use subcast::speech::{MockRecognizer, RemoteRecognizer, SpeechRecognizer};
use subcast::translate::{HttpTranslator, MockTranslator, Translator};

#[derive(Default, Debug, Copy, Clone, clap::ValueEnum)]
enum Level {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Level::Error => "error",
            Level::Warn => "warn",
            Level::Info => "info",
            Level::Debug => "debug",
            Level::Trace => "trace",
        };
        write!(f, "{name}")
    }
}

impl From<Level> for log::LevelFilter {
    fn from(level: Level) -> Self {
        match level {
            Level::Error => log::LevelFilter::Error,
            Level::Warn => log::LevelFilter::Warn,
            Level::Info => log::LevelFilter::Info,
            Level::Debug => log::LevelFilter::Debug,
            Level::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Parser)]
#[command(name = "subcast")]
#[command(version = "0.1.0")]
#[command(about = "Live multi-language subtitle relay", long_about = None)]
struct Cli {
    #[arg(long, default_value_t = format!("0.0.0.0"))]
    host: String,

    /// Overrides APP_PORT when set.
    #[arg(long)]
    port: Option<u16>,

    #[arg(short, long, default_value_t = Level::Info)]
    #[clap(value_enum)]
    level: Level,

    /// Seed a published demo activity and print ready-to-use credentials.
    #[arg(long)]
    demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{}:{} [{}] {} - {}",
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.level(),
                chrono::Local::now().format("%H:%M:%S.%6f"),
                record.args()
            )
        })
        .filter(None, cli.level.into())
        .init();

    let mut config = Config::load()?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let recognizer: Arc<dyn SpeechRecognizer> = match config.speech.backend {
        SpeechBackend::Mock => Arc::new(MockRecognizer::new()),
        SpeechBackend::Remote => Arc::new(
            RemoteRecognizer::new(&config.speech.stt_server_addr)
                .with_connect_timeout(config.speech.connect_timeout),
        ),
    };
    let translator: Arc<dyn Translator> = match config.speech.backend {
        SpeechBackend::Mock => Arc::new(MockTranslator::new()),
        SpeechBackend::Remote => Arc::new(HttpTranslator::new(
            &config.speech.translate_api_url,
            &config.speech.translate_api_key,
        )),
    };

    let activities = Arc::new(MemoryActivityStore::new());
    let access_store = Arc::new(MemoryAccessStore::new());
    let access = Arc::new(AccessService::new(
        activities.clone(),
        access_store,
        &config.viewer_base_url,
    ));
    let pipeline = Arc::new(TranslationPipeline::new(recognizer, translator));
    let broadcaster = Arc::new(SubtitleBroadcaster::new());

    if cli.demo {
        seed_demo(&activities, &access, &config).await?;
    }

    let state = AppState {
        access,
        pipeline: pipeline.clone(),
        broadcaster: broadcaster.clone(),
        activities,
    };
    let app = router(state, &config.server.allowed_origins);

    let addr: SocketAddr = format!("{}:{}", cli.host, config.server.port).parse()?;
    info!("Starting subtitle relay on {addr}");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    // Unwind live sessions so worker tasks stop before the process exits.
    pipeline.shutdown();
    info!("Subtitle relay stopped");
    Ok(())
}

/// Seed one published activity and print credentials for a quick manual
/// round-trip against the mock backends.
async fn seed_demo(
    activities: &MemoryActivityStore,
    access: &AccessService,
    config: &Config,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let activity = Activity {
        id: "demo".to_string(),
        title: "Demo activity".to_string(),
        description: "Seeded by --demo".to_string(),
        speaker: "Demo speaker".to_string(),
        start_time: now,
        end_time: None,
        input_language: "zh-CN".to_string(),
        target_languages: vec!["en".to_string(), "ja".to_string()],
        cover_url: String::new(),
        status: ActivityStatus::Published,
        viewer_url: format!("{}/activity/demo", config.viewer_base_url),
        created_at: now,
        updated_at: now,
    };
    activities.insert(activity);

    let speaker = access.generate_speaker_token("demo").await?;
    let viewer = access
        .generate_viewer_token("demo", &GenerateViewerTokenRequest::default())
        .await?;

    info!("Demo activity ready: id=demo input=zh-CN targets=en,ja");
    info!("  speaker: /ws/speaker?activityId=demo&language=zh-CN&token={}", speaker.value);
    info!("  viewer:  /ws/viewer?activityId=demo&language=en&token={}", viewer.value);
    Ok(())
}
