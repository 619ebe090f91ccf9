//! Fabula - 分阶段长篇小说生成
//!
//! 子命令：
//! - run: 进程内运行流水线
//! - serve: 启动任务 Worker 与 HTTP API
//! - export: 将最新检查点导出为 Markdown 书稿

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use fabula::application::{
    validate_job_config, validate_project_id, CheckpointPort, Concept, JobConfig, NoopHooks,
};
use fabula::config::{load_config_from_path, print_config, AppConfig, LogConfig};
use fabula::domain::content::Stage;
use fabula::infrastructure::adapters::{
    FileCheckpointStore, HttpModelClient, HttpModelClientConfig, InMemoryLoreStore,
    ManuscriptExporter,
};
use fabula::infrastructure::events::EventPublisher;
use fabula::infrastructure::http::dto::JobDefaults;
use fabula::infrastructure::http::{AppState, HttpServer, ServerConfig};
use fabula::infrastructure::memory::InMemoryJobQueue;
use fabula::infrastructure::persistence::sqlite::{
    create_pool, run_migrations, DatabaseConfig, SqliteJobRepository,
};
use fabula::infrastructure::worker::{PipelineFactory, PipelineWorker, PipelineWorkerConfig};

#[derive(Debug, Parser)]
#[command(name = "fabula", version, about = "Staged long-form fiction generation")]
struct Cli {
    /// 配置文件路径（默认搜索 config.toml / config.local.toml）
    #[arg(long, env = "FABULA_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the pipeline in-process
    Run(RunArgs),
    /// Start the job worker and HTTP API
    Serve,
    /// Export the latest checkpoint as a Markdown manuscript
    Export {
        #[arg(long)]
        project_id: String,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long)]
    project_id: String,

    /// 概念文件：第 1-3 行依次为标题、前提、类型
    #[arg(long)]
    concept: PathBuf,

    #[arg(long)]
    num_books: Option<u32>,

    #[arg(long)]
    chapters_per_book: Option<u32>,

    #[arg(long)]
    target_word_count: Option<u32>,

    #[arg(long)]
    scenes_per_chapter: Option<u32>,

    #[arg(long)]
    preset: Option<String>,

    /// 从最新检查点记录的已完成阶段之后继续
    #[arg(long)]
    resume: bool,

    /// 完成该阶段后停止（series, book, chapter, scene, beat, prose）
    #[arg(long, value_parser = parse_stage)]
    stop_after: Option<Stage>,

    #[arg(long)]
    no_lore: bool,
}

fn parse_stage(s: &str) -> Result<Stage, String> {
    Stage::from_str(s).ok_or_else(|| format!("unknown stage '{}'", s))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 优先级：环境变量 > 配置文件 > 默认值
    let config = load_config_from_path(cli.config.as_deref())
        .map_err(|e| anyhow!("Failed to load config: {}", e))?;

    init_tracing(&config.log);
    print_config(&config);

    match cli.command {
        Command::Run(args) => run(&config, args).await,
        Command::Serve => serve(&config).await,
        Command::Export { project_id } => export(&config, &project_id).await,
    }
}

fn init_tracing(log: &LogConfig) {
    let log_filter = format!("{},fabula={},tower_http=debug", log.level, log.level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));

    if log.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// 模型、设定库与检查点在进程内共享
async fn build_factory(config: &AppConfig) -> anyhow::Result<PipelineFactory> {
    let mut client_config = HttpModelClientConfig::new(&config.model.url)
        .with_timeout(config.model.timeout_secs);
    if let Some(key) = &config.model.api_key {
        client_config = client_config.with_api_key(key);
    }
    let model = Arc::new(HttpModelClient::new(client_config)?);
    let checkpoints = Arc::new(FileCheckpointStore::new(&config.storage.checkpoint_dir).await?);

    let mut factory = PipelineFactory::new(model, checkpoints, &config.model.default_model)
        .with_api_policy(config.model.retry_policy())
        .with_retries(config.pipeline.max_retries, config.pipeline.gate_retries)
        .with_base_settings(config.pipeline.settings(config.lore.enabled));
    if config.lore.enabled {
        factory = factory.with_lore(
            Arc::new(InMemoryLoreStore::new(config.lore.dimension)),
            config.lore.top_k,
        );
    }
    Ok(factory)
}

async fn run(config: &AppConfig, args: RunArgs) -> anyhow::Result<()> {
    let text = tokio::fs::read_to_string(&args.concept)
        .await
        .with_context(|| format!("Failed to read concept file {}", args.concept.display()))?;
    let concept = Concept::parse(&text)
        .ok_or_else(|| anyhow!("Concept file needs at least a title and a premise line"))?;

    let pipeline_defaults = &config.pipeline;
    let job = JobConfig {
        concept,
        book_count: args.num_books.unwrap_or(pipeline_defaults.book_count),
        chapters_per_book: args
            .chapters_per_book
            .unwrap_or(pipeline_defaults.chapters_per_book),
        target_word_count: args
            .target_word_count
            .unwrap_or(pipeline_defaults.target_word_count),
        scenes_per_chapter: args
            .scenes_per_chapter
            .unwrap_or(pipeline_defaults.scenes_per_chapter),
        preset: args.preset.unwrap_or_else(|| config.model.preset.clone()),
        use_lore: config.lore.enabled && !args.no_lore,
        resume_from: None,
    };
    validate_project_id(&args.project_id)?;
    validate_job_config(&job)?;

    let mut factory = build_factory(config).await?;
    if args.stop_after.is_some() {
        let mut settings = config.pipeline.settings(config.lore.enabled);
        settings.stop_after = args.stop_after;
        factory = factory.with_base_settings(settings);
    }

    let resume_from = if args.resume {
        resume_point(factory.checkpoints().as_ref(), &args.project_id).await?
    } else {
        None
    };
    if resume_from == Some(Stage::Prose) {
        tracing::info!(project_id = %args.project_id, "All stages already complete, nothing to resume");
        return Ok(());
    }

    let pipeline = factory.build(&job)?;
    let mut project = pipeline
        .prepare(&args.project_id, &job.concept, resume_from)
        .await?;

    tracing::info!(
        project_id = %args.project_id,
        books = job.book_count,
        chapters_per_book = job.chapters_per_book,
        resume_from = ?resume_from,
        "Pipeline run started"
    );

    if let Err(e) = pipeline.run(&mut project, resume_from, &NoopHooks).await {
        if let Some(path) = pipeline.write_error_report(&project, &e).await {
            tracing::error!(path = %path.display(), "Error report written");
        }
        return Err(anyhow!(e).context(format!("Pipeline halted for project {}", args.project_id)));
    }

    tracing::info!(
        project_id = %args.project_id,
        words = project.series.total_word_count(),
        iteration = project.metadata.iteration,
        "Pipeline run finished"
    );
    Ok(())
}

/// 最新检查点的已完成阶段；没有检查点时从头开始
async fn resume_point(
    checkpoints: &dyn CheckpointPort,
    project_id: &str,
) -> anyhow::Result<Option<Stage>> {
    if !checkpoints.exists(project_id).await {
        tracing::warn!(project_id = %project_id, "No checkpoint to resume from, starting fresh");
        return Ok(None);
    }
    let project = checkpoints.load(project_id).await?;
    Ok(project.metadata.completed_stage)
}

async fn serve(config: &AppConfig) -> anyhow::Result<()> {
    ensure_parent_dir(Path::new(&config.database.path)).await?;

    let db_config = DatabaseConfig {
        database_url: config.database.database_url(),
        max_connections: config.database.max_connections,
    };
    let pool = create_pool(&db_config).await?;
    run_migrations(&pool).await?;

    let job_repo = Arc::new(SqliteJobRepository::new(pool));
    let (job_queue, queue_rx) = InMemoryJobQueue::channel(config.worker.queue_capacity);
    let job_queue = job_queue.arc();
    let event_publisher = EventPublisher::new().arc();
    let factory = Arc::new(build_factory(config).await?);

    let worker = PipelineWorker::new(
        PipelineWorkerConfig {
            poll_timeout: Duration::from_millis(config.worker.poll_timeout_ms),
        },
        queue_rx,
        job_repo.clone(),
        job_queue.clone(),
        factory,
        event_publisher.clone(),
    );
    let shutdown = CancellationToken::new();
    let worker_handle = tokio::spawn(worker.run(shutdown.clone()));

    let state = AppState::new(job_repo, job_queue, event_publisher)
        .with_job_defaults(JobDefaults {
            book_count: config.pipeline.book_count,
            chapters_per_book: config.pipeline.chapters_per_book,
            target_word_count: config.pipeline.target_word_count,
            scenes_per_chapter: config.pipeline.scenes_per_chapter,
            preset: config.model.preset.clone(),
            use_lore: config.lore.enabled,
        })
        .with_log_tail(config.worker.log_tail);
    let server = HttpServer::new(
        ServerConfig::new(&config.server.host, config.server.port),
        state,
    );

    server
        .run_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
            }
            tracing::info!("Received shutdown signal");
        })
        .await?;

    // 运行中的任务在下一个阶段或单元边界暂停，之后可恢复
    shutdown.cancel();
    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "Worker task failed");
    }
    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn export(config: &AppConfig, project_id: &str) -> anyhow::Result<()> {
    let checkpoints = FileCheckpointStore::new(&config.storage.checkpoint_dir).await?;
    let project = checkpoints
        .load(project_id)
        .await
        .with_context(|| format!("Failed to load checkpoint for project {}", project_id))?;

    let path = ManuscriptExporter::new(&config.storage.manuscript_dir)
        .export(&project)
        .await?;
    tracing::info!(project_id = %project_id, path = %path.display(), "Export complete");
    Ok(())
}

async fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent).await,
        _ => Ok(()),
    }
}
