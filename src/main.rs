use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use movie_gen::config::ConfigLoader;
use movie_gen::generation::HttpGenerationBackend;
use movie_gen::pipeline::ScenePipeline;
use movie_gen::publisher::HttpPublisher;
use movie_gen::scene::SceneSpec;
use movie_gen::script::parse_scene_script;

/// 场景合成工具 - 按脚本逐场景生成素材并拼接发布成片
#[derive(Parser, Debug)]
#[command(name = "movie-gen")]
#[command(about = "场景合成工具：生成画面与音轨、拼接成片并发布", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// CLI 模式：从本地脚本文件生成并发布成片
    Generate {
        /// 脚本文件路径（结构化 JSON 场景数组，或内嵌数组的自由文本）
        #[arg(short, long)]
        script: PathBuf,

        /// 配置文件路径（可选，支持 .ini 格式）
        /// 优先级：命令行参数 > 环境变量 > 配置文件 > 默认值
        #[arg(long)]
        config: Option<PathBuf>,

        /// 工作目录（中间产物与成片落盘位置）
        /// 可通过环境变量 MOVIE_GEN_WORKING_DIR 或配置文件设置
        #[arg(short, long)]
        working_dir: Option<PathBuf>,
    },
    /// Web 服务模式：启动 HTTP 服务器接收生成请求
    Serve {
        /// 监听地址（默认从环境变量 MOVIE_GEN_PORT 读取，如果不存在则使用 0.0.0.0:9000）
        #[arg(short, long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    match args.command {
        Commands::Generate {
            script,
            config: config_file,
            working_dir,
        } => {
            let config = ConfigLoader::load_config(config_file.as_deref(), working_dir)
                .context("加载配置失败")?;

            let raw = std::fs::read_to_string(&script)
                .context(format!("读取脚本文件失败: {}", script.display()))?;
            // 先按结构化场景数组解析，失败则当作内嵌数组的自由文本
            let scenes: Vec<SceneSpec> = match serde_json::from_str(&raw) {
                Ok(scenes) => scenes,
                Err(_) => parse_scene_script(&raw).context("解析脚本失败")?,
            };

            println!(
                "使用配置: working_dir={}, 输出分辨率 {}x{}，共 {} 个场景",
                config.working_dir.display(),
                config.output_width,
                config.output_height,
                scenes.len()
            );

            let backend = HttpGenerationBackend::new(&config);
            let publisher = HttpPublisher::new(&config);
            let mut pipeline = ScenePipeline::new(&backend, &publisher, &config);
            let url = pipeline.run(&scenes).await.context("生成成片失败")?;
            println!("成片播放地址: {}", url);
        }
        Commands::Serve { bind } => {
            // 优先使用命令行参数，其次使用环境变量 MOVIE_GEN_PORT，最后使用默认值 9000
            let bind_addr = bind.unwrap_or_else(|| {
                std::env::var("MOVIE_GEN_PORT")
                    .map(|port| format!("0.0.0.0:{}", port))
                    .unwrap_or_else(|_| "0.0.0.0:9000".to_string())
            });
            start_web_server(&bind_addr).await?;
        }
    }

    Ok(())
}

async fn start_web_server(bind: &str) -> Result<()> {
    use axum::{
        routing::{get, post},
        Router,
    };
    use movie_gen::handler;
    use tower_http::cors::CorsLayer;

    let app = Router::new()
        .route("/", get(handler::health_check))
        .route("/health", get(handler::health_check))
        // 成片生成端点
        .route("/generate", post(handler::handle_generate))
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .context(format!("绑定地址失败: {}", bind))?;

    tracing::info!("Web 服务器启动在: http://{}", bind);
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    tracing::info!("可用端点:");
    tracing::info!("  • 健康检查: GET  http://{}/health", bind);
    tracing::info!("  • 成片生成: POST http://{}/generate", bind);
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    axum::serve(listener, app)
        .await
        .context("启动服务器失败")?;

    Ok(())
}
