use std::time::Duration;

use anyhow::{Context, Result};
use clap::{value_parser, Arg, Command};
use taskly::app::{AppMode, Application, CliOverrides};
use taskly::shutdown::{wait_for_shutdown_signal, ShutdownManager};
use taskly_core::{init_logging, AppConfig};
use taskly_infrastructure::init_prometheus_exporter;
use tracing::{error, info, warn};

/// 收到关闭信号后等待各组件退出的上限
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("taskly")
        .version(env!("CARGO_PKG_VERSION"))
        .about("分布式任务调度系统")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("运行模式")
                .value_parser(["coordinator", "scheduler", "worker", "all"])
                .default_value("all"),
        )
        .arg(
            Arg::new("coordinator-port")
                .long("coordinator-port")
                .value_name("PORT")
                .help("协调器RPC监听端口")
                .value_parser(value_parser!(u16)),
        )
        .arg(
            Arg::new("scheduler-port")
                .long("scheduler-port")
                .value_name("PORT")
                .help("任务提交服务监听端口")
                .value_parser(value_parser!(u16)),
        )
        .arg(
            Arg::new("worker-port")
                .long("worker-port")
                .value_name("PORT")
                .help("Worker RPC监听端口")
                .value_parser(value_parser!(u16)),
        )
        .arg(
            Arg::new("coordinator")
                .long("coordinator")
                .value_name("ADDRESS")
                .help("协调器地址 (仅在worker模式下使用)"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config");
    let mode: AppMode = matches
        .get_one::<String>("mode")
        .map(String::as_str)
        .unwrap_or("all")
        .parse()?;

    let mut config = AppConfig::load(config_path.map(String::as_str)).context("加载配置失败")?;
    CliOverrides {
        coordinator_port: matches.get_one::<u16>("coordinator-port").copied(),
        scheduler_port: matches.get_one::<u16>("scheduler-port").copied(),
        worker_port: matches.get_one::<u16>("worker-port").copied(),
        coordinator: matches.get_one::<String>("coordinator").cloned(),
    }
    .apply(&mut config);
    config.validate()?;

    let log_level = matches
        .get_one::<String>("log-level")
        .unwrap_or(&config.observability.log_level);
    let log_format = matches
        .get_one::<String>("log-format")
        .unwrap_or(&config.observability.log_format);
    init_logging(log_level, log_format)?;

    info!(mode = ?mode, "启动分布式任务调度系统");

    if config.observability.metrics_enabled {
        init_prometheus_exporter(&config.observability.metrics_bind_address)?;
    }

    let app = Application::new(config, mode)?;
    let shutdown_manager = ShutdownManager::new();
    let shutdown_rx = shutdown_manager.subscribe().await;
    let mut app_handle = tokio::spawn(async move { app.run(shutdown_rx).await });

    tokio::select! {
        result = &mut app_handle => {
            // 启动阶段失败（例如数据库重试耗尽）时直接退出
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    error!(error = %format!("{e:#}"), "应用运行失败");
                    Err(e)
                }
                Err(e) => Err(anyhow::anyhow!("应用任务异常退出: {e}")),
            };
        }
        _ = wait_for_shutdown_signal() => {}
    }

    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown().await;

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, app_handle).await {
        Ok(Ok(Ok(()))) => info!("应用已优雅关闭"),
        Ok(Ok(Err(e))) => error!(error = %format!("{e:#}"), "应用关闭时发生错误"),
        Ok(Err(e)) => error!(error = %e, "应用任务异常退出"),
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    info!("分布式任务调度系统已退出");
    Ok(())
}
