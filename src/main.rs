//! Addon Host 命令行入口
//!
//! 扩展模块宿主的命令行工具，提供运行、检查和调试功能。
//!
//! # 命令概览
//!
//! - `run` - 加载并启用扩展目录中的所有模块，直到 Ctrl+C
//! - `list` - 列出扩展目录中的模块及其加载顺序
//! - `inspect` - 查看单个模块归档的描述与内容
//! - `check-config` - 验证配置文件
//! - `version` - 显示版本信息
//!
//! # 使用示例
//!
//! ```bash
//! # 使用默认配置运行
//! addon-host run
//!
//! # 使用自定义配置文件运行
//! addon-host -c host.yaml run
//!
//! # 查看归档
//! addon-host inspect data/addons/level.jar
//!
//! # 检查配置文件
//! addon-host check-config -c host.yaml
//! ```

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::signal;
use tracing::{info, warn};

use addon_host::api::host::TracingHost;
use addon_host::module::{DependencyGraph, ModuleArchive, ModuleDescriptor, ModuleParser};
use addon_host::{AddonHost, CoreConfig, LogGuard, Logger, LoggerConfig, ModuleCatalog};

/// Addon Host - 扩展模块宿主
///
/// 发现、加载、链接并监管独立打包的扩展模块。
#[derive(Parser)]
#[command(name = "addon-host")]
#[command(version, about = "扩展模块生命周期运行时", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    /// 日志级别 (trace, debug, info, warn, error)，覆盖配置文件
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// 开发模式（启用更详细的日志）
    #[arg(long, global = true)]
    dev: bool,

    /// 子命令
    #[command(subcommand)]
    command: Option<Commands>,
}

/// 可用的子命令
#[derive(Subcommand)]
enum Commands {
    /// 运行宿主
    ///
    /// 加载并启用扩展目录中的所有模块。按 Ctrl+C 禁用所有模块并退出。
    Run,

    /// 列出扩展目录中的模块
    ///
    /// 只解析描述文件，不调用任何生命周期钩子。
    List,

    /// 查看模块归档
    Inspect {
        /// 归档路径
        archive: PathBuf,
    },

    /// 验证配置文件
    CheckConfig {
        /// 配置文件路径（不指定则使用全局 -c 选项）
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// 查看版本信息
    Version,
}

/// 初始化日志系统
fn init_logging(config: &CoreConfig, level: Option<&str>) -> LogGuard {
    let mut logger_config = LoggerConfig::from_log_config(&config.logging);
    if let Some(level) = level {
        logger_config.level = level.to_string();
    } else if config.dev_mode {
        logger_config.level = "debug".to_string();
    }
    Logger::try_init(logger_config)
}

/// 运行宿主
async fn run(config: CoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut host = AddonHost::with_tracing_host(config, ModuleCatalog::new())?;
    host.start().await?;

    let health = host.health().await;
    println!();
    println!("Addon Host 已启动");
    println!("═══════════════════════════════════════");
    println!("  版本:       {}", addon_host::VERSION);
    println!("  API 版本:   {}", health.api_version);
    println!("  扩展目录:   {}", host.manager().addons_dir().display());
    println!("  模块:       {} 个，已启用 {} 个", health.total_modules, health.enabled_modules);
    println!();
    println!("  按 Ctrl+C 关闭");
    println!("═══════════════════════════════════════");
    println!();

    signal::ctrl_c().await?;

    println!();
    info!("收到关闭信号，正在关闭...");
    host.shutdown().await?;
    Ok(())
}

/// 读取归档并解析描述
async fn read_descriptor(
    path: &Path,
    config: &CoreConfig,
    host: &TracingHost,
) -> addon_host::Result<(ModuleArchive, ModuleDescriptor)> {
    let archive = ModuleArchive::open(path).await?;
    let descriptor = ModuleParser::parse_str(archive.manifest(&config.modules.manifest_file)?, host)?;
    Ok((archive, descriptor))
}

/// 列出扩展目录中的模块
async fn list_modules(config: CoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addons_dir = config.addons_dir();
    let host = TracingHost::new(config.clone());

    println!();
    println!("扩展目录: {}", addons_dir.display());
    println!("═══════════════════════════════════════");

    if !addons_dir.is_dir() {
        println!("  (目录不存在)");
        return Ok(());
    }

    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(&addons_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| config.modules.is_archive_extension(e))
            .unwrap_or(false);
        if matches && path.is_file() {
            paths.push(path);
        }
    }
    let mut descriptors = Vec::new();
    for path in &paths {
        match read_descriptor(path, &config, &host).await {
            Ok((archive, descriptor)) => {
                println!(
                    "  {:<20} {:<10} {} ({})",
                    descriptor.name,
                    descriptor.version,
                    descriptor.main,
                    archive.file_name()
                );
                descriptors.push(descriptor);
            }
            Err(e) => {
                warn!(archive = %path.display(), "无法读取归档");
                println!("  ❌ {}: {}", path.display(), e);
            }
        }
    }

    let order = DependencyGraph::from_descriptors(descriptors.iter()).load_order();
    println!();
    println!("加载顺序: {}", order.order.join(" -> "));
    for (module, dependency) in &order.missing {
        println!("  ⚠️  {} 缺少依赖 {}", module, dependency);
    }
    if !order.cyclic.is_empty() {
        println!("  ⚠️  循环依赖: {}", order.cyclic.join(", "));
    }
    println!("═══════════════════════════════════════");
    Ok(())
}

/// 查看模块归档
async fn inspect(path: &Path, config: CoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    let host = TracingHost::new(config.clone());
    let (archive, descriptor) = read_descriptor(path, &config, &host).await?;

    println!();
    println!("{} {}", descriptor.name, descriptor.version);
    println!("═══════════════════════════════════════");
    println!("  入口点:     {}", descriptor.main);
    println!("  作者:       {}", descriptor.authors_display());
    if let Some(ref api_version) = descriptor.api_version {
        println!("  API 版本:   {}", api_version);
    }
    println!("  依赖:       {}", descriptor.dependencies.join(", "));
    println!("  软依赖:     {}", descriptor.soft_dependencies.join(", "));
    println!("  图标:       {}", descriptor.icon.name());
    println!(
        "  宿主扩展:   {}",
        if archive.contains(&config.modules.host_manifest_file) { "是" } else { "否" }
    );
    println!("  入口符号:   {}", if archive.symbol(&descriptor.main).is_some() { "存在" } else { "缺失" });
    println!();
    println!("  [权限]");
    for node in &descriptor.permissions {
        println!(
            "    {:<30} {:<10} {}",
            node.name,
            node.default.as_deref().unwrap_or("-"),
            node.description.as_deref().unwrap_or("")
        );
    }
    println!();
    println!("  [符号]");
    for symbol in archive.symbols() {
        println!("    {}", symbol);
    }
    println!("═══════════════════════════════════════");
    Ok(())
}

/// 检查配置文件
async fn check_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("检查配置文件: {}", path.display());
    println!();

    if !path.exists() {
        println!("⚠️  警告: 配置文件不存在，将使用默认配置");
        println!();
        print_config(&CoreConfig::default());
        return Ok(());
    }

    match CoreConfig::from_file(path).await {
        Ok(config) => {
            println!("✅ 配置文件有效！");
            println!();
            print_config(&config);
            Ok(())
        }
        Err(e) => {
            println!("❌ 配置文件无效: {}", e);
            Err(Box::new(e))
        }
    }
}

/// 打印配置内容
fn print_config(config: &CoreConfig) {
    println!("配置内容:");
    println!("────────────────────────────────────────");
    println!("  数据目录:       {}", config.data_dir.display());
    println!("  语言:           {}", config.language);
    println!("  开发模式:       {}", if config.dev_mode { "是" } else { "否" });
    println!();
    println!("  [日志配置]");
    println!("    日志级别:     {}", config.logging.level);
    println!("    文件输出:     {}", if config.logging.file_output { "是" } else { "否" });
    println!("    JSON 格式:    {}", if config.logging.json_format { "是" } else { "否" });
    println!();
    println!("  [模块配置]");
    println!("    扩展目录:     {}", config.addons_dir().display());
    println!("    归档扩展名:   {}", config.modules.archive_extensions.join(", "));
    println!("    描述文件:     {}", config.modules.manifest_file);
    println!("    宿主描述文件: {}", config.modules.host_manifest_file);
    println!("    保留前缀:     {}", config.modules.reserved_prefix);
    if config.modules.api_version.trim().is_empty() {
        println!("    API 版本:     (不检查)");
    } else {
        println!("    API 版本:     {}", config.modules.api_version);
    }
    println!("────────────────────────────────────────");
}

/// 打印版本信息
fn print_version() {
    println!();
    println!("Addon Host - 扩展模块宿主");
    println!("═══════════════════════════════════════");
    println!("  版本:             {}", addon_host::VERSION);
    println!("  模块 API 版本:    {}", addon_host::API_VERSION);
    println!();
    println!("构建信息:");
    println!("  目标平台:         {}", std::env::consts::ARCH);
    println!("  操作系统:         {}", std::env::consts::OS);
    println!("═══════════════════════════════════════");
    println!();
}

/// 加载配置文件
async fn load_config(config_path: &Path, dev_mode: bool) -> Result<CoreConfig, Box<dyn std::error::Error>> {
    let mut config = if config_path.exists() {
        CoreConfig::from_file(config_path).await?
    } else {
        CoreConfig::default()
    };
    if dev_mode {
        config.dev_mode = true;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let config = load_config(&cli.config, cli.dev).await?;
            let _guard = init_logging(&config, cli.log_level.as_deref());
            if cli.config.exists() {
                info!("已加载配置文件: {}", cli.config.display());
            } else {
                info!("配置文件不存在 ({})，使用默认配置", cli.config.display());
            }
            run(config).await?;
        }

        Commands::List => {
            let config = load_config(&cli.config, cli.dev).await?;
            let _guard = init_logging(&config, cli.log_level.as_deref());
            list_modules(config).await?;
        }

        Commands::Inspect { archive } => {
            let config = load_config(&cli.config, cli.dev).await?;
            let _guard = init_logging(&config, cli.log_level.as_deref());
            inspect(&archive, config).await?;
        }

        Commands::CheckConfig { config } => {
            let config_path = config.unwrap_or(cli.config);
            check_config(&config_path).await?;
        }

        Commands::Version => print_version(),
    }

    Ok(())
}
