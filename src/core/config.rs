//! 宿主配置
//!
//! 定义扩展宿主的配置结构和加载逻辑。

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::module::metadata::ApiVersion;
use crate::utils::{CoreError, Result};

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否输出到文件
    #[serde(default)]
    pub file_output: bool,

    /// 日志文件目录
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json_format: bool,

    /// 日志轮转策略
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// 保留日志文件数
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

fn default_max_files() -> usize {
    7
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: false,
            log_dir: None,
            json_format: false,
            rotation: default_rotation(),
            max_files: default_max_files(),
        }
    }
}

/// 扩展模块管理配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// 扩展模块目录（为空时使用 `<data_dir>/addons`）
    #[serde(default)]
    pub addons_dir: Option<PathBuf>,

    /// 被识别为模块归档的文件扩展名
    #[serde(default = "default_archive_extensions")]
    pub archive_extensions: Vec<String>,

    /// 归档内描述文件的条目名
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,

    /// 宿主原生扩展额外携带的描述条目名
    #[serde(default = "default_host_manifest_file")]
    pub host_manifest_file: String,

    /// 宿主保留的符号前缀，模块不得解析或声明该前缀下的名字
    #[serde(default = "default_reserved_prefix")]
    pub reserved_prefix: String,

    /// 宿主提供的 API 版本，为空时接受任何模块声明的版本
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

fn default_archive_extensions() -> Vec<String> {
    vec!["jar".to_string(), "zip".to_string()]
}

fn default_manifest_file() -> String {
    "addon.yml".to_string()
}

fn default_host_manifest_file() -> String {
    "host.yml".to_string()
}

fn default_reserved_prefix() -> String {
    "addon_host.".to_string()
}

fn default_api_version() -> String {
    String::new()
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            addons_dir: None,
            archive_extensions: default_archive_extensions(),
            manifest_file: default_manifest_file(),
            host_manifest_file: default_host_manifest_file(),
            reserved_prefix: default_reserved_prefix(),
            api_version: default_api_version(),
        }
    }
}

impl ModuleConfig {
    /// 判断文件扩展名是否属于模块归档（忽略大小写）
    pub fn is_archive_extension(&self, extension: &str) -> bool {
        self.archive_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(extension))
    }

    /// 用于兼容性检查的宿主 API 版本，未配置或无效时为 `None`
    pub fn host_api_version(&self) -> Option<ApiVersion> {
        if self.api_version.trim().is_empty() {
            return None;
        }
        ApiVersion::parse(&self.api_version)
    }
}

/// 宿主配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// 配置文件路径
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// 数据目录
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// 宿主配置的语言
    #[serde(default = "default_language")]
    pub language: String,

    /// 日志配置
    #[serde(default)]
    pub logging: LogConfig,

    /// 扩展模块管理配置
    #[serde(default)]
    pub modules: ModuleConfig,

    /// 是否为开发模式
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_language() -> String {
    "en-US".to_string()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            data_dir: default_data_dir(),
            language: default_language(),
            logging: LogConfig::default(),
            modules: ModuleConfig::default(),
            dev_mode: false,
        }
    }
}

impl CoreConfig {
    /// 创建配置构建器
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::new()
    }

    /// 从文件加载配置
    pub async fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = tokio::fs::read_to_string(&path).await?;

        let mut config: CoreConfig = if path.extension().map(|e| e == "json").unwrap_or(false) {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };

        config.config_path = Some(path);
        config.validate()?;
        Ok(config)
    }

    /// 扩展模块目录
    pub fn addons_dir(&self) -> PathBuf {
        self.modules
            .addons_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("addons"))
    }

    /// 按点号路径读取配置值，例如 `modules.api_version`
    ///
    /// 路径不存在时返回 `None`
    pub fn value(&self, key: &str) -> Option<serde_json::Value> {
        let mut current = serde_json::to_value(self).ok()?;
        for part in key.split('.') {
            current = current.get(part)?.clone();
        }
        Some(current)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.language.trim().is_empty() {
            return Err(CoreError::InvalidConfigValue {
                key: "language".to_string(),
                reason: "语言不能为空".to_string(),
            });
        }

        if self.modules.archive_extensions.is_empty() {
            return Err(CoreError::InvalidConfigValue {
                key: "modules.archive_extensions".to_string(),
                reason: "至少需要一个归档扩展名".to_string(),
            });
        }

        if self.modules.manifest_file.trim().is_empty() {
            return Err(CoreError::InvalidConfigValue {
                key: "modules.manifest_file".to_string(),
                reason: "描述文件名不能为空".to_string(),
            });
        }

        if !self.modules.api_version.trim().is_empty()
            && ApiVersion::parse(&self.modules.api_version).is_none()
        {
            return Err(CoreError::InvalidConfigValue {
                key: "modules.api_version".to_string(),
                reason: format!("'{}' 不是合法的版本号", self.modules.api_version),
            });
        }

        Ok(())
    }

    /// 合并另一个配置（用于覆盖）
    pub fn merge(&mut self, other: CoreConfig) {
        // 只覆盖非默认值的配置
        if other.data_dir != default_data_dir() {
            self.data_dir = other.data_dir;
        }
        if other.language != default_language() {
            self.language = other.language;
        }
        if other.logging.level != default_log_level() {
            self.logging.level = other.logging.level;
        }
        if other.logging.file_output {
            self.logging.file_output = true;
            self.logging.log_dir = other.logging.log_dir;
        }
        if other.logging.json_format {
            self.logging.json_format = true;
        }
        if other.modules.addons_dir.is_some() {
            self.modules.addons_dir = other.modules.addons_dir;
        }
        if other.modules.archive_extensions != default_archive_extensions() {
            self.modules.archive_extensions = other.modules.archive_extensions;
        }
        if other.modules.api_version != default_api_version() {
            self.modules.api_version = other.modules.api_version;
        }
        if other.dev_mode {
            self.dev_mode = true;
        }
    }
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct CoreConfigBuilder {
    config: CoreConfig,
}

impl CoreConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self {
            config: CoreConfig::default(),
        }
    }

    /// 设置配置文件路径
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.config_path = Some(path.into());
        self
    }

    /// 设置数据目录
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    /// 设置扩展模块目录
    pub fn addons_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.modules.addons_dir = Some(dir.into());
        self
    }

    /// 设置语言
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.config.language = language.into();
        self
    }

    /// 设置宿主 API 版本
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.config.modules.api_version = version.into();
        self
    }

    /// 设置归档扩展名
    pub fn archive_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.modules.archive_extensions =
            extensions.into_iter().map(Into::into).collect();
        self
    }

    /// 设置保留前缀
    pub fn reserved_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.modules.reserved_prefix = prefix.into();
        self
    }

    /// 设置日志级别
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// 启用文件日志
    pub fn file_logging(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.config.logging.file_output = true;
        self.config.logging.log_dir = Some(log_dir.into());
        self
    }

    /// 启用 JSON 格式日志
    pub fn json_logging(mut self) -> Self {
        self.config.logging.json_format = true;
        self
    }

    /// 启用开发模式
    pub fn dev_mode(mut self) -> Self {
        self.config.dev_mode = true;
        self
    }

    /// 构建配置
    pub fn build(self) -> CoreConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoreConfig::default();
        assert!(!config.dev_mode);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.modules.manifest_file, "addon.yml");
        assert_eq!(config.addons_dir(), PathBuf::from("./addons"));
        assert!(config.modules.is_archive_extension("JAR"));
        assert!(!config.modules.is_archive_extension("txt"));
        assert!(config.modules.host_api_version().is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = CoreConfig::builder()
            .data_dir("/srv/host")
            .language("zh-CN")
            .api_version("2.1")
            .log_level("debug")
            .dev_mode()
            .build();

        assert_eq!(config.addons_dir(), PathBuf::from("/srv/host/addons"));
        assert_eq!(config.language, "zh-CN");
        assert_eq!(config.modules.api_version, "2.1");
        assert_eq!(config.modules.host_api_version().map(|v| v.to_string()), Some("2.1".to_string()));
        assert_eq!(config.logging.level, "debug");
        assert!(config.dev_mode);
    }

    #[test]
    fn test_config_merge() {
        let mut base = CoreConfig::default();
        let override_config = CoreConfig::builder()
            .log_level("debug")
            .addons_dir("/opt/addons")
            .dev_mode()
            .build();

        base.merge(override_config);

        assert_eq!(base.logging.level, "debug");
        assert_eq!(base.addons_dir(), PathBuf::from("/opt/addons"));
        assert!(base.dev_mode);
    }

    #[test]
    fn test_validate_rejects_bad_api_version() {
        let config = CoreConfig::builder().api_version("v2").build();
        assert!(matches!(
            config.validate(),
            Err(CoreError::InvalidConfigValue { ref key, .. }) if key == "modules.api_version"
        ));

        let config = CoreConfig::builder().archive_extensions(Vec::<String>::new()).build();
        assert!(config.validate().is_err());

        assert!(CoreConfig::default().validate().is_ok());
    }

    #[test]
    fn test_value_lookup() {
        let config = CoreConfig::builder().language("de").build();
        assert_eq!(config.value("language"), Some(serde_json::json!("de")));
        assert_eq!(
            config.value("modules.manifest_file"),
            Some(serde_json::json!("addon.yml"))
        );
        assert_eq!(config.value("modules.nope"), None);
    }

    #[test]
    fn test_config_serialization() {
        let config = CoreConfig::builder()
            .api_version("3")
            .log_level("warn")
            .build();

        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: CoreConfig = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(parsed.modules.api_version, "3");
        assert_eq!(parsed.logging.level, "warn");
    }
}
