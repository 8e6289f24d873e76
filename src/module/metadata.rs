//! 模块元数据定义
//!
//! 定义模块描述文件 (addon.yml) 解析后的不可变数据结构，
//! 以及模块状态与运行时快照。

use chrono::{DateTime, Utc};
use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;

/// 快照版本后缀
pub const SNAPSHOT_SUFFIX: &str = "-SNAPSHOT";

/// 权限默认授予级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionDefault {
    /// 所有人默认拥有
    True,
    /// 所有人默认不拥有
    False,
    /// 仅管理员默认拥有
    Op,
    /// 仅非管理员默认拥有
    NotOp,
}

impl PermissionDefault {
    /// 按名称解析（忽略大小写），支持常见别名
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "true" => Some(PermissionDefault::True),
            "false" => Some(PermissionDefault::False),
            "op" | "isop" | "operator" | "isoperator" | "admin" | "isadmin" => {
                Some(PermissionDefault::Op)
            }
            "!op" | "notop" | "!operator" | "notoperator" | "!admin" | "notadmin" => {
                Some(PermissionDefault::NotOp)
            }
            _ => None,
        }
    }
}

impl fmt::Display for PermissionDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionDefault::True => write!(f, "true"),
            PermissionDefault::False => write!(f, "false"),
            PermissionDefault::Op => write!(f, "op"),
            PermissionDefault::NotOp => write!(f, "not_op"),
        }
    }
}

/// 权限节点
///
/// 描述文件中的权限树被展开成以点号连接的完整名称。
/// `default` 保留原始字符串，直到启用阶段注册权限时才解析，
/// 这样单个权限写错只影响它自己。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionNode {
    /// 完整权限名，例如 `economy.admin.give`
    pub name: String,

    /// 默认授予级别（原始字符串）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// 权限说明
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PermissionNode {
    /// 是否同时声明了默认级别和说明，只有这样的节点才会注册到宿主
    pub fn is_registrable(&self) -> bool {
        self.default.is_some() && self.description.is_some()
    }
}

/// 模块图标（符号化材质名）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Icon {
    /// 默认图标
    #[default]
    Paper,
    Book,
    Chest,
    Compass,
    Clock,
    Map,
    Diamond,
    Emerald,
    GoldIngot,
    IronIngot,
    Beacon,
    Anvil,
    CraftingTable,
    EnchantingTable,
    Bookshelf,
    GrassBlock,
    Bedrock,
    OakSapling,
    NameTag,
    Lead,
    Bell,
    EnderPearl,
    NetherStar,
    PlayerHead,
    WritableBook,
    Barrier,
}

impl Icon {
    const ALL: [Icon; 26] = [
        Icon::Paper,
        Icon::Book,
        Icon::Chest,
        Icon::Compass,
        Icon::Clock,
        Icon::Map,
        Icon::Diamond,
        Icon::Emerald,
        Icon::GoldIngot,
        Icon::IronIngot,
        Icon::Beacon,
        Icon::Anvil,
        Icon::CraftingTable,
        Icon::EnchantingTable,
        Icon::Bookshelf,
        Icon::GrassBlock,
        Icon::Bedrock,
        Icon::OakSapling,
        Icon::NameTag,
        Icon::Lead,
        Icon::Bell,
        Icon::EnderPearl,
        Icon::NetherStar,
        Icon::PlayerHead,
        Icon::WritableBook,
        Icon::Barrier,
    ];

    /// 材质名（大写蛇形）
    pub fn name(&self) -> &'static str {
        match self {
            Icon::Paper => "PAPER",
            Icon::Book => "BOOK",
            Icon::Chest => "CHEST",
            Icon::Compass => "COMPASS",
            Icon::Clock => "CLOCK",
            Icon::Map => "MAP",
            Icon::Diamond => "DIAMOND",
            Icon::Emerald => "EMERALD",
            Icon::GoldIngot => "GOLD_INGOT",
            Icon::IronIngot => "IRON_INGOT",
            Icon::Beacon => "BEACON",
            Icon::Anvil => "ANVIL",
            Icon::CraftingTable => "CRAFTING_TABLE",
            Icon::EnchantingTable => "ENCHANTING_TABLE",
            Icon::Bookshelf => "BOOKSHELF",
            Icon::GrassBlock => "GRASS_BLOCK",
            Icon::Bedrock => "BEDROCK",
            Icon::OakSapling => "OAK_SAPLING",
            Icon::NameTag => "NAME_TAG",
            Icon::Lead => "LEAD",
            Icon::Bell => "BELL",
            Icon::EnderPearl => "ENDER_PEARL",
            Icon::NetherStar => "NETHER_STAR",
            Icon::PlayerHead => "PLAYER_HEAD",
            Icon::WritableBook => "WRITABLE_BOOK",
            Icon::Barrier => "BARRIER",
        }
    }

    /// 按材质名查找（忽略大小写）
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|icon| icon.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Icon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn api_version_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(\d+\.)?(\d+\.)?(\*|\d+)$").ok())
        .as_ref()
}

/// API 兼容版本
///
/// 语法为 `^(\d+\.)?(\d+\.)?(\*|\d+)$`，可带 `-SNAPSHOT` 后缀。
/// 通配符 `*` 视为 0，因此 `1.*` 可被任何 1.x 及更高版本满足。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiVersion {
    raw: String,
    snapshot: bool,
    version: Version,
}

impl ApiVersion {
    /// 解析版本字符串，不符合语法时返回 `None`
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let (core, snapshot) = match trimmed.strip_suffix(SNAPSHOT_SUFFIX) {
            Some(core) => (core, true),
            None => (trimmed, false),
        };

        if !api_version_pattern()?.is_match(core) {
            return None;
        }

        let mut parts = core
            .split('.')
            .map(|part| part.parse::<u64>().unwrap_or(0));
        let version = Version::new(
            parts.next().unwrap_or(0),
            parts.next().unwrap_or(0),
            parts.next().unwrap_or(0),
        );

        Some(Self {
            raw: trimmed.to_string(),
            snapshot,
            version,
        })
    }

    /// 是否为快照版本
    pub fn is_snapshot(&self) -> bool {
        self.snapshot
    }

    /// 规范化后的版本
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// 宿主提供的版本是否满足本要求
    pub fn is_satisfied_by(&self, available: &ApiVersion) -> bool {
        available.version >= self.version
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for ApiVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("无效的 API 版本: {}", s))
    }
}

/// 模块描述
///
/// 对应 addon.yml 文件，解析后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// 入口点（模块主类型的完整符号名）
    pub main: String,

    /// 模块名（忽略大小写唯一）
    pub name: String,

    /// 模块版本（自由格式）
    pub version: String,

    /// 作者列表
    pub authors: Vec<String>,

    /// 硬依赖
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// 软依赖
    #[serde(default)]
    pub soft_dependencies: Vec<String>,

    /// 要求的宿主 API 版本
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// 权限节点
    #[serde(default)]
    pub permissions: Vec<PermissionNode>,

    /// 图标
    #[serde(default)]
    pub icon: Icon,

    /// 是否上报统计
    #[serde(default = "default_metrics")]
    pub metrics: bool,

    /// 源码仓库
    #[serde(default)]
    pub repository: String,
}

fn default_metrics() -> bool {
    true
}

impl ModuleDescriptor {
    /// 创建只含必填项的描述
    pub fn new(
        main: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            main: main.into(),
            name: name.into(),
            version: version.into(),
            authors: vec![],
            dependencies: vec![],
            soft_dependencies: vec![],
            api_version: None,
            permissions: vec![],
            icon: Icon::default(),
            metrics: default_metrics(),
            repository: String::new(),
        }
    }

    /// 设置作者
    pub fn with_authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors = authors.into_iter().map(Into::into).collect();
        self
    }

    /// 追加硬依赖
    pub fn depend(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    /// 追加软依赖
    pub fn soft_depend(mut self, name: impl Into<String>) -> Self {
        self.soft_dependencies.push(name.into());
        self
    }

    /// 设置 API 版本
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// 名称比较键（小写）
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }

    /// 忽略大小写比较名称
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// 是否硬依赖指定模块
    pub fn depends_on(&self, name: &str) -> bool {
        self.dependencies.iter().any(|d| d.eq_ignore_ascii_case(name))
    }

    /// 是否没有声明任何依赖
    pub fn has_no_dependencies(&self) -> bool {
        self.dependencies.is_empty() && self.soft_dependencies.is_empty()
    }

    /// 解析后的 API 版本
    pub fn parsed_api_version(&self) -> Option<ApiVersion> {
        self.api_version.as_deref().and_then(ApiVersion::parse)
    }

    /// 作者列表的展示形式
    pub fn authors_display(&self) -> String {
        self.authors.join(", ")
    }

    /// 权限前缀：小写模块名加点号
    pub fn permission_prefix(&self) -> String {
        format!("{}.", self.name.to_lowercase())
    }
}

/// 模块状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleState {
    /// 初始状态，或已被卸载
    #[default]
    Disabled,
    /// 已加载
    Loaded,
    /// 已启用
    Enabled,
    /// 与宿主版本不兼容
    Incompatible,
    /// 依赖缺失
    MissingDependency,
    /// 钩子出错
    Error,
}

impl ModuleState {
    /// 是否可以启用
    pub fn can_enable(&self) -> bool {
        matches!(self, ModuleState::Loaded)
    }

    /// 是否可以禁用
    pub fn can_disable(&self) -> bool {
        matches!(self, ModuleState::Loaded | ModuleState::Enabled)
    }

    /// 是否为本轮加载的终止状态
    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            ModuleState::Incompatible | ModuleState::MissingDependency | ModuleState::Error
        )
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModuleState::Disabled => "DISABLED",
            ModuleState::Loaded => "LOADED",
            ModuleState::Enabled => "ENABLED",
            ModuleState::Incompatible => "INCOMPATIBLE",
            ModuleState::MissingDependency => "MISSING_DEPENDENCY",
            ModuleState::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// 模块运行时信息快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleInfo {
    /// 模块描述
    pub descriptor: ModuleDescriptor,

    /// 当前状态
    pub state: ModuleState,

    /// 归档路径
    pub archive: PathBuf,

    /// 数据目录
    pub data_dir: PathBuf,

    /// 是否为宿主原生扩展
    pub host_managed: bool,

    /// 加载时间
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loaded_at: Option<DateTime<Utc>>,

    /// 启用时间
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled_at: Option<DateTime<Utc>>,

    /// 最后错误信息
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ModuleInfo {
    /// 模块名
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// 模块版本
    pub fn version(&self) -> &str {
        &self.descriptor.version
    }

    /// 是否已启用
    pub fn is_enabled(&self) -> bool {
        self.state == ModuleState::Enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_creation() {
        let descriptor = ModuleDescriptor::new("org.skyhub.level.Level", "Level", "2.6.0")
            .with_authors(["alice"])
            .depend("BSkyBlock")
            .soft_depend("Warps");

        assert_eq!(descriptor.key(), "level");
        assert!(descriptor.is_named("LEVEL"));
        assert!(descriptor.depends_on("bskyblock"));
        assert!(!descriptor.has_no_dependencies());
        assert!(descriptor.metrics);
        assert_eq!(descriptor.icon, Icon::Paper);
        assert_eq!(descriptor.permission_prefix(), "level.");
    }

    #[test]
    fn test_icon_lookup() {
        assert_eq!(Icon::from_name("diamond"), Some(Icon::Diamond));
        assert_eq!(Icon::from_name("Gold_Ingot"), Some(Icon::GoldIngot));
        assert_eq!(Icon::from_name("not_a_material"), None);
        assert_eq!(Icon::GrassBlock.to_string(), "GRASS_BLOCK");
    }

    #[test]
    fn test_permission_default_names() {
        assert_eq!(PermissionDefault::from_name("TRUE"), Some(PermissionDefault::True));
        assert_eq!(PermissionDefault::from_name("op"), Some(PermissionDefault::Op));
        assert_eq!(PermissionDefault::from_name("!op"), Some(PermissionDefault::NotOp));
        assert_eq!(PermissionDefault::from_name("sometimes"), None);
    }

    #[test]
    fn test_api_version_grammar() {
        assert!(ApiVersion::parse("1").is_some());
        assert!(ApiVersion::parse("1.2").is_some());
        assert!(ApiVersion::parse("1.2.3").is_some());
        assert!(ApiVersion::parse("1.*").is_some());
        assert!(ApiVersion::parse("2.0-SNAPSHOT").unwrap().is_snapshot());

        assert!(ApiVersion::parse("1.2.3.4").is_none());
        assert!(ApiVersion::parse("v1").is_none());
        assert!(ApiVersion::parse("*.1").is_none());
        assert!(ApiVersion::parse("").is_none());
    }

    #[test]
    fn test_api_version_compatibility() {
        let host = ApiVersion::parse("1.16.5").unwrap();

        assert!(ApiVersion::parse("1.16").unwrap().is_satisfied_by(&host));
        assert!(ApiVersion::parse("1.*").unwrap().is_satisfied_by(&host));
        assert!(ApiVersion::parse("1.16.5-SNAPSHOT").unwrap().is_satisfied_by(&host));
        assert!(!ApiVersion::parse("1.17").unwrap().is_satisfied_by(&host));
        assert!(!ApiVersion::parse("2").unwrap().is_satisfied_by(&host));
    }

    #[test]
    fn test_module_state_transitions() {
        assert!(ModuleState::Loaded.can_enable());
        assert!(!ModuleState::Disabled.can_enable());
        assert!(ModuleState::Enabled.can_disable());
        assert!(!ModuleState::Error.can_disable());
        assert!(ModuleState::MissingDependency.is_failed());
        assert_eq!(ModuleState::MissingDependency.to_string(), "MISSING_DEPENDENCY");
        assert_eq!(ModuleState::default(), ModuleState::Disabled);
    }

    #[test]
    fn test_descriptor_serialization() {
        let mut descriptor = ModuleDescriptor::new("a.b.Main", "Main", "1.0").depend("Core");
        descriptor.permissions.push(PermissionNode {
            name: "main.use".to_string(),
            default: Some("true".to_string()),
            description: Some("use it".to_string()),
        });

        let yaml = serde_yaml::to_string(&descriptor).unwrap();
        let parsed: ModuleDescriptor = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(parsed, descriptor);
    }
}
