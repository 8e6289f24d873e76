//! 扩展宿主错误类型定义
//!
//! 本模块定义了运行时中使用的所有错误类型。除配置与 IO 类错误外，
//! 绝大多数错误只对单个扩展模块致命，批量操作会记录后继续处理其它模块。

use thiserror::Error;

use crate::module::lifecycle::{Hook, LinkError};

/// 扩展宿主核心错误类型
#[derive(Error, Debug)]
pub enum CoreError {
    // ==================== 描述文件与归档错误 ====================

    /// 描述文件缺少必填项或字段非法（DescriptorError）
    #[error("无效的模块描述: {0}")]
    InvalidDescriptor(String),

    /// 入口点未实现模块契约（InheritanceError）
    #[error("入口点未实现模块契约: {0}")]
    InvalidInheritance(String),

    /// 归档缺少描述文件或格式不正确（FormatError）
    #[error("归档格式无效: {0}")]
    InvalidFormat(String),

    /// 归档读取失败
    #[error("归档读取失败: {0}")]
    Archive(#[from] zip::result::ZipError),

    // ==================== 模块生命周期错误 ====================

    /// 钩子运行期间出现链接错误（BinaryIncompatibilityError）
    #[error("模块 '{module}' 二进制不兼容（作者: {}）: {source}", .authors.join(", "))]
    BinaryIncompatibility {
        module: String,
        authors: Vec<String>,
        #[source]
        source: LinkError,
    },

    /// 钩子抛出未处理的异常（UnhandledHookError）
    #[error("模块 '{module}' 在 {hook} 中出现未处理的异常: {reason}")]
    UnhandledHook {
        module: String,
        hook: Hook,
        reason: String,
    },

    /// 目标模块未找到
    #[error("目标模块未找到: '{0}'")]
    ModuleNotFound(String),

    /// 模块已加载（重复）
    #[error("模块已加载: '{0}'")]
    ModuleAlreadyLoaded(String),

    /// 模块加载失败
    #[error("模块加载失败: '{module_id}' - {reason}")]
    ModuleLoadFailed {
        module_id: String,
        reason: String,
    },

    /// 模块未处于可执行该操作的状态
    #[error("模块 '{module}' 当前状态为 {state}，无法执行该操作")]
    InvalidState {
        module: String,
        state: String,
    },

    /// 硬依赖缺失
    #[error("模块 '{module}' 依赖的 '{dependency}' 不存在")]
    MissingDependency {
        module: String,
        dependency: String,
    },

    /// 循环依赖
    #[error("检测到循环依赖: {0}")]
    CircularDependency(String),

    /// 宿主 API 版本不满足要求
    #[error("模块 '{module}' 需要宿主 API 版本 {required} 或更高，当前为 {available}")]
    Incompatible {
        module: String,
        required: String,
        available: String,
    },

    /// 跨模块请求构造失败
    #[error("模块请求失败: {0}")]
    RequestFailed(String),

    /// 归档中没有请求的资源
    #[error("资源不存在: '{0}'")]
    ResourceNotFound(String),

    // ==================== 配置错误 ====================

    /// 配置加载失败
    #[error("配置加载失败: {0}")]
    ConfigLoadFailed(String),

    /// 配置值无效
    #[error("配置值无效: '{key}' - {reason}")]
    InvalidConfigValue {
        key: String,
        reason: String,
    },

    // ==================== IO 和序列化错误 ====================

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML 序列化/反序列化错误
    #[error("YAML 错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // ==================== 通用错误 ====================

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),

    /// 其他错误
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// 运行时操作结果类型别名
pub type Result<T> = std::result::Result<T, CoreError>;

/// 错误码常量
pub mod error_code {
    // 描述与归档错误 (DESCRIPTOR-xxx)
    pub const DESCRIPTOR_INVALID: &str = "DESCRIPTOR-001";
    pub const DESCRIPTOR_INHERITANCE: &str = "DESCRIPTOR-002";
    pub const DESCRIPTOR_FORMAT: &str = "DESCRIPTOR-003";

    // 模块错误 (MODULE-xxx)
    pub const MODULE_NOT_LOADED: &str = "MODULE-001";
    pub const MODULE_EXECUTION_ERROR: &str = "MODULE-002";
    pub const MODULE_LOAD_FAILED: &str = "MODULE-003";
    pub const MODULE_BINARY_INCOMPATIBLE: &str = "MODULE-004";
    pub const MODULE_CIRCULAR_DEPENDENCY: &str = "MODULE-005";
    pub const MODULE_MISSING_DEPENDENCY: &str = "MODULE-006";
    pub const MODULE_INCOMPATIBLE: &str = "MODULE-007";
    pub const MODULE_DUPLICATE: &str = "MODULE-008";
    pub const MODULE_INVALID_STATE: &str = "MODULE-009";
    pub const MODULE_REQUEST_FAILED: &str = "MODULE-010";

    // 资源错误 (RESOURCE-xxx)
    pub const RESOURCE_ACCESS_FAILED: &str = "RESOURCE-001";

    // 配置错误 (CONFIG-xxx)
    pub const CONFIG_LOAD_FAILED: &str = "CONFIG-001";
    pub const CONFIG_INVALID_VALUE: &str = "CONFIG-002";
}

impl CoreError {
    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::InvalidDescriptor(_) => error_code::DESCRIPTOR_INVALID,
            CoreError::InvalidInheritance(_) => error_code::DESCRIPTOR_INHERITANCE,
            CoreError::InvalidFormat(_) | CoreError::Archive(_) => error_code::DESCRIPTOR_FORMAT,
            CoreError::BinaryIncompatibility { .. } => error_code::MODULE_BINARY_INCOMPATIBLE,
            CoreError::UnhandledHook { .. } => error_code::MODULE_EXECUTION_ERROR,
            CoreError::ModuleNotFound(_) => error_code::MODULE_NOT_LOADED,
            CoreError::ModuleAlreadyLoaded(_) => error_code::MODULE_DUPLICATE,
            CoreError::ModuleLoadFailed { .. } => error_code::MODULE_LOAD_FAILED,
            CoreError::InvalidState { .. } => error_code::MODULE_INVALID_STATE,
            CoreError::MissingDependency { .. } => error_code::MODULE_MISSING_DEPENDENCY,
            CoreError::CircularDependency(_) => error_code::MODULE_CIRCULAR_DEPENDENCY,
            CoreError::Incompatible { .. } => error_code::MODULE_INCOMPATIBLE,
            CoreError::RequestFailed(_) => error_code::MODULE_REQUEST_FAILED,
            CoreError::ConfigLoadFailed(_) => error_code::CONFIG_LOAD_FAILED,
            CoreError::InvalidConfigValue { .. } => error_code::CONFIG_INVALID_VALUE,
            CoreError::ResourceNotFound(_) | CoreError::Io(_) => error_code::RESOURCE_ACCESS_FAILED,
            _ => "UNKNOWN",
        }
    }

    /// 是否属于"二进制不兼容"类错误
    ///
    /// 这类错误会让模块进入 INCOMPATIBLE 状态，而不是 ERROR。
    pub fn is_incompatibility(&self) -> bool {
        matches!(
            self,
            CoreError::BinaryIncompatibility { .. } | CoreError::Incompatible { .. }
        )
    }
}
