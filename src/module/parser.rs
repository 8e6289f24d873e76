//! 模块描述解析器
//!
//! 负责把 addon.yml 的原始键值数据解析成 [`ModuleDescriptor`]。
//! 必填项：`main`、`name`、`version`、`authors`；
//! 可选项：`depend`、`softdepend`、`icon`、`api-version`、`metrics`、`repository`、`permissions`。

use serde_yaml::{Mapping, Value};

use crate::api::host::Host;
use crate::module::metadata::{ApiVersion, Icon, ModuleDescriptor, PermissionNode};
use crate::utils::{CoreError, Result};

/// 必填字段
const REQUIRED_KEYS: [&str; 4] = ["main", "name", "version", "authors"];

/// 模块描述解析器
#[derive(Debug, Clone, Default)]
pub struct ModuleParser;

impl ModuleParser {
    /// 从字符串解析模块描述
    ///
    /// # Arguments
    ///
    /// * `content` - YAML 格式的描述内容
    /// * `host` - 宿主协作者，用于输出快照版本警告
    ///
    /// # Errors
    ///
    /// - YAML 语法错误时返回 `Yaml` 错误
    /// - 缺少必填项或字段非法时返回 `InvalidDescriptor` 错误
    pub fn parse_str(content: &str, host: &dyn Host) -> Result<ModuleDescriptor> {
        let value: Value = serde_yaml::from_str(content)?;
        Self::parse_value(&value, host)
    }

    /// 从已解析的 YAML 值解析模块描述
    pub fn parse_value(value: &Value, host: &dyn Host) -> Result<ModuleDescriptor> {
        let data = value.as_mapping().ok_or_else(|| {
            CoreError::InvalidDescriptor("描述文件必须是键值映射".to_string())
        })?;

        for key in REQUIRED_KEYS {
            if data.get(key).map_or(true, Value::is_null) {
                return Err(CoreError::InvalidDescriptor(format!(
                    "缺少必填字段 '{}'",
                    key
                )));
            }
        }

        let main = Self::required_string(data, "main")?;
        let name = Self::required_string(data, "name")?;
        let version = Self::required_string(data, "version")?;
        let authors = Self::string_list(data, "authors")?;

        let mut descriptor = ModuleDescriptor::new(main, name, version).with_authors(authors);
        descriptor.dependencies = Self::string_list(data, "depend")?;
        descriptor.soft_dependencies = Self::string_list(data, "softdepend")?;
        descriptor.metrics = match data.get("metrics") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(flag)) => *flag,
            Some(other) => {
                return Err(CoreError::InvalidDescriptor(format!(
                    "'metrics' 必须是布尔值，实际为 {:?}",
                    other
                )))
            }
        };
        descriptor.repository = Self::optional_string(data, "repository")?.unwrap_or_default();

        if let Some(icon) = Self::optional_string(data, "icon")? {
            descriptor.icon = Icon::from_name(&icon).ok_or_else(|| {
                CoreError::InvalidDescriptor(format!("图标 '{}' 不是已知的材质名", icon))
            })?;
        }

        if let Some(raw) = Self::optional_string(data, "api-version")? {
            let api_version = ApiVersion::parse(&raw).ok_or_else(|| {
                CoreError::InvalidDescriptor(format!(
                    "'api-version' 的值 '{}' 不是合法的版本号",
                    raw
                ))
            })?;
            if api_version.is_snapshot() {
                host.log_warning(&format!(
                    "{} {} 使用了快照版本的宿主 API ({})，可能不稳定",
                    descriptor.name, descriptor.version, api_version
                ));
            }
            descriptor.api_version = Some(raw);
        }

        if let Some(permissions) = data.get("permissions").and_then(Value::as_mapping) {
            Self::collect_permissions(None, permissions, &mut descriptor.permissions);
        }

        Ok(descriptor)
    }

    /// 标量值转字符串，数字和布尔值按字面转换
    fn scalar_to_string(value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn required_string(data: &Mapping, key: &str) -> Result<String> {
        Self::optional_string(data, key)?
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| CoreError::InvalidDescriptor(format!("必填字段 '{}' 不能为空", key)))
    }

    fn optional_string(data: &Mapping, key: &str) -> Result<Option<String>> {
        match data.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Self::scalar_to_string(value)
                .map(|s| Some(s.trim().to_string()))
                .ok_or_else(|| {
                    CoreError::InvalidDescriptor(format!("字段 '{}' 必须是字符串", key))
                }),
        }
    }

    /// 读取逗号分隔的列表，也接受 YAML 序列
    fn string_list(data: &Mapping, key: &str) -> Result<Vec<String>> {
        let items: Vec<String> = match data.get(key) {
            None | Some(Value::Null) => return Ok(vec![]),
            Some(Value::Sequence(seq)) => seq
                .iter()
                .map(|v| {
                    Self::scalar_to_string(v).ok_or_else(|| {
                        CoreError::InvalidDescriptor(format!("字段 '{}' 只能包含字符串", key))
                    })
                })
                .collect::<Result<_>>()?,
            Some(value) => {
                let raw = Self::scalar_to_string(value).ok_or_else(|| {
                    CoreError::InvalidDescriptor(format!("字段 '{}' 必须是逗号分隔的字符串", key))
                })?;
                raw.split(',').map(str::to_string).collect()
            }
        };

        let mut result: Vec<String> = Vec::with_capacity(items.len());
        for item in items {
            let item = item.trim();
            if item.is_empty() || result.iter().any(|r| r.eq_ignore_ascii_case(item)) {
                continue;
            }
            result.push(item.to_string());
        }
        Ok(result)
    }

    /// 把嵌套的权限树展开为完整的权限名
    fn collect_permissions(prefix: Option<&str>, tree: &Mapping, out: &mut Vec<PermissionNode>) {
        for (key, value) in tree {
            let Some(key) = Self::scalar_to_string(key) else {
                continue;
            };
            if key == "default" || key == "description" {
                continue;
            }

            let name = match prefix {
                Some(prefix) => format!("{}.{}", prefix, key),
                None => key,
            };

            let Some(node) = value.as_mapping() else {
                continue;
            };

            let default = node.get("default").and_then(Self::scalar_to_string);
            let description = node.get("description").and_then(Self::scalar_to_string);
            if default.is_some() || description.is_some() {
                out.push(PermissionNode {
                    name: name.clone(),
                    default,
                    description,
                });
            }

            Self::collect_permissions(Some(&name), node, out);
        }
    }
}

// ===== 测试 =====

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::RecordingHost;
    use crate::module::metadata::Icon;

    const FULL: &str = r#"
name: Level
main: org.skyhub.level.Level
version: 2.6.0
authors: alice, bob
depend: BSkyBlock ,  AcidIsland,
softdepend: Warps
icon: diamond
api-version: 1.16
metrics: false
repository: skyhub/Level
permissions:
  level.island.level:
    description: Allow use of level command
    default: true
  level.admin:
    description: Admin commands
    default: op
    reset:
      description: Reset level
      default: op
"#;

    #[test]
    fn test_parse_full_descriptor() {
        let host = RecordingHost::new();
        let descriptor = ModuleParser::parse_str(FULL, &host).unwrap();

        assert_eq!(descriptor.name, "Level");
        assert_eq!(descriptor.main, "org.skyhub.level.Level");
        assert_eq!(descriptor.authors, vec!["alice", "bob"]);
        assert_eq!(descriptor.dependencies, vec!["BSkyBlock", "AcidIsland"]);
        assert_eq!(descriptor.soft_dependencies, vec!["Warps"]);
        assert_eq!(descriptor.icon, Icon::Diamond);
        assert_eq!(descriptor.api_version.as_deref(), Some("1.16"));
        assert!(!descriptor.metrics);
        assert_eq!(descriptor.repository, "skyhub/Level");

        let names: Vec<_> = descriptor.permissions.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["level.island.level", "level.admin", "level.admin.reset"]
        );
        assert!(descriptor.permissions.iter().all(PermissionNode::is_registrable));
        assert!(host.warnings().is_empty());
    }

    #[test]
    fn test_defaults() {
        let host = RecordingHost::new();
        let descriptor = ModuleParser::parse_str(
            "name: Warps\nmain: a.Warps\nversion: 1.0\nauthors: [alice]\n",
            &host,
        )
        .unwrap();

        assert_eq!(descriptor.version, "1.0");
        assert!(descriptor.dependencies.is_empty());
        assert!(descriptor.soft_dependencies.is_empty());
        assert_eq!(descriptor.icon, Icon::Paper);
        assert!(descriptor.metrics);
        assert!(descriptor.repository.is_empty());
        assert!(descriptor.api_version.is_none());
    }

    #[test]
    fn test_missing_required_key_is_named() {
        let host = RecordingHost::new();
        for key in REQUIRED_KEYS {
            let content: String = ["name: A", "main: a.A", "version: 1", "authors: me"]
                .iter()
                .filter(|line| !line.starts_with(key))
                .map(|line| format!("{}\n", line))
                .collect();

            match ModuleParser::parse_str(&content, &host) {
                Err(CoreError::InvalidDescriptor(message)) => assert!(message.contains(key)),
                other => panic!("expected descriptor error for {}, got {:?}", key, other),
            }
        }
    }

    #[test]
    fn test_unknown_icon_fails() {
        let host = RecordingHost::new();
        let result = ModuleParser::parse_str(
            "name: A\nmain: a.A\nversion: 1\nauthors: me\nicon: UNOBTAINIUM\n",
            &host,
        );
        assert!(matches!(result, Err(CoreError::InvalidDescriptor(_))));
    }

    #[test]
    fn test_invalid_api_version_fails() {
        let host = RecordingHost::new();
        let result = ModuleParser::parse_str(
            "name: A\nmain: a.A\nversion: 1\nauthors: me\napi-version: latest\n",
            &host,
        );
        assert!(matches!(result, Err(CoreError::InvalidDescriptor(_))));
    }

    #[test]
    fn test_snapshot_api_version_warns_once() {
        let host = RecordingHost::new();
        let descriptor = ModuleParser::parse_str(
            "name: A\nmain: a.A\nversion: 1\nauthors: me\napi-version: 2.0-SNAPSHOT\n",
            &host,
        )
        .unwrap();

        assert_eq!(descriptor.api_version.as_deref(), Some("2.0-SNAPSHOT"));
        assert_eq!(host.warnings().len(), 1);
    }

    #[test]
    fn test_not_a_mapping() {
        let host = RecordingHost::new();
        let result = ModuleParser::parse_str("- just\n- a list\n", &host);
        assert!(matches!(result, Err(CoreError::InvalidDescriptor(_))));
    }
}
