//! 模块归档读取
//!
//! 模块以 zip 归档分发（默认扩展名 `.jar` / `.zip`），包含描述文件条目
//! 以及编译后的符号条目。符号 `a.b.C` 存放在条目 `a/b/C.sym` 中。
//! 归档在打开时被整体读入内存，之后的查找都是纯内存操作。

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::utils::{CoreError, Result};

/// 符号条目扩展名
pub const SYMBOL_EXTENSION: &str = "sym";

/// 单个条目解压后的大小上限
pub const MAX_ENTRY_SIZE: u64 = 64 * 1024 * 1024;

/// 已读入内存的模块归档
#[derive(Debug, Clone)]
pub struct ModuleArchive {
    path: PathBuf,
    entries: BTreeMap<String, Vec<u8>>,
}

impl ModuleArchive {
    /// 从磁盘打开归档
    ///
    /// # Errors
    ///
    /// - 文件无法读取时返回 `Io` 错误
    /// - 不是合法的 zip 归档时返回 `Archive` 错误
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let bytes = tokio::fs::read(&path).await?;
        Self::from_bytes(path, bytes)
    }

    /// 从 zip 字节流构造归档
    ///
    /// # Errors
    ///
    /// - 不是合法的 zip 归档时返回 `Archive` 错误
    /// - 条目超过 [`MAX_ENTRY_SIZE`] 或解压过程中归档损坏时返回 `InvalidFormat` / `Io` 错误
    pub fn from_bytes(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Result<Self> {
        let path = path.into();
        let entries = catch_unwind(AssertUnwindSafe(|| Self::read_entries(bytes))).map_err(|_| {
            CoreError::InvalidFormat(format!("归档 {} 已损坏", path.display()))
        })??;

        debug!(archive = %path.display(), entries = entries.len(), "归档已读取");
        Ok(Self { path, entries })
    }

    fn read_entries(bytes: Vec<u8>) -> Result<BTreeMap<String, Vec<u8>>> {
        let mut zip = zip::ZipArchive::new(Cursor::new(bytes))?;
        let mut entries = BTreeMap::new();

        for index in 0..zip.len() {
            let file = zip.by_index(index)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().trim_start_matches('/').to_string();
            let declared = file.size();
            let data = read_entry(&name, file, declared, MAX_ENTRY_SIZE)?;
            entries.insert(name, data);
        }
        Ok(entries)
    }

    /// 直接由条目构造归档，供宿主注册已在内存中的扩展使用
    pub fn from_entries<I, N>(path: impl Into<PathBuf>, entries: I) -> Self
    where
        I: IntoIterator<Item = (N, Vec<u8>)>,
        N: Into<String>,
    {
        Self {
            path: path.into(),
            entries: entries.into_iter().map(|(n, d)| (n.into(), d)).collect(),
        }
    }

    /// 归档路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 归档文件名
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// 是否包含指定条目
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// 读取条目内容
    pub fn entry(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// 所有条目名（按字典序）
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// 读取描述文件
    ///
    /// # Errors
    ///
    /// 条目缺失或不是 UTF-8 文本时返回 `InvalidFormat`
    pub fn manifest(&self, name: &str) -> Result<&str> {
        let data = self.entry(name).ok_or_else(|| {
            CoreError::InvalidFormat(format!(
                "归档 {} 中没有 {}",
                self.file_name(),
                name
            ))
        })?;
        std::str::from_utf8(data).map_err(|e| {
            CoreError::InvalidFormat(format!("{} 不是 UTF-8 文本: {}", name, e))
        })
    }

    /// 符号对应的条目名
    pub fn symbol_entry(symbol: &str) -> String {
        format!("{}.{}", symbol.replace('.', "/"), SYMBOL_EXTENSION)
    }

    /// 读取符号内容
    pub fn symbol(&self, symbol: &str) -> Option<&[u8]> {
        self.entry(&Self::symbol_entry(symbol))
    }

    /// 归档中定义的所有符号
    pub fn symbols(&self) -> Vec<String> {
        let suffix = format!(".{}", SYMBOL_EXTENSION);
        self.entries
            .keys()
            .filter_map(|name| name.strip_suffix(&suffix))
            .map(|stem| stem.replace('/', "."))
            .collect()
    }
}

/// 读取单个条目，声明大小和实际解压大小都不得超过 `limit`
fn read_entry<R: Read>(name: &str, reader: R, declared: u64, limit: u64) -> Result<Vec<u8>> {
    let too_large = || {
        CoreError::InvalidFormat(format!("条目 {} 超过大小上限 {} 字节", name, limit))
    };
    if declared > limit {
        return Err(too_large());
    }

    let mut data = Vec::new();
    reader.take(limit.saturating_add(1)).read_to_end(&mut data)?;
    if data.len() as u64 > limit {
        return Err(too_large());
    }
    Ok(data)
}
