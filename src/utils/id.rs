//! 订阅与事件 ID 生成
//!
//! 监听器订阅 ID 采用 `<owner>#<10 位 62 进制>` 格式，便于按所属模块撤销；
//! 生命周期事件使用 UUID v4。

use rand::Rng;

/// 62 进制字符集
const BASE62_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// 随机段长度
const TOKEN_LENGTH: usize = 10;

/// 订阅 ID 中所属者与随机段之间的分隔符
const OWNER_SEPARATOR: char = '#';

/// 生成 10 位 62 进制随机段
pub fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    (0..TOKEN_LENGTH)
        .map(|_| BASE62_CHARS[rng.gen_range(0..BASE62_CHARS.len())] as char)
        .collect()
}

/// 为指定所属者生成订阅 ID
///
/// # Arguments
///
/// * `owner` - 订阅所属的模块名（会被转为小写）
///
/// # Example
///
/// ```
/// use addon_host::utils::id::{subscription_id, owner_of};
///
/// let id = subscription_id("Economy");
/// assert_eq!(owner_of(&id), Some("economy"));
/// ```
pub fn subscription_id(owner: &str) -> String {
    format!("{}{}{}", owner.to_lowercase(), OWNER_SEPARATOR, generate_token())
}

/// 从订阅 ID 中取出所属者
///
/// 格式不正确时返回 `None`
pub fn owner_of(subscription_id: &str) -> Option<&str> {
    let (owner, token) = subscription_id.rsplit_once(OWNER_SEPARATOR)?;
    if owner.is_empty() || !is_valid_token(token) {
        return None;
    }
    Some(owner)
}

/// 验证随机段格式是否有效
pub fn is_valid_token(token: &str) -> bool {
    token.len() == TOKEN_LENGTH && token.chars().all(|c| c.is_ascii_alphanumeric())
}

/// 生成 UUID v4 格式的 ID
///
/// 用于生命周期事件等需要全局唯一性的场景
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}
