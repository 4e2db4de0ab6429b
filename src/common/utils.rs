use nanoid::nanoid;

// ==========================================
// ID 生成工具 (Identity Utilities)
// ==========================================

/// 为匿名注册生成任务 ID (NanoID)
///
/// 使用 NanoID 替换 UUID。
/// - 长度: 12 字符
/// - 字符集: 0-9a-zA-Z (不含 `-` 和 `_`，方便双击选中和日志检索)
/// - 优势: 比 UUID 更短，生成速度更快，碰撞概率在本场景下可忽略。
///
/// 生成的 ID 与调用方自定义 ID 走同一套索引和去重策略。
#[inline]
pub fn new_task_id() -> String {
    const ALPHABET: [char; 62] = [
        '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h',
        'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
        'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R',
        'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z',
    ];
    nanoid!(12, &ALPHABET)
}
