/// 按字符边界安全截断，超出部分以 `...` 结尾
///
/// 用于日志里的 SQL 语句，避免在多字节字符中间截断
pub fn truncate_for_log(text: &str, max_len: usize) -> String {
    let compact: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if compact.len() <= max_len {
        return compact;
    }
    let mut end = max_len;
    while end > 0 && !compact.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &compact[..end])
}
