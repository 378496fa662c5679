use chrono::Utc;

/// 当前毫秒级时间戳
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
