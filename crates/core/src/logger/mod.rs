//! 日志初始化

mod setup;

pub use setup::{parse_rotation, setup_logging, LogConfig, LogFormat};
