use chrono::Local;
use env_logger::{Builder, Env};
use log::Level;
use std::io::Write;

fn level_color(level: Level) -> &'static str {
    match level {
        Level::Error => "\x1b[31m\x1b[1m", // 红色
        Level::Warn => "\x1b[33m\x1b[1m",  // 黄色
        Level::Info => "\x1b[32m\x1b[1m",  // 绿色
        Level::Debug => "\x1b[36m\x1b[1m", // 青色
        Level::Trace => "\x1b[90m\x1b[1m", // 灰色
    }
}

fn builder(default_filter: &str) -> Builder {
    let mut builder = Builder::from_env(Env::default().default_filter_or(default_filter));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} {}{:<5}\x1b[0m [{}:{}] {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            level_color(record.level()),
            record.level(),
            record.file().unwrap_or("unknown"),
            record.line().unwrap_or(0),
            record.args(),
        )
    });
    builder
}

/// 初始化日志，`RUST_LOG` 优先，默认 info
pub fn init_logger() {
    builder("info").init();
}

/// 重复初始化时忽略错误，测试里使用
pub fn try_init_logger(default_filter: &str) -> bool {
    builder(default_filter).is_test(true).try_init().is_ok()
}
