use std::io::Write;

/// 日志的统一格式：带颜色的等级、本地时间，以及输出位置
fn kestrel_format(buf: &mut env_logger::fmt::Formatter, record: &log::Record) -> std::io::Result<()> {
    let info_style = buf
        .default_level_style(log::Level::Info)
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green)));
    let warn_style = buf
        .default_level_style(log::Level::Warn)
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow)));
    let error_style = buf
        .default_level_style(log::Level::Error)
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red)));
    let trace_style = buf
        .default_level_style(log::Level::Trace)
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Magenta)));

    let level_style = match record.level() {
        log::Level::Info => info_style,
        log::Level::Warn => warn_style,
        log::Level::Error => error_style,
        log::Level::Trace => trace_style,
        _ => buf.default_level_style(record.level()),
    };
    let grey_style = info_style.fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));

    let line = record.line().unwrap_or(!0);
    let file = record.file().unwrap_or("").rsplit(|c| c == '\\' || c == '/').next().unwrap_or("");
    let time = chrono::Local::now().format("%Y/%m/%d %H:%M:%S");
    let level = record.level();
    let module = record.module_path().unwrap_or("");

    writeln!(
        buf,
        "{level_style}[{time}] {level}: {}{level_style:#}\n\t {grey_style}In {module} At {file}:{line}{grey_style:#}",
        record.args()
    )
}

/// 初始化全局 logger
///
/// 默认等级为 Info，可以通过 `RUST_LOG` 环境变量覆盖
pub fn init_log() {
    init_log_with_level(log::LevelFilter::Info);
}

/// 以指定的默认等级初始化全局 logger，`RUST_LOG` 仍然优先
pub fn init_log_with_level(level: log::LevelFilter) {
    env_logger::Builder::new().format(kestrel_format).filter(None, level).parse_default_env().init();
}

/// 单元测试使用的 logger
///
/// 输出交给 test harness 捕获；重复调用不会 panic
pub fn init_test_log() {
    let _ = env_logger::Builder::new()
        .format(kestrel_format)
        .filter(None, log::LevelFilter::Trace)
        .is_test(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_test_log_twice() {
        // 第二次初始化只会返回 Err，不能 panic
        init_test_log();
        init_test_log();
        log::trace!("logger ready");
    }
}
