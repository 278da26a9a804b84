pub const LOG_FILE_BASENAME: &str = "todo-board";
pub const LOG_FILE_SUFFIX: &str = "log";
pub const LOG_ROTATE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
pub const LOG_ROTATE_KEEP_FILES: usize = 10;
pub const ENV_LOG: &str = "TODO_BOARD_LOG";

/// `TODO_BOARD_LOG`, then `RUST_LOG`, then the build default.
pub fn log_spec<E>(env: E) -> String
where
    E: Fn(&str) -> Option<String>,
{
    let default_spec = if cfg!(debug_assertions) {
        "warn,todo_board_lib=debug"
    } else {
        "warn,todo_board_lib=info"
    };
    [ENV_LOG, "RUST_LOG"]
        .into_iter()
        .filter_map(|key| env(key))
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default_spec.to_string())
}

#[cfg(any(test, feature = "app"))]
fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text
    } else {
        "<non-string panic payload>"
    }
}

/// File logger in `data_dir` (next to todos.json), rotated by size.
/// Debug builds also echo info and above to stdout.
#[cfg(all(feature = "app", not(test)))]
pub fn init_logging(data_dir: &std::path::Path) -> Result<(), flexi_logger::FlexiLoggerError> {
    use flexi_logger::{
        detailed_format, Cleanup, Criterion, Duplicate, FileSpec, Logger, Naming, WriteMode,
    };

    std::fs::create_dir_all(data_dir)?;

    let files = FileSpec::default()
        .directory(data_dir)
        .basename(LOG_FILE_BASENAME)
        .suffix(LOG_FILE_SUFFIX);
    let echo = if cfg!(debug_assertions) {
        Duplicate::Info
    } else {
        Duplicate::None
    };

    Logger::try_with_str(log_spec(|key| std::env::var(key).ok()))?
        .log_to_file(files)
        .write_mode(WriteMode::BufferAndFlush)
        .format_for_files(detailed_format)
        .rotate(
            Criterion::Size(LOG_ROTATE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(LOG_ROTATE_KEEP_FILES),
        )
        .duplicate_to_stdout(echo)
        .start()?;

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info: &std::panic::PanicHookInfo<'_>| {
        let location = info
            .location()
            .map_or_else(|| "<unknown>".to_string(), ToString::to_string);
        log::error!(
            "panic at {location}: {}\n{}",
            panic_message(info.payload()),
            std::backtrace::Backtrace::force_capture()
        );
        default_hook(info);
    }));

    log::info!("logging to {}", data_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;

    #[test]
    fn spec_prefers_app_variable_then_rust_log() {
        let both = |key: &str| match key {
            ENV_LOG => Some("todo_board_lib=trace".to_string()),
            "RUST_LOG" => Some("info".to_string()),
            _ => None,
        };
        assert_eq!(log_spec(both), "todo_board_lib=trace");

        let blank_app = |key: &str| match key {
            ENV_LOG => Some("  ".to_string()),
            "RUST_LOG" => Some("info".to_string()),
            _ => None,
        };
        assert_eq!(log_spec(blank_app), "info");
    }

    #[test]
    fn spec_defaults_quiet_dependencies() {
        let spec = log_spec(|_| None);
        assert!(spec.starts_with("warn,todo_board_lib="));
    }

    #[test]
    fn panic_payloads_are_readable() {
        let literal: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(literal.as_ref()), "boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(owned.as_ref()), "owned boom");
        let other: Box<dyn Any + Send> = Box::new(7_u32);
        assert_eq!(panic_message(other.as_ref()), "<non-string panic payload>");
    }
}
