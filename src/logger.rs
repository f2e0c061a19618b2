use anyhow::Result;
use fern::colors::{Color, ColoredLevelConfig};

/// Crates whose output is only interesting when something goes wrong.
const NOISY_TARGETS: &[&str] = &["serenity", "tracing", "hyper", "rustls", "reqwest"];

/// Setup logging.
///
/// `BOT_LOGS` selects the log file and `BOT_LOG_LEVEL` the level of this
/// crate's records (`info` by default).
pub fn init() -> Result<()> {
    let log_path = std::env::var("BOT_LOGS").unwrap_or_else(|_| "bot.log".to_string());
    let level = std::env::var("BOT_LOG_LEVEL")
        .ok()
        .and_then(|level| level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);

    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Cyan)
        .debug(Color::Green)
        .trace(Color::BrightBlack);

    let mut base = fern::Dispatch::new().level(level);
    for target in NOISY_TARGETS {
        base = base.level_for(*target, log::LevelFilter::Warn);
    }

    let file_cfg = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}:{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record
                    .line()
                    .map(|x| x.to_string())
                    .unwrap_or_else(|| "X".to_string()),
                record.level(),
                message
            ))
        })
        .chain(fern::log_file(log_path)?);

    let stdout_cfg = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%H:%M:%S]"),
                record.target(),
                colors.color(record.level()),
                message
            ))
        })
        .chain(std::io::stdout());

    base.chain(file_cfg).chain(stdout_cfg).apply()?;

    Ok(())
}
