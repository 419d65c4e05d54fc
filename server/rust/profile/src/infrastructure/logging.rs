use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::infrastructure::config::LoggingConfig;

/// init_logging は tracing-subscriber を初期化する。
///
/// `RUST_LOG` が設定されていればそれを優先し、無ければ `logging.level` を使う。
/// `logging.format` が "text" の場合はプレーンテキスト、それ以外は JSON で出力する。
pub fn init_logging(cfg: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&cfg.level))?;
    let registry = tracing_subscriber::registry().with(filter);

    if cfg.format == "text" {
        registry
            .with(fmt::layer().with_target(true))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()?;
    }

    Ok(())
}
