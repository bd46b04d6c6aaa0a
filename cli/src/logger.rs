use std::sync::OnceLock;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar};
use indicatif_log_bridge::LogWrapper;

/// Global logger wired into the progress bar machinery
///
/// Log records and spinners share one `MultiProgress` so that polling
/// loops don't tear the terminal apart. Logs are off by default, enable
/// them with e.g. "export RUST_LOG=debug".
pub struct Logger {
    multi_progress: MultiProgress,
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

impl<'a> Logger {
    pub fn init() -> &'a Self {
        LOGGER.get_or_init(|| {
            let logger = env_logger::Builder::from_env(
                env_logger::Env::default().default_filter_or("off"),
            )
            .build();

            let level = logger.filter();
            let multi_progress = MultiProgress::new();

            LogWrapper::new(multi_progress.clone(), logger)
                .try_init()
                .unwrap();
            log::set_max_level(level);

            Self { multi_progress }
        })
    }

    /// Spinner shown while a blocking wait loop is in flight
    ///
    /// The caller is responsible for calling `finish_and_clear` on it.
    pub fn spinner(message: &str) -> ProgressBar {
        let bar = Self::init()
            .multi_progress
            .add(ProgressBar::new_spinner());

        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    }
}
