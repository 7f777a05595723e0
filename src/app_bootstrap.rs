use crate::logging;
use crate::settings::Settings;
use crate::settings_io;

/// Load settings early to get log level configuration.
pub(crate) fn load_initial_settings() -> Settings {
    if let Some(dir) = settings_io::spoutcap_config_dir() {
        settings_io::bootstrap_settings_if_missing(&dir);
        settings_io::load_settings_from_disk(&dir)
    } else {
        Settings::default()
    }
}

/// Initialize logging and write the startup header.
pub(crate) fn init_logging(settings: &Settings) {
    let log_level = settings
        .log_level
        .parse::<logging::LogLevel>()
        .unwrap_or(logging::LogLevel::Info);

    if let Err(e) = logging::init_logging(log_level, settings.log_to_file) {
        eprintln!("spoutcap: logging unavailable: {:#}", e);
    } else {
        tracing::info!("================ SpoutCap {} ================", env!("CARGO_PKG_VERSION"));
        tracing::info!(
            os = std::env::consts::OS,
            arch = std::env::consts::ARCH,
            log_level = %log_level,
            to_file = settings.log_to_file,
            "capture engine starting"
        );
    }

    if settings.log_to_file {
        logging::auto_cleanup_old_logs(settings.log_retention_days);
    }
}

/// Log panics before the default hook prints them.
pub(crate) fn install_panic_hook() {
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        tracing::error!(%panic_info, "panic");
        default_panic(panic_info);
    }));
}

pub(crate) fn log_active_settings(settings: &Settings) {
    tracing::debug!(
        initial_mode = %settings.initial_mode,
        target_fps = settings.target_fps,
        duplication_timeout_ms = settings.duplication_timeout_ms,
        pick_button = ?settings.pick_button,
        desktop_channel = %settings.channels.desktop,
        region_channel = %settings.channels.region,
        window_channel = %settings.channels.window,
        flip_texture_output = settings.flip_texture_output,
        excluded_classes = ?settings.target_filter.excluded_classes,
        log_level = %settings.log_level,
        log_to_file = settings.log_to_file,
        log_retention_days = settings.log_retention_days,
        "active settings"
    );
}

/// Window title passed on the command line, if any
pub(crate) fn title_from_args() -> Option<String> {
    let joined = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    spoutcap_capture::controller::parse_title_argument(&joined)
}
