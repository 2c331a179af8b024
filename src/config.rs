// Runtime configuration for table-scene

const DEFAULT_TITLE: &str = "Table Scene";
const DEFAULT_WIDTH: u32 = 800;
const DEFAULT_HEIGHT: u32 = 600;

/// Window, logging and context-loss simulation settings.
///
/// Every field can be overridden through a `TABLE_SCENE_*` environment
/// variable; anything missing or unparsable keeps its default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Mouse presses alternately lose and restore the rendering context.
    pub simulate_context_loss: bool,
    /// `env_logger` filter syntax, e.g. "info" or "table_scene=debug,wgpu=warn".
    pub log_filter: Option<String>,
    /// Problems found while reading the environment, logged by
    /// [`init_logging`] once a logger exists.
    pub warnings: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            simulate_context_loss: false,
            log_filter: None,
            warnings: Vec::new(),
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(title) = lookup("TABLE_SCENE_TITLE") {
            config.title = title;
        }
        let mut warnings = Vec::new();
        config.width = parse_dimension(&lookup, "TABLE_SCENE_WIDTH", config.width, &mut warnings);
        config.height = parse_dimension(&lookup, "TABLE_SCENE_HEIGHT", config.height, &mut warnings);
        config.warnings = warnings;
        if let Some(flag) = lookup("TABLE_SCENE_SIMULATE_CONTEXT_LOSS") {
            config.simulate_context_loss = parse_flag(&flag);
        }
        config.log_filter = lookup("TABLE_SCENE_LOG").filter(|filter| !filter.trim().is_empty());

        config
    }
}

/// Initializes the global logger.
///
/// Precedence: explicit filter, then `RUST_LOG`, then `info`.
pub fn init_logging(config: &Config) {
    let mut builder = env_logger::Builder::new();

    if let Some(filter) = &config.log_filter {
        builder.parse_filters(filter);
    } else if let Ok(filter) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filter);
    } else {
        builder.filter_level(log::LevelFilter::Info);
    }

    // A second init (tests, embedding) is harmless.
    if builder.try_init().is_ok() {
        log::debug!("logging initialized");
    }
    for warning in &config.warnings {
        log::warn!("{warning}");
    }
}

fn parse_dimension(
    lookup: impl Fn(&str) -> Option<String>,
    key: &str,
    default: u32,
    warnings: &mut Vec<String>,
) -> u32 {
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<u32>() {
            Ok(parsed) if parsed > 0 => parsed,
            _ => {
                warnings.push(format!("ignoring {key}={raw:?}, using {default}"));
                default
            }
        },
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
