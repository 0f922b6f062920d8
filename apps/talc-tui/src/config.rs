//! Environment-backed runtime configuration for `talc-tui`.

use std::{env, error::Error, fmt, path::PathBuf, time::Duration};

use media_cache::ArtBounds;

const DEFAULT_DATA_DIR: &str = "./.talc-store";
const MEDIA_CACHE_DIR: &str = "media-cache";
const DEFAULT_DIALOG_POLL_MS: u64 = 2_000;
const DEFAULT_MESSAGE_POLL_MS: u64 = 1_000;
const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 300;
const DEFAULT_DIALOG_LIMIT: usize = 100;
const DEFAULT_MESSAGE_PAGE: usize = 50;
const DEFAULT_MESSAGE_LIMIT_MAX: usize = 500;
const DEFAULT_MEDIA_CACHE_MAX_BYTES: u64 = 256 * 1_024 * 1_024;
const DEFAULT_ART_WIDTH: u32 = 50;
const DEFAULT_ART_HEIGHT: u32 = 25;
const DEFAULT_DEMO_CHATTER_MS: u64 = 4_000;

/// Runtime configuration used by the terminal app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TuiConfig {
    /// Root for the media cache and the log file.
    pub data_dir: PathBuf,
    /// Fixed-rate interval of the dialog-list cycle.
    pub dialog_poll: Duration,
    /// Fixed-rate interval of the open conversation's message cycle.
    pub message_poll: Duration,
    /// Quiet period of the dialog search.
    pub search_debounce: Duration,
    pub dialog_limit: usize,
    /// Initial message window and the step used by "load more".
    pub message_page: usize,
    pub message_limit_max: usize,
    pub media_cache_max_bytes: u64,
    pub art_bounds: ArtBounds,
    /// Interval of scripted incoming messages in the demo backend.
    pub demo_chatter: Duration,
}

impl Default for TuiConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            dialog_poll: Duration::from_millis(DEFAULT_DIALOG_POLL_MS),
            message_poll: Duration::from_millis(DEFAULT_MESSAGE_POLL_MS),
            search_debounce: Duration::from_millis(DEFAULT_SEARCH_DEBOUNCE_MS),
            dialog_limit: DEFAULT_DIALOG_LIMIT,
            message_page: DEFAULT_MESSAGE_PAGE,
            message_limit_max: DEFAULT_MESSAGE_LIMIT_MAX,
            media_cache_max_bytes: DEFAULT_MEDIA_CACHE_MAX_BYTES,
            art_bounds: ArtBounds {
                max_width: DEFAULT_ART_WIDTH,
                max_height: DEFAULT_ART_HEIGHT,
            },
            demo_chatter: Duration::from_millis(DEFAULT_DEMO_CHATTER_MS),
        }
    }
}

impl TuiConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let data_dir = optional_trimmed_env("TALC_DATA_DIR", &mut lookup)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        let dialog_poll_ms =
            positive_u64("TALC_DIALOG_POLL_MS", DEFAULT_DIALOG_POLL_MS, &mut lookup)?;
        let message_poll_ms =
            positive_u64("TALC_MESSAGE_POLL_MS", DEFAULT_MESSAGE_POLL_MS, &mut lookup)?;
        let search_debounce_ms = positive_u64(
            "TALC_SEARCH_DEBOUNCE_MS",
            DEFAULT_SEARCH_DEBOUNCE_MS,
            &mut lookup,
        )?;
        let dialog_limit = positive_usize("TALC_DIALOG_LIMIT", DEFAULT_DIALOG_LIMIT, &mut lookup)?;
        let message_page = positive_usize("TALC_MESSAGE_PAGE", DEFAULT_MESSAGE_PAGE, &mut lookup)?;
        let message_limit_max = positive_usize(
            "TALC_MESSAGE_LIMIT_MAX",
            DEFAULT_MESSAGE_LIMIT_MAX,
            &mut lookup,
        )?;
        let media_cache_max_bytes = positive_u64(
            "TALC_MEDIA_CACHE_MAX_BYTES",
            DEFAULT_MEDIA_CACHE_MAX_BYTES,
            &mut lookup,
        )?;
        let art_width = positive_u64("TALC_ART_WIDTH", u64::from(DEFAULT_ART_WIDTH), &mut lookup)?;
        let art_height =
            positive_u64("TALC_ART_HEIGHT", u64::from(DEFAULT_ART_HEIGHT), &mut lookup)?;
        let demo_chatter_ms =
            positive_u64("TALC_DEMO_CHATTER_MS", DEFAULT_DEMO_CHATTER_MS, &mut lookup)?;

        if message_limit_max < message_page {
            return Err(ConfigError::InvalidValue {
                key: "TALC_MESSAGE_LIMIT_MAX",
                value: message_limit_max.to_string(),
                reason: format!("must be at least TALC_MESSAGE_PAGE ({message_page})"),
            });
        }

        Ok(Self {
            data_dir,
            dialog_poll: Duration::from_millis(dialog_poll_ms),
            message_poll: Duration::from_millis(message_poll_ms),
            search_debounce: Duration::from_millis(search_debounce_ms),
            dialog_limit,
            message_page,
            message_limit_max,
            media_cache_max_bytes,
            art_bounds: ArtBounds {
                max_width: to_u32("TALC_ART_WIDTH", art_width)?,
                max_height: to_u32("TALC_ART_HEIGHT", art_height)?,
            },
            demo_chatter: Duration::from_millis(demo_chatter_ms),
        })
    }

    pub fn media_cache_dir(&self) -> PathBuf {
        self.data_dir.join(MEDIA_CACHE_DIR)
    }
}

/// Errors produced while parsing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid {key}='{value}': {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_optional_u64<F>(key: &'static str, lookup: &mut F) -> Result<Option<u64>, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(None);
    };
    value
        .parse::<u64>()
        .map(Some)
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value,
            reason: err.to_string(),
        })
}

fn positive_u64<F>(key: &'static str, default: u64, lookup: &mut F) -> Result<u64, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let value = parse_optional_u64(key, lookup)?.unwrap_or(default);
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key,
            value: "0".to_owned(),
            reason: "must be at least 1".to_owned(),
        });
    }
    Ok(value)
}

fn positive_usize<F>(key: &'static str, default: usize, lookup: &mut F) -> Result<usize, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let value = positive_u64(key, default as u64, lookup)?;
    usize::try_from(value).map_err(|err| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason: err.to_string(),
    })
}

fn to_u32(key: &'static str, value: u64) -> Result<u32, ConfigError> {
    u32::try_from(value).map_err(|err| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason: err.to_string(),
    })
}
