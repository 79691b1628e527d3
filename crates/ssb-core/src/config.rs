use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, generation::DEFAULT_STYLES, Result};

/// Typed configuration for the relay bot.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,

    // Image generation
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub image_model: String,
    pub generation_timeout: Duration,
    pub styles: Vec<String>,

    // Storage
    pub users_file: PathBuf,
    pub archive_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        // Required env vars
        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let Some(openai_api_key) = env_str("OPENAI_API_KEY").and_then(non_empty) else {
            return Err(Error::Config(
                "OPENAI_API_KEY environment variable is required".to_string(),
            ));
        };

        let openai_base_url = env_str("OPENAI_BASE_URL")
            .and_then(non_empty)
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        let image_model = env_str("OPENAI_IMAGE_MODEL")
            .and_then(non_empty)
            .unwrap_or_else(|| "gpt-image-1".to_string());

        // Image edits routinely take 10-30s; allow generous headroom.
        let generation_timeout =
            Duration::from_secs(env_u64("GENERATION_TIMEOUT_SECS").unwrap_or(120).max(1));

        let styles = parse_styles(env_str("SELFIE_STYLES")).unwrap_or_else(default_styles);
        if styles.is_empty() {
            return Err(Error::Config("style list must not be empty".to_string()));
        }

        let users_file = env_path("USERS_FILE").unwrap_or_else(|| "authorized_users.json".into());
        let archive_dir = env_path("IMAGE_ARCHIVE_DIR").unwrap_or_else(|| "generated_images".into());

        Ok(Self {
            telegram_bot_token,
            openai_api_key,
            openai_base_url,
            image_model,
            generation_timeout,
            styles,
            users_file,
            archive_dir,
        })
    }
}

pub fn default_styles() -> Vec<String> {
    DEFAULT_STYLES.iter().map(|s| s.to_string()).collect()
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, strip_quotes(v.trim()));
    }
}

fn strip_quotes(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env_str(key).and_then(non_empty).map(PathBuf::from)
}

/// Styles are free-form prose and may contain commas, so the override uses `|`.
fn parse_styles(v: Option<String>) -> Option<Vec<String>> {
    let v = v?;
    let out = v
        .split('|')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect::<Vec<_>>();
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
