use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use nocino_core::chain::DEFAULT_PREFIX_LEN;
use nocino_core::handler::DEFAULT_MAX_WORDS;
use nocino_core::stats::DEFAULT_STATS_INTERVAL;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind_addr: String,
    pub bot_username: String,
    pub trusted_ids: HashSet<i64>,
    pub num_words: usize,
    pub prefix_len: usize,
    pub gif_max_size: u64,
    pub sticker_max_size: u64,
    pub gif_store: PathBuf,
    pub sticker_store: PathBuf,
    pub media_resolver_url: String,
    pub stats_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            bind_addr: text("NOCINO_BIND", "127.0.0.1:8080"),
            bot_username: text("NOCINO_BOT_USERNAME", "nocino"),
            trusted_ids: parse_trusted_ids(&text("NOCINO_TRUSTED_IDS", ""))?,
            num_words: positive(&lookup, "NOCINO_NUM_WORDS", DEFAULT_MAX_WORDS)?,
            prefix_len: positive(&lookup, "NOCINO_PREFIX_LEN", DEFAULT_PREFIX_LEN)?,
            gif_max_size: number(&lookup, "NOCINO_GIF_MAX_SIZE", 1024 * 1024)?,
            sticker_max_size: number(&lookup, "NOCINO_STICKER_MAX_SIZE", 64 * 1024)?,
            gif_store: PathBuf::from(text("NOCINO_GIF_STORE", "./gif")),
            sticker_store: PathBuf::from(text("NOCINO_STICKER_STORE", "./sticker")),
            media_resolver_url: text("NOCINO_MEDIA_RESOLVER_URL", "http://127.0.0.1:8081/files"),
            stats_interval: Duration::from_secs(positive(
                &lookup,
                "NOCINO_STATS_INTERVAL_SECS",
                DEFAULT_STATS_INTERVAL.as_secs(),
            )?),
        })
    }
}

fn number<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key} must be a number, got '{raw}': {e}")),
    }
}

fn positive<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr + PartialOrd + Default,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let value = number(lookup, key, default)?;
    if value <= T::default() {
        bail!("{key} must be greater than zero");
    }
    Ok(value)
}

/// Comma separated sender ids allowed to talk to the bot in private.
fn parse_trusted_ids(raw: &str) -> Result<HashSet<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse::<i64>()
                .with_context(|| format!("NOCINO_TRUSTED_IDS contains an invalid id '{id}'"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.bot_username, "nocino");
        assert!(config.trusted_ids.is_empty());
        assert_eq!(config.num_words, DEFAULT_MAX_WORDS);
        assert_eq!(config.prefix_len, 1);
        assert_eq!(config.stats_interval, Duration::from_secs(600));
        assert_eq!(config.gif_store, PathBuf::from("./gif"));
        assert_eq!(config.sticker_store, PathBuf::from("./sticker"));
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            ("NOCINO_BOT_USERNAME", "@Nocino_Bot"),
            ("NOCINO_TRUSTED_IDS", " 12, 34 ,,-56 "),
            ("NOCINO_NUM_WORDS", "12"),
            ("NOCINO_GIF_MAX_SIZE", "2048"),
            ("NOCINO_STICKER_MAX_SIZE", "512"),
            ("NOCINO_GIF_STORE", "/var/lib/nocino/gif"),
            ("NOCINO_STATS_INTERVAL_SECS", "30"),
        ])
        .unwrap();
        assert_eq!(config.bot_username, "@Nocino_Bot");
        assert_eq!(config.trusted_ids, HashSet::from([12, 34, -56]));
        assert_eq!(config.num_words, 12);
        assert_eq!(config.gif_max_size, 2048);
        assert_eq!(config.sticker_max_size, 512);
        assert_eq!(config.gif_store, PathBuf::from("/var/lib/nocino/gif"));
        assert_eq!(config.stats_interval, Duration::from_secs(30));
    }

    #[test]
    fn rejects_garbage_numbers() {
        let err = config_from(&[("NOCINO_NUM_WORDS", "lots")]).unwrap_err();
        assert!(err.to_string().contains("NOCINO_NUM_WORDS"));

        let err = config_from(&[("NOCINO_TRUSTED_IDS", "1,two")]).unwrap_err();
        assert!(err.to_string().contains("two"));
    }

    #[test]
    fn rejects_zero_where_it_makes_no_sense() {
        for key in [
            "NOCINO_NUM_WORDS",
            "NOCINO_PREFIX_LEN",
            "NOCINO_STATS_INTERVAL_SECS",
        ] {
            assert!(config_from(&[(key, "0")]).is_err(), "{key} accepted zero");
        }
    }
}
