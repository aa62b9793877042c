//! Configuration for Medley services.
//!
//! Configuration is environment-first: every knob has a default except the
//! provider API key, which is required and fatal when absent.
//!
//! # Environment Variable Mapping
//!
//! ## Provider credentials
//! - `GEMINI_API_KEY` → api_key (checked first)
//! - `GOOGLE_API_KEY` → api_key (fallback)
//!
//! ## Provider endpoint
//! - `MEDLEY_API_HOST` → api_host
//! - `MEDLEY_MODEL` → model
//!
//! ## Media readiness polling
//! - `MEDLEY_POLL_INTERVAL_SECS` → poll_interval_secs
//! - `MEDLEY_POLL_DEADLINE_SECS` → poll_deadline_secs
//!
//! ## Session behavior
//! - `MEDLEY_TRANSCRIPT_POLICY` → transcript_policy ("full" or "latest")
//! - `MEDLEY_RESEND_SYSTEM` → resend_system_instruction ("true"/"false")
//!
//! ## Logging
//! - `MEDLEY_LOG_LEVEL` → log_level
//! - `MEDLEY_LOG_FORMAT` → log_format ("pretty" or "json")

use crate::error::{ChatError, Result};
use serde::{Deserialize, Serialize};

/// Default Gemini API host.
pub const DEFAULT_API_HOST: &str = "https://generativelanguage.googleapis.com";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// How much of the conversation is re-sent with each turn.
///
/// `Full` resends the entire transcript every turn; `Latest` sends only the
/// newest user turn (plus any media context).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptPolicy {
    /// Resend the full transcript with every request.
    #[default]
    Full,
    /// Send only the latest user turn with every request.
    Latest,
}

impl TranscriptPolicy {
    /// Parse from a configuration string.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "latest" => Ok(Self::Latest),
            other => Err(ChatError::Config(format!(
                "Unknown transcript policy '{other}' (expected 'full' or 'latest')"
            ))),
        }
    }
}

/// Runtime configuration for the chat session and provider client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Provider API key. Required; startup fails without one.
    pub api_key: String,

    /// Base URL of the generative-language API.
    #[serde(default = "default_api_host")]
    pub api_host: String,

    /// Model identifier sent with every generation request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Seconds between media readiness polls (video uploads).
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Overall deadline for media readiness polling, in seconds.
    #[serde(default = "default_poll_deadline_secs")]
    pub poll_deadline_secs: u64,

    /// How much history is resent per turn.
    #[serde(default)]
    pub transcript_policy: TranscriptPolicy,

    /// Whether the system instruction is re-sent with every turn
    /// instead of only the first.
    #[serde(default)]
    pub resend_system_instruction: bool,

    /// Base log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_api_host() -> String {
    DEFAULT_API_HOST.into()
}

fn default_model() -> String {
    DEFAULT_MODEL.into()
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_poll_deadline_secs() -> u64 {
    600
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Fails with `ChatError::Config` when no API key is present.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// `from_env` delegates here; tests pass a closure over a map instead of
    /// mutating the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup("GEMINI_API_KEY")
            .or_else(|| lookup("GOOGLE_API_KEY"))
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                ChatError::Config(
                    "No API key found. Set GEMINI_API_KEY or GOOGLE_API_KEY.".into(),
                )
            })?;

        let transcript_policy = match lookup("MEDLEY_TRANSCRIPT_POLICY") {
            Some(raw) => TranscriptPolicy::parse(&raw)?,
            None => TranscriptPolicy::default(),
        };

        Ok(Self {
            api_key,
            api_host: lookup("MEDLEY_API_HOST").unwrap_or_else(default_api_host),
            model: lookup("MEDLEY_MODEL").unwrap_or_else(default_model),
            poll_interval_secs: parse_secs(
                lookup("MEDLEY_POLL_INTERVAL_SECS"),
                "MEDLEY_POLL_INTERVAL_SECS",
                default_poll_interval_secs(),
            )?,
            poll_deadline_secs: parse_secs(
                lookup("MEDLEY_POLL_DEADLINE_SECS"),
                "MEDLEY_POLL_DEADLINE_SECS",
                default_poll_deadline_secs(),
            )?,
            transcript_policy,
            resend_system_instruction: lookup("MEDLEY_RESEND_SYSTEM")
                .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
                .unwrap_or(false),
            log_level: lookup("MEDLEY_LOG_LEVEL").unwrap_or_else(default_log_level),
            log_format: lookup("MEDLEY_LOG_FORMAT").unwrap_or_else(default_log_format),
        })
    }
}

fn parse_secs(raw: Option<String>, name: &str, default: u64) -> Result<u64> {
    match raw {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ChatError::Config(format!("Invalid value for {name}: '{v}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        move |key| map.get(key).map(|v| (*v).to_string())
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let result = Config::from_lookup(lookup_from(&[]));
        assert!(matches!(result, Err(ChatError::Config(_))));
    }

    #[test]
    fn test_gemini_key_takes_priority() {
        let config = Config::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "gem-key"),
            ("GOOGLE_API_KEY", "goog-key"),
        ]))
        .unwrap();
        assert_eq!(config.api_key, "gem-key");
    }

    #[test]
    fn test_google_key_fallback() {
        let config =
            Config::from_lookup(lookup_from(&[("GOOGLE_API_KEY", "goog-key")])).unwrap();
        assert_eq!(config.api_key, "goog-key");
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[("GOOGLE_API_KEY", "k")])).unwrap();
        assert_eq!(config.api_host, DEFAULT_API_HOST);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.poll_interval_secs, 10);
        assert_eq!(config.poll_deadline_secs, 600);
        assert_eq!(config.transcript_policy, TranscriptPolicy::Full);
        assert!(!config.resend_system_instruction);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, "pretty");
    }

    #[test]
    fn test_transcript_policy_parse() {
        assert_eq!(
            TranscriptPolicy::parse("latest").unwrap(),
            TranscriptPolicy::Latest
        );
        assert_eq!(
            TranscriptPolicy::parse(" Full ").unwrap(),
            TranscriptPolicy::Full
        );
        assert!(TranscriptPolicy::parse("everything").is_err());
    }

    #[test]
    fn test_invalid_poll_interval_rejected() {
        let result = Config::from_lookup(lookup_from(&[
            ("GOOGLE_API_KEY", "k"),
            ("MEDLEY_POLL_INTERVAL_SECS", "soon"),
        ]));
        assert!(matches!(result, Err(ChatError::Config(_))));
    }

    #[test]
    fn test_resend_system_flag() {
        let config = Config::from_lookup(lookup_from(&[
            ("GOOGLE_API_KEY", "k"),
            ("MEDLEY_RESEND_SYSTEM", "true"),
        ]))
        .unwrap();
        assert!(config.resend_system_instruction);
    }
}
