//! Configuration types.
//!
//! Everything comes from the environment and is read once, at process
//! entry. `JobConfig::from_lookup` takes any key→value function so tests
//! never touch the real environment.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use secrecy::SecretString;
use tracing::info;

use crate::dates::TargetZone;
use crate::error::ConfigError;
use crate::importer::{DedupPolicy, ExtractOptions, ImportConfig};
use crate::mailbox::{ImapConfig, TokenCache};
use crate::notify::SmtpConfig;
use crate::store::AirtableConfig;
use crate::store::airtable::DEFAULT_API_URL;

/// Variables without which the job cannot run.
pub const REQUIRED_VARS: [&str; 5] = [
    "EMAIL_ADDRESS",
    "EMAIL_PASSWORD",
    "AIRTABLE_PERSONAL_ACCESS_TOKEN",
    "AIRTABLE_BASE_ID",
    "AIRTABLE_TABLE_NAME",
];

/// Longest accepted import window, in days.
pub const MAX_WINDOW_DAYS: i64 = 3650;

/// Everything one run of the job needs.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub smtp: SmtpConfig,
    pub store: AirtableConfig,
    pub mailbox: ImapConfig,
    pub import: ImportConfig,
    /// Zone due dates are compared and displayed in.
    pub zone: TargetZone,
    /// Directory for rolling log files, if file logging is on.
    pub log_dir: Option<PathBuf>,
}

impl JobConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let missing: Vec<&str> = REQUIRED_VARS
            .iter()
            .copied()
            .filter(|key| get(*key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingEnvVar(missing.join(", ")));
        }

        let address = get("EMAIL_ADDRESS").unwrap_or_default();
        let password = get("EMAIL_PASSWORD").unwrap_or_default();

        let smtp = SmtpConfig {
            host: get("SMTP_HOST").unwrap_or_else(|| "smtp.gmail.com".into()),
            port: parse_or(&get, "SMTP_PORT", 465)?,
            username: address.clone(),
            password: SecretString::from(password.clone()),
            from_address: address.clone(),
        };

        let store = AirtableConfig {
            api_url: get("AIRTABLE_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into()),
            base_id: get("AIRTABLE_BASE_ID").unwrap_or_default(),
            table_name: get("AIRTABLE_TABLE_NAME").unwrap_or_default(),
            token: SecretString::from(get("AIRTABLE_PERSONAL_ACCESS_TOKEN").unwrap_or_default()),
        };

        let headless = get("CI").is_some() || get("GITHUB_ACTIONS").is_some();
        let mailbox = ImapConfig {
            host: get("IMAP_HOST").unwrap_or_else(|| "imap.gmail.com".into()),
            port: parse_or(&get, "IMAP_PORT", 993)?,
            folder: get("IMAP_FOLDER").unwrap_or_else(|| "INBOX".into()),
            username: address,
            password: SecretString::from(password),
            token_cache: TokenCache {
                path: get("GMAIL_TOKEN_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("token.json")),
                env_token: get("GMAIL_TOKEN_BASE64").map(SecretString::from),
                headless,
            },
        };

        let import = ImportConfig {
            enabled: parse_flag(&get, "IMPORT_ENABLED", true)?,
            subject_filter: get("IMPORT_SUBJECT_FILTER").unwrap_or_else(|| "Allotment".into()),
            window_days: parse_or(&get, "IMPORT_WINDOW_DAYS", 7)?,
            dedup: parse_or(&get, "IMPORT_DEDUP", DedupPolicy::Code)?,
            extract: ExtractOptions {
                skip_header_lines: parse_flag(&get, "IMPORT_SKIP_HEADERS", true)?,
            },
        };
        if !(1..=MAX_WINDOW_DAYS).contains(&import.window_days) {
            return Err(ConfigError::InvalidValue {
                key: "IMPORT_WINDOW_DAYS".into(),
                message: format!("must be between 1 and {MAX_WINDOW_DAYS}"),
            });
        }

        Ok(Self {
            smtp,
            store,
            mailbox,
            import,
            zone: parse_or(&get, "REMINDER_UTC_OFFSET", TargetZone::default())?,
            log_dir: get("REMINDER_LOG_DIR").map(PathBuf::from),
        })
    }
}

/// Log which required variables are present. Values are never logged.
pub fn log_presence(lookup: impl Fn(&str) -> Option<String>) {
    for key in REQUIRED_VARS {
        let set = lookup(key).is_some_and(|v| !v.trim().is_empty());
        info!(var = key, set, "Environment check");
    }
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}

fn parse_flag(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(raw) = get(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got `{other}`"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            ("EMAIL_ADDRESS", "bills@gmail.com"),
            ("EMAIL_PASSWORD", "app-password"),
            ("AIRTABLE_PERSONAL_ACCESS_TOKEN", "pat123"),
            ("AIRTABLE_BASE_ID", "appBASE"),
            ("AIRTABLE_TABLE_NAME", "Reminders"),
        ]
    }

    #[test]
    fn defaults_applied() {
        let config = JobConfig::from_lookup(env(&required())).unwrap();
        assert_eq!(config.smtp.host, "smtp.gmail.com");
        assert_eq!(config.smtp.port, 465);
        assert_eq!(config.smtp.from_address, "bills@gmail.com");
        assert_eq!(config.store.api_url, "https://api.airtable.com");
        assert_eq!(config.store.token.expose_secret(), "pat123");
        assert_eq!(config.mailbox.host, "imap.gmail.com");
        assert_eq!(config.mailbox.port, 993);
        assert_eq!(config.mailbox.folder, "INBOX");
        assert_eq!(config.mailbox.token_cache.path, PathBuf::from("token.json"));
        assert!(!config.mailbox.token_cache.headless);
        assert!(config.import.enabled);
        assert_eq!(config.import.subject_filter, "Allotment");
        assert_eq!(config.import.window_days, 7);
        assert_eq!(config.import.dedup, DedupPolicy::Code);
        assert!(config.import.extract.skip_header_lines);
        assert_eq!(config.zone, TargetZone::ist());
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn all_missing_vars_reported_together() {
        let err = JobConfig::from_lookup(env(&[
            ("EMAIL_ADDRESS", "bills@gmail.com"),
            ("AIRTABLE_BASE_ID", "  "),
        ]))
        .unwrap_err();
        let ConfigError::MissingEnvVar(vars) = &err else {
            panic!("expected MissingEnvVar, got {err:?}");
        };
        assert_eq!(
            vars,
            "EMAIL_PASSWORD, AIRTABLE_PERSONAL_ACCESS_TOKEN, AIRTABLE_BASE_ID, AIRTABLE_TABLE_NAME"
        );
    }

    #[test]
    fn overrides_parsed() {
        let mut vars = required();
        vars.extend([
            ("SMTP_PORT", "587"),
            ("REMINDER_UTC_OFFSET", "-04:00"),
            ("IMPORT_ENABLED", "false"),
            ("IMPORT_DEDUP", "code-or-issuer"),
            ("IMPORT_WINDOW_DAYS", "14"),
            ("IMPORT_SKIP_HEADERS", "0"),
            ("GITHUB_ACTIONS", "true"),
            ("GMAIL_TOKEN_BASE64", "e30="),
            ("REMINDER_LOG_DIR", "/var/log/reminders"),
        ]);
        let config = JobConfig::from_lookup(env(&vars)).unwrap();
        assert_eq!(config.smtp.port, 587);
        assert_eq!(config.zone.to_string(), "UTC-04:00");
        assert!(!config.import.enabled);
        assert_eq!(config.import.dedup, DedupPolicy::CodeOrIssuer);
        assert_eq!(config.import.window_days, 14);
        assert!(!config.import.extract.skip_header_lines);
        assert!(config.mailbox.token_cache.headless);
        assert!(config.mailbox.token_cache.env_token.is_some());
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/reminders")));
    }

    #[test]
    fn invalid_values_rejected() {
        for (key, value) in [
            ("SMTP_PORT", "smtp"),
            ("REMINDER_UTC_OFFSET", "IST"),
            ("IMPORT_DEDUP", "issuer"),
            ("IMPORT_ENABLED", "maybe"),
            ("IMPORT_WINDOW_DAYS", "0"),
            ("IMPORT_WINDOW_DAYS", "1000000000"),
        ] {
            let mut vars = required();
            vars.push((key, value));
            let err = JobConfig::from_lookup(env(&vars)).unwrap_err();
            assert!(
                matches!(&err, ConfigError::InvalidValue { key: k, .. } if k == key),
                "{key}={value} gave {err:?}"
            );
        }
    }
}
