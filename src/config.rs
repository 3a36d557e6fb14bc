use anyhow::{Context, Result, anyhow, bail};
use dotenvy::dotenv;
use keyring::Entry;
use serde::Deserialize;
use std::{fs, time::Duration};
use url::Url;

use mput::{
    Credentials, PlatformConfig, UploadSettings,
    client::{DEFAULT_BUCKET, DEFAULT_OBJECT_TYPE, DEFAULT_REQUEST_TIMEOUT},
    retry::{DEFAULT_BACKOFF_UNIT, RetryPolicy},
    serde_utils::deserialize_opt_duration,
    session::{FileMetadata, RegistrationIdentity},
};

pub const KEYRING_SERVICE: &str = "mput-session";
pub const KEYRING_SESSION_USER: &str = "session-token";
pub const KEYRING_CSRF_USER: &str = "csrf-token";

#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    base_url: Option<Url>,
    model_id: Option<u64>,
    bucket: Option<String>,
    object_type: Option<String>,
    version_id: Option<u64>,
    registration_identity: Option<RegistrationIdentity>,
    #[serde(default)]
    upload: UploadSection,
    #[serde(default)]
    metadata: MetadataSection,
}

#[derive(Debug, Deserialize, Default)]
struct UploadSection {
    concurrency: Option<usize>,
    max_attempts: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_duration")]
    backoff_unit: Option<Duration>,
    #[serde(default, deserialize_with = "deserialize_opt_duration")]
    request_timeout: Option<Duration>,
    finalize_attempts: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct MetadataSection {
    format: Option<String>,
    precision: Option<String>,
    size_class: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ConfigEnv {
    mput_base_url: Option<Url>,
    mput_model_id: Option<u64>,
    mput_session_token: Option<String>,
    mput_csrf_token: Option<String>,
    mput_version_id: Option<u64>,
    mput_concurrency: Option<usize>,
}

pub struct Config {
    pub platform: PlatformConfig,
    pub credentials: Credentials,
    pub settings: UploadSettings,
    pub version_id: Option<u64>,
    pub metadata: FileMetadata,
    pub identity: RegistrationIdentity,
}

fn merge_config<F>(base: ConfigFile, override_config: ConfigEnv, keyring_secret: F) -> Result<Config>
where
    F: Fn(&str) -> Result<String>,
{
    let base_url = override_config
        .mput_base_url
        .or(base.base_url)
        .ok_or(anyhow!("No platform base URL provided"))?;

    let session_token = match override_config.mput_session_token {
        Some(token) => token,
        None => keyring_secret(KEYRING_SESSION_USER).context(
            "Session token not specified via environment variable nor present in OS keyring",
        )?,
    };
    let csrf_token = override_config
        .mput_csrf_token
        .or_else(|| keyring_secret(KEYRING_CSRF_USER).ok());

    let concurrency = override_config
        .mput_concurrency
        .or(base.upload.concurrency)
        .unwrap_or(mput::coordinator::DEFAULT_CONCURRENCY);
    if concurrency == 0 {
        bail!("upload concurrency must be at least 1");
    }
    if base.upload.max_attempts == Some(0) || base.upload.finalize_attempts == Some(0) {
        bail!("attempt budgets must be at least 1");
    }

    let backoff_unit = base.upload.backoff_unit.unwrap_or(DEFAULT_BACKOFF_UNIT);
    let defaults = UploadSettings::default();
    let settings = UploadSettings {
        concurrency,
        part_retry: RetryPolicy::new(
            base.upload
                .max_attempts
                .unwrap_or(defaults.part_retry.max_attempts),
            backoff_unit,
        ),
        finalize_retry: RetryPolicy::new(
            base.upload
                .finalize_attempts
                .unwrap_or(defaults.finalize_retry.max_attempts),
            backoff_unit,
        ),
    };

    let default_metadata = FileMetadata::default();
    let metadata = FileMetadata {
        format: base.metadata.format.unwrap_or(default_metadata.format),
        precision: base.metadata.precision.unwrap_or(default_metadata.precision),
        size_class: base.metadata.size_class.unwrap_or(default_metadata.size_class),
    };

    Ok(Config {
        platform: PlatformConfig {
            base_url,
            model_id: override_config.mput_model_id.or(base.model_id),
            bucket: base.bucket.unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            object_type: base
                .object_type
                .unwrap_or_else(|| DEFAULT_OBJECT_TYPE.to_string()),
            request_timeout: base.upload.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        },
        credentials: Credentials {
            session_token,
            csrf_token,
        },
        settings,
        version_id: override_config.mput_version_id.or(base.version_id),
        metadata,
        identity: base.registration_identity.unwrap_or_default(),
    })
}

fn keyring_secret(user: &str) -> Result<String> {
    let entry = Entry::new(KEYRING_SERVICE, user)?;
    let secret = entry.get_secret()?;
    Ok(String::from_utf8(secret)?)
}

pub fn read_config() -> Result<Config> {
    let _ = dotenv();
    let env_config =
        envy::from_env::<ConfigEnv>().context("Invalid MPUT_* environment variable")?;

    let project_dirs = directories::ProjectDirs::from("io", "mput", "mput")
        .ok_or(anyhow!("Unable to determine home directory"))?;
    let config_file = project_dirs.config_dir().join("config.toml");
    let file_config = if let Ok(config) = fs::read_to_string(&config_file) {
        toml::from_str(&config)
            .with_context(|| format!("Failed to parse {}", config_file.display()))?
    } else {
        ConfigFile::default()
    };

    merge_config(file_config, env_config, keyring_secret)
}

pub fn set_credentials_keyring(session_token: String, csrf_token: Option<String>) -> Result<()> {
    let entry = Entry::new(KEYRING_SERVICE, KEYRING_SESSION_USER)?;
    entry.set_secret(session_token.as_bytes())?;
    if let Some(csrf_token) = csrf_token {
        let entry = Entry::new(KEYRING_SERVICE, KEYRING_CSRF_USER)?;
        entry.set_secret(csrf_token.as_bytes())?;
    }
    println!("Session credentials stored for use with mput");
    Ok(())
}
