// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{
    CacheField, ConfigFile, PlannedRequest, RawConfigFile, RequestEntry, RetryField,
    ServiceSection,
};
use crate::engine::Priority;
use crate::errors::{FetchqError, Result};
use crate::request::{Body, RequestSpec};
use crate::service::{
    CacheConfig, CacheOption, CacheOverrides, RequestOptions, RetryConfig, RetryOption,
    RetryOverrides, ServiceConfig,
};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = FetchqError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;

        let service = build_service(&raw.service);
        let requests = raw.request.into_iter().map(build_request).collect();

        Ok(ConfigFile { service, requests })
    }
}

/// Check every semantic rule the TOML types alone can't express.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_service(&cfg.service)?;
    for (index, entry) in cfg.request.iter().enumerate() {
        validate_request(index, entry, cfg.service.base_url.is_some())?;
    }
    Ok(())
}

fn config_error(message: String) -> FetchqError {
    FetchqError::ConfigError(message)
}

fn validate_service(service: &ServiceSection) -> Result<()> {
    if service.max_concurrent == 0 {
        return Err(config_error(
            "[service].max_concurrent must be >= 1 (got 0)".to_string(),
        ));
    }

    validate_priority("[service].priority", service.priority)?;

    if let Some(base_url) = &service.base_url
        && !(base_url.starts_with("http://") || base_url.starts_with("https://"))
    {
        return Err(config_error(format!(
            "[service].base_url must start with http:// or https:// (got '{base_url}')"
        )));
    }

    if service.timeout_ms == Some(0) {
        return Err(config_error("[service].timeout_ms must be >= 1".to_string()));
    }

    if service.cache.ttl_ms == 0 {
        return Err(config_error("[service.cache].ttl_ms must be >= 1".to_string()));
    }

    Ok(())
}

fn validate_priority(field: &str, priority: u8) -> Result<()> {
    if priority > Priority::MAX.get() {
        return Err(config_error(format!(
            "{field} must be between {} and {} (got {priority})",
            Priority::MIN,
            Priority::MAX
        )));
    }
    Ok(())
}

fn validate_request(index: usize, entry: &RequestEntry, has_base_url: bool) -> Result<()> {
    let label = format!("[[request]] #{}", index + 1);

    if entry.url.trim().is_empty() {
        return Err(config_error(format!("{label}: url must not be empty")));
    }

    if !entry.url.contains("://") && !has_base_url {
        return Err(config_error(format!(
            "{label}: relative url '{}' requires [service].base_url",
            entry.url
        )));
    }

    if let Some(priority) = entry.priority {
        validate_priority(&format!("{label}: priority"), priority)?;
    }

    if entry.body.is_some() && entry.text.is_some() {
        return Err(config_error(format!(
            "{label}: `body` and `text` are mutually exclusive"
        )));
    }

    if entry.timeout_ms == Some(0) {
        return Err(config_error(format!("{label}: timeout_ms must be >= 1")));
    }

    if let Some(CacheField::Table(table)) = &entry.cache
        && table.ttl_ms == Some(0)
    {
        return Err(config_error(format!("{label}: cache.ttl_ms must be >= 1")));
    }

    Ok(())
}

fn build_service(section: &ServiceSection) -> ServiceConfig {
    let defaults = CacheConfig::default();

    ServiceConfig {
        base_url: section.base_url.clone(),
        max_concurrent: section.max_concurrent,
        timeout: section.timeout_ms.map(Duration::from_millis),
        priority: Priority::new(section.priority),
        duplicate: section.duplicate,
        headers: section.headers.clone(),
        retry: RetryConfig {
            enabled: section.retry.enabled,
            max_count: section.retry.max_count,
            delay: Duration::from_millis(section.retry.delay_ms),
            timing: section.retry.timing,
            predicate: None,
            on_retry: None,
        },
        cache: CacheConfig {
            enabled: section.cache.enabled,
            storage: section.cache.storage,
            ttl: Duration::from_millis(section.cache.ttl_ms),
            dir: section.cache.dir.clone().unwrap_or(defaults.dir),
            namespace: section
                .cache
                .namespace
                .clone()
                .unwrap_or(defaults.namespace),
        },
    }
}

fn build_request(entry: RequestEntry) -> PlannedRequest {
    let body = match (entry.body, entry.text) {
        (Some(json), _) => Body::Json(json),
        (None, Some(text)) => Body::Text(text),
        (None, None) => Body::Empty,
    };

    let mut spec = RequestSpec::new(entry.method, entry.url).body(body);
    spec.headers = entry.headers;
    spec.query = entry.query.into_iter().collect();
    spec.timeout = entry.timeout_ms.map(Duration::from_millis);

    let retry = match entry.retry {
        None => RetryOption::Inherit,
        Some(RetryField::Flag(false)) => RetryOption::Disabled,
        Some(RetryField::Flag(true)) => RetryOption::Enabled,
        Some(RetryField::Table(table)) if !table.enabled => RetryOption::Disabled,
        Some(RetryField::Table(table)) => RetryOption::Custom(RetryOverrides {
            max_count: table.max_count,
            delay: table.delay_ms.map(Duration::from_millis),
            timing: table.timing,
            predicate: None,
            on_retry: None,
        }),
    };

    let cache = match entry.cache {
        None => CacheOption::Inherit,
        Some(CacheField::Flag(false)) => CacheOption::Disabled,
        Some(CacheField::Flag(true)) => CacheOption::Enabled,
        Some(CacheField::Table(table)) if !table.enabled => CacheOption::Disabled,
        Some(CacheField::Table(table)) => CacheOption::Custom(CacheOverrides {
            storage: table.storage,
            ttl: table.ttl_ms.map(Duration::from_millis),
        }),
    };

    let options = RequestOptions {
        priority: entry.priority.map(Priority::new),
        duplicate: entry.duplicate,
        retry,
        cache,
        timeout: None,
    };

    PlannedRequest { spec, options }
}
