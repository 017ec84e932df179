mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, ContentProviderConfig, EmbeddingProviderConfig, Postgres, Providers, Queue, Service,
	Storage,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	parse(&raw, path)
}

fn parse(raw: &str, path: &Path) -> Result<Config> {
	let mut cfg: Config = toml::from_str(raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	if !raw.contains("[queue]") {
		tracing::warn!("No [queue] section in config. Using default drain tunables.");
	}

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.service.admin_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.admin_bind must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.embedding.api_key must be non-empty.".to_string(),
		});
	}
	if cfg.providers.embedding.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.content.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "providers.content.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.queue.batch_size == 0 {
		return Err(Error::Validation {
			message: "queue.batch_size must be greater than zero.".to_string(),
		});
	}
	if cfg.queue.max_concurrent_jobs == 0 {
		return Err(Error::Validation {
			message: "queue.max_concurrent_jobs must be greater than zero.".to_string(),
		});
	}
	if cfg.queue.job_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "queue.job_timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.queue.max_attempts < 1 {
		return Err(Error::Validation {
			message: "queue.max_attempts must be at least one.".to_string(),
		});
	}
	if cfg.queue.diff_rebuild_threshold_percent > 100 {
		return Err(Error::Validation {
			message: "queue.diff_rebuild_threshold_percent must be 100 or less.".to_string(),
		});
	}
	if cfg.queue.poll_interval_ms == 0 {
		return Err(Error::Validation {
			message: "queue.poll_interval_ms must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg
		.providers
		.content
		.api_key
		.as_deref()
		.map(|key| key.trim().is_empty())
		.unwrap_or(false)
	{
		cfg.providers.content.api_key = None;
	}
}
