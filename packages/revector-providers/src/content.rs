use std::time::Duration;

use color_eyre::Result;
use reqwest::{Client, StatusCode};

use revector_domain::{SourceDocument, SourceTable};

/// Fetch the current embeddable payload of one record from the CRUD
/// application. `None` means the record no longer exists.
pub async fn fetch(
	cfg: &revector_config::ContentProviderConfig,
	organization_id: &str,
	source_table: SourceTable,
	source_id: &str,
) -> Result<Option<SourceDocument>> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}/{}/{}", cfg.api_base, cfg.path, source_table, source_id);
	let res = client
		.get(url)
		.headers(crate::auth_headers(cfg.api_key.as_deref(), &cfg.default_headers)?)
		.query(&[("organization_id", organization_id)])
		.send()
		.await?;

	if res.status() == StatusCode::NOT_FOUND {
		return Ok(None);
	}

	let document: SourceDocument = res.error_for_status()?.json().await?;

	Ok(Some(document))
}

/// Enumerate every record of one content type for an organization. Used by
/// the bulk enqueue path only.
pub async fn list(
	cfg: &revector_config::ContentProviderConfig,
	organization_id: &str,
	source_table: SourceTable,
) -> Result<Vec<SourceDocument>> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}/{}", cfg.api_base, cfg.path, source_table);
	let res = client
		.get(url)
		.headers(crate::auth_headers(cfg.api_key.as_deref(), &cfg.default_headers)?)
		.query(&[("organization_id", organization_id)])
		.send()
		.await?;
	let documents: Vec<SourceDocument> = res.error_for_status()?.json().await?;

	Ok(documents)
}
