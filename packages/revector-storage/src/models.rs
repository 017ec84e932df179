use std::{fmt, str::FromStr};

use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
	Pending,
	Processing,
	Completed,
	Failed,
}
impl JobStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::Processing => "processing",
			Self::Completed => "completed",
			Self::Failed => "failed",
		}
	}

	/// Terminal statuses never transition again without an external
	/// re-enqueue.
	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Completed | Self::Failed)
	}
}
impl fmt::Display for JobStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for JobStatus {
	type Err = crate::Error;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		match value {
			"pending" => Ok(Self::Pending),
			"processing" => Ok(Self::Processing),
			"completed" => Ok(Self::Completed),
			"failed" => Ok(Self::Failed),
			other => Err(crate::Error::InvalidArgument(format!("Unknown job status: {other}."))),
		}
	}
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct EmbeddingJob {
	pub job_id: Uuid,
	pub organization_id: String,
	pub source_table: String,
	pub source_field: String,
	pub source_id: String,
	pub status: String,
	pub priority: i32,
	pub content_hash: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	pub available_at: OffsetDateTime,
	pub claimed_at: Option<OffsetDateTime>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct EmbeddingRow {
	pub embedding_id: Uuid,
	pub organization_id: String,
	pub source_table: String,
	pub source_field: String,
	pub source_id: String,
	pub vector: Vec<f32>,
	pub content_hash: String,
	pub model: String,
	pub is_active: bool,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
