use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Content types whose records feed the embedding index. One tag per source
/// table; anything else is rejected at the boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTable {
	Posts,
	Services,
	Faqs,
	CaseStudies,
	Products,
}
impl SourceTable {
	pub const ALL: [Self; 5] =
		[Self::Posts, Self::Services, Self::Faqs, Self::CaseStudies, Self::Products];

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Posts => "posts",
			Self::Services => "services",
			Self::Faqs => "faqs",
			Self::CaseStudies => "case_studies",
			Self::Products => "products",
		}
	}
}
impl fmt::Display for SourceTable {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone)]
pub struct UnknownSourceTable(pub String);
impl fmt::Display for UnknownSourceTable {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Unknown source table: {}.", self.0)
	}
}
impl std::error::Error for UnknownSourceTable {}

impl FromStr for SourceTable {
	type Err = UnknownSourceTable;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		match value {
			"posts" => Ok(Self::Posts),
			"services" => Ok(Self::Services),
			"faqs" => Ok(Self::Faqs),
			"case_studies" => Ok(Self::CaseStudies),
			"products" => Ok(Self::Products),
			other => Err(UnknownSourceTable(other.to_string())),
		}
	}
}

/// Per-content-type payload, tagged by `source_table`. Each variant carries
/// the fields that matter for embedding; everything else the CRUD app stores
/// stays out of the hash.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "source_table", rename_all = "snake_case")]
pub enum SourceContent {
	Posts {
		title: String,
		body: String,
		#[serde(default)]
		excerpt: Option<String>,
	},
	Services {
		name: String,
		description: String,
		#[serde(default)]
		benefits: Vec<String>,
	},
	Faqs {
		question: String,
		answer: String,
	},
	CaseStudies {
		title: String,
		summary: String,
		body: String,
	},
	Products {
		name: String,
		description: String,
		#[serde(default)]
		features: Vec<String>,
	},
}
impl SourceContent {
	pub fn source_table(&self) -> SourceTable {
		match self {
			Self::Posts { .. } => SourceTable::Posts,
			Self::Services { .. } => SourceTable::Services,
			Self::Faqs { .. } => SourceTable::Faqs,
			Self::CaseStudies { .. } => SourceTable::CaseStudies,
			Self::Products { .. } => SourceTable::Products,
		}
	}

	/// Concatenation of the embeddable text fields, in declaration order.
	/// Blank fields are dropped so they never perturb the content hash.
	pub fn embeddable_text(&self) -> String {
		let parts: Vec<&str> = match self {
			Self::Posts { title, body, excerpt } => {
				let mut parts = vec![title.as_str(), body.as_str()];

				if let Some(excerpt) = excerpt {
					parts.push(excerpt.as_str());
				}

				parts
			},
			Self::Services { name, description, benefits } => {
				let mut parts = vec![name.as_str(), description.as_str()];

				parts.extend(benefits.iter().map(String::as_str));

				parts
			},
			Self::Faqs { question, answer } => vec![question.as_str(), answer.as_str()],
			Self::CaseStudies { title, summary, body } =>
				vec![title.as_str(), summary.as_str(), body.as_str()],
			Self::Products { name, description, features } => {
				let mut parts = vec![name.as_str(), description.as_str()];

				parts.extend(features.iter().map(String::as_str));

				parts
			},
		};

		parts.into_iter().map(str::trim).filter(|part| !part.is_empty()).collect::<Vec<_>>().join("\n\n")
	}
}

/// One record as returned by the source-of-content provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceDocument {
	pub source_id: String,
	#[serde(flatten)]
	pub content: SourceContent,
}
