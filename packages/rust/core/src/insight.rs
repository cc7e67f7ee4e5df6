//! Insight generation for stored content.
//!
//! [`ClassifierInsightGenerator`] asks the classifier for a JSON analysis and
//! repairs whatever comes back. It never fails: a classifier error becomes a
//! degraded [`NewInsight`] carrying `error`.

use std::sync::Arc;

use aidigest_shared::{DEFAULT_IMPORTANCE_SCORE, NewInsight, Result, SourceKind, clamp_score};
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::classifier::{Classifier, strip_code_fences};

/// Category of a degraded insight.
pub const ANALYSIS_FAILED_CATEGORY: &str = "Analysis Failed";

/// Characters of an unparseable reply kept as the summary.
const FALLBACK_SUMMARY_CHARS: usize = 200;

#[async_trait]
pub trait InsightGenerator: Send + Sync {
    /// Analyze one piece of content. Implementations report internal
    /// problems through [`NewInsight::error`]; an `Err` is reserved for
    /// callers that cannot produce any answer at all.
    async fn generate_insight(&self, content: &str, kind: SourceKind) -> Result<NewInsight>;
}

// ---------------------------------------------------------------------------
// Category rules
// ---------------------------------------------------------------------------

/// A category and the lowercased keywords that select it.
#[derive(Debug, Clone)]
pub struct CategoryRule {
    pub category: String,
    keywords: Vec<String>,
}

impl CategoryRule {
    pub fn keywords(category: &str, words: &[&str]) -> Self {
        Self {
            category: category.to_string(),
            keywords: words.iter().map(|w| w.to_lowercase()).collect(),
        }
    }

    fn matches(&self, lowered: &str) -> bool {
        self.keywords.iter().any(|w| lowered.contains(w.as_str()))
    }
}

/// Ordered rule list; the first matching rule wins.
#[derive(Debug, Clone)]
pub struct CategoryRules {
    rules: Vec<CategoryRule>,
    default: String,
}

impl CategoryRules {
    fn new(rules: Vec<CategoryRule>, default: impl Into<String>) -> Self {
        Self {
            rules,
            default: default.into(),
        }
    }

    pub fn categorize(&self, content: &str) -> &str {
        let lowered = content.to_lowercase();
        self.rules
            .iter()
            .find(|r| r.matches(&lowered))
            .map_or(self.default.as_str(), |r| r.category.as_str())
    }

    pub fn default_category(&self) -> &str {
        &self.default
    }
}

impl Default for CategoryRules {
    fn default() -> Self {
        Self::new(
            vec![
                CategoryRule::keywords("Research", &["paper", "research", "study", "method"]),
                CategoryRule::keywords("Product Launch", &["release", "launch", "announce", "product"]),
                CategoryRule::keywords(
                    "Technical Breakthrough",
                    &["breakthrough", "innovation", "advance"],
                ),
                CategoryRule::keywords("Industry News", &["industry", "market", "business"]),
            ],
            "AI Update",
        )
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

pub struct ClassifierInsightGenerator {
    classifier: Arc<dyn Classifier>,
    rules: CategoryRules,
    content_chars: usize,
}

impl ClassifierInsightGenerator {
    pub fn new(classifier: Arc<dyn Classifier>, content_chars: usize) -> Self {
        Self {
            classifier,
            rules: CategoryRules::default(),
            content_chars,
        }
    }

    fn instruction(&self, kind: SourceKind) -> String {
        let categories = self
            .rules
            .rules
            .iter()
            .map(|r| r.category.as_str())
            .chain(std::iter::once(self.rules.default_category()))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "You are an analyst writing a daily AI industry digest. {note}\n\
             Reply with a single JSON object and nothing else:\n\
             {{\"summary\": \"two or three sentence summary\", \
             \"analysis\": \"why it matters and who it affects\", \
             \"category\": \"one of: {categories}\", \
             \"importance_score\": <number between 0 and 1>}}",
            note = kind_note(kind),
        )
    }

    /// Turn a classifier reply into an insight, repairing what is missing.
    fn interpret(&self, reply: &str, content: &str, kind: SourceKind) -> NewInsight {
        let text = strip_code_fences(reply);
        match parse_object(text) {
            Some(obj) => self.from_object(&obj, content, kind),
            None => {
                debug!("reply is not a JSON object, using it as free text");
                let summary: String = text.chars().take(FALLBACK_SUMMARY_CHARS).collect();
                NewInsight::new(
                    summary,
                    text,
                    self.rules.categorize(content),
                    DEFAULT_IMPORTANCE_SCORE,
                )
            }
        }
    }

    fn from_object(&self, obj: &Map<String, Value>, content: &str, kind: SourceKind) -> NewInsight {
        let field = |name: &str| {
            obj.get(name)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let summary =
            field("summary").unwrap_or_else(|| format!("Content from a {kind} source; needs further analysis"));
        let analysis = field("analysis")
            .unwrap_or_else(|| format!("AI-related content, {} characters long", content.chars().count()));
        let category = field("category").unwrap_or_else(|| self.rules.default_category().to_string());
        let score = obj
            .get("importance_score")
            .map_or(DEFAULT_IMPORTANCE_SCORE, coerce_importance_score);

        NewInsight::new(summary, analysis, category, score)
    }
}

#[async_trait]
impl InsightGenerator for ClassifierInsightGenerator {
    #[instrument(skip_all, fields(kind = %kind, content_len = content.len()))]
    async fn generate_insight(&self, content: &str, kind: SourceKind) -> Result<NewInsight> {
        let bounded = truncate_content(content, self.content_chars);
        let instruction = self.instruction(kind);

        match self.classifier.complete(&instruction, bounded).await {
            Ok(reply) => Ok(self.interpret(&reply, content, kind)),
            Err(e) => {
                warn!(error = %e, "insight generation failed, returning degraded result");
                Ok(error_insight(&e.to_string()))
            }
        }
    }
}

/// Degraded insight for a failed analysis.
pub fn error_insight(error: &str) -> NewInsight {
    NewInsight::new(
        format!("Content analysis failed: {error}"),
        format!("The analysis could not be completed. Error: {error}"),
        ANALYSIS_FAILED_CATEGORY,
        0.0,
    )
    .degraded(error)
}

/// Coerce a classifier-provided score: numbers are clamped to `[0, 1]`,
/// anything else becomes the neutral default.
pub fn coerce_importance_score(value: &Value) -> f64 {
    value.as_f64().map_or(DEFAULT_IMPORTANCE_SCORE, clamp_score)
}

fn kind_note(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::Paper => {
            "This is an academic paper: focus on the method, what is new, and its contribution."
        }
        SourceKind::Social => {
            "This is a social media post: focus on how much discussion it drives and how the industry reacts."
        }
        SourceKind::Model => {
            "This is a model hub listing: focus on capabilities, adoption signals, and licensing."
        }
        SourceKind::Repo => {
            "This is an open-source repository: focus on what it does and why it is gaining traction."
        }
        SourceKind::Feed | SourceKind::Scrape => {
            "This is a news or blog post: focus on timeliness, reach, and business value."
        }
    }
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    let parse = |s: &str| match serde_json::from_str::<Value>(s) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    };
    parse(text).or_else(|| {
        let start = text.find('{')?;
        let end = text.rfind('}')?;
        (start < end).then(|| parse(&text[start..=end])).flatten()
    })
}

/// Cut `content` to at most `max_chars` characters on a char boundary.
fn truncate_content(content: &str, max_chars: usize) -> &str {
    match content.char_indices().nth(max_chars) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}
