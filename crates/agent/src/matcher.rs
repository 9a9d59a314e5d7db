use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use vitrine_core::catalog::format::catalog_listing;
use vitrine_core::domain::product::Product;

use crate::llm::{extract_json, ChatMessage, ChatRequest, LlmClient, LlmError};
use crate::prompts::PromptLibrary;

/// Upper bound on keyword matches returned for one query.
pub const MAX_KEYWORD_RECOMMENDATIONS: usize = 3;

/// Picks product names for a free-text request. Implementations may return
/// names outside `visible`; the catalog service drops those.
#[async_trait]
pub trait ProductMatcher: Send + Sync {
    async fn recommend(
        &self,
        query: &str,
        visible: &[Product],
        purchase_history: &str,
    ) -> Result<Vec<String>, LlmError>;
}

#[derive(Deserialize)]
struct RecommendationPayload {
    #[serde(default)]
    recommended_products: Vec<String>,
}

pub struct LlmProductMatcher {
    client: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
}

impl LlmProductMatcher {
    pub fn new(client: Arc<dyn LlmClient>, prompts: Arc<PromptLibrary>) -> Self {
        Self { client, prompts }
    }
}

#[async_trait]
impl ProductMatcher for LlmProductMatcher {
    async fn recommend(
        &self,
        query: &str,
        visible: &[Product],
        purchase_history: &str,
    ) -> Result<Vec<String>, LlmError> {
        let prompt =
            self.prompts.product_search(&catalog_listing(visible), purchase_history, query)?;
        let completion = self
            .client
            .complete(ChatRequest {
                messages: vec![ChatMessage::user(prompt)],
                tools: Vec::new(),
                json_mode: true,
            })
            .await?;

        let content = completion.content.unwrap_or_default();
        let Some(json) = extract_json(&content) else {
            warn!(
                event_name = "catalog.matcher.unparseable",
                content_len = content.len(),
                "recommendation response had no JSON object"
            );
            return Ok(Vec::new());
        };

        let payload: RecommendationPayload =
            serde_json::from_str(json).map_err(|error| LlmError::Decode(error.to_string()))?;
        Ok(payload.recommended_products)
    }
}

/// Offline matcher scoring catalog attributes against the query words.
#[derive(Clone, Debug, Default)]
pub struct KeywordProductMatcher;

const STOPWORDS: &[&str] = &[
    "and", "con", "das", "del", "des", "for", "gafas", "las", "lentes", "los", "para", "que",
    "quiero", "some", "sunglasses", "the", "una", "uno", "unos", "want", "with",
];

const SYNONYMS: &[(&str, &str)] = &[
    ("aviator", "aviador"),
    ("black", "negro"),
    ("blue", "azul"),
    ("brown", "marron"),
    ("gold", "dorado"),
    ("golden", "dorado"),
    ("gradient", "degradada"),
    ("mirrored", "espejada"),
    ("polarized", "polarizada"),
    ("round", "redondo"),
    ("running", "deportivo"),
    ("silver", "plateado"),
    ("sport", "deportivo"),
    ("sports", "deportivo"),
    ("tortoise", "tortuga"),
];

#[async_trait]
impl ProductMatcher for KeywordProductMatcher {
    async fn recommend(
        &self,
        query: &str,
        visible: &[Product],
        purchase_history: &str,
    ) -> Result<Vec<String>, LlmError> {
        let folded_query = fold(query);

        let named: Vec<String> = visible
            .iter()
            .filter(|product| folded_query.contains(&fold(&product.product_name)))
            .map(|product| product.product_name.clone())
            .collect();
        if !named.is_empty() {
            return Ok(named);
        }

        let mut terms = query_terms(&folded_query);
        if terms.iter().any(|term| term == "repeat" || term == "repetir" || term == "again") {
            terms.extend(query_terms(&fold(purchase_history)));
        }
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, usize, &Product)> = visible
            .iter()
            .enumerate()
            .map(|(index, product)| (score(&terms, product), index, product))
            .filter(|(score, _, _)| *score > 0)
            .collect();
        scored.sort_by(|left, right| right.0.cmp(&left.0).then(left.1.cmp(&right.1)));

        Ok(scored
            .into_iter()
            .take(MAX_KEYWORD_RECOMMENDATIONS)
            .map(|(_, _, product)| product.product_name.clone())
            .collect())
    }
}

fn score(terms: &[String], product: &Product) -> usize {
    let haystack = tokenize(&fold(&format!(
        "{} {} {} {} {} {} {} {} {}",
        product.product_name,
        product.brand,
        product.model,
        product.color,
        product.frame_material,
        product.lens_type,
        product.style,
        product.size,
        product.description
    )));
    terms.iter().filter(|term| haystack.iter().any(|word| word == *term)).count()
}

fn query_terms(folded: &str) -> Vec<String> {
    let mut terms = Vec::new();
    for token in tokenize(folded) {
        if token.chars().count() < 3 || STOPWORDS.contains(&token.as_str()) {
            continue;
        }
        if let Some((_, spanish)) = SYNONYMS.iter().find(|(english, _)| *english == token) {
            push_unique(&mut terms, (*spanish).to_string());
        }
        push_unique(&mut terms, token);
    }
    terms
}

fn push_unique(terms: &mut Vec<String>, term: String) {
    if !terms.contains(&term) {
        terms.push(term);
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|character: char| !character.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Lowercase with Spanish and Portuguese accents removed.
fn fold(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|character| match character {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use vitrine_core::catalog::Catalog;

    use super::{KeywordProductMatcher, LlmProductMatcher, ProductMatcher};
    use crate::llm::{ChatCompletion, ChatRequest, LlmClient, LlmError};
    use crate::prompts::PromptLibrary;

    struct CannedClient(&'static str);

    #[async_trait]
    impl LlmClient for CannedClient {
        async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, LlmError> {
            assert!(request.json_mode);
            Ok(ChatCompletion { content: Some(self.0.to_string()), tool_calls: Vec::new() })
        }
    }

    fn catalog() -> Catalog {
        Catalog::bundled().expect("bundled catalog")
    }

    #[tokio::test]
    async fn exact_product_names_win_over_scoring() {
        let catalog = catalog();
        let names = KeywordProductMatcher
            .recommend("do you have the persol 714 marron?", catalog.products(), "")
            .await
            .expect("recommend");
        assert_eq!(names, vec!["Persol 714 Marrón".to_string()]);
    }

    #[tokio::test]
    async fn keyword_scoring_translates_common_english_terms() {
        let catalog = catalog();
        let names = KeywordProductMatcher
            .recommend("polarized aviator sunglasses", catalog.products(), "")
            .await
            .expect("recommend");

        assert!(!names.is_empty());
        assert!(names.len() <= 3);
        assert!(names.contains(&"Ray-Ban Aviator Classic Gold".to_string()));
        assert!(names.contains(&"Tom Ford Marko Dorado".to_string()));
    }

    #[tokio::test]
    async fn unmatched_or_empty_queries_return_nothing() {
        let catalog = catalog();
        let names = KeywordProductMatcher
            .recommend("zzz qqq", catalog.products(), "")
            .await
            .expect("recommend");
        assert!(names.is_empty());

        let names = KeywordProductMatcher.recommend("para", catalog.products(), "").await.expect("recommend");
        assert!(names.is_empty());
    }

    #[tokio::test]
    async fn repeat_requests_fall_back_to_purchase_history() {
        let catalog = catalog();
        let history = "- Oakley Radar EV Path Azul (purchased on 2024-02-03)";
        let names = KeywordProductMatcher
            .recommend("repeat my last order", catalog.products(), history)
            .await
            .expect("recommend");
        assert_eq!(names.first().map(String::as_str), Some("Oakley Radar EV Path Azul"));
    }

    #[tokio::test]
    async fn llm_matcher_parses_fenced_json() {
        let catalog = catalog();
        let matcher = LlmProductMatcher::new(
            Arc::new(CannedClient(
                "```json\n{\"recommended_products\": [\"Oakley Sutro Plateado\"]}\n```",
            )),
            Arc::new(PromptLibrary::new().expect("templates")),
        );
        let names = matcher.recommend("sport", catalog.products(), "").await.expect("recommend");
        assert_eq!(names, vec!["Oakley Sutro Plateado".to_string()]);
    }

    #[tokio::test]
    async fn llm_matcher_without_json_recommends_nothing() {
        let catalog = catalog();
        let matcher = LlmProductMatcher::new(
            Arc::new(CannedClient("I could not find anything.")),
            Arc::new(PromptLibrary::new().expect("templates")),
        );
        let names = matcher.recommend("sport", catalog.products(), "").await.expect("recommend");
        assert!(names.is_empty());
    }
}
