use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use vitrine_core::catalog::format::{catalog_listing, purchase_history_text, recommendation_block};
use vitrine_core::catalog::{Catalog, PurchaseHistories};
use vitrine_core::domain::conversation::ConversationId;
use vitrine_core::domain::product::Product;
use vitrine_core::errors::{ApplicationError, CommerceError};
use vitrine_db::StateStore;

use crate::matcher::ProductMatcher;

/// Zipcode-gated view over the static catalog plus the per-conversation
/// recommendation record.
pub struct CatalogService {
    catalog: Arc<Catalog>,
    histories: Arc<PurchaseHistories>,
    matcher: Arc<dyn ProductMatcher>,
    store: Arc<dyn StateStore>,
}

impl CatalogService {
    pub fn new(
        catalog: Arc<Catalog>,
        histories: Arc<PurchaseHistories>,
        matcher: Arc<dyn ProductMatcher>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self { catalog, histories, matcher, store }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn resolve_visible_catalog(&self, zipcode: &str) -> Vec<Product> {
        self.catalog.visible_for(zipcode)
    }

    pub fn purchase_history(&self, zipcode: &str) -> String {
        purchase_history_text(self.histories.for_zipcode(zipcode))
    }

    /// Catalog text handed to a recommendation model; empty when nothing is
    /// visible for the zipcode.
    pub fn catalog_prompt(&self, zipcode: &str) -> String {
        catalog_listing(&self.resolve_visible_catalog(zipcode))
    }

    /// Runs a product search and records whatever was shown. Returns the
    /// formatted recommendation block, or an empty string when nothing matched.
    pub async fn search(
        &self,
        id: &ConversationId,
        query: &str,
        zipcode: &str,
    ) -> Result<String, ApplicationError> {
        let visible = self.resolve_visible_catalog(zipcode);
        if visible.is_empty() {
            info!(
                event_name = "catalog.search.no_visible_products",
                conversation_id = %id,
                "no products visible for zipcode"
            );
            return Ok(String::new());
        }

        let history = self.purchase_history(zipcode);
        let names = self.matcher.recommend(query, &visible, &history).await.map_err(|error| {
            warn!(
                event_name = "catalog.search.matcher_failed",
                conversation_id = %id,
                error = %error,
                "product matcher failed"
            );
            CommerceError::SearchUnavailable(error.to_string())
        })?;

        let mut recommended: Vec<Product> = Vec::new();
        for name in &names {
            match visible.iter().find(|product| product.is_named(name)) {
                Some(product) if !recommended.iter().any(|seen| seen.row_id == product.row_id) => {
                    recommended.push(product.clone());
                }
                Some(_) => {}
                None => warn!(
                    event_name = "catalog.search.dropped_unknown_name",
                    conversation_id = %id,
                    product = %name,
                    "matcher returned a product outside the visible catalog"
                ),
            }
        }

        if recommended.is_empty() {
            return Ok(String::new());
        }

        let state = self.store.get(id).await.map_err(persistence)?;
        self.store
            .set(id, state.with_recommendations(&recommended))
            .await
            .map_err(persistence)?;

        info!(
            event_name = "catalog.search.recommended",
            conversation_id = %id,
            count = recommended.len(),
            "recorded recommendations"
        );
        Ok(recommendation_block(&recommended))
    }

    pub async fn product_was_recommended(
        &self,
        id: &ConversationId,
        product_name: &str,
    ) -> Result<bool, ApplicationError> {
        let state = self.store.get(id).await.map_err(persistence)?;
        Ok(state.was_recommended(product_name))
    }

    pub async fn unit_price(
        &self,
        id: &ConversationId,
        product_name: &str,
    ) -> Result<Option<Decimal>, ApplicationError> {
        let state = self.store.get(id).await.map_err(persistence)?;
        Ok(state.unit_pricing(product_name).map(|pricing| pricing.price_per_unit))
    }

    pub async fn unit_volume(
        &self,
        id: &ConversationId,
        product_name: &str,
    ) -> Result<Option<Decimal>, ApplicationError> {
        let state = self.store.get(id).await.map_err(persistence)?;
        Ok(state.unit_pricing(product_name).map(|pricing| pricing.volume_per_unit))
    }
}

pub(crate) fn persistence(error: vitrine_db::RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}
