use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use vitrine_core::catalog::{Catalog, CatalogError, PurchaseHistories};
use vitrine_core::config::{AppConfig, CatalogConfig};
use vitrine_db::StateStore;

use crate::cart_engine::CartEngine;
use crate::catalog_service::CatalogService;
use crate::conversation::KeywordPlanner;
use crate::dispatcher::ActionDispatcher;
use crate::guardrails::{GuardrailPolicy, JailbreakScreen};
use crate::llm::{LlmClient, LlmError, OpenAiChatClient};
use crate::matcher::{KeywordProductMatcher, LlmProductMatcher, ProductMatcher};
use crate::order::OrderFinalizer;
use crate::payment::{MercadoPagoGateway, PaymentError, PaymentGateway};
use crate::planner::{ActionPlanner, LlmActionPlanner};
use crate::prompts::PromptLibrary;
use crate::runtime::AgentRuntime;

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("language model client could not be built: {0}")]
    Llm(#[from] LlmError),
    #[error("payment gateway could not be built: {0}")]
    Payment(#[from] PaymentError),
}

/// Bundled datasets unless the config points at replacement files.
pub fn load_catalog(config: &CatalogConfig) -> Result<(Catalog, PurchaseHistories), CatalogError> {
    let catalog = match &config.products_path {
        Some(path) => Catalog::load(path)?,
        None => Catalog::bundled()?,
    };
    let histories = match &config.histories_path {
        Some(path) => PurchaseHistories::load(path)?,
        None => PurchaseHistories::bundled()?,
    };
    Ok((catalog, histories))
}

pub fn build_runtime(
    config: &AppConfig,
    store: Arc<dyn StateStore>,
) -> Result<AgentRuntime, AssemblyError> {
    let gateway = MercadoPagoGateway::from_config(&config.payment)?;
    build_runtime_with_gateway(config, store, Arc::new(gateway))
}

/// Wires the services for one process. Offline deployments get the keyword
/// planner and matcher; otherwise every model-backed component shares one
/// HTTP client.
pub fn build_runtime_with_gateway(
    config: &AppConfig,
    store: Arc<dyn StateStore>,
    gateway: Arc<dyn PaymentGateway>,
) -> Result<AgentRuntime, AssemblyError> {
    let (catalog, histories) = load_catalog(&config.catalog)?;
    let catalog = Arc::new(catalog);

    let client: Option<Arc<dyn LlmClient>> =
        OpenAiChatClient::from_config(&config.llm)?.map(|client| Arc::new(client) as Arc<dyn LlmClient>);
    let prompts = Arc::new(PromptLibrary::new()?);

    let (planner, matcher): (Arc<dyn ActionPlanner>, Arc<dyn ProductMatcher>) = match &client {
        Some(client) => (
            Arc::new(LlmActionPlanner::new(client.clone(), &prompts)?),
            Arc::new(LlmProductMatcher::new(client.clone(), prompts.clone())),
        ),
        None => (Arc::new(KeywordPlanner::new(catalog.clone())), Arc::new(KeywordProductMatcher)),
    };

    let catalog_service =
        Arc::new(CatalogService::new(catalog.clone(), Arc::new(histories), matcher, store.clone()));
    let cart = Arc::new(CartEngine::new(store.clone()));
    let orders = Arc::new(OrderFinalizer::new(
        store.clone(),
        gateway,
        Duration::from_secs(config.payment.timeout_secs),
    ));
    let dispatcher = Arc::new(ActionDispatcher::new(
        catalog_service,
        cart,
        orders,
        store.clone(),
        GuardrailPolicy::default(),
    ));

    let mut runtime =
        AgentRuntime::new(planner, dispatcher, store, Duration::from_secs(config.turns.queue_wait_secs));
    if config.llm.jailbreak_screen {
        if let Some(client) = client.clone() {
            runtime = runtime.with_jailbreak_screen(JailbreakScreen::new(client, prompts));
        }
    }

    info!(
        event_name = "system.runtime.assembled",
        provider = ?config.llm.provider,
        products = catalog.len(),
        payment_configured = config.payment.is_configured(),
        jailbreak_screen = config.llm.jailbreak_screen && client.is_some(),
        "agent runtime assembled"
    );
    Ok(runtime)
}
