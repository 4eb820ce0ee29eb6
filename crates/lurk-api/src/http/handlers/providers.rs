//! GET /providers
//!
//! Lists the configured providers and whether their credential is present.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use lurk_types::provider::Capability;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ProviderInfo {
    pub id: String,
    pub display_name: String,
    pub kind: &'static str,
    pub model: String,
    pub capability: Capability,
    pub enabled: bool,
    pub available: bool,
}

pub fn provider_infos(state: &AppState) -> Vec<ProviderInfo> {
    state
        .registry
        .adapters()
        .map(|adapter| {
            let config = adapter.config();
            ProviderInfo {
                id: config.id.clone(),
                display_name: config.display_name.clone(),
                kind: config.backend.kind(),
                model: config.model.clone(),
                capability: config.capability,
                enabled: config.enabled,
                available: adapter.is_available(),
            }
        })
        .collect()
}

pub async fn list_providers(State(state): State<AppState>) -> Json<Vec<ProviderInfo>> {
    Json(provider_infos(&state))
}
