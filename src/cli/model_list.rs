//! Model listing subcommand

use std::error::Error;

use reqwest::Client;

use crate::api::catalog::fetch_catalog;
use crate::core::config::SessionConfig;

/// Print the models the configured node serves, one per line, with the
/// node's advertised default marked.
pub async fn list_models(config: &SessionConfig) -> Result<(), Box<dyn Error>> {
    let client = Client::new();
    let catalog = fetch_catalog(&client, config).await;

    if catalog.is_empty() {
        println!(
            "The node at {} (slot {}) advertises no models right now.",
            config.node_url, config.slot
        );
        return Ok(());
    }

    println!("Models served by {} (slot {}):", config.node_url, config.slot);
    for model in &catalog.models {
        if catalog.default_model.as_deref() == Some(model.as_str()) {
            println!("  {model} (default)");
        } else {
            println!("  {model}");
        }
    }
    Ok(())
}
