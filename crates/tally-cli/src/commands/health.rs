use crate::client::ApiClient;
use crate::commands::common::print_json;
use crate::error::CliError;

pub async fn run_health(client: &ApiClient) -> Result<(), CliError> {
    let health = client.health().await?;
    tracing::debug!(api = client.base_url(), "Health check succeeded");
    print_json(&health)
}
