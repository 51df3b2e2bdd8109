use crate::client::ApiClient;
use crate::commands::common::print_json;
use crate::error::CliError;

pub async fn run_pull(
    client: &ApiClient,
    token: &str,
    resource_types: Vec<String>,
) -> Result<(), CliError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(CliError::InvalidInput(
            "Sync token cannot be empty; use `*` for a full snapshot".to_string(),
        ));
    }

    let data = client.pull(token, resource_types).await?;
    print_json(&data)
}
