//! Print the OpenAPI document of the REST and WebSocket surface as JSON.

use jeopardy_back::services::documentation::ApiDoc;
use utoipa::OpenApi;

fn main() -> anyhow::Result<()> {
    println!("{}", ApiDoc::openapi().to_pretty_json()?);
    Ok(())
}
