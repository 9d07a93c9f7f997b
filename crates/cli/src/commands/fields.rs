// Repository field listing

use anyhow::Result;
use ngsiem_core::executor::ClientFactory;
use ngsiem_core::{discover_fields, RemoteCommand, SearchController};

use crate::output::{print_field, OutputFormat};

pub async fn run<F>(
    controller: &SearchController<F>,
    output: OutputFormat,
    repository: &str,
    timeout_seconds: u64,
) -> Result<()>
where
    F: ClientFactory,
    F::Client: RemoteCommand,
{
    let schema = discover_fields(controller, repository, timeout_seconds).await?;

    if output.is_text() {
        print_field("Repository", &schema.repository);
        print_field("Fields", &schema.field_count.to_string());
        print_field("Retrieved At", &schema.retrieved_at.to_rfc3339());
        if let Some(warning) = &schema.warning {
            print_field("Warning", warning);
        }
        println!();
        for field in &schema.fields {
            println!("{}", field);
        }
    } else {
        output.print_value(&schema)?;
    }
    Ok(())
}
