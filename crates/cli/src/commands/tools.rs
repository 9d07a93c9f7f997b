// Tool listing and invocation

use anyhow::Result;
use ngsiem_core::executor::ClientFactory;
use ngsiem_core::{list_tools, RemoteCommand, ToolDispatcher};
use serde_json::Value;

use crate::output::{print_table_header, print_table_row, OutputFormat};

pub fn list(output: OutputFormat) -> Result<()> {
    let tools = list_tools();

    if output.is_text() {
        print_table_header(&[("NAME", 20), ("DESCRIPTION", 80)]);
        for tool in tools {
            print_table_row(&[(tool.name, 20), (tool.description, 80)]);
        }
    } else {
        output.print_value(&tools)?;
    }
    Ok(())
}

pub async fn call<F>(
    dispatcher: &ToolDispatcher<F>,
    output: OutputFormat,
    name: &str,
    arguments: Value,
) -> Result<()>
where
    F: ClientFactory,
    F::Client: RemoteCommand,
{
    let result = dispatcher.call(name, arguments).await?;

    match output {
        // Tool results are JSON already; text mode prints them as-is
        OutputFormat::Text => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => output.print_value(&result)?,
    }
    Ok(())
}
