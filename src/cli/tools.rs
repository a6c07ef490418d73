use anyhow::{Result, anyhow};
use clap::Subcommand;

use crate::ai::tools::all_tools;
use crate::core::AppConfig;

#[derive(Subcommand)]
pub enum ToolsCommand {
    /// Print every tool definition as JSON
    List {},
    /// Invoke one tool and print its answer
    Call {
        #[arg(long)]
        name: String,
        /// Tool arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
}

pub async fn run(command: ToolsCommand) -> Result<()> {
    let config = AppConfig::default();
    let tools = all_tools(&config);

    match command {
        ToolsCommand::List {} => {
            println!("{}", serde_json::to_string_pretty(&tools)?);
        }
        ToolsCommand::Call { name, args } => {
            let tool = tools
                .iter()
                .find(|t| t.function_name() == name)
                .ok_or(anyhow!("No tool named '{}'", name))?;
            let output = tool.call(&args).await?;
            println!("{}", output);
        }
    }

    Ok(())
}
