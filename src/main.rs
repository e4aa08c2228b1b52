//! logql-lens CLI entry point.

use logql_lens::cli::{self, Cli};
use logql_lens::core::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let cli = Cli::parse_args();

    // Execute the command
    cli::execute(cli).await
}
