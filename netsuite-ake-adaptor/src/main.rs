//! Main entry point for CLI command to fetch data views.

use anyhow::Result;

fn main() -> Result<()> {
    netsuite_ake_adaptor::main()
}
