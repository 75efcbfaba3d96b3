use std::process::ExitCode;
use std::sync::Arc;

use clap::ArgMatches;
use colored::Colorize;

use fanout_cmd::error::Result;
use fanout_cmd::logging::init_logging;
use fanout_cmd::plugin::{self, AltContext, ALTERNATES};
use fanout_cmd::{run_invocation, Config, ReportWriter, SshConnector, YamlInventory};

async fn run(cli: &Config, matches: &ArgMatches) -> Result<u8> {
    let settings = cli.settings()?;
    let inventory = YamlInventory::load_if_exists(&cli.hosts_file(&settings))?;
    let writer = ReportWriter::stdout();

    if let Some(alternate) = plugin::selected(ALTERNATES, matches) {
        tracing::debug!("Handing off to --{}", alternate.name);
        let ctx = AltContext {
            config: cli,
            matches,
            inventory: &inventory,
            out: &writer,
        };
        let code = (alternate.run)(&ctx)?;
        return Ok(u8::try_from(code).unwrap_or(1));
    }

    run_invocation(cli, &settings, &inventory, Arc::new(SshConnector), writer).await?;
    Ok(0)
}

#[tokio::main]
async fn main() -> ExitCode {
    let (cli, matches) = Config::parse_with(ALTERNATES);
    init_logging(cli.verbose, cli.debug);

    match run(&cli, &matches).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
