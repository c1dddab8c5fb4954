use anyhow::Result;
use ovr::cli::parse_cli;
use ovr::logging::init_tracing;

fn main() -> Result<()> {
    let cli = parse_cli();
    init_tracing(cli.log_format);

    let mut out = std::io::stdout();
    let exit_code = ovr::run(&cli, &mut out)?;
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}
