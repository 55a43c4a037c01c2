//! Command-line interface for the service binary.

use clap::{ArgAction, Parser};

#[derive(Debug, Parser)]
#[command(
    name = "vision-service",
    version,
    about = "Multi-tenant vision ingest service",
    disable_version_flag = true
)]
pub struct CliArgs {
    /// Port the RPC surface listens on.
    #[arg(long, default_value_t = 50051)]
    pub port: u16,

    /// Interface address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Print version information.
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn defaults_match_the_service_contract() {
        let args = CliArgs::try_parse_from(["vision-service"]).unwrap();
        assert_eq!(args.port, 50051);
        assert_eq!(args.host, "0.0.0.0");
    }

    #[test]
    fn flags_override_defaults() {
        let args =
            CliArgs::try_parse_from(["vision-service", "--port", "8080", "--host", "localhost"])
                .unwrap();
        assert_eq!(args.port, 8080);
        assert_eq!(args.host, "localhost");
    }
}
