use clap::Parser;

/// thermal_rgbd: paints RGB lighting by CPU temperature through OpenRGB.
///
/// Configuration is read from $THERMAL_RGBD_CONFIG,
/// ~/.config/thermal_rgbd/config.yml or /etc/thermal_rgbd/config.yml,
/// falling back to built-in defaults. Runs until interrupted.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn accepts_no_arguments() {
        assert!(Cli::try_parse_from(["thermal_rgbd"]).is_ok());
        assert!(Cli::try_parse_from(["thermal_rgbd", "--config", "x.yml"]).is_err());
    }
}
