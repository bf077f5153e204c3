use clap::{Parser, Subcommand};

/// CLI surface definition. Each storage subcommand maps onto one facade call.
#[derive(Parser, Debug)]
#[command(
    name = "strongbox",
    about = "Encrypted key-value storage backed by the OS keyring",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Keep key material and records in memory for this run only.
    #[arg(long, global = true)]
    pub ephemeral: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Check that the keyring and record store are reachable.
    Init,
    /// Print the value stored under KEY (nothing if absent).
    Get { key: String },
    /// Encrypt and store VALUE under KEY.
    Set {
        key: String,
        value: String,
        /// Parse VALUE as JSON instead of storing it as a string.
        #[arg(long)]
        json: bool,
    },
    /// Remove KEY and its key material.
    Remove { key: String },
    /// Remove every stored value and all key material.
    Clear,
    /// List stored keys.
    Keys,
    /// Run a set/get/remove round trip against the configured storage.
    Health,
    /// Print version and exit.
    Version,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_set_with_json_flag() {
        let cli = Cli::try_parse_from(["strongbox", "set", "profile", r#"{"a":1}"#, "--json"])
            .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Command::Set {
                key: "profile".into(),
                value: r#"{"a":1}"#.into(),
                json: true,
            }
        );
        assert!(!cli.ephemeral);
    }

    #[test]
    fn ephemeral_flag_is_global() {
        let cli = Cli::try_parse_from(["strongbox", "health", "--ephemeral"])
            .expect("parse should succeed");
        assert_eq!(cli.command, Command::Health);
        assert!(cli.ephemeral);
    }

    #[test]
    fn get_requires_a_key() {
        assert!(Cli::try_parse_from(["strongbox", "get"]).is_err());
    }

    #[test]
    fn parses_config_init_subcommand() {
        let cli = Cli::try_parse_from(["strongbox", "config", "init"])
            .expect("parse should succeed");
        assert_eq!(cli.command, Command::Config(ConfigCommand::Init));
    }
}
