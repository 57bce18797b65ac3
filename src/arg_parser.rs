use std::path::PathBuf;

use argparse::{ArgumentParser, Print, Store, StoreTrue};

use crate::config::DEFAULT_CONFIG_PATH;

pub struct ArgsOptions {
    pub config_file_path: PathBuf,
    pub check_config: bool,
    pub verbose: bool,
}

impl ArgsOptions {
    pub fn parse() -> Self {
        let mut options = ArgsOptions::default();

        {
            let mut parser = ArgumentParser::new();
            parser.set_description(
                "Temperature driven fan control for the CM4 IO board",
            );

            // Configuration file path
            parser.refer(&mut options.config_file_path).add_option(
                &["-c", "--config"],
                Store,
                "The file path of the configuration file",
            );

            parser.refer(&mut options.check_config).add_option(
                &["--check-config"],
                StoreTrue,
                "Validate the configuration, print it and exit",
            );

            parser.refer(&mut options.verbose).add_option(
                &["-v", "--verbose"],
                StoreTrue,
                "Log every reading (ignored when RUST_LOG is set)",
            );

            // Show daemon version
            parser.add_option(
                &["-V", "--version"],
                Print(env!("CARGO_PKG_VERSION").to_string()),
                "Show the daemon version",
            );

            parser.parse_args_or_exit();
        }

        options
    }
}

impl Default for ArgsOptions {
    fn default() -> Self {
        Self {
            config_file_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            check_config: false,
            verbose: false,
        }
    }
}
