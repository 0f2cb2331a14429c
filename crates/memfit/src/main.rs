use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use memfit_core::AddressKind;

mod commands;

#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
struct Opts {
    /// Verbose
    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summarize window and bank usage of an image
    Summary {
        /// Target configuration (JSON)
        #[clap(short, long)]
        config: String,

        /// Section/symbol snapshot of the image (JSON)
        #[clap(short, long)]
        image: String,

        /// Print JSON instead of tables
        #[clap(long)]
        json: bool,
    },
    /// Resolve an address to the region, section and symbol owning it
    Resolve {
        /// Target configuration (JSON)
        #[clap(short, long)]
        config: String,

        /// Section/symbol snapshot of the image (JSON)
        #[clap(short, long)]
        image: String,

        /// Address to look up
        #[clap(value_parser = num_parser)]
        address: u64,

        /// Preferred address kind: exec, load or runtime
        #[clap(short, long, value_parser = kind_parser)]
        kind: Option<AddressKind>,

        /// Print JSON instead of text
        #[clap(long)]
        json: bool,
    },
    /// Project bank totals into a named-bucket report
    Report {
        /// Target configuration (JSON)
        #[clap(short, long)]
        config: String,

        /// Section/symbol snapshot of the image (JSON)
        #[clap(short, long)]
        image: String,

        /// Report configuration (JSON)
        #[clap(short, long)]
        report: String,

        /// Print JSON instead of tables
        #[clap(long)]
        json: bool,
    },
}

// allow addresses in the formats linker maps print them in
fn num_parser(s: &str) -> Result<u64, &'static str> {
    match s.get(0..2) {
        Some("0x") => u64::from_str_radix(&s[2..], 16).map_err(|_| "invalid hex number"),
        Some("0b") => u64::from_str_radix(&s[2..], 2).map_err(|_| "invalid binary number"),
        _ => s.parse::<u64>().map_err(|_| "invalid decimal number"),
    }
}

fn kind_parser(s: &str) -> Result<AddressKind, String> {
    match s {
        "exec" => Ok(AddressKind::Exec),
        "load" => Ok(AddressKind::Load),
        "runtime" => Ok(AddressKind::Runtime),
        other => Err(format!("unknown address kind `{other}`")),
    }
}

fn main() -> Result<()> {
    let opts = Opts::parse();

    let default_filter = if opts.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    match opts.command {
        Command::Summary {
            config,
            image,
            json,
        } => commands::summary::summary(&config, &image, json),
        Command::Resolve {
            config,
            image,
            address,
            kind,
            json,
        } => commands::resolve::resolve(&config, &image, address, kind, json),
        Command::Report {
            config,
            image,
            report,
            json,
        } => commands::report::report(&config, &image, &report, json),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn num_parser_accepts_hex_binary_and_decimal() {
        assert_eq!(num_parser("0x08000000"), Ok(0x0800_0000));
        assert_eq!(num_parser("0b1010"), Ok(10));
        assert_eq!(num_parser("4096"), Ok(4096));
        assert!(num_parser("0xzz").is_err());
    }

    #[test]
    fn kind_parser_accepts_the_three_kinds() {
        assert_eq!(kind_parser("exec"), Ok(AddressKind::Exec));
        assert_eq!(kind_parser("load"), Ok(AddressKind::Load));
        assert_eq!(kind_parser("runtime"), Ok(AddressKind::Runtime));
        assert!(kind_parser("shadow").is_err());
    }
}
