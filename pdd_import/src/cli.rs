use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(about = "Decode a traffic-code exam trainer bundle", version)]
pub struct Cli {
    /// Log per-record progress
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Identify the bundle generation and print its key material
    Fingerprint(BundleArgs),
    /// Decode the whole bundle into a JSON record dump
    Import(ImportArgs),
}

#[derive(Args, Debug)]
pub struct BundleArgs {
    /// Root directory of the copied CD-ROM
    #[arg(long, value_name = "DIR")]
    pub bundle: PathBuf,

    /// JSON settings file (image directories, ticket layout, known builds)
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    #[command(flatten)]
    pub bundle: BundleArgs,

    /// Where to write the decoded records
    #[arg(long, value_name = "FILE", default_value = "pdd_records.json")]
    pub output: PathBuf,

    /// Optional directory to write decoded images into
    #[arg(long, value_name = "DIR")]
    pub images_out: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_import_command() {
        let cli = Cli::try_parse_from([
            "pdd_import",
            "import",
            "--bundle",
            "/cdrom",
            "--images-out",
            "out/img",
            "--verbose",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Command::Import(args) => {
                assert_eq!(args.bundle.bundle, PathBuf::from("/cdrom"));
                assert_eq!(args.output, PathBuf::from("pdd_records.json"));
                assert_eq!(args.images_out, Some(PathBuf::from("out/img")));
                assert!(args.bundle.settings.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn bundle_is_required() {
        assert!(Cli::try_parse_from(["pdd_import", "fingerprint"]).is_err());
    }
}
