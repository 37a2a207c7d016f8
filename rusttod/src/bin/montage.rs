use std::env;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use clap::{Parser, ValueEnum};
use log::{debug, error, info};

/// Pixel combination rule handed to the mosaic driver.
#[derive(ValueEnum, Clone, Copy, Debug)]
enum Combine {
    Mean,
    Median,
    Count,
}

impl Combine {
    fn as_arg(self) -> &'static str {
        match self {
            Combine::Mean => "mean",
            Combine::Median => "median",
            Combine::Count => "count",
        }
    }
}

/// Mosaic a subset of the map images in the current directory.
///
/// Inputs are staged into a fresh temporary directory so the external
/// Montage driver only ever sees the selected files, then the finished
/// mosaic is moved to the requested output path.
#[derive(Parser, Debug)]
#[command(name = "montage", version)]
struct Args {
    /// Header file driving the mosaic geometry
    #[arg(long, default_value = "mosaic.hdr")]
    header: PathBuf,

    /// Extract the header from the first input file instead, overriding --header
    #[arg(short = 'g', long = "get-header")]
    get_header: bool,

    /// How to combine overlapping pixels
    #[arg(long, value_enum, default_value_t = Combine::Median)]
    combine: Combine,

    /// Ask the driver for an exact-size mosaic. Off by default; the
    /// predecessor script claimed a true default but its flag could never
    /// actually be disabled.
    #[arg(short = 'X', long, alias = "exact_size")]
    exact: bool,

    /// Output mosaic filename
    #[arg(short, long, alias = "out")]
    outfile: PathBuf,

    /// Copy files into the staging directory instead of hard-linking them
    #[arg(long)]
    copy: bool,

    /// Glob patterns selecting the input images
    #[arg(required = true)]
    patterns: Vec<String>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(e) = run(args) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let inputs = expand_patterns(&args.patterns)?;
    info!("mosaicking {} input files", inputs.len());

    let staging = tempfile::tempdir()?;
    for input in &inputs {
        stage(input, staging.path(), args.copy)?;
    }

    let header = staging.path().join("mosaic.hdr");
    if args.get_header {
        extract_header(&inputs[0], &header)?;
    } else {
        stage_as(&args.header, &header, args.copy)?;
    }

    let workspace = tempfile::tempdir()?;
    let mosaic = workspace.path().join("mosaic.fits");
    run_driver(&args, staging.path(), &header, &mosaic, workspace.path())?;

    if !mosaic.exists() {
        return Err("driver finished without producing a mosaic".into());
    }
    move_file(&mosaic, &args.outfile)?;
    info!("wrote {}", args.outfile.display());
    Ok(())
}

fn expand_patterns(patterns: &[String]) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    let mut files = Vec::new();
    for pattern in patterns {
        for entry in glob::glob(pattern)? {
            files.push(entry?);
        }
    }
    if files.is_empty() {
        return Err("no input files match the given patterns".into());
    }
    Ok(files)
}

fn stage(input: &Path, staging: &Path, copy: bool) -> Result<(), Box<dyn Error>> {
    let name = input
        .file_name()
        .ok_or_else(|| format!("input path {} has no filename", input.display()))?;
    stage_as(input, &staging.join(name), copy)
}

fn stage_as(input: &Path, target: &Path, copy: bool) -> Result<(), Box<dyn Error>> {
    if copy {
        fs::copy(input, target)?;
    } else {
        fs::hard_link(input, target)?;
    }
    debug!("staged {} -> {}", input.display(), target.display());
    Ok(())
}

/// Pull the header of the first input into `header` with the external
/// `mGetHdr` tool.
fn extract_header(first_input: &Path, header: &Path) -> Result<(), Box<dyn Error>> {
    let tool = env::var("MONTAGE_MGETHDR").unwrap_or_else(|_| "mGetHdr".to_string());
    info!("extracting header from {}", first_input.display());
    let status = Command::new(&tool).arg(first_input).arg(header).status()?;
    if !status.success() {
        return Err(format!("{tool} failed with {status}").into());
    }
    Ok(())
}

/// Delegate the mosaic itself to the external Montage `mExec` driver.
fn run_driver(
    args: &Args,
    staging: &Path,
    header: &Path,
    mosaic: &Path,
    workspace: &Path,
) -> Result<(), Box<dyn Error>> {
    let driver = env::var("MONTAGE_MEXEC").unwrap_or_else(|_| "mExec".to_string());
    let mut cmd = Command::new(&driver);
    cmd.arg("-o")
        .arg(mosaic)
        .arg("-h")
        .arg(header)
        .arg("-a")
        .arg(args.combine.as_arg());
    if args.exact {
        cmd.arg("-e");
    }
    cmd.arg("-r").arg(staging).arg(workspace);

    info!("running {driver}");
    debug!("{cmd:?}");
    let status = cmd.status()?;
    if !status.success() {
        return Err(format!("{driver} failed with {status}").into());
    }
    Ok(())
}

/// Move the finished mosaic, falling back to copy-and-delete when the
/// output lives on another filesystem.
fn move_file(from: &Path, to: &Path) -> Result<(), Box<dyn Error>> {
    if fs::rename(from, to).is_err() {
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_spellings() {
        let args =
            Args::try_parse_from(["montage", "--out", "m.fits", "--exact_size", "*.fits"]).unwrap();
        assert!(args.exact);
        assert_eq!(args.outfile, PathBuf::from("m.fits"));

        let args = Args::try_parse_from(["montage", "-X", "-o", "m.fits", "a.fits"]).unwrap();
        assert!(args.exact);

        // exact is opt-in
        let args = Args::try_parse_from(["montage", "-o", "m.fits", "a.fits"]).unwrap();
        assert!(!args.exact);
        assert!(matches!(args.combine, Combine::Median));

        // outfile is required
        assert!(Args::try_parse_from(["montage", "a.fits"]).is_err());
    }
}
