//! binary font build tool
//!
//! Takes a JSON font source, stamps the release metadata into it, merges in
//! an optional feature file and writes a hinted OpenType CFF font.

use std::path::{Path, PathBuf};

use chrono::Datelike;
use clap::Parser;
use log::LevelFilter;
use smida::{font::FontVersion, preprocess::Preprocessor, Error, Font, Options};

const MANUFACTURER_URL: &str = "https://github.com/alif-type/libertinus";

/// Words in the input path that select feature file branches.
const STYLE_KEYWORDS: [&str; 4] = ["ITALIC", "SANS", "DISPLAY", "MATH"];

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
struct Args {
    /// The input font source.
    #[arg(short, long)]
    input: PathBuf,

    /// The output font file
    #[arg(short, long)]
    output: PathBuf,

    /// The font version, as major.minor
    #[arg(short = 'v', long = "version")]
    font_version: String,

    /// A feature file to add before the font's own features
    #[arg(short, long)]
    feature_file: Option<PathBuf>,

    /// The last year in the copyright notice (default: the current year)
    #[arg(long)]
    year: Option<i32>,

    /// Only report errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Report per-glyph progress
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    init_logging(&args);

    if let Err(e) = run(&args) {
        log::error!("{e}");
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn init_logging(args: &Args) {
    let level = if args.quiet {
        LevelFilter::Error
    } else if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .parse_default_env()
        .init();
}

fn run(args: &Args) -> Result<(), Error> {
    // a bad version is reported before any input is read
    let version = FontVersion::parse(&args.font_version)?;
    let mut font = Font::load(&args.input)?;
    let year = args.year.unwrap_or_else(|| chrono::Utc::now().year());
    update_metadata(&mut font, version, year);

    if let Some(path) = &args.feature_file {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let mut preprocessor = style_defines(&args.input);
        let expanded = preprocessor.run(&text)?;
        font.features = format!("{expanded}\n{}", font.features);
    }

    let bytes = smida::compile(&font, &Options::default())?;
    write_atomically(&args.output, &bytes)?;
    log::info!("wrote {} bytes to {}", bytes.len(), args.output.display());
    Ok(())
}

/// Stamp the release version, copyright and vendor URL into the source.
fn update_metadata(font: &mut Font, version: FontVersion, year: i32) {
    font.info.version = version;
    font.info.copyright = Some(format!(
        "Copyright © 2012-{year} The Libertinus Project Authors."
    ));
    font.info.manufacturer_url = Some(MANUFACTURER_URL.to_string());
}

/// Define each style keyword that appears in the input path.
fn style_defines(input: &Path) -> Preprocessor {
    let path = input.to_string_lossy().to_uppercase();
    let mut preprocessor = Preprocessor::new();
    for keyword in STYLE_KEYWORDS {
        if path.contains(keyword) {
            log::debug!("defining {keyword}");
            preprocessor.define(keyword);
        }
    }
    preprocessor
}

/// Write to a sibling file first, so a failed write leaves no partial font.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp = path.with_file_name(temp_name);
    std::fs::write(&temp, bytes).map_err(|e| Error::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| {
        let _ = std::fs::remove_file(&temp);
        Error::io(path, e)
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn metadata() {
        let mut font = Font::default();
        update_metadata(&mut font, FontVersion::parse("7.1").unwrap(), 2024);
        assert_eq!(font.info.version.name_string(), "Version 7.010");
        assert_eq!(
            font.info.copyright.as_deref(),
            Some("Copyright © 2012-2024 The Libertinus Project Authors.")
        );
        assert_eq!(font.info.manufacturer_url.as_deref(), Some(MANUFACTURER_URL));
    }

    #[test]
    fn keywords_from_path() {
        let defines = style_defines(Path::new("sources/LibertinusSerifDisplay-Italic.json"));
        assert!(defines.is_defined("ITALIC"));
        assert!(defines.is_defined("DISPLAY"));
        assert!(!defines.is_defined("SANS"));
        assert!(!defines.is_defined("MATH"));
    }

    #[test]
    fn atomic_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.otf");
        write_atomically(&path, b"OTTO").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"OTTO");
        assert!(!dir.path().join("out.otf.tmp").exists());
    }

    #[test]
    fn version_is_checked_before_loading() {
        let dir = tempfile::tempdir().unwrap();
        let args = Args::try_parse_from([
            "smida",
            "-i",
            dir.path().join("missing.json").to_str().unwrap(),
            "-o",
            dir.path().join("out.otf").to_str().unwrap(),
            "-v",
            "seven",
        ])
        .unwrap();
        let err = run(&args).unwrap_err();
        assert!(matches!(&err, Error::Version(v) if v == "seven"), "{err}");
    }

    #[test]
    fn args() {
        let args = Args::try_parse_from([
            "smida", "-i", "in.json", "-o", "out.otf", "-v", "7.051", "--year", "2030",
        ])
        .unwrap();
        assert_eq!(args.font_version, "7.051");
        assert_eq!(args.year, Some(2030));
        assert!(args.feature_file.is_none());
    }
}
