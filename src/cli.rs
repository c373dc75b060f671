//! Command-line arguments.

use clap::{ArgAction, Parser};
use nusdec_config::Config;
use std::path::PathBuf;

/// Decrypt a Wii U title and extract its files.
#[derive(Debug, Parser)]
#[command(name = "nusdec", version, disable_version_flag = true)]
pub struct Args {
    /// Title id, as 16 hexadecimal digits.
    #[arg(value_parser = parse_title_id)]
    pub title_id: u64,

    /// Title version to fetch; the latest when omitted.
    #[arg(long)]
    pub version: Option<u16>,

    /// Parent of the output directory. Files are written under
    /// `<OUT>/<TITLE ID>/`.
    #[arg(short, long, value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Replace files that already exist.
    #[arg(long)]
    pub overwrite: bool,

    /// Common key, as 32 hexadecimal digits.
    #[arg(long, value_name = "HEX")]
    pub common_key: Option<String>,

    /// File holding the raw 16-byte common key.
    #[arg(long, value_name = "FILE")]
    pub common_key_file: Option<PathBuf>,

    /// Title key, as 32 hexadecimal digits. The ticket is not used.
    #[arg(long, value_name = "HEX")]
    pub title_key: Option<String>,

    /// Only extract files whose full path matches this regex.
    #[arg(short = 'f', long = "file", value_name = "REGEX")]
    pub pattern: Option<String>,

    /// Read the title from a local directory instead of the content server.
    #[arg(short = 'd', long = "dir", value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Content server base URL.
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Files extracted at once.
    #[arg(short = 'j', long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Configuration file (TOML, YAML or JSON).
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// More logging; repeat for more.
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Overlay the flags that were given onto `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(key) = &self.common_key {
            config.keys.common_key = Some(key.clone());
        }
        if let Some(path) = &self.common_key_file {
            config.keys.common_key_file = path.clone();
        }
        if let Some(key) = &self.title_key {
            config.keys.title_key = Some(key.clone());
        }
        if let Some(directory) = &self.directory {
            config.source.directory = Some(directory.clone());
        }
        if let Some(url) = &self.base_url {
            config.source.base_url = url.clone();
        }
        if let Some(out) = &self.out {
            config.extract.output = out.clone();
        }
        if let Some(pattern) = &self.pattern {
            config.extract.pattern = pattern.clone();
        }
        if let Some(jobs) = self.jobs {
            config.extract.concurrency = jobs;
        }
        if self.overwrite {
            config.extract.overwrite = true;
        }
    }

    /// Default log filter for the `-v` count.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn,nusdec=info",
            1 => "info,nusdec=debug,nusdec_extract=debug",
            2 => "debug",
            _ => "trace",
        }
    }
}

fn parse_title_id(value: &str) -> Result<u64, String> {
    let digits = value.trim().trim_start_matches("0x");
    if digits.len() != 16 {
        return Err(format!("expected 16 hexadecimal digits, got {}", digits.len()));
    }
    u64::from_str_radix(digits, 16).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f";

    #[rstest]
    #[case("0005000E1010ED00", 0x0005_000E_1010_ED00)]
    #[case("0005000e1010ed00", 0x0005_000E_1010_ED00)]
    #[case("0x0005000E1010ED00", 0x0005_000E_1010_ED00)]
    fn test_parse_title_id(#[case] input: &str, #[case] expected: u64) {
        assert_eq!(parse_title_id(input).unwrap(), expected);
    }

    #[rstest]
    #[case("1010ED00")]
    #[case("0005000E1010ED0G")]
    #[case("0005000E1010ED0000")]
    fn test_parse_title_id_invalid(#[case] input: &str) {
        assert!(parse_title_id(input).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::try_parse_from([
            "nusdec",
            "0005000E1010ED00",
            "--version",
            "32",
            "--out",
            "/tmp/titles",
            "--overwrite",
            "--title-key",
            KEY_HEX,
            "--file",
            "/code/.*",
            "-j",
            "2",
            "-vv",
        ])
        .unwrap();
        assert_eq!(args.version, Some(32));
        assert_eq!(args.verbose, 2);

        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.extract.output, PathBuf::from("/tmp/titles"));
        assert!(config.extract.overwrite);
        assert_eq!(config.extract.pattern, "/code/.*");
        assert_eq!(config.extract.concurrency, 2);
        assert_eq!(config.keys.title_key.as_deref(), Some(KEY_HEX));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_flag_replaces_invalid_configured_key() {
        let args = Args::try_parse_from(["nusdec", "0005000E1010ED00", "--common-key", KEY_HEX]).unwrap();
        let mut config = Config::default();
        config.keys.common_key = Some("not a key".to_string());
        assert!(config.validate().is_err());
        args.apply(&mut config);
        assert!(config.validate().is_ok());
        assert_eq!(config.keys.common_key.as_deref(), Some(KEY_HEX));
    }

    #[test]
    fn test_absent_flags_keep_config() {
        let args = Args::try_parse_from(["nusdec", "0005000E1010ED00"]).unwrap();
        let mut config = Config::default();
        config.extract.pattern = "/meta/.*".to_string();
        config.extract.overwrite = true;
        args.apply(&mut config);
        assert_eq!(config.extract.pattern, "/meta/.*");
        assert!(config.extract.overwrite);
        assert_eq!(args.log_filter(), "warn,nusdec=info");
    }
}
