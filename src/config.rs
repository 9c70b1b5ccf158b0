//! Optional config file loading. Search order: ./lnscrape.toml, then
//! $XDG_CONFIG_HOME/lnscrape/config.toml (or ~/.config/lnscrape/config.toml).

use serde::Deserialize;
use std::path::PathBuf;

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Directory the EPUB is written to when --path is not set.
    pub output_dir: Option<PathBuf>,
    /// Directory for raw fetched pages when --dump-path is not set.
    pub dump_dir: Option<PathBuf>,
    pub user_agent: Option<String>,
    /// Delay in seconds between requests.
    pub request_delay_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    /// Number of HTTP attempts for transient failures (default 3).
    pub retry_count: Option<u32>,
    /// Delay in seconds before each retry (e.g. [1, 2]).
    pub retry_backoff_secs: Option<Vec<u64>>,
    /// Include a visible table-of-contents page after the cover (default: true).
    pub toc_page: Option<bool>,
    /// `dc:language` of the EPUB (default "zh").
    pub language: Option<String>,
    /// Default conversion code, e.g. "s2t".
    pub convert: Option<String>,
}

/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("lnscrape.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("lnscrape").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            let s = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
            let config: Config = toml::from_str(&s)
                .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
            tracing::debug!(path = %path.display(), "Loaded config");
            return Ok(Some(config));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_config() {
        let c: Config = toml::from_str("").unwrap();
        assert!(c.output_dir.is_none());
        assert!(c.dump_dir.is_none());
        assert!(c.convert.is_none());
        assert!(c.language.is_none());
        assert!(c.toc_page.is_none());
    }

    #[test]
    fn parse_full_config() {
        let s = r#"
            output_dir = "books"
            dump_dir = "dump"
            user_agent = "Custom/1.0"
            request_delay_secs = 3
            timeout_secs = 60
            retry_count = 5
            retry_backoff_secs = [1, 2, 4, 8]
            toc_page = false
            language = "zh-TW"
            convert = "s2twp"
        "#;
        let c: Config = toml::from_str(s).unwrap();
        assert_eq!(c.output_dir.as_deref(), Some(std::path::Path::new("books")));
        assert_eq!(c.dump_dir.as_deref(), Some(std::path::Path::new("dump")));
        assert_eq!(c.user_agent.as_deref(), Some("Custom/1.0"));
        assert_eq!(c.request_delay_secs, Some(3));
        assert_eq!(c.timeout_secs, Some(60));
        assert_eq!(c.retry_count, Some(5));
        assert_eq!(c.retry_backoff_secs.as_deref(), Some([1, 2, 4, 8].as_slice()));
        assert_eq!(c.toc_page, Some(false));
        assert_eq!(c.language.as_deref(), Some("zh-TW"));
        assert_eq!(c.convert.as_deref(), Some("s2twp"));
    }

    #[test]
    fn invalid_toml_errors() {
        assert!(toml::from_str::<Config>("output_dir = [").is_err());
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let c: Config = toml::from_str("theme = \"dark\"\nconvert = \"t2s\"").unwrap();
        assert_eq!(c.convert.as_deref(), Some("t2s"));
    }
}
