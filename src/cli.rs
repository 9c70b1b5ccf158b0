//! CLI parsing and orchestration. Parses args, completes the request (config, prompts), runs
//! fetch -> EPUB, and maps errors to exit codes.

use crate::assemble::AssemblyError;
use crate::config::{self, Config};
use crate::convert::{VariantCode, ZhConverter};
use crate::epub::{EpubOptions, EpubVersion};
use crate::fetcher::{resolve_site, FetchError, PoliteClient};
use crate::model::split_authors;
use crate::pipeline::{self, PipelineError, Request};
use crate::prompt::{Prompter, AUTHORS_PROMPT, COVER_PROMPT, IDENTIFIER_PROMPT, TITLE_PROMPT};
use clap::Parser;
use std::cell::RefCell;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_DUMP_DIR: &str = "dump";
const DEFAULT_DELAY_SECS: u64 = 2;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRY_COUNT: u32 = 3;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Cannot set up the HTTP client")]
    Client(#[source] FetchError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) | CliRunError::Client(_) => 1,
            CliRunError::Pipeline(e) => match e {
                PipelineError::Fetch(
                    FetchError::InvalidUrl { .. } | FetchError::UnsupportedSource { .. },
                )
                | PipelineError::Assembly(_) => 1,
                PipelineError::Fetch(_) | PipelineError::Contents(_) | PipelineError::Cover(_) => 2,
                PipelineError::Package(_) => 3,
            },
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "lnscrape")]
#[command(about = "Download a light novel from lightnovel.us and package it as EPUB")]
#[command(
    after_help = "Fields not given as flags (title, authors, identifier, cover) are asked for on the terminal unless --no-input is set.\nConfig file keys (output_dir, dump_dir, user_agent, request_delay_secs, timeout_secs, retry_count, retry_backoff_secs, toc_page, language, convert) are read from ./lnscrape.toml or the user config dir. CLI flags override config."
)]
pub struct Args {
    /// Article or series URL, e.g. https://www.lightnovel.us/cn/detail/123456
    pub url: String,

    /// Directory for raw fetched pages and contents.json. Default: ./dump
    #[arg(long)]
    pub dump_path: Option<PathBuf>,

    /// Parse this saved page instead of fetching the URL.
    #[arg(long)]
    pub html_dump: Option<PathBuf>,

    /// Title of the work.
    #[arg(long)]
    pub title: Option<String>,

    /// Authors, separated by commas.
    #[arg(long)]
    pub authors: Option<String>,

    /// Identifier of the work (e.g. ISBN). Defaults to the source URL.
    #[arg(long)]
    pub identifier: Option<String>,

    /// Cover image URL or local file. Empty: use the first image of the work.
    #[arg(long)]
    pub cover_link: Option<String>,

    /// Chinese variant conversion code (OpenCC naming): s2t, t2s, s2tw, tw2s, s2hk, hk2s,
    /// s2twp, tw2sp, t2tw, hk2t, t2hk, t2jp, jp2t, tw2t.
    #[arg(long)]
    pub cvt: Option<String>,

    /// Output directory (must exist). Default: config output_dir or the current directory.
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Generate EPUB 2 instead of EPUB 3.
    #[arg(long)]
    pub epub_2: bool,

    /// Include toc.ncx in EPUB 3 output for legacy readers.
    #[arg(long)]
    pub ncx: bool,

    /// `dc:language` of the EPUB (overrides config; default zh).
    #[arg(long)]
    pub language: Option<String>,

    /// HTTP User-Agent (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Delay between requests in seconds (overrides config; default 2).
    #[arg(long)]
    pub delay: Option<u64>,

    /// Request timeout in seconds (overrides config; default 30).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Never prompt; missing optional fields stay empty.
    #[arg(long)]
    pub no_input: bool,

    /// Suppress progress output (warnings and errors only).
    #[arg(short, long)]
    pub quiet: bool,

    /// Debug logging and the full error chain.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Conversion code from --cvt, else config. Unrecognised codes are ignored with a warning.
fn resolve_convert(args: &Args, config: Option<&Config>) -> Option<VariantCode> {
    let code = args
        .cvt
        .clone()
        .or_else(|| config.and_then(|c| c.convert.clone()))?;
    let code = code.trim();
    if code.is_empty() {
        return None;
    }
    let parsed = VariantCode::from_code(code);
    if parsed.is_none() {
        tracing::warn!(code = %code, "Unrecognised conversion code; text is left unconverted");
    }
    parsed
}

fn epub_options(args: &Args, config: Option<&Config>) -> EpubOptions {
    let defaults = EpubOptions::default();
    EpubOptions {
        version: if args.epub_2 {
            EpubVersion::Epub2
        } else {
            EpubVersion::Epub3
        },
        include_ncx: args.ncx,
        include_toc_page: config
            .and_then(|c| c.toc_page)
            .unwrap_or(defaults.include_toc_page),
        language: args
            .language
            .clone()
            .or_else(|| config.and_then(|c| c.language.clone()))
            .unwrap_or(defaults.language),
    }
}

/// Complete the request from flags, config, and prompts. Nothing after this reads stdin.
fn build_request<R: BufRead, W: Write>(
    args: &Args,
    config: Option<&Config>,
    prompter: &mut Prompter<R, W>,
) -> Result<Request, CliRunError> {
    let prompt_err = |e: std::io::Error| CliRunError::InvalidInput(format!("Cannot read input: {}", e));
    let cover_seed = prompter
        .ask(COVER_PROMPT, args.cover_link.clone())
        .map_err(prompt_err)?;
    let title = prompter
        .ask(TITLE_PROMPT, args.title.clone())
        .map_err(prompt_err)?;
    let authors = prompter
        .ask(AUTHORS_PROMPT, args.authors.clone())
        .map_err(prompt_err)?;
    let identifier = prompter
        .ask(IDENTIFIER_PROMPT, args.identifier.clone())
        .map_err(prompt_err)?;

    if title.trim().is_empty() {
        return Err(PipelineError::Assembly(AssemblyError::MissingTitle).into());
    }

    let output_dir = args
        .path
        .clone()
        .or_else(|| config.and_then(|c| c.output_dir.clone()))
        .unwrap_or_else(|| PathBuf::from("."));
    if !output_dir.is_dir() {
        return Err(CliRunError::InvalidInput(format!(
            "Output directory does not exist: {}",
            output_dir.display()
        )));
    }
    if let Some(ref dump) = args.html_dump {
        if !dump.is_file() {
            return Err(CliRunError::InvalidInput(format!(
                "HTML dump file does not exist: {}",
                dump.display()
            )));
        }
    }
    let dump_dir = args
        .dump_path
        .clone()
        .or_else(|| config.and_then(|c| c.dump_dir.clone()))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DUMP_DIR));

    Ok(Request {
        url: args.url.trim().to_string(),
        dump_dir,
        html_dump: args.html_dump.clone(),
        title,
        authors: split_authors(&authors),
        identifier: Some(identifier).filter(|s| !s.trim().is_empty()),
        cover_seed: Some(cover_seed),
        convert: resolve_convert(args, config),
        output_dir,
        epub: epub_options(args, config),
    })
}

fn build_client(args: &Args, config: Option<&Config>) -> Result<PoliteClient, CliRunError> {
    let delay_secs = args
        .delay
        .or_else(|| config.and_then(|c| c.request_delay_secs))
        .unwrap_or(DEFAULT_DELAY_SECS);
    let timeout_secs = args
        .timeout
        .or_else(|| config.and_then(|c| c.timeout_secs))
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    let retry_count = config
        .and_then(|c| c.retry_count)
        .unwrap_or(DEFAULT_RETRY_COUNT)
        .max(1);
    let user_agent = args
        .user_agent
        .clone()
        .or_else(|| config.and_then(|c| c.user_agent.clone()));

    let mut builder = PoliteClient::builder()
        .delay_secs(delay_secs)
        .timeout_secs(timeout_secs)
        .retry_count(retry_count);
    if let Some(backoff) = config.and_then(|c| c.retry_backoff_secs.clone()) {
        builder = builder.retry_backoff_secs(backoff);
    }
    if let Some(ua) = user_agent {
        builder = builder.user_agent(ua);
    }
    builder.build().map_err(CliRunError::Client)
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    // Reject unsupported URLs before asking anything.
    resolve_site(&args.url).map_err(PipelineError::from)?;

    let config = config::load_config().map_err(CliRunError::InvalidInput)?;

    let request = {
        let stdin = std::io::stdin();
        let mut prompter = Prompter::new(stdin.lock(), std::io::stderr(), !args.no_input);
        build_request(args, config.as_ref(), &mut prompter)?
    };
    let mut client = build_client(args, config.as_ref())?;

    let progress_state: RefCell<Option<indicatif::ProgressBar>> = RefCell::new(None);
    let progress_cb = |n: u32, total: u32| {
        if total == 0 {
            return;
        }
        let mut state = progress_state.borrow_mut();
        let pb = state.get_or_insert_with(|| {
            let bar = indicatif::ProgressBar::new(total as u64);
            if let Ok(style) = indicatif::ProgressStyle::default_bar()
                .template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
            {
                bar.set_style(
                    style
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                        .progress_chars("█▉▊▋▌▍▎▏ "),
                );
            }
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        pb.set_position(n as u64);
        pb.set_message(format!("Fetching entry {}/{}", n, total));
    };
    let progress: Option<&dyn Fn(u32, u32)> = if args.quiet { None } else { Some(&progress_cb) };

    let result = pipeline::run(&request, &mut client, &ZhConverter, progress);

    if let Some(pb) = progress_state.borrow_mut().take() {
        pb.disable_steady_tick();
        pb.finish_and_clear();
    }

    let path = result?;
    if !args.quiet {
        eprintln!("Wrote {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::EpubError;
    use crate::normalize::NormalizeError;
    use std::io::Cursor;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["lnscrape", "https://www.lightnovel.us/cn/detail/1"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    fn quiet_prompter() -> Prompter<Cursor<&'static str>, Vec<u8>> {
        Prompter::new(Cursor::new(""), Vec::new(), false)
    }

    #[test]
    fn parses_all_flags() {
        let a = args(&[
            "--dump-path", "d", "--title", "T", "--authors", "A, B", "--cvt", "s2t",
            "--epub-2", "--ncx", "--no-input", "-q",
        ]);
        assert_eq!(a.dump_path, Some(PathBuf::from("d")));
        assert_eq!(a.title.as_deref(), Some("T"));
        assert_eq!(a.cvt.as_deref(), Some("s2t"));
        assert!(a.epub_2 && a.ncx && a.no_input && a.quiet);
    }

    #[test]
    fn request_from_flags_without_prompting() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().display().to_string();
        let a = args(&[
            "--title", "T", "--authors", "A, ,B", "--identifier", " ", "--cvt", "S2TW",
            "--path", &out, "--no-input",
        ]);
        let req = build_request(&a, None, &mut quiet_prompter()).unwrap();
        assert_eq!(req.title, "T");
        assert_eq!(req.authors, vec!["A", "B"]);
        assert_eq!(req.identifier, None);
        assert_eq!(req.cover_seed.as_deref(), Some(""));
        assert_eq!(req.convert, Some(VariantCode::S2tw));
        assert_eq!(req.dump_dir, PathBuf::from(DEFAULT_DUMP_DIR));
        assert_eq!(req.epub, EpubOptions::default());
    }

    #[test]
    fn missing_fields_are_prompted() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().display().to_string();
        let a = args(&["--path", &out]);
        let mut output = Vec::new();
        let mut prompter = Prompter::new(
            Cursor::new("https://img.example/c.jpg\n我的书\n甲,乙\nisbn-1\n"),
            &mut output,
            true,
        );
        let req = build_request(&a, None, &mut prompter).unwrap();
        assert_eq!(req.cover_seed.as_deref(), Some("https://img.example/c.jpg"));
        assert_eq!(req.title, "我的书");
        assert_eq!(req.authors, vec!["甲", "乙"]);
        assert_eq!(req.identifier.as_deref(), Some("isbn-1"));
    }

    #[test]
    fn missing_title_without_input_is_assembly_failure() {
        let a = args(&["--no-input"]);
        let err = build_request(&a, None, &mut quiet_prompter()).unwrap_err();
        assert!(matches!(
            err,
            CliRunError::Pipeline(PipelineError::Assembly(AssemblyError::MissingTitle))
        ));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn missing_output_dir_is_invalid_input() {
        let a = args(&["--title", "T", "--path", "/nonexistent_dir_lnscrape_xyz", "--no-input"]);
        let err = build_request(&a, None, &mut quiet_prompter()).unwrap_err();
        match err {
            CliRunError::InvalidInput(msg) => assert!(msg.contains("does not exist")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_html_dump_is_invalid_input() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().display().to_string();
        let dump = tmp.path().join("page.html").display().to_string();
        let a = args(&["--title", "T", "--path", &out, "--html-dump", &dump, "--no-input"]);
        assert!(matches!(
            build_request(&a, None, &mut quiet_prompter()),
            Err(CliRunError::InvalidInput(_))
        ));
    }

    #[test]
    fn config_fills_unset_options() {
        let tmp = tempfile::tempdir().unwrap();
        let config: Config = toml::from_str(&format!(
            "output_dir = {:?}\ndump_dir = \"raw\"\ntoc_page = false\nlanguage = \"zh-TW\"\nconvert = \"t2s\"",
            tmp.path().display().to_string()
        ))
        .unwrap();
        let a = args(&["--title", "T", "--no-input"]);
        let req = build_request(&a, Some(&config), &mut quiet_prompter()).unwrap();
        assert_eq!(req.output_dir, tmp.path());
        assert_eq!(req.dump_dir, PathBuf::from("raw"));
        assert!(!req.epub.include_toc_page);
        assert_eq!(req.epub.language, "zh-TW");
        assert_eq!(req.convert, Some(VariantCode::T2s));

        let a = args(&["--title", "T", "--no-input", "--cvt", "s2hk", "--language", "zh-HK"]);
        let req = build_request(&a, Some(&config), &mut quiet_prompter()).unwrap();
        assert_eq!(req.convert, Some(VariantCode::S2hk));
        assert_eq!(req.epub.language, "zh-HK");
    }

    #[test]
    fn unrecognised_conversion_code_is_ignored() {
        let a = args(&["--cvt", "klingon"]);
        assert_eq!(resolve_convert(&a, None), None);
        let a = args(&["--cvt", "  "]);
        assert_eq!(resolve_convert(&a, None), None);
    }

    #[test]
    fn each_cause_is_reported_once() {
        use std::error::Error;
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = CliRunError::from(PipelineError::Fetch(FetchError::HtmlDump {
            path: PathBuf::from("dump/page-1.html"),
            source: io,
        }));
        let top = err.to_string();
        assert_eq!(top, "Cannot read HTML dump dump/page-1.html");
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(s) = source {
            causes.push(s.to_string());
            source = s.source();
        }
        assert_eq!(causes, vec!["no such file".to_string()]);
    }

    #[test]
    fn cli_run_error_exit_codes() {
        assert_eq!(CliRunError::InvalidInput("x".into()).exit_code(), 1);
        let unsupported = PipelineError::Fetch(FetchError::UnsupportedSource {
            url: "https://example.com".into(),
            reason: "unknown host".into(),
        });
        assert_eq!(CliRunError::Pipeline(unsupported).exit_code(), 1);
        let empty = PipelineError::Fetch(FetchError::EmptySeries {
            url: "https://www.lightnovel.us/cn/series/1".into(),
        });
        assert_eq!(CliRunError::Pipeline(empty).exit_code(), 2);
        let malformed = PipelineError::Contents(NormalizeError::MalformedContents {
            reason: "found number".into(),
        });
        assert_eq!(CliRunError::Pipeline(malformed).exit_code(), 2);
        assert_eq!(
            CliRunError::Pipeline(PipelineError::Package(EpubError::NoSections)).exit_code(),
            3
        );
    }
}
