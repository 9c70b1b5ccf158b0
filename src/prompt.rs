//! Input completion. Fields missing from the command line are asked for on the terminal
//! before the pipeline starts; with prompting disabled they stay empty.

use std::io::{BufRead, Write};

pub const TITLE_PROMPT: &str = "Title of the work: ";
pub const AUTHORS_PROMPT: &str = "(optional) Authors, separated by commas: ";
pub const IDENTIFIER_PROMPT: &str = "(optional) Identifier (e.g. ISBN): ";
pub const COVER_PROMPT: &str =
    "(optional) Cover image URL or file path (empty: first image of the work): ";

pub struct Prompter<R, W> {
    input: R,
    output: W,
    enabled: bool,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W, enabled: bool) -> Self {
        Prompter {
            input,
            output,
            enabled,
        }
    }

    /// Return `given` if present; otherwise ask. Disabled prompting and end of input both
    /// yield an empty answer.
    pub fn ask(&mut self, label: &str, given: Option<String>) -> std::io::Result<String> {
        if let Some(value) = given {
            return Ok(value);
        }
        if !self.enabled {
            return Ok(String::new());
        }
        self.output.write_all(label.as_bytes())?;
        self.output.flush()?;
        let mut line = String::new();
        self.input.read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn given_value_is_not_prompted() -> std::io::Result<()> {
        let mut out = Vec::new();
        let mut p = Prompter::new(Cursor::new("typed\n"), &mut out, true);
        assert_eq!(p.ask(TITLE_PROMPT, Some("flag".into()))?, "flag");
        assert!(out.is_empty());
        Ok(())
    }

    #[test]
    fn missing_value_is_read_and_trimmed() -> std::io::Result<()> {
        let mut out = Vec::new();
        let mut p = Prompter::new(Cursor::new("  我的小说 \nA,B\n"), &mut out, true);
        assert_eq!(p.ask(TITLE_PROMPT, None)?, "我的小说");
        assert_eq!(p.ask(AUTHORS_PROMPT, None)?, "A,B");
        let shown = String::from_utf8_lossy(&out);
        assert!(shown.contains(TITLE_PROMPT) && shown.contains(AUTHORS_PROMPT));
        Ok(())
    }

    #[test]
    fn end_of_input_is_empty() -> std::io::Result<()> {
        let mut out = Vec::new();
        let mut p = Prompter::new(Cursor::new(""), &mut out, true);
        assert_eq!(p.ask(COVER_PROMPT, None)?, "");
        Ok(())
    }

    #[test]
    fn disabled_prompting_never_reads() -> std::io::Result<()> {
        let mut out = Vec::new();
        let mut p = Prompter::new(Cursor::new("ignored\n"), &mut out, false);
        assert_eq!(p.ask(IDENTIFIER_PROMPT, None)?, "");
        assert!(out.is_empty());
        Ok(())
    }
}
