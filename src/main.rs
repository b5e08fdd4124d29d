mod commands;
mod elf;
mod errors;
mod repl;
mod trace;
mod utils;
use clap::Parser;
use clap_repl::ClapEditor;
use clap_repl::reedline::{
    DefaultPrompt, FileBackedHistory, Highlighter, Prompt, PromptEditMode, PromptHistorySearch,
    StyledText,
};
use elf::ElfImage;
use nix::sys::signal::Signal;
use nu_ansi_term::{Color, Style};
use repl::Repl;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::process;
use trace::Tracee;

use crate::utils::warn;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// path to the program to debug
    program: PathBuf,

    /// arguments handed to the program
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

pub struct MyHighlighter {
    color: Color,
}

impl Highlighter for MyHighlighter {
    fn highlight(&self, line: &str, _cursor: usize) -> StyledText {
        let mut styled_text = StyledText::new();

        styled_text.push((Style::new().fg(self.color), line.to_string()));

        styled_text
    }
}

impl MyHighlighter {
    pub fn new() -> MyHighlighter {
        MyHighlighter { color: Color::Blue }
    }
}

impl Default for MyHighlighter {
    fn default() -> Self {
        MyHighlighter::new()
    }
}

pub struct MyPrompt {
    color: clap_repl::reedline::Color,
    default: DefaultPrompt,
}

impl Prompt for MyPrompt {
    fn render_prompt_left(&self) -> Cow<str> {
        Cow::Borrowed("cydbg")
    }

    fn render_prompt_right(&self) -> Cow<str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _prompt_mode: PromptEditMode) -> Cow<str> {
        Cow::Borrowed("> ")
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<str> {
        self.default.render_prompt_multiline_indicator()
    }

    fn render_prompt_history_search_indicator(
        &self,
        history_search: PromptHistorySearch,
    ) -> Cow<str> {
        self.default
            .render_prompt_history_search_indicator(history_search)
    }

    fn get_prompt_color(&self) -> clap_repl::reedline::Color {
        self.color
    }
}

impl MyPrompt {
    fn new() -> MyPrompt {
        MyPrompt {
            color: clap_repl::reedline::Color::DarkBlue,
            default: DefaultPrompt::default(),
        }
    }
}

fn load_program(path: &Path) -> ElfImage {
    match ElfImage::new(path, 0) {
        Ok(elf) => elf,
        Err(e) => {
            warn(&format!("Couldn't load {}: {e}", path.display()));
            process::exit(1);
        }
    }
}

fn history_path() -> PathBuf {
    match dirs::home_dir() {
        Some(mut path) => {
            path.push(".cydbg-history");
            path
        }
        None => "/tmp/cydbg-history".into(),
    }
}

fn main() {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            process::exit(1);
        }
    };
    let image = load_program(&cli.program);
    let mut tracee = Tracee::new(cli.program.clone(), image);
    if let Err(e) = tracee.spawn(&cli.args) {
        warn(&format!("Couldn't spawn {}: {e}", cli.program.display()));
        process::exit(1);
    }

    let prompt = MyPrompt::new();
    let rl = ClapEditor::<Repl>::builder()
        .with_prompt(Box::new(prompt))
        .with_editor_hook(|reed| {
            reed.with_highlighter(Box::new(MyHighlighter::new()))
                .with_history(Box::new(
                    FileBackedHistory::with_file(10000, history_path()).unwrap(),
                ))
        })
        .build();

    use repl::MainCommand::*;
    rl.repl(|repl: Repl| match repl.command {
        Break(args) => commands::breakpoint(&mut tracee, &args),
        Clear(args) => commands::clear(&mut tracee, &args),
        Backtrace => commands::backtrace(&tracee),
        Continue => commands::continue_process(&mut tracee),
        Stepin => commands::stepin(&mut tracee),
        Readreg(args) => commands::readreg(&tracee, &args),
        Writereg(args) => commands::writereg(&tracee, &args),
        Readmem(args) => commands::readmem(&tracee, &args),
        Writemem(args) => commands::writemem(&tracee, &args),
        Syscall(args) => commands::syscall(&mut tracee, &args),
        Quit => {
            let _ = tracee.kill_process(Signal::SIGKILL);
            process::exit(0);
        }
    });
}
