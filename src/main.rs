use std::{
    env::args_os,
    error::Error,
    io::{self, stdin, IsTerminal},
    path::Path,
    process::ExitCode,
};

use rustyline::validate::MatchingBracketValidator;
use rustyline::{error::ReadlineError, Cmd, ConditionalEventHandler, Event, EventContext, EventHandler, KeyEvent, Movement, RepeatCount};
use rustyline::{Completer, Editor, Helper, Highlighter, Hinter, Validator};
use tracing_subscriber::{fmt, EnvFilter};

use vuel::{Compiler, Config, Interpreter};

const EX_USAGE: u8 = 64;
const EX_NOINPUT: u8 = 66;

fn main() -> ExitCode {
    init_logging();

    if args_os().len() > 2 {
        eprintln!("usage: vuel [file]");
        return ExitCode::from(EX_USAGE);
    }

    if let Some(arg) = args_os().nth(1) {
        run_file(Path::new(&arg))
    } else {
        match run_prompt() {
            Ok(code) => code,
            Err(err) => {
                eprintln!("error: {err}");
                ExitCode::FAILURE
            }
        }
    }
}

// RUST_LOG picks the level, warnings only by default.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn"))
        .unwrap_or_default();

    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn report(compiler: &Compiler) {
    for diagnostic in compiler.diagnostics().iter() {
        eprintln!("{diagnostic}");
    }
}

fn run_file(path: &Path) -> ExitCode {
    let mut compiler = Compiler::new(Config::default());
    if let Err(err) = compiler.run_file(path) {
        eprintln!("error: can't read '{}': {err}", path.display());
        return ExitCode::from(EX_NOINPUT);
    }
    report(&compiler);
    ExitCode::from(compiler.exit_code())
}

struct TabEventHandler;
impl ConditionalEventHandler for TabEventHandler {
    fn handle(&self, _: &Event, _n: RepeatCount, _: bool, _: &EventContext) -> Option<Cmd> {
        Some(Cmd::Indent(Movement::WholeLine))
    }
}

#[derive(Helper, Completer, Hinter, Highlighter, Validator)]
struct ReplHelper {
    #[rustyline(Completer)]
    completer: (),
    #[rustyline(Validator)]
    validator: MatchingBracketValidator,
}

fn run_prompt() -> Result<ExitCode, Box<dyn Error>> {
    let mut compiler = Compiler::new(Config::default());
    let mut interpreter: Interpreter = compiler.new_interpreter();

    // Piped input runs as one anonymous program.
    if !stdin().is_terminal() {
        let program = io::read_to_string(stdin().lock())?;
        compiler.run_source(None, &program, &mut interpreter);
        report(&compiler);
        return Ok(ExitCode::from(compiler.exit_code()));
    }

    let helper = ReplHelper {
        completer: (),
        validator: MatchingBracketValidator::new(),
    };
    let mut rl = Editor::new()?;
    rl.set_helper(Some(helper));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabEventHandler)),
    );

    loop {
        let readline = rl.readline("> ");
        match readline {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());
                match line.trim() {
                    "exit" => return Ok(ExitCode::SUCCESS),
                    "clear" => {
                        rl.clear_screen()?;
                        continue;
                    }
                    _ => {}
                }
                compiler.run_source(None, &line, &mut interpreter);
                report(&compiler);
                compiler.reset_errors();
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Ok(ExitCode::SUCCESS),
            Err(err) => return Err(Box::new(err)),
        }
    }
}
