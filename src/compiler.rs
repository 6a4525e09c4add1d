use std::{
    cell::RefCell,
    fs, io,
    path::{Path, PathBuf},
    rc::Rc,
};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::Config;
use crate::error::Diagnostics;
use crate::expr::NodeIds;
use crate::interpreter::{Bindings, Interpreter, Output};
use crate::parser::Parser;
use crate::resolver::Resolver;
use crate::scanner::Scanner;
use crate::scope::ScopeLink;
use crate::statement::{ImportDecl, Stmt};
use crate::value::Val;

/// A file that ran to completion, as seen by the files importing it.
#[derive(Debug)]
pub struct Module {
    pub path: PathBuf,
    /// How diagnostics and cycle reports name the file.
    pub name: Rc<str>,
    pub exports: FxHashSet<Rc<str>>,
    pub globals: ScopeLink,
    pub bindings: Bindings,
}

impl Module {
    pub fn get(&self, name: &str) -> Option<Val> {
        (*self.globals).borrow().try_get_here(name)
    }
}

/// Ties several files into one program.
///
/// Every file of a session shares one `Diagnostics` collector and one node id
/// counter, so binding tables of different files can be merged safely.
pub struct Compiler {
    config: Config,
    root: PathBuf,
    output: Output,
    diagnostics: Diagnostics,
    ids: NodeIds,
    parsed: FxHashMap<PathBuf, Rc<[Stmt]>>,
    modules: FxHashMap<PathBuf, Rc<Module>>,
    failed: FxHashSet<PathBuf>,
    /// Files whose imports are being resolved right now, outermost first.
    loading: Vec<PathBuf>,
}

impl Compiler {
    pub fn new(config: Config) -> Self {
        Self::with_output(config, Rc::new(RefCell::new(io::stdout())))
    }

    pub fn with_output(config: Config, output: Output) -> Self {
        let root = std::env::current_dir().unwrap_or_default();
        Compiler {
            config,
            root,
            output,
            diagnostics: Diagnostics::new(),
            ids: NodeIds::new(),
            parsed: Default::default(),
            modules: Default::default(),
            failed: Default::default(),
            loading: vec![],
        }
    }

    /// Directory entry files and REPL imports are resolved against.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        self.root = root.canonicalize().unwrap_or(root);
        self
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub(crate) fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    /// Forgets reported errors, keeping loaded modules. The REPL calls this between lines.
    pub fn reset_errors(&mut self) {
        self.diagnostics.clear();
    }

    /// Process exit status for what has been reported so far.
    pub fn exit_code(&self) -> u8 {
        if self.diagnostics.had_error() {
            65
        } else if self.diagnostics.had_runtime_error() {
            70
        } else {
            0
        }
    }

    /// An interpreter printing where this session prints.
    pub fn new_interpreter(&self) -> Interpreter {
        Interpreter::with_output(self.output.clone(), &self.config)
    }

    /// Runs an entry file. Errors in the program end up in `diagnostics()`;
    /// only failing to read the file itself is returned.
    pub fn run_file(&mut self, path: impl AsRef<Path>) -> io::Result<Option<Rc<Module>>> {
        let path = self.root.join(path).canonicalize()?;
        if let Some(module) = self.modules.get(&path) {
            return Ok(Some(module.clone()));
        }
        let source = fs::read_to_string(&path)?;
        Ok(self.process(path, &source))
    }

    /// Runs a snippet that belongs to no file, such as a REPL line.
    ///
    /// Declarations persist in `interp` between calls.
    pub fn run_source(&mut self, name: Option<&str>, source: &str, interp: &mut Interpreter) {
        let file: Option<Rc<str>> = name.map(Into::into);
        let previous = self.diagnostics.set_file(file.clone());
        let before = self.diagnostics.len();

        let tokens = Scanner::new(source).in_file(file).scan_tokens(&mut self.diagnostics);
        let program = Parser::new(&tokens, &mut self.diagnostics, &mut self.ids).parse();
        if self.diagnostics.len() == before {
            let root = self.root.clone();
            Resolver::new(self, interp, root).resolve(&program);
        }
        if self.diagnostics.len() == before {
            if let Err(err) = interp.interpret(&program) {
                self.diagnostics.runtime_error(&err);
            }
        }

        self.diagnostics.set_file(previous);
    }

    /// Loads the module `import` names, running it first if needed.
    ///
    /// Returns `None` after reporting when the module can't be used.
    pub fn import(&mut self, from_dir: &Path, import: &ImportDecl) -> Option<Rc<Module>> {
        let mut relative = import.module.to_string();
        let suffix = format!(".{}", self.config.extension);
        if !relative.ends_with(&suffix) {
            relative.push_str(&suffix);
        }

        let path = match from_dir.join(&relative).canonicalize() {
            Ok(path) => path,
            Err(err) => {
                self.diagnostics
                    .resolve_error(&import.path, format!("Can't read module '{}': {err}", import.module));
                return None;
            }
        };

        if let Some(start) = self.loading.iter().position(|p| *p == path) {
            let cycle = self.loading[start..]
                .iter()
                .chain(std::iter::once(&path))
                .map(|p| self.display_name(p).to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            self.diagnostics
                .resolve_error(&import.path, format!("Import cycle detected: {cycle}."));
            return None;
        }

        if let Some(module) = self.modules.get(&path) {
            tracing::debug!(module = %module.name, "module cache hit");
            return Some(module.clone());
        }
        // Its own errors were reported when it first failed.
        if self.failed.contains(&path) {
            self.diagnostics
                .resolve_error(&import.path, format!("Module '{}' failed to load.", import.module));
            return None;
        }

        let source = match fs::read_to_string(&path) {
            Ok(source) => source,
            Err(err) => {
                self.diagnostics
                    .resolve_error(&import.path, format!("Can't read module '{}': {err}", import.module));
                return None;
            }
        };
        self.process(path, &source)
    }

    fn display_name(&self, path: &Path) -> Rc<str> {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .display()
            .to_string()
            .into()
    }

    fn parse(&mut self, path: &Path, name: Rc<str>, source: &str) -> Rc<[Stmt]> {
        if let Some(program) = self.parsed.get(path) {
            return program.clone();
        }
        let tokens = Scanner::new(source)
            .in_file(Some(name))
            .scan_tokens(&mut self.diagnostics);
        let program: Rc<[Stmt]> = Parser::new(&tokens, &mut self.diagnostics, &mut self.ids)
            .parse()
            .into();
        self.parsed.insert(path.to_path_buf(), program.clone());
        program
    }

    /// Lexes, parses, resolves and runs one file, stopping at the first failing stage.
    fn process(&mut self, path: PathBuf, source: &str) -> Option<Rc<Module>> {
        let name = self.display_name(&path);
        tracing::debug!(module = %name, "loading module");
        let previous = self.diagnostics.set_file(Some(name.clone()));
        let result = self.process_in_file(path.clone(), name, source);
        self.diagnostics.set_file(previous);

        if result.is_none() {
            self.failed.insert(path);
        }
        result
    }

    fn process_in_file(&mut self, path: PathBuf, name: Rc<str>, source: &str) -> Option<Rc<Module>> {
        // Any report from here on, including one from a dependency, fails this file.
        let before = self.diagnostics.len();

        let program = self.parse(&path, name.clone(), source);
        if self.diagnostics.len() > before {
            tracing::debug!(module = %name, "stopping after syntax errors");
            return None;
        }

        let mut interp = self.new_interpreter();
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
        self.loading.push(path.clone());
        let exports = Resolver::new(self, &mut interp, dir).resolve(&program);
        self.loading.pop();
        if self.diagnostics.len() > before {
            tracing::debug!(module = %name, "stopping after resolution errors");
            return None;
        }

        if let Err(err) = interp.interpret(&program) {
            self.diagnostics.runtime_error(&err);
            return None;
        }

        let module = Rc::new(Module {
            path: path.clone(),
            name,
            exports,
            globals: interp.globals(),
            bindings: interp.bindings().clone(),
        });
        self.modules.insert(path, module.clone());
        Some(module)
    }
}
