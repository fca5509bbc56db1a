//! Compilation driver.
//!
//! A [`Parser`] owns one source unit and its diagnostic log. `compile()` runs
//! the pipeline
//!
//!   source .gdml
//!     -> lexer      (tokens)
//!     -> parser     (AST, with recovery)
//!     -> typecheck  (scopes, types, exports)
//!
//! and publishes the result as an immutable [`ParsedSrc`] that later units
//! can depend on.

use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, error, info, trace, warn};

use crate::ast::{NodeId, Program};
use crate::diagnostic::{Diagnostic, DiagnosticLog, Level, LogLevel};
use crate::error::{CheckError, CoreError, codes};
use crate::lexer::lex;
use crate::path::FullIdentPath;
use crate::scope::UnitParser;
use crate::sources::load_sources;
use crate::span::Src;
use crate::types::Type;

pub const DEFAULT_MAX_NESTING_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Deepest expression / type / block nesting the parser accepts.
    pub max_nesting_depth: usize,
    /// Whether named namespace-level types are published to dependents.
    pub export_types: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
            export_types: true,
        }
    }
}

/// A compiled unit: its source, typechecked AST, exported types and the type
/// computed for every successfully checked node.
#[derive(Debug)]
pub struct ParsedSrc {
    src: Src,
    ast: Program,
    exports: IndexMap<FullIdentPath, Type>,
    types: HashMap<NodeId, Type>,
}

impl ParsedSrc {
    pub fn src(&self) -> &Src {
        &self.src
    }

    pub fn ast(&self) -> &Program {
        &self.ast
    }

    pub fn get_exported_type(&self, path: &FullIdentPath) -> Option<&Type> {
        self.exports.get(path)
    }

    /// Exported types in declaration order.
    pub fn exported_types(&self) -> impl Iterator<Item = &Type> {
        self.exports.values()
    }

    pub fn add_exported_type(&mut self, ty: Type) -> bool {
        let Some(name) = ty.name().filter(|_| ty.is_exportable()).cloned() else {
            return false;
        };
        if self.exports.contains_key(&name) {
            return false;
        }
        self.exports.insert(name, ty);
        true
    }

    pub fn type_of(&self, id: NodeId) -> Option<&Type> {
        self.types.get(&id)
    }
}

pub struct Parser {
    src: Src,
    options: Options,
    log: DiagnosticLog,
    dependencies: Vec<Rc<ParsedSrc>>,
    parsed: Option<Rc<ParsedSrc>>,
}

impl Parser {
    pub fn new(src: Src) -> Self {
        Self {
            src,
            options: Options::default(),
            log: DiagnosticLog::new(),
            dependencies: Vec::new(),
            parsed: None,
        }
    }

    /// Parser for a file on disk. A read failure is logged as an error
    /// diagnostic and makes `compile()` return `None`.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Src::from_path(path) {
            Ok(src) => Self::new(src),
            Err(err) => {
                let mut parser = Self::new(Src::new(path.display().to_string(), ""));
                parser.log.log(
                    Diagnostic::new(Level::Error, CoreError::from(err).to_string(), None)
                        .with_code(codes::SOURCE_IO),
                );
                parser
            }
        }
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Make the exported types of `dependency` visible to this unit.
    pub fn with_dependency(mut self, dependency: Rc<ParsedSrc>) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Compile the unit. `None` if it could not be read, lexed or parsed, or
    /// if an internal error aborted it. Type errors are logged and still
    /// produce a [`ParsedSrc`]. Compiling twice returns the first result.
    pub fn compile(&mut self) -> Option<Rc<ParsedSrc>> {
        if self.parsed.is_some() {
            return self.parsed.clone();
        }
        if self.log.has_errors() {
            return None;
        }

        let lexed = lex(self.src.text());
        let lex_failed = lexed.diagnostics.iter().any(Diagnostic::is_error);
        for diagnostic in lexed.diagnostics {
            self.log.log(diagnostic);
        }
        if lex_failed {
            debug!(unit = self.src.name(), "lexing failed");
            return None;
        }

        let (ast, exports, types) = {
            let mut unit = UnitParser::new(&mut self.log, self.options.clone(), &self.dependencies);
            let ast = unit.pull(&self.src, lexed.tokens)?;
            trace!(unit = self.src.name(), "ast:\n{}", ast.debug(0));
            if let Err(err) = ast.typecheck(&mut unit) {
                unit.report(&err);
                debug!(unit = self.src.name(), "unit aborted");
                return None;
            }
            let (exports, types) = unit.finish();
            (ast, exports, types)
        };

        debug!(
            unit = self.src.name(),
            exports = exports.len(),
            errors = self.log.errors().count(),
            "compiled unit"
        );
        let parsed = Rc::new(ParsedSrc {
            src: self.src.clone(),
            ast,
            exports,
            types,
        });
        self.parsed = Some(Rc::clone(&parsed));
        Some(parsed)
    }

    pub fn parsed(&self) -> Option<&Rc<ParsedSrc>> {
        self.parsed.as_ref()
    }

    pub fn src(&self) -> &Src {
        &self.src
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn messages(&self) -> impl Iterator<Item = &Diagnostic> {
        self.log.messages()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.log.errors()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.log.warnings()
    }

    pub fn has_errors(&self) -> bool {
        self.log.has_errors()
    }

    /// Every diagnostic rendered against this unit's source, in order.
    pub fn rendered(&self) -> Vec<String> {
        self.log.messages().map(|d| d.render(&self.src)).collect()
    }

    /// Emit the recorded diagnostics through `tracing`, in recorded order.
    pub fn dispatch_logs(&self) {
        for diagnostic in self.log.messages() {
            let rendered = diagnostic.render(&self.src);
            match diagnostic.level {
                Level::Info => info!("{rendered}"),
                Level::Warning => warn!("{rendered}"),
                Level::Error => error!("{rendered}"),
            }
        }
        info!(
            "{}: finished with {} errors and {} warnings",
            self.src.name(),
            self.log.errors().count(),
            self.log.warnings().count()
        );
    }

    pub fn push_log_level(&mut self) -> LogLevel {
        self.log.push_log_level()
    }

    pub fn pop_log_level(&mut self) -> Result<(), CheckError> {
        self.log.pop_log_level()
    }

    pub fn pop_messages(&mut self, level: LogLevel) -> Result<(), CheckError> {
        self.log.pop_messages(level)
    }
}

/// Compile a single in-memory unit.
pub fn compile_source(name: impl Into<String>, text: impl Into<String>) -> Parser {
    let mut parser = Parser::new(Src::new(name, text));
    parser.compile();
    parser
}

/// Compile every `.gdml` file under `root` in sorted path order. Each unit
/// depends on all successfully compiled units before it.
pub fn compile_dir(root: impl AsRef<Path>, options: &Options) -> Result<Vec<Parser>, CoreError> {
    let sources = load_sources(root)?;
    let mut compiled: Vec<Rc<ParsedSrc>> = Vec::new();
    let mut parsers = Vec::with_capacity(sources.len());
    for src in sources {
        let mut parser = compiled.iter().fold(
            Parser::new(src).with_options(options.clone()),
            |parser, dependency| parser.with_dependency(Rc::clone(dependency)),
        );
        if let Some(parsed) = parser.compile() {
            compiled.push(parsed);
        }
        parsers.push(parser);
    }
    Ok(parsers)
}
