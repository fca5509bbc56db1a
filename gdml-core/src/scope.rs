//! Scopes and the per-unit compilation state.
//!
//! [`UnitParser`] owns the scope stack for one compilation unit and shares
//! the unit's diagnostic log. It is threaded by `&mut` through parsing and
//! typechecking; nothing else mutates it while a unit is being compiled.

use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use crate::ast::{NodeId, Program};
use crate::compiler::{Options, ParsedSrc};
use crate::diagnostic::{Diagnostic, DiagnosticLog, LogLevel};
use crate::error::{CheckError, TypeCheckResult, TypeError};
use crate::lexer::Token;
use crate::parser::pull_program;
use crate::path::{FullIdentPath, IdentPath};
use crate::span::{Span, Src};
use crate::stream::TokenStream;
use crate::types::{Primitive, Type};

#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Type(Type),
    Var(Type),
    /// Always holds a function type.
    Fun(Type),
    Namespace,
}

impl Entity {
    /// Only namespaces and functions may have entities nested beneath them.
    pub fn may_have_children(&self) -> bool {
        matches!(self, Entity::Namespace | Entity::Fun(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Root,
    Block,
    Function,
    Namespace,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub name: Option<FullIdentPath>,
    pub kind: ScopeKind,
    entities: IndexMap<FullIdentPath, Entity>,
}

impl Scope {
    fn new(name: Option<FullIdentPath>, kind: ScopeKind) -> Self {
        Self {
            name,
            kind,
            entities: IndexMap::new(),
        }
    }

    pub fn root() -> Self {
        Self::new(None, ScopeKind::Root)
    }

    pub fn block() -> Self {
        Self::new(None, ScopeKind::Block)
    }

    pub fn function(name: FullIdentPath) -> Self {
        Self::new(Some(name), ScopeKind::Function)
    }

    pub fn namespace(name: FullIdentPath) -> Self {
        Self::new(Some(name), ScopeKind::Namespace)
    }

    fn at_namespace_level(&self) -> bool {
        matches!(self.kind, ScopeKind::Root | ScopeKind::Namespace)
    }

    pub fn get(&self, path: &FullIdentPath) -> Option<&Entity> {
        self.entities.get(path)
    }

    pub fn contains(&self, path: &FullIdentPath) -> bool {
        self.entities.contains_key(path)
    }

    pub fn entities(&self) -> impl Iterator<Item = (&FullIdentPath, &Entity)> {
        self.entities.iter()
    }
}

/// Mutable state of one compilation unit.
pub struct UnitParser<'p> {
    log: &'p mut DiagnosticLog,
    options: Options,
    scopes: Vec<Scope>,
    exports: IndexMap<FullIdentPath, Type>,
    types: HashMap<NodeId, Type>,
}

impl<'p> UnitParser<'p> {
    /// Fresh state whose root scope holds the built-in primitives and the
    /// exported types of every dependency.
    pub fn new(log: &'p mut DiagnosticLog, options: Options, dependencies: &[Rc<ParsedSrc>]) -> Self {
        let mut root = Scope::root();
        for (name, primitive) in Primitive::BUILTIN {
            root.entities
                .insert(FullIdentPath::from(name), Entity::Type(primitive.into()));
        }
        for dependency in dependencies {
            for ty in dependency.exported_types() {
                if let Some(name) = ty.name() {
                    root.entities
                        .entry(name.clone())
                        .or_insert_with(|| Entity::Type(ty.clone()));
                }
            }
        }
        Self {
            log,
            options,
            scopes: vec![root],
            exports: IndexMap::new(),
            types: HashMap::new(),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Parse a token stream into a program. `None` if any syntax error was
    /// logged.
    pub fn pull(&mut self, src: &Src, tokens: Vec<Token>) -> Option<Program> {
        let before = self.log.errors().count();
        let program = {
            let mut stream =
                TokenStream::new(tokens, src.text(), self.log, self.options.max_nesting_depth);
            pull_program(&mut stream)
        };
        if self.log.errors().count() > before {
            return None;
        }
        debug!(unit = src.name(), items = program.items.len(), "parsed unit");
        Some(program)
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    pub fn report(&mut self, err: &TypeError) {
        self.log.log(err.to_diagnostic());
    }

    pub fn warn(&mut self, message: impl Into<String>, span: Span) {
        self.log.log(Diagnostic::warning(message, span));
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

    // ------------------------------------------------------------------
    // Scope stack
    // ------------------------------------------------------------------

    pub fn is_root_scope(&self) -> bool {
        self.scopes.len() == 1
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    fn top(&self) -> Result<&Scope, CheckError> {
        self.scopes
            .last()
            .ok_or_else(|| CheckError::Internal("scope stack is empty".into()))
    }

    fn top_mut(&mut self) -> Result<&mut Scope, CheckError> {
        self.scopes
            .last_mut()
            .ok_or_else(|| CheckError::Internal("scope stack is empty".into()))
    }

    pub fn push_scope(&mut self, scope: Scope) {
        debug!(kind = ?scope.kind, name = ?scope.name.as_ref().map(ToString::to_string), depth = self.scopes.len() + 1, "push scope");
        self.scopes.push(scope);
    }

    /// Pop the innermost scope. A namespace's entities are hoisted into the
    /// enclosing scope so they stay reachable by qualified path.
    pub fn pop_scope(&mut self) -> Result<Scope, CheckError> {
        if self.scopes.len() <= 1 {
            return Err(CheckError::Internal("attempted to pop the root scope".into()));
        }
        let scope = self
            .scopes
            .pop()
            .ok_or_else(|| CheckError::Internal("scope stack is empty".into()))?;
        debug!(kind = ?scope.kind, depth = self.scopes.len(), "pop scope");
        if scope.kind == ScopeKind::Namespace {
            let parent = self.top_mut()?;
            for (path, entity) in &scope.entities {
                parent
                    .entities
                    .entry(path.clone())
                    .or_insert_with(|| entity.clone());
            }
        }
        Ok(scope)
    }

    /// Run `f` inside `scope`. The scope is popped on every exit path.
    pub fn scoped<T>(
        &mut self,
        scope: Scope,
        span: Span,
        f: impl FnOnce(&mut Self) -> TypeCheckResult<T>,
    ) -> TypeCheckResult<T> {
        self.push_scope(scope);
        let result = f(self);
        match self.pop_scope() {
            Ok(_) => result,
            Err(err) => Err(err.at(span)),
        }
    }

    /// Path that unqualified declarations in scope `index` are placed under:
    /// the nearest named scope at or below it, or the root.
    fn base_path(&self, index: usize) -> FullIdentPath {
        self.scopes[..=index.min(self.scopes.len().saturating_sub(1))]
            .iter()
            .rev()
            .find_map(|scope| scope.name.clone())
            .unwrap_or_default()
    }

    /// Scopes sharing the entity space of the innermost one. Namespace bodies
    /// are hoisted into their parents, so redeclaration is checked across the
    /// whole namespace-level tail of the stack.
    fn declaration_scopes(&self) -> Vec<&Scope> {
        let mut out = Vec::new();
        for scope in self.scopes.iter().rev() {
            out.push(scope);
            if !scope.at_namespace_level() {
                break;
            }
        }
        out
    }

    /// Declared anywhere on the stack.
    pub fn is_declared(&self, path: &FullIdentPath) -> bool {
        self.scopes.iter().any(|scope| scope.contains(path))
    }

    /// Resolve a written name to its fully-qualified path.
    ///
    /// `existing == false` is a declaration site: an unqualified name is
    /// placed under the innermost named scope. Otherwise scopes are searched
    /// innermost-first, each against its own bound name and then against the
    /// namespace or function entities registered directly in it.
    pub fn resolve(&self, name: &IdentPath, existing: bool) -> Result<FullIdentPath, CheckError> {
        if name.is_single() && !existing {
            let path = self.base_path(self.scopes.len().saturating_sub(1)).join(&name.name);
            debug!(%name, %path, "declaration resolved");
            return Ok(path);
        }

        for (index, scope) in self.scopes.iter().enumerate().rev() {
            let base = self.base_path(index);
            let visible = &self.scopes[..=index];
            if let Some(path) =
                base.resolve(name, existing, |p| visible.iter().any(|s| s.contains(p)))
            {
                debug!(%name, %path, "scope resolved");
                return Ok(path);
            }
            for (entity_path, entity) in &scope.entities {
                let Some(path) = entity_path.anchor(name) else {
                    continue;
                };
                if !entity.may_have_children() {
                    return Err(CheckError::NotANamespace(entity_path.to_string()));
                }
                if !existing || self.is_declared(&path) {
                    debug!(%name, %path, anchor = %entity_path, "entity resolved");
                    return Ok(path);
                }
            }
        }

        if let Some(path) = FullIdentPath::root().resolve(name, existing, |p| self.is_declared(p)) {
            debug!(%name, %path, "root resolved");
            return Ok(path);
        }

        if name.is_single() {
            return Err(CheckError::UndefinedIdentifier(name.to_string()));
        }
        let namespace_exists = self.scopes.iter().any(|scope| {
            scope
                .entities()
                .any(|(path, entity)| entity.may_have_children() && path.ends_with(&name.path))
        });
        if namespace_exists {
            Err(CheckError::UndefinedIdentifier(name.to_string()))
        } else {
            let qualifier = IdentPath {
                name: name.path.last().cloned().unwrap_or_default(),
                path: name.path[..name.path.len().saturating_sub(1)].to_vec(),
                absolute: name.absolute,
            };
            Err(CheckError::UnknownNamespace(qualifier.to_string()))
        }
    }

    /// Resolve a declaration path and check it is not already declared in
    /// the current scope. Shadowing an outer block or function scope is
    /// allowed.
    pub fn verify_can_push(&self, name: &IdentPath) -> Result<FullIdentPath, CheckError> {
        let path = self.resolve(name, false)?;
        if self.declaration_scopes().iter().any(|scope| scope.contains(&path)) {
            return Err(CheckError::DuplicateEntity(name.to_string()));
        }
        Ok(path)
    }

    pub fn push_entity(&mut self, path: FullIdentPath, entity: Entity) -> Result<(), CheckError> {
        debug!(%path, "declare entity");
        self.top_mut()?.entities.insert(path, entity);
        Ok(())
    }

    pub fn declare(&mut self, name: &IdentPath, entity: Entity) -> Result<FullIdentPath, CheckError> {
        let path = self.verify_can_push(name)?;
        self.push_entity(path.clone(), entity)?;
        Ok(path)
    }

    /// Declare a namespace, or reopen one that already exists here.
    pub fn declare_namespace(&mut self, name: &IdentPath) -> Result<FullIdentPath, CheckError> {
        let path = self.resolve(name, false)?;
        let existing = self
            .declaration_scopes()
            .iter()
            .find_map(|scope| scope.get(&path))
            .cloned();
        match existing {
            Some(Entity::Namespace) => Ok(path),
            Some(_) => Err(CheckError::DuplicateEntity(name.to_string())),
            None => {
                self.push_entity(path.clone(), Entity::Namespace)?;
                Ok(path)
            }
        }
    }

    pub fn get_entity(&self, path: &FullIdentPath) -> Option<&Entity> {
        self.scopes.iter().rev().find_map(|scope| scope.get(path))
    }

    /// Type named by `name`; any other kind of entity is `NotAType`.
    pub fn lookup_type(&self, name: &IdentPath) -> Result<Type, CheckError> {
        let path = self.resolve(name, true)?;
        match self.get_entity(&path) {
            Some(Entity::Type(ty)) => Ok(ty.clone()),
            Some(_) => Err(CheckError::NotAType(name.to_string())),
            None => Err(CheckError::UndefinedIdentifier(name.to_string())),
        }
    }

    /// Type of the variable or function named by `name`.
    pub fn lookup_value(&self, name: &IdentPath) -> Result<Type, CheckError> {
        let path = self.resolve(name, true)?;
        match self.get_entity(&path) {
            Some(Entity::Var(ty) | Entity::Fun(ty)) => Ok(ty.clone()),
            Some(Entity::Type(_) | Entity::Namespace) => Err(CheckError::NotAValue(name.to_string())),
            None => Err(CheckError::UndefinedIdentifier(name.to_string())),
        }
    }

    // ------------------------------------------------------------------
    // Results
    // ------------------------------------------------------------------

    /// Whether every open scope is the root or a namespace.
    pub fn at_namespace_level(&self) -> bool {
        self.scopes.iter().all(Scope::at_namespace_level)
    }

    /// Publish a declared type to other units. Only named types declared at
    /// namespace level are exported, each path once.
    pub fn export(&mut self, ty: &Type) -> bool {
        if !self.options.export_types || !self.at_namespace_level() || !ty.is_exportable() {
            return false;
        }
        let Some(name) = ty.name() else {
            return false;
        };
        if self.exports.contains_key(name) {
            return false;
        }
        debug!(path = %name, "export type");
        self.exports.insert(name.clone(), ty.clone());
        true
    }

    pub fn exports(&self) -> &IndexMap<FullIdentPath, Type> {
        &self.exports
    }

    pub fn record_type(&mut self, id: NodeId, ty: Type) {
        self.types.insert(id, ty);
    }

    pub fn type_of(&self, id: NodeId) -> Option<&Type> {
        self.types.get(&id)
    }

    /// Hand over the exported types and the per-node type table.
    pub fn finish(self) -> (IndexMap<FullIdentPath, Type>, HashMap<NodeId, Type>) {
        (self.exports, self.types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(log: &mut DiagnosticLog) -> UnitParser<'_> {
        UnitParser::new(log, Options::default(), &[])
    }

    fn p(path: &str) -> FullIdentPath {
        FullIdentPath::from(path)
    }

    fn n(name: &str) -> IdentPath {
        IdentPath::from(name)
    }

    #[test]
    fn root_is_seeded_with_primitives() {
        let mut log = DiagnosticLog::new();
        let unit = unit(&mut log);
        assert!(unit.is_root_scope());
        assert_eq!(unit.lookup_type(&n("int")).unwrap(), Type::int());
        assert_eq!(unit.lookup_type(&n("string")).unwrap(), Type::string());
        assert_eq!(
            unit.lookup_value(&n("int")),
            Err(CheckError::NotAValue("int".into()))
        );
    }

    #[test]
    fn declaration_and_lookup_are_asymmetric() {
        let mut log = DiagnosticLog::new();
        let mut unit = unit(&mut log);
        unit.push_scope(Scope::namespace(p("a::b")));
        let declared = unit.declare(&n("x"), Entity::Var(Type::int())).unwrap();
        assert_eq!(declared, p("a::b::x"));
        assert_eq!(unit.resolve(&n("x"), true), Ok(p("a::b::x")));
        unit.pop_scope().unwrap();

        assert_eq!(
            unit.resolve(&n("x"), true),
            Err(CheckError::UndefinedIdentifier("x".into()))
        );
        assert_eq!(unit.resolve(&n("a::b::x"), true), Ok(p("a::b::x")));
    }

    #[test]
    fn resolution_is_deterministic() {
        let mut log = DiagnosticLog::new();
        let mut unit = unit(&mut log);
        unit.push_scope(Scope::namespace(p("a")));
        unit.declare(&n("x"), Entity::Var(Type::int())).unwrap();
        unit.push_scope(Scope::block());
        let first = unit.resolve(&n("x"), true);
        for _ in 0..5 {
            assert_eq!(unit.resolve(&n("x"), true), first);
        }
        assert_eq!(first, Ok(p("a::x")));
    }

    #[test]
    fn same_scope_redeclaration_is_rejected_but_shadowing_is_not() {
        let mut log = DiagnosticLog::new();
        let mut unit = unit(&mut log);
        unit.push_scope(Scope::function(p("f")));
        unit.declare(&n("a"), Entity::Var(Type::int())).unwrap();
        assert_eq!(
            unit.declare(&n("a"), Entity::Var(Type::int())),
            Err(CheckError::DuplicateEntity("a".into()))
        );
        unit.push_scope(Scope::block());
        assert_eq!(unit.declare(&n("a"), Entity::Var(Type::float())), Ok(p("f::a")));
        assert_eq!(unit.lookup_value(&n("a")), Ok(Type::float()));
        unit.pop_scope().unwrap();
        assert_eq!(unit.lookup_value(&n("a")), Ok(Type::int()));
    }

    #[test]
    fn popping_the_root_is_internal() {
        let mut log = DiagnosticLog::new();
        let mut unit = unit(&mut log);
        assert!(matches!(unit.pop_scope(), Err(CheckError::Internal(_))));
    }

    #[test]
    fn scoped_pops_on_error() {
        let mut log = DiagnosticLog::new();
        let mut unit = unit(&mut log);
        let result: TypeCheckResult<()> = unit.scoped(Scope::block(), Span::default(), |unit| {
            assert_eq!(unit.depth(), 2);
            Err(CheckError::Unresolved("x".into()).at(Span::default()))
        });
        assert!(result.is_err());
        assert!(unit.is_root_scope());
    }

    #[test]
    fn qualified_lookup_through_non_namespace_fails() {
        let mut log = DiagnosticLog::new();
        let mut unit = unit(&mut log);
        unit.declare(&n("x"), Entity::Var(Type::int())).unwrap();
        assert_eq!(
            unit.resolve(&n("x::y"), true),
            Err(CheckError::NotANamespace("x".into()))
        );
        assert_eq!(
            unit.resolve(&n("nowhere::y"), true),
            Err(CheckError::UnknownNamespace("nowhere".into()))
        );
    }

    #[test]
    fn missing_member_of_known_namespace_is_undefined() {
        let mut log = DiagnosticLog::new();
        let mut unit = unit(&mut log);
        unit.declare_namespace(&n("ui")).unwrap();
        assert_eq!(
            unit.resolve(&n("ui::Missing"), true),
            Err(CheckError::UndefinedIdentifier("ui::Missing".into()))
        );
    }

    #[test]
    fn namespaces_hoist_and_reopen() {
        let mut log = DiagnosticLog::new();
        let mut unit = unit(&mut log);
        let ns = unit.declare_namespace(&n("ui")).unwrap();
        unit.push_scope(Scope::namespace(ns));
        unit.declare(&n("Button"), Entity::Type(Type::int())).unwrap();
        unit.pop_scope().unwrap();
        assert!(unit.is_declared(&p("ui::Button")));

        let ns = unit.declare_namespace(&n("ui")).unwrap();
        unit.push_scope(Scope::namespace(ns));
        assert_eq!(unit.resolve(&n("Button"), true), Ok(p("ui::Button")));
        assert_eq!(
            unit.declare(&n("Button"), Entity::Type(Type::int())),
            Err(CheckError::DuplicateEntity("Button".into()))
        );
    }

    #[test]
    fn relative_qualified_lookup_from_inner_namespace() {
        let mut log = DiagnosticLog::new();
        let mut unit = unit(&mut log);
        unit.push_scope(Scope::namespace(p("app")));
        let ui = unit.declare_namespace(&n("ui")).unwrap();
        unit.push_scope(Scope::namespace(ui));
        unit.declare(&n("Label"), Entity::Type(Type::string())).unwrap();
        unit.pop_scope().unwrap();
        assert_eq!(unit.resolve(&n("ui::Label"), true), Ok(p("app::ui::Label")));
        unit.push_scope(Scope::block());
        assert_eq!(unit.lookup_type(&n("ui::Label")), Ok(Type::string()));
    }

    #[test]
    fn exports_only_named_types_at_namespace_level() {
        use crate::types::{AliasType, TypeKind};
        let alias = Type::new(
            TypeKind::Alias(AliasType {
                name: p("Meters"),
                target: Box::new(Type::float()),
            }),
            None,
        );
        let mut log = DiagnosticLog::new();
        let mut unit = unit(&mut log);
        assert!(!unit.export(&Type::int()));
        assert!(unit.export(&alias));
        assert!(!unit.export(&alias));
        unit.push_scope(Scope::block());
        let mut other = alias.clone();
        if let TypeKind::Alias(a) = &mut other.kind {
            a.name = p("Feet");
        }
        assert!(!unit.export(&other));
        assert_eq!(unit.exports().len(), 1);
    }
}
