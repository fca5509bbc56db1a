//! Type model for the GDML front end.
//!
//! [`Type`] is a closed set of variants. Every type carries a weak
//! back-reference to the AST node that declared it ([`NodeId`]), used for
//! diagnostics and export bookkeeping only; it never keeps the node alive and
//! does not take part in equality.

use std::collections::BTreeSet;
use std::fmt;

use indexmap::IndexMap;

use crate::ast::NodeId;
use crate::error::CheckError;
use crate::path::FullIdentPath;
use crate::value::Value;

/// Upper bound on alias chains followed by [`Type::realize`].
pub const MAX_ALIAS_DEPTH: usize = 64;

/// Tags of the built-in types. `Unk` is the inference placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Unk,
    Void,
    Bool,
    Int,
    Float,
    Str,
}

impl Primitive {
    /// Primitives pre-seeded into every unit's root scope, with their names.
    pub const BUILTIN: [(&'static str, Primitive); 5] = [
        ("void", Primitive::Void),
        ("bool", Primitive::Bool),
        ("int", Primitive::Int),
        ("float", Primitive::Float),
        ("string", Primitive::Str),
    ];
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamType {
    pub name: String,
    /// May be unknown at parse time; must be resolved before the function
    /// body is typechecked.
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunType {
    pub name: Option<FullIdentPath>,
    pub params: Vec<ParamType>,
    pub ret: Option<Box<Type>>,
    pub is_extern: bool,
}

impl FunType {
    pub fn return_type(&self) -> Type {
        self.ret.as_deref().cloned().unwrap_or_else(Type::void)
    }
}

/// A member of an aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct PropType {
    pub ty: Type,
    /// Members that must be assigned before this one, e.g. because its
    /// default value reads them.
    pub dependencies: Vec<String>,
    pub required: bool,
    /// Constant default value, when it could be evaluated.
    pub default: Option<Value>,
}

impl PropType {
    pub fn required(ty: Type) -> Self {
        Self {
            ty,
            dependencies: Vec::new(),
            required: true,
            default: None,
        }
    }

    pub fn optional(ty: Type) -> Self {
        Self {
            required: false,
            ..Self::required(ty)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructType {
    pub name: Option<FullIdentPath>,
    pub members: IndexMap<String, PropType>,
    pub is_extern: bool,
}

impl StructType {
    pub fn validate_dependencies(&self) -> Result<(), CheckError> {
        validate_dependencies(&self.members)
    }
}

/// Tag-like aggregate instantiated with node literals. Always named.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeType {
    pub name: FullIdentPath,
    pub props: IndexMap<String, PropType>,
}

impl NodeType {
    pub fn validate_dependencies(&self) -> Result<(), CheckError> {
        validate_dependencies(&self.props)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumType {
    pub name: Option<FullIdentPath>,
    pub variants: IndexMap<String, Type>,
    pub is_extern: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AliasType {
    pub name: FullIdentPath,
    pub target: Box<Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Unknown,
    Void,
    Bool,
    Int,
    Float,
    Str,
    Function(FunType),
    Struct(StructType),
    Node(NodeType),
    Enum(EnumType),
    Ref(Box<Type>),
    Alias(AliasType),
}

#[derive(Debug, Clone)]
pub struct Type {
    pub kind: TypeKind,
    pub decl: Option<NodeId>,
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl From<Primitive> for Type {
    fn from(primitive: Primitive) -> Self {
        let kind = match primitive {
            Primitive::Unk => TypeKind::Unknown,
            Primitive::Void => TypeKind::Void,
            Primitive::Bool => TypeKind::Bool,
            Primitive::Int => TypeKind::Int,
            Primitive::Float => TypeKind::Float,
            Primitive::Str => TypeKind::Str,
        };
        Type::new(kind, None)
    }
}

impl Type {
    pub fn new(kind: TypeKind, decl: Option<NodeId>) -> Self {
        Self { kind, decl }
    }

    pub fn unknown() -> Self {
        Primitive::Unk.into()
    }

    pub fn void() -> Self {
        Primitive::Void.into()
    }

    pub fn bool() -> Self {
        Primitive::Bool.into()
    }

    pub fn int() -> Self {
        Primitive::Int.into()
    }

    pub fn float() -> Self {
        Primitive::Float.into()
    }

    pub fn string() -> Self {
        Primitive::Str.into()
    }

    pub fn reference(inner: Type) -> Self {
        Type::new(TypeKind::Ref(Box::new(inner)), None)
    }

    pub fn primitive(&self) -> Option<Primitive> {
        Some(match self.kind {
            TypeKind::Unknown => Primitive::Unk,
            TypeKind::Void => Primitive::Void,
            TypeKind::Bool => Primitive::Bool,
            TypeKind::Int => Primitive::Int,
            TypeKind::Float => Primitive::Float,
            TypeKind::Str => Primitive::Str,
            _ => return None,
        })
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self.kind, TypeKind::Unknown)
    }

    /// Follow alias chains to the underlying type.
    ///
    /// Fails with [`CheckError::CyclicAlias`] when an alias name repeats or
    /// the chain is longer than [`MAX_ALIAS_DEPTH`].
    pub fn realize(&self) -> Result<Type, CheckError> {
        let mut current = self;
        let mut seen: Vec<&FullIdentPath> = Vec::new();
        while let TypeKind::Alias(alias) = &current.kind {
            if seen.contains(&&alias.name) || seen.len() >= MAX_ALIAS_DEPTH {
                return Err(CheckError::CyclicAlias(alias.name.to_string()));
            }
            seen.push(&alias.name);
            current = &alias.target;
        }
        Ok(current.clone())
    }

    /// Structural compatibility. There are no implicit conversions between
    /// distinct primitives; `unknown` is compatible with everything.
    pub fn convertible(&self, other: &Type) -> bool {
        let (Ok(a), Ok(b)) = (self.realize(), other.realize()) else {
            return false;
        };
        match (&a.kind, &b.kind) {
            (TypeKind::Unknown, _) | (_, TypeKind::Unknown) => true,
            (TypeKind::Function(f), TypeKind::Function(g)) => {
                f.params.len() == g.params.len()
                    && f.params
                        .iter()
                        .zip(&g.params)
                        .all(|(p, q)| p.ty.convertible(&q.ty))
                    && f.return_type().convertible(&g.return_type())
            }
            (TypeKind::Struct(s), TypeKind::Struct(t)) => match (&s.name, &t.name) {
                (Some(a), Some(b)) => a == b,
                _ => members_convertible(&s.members, &t.members),
            },
            (TypeKind::Node(n), TypeKind::Node(m)) => n.name == m.name,
            (TypeKind::Enum(e), TypeKind::Enum(f)) => match (&e.name, &f.name) {
                (Some(a), Some(b)) => a == b,
                _ => {
                    e.variants.len() == f.variants.len()
                        && e.variants.iter().all(|(name, ty)| {
                            f.variants.get(name).is_some_and(|other| ty.convertible(other))
                        })
                }
            },
            (TypeKind::Ref(a), TypeKind::Ref(b)) => a.convertible(b),
            (a, b) => match (primitive_tag(a), primitive_tag(b)) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }

    /// Type of an aggregate member. References are looked through.
    pub fn member_type(&self, name: &str) -> Option<Type> {
        let realized = self.realize().ok()?;
        match &realized.kind {
            TypeKind::Struct(s) => s.members.get(name).map(|m| m.ty.clone()),
            TypeKind::Node(n) => n.props.get(name).map(|p| p.ty.clone()),
            TypeKind::Enum(e) => e.variants.get(name).cloned(),
            TypeKind::Ref(inner) => inner.member_type(name),
            _ => None,
        }
    }

    /// Names of the members that must be supplied by a literal.
    pub fn required_members(&self) -> BTreeSet<String> {
        let Ok(realized) = self.realize() else {
            return BTreeSet::new();
        };
        let members = match &realized.kind {
            TypeKind::Struct(s) => &s.members,
            TypeKind::Node(n) => &n.props,
            _ => return BTreeSet::new(),
        };
        members
            .iter()
            .filter(|(_, prop)| prop.required)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Members of a struct or node type, after alias realization.
    pub fn members(&self) -> Option<IndexMap<String, PropType>> {
        match self.realize().ok()?.kind {
            TypeKind::Struct(s) => Some(s.members),
            TypeKind::Node(n) => Some(n.props),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&FullIdentPath> {
        match &self.kind {
            TypeKind::Function(f) => f.name.as_ref(),
            TypeKind::Struct(s) => s.name.as_ref(),
            TypeKind::Node(n) => Some(&n.name),
            TypeKind::Enum(e) => e.name.as_ref(),
            TypeKind::Alias(a) => Some(&a.name),
            _ => None,
        }
    }

    /// Only named types can be shared with other units.
    pub fn is_exportable(&self) -> bool {
        self.name().is_some()
    }
}

fn primitive_tag(kind: &TypeKind) -> Option<Primitive> {
    Type::new(kind.clone(), None).primitive()
}

fn members_convertible(a: &IndexMap<String, PropType>, b: &IndexMap<String, PropType>) -> bool {
    a.len() == b.len()
        && a.iter().all(|(name, prop)| {
            b.get(name)
                .is_some_and(|other| prop.ty.convertible(&other.ty))
        })
}

/// Every dependency must name a member, and the dependency graph must be
/// acyclic.
pub fn validate_dependencies(members: &IndexMap<String, PropType>) -> Result<(), CheckError> {
    for (name, prop) in members {
        if let Some(dep) = prop.dependencies.iter().find(|d| !members.contains_key(*d)) {
            return Err(CheckError::UnknownDependency {
                member: name.clone(),
                dependency: dep.clone(),
            });
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        Visiting,
        Done,
    }

    fn visit(
        index: usize,
        members: &IndexMap<String, PropType>,
        marks: &mut [Mark],
    ) -> Result<(), CheckError> {
        match marks[index] {
            Mark::Done => return Ok(()),
            Mark::Visiting => {
                let (name, _) = members
                    .get_index(index)
                    .ok_or_else(|| CheckError::Internal("member index out of range".into()))?;
                return Err(CheckError::CyclicDependency(name.clone()));
            }
            Mark::Unvisited => {}
        }
        marks[index] = Mark::Visiting;
        if let Some((_, prop)) = members.get_index(index) {
            for dep in &prop.dependencies {
                if let Some(next) = members.get_index_of(dep) {
                    visit(next, members, marks)?;
                }
            }
        }
        marks[index] = Mark::Done;
        Ok(())
    }

    let mut marks = vec![Mark::Unvisited; members.len()];
    for index in 0..members.len() {
        visit(index, members, &mut marks)?;
    }
    Ok(())
}

fn write_members(f: &mut fmt::Formatter<'_>, members: &IndexMap<String, PropType>) -> fmt::Result {
    f.write_str("{ ")?;
    for (i, (name, prop)) in members.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        let marker = if prop.required { "" } else { "?" };
        write!(f, "{name}{marker}: {}", prop.ty)?;
    }
    f.write_str(" }")
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeKind::Unknown => f.write_str("unknown"),
            TypeKind::Void => f.write_str("void"),
            TypeKind::Bool => f.write_str("bool"),
            TypeKind::Int => f.write_str("int"),
            TypeKind::Float => f.write_str("float"),
            TypeKind::Str => f.write_str("string"),
            TypeKind::Function(fun) => {
                f.write_str("fn")?;
                if let Some(name) = &fun.name {
                    write!(f, " {name}")?;
                }
                f.write_str("(")?;
                for (i, param) in fun.params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", param.name, param.ty)?;
                }
                f.write_str(")")?;
                if let Some(ret) = &fun.ret {
                    write!(f, " -> {ret}")?;
                }
                Ok(())
            }
            TypeKind::Struct(s) => match &s.name {
                Some(name) => write!(f, "{name}"),
                None => {
                    f.write_str("struct ")?;
                    write_members(f, &s.members)
                }
            },
            TypeKind::Node(n) => write!(f, "{}", n.name),
            TypeKind::Enum(e) => match &e.name {
                Some(name) => write!(f, "{name}"),
                None => {
                    f.write_str("enum { ")?;
                    for (i, (name, ty)) in e.variants.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{name}: {ty}")?;
                    }
                    f.write_str(" }")
                }
            },
            TypeKind::Ref(inner) => write!(f, "&{inner}"),
            TypeKind::Alias(alias) => write!(f, "{}", alias.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alias(name: &str, target: Type) -> Type {
        Type::new(
            TypeKind::Alias(AliasType {
                name: FullIdentPath::from(name),
                target: Box::new(target),
            }),
            None,
        )
    }

    fn anon_struct(members: &[(&str, Type)]) -> Type {
        Type::new(
            TypeKind::Struct(StructType {
                name: None,
                members: members
                    .iter()
                    .map(|(n, t)| (n.to_string(), PropType::required(t.clone())))
                    .collect(),
                is_extern: false,
            }),
            None,
        )
    }

    fn node(name: &str, props: Vec<(&str, PropType)>) -> Type {
        Type::new(
            TypeKind::Node(NodeType {
                name: FullIdentPath::from(name),
                props: props.into_iter().map(|(n, p)| (n.to_string(), p)).collect(),
            }),
            None,
        )
    }

    #[test]
    fn distinct_primitives_never_convert() {
        let all = [Type::void(), Type::bool(), Type::int(), Type::float(), Type::string()];
        for (i, a) in all.iter().enumerate() {
            for (j, b) in all.iter().enumerate() {
                assert_eq!(a.convertible(b), i == j, "{a} -> {b}");
            }
        }
    }

    #[test]
    fn unknown_converts_both_ways() {
        assert!(Type::unknown().convertible(&Type::int()));
        assert!(Type::string().convertible(&Type::unknown()));
    }

    #[test]
    fn alias_realizes_to_target() {
        let meters = alias("Meters", Type::float());
        assert_eq!(meters.realize().unwrap(), Type::float());
        assert!(meters.convertible(&Type::float()));
        assert!(Type::float().convertible(&meters));
        assert!(!meters.convertible(&Type::int()));
    }

    #[test]
    fn self_referencing_alias_is_cyclic() {
        let inner = alias("A", Type::int());
        let cyclic = alias("A", inner);
        assert_eq!(cyclic.realize(), Err(CheckError::CyclicAlias("A".into())));
        assert!(!cyclic.convertible(&Type::int()));
    }

    #[test]
    fn overlong_alias_chain_is_rejected() {
        let mut ty = Type::int();
        for i in 0..=MAX_ALIAS_DEPTH {
            ty = alias(&format!("A{i}"), ty);
        }
        assert!(matches!(ty.realize(), Err(CheckError::CyclicAlias(_))));
    }

    #[test]
    fn anonymous_structs_compare_structurally() {
        let a = anon_struct(&[("x", Type::int()), ("y", Type::float())]);
        let b = anon_struct(&[("y", Type::float()), ("x", Type::int())]);
        let c = anon_struct(&[("x", Type::int())]);
        let d = anon_struct(&[("x", Type::float()), ("y", Type::float())]);
        assert!(a.convertible(&b));
        assert!(!a.convertible(&c));
        assert!(!a.convertible(&d));
    }

    #[test]
    fn nodes_compare_by_name() {
        let a = node("ui::Label", vec![]);
        let b = node("ui::Label", vec![("text", PropType::required(Type::string()))]);
        let c = node("ui::Button", vec![]);
        assert!(a.convertible(&b));
        assert!(!a.convertible(&c));
    }

    #[test]
    fn references_add_one_indirection() {
        let r = Type::reference(Type::int());
        assert!(r.convertible(&Type::reference(Type::int())));
        assert!(!r.convertible(&Type::int()));
        assert!(!r.convertible(&Type::reference(Type::float())));
    }

    #[test]
    fn member_lookup_through_alias_and_ref() {
        let point = anon_struct(&[("x", Type::int())]);
        let aliased = Type::reference(alias("P", point));
        assert_eq!(aliased.member_type("x"), Some(Type::int()));
        assert_eq!(aliased.member_type("z"), None);
        assert_eq!(Type::int().member_type("x"), None);
    }

    #[test]
    fn required_members_skip_optional() {
        let ty = node(
            "Button",
            vec![
                ("a", PropType::required(Type::int())),
                ("b", PropType::optional(Type::int())),
            ],
        );
        assert_eq!(ty.required_members(), BTreeSet::from(["a".to_string()]));
    }

    #[test]
    fn only_named_types_are_exportable() {
        assert!(node("Button", vec![]).is_exportable());
        assert!(alias("Meters", Type::float()).is_exportable());
        assert!(!anon_struct(&[]).is_exportable());
        assert!(!Type::int().is_exportable());
    }

    #[test]
    fn dependency_validation() {
        let mut members = IndexMap::new();
        members.insert("a".to_string(), PropType::required(Type::int()));
        let mut b = PropType::optional(Type::int());
        b.dependencies.push("a".into());
        members.insert("b".to_string(), b);
        assert_eq!(validate_dependencies(&members), Ok(()));

        members["a"].dependencies.push("b".into());
        assert!(matches!(
            validate_dependencies(&members),
            Err(CheckError::CyclicDependency(_))
        ));

        members["a"].dependencies = vec!["missing".into()];
        assert_eq!(
            validate_dependencies(&members),
            Err(CheckError::UnknownDependency {
                member: "a".into(),
                dependency: "missing".into()
            })
        );
    }

    #[test]
    fn self_dependency_is_cyclic() {
        let mut members = IndexMap::new();
        let mut a = PropType::optional(Type::int());
        a.dependencies.push("a".into());
        members.insert("a".to_string(), a);
        assert_eq!(
            validate_dependencies(&members),
            Err(CheckError::CyclicDependency("a".into()))
        );
    }

    #[test]
    fn displays_types() {
        let fun = Type::new(
            TypeKind::Function(FunType {
                name: Some(FullIdentPath::from("ui::make")),
                params: vec![ParamType {
                    name: "w".into(),
                    ty: Type::float(),
                }],
                ret: Some(Box::new(Type::reference(Type::string()))),
                is_extern: true,
            }),
            None,
        );
        assert_eq!(fun.to_string(), "fn ui::make(w: float) -> &string");
        assert_eq!(
            anon_struct(&[("x", Type::int())]).to_string(),
            "struct { x: int }"
        );
    }
}
