//! Typechecking of AST nodes.
//!
//! Each node checks its children first and then either yields its own type
//! or a [`TypeError`]. Statement lists (program, blocks, namespace bodies,
//! aggregate member lists) log non-fatal errors and continue with the next
//! sibling, so one unit reports every independent error. Only
//! [`CheckError::Internal`] aborts the unit.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::ast::{Expr, ExprKind, FnDecl, Member, Prop, Program, TypeExpr, TypeExprKind, UnaryOp};
use crate::error::{CheckError, TypeCheckResult, TypeError};
use crate::path::{FullIdentPath, IdentPath};
use crate::scope::{Entity, Scope, UnitParser};
use crate::span::Span;
use crate::types::{
    AliasType, EnumType, FunType, NodeType, ParamType, PropType, StructType, Type, TypeKind,
};
use crate::value::{NodeValue, StructValue, Value};

fn mismatch(expected: &Type, found: &Type, span: Span) -> TypeError {
    CheckError::TypeMismatch {
        expected: expected.to_string(),
        found: found.to_string(),
    }
    .at(span)
}

fn realize(ty: &Type, span: Span) -> TypeCheckResult<Type> {
    ty.realize().map_err(|err| err.at(span))
}

/// Keep going past a recoverable error in one part of a declaration so the
/// declared name still exists afterwards. The failed part becomes unknown.
/// The most recent error is held in `failed`; an earlier one is logged.
fn or_unknown(
    unit: &mut UnitParser<'_>,
    result: TypeCheckResult<Type>,
    failed: &mut Option<TypeError>,
) -> TypeCheckResult<Type> {
    match result {
        Ok(ty) => Ok(ty),
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            if let Some(earlier) = failed.replace(err) {
                unit.report(&earlier);
            }
            Ok(Type::unknown())
        }
    }
}

/// Check a statement list, logging recoverable errors. Yields the type of
/// the last statement (unknown if it failed), or void for an empty list.
fn check_stmts(unit: &mut UnitParser<'_>, stmts: &[Expr]) -> TypeCheckResult<Type> {
    let mut last = Type::void();
    for stmt in stmts {
        last = match stmt.typecheck(unit) {
            Ok(ty) => ty,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                unit.report(&err);
                Type::unknown()
            }
        };
    }
    Ok(last)
}

impl Program {
    pub fn typecheck(&self, unit: &mut UnitParser<'_>) -> TypeCheckResult<Type> {
        check_stmts(unit, &self.items)?;
        unit.record_type(self.id, Type::void());
        Ok(Type::void())
    }
}

impl Expr {
    /// Check this node and record its type on success.
    pub fn typecheck(&self, unit: &mut UnitParser<'_>) -> TypeCheckResult<Type> {
        let ty = self.check_kind(unit)?;
        unit.record_type(self.id, ty.clone());
        Ok(ty)
    }

    fn check_kind(&self, unit: &mut UnitParser<'_>) -> TypeCheckResult<Type> {
        let span = self.span;
        match &self.kind {
            ExprKind::Lit(lit) => Ok(Value::from(lit).get_type()),
            ExprKind::Ident(path) => unit.lookup_value(path).map_err(|err| err.at(span)),
            ExprKind::Unary { op, operand } => {
                let ty = operand.typecheck(unit)?;
                let ok = match (op, &realize(&ty, operand.span)?.kind) {
                    (_, TypeKind::Unknown) => true,
                    (UnaryOp::Neg, TypeKind::Int | TypeKind::Float) => true,
                    (UnaryOp::Not, TypeKind::Bool) => true,
                    _ => false,
                };
                if !ok {
                    let expected = match op {
                        UnaryOp::Neg => "int or float",
                        UnaryOp::Not => "bool",
                    };
                    return Err(CheckError::TypeMismatch {
                        expected: expected.into(),
                        found: ty.to_string(),
                    }
                    .at(operand.span));
                }
                Ok(ty)
            }
            ExprKind::Ref(inner) => Ok(Type::reference(inner.typecheck(unit)?)),
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs_ty = lhs.typecheck(unit)?;
                let rhs_ty = rhs.typecheck(unit)?;
                if !lhs_ty.convertible(&rhs_ty) {
                    return Err(mismatch(&lhs_ty, &rhs_ty, rhs.span).with_note(format!(
                        "both operands of `{}` must have the same type",
                        op.symbol()
                    )));
                }
                Ok(lhs_ty)
            }
            ExprKind::Member { target, member } => {
                let ty = target.typecheck(unit)?;
                if realize(&ty, target.span)?.is_unknown() {
                    return Ok(Type::unknown());
                }
                current_definition(unit, &ty).member_type(member).ok_or_else(|| {
                    CheckError::UnknownMember {
                        ty: ty.to_string(),
                        member: member.clone(),
                    }
                    .at(span)
                })
            }
            ExprKind::Call { callee, args } => check_call(unit, callee, args, span),
            ExprKind::NodeLit {
                path,
                props,
                children,
            } => check_node_lit(unit, path, props, children, span),
            ExprKind::List(items) => {
                for item in items {
                    item.typecheck(unit)?;
                }
                Ok(Type::unknown())
            }
            ExprKind::Block(stmts) => unit.scoped(Scope::block(), span, |unit| check_stmts(unit, stmts)),
            ExprKind::Let { name, ty, value } => {
                let mut failed = None;
                let result = value.typecheck(unit);
                let value_ty = or_unknown(unit, result, &mut failed)?;
                let var_ty = match ty {
                    Some(ty) => {
                        let result = ty.typecheck(unit);
                        let declared = or_unknown(unit, result, &mut failed)?;
                        if !declared.convertible(&value_ty) {
                            let err = Err(mismatch(&declared, &value_ty, value.span));
                            or_unknown(unit, err, &mut failed)?;
                        }
                        declared
                    }
                    None => value_ty,
                };
                let declared = unit.declare(&IdentPath::new(name.as_str()), Entity::Var(var_ty.clone()));
                if let Err(err) = declared {
                    or_unknown(unit, Err(err.at(span)), &mut failed)?;
                }
                match failed {
                    Some(err) => Err(err),
                    None => Ok(var_ty),
                }
            }
            ExprKind::Struct {
                name,
                members,
                is_extern,
            } => {
                let path = match name {
                    Some(name) => Some(
                        unit.verify_can_push(&IdentPath::new(name.as_str()))
                            .map_err(|err| err.at(span))?,
                    ),
                    None => None,
                };
                if let Some(path) = &path {
                    let shell = StructType {
                        name: Some(path.clone()),
                        members: IndexMap::new(),
                        is_extern: *is_extern,
                    };
                    declare_shell(unit, path, TypeKind::Struct(shell), span)?;
                }
                let checked = StructType {
                    name: path.clone(),
                    members: check_members(unit, members, span)?,
                    is_extern: *is_extern,
                };
                if let Err(err) = checked.validate_dependencies() {
                    unit.report(&err.at(span));
                }
                let ty = Type::new(TypeKind::Struct(checked), Some(self.id));
                if let Some(path) = path {
                    declare_type(unit, path, &ty, span)?;
                }
                Ok(ty)
            }
            ExprKind::Node { name, members } => {
                let path = unit
                    .verify_can_push(&IdentPath::new(name.as_str()))
                    .map_err(|err| err.at(span))?;
                let shell = NodeType {
                    name: path.clone(),
                    props: IndexMap::new(),
                };
                declare_shell(unit, &path, TypeKind::Node(shell), span)?;
                let checked = NodeType {
                    name: path.clone(),
                    props: check_members(unit, members, span)?,
                };
                if let Err(err) = checked.validate_dependencies() {
                    unit.report(&err.at(span));
                }
                let ty = Type::new(TypeKind::Node(checked), Some(self.id));
                declare_type(unit, path, &ty, span)?;
                Ok(ty)
            }
            ExprKind::Enum {
                name,
                variants,
                is_extern,
            } => {
                let path = unit
                    .verify_can_push(&IdentPath::new(name.as_str()))
                    .map_err(|err| err.at(span))?;
                let shell = EnumType {
                    name: Some(path.clone()),
                    variants: IndexMap::new(),
                    is_extern: *is_extern,
                };
                declare_shell(unit, &path, TypeKind::Enum(shell), span)?;
                let mut checked = IndexMap::new();
                for variant in variants {
                    let ty = match &variant.ty {
                        Some(ty) => match ty.typecheck(unit) {
                            Ok(ty) => ty,
                            Err(err) if err.is_fatal() => return Err(err),
                            Err(err) => {
                                unit.report(&err);
                                continue;
                            }
                        },
                        None => Type::void(),
                    };
                    if checked.contains_key(&variant.name) {
                        unit.report(&CheckError::DuplicateEntity(variant.name.clone()).at(variant.span));
                        continue;
                    }
                    checked.insert(variant.name.clone(), ty);
                }
                let ty = Type::new(
                    TypeKind::Enum(EnumType {
                        name: Some(path.clone()),
                        variants: checked,
                        is_extern: *is_extern,
                    }),
                    Some(self.id),
                );
                declare_type(unit, path, &ty, span)?;
                Ok(ty)
            }
            ExprKind::Alias { name, target } => {
                let path = unit
                    .verify_can_push(&IdentPath::new(name.as_str()))
                    .map_err(|err| err.at(span))?;
                let target = target.typecheck(unit)?;
                let ty = Type::new(
                    TypeKind::Alias(AliasType {
                        name: path.clone(),
                        target: Box::new(target),
                    }),
                    Some(self.id),
                );
                realize(&ty, span)?;
                declare_type(unit, path, &ty, span)?;
                Ok(ty)
            }
            ExprKind::Namespace { path, body } => {
                let path = unit.declare_namespace(path).map_err(|err| err.at(span))?;
                unit.scoped(Scope::namespace(path), span, |unit| check_stmts(unit, body))?;
                Ok(Type::void())
            }
            ExprKind::Fn(decl) => check_fn(unit, self, decl),
        }
    }
}

fn declare_type(
    unit: &mut UnitParser<'_>,
    path: FullIdentPath,
    ty: &Type,
    span: Span,
) -> TypeCheckResult<()> {
    unit.push_entity(path, Entity::Type(ty.clone()))
        .map_err(|err| err.at(span))?;
    unit.export(ty);
    Ok(())
}

/// Register a member-less stand-in for an aggregate being declared, so its
/// members can refer to it. Replaced by the full type once checked.
fn declare_shell(
    unit: &mut UnitParser<'_>,
    path: &FullIdentPath,
    kind: TypeKind,
    span: Span,
) -> TypeCheckResult<()> {
    unit.push_entity(path.clone(), Entity::Type(Type::new(kind, None)))
        .map_err(|err| err.at(span))
}

/// The declared definition of a named aggregate. Members that refer to
/// their own aggregate hold its stand-in, which has no members yet.
fn current_definition(unit: &UnitParser<'_>, ty: &Type) -> Type {
    let named = match &ty.kind {
        TypeKind::Ref(inner) => inner.as_ref(),
        _ => ty,
    };
    let path = match &named.kind {
        TypeKind::Struct(StructType { name: Some(name), .. }) => name,
        TypeKind::Node(node) => &node.name,
        _ => return ty.clone(),
    };
    match unit.get_entity(path) {
        Some(Entity::Type(full)) if full.decl.is_some() => full.clone(),
        _ => ty.clone(),
    }
}

fn check_call(
    unit: &mut UnitParser<'_>,
    callee: &Expr,
    args: &[Expr],
    span: Span,
) -> TypeCheckResult<Type> {
    let callee_ty = callee.typecheck(unit)?;
    match realize(&callee_ty, callee.span)?.kind {
        TypeKind::Unknown => {
            for arg in args {
                arg.typecheck(unit)?;
            }
            Ok(Type::unknown())
        }
        TypeKind::Function(fun) => {
            if fun.params.len() != args.len() {
                return Err(CheckError::ArgumentCount {
                    expected: fun.params.len(),
                    found: args.len(),
                }
                .at(span)
                .with_note(format!("`{callee_ty}`")));
            }
            for (arg, param) in args.iter().zip(&fun.params) {
                let arg_ty = arg.typecheck(unit)?;
                if !param.ty.convertible(&arg_ty) {
                    return Err(mismatch(&param.ty, &arg_ty, arg.span)
                        .with_note(format!("for parameter `{}`", param.name)));
                }
            }
            Ok(fun.return_type())
        }
        _ => Err(CheckError::NotCallable(callee_ty.to_string()).at(callee.span)),
    }
}

fn check_node_lit(
    unit: &mut UnitParser<'_>,
    path: &IdentPath,
    props: &[Prop],
    children: &[Expr],
    span: Span,
) -> TypeCheckResult<Type> {
    let ty = unit.lookup_type(path).map_err(|err| err.at(span))?;
    let realized = realize(&ty, span)?;
    let is_node = match &realized.kind {
        TypeKind::Node(_) => true,
        TypeKind::Struct(_) => false,
        _ => {
            return Err(CheckError::TypeMismatch {
                expected: "node or struct type".into(),
                found: ty.to_string(),
            }
            .at(span));
        }
    };

    let mut present = BTreeSet::new();
    for prop in props {
        if !present.insert(prop.name.clone()) {
            return Err(CheckError::DuplicateEntity(prop.name.clone()).at(prop.span));
        }
        prop.typecheck(unit, &ty)?;
    }

    for child in children {
        let child_ty = child.typecheck(unit)?;
        let child_is_node = matches!(realize(&child_ty, child.span)?.kind, TypeKind::Node(_));
        if !is_node || !child_is_node {
            return Err(CheckError::TypeMismatch {
                expected: "node".into(),
                found: child_ty.to_string(),
            }
            .at(child.span)
            .with_note(format!("only nodes can be nested, and only inside nodes; `{ty}` is the parent")));
        }
    }

    let missing: Vec<String> = ty.required_members().difference(&present).cloned().collect();
    if !missing.is_empty() {
        return Err(CheckError::MissingRequiredProps {
            ty: ty.to_string(),
            missing,
        }
        .at(span));
    }
    Ok(ty)
}

impl Prop {
    /// Check the value against the member it assigns on `owner`.
    pub fn typecheck(&self, unit: &mut UnitParser<'_>, owner: &Type) -> TypeCheckResult<Type> {
        let expected = owner.member_type(&self.name).ok_or_else(|| {
            CheckError::UnknownMember {
                ty: owner.to_string(),
                member: self.name.clone(),
            }
            .at(self.span)
        })?;
        let ty = self.value.typecheck(unit)?;
        if !expected.convertible(&ty) {
            return Err(mismatch(&expected, &ty, self.value.span));
        }
        unit.record_type(self.id, ty.clone());
        Ok(ty)
    }
}

impl Member {
    /// Check the declared type and register the member in the aggregate's
    /// body scope. Members without a type annotation start out unknown.
    pub fn typecheck(&self, unit: &mut UnitParser<'_>) -> TypeCheckResult<PropType> {
        let ty = match &self.ty {
            Some(ty) => ty.typecheck(unit)?,
            None => Type::unknown(),
        };
        unit.declare(&IdentPath::new(self.name.as_str()), Entity::Var(ty.clone()))
            .map_err(|err| err.at(self.span))?;
        if self.optional && self.default.is_some() {
            unit.warn(
                format!("member `{}` has a default value, so `?` is redundant", self.name),
                self.span,
            );
        }
        unit.record_type(self.id, ty.clone());
        Ok(PropType {
            ty,
            dependencies: Vec::new(),
            required: !self.optional && self.default.is_none(),
            default: None,
        })
    }
}

/// Check an aggregate's members in their own scope: types first, then
/// defaults (which may read sibling members). The caller validates the
/// resulting dependency graph.
fn check_members(
    unit: &mut UnitParser<'_>,
    members: &[Member],
    span: Span,
) -> TypeCheckResult<IndexMap<String, PropType>> {
    unit.scoped(Scope::block(), span, |unit| {
        let mut checked: Vec<Option<PropType>> = Vec::with_capacity(members.len());
        for member in members {
            match member.typecheck(unit) {
                Ok(prop) => checked.push(Some(prop)),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    unit.report(&err);
                    checked.push(None);
                }
            }
        }

        let names: Vec<&str> = members
            .iter()
            .zip(&checked)
            .filter(|(_, prop)| prop.is_some())
            .map(|(member, _)| member.name.as_str())
            .collect();

        for (member, slot) in members.iter().zip(checked.iter_mut()) {
            let (Some(prop), Some(default)) = (slot.as_mut(), member.default.as_ref()) else {
                continue;
            };
            match check_default(unit, member, prop, default, &names) {
                Ok(()) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => unit.report(&err),
            }
        }

        let mut props = IndexMap::new();
        for (member, prop) in members.iter().zip(checked) {
            let Some(prop) = prop else {
                continue;
            };
            if prop.ty.is_unknown() {
                unit.report(&CheckError::Unresolved(member.name.clone()).at(member.span));
            }
            props.insert(member.name.clone(), prop);
        }
        Ok(props)
    })
}

fn check_default(
    unit: &mut UnitParser<'_>,
    member: &Member,
    prop: &mut PropType,
    default: &Expr,
    siblings: &[&str],
) -> TypeCheckResult<()> {
    let value_ty = default.typecheck(unit)?;
    if prop.ty.is_unknown() {
        prop.ty = value_ty;
        let path = unit
            .resolve(&IdentPath::new(member.name.as_str()), false)
            .map_err(|err| err.at(member.span))?;
        unit.push_entity(path, Entity::Var(prop.ty.clone()))
            .map_err(|err| err.at(member.span))?;
        unit.record_type(member.id, prop.ty.clone());
    } else if !prop.ty.convertible(&value_ty) {
        return Err(mismatch(&prop.ty, &value_ty, default.span));
    }
    prop.dependencies = default
        .referenced_names()
        .into_iter()
        .filter(|name| siblings.contains(&name.as_str()))
        .collect();
    if prop.dependencies.is_empty() {
        prop.default = const_eval(unit, default);
    }
    Ok(())
}

fn check_fn(unit: &mut UnitParser<'_>, expr: &Expr, decl: &FnDecl) -> TypeCheckResult<Type> {
    let span = expr.span;
    let path = unit
        .verify_can_push(&IdentPath::new(decl.name.as_str()))
        .map_err(|err| err.at(span))?;

    let mut failed = None;
    let mut params = Vec::with_capacity(decl.params.len());
    for param in &decl.params {
        let ty = match &param.ty {
            Some(ty) => {
                let result = ty.typecheck(unit);
                or_unknown(unit, result, &mut failed)?
            }
            None => Type::unknown(),
        };
        params.push(ParamType {
            name: param.name.clone(),
            ty,
        });
    }
    let ret = match &decl.ret {
        Some(ret) => {
            let result = ret.typecheck(unit);
            Some(Box::new(or_unknown(unit, result, &mut failed)?))
        }
        None => None,
    };
    let fun = FunType {
        name: Some(path.clone()),
        params,
        ret,
        is_extern: decl.is_extern,
    };
    let ty = Type::new(TypeKind::Function(fun.clone()), Some(expr.id));
    // Registered before the body so the function can call itself.
    unit.push_entity(path.clone(), Entity::Fun(ty.clone()))
        .map_err(|err| err.at(span))?;

    let Some(body) = &decl.body else {
        return failed.map_or(Ok(ty), Err);
    };
    if let Some((param, _)) = decl
        .params
        .iter()
        .zip(&fun.params)
        .find(|(param, checked)| param.ty.is_none() && checked.ty.is_unknown())
    {
        let err = CheckError::Unresolved(param.name.clone())
            .at(param.span)
            .with_hint(format!("annotate it: `{}: <type>`", param.name));
        if let Some(earlier) = failed.replace(err) {
            unit.report(&earlier);
        }
        return failed.map_or(Ok(ty), Err);
    }

    let body_ty = unit.scoped(Scope::function(path), span, |unit| {
        for (param, checked) in decl.params.iter().zip(&fun.params) {
            unit.declare(&IdentPath::new(param.name.as_str()), Entity::Var(checked.ty.clone()))
                .map_err(|err| err.at(param.span))?;
        }
        body.typecheck(unit)
    })?;

    if let Some(ret) = &fun.ret {
        let returns_void = matches!(realize(ret, span)?.kind, TypeKind::Void);
        if !returns_void && !ret.convertible(&body_ty) {
            let err = mismatch(ret, &body_ty, body.span).with_note(format!(
                "`{}` is declared to return `{ret}`",
                decl.name
            ));
            if let Some(earlier) = failed.replace(err) {
                unit.report(&earlier);
            }
        }
    }
    failed.map_or(Ok(ty), Err)
}

impl TypeExpr {
    /// The type this expression denotes.
    pub fn typecheck(&self, unit: &mut UnitParser<'_>) -> TypeCheckResult<Type> {
        let ty = match &self.kind {
            TypeExprKind::Path(path) => unit.lookup_type(path).map_err(|err| err.at(self.span))?,
            TypeExprKind::Ref(inner) => Type::reference(inner.typecheck(unit)?),
            TypeExprKind::Fn { params, ret } => {
                let mut checked = Vec::with_capacity(params.len());
                for (i, param) in params.iter().enumerate() {
                    checked.push(ParamType {
                        name: format!("_{i}"),
                        ty: param.typecheck(unit)?,
                    });
                }
                let ret = match ret {
                    Some(ret) => Some(Box::new(ret.typecheck(unit)?)),
                    None => None,
                };
                Type::new(
                    TypeKind::Function(FunType {
                        name: None,
                        params: checked,
                        ret,
                        is_extern: false,
                    }),
                    Some(self.id),
                )
            }
            TypeExprKind::Struct(members) => {
                let checked = StructType {
                    name: None,
                    members: check_members(unit, members, self.span)?,
                    is_extern: false,
                };
                if let Err(err) = checked.validate_dependencies() {
                    unit.report(&err.at(self.span));
                }
                Type::new(TypeKind::Struct(checked), Some(self.id))
            }
        };
        unit.record_type(self.id, ty.clone());
        Ok(ty)
    }
}

/// Evaluate a constant expression. `None` if it is not constant.
pub fn const_eval(unit: &UnitParser<'_>, expr: &Expr) -> Option<Value> {
    match &expr.kind {
        ExprKind::Lit(lit) => Some(Value::from(lit)),
        ExprKind::Unary { op, operand } => Value::unary(*op, &const_eval(unit, operand)?),
        ExprKind::Binary { op, lhs, rhs } => {
            Value::binary(*op, &const_eval(unit, lhs)?, &const_eval(unit, rhs)?)
        }
        ExprKind::Ref(inner) => Some(Value::reference(const_eval(unit, inner)?)),
        ExprKind::NodeLit {
            path,
            props,
            children,
        } if children.is_empty() => {
            let ty = unit.lookup_type(path).ok()?.realize().ok()?;
            let members = ty.members()?;
            let mut values = IndexMap::new();
            for (name, member) in &members {
                let value = match props.iter().find(|prop| &prop.name == name) {
                    Some(prop) => const_eval(unit, &prop.value)?,
                    None => match &member.default {
                        Some(default) => default.clone(),
                        None if member.required => return None,
                        None => continue,
                    },
                };
                values.insert(name.clone(), value);
            }
            match ty.kind {
                TypeKind::Node(ty) => Some(Value::Node(NodeValue { ty, props: values })),
                TypeKind::Struct(ty) => Some(Value::Struct(StructValue {
                    ty,
                    members: values,
                })),
                _ => None,
            }
        }
        _ => None,
    }
}
