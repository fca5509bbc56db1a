//! Expression/declaration AST.
//!
//! Nodes form a single-owner tree. Each node carries a [`NodeId`], unique
//! within one compilation unit, which is how types refer back to the node
//! that declared them and how per-node types are attached after checking.

use std::fmt::Write as _;

use crate::lexer::TokenKind;
use crate::path::IdentPath;
use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum Lit {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinOp {
    pub fn from_token(kind: TokenKind) -> Option<Self> {
        Some(match kind {
            TokenKind::OrOr => BinOp::Or,
            TokenKind::AndAnd => BinOp::And,
            TokenKind::EqEq => BinOp::Eq,
            TokenKind::NotEq => BinOp::NotEq,
            TokenKind::Less => BinOp::Less,
            TokenKind::LessEq => BinOp::LessEq,
            TokenKind::Greater => BinOp::Greater,
            TokenKind::GreaterEq => BinOp::GreaterEq,
            TokenKind::Plus => BinOp::Add,
            TokenKind::Minus => BinOp::Sub,
            TokenKind::Star => BinOp::Mul,
            TokenKind::Slash => BinOp::Div,
            TokenKind::Percent => BinOp::Rem,
            _ => return None,
        })
    }

    /// Binding power; higher binds tighter. All operators are
    /// left-associative.
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Or => 1,
            BinOp::And => 2,
            BinOp::Eq | BinOp::NotEq => 3,
            BinOp::Less | BinOp::LessEq | BinOp::Greater | BinOp::GreaterEq => 4,
            BinOp::Add | BinOp::Sub => 5,
            BinOp::Mul | BinOp::Div | BinOp::Rem => 6,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Or => "||",
            BinOp::And => "&&",
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
            BinOp::Less => "<",
            BinOp::LessEq => "<=",
            BinOp::Greater => ">",
            BinOp::GreaterEq => ">=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
        }
    }
}

/// Syntactic type, as written after `:` or `->`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpr {
    pub id: NodeId,
    pub span: Span,
    pub kind: TypeExprKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExprKind {
    Path(IdentPath),
    Ref(Box<TypeExpr>),
    Fn {
        params: Vec<TypeExpr>,
        ret: Option<Box<TypeExpr>>,
    },
    Struct(Vec<Member>),
}

/// Member declaration inside a struct or node body.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub id: NodeId,
    pub span: Span,
    pub name: String,
    pub optional: bool,
    pub ty: Option<TypeExpr>,
    pub default: Option<Expr>,
}

/// `name: value` inside a node or struct literal.
#[derive(Debug, Clone, PartialEq)]
pub struct Prop {
    pub id: NodeId,
    pub span: Span,
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub span: Span,
    pub name: String,
    pub ty: Option<TypeExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub span: Span,
    pub name: String,
    pub ty: Option<TypeExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FnDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Option<TypeExpr>,
    pub body: Option<Box<Expr>>,
    pub is_extern: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub id: NodeId,
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Lit(Lit),
    Ident(IdentPath),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Ref(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Member {
        target: Box<Expr>,
        member: String,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    NodeLit {
        path: IdentPath,
        props: Vec<Prop>,
        children: Vec<Expr>,
    },
    List(Vec<Expr>),
    Block(Vec<Expr>),
    Let {
        name: String,
        ty: Option<TypeExpr>,
        value: Box<Expr>,
    },
    Struct {
        name: Option<String>,
        members: Vec<Member>,
        is_extern: bool,
    },
    Node {
        name: String,
        members: Vec<Member>,
    },
    Enum {
        name: String,
        variants: Vec<Variant>,
        is_extern: bool,
    },
    Alias {
        name: String,
        target: TypeExpr,
    },
    Namespace {
        path: IdentPath,
        body: Vec<Expr>,
    },
    Fn(FnDecl),
}

/// Root of one compilation unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub id: NodeId,
    pub span: Span,
    pub items: Vec<Expr>,
}

fn line(out: &mut String, indent: usize, text: impl AsRef<str>) {
    for _ in 0..indent {
        out.push_str("  ");
    }
    out.push_str(text.as_ref());
    out.push('\n');
}

impl Program {
    /// Structural dump, one node per line, two spaces per level.
    pub fn debug(&self, indent: usize) -> String {
        let mut out = String::new();
        line(&mut out, indent, "Program");
        for item in &self.items {
            out.push_str(&item.debug(indent + 1));
        }
        out
    }
}

impl Expr {
    pub fn debug(&self, indent: usize) -> String {
        let mut out = String::new();
        self.write_debug(&mut out, indent);
        out
    }

    fn write_debug(&self, out: &mut String, indent: usize) {
        match &self.kind {
            ExprKind::Lit(lit) => {
                let text = match lit {
                    Lit::Bool(b) => format!("Bool {b}"),
                    Lit::Int(i) => format!("Int {i}"),
                    Lit::Float(x) => format!("Float {x:?}"),
                    Lit::Str(s) => format!("Str {s:?}"),
                };
                line(out, indent, text);
            }
            ExprKind::Ident(path) => line(out, indent, format!("Ident {path}")),
            ExprKind::Unary { op, operand } => {
                let symbol = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Not => "!",
                };
                line(out, indent, format!("Unary {symbol}"));
                operand.write_debug(out, indent + 1);
            }
            ExprKind::Ref(inner) => {
                line(out, indent, "Ref");
                inner.write_debug(out, indent + 1);
            }
            ExprKind::Binary { op, lhs, rhs } => {
                line(out, indent, format!("Binary {}", op.symbol()));
                lhs.write_debug(out, indent + 1);
                rhs.write_debug(out, indent + 1);
            }
            ExprKind::Member { target, member } => {
                line(out, indent, format!("Member .{member}"));
                target.write_debug(out, indent + 1);
            }
            ExprKind::Call { callee, args } => {
                line(out, indent, format!("Call ({} args)", args.len()));
                callee.write_debug(out, indent + 1);
                for arg in args {
                    arg.write_debug(out, indent + 1);
                }
            }
            ExprKind::NodeLit {
                path,
                props,
                children,
            } => {
                line(out, indent, format!("NodeLit {path}"));
                for prop in props {
                    line(out, indent + 1, format!("Prop {}", prop.name));
                    prop.value.write_debug(out, indent + 2);
                }
                for child in children {
                    child.write_debug(out, indent + 1);
                }
            }
            ExprKind::List(items) => {
                line(out, indent, format!("List ({} items)", items.len()));
                for item in items {
                    item.write_debug(out, indent + 1);
                }
            }
            ExprKind::Block(stmts) => {
                line(out, indent, "Block");
                for stmt in stmts {
                    stmt.write_debug(out, indent + 1);
                }
            }
            ExprKind::Let { name, ty, value } => {
                match ty {
                    Some(ty) => line(out, indent, format!("Let {name}: {}", ty.describe())),
                    None => line(out, indent, format!("Let {name}")),
                }
                value.write_debug(out, indent + 1);
            }
            ExprKind::Struct {
                name,
                members,
                is_extern,
            } => {
                let mut head = String::new();
                if *is_extern {
                    head.push_str("extern ");
                }
                head.push_str("Struct");
                if let Some(name) = name {
                    let _ = write!(head, " {name}");
                }
                line(out, indent, head);
                write_members(out, indent + 1, members);
            }
            ExprKind::Node { name, members } => {
                line(out, indent, format!("Node {name}"));
                write_members(out, indent + 1, members);
            }
            ExprKind::Enum {
                name,
                variants,
                is_extern,
            } => {
                let prefix = if *is_extern { "extern " } else { "" };
                line(out, indent, format!("{prefix}Enum {name}"));
                for variant in variants {
                    match &variant.ty {
                        Some(ty) => line(
                            out,
                            indent + 1,
                            format!("Variant {}: {}", variant.name, ty.describe()),
                        ),
                        None => line(out, indent + 1, format!("Variant {}", variant.name)),
                    }
                }
            }
            ExprKind::Alias { name, target } => {
                line(out, indent, format!("Alias {name} = {}", target.describe()));
            }
            ExprKind::Namespace { path, body } => {
                line(out, indent, format!("Namespace {path}"));
                for stmt in body {
                    stmt.write_debug(out, indent + 1);
                }
            }
            ExprKind::Fn(decl) => {
                let params: Vec<String> = decl
                    .params
                    .iter()
                    .map(|p| match &p.ty {
                        Some(ty) => format!("{}: {}", p.name, ty.describe()),
                        None => p.name.clone(),
                    })
                    .collect();
                let mut head = String::new();
                if decl.is_extern {
                    head.push_str("extern ");
                }
                let _ = write!(head, "Fn {}({})", decl.name, params.join(", "));
                if let Some(ret) = &decl.ret {
                    let _ = write!(head, " -> {}", ret.describe());
                }
                line(out, indent, head);
                if let Some(body) = &decl.body {
                    body.write_debug(out, indent + 1);
                }
            }
        }
    }

    /// Direct sub-expressions, in source order.
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Lit(_) | ExprKind::Ident(_) | ExprKind::Alias { .. } | ExprKind::Enum { .. } => {
                Vec::new()
            }
            ExprKind::Unary { operand, .. } => vec![operand.as_ref()],
            ExprKind::Ref(inner) => vec![inner.as_ref()],
            ExprKind::Binary { lhs, rhs, .. } => vec![lhs.as_ref(), rhs.as_ref()],
            ExprKind::Member { target, .. } => vec![target.as_ref()],
            ExprKind::Call { callee, args } => std::iter::once(&**callee).chain(args).collect(),
            ExprKind::NodeLit {
                props, children, ..
            } => props.iter().map(|p| &p.value).chain(children).collect(),
            ExprKind::List(items) | ExprKind::Block(items) => items.iter().collect(),
            ExprKind::Namespace { body, .. } => body.iter().collect(),
            ExprKind::Let { value, .. } => vec![value.as_ref()],
            ExprKind::Struct { members, .. } | ExprKind::Node { members, .. } => {
                members.iter().filter_map(|m| m.default.as_ref()).collect()
            }
            ExprKind::Fn(decl) => decl.body.iter().map(|b| &**b).collect(),
        }
    }

    /// Unqualified identifiers referenced anywhere in this expression, in
    /// first-occurrence order without repeats. Names bound by a `let`
    /// earlier in an enclosing block are local and not included.
    pub fn referenced_names(&self) -> Vec<String> {
        fn walk<'a>(expr: &'a Expr, bound: &mut Vec<&'a str>, out: &mut Vec<String>) {
            match &expr.kind {
                ExprKind::Ident(path) => {
                    if path.is_single()
                        && !bound.contains(&path.name.as_str())
                        && !out.contains(&path.name)
                    {
                        out.push(path.name.clone());
                    }
                }
                ExprKind::Block(stmts) => {
                    let outer = bound.len();
                    for stmt in stmts {
                        walk(stmt, bound, out);
                        if let ExprKind::Let { name, .. } = &stmt.kind {
                            bound.push(name.as_str());
                        }
                    }
                    bound.truncate(outer);
                }
                _ => {
                    for child in expr.children() {
                        walk(child, bound, out);
                    }
                }
            }
        }
        let mut out = Vec::new();
        walk(self, &mut Vec::new(), &mut out);
        out
    }
}

fn write_members(out: &mut String, indent: usize, members: &[Member]) {
    for member in members {
        let mut head = format!("Member {}", member.name);
        if member.optional {
            head.push('?');
        }
        if let Some(ty) = &member.ty {
            let _ = write!(head, ": {}", ty.describe());
        }
        line(out, indent, head);
        if let Some(default) = &member.default {
            default.write_debug(out, indent + 1);
        }
    }
}

impl TypeExpr {
    /// Source-like rendering used in dumps.
    pub fn describe(&self) -> String {
        match &self.kind {
            TypeExprKind::Path(path) => path.to_string(),
            TypeExprKind::Ref(inner) => format!("&{}", inner.describe()),
            TypeExprKind::Fn { params, ret } => {
                let params: Vec<String> = params.iter().map(TypeExpr::describe).collect();
                match ret {
                    Some(ret) => format!("fn({}) -> {}", params.join(", "), ret.describe()),
                    None => format!("fn({})", params.join(", ")),
                }
            }
            TypeExprKind::Struct(members) => {
                let members: Vec<String> = members
                    .iter()
                    .map(|m| {
                        let marker = if m.optional { "?" } else { "" };
                        match &m.ty {
                            Some(ty) => format!("{}{marker}: {}", m.name, ty.describe()),
                            None => format!("{}{marker}", m.name),
                        }
                    })
                    .collect();
                format!("struct {{ {} }}", members.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(kind: ExprKind) -> Expr {
        Expr {
            id: NodeId(0),
            span: Span::default(),
            kind,
        }
    }

    fn ident(name: &str) -> Expr {
        expr(ExprKind::Ident(IdentPath::from(name)))
    }

    #[test]
    fn precedence_orders_operators() {
        assert!(BinOp::Mul.precedence() > BinOp::Add.precedence());
        assert!(BinOp::Add.precedence() > BinOp::Less.precedence());
        assert!(BinOp::Less.precedence() > BinOp::Eq.precedence());
        assert!(BinOp::Eq.precedence() > BinOp::And.precedence());
        assert!(BinOp::And.precedence() > BinOp::Or.precedence());
        assert_eq!(BinOp::from_token(TokenKind::Percent), Some(BinOp::Rem));
        assert_eq!(BinOp::from_token(TokenKind::Amp), None);
    }

    #[test]
    fn debug_dump_is_indented() {
        let sum = expr(ExprKind::Binary {
            op: BinOp::Add,
            lhs: Box::new(ident("a")),
            rhs: Box::new(expr(ExprKind::Lit(Lit::Int(1)))),
        });
        assert_eq!(sum.debug(1), "  Binary +\n    Ident a\n    Int 1\n");
    }

    #[test]
    fn referenced_names_are_unique_and_ordered() {
        let e = expr(ExprKind::Binary {
            op: BinOp::Mul,
            lhs: Box::new(ident("b")),
            rhs: Box::new(expr(ExprKind::Binary {
                op: BinOp::Add,
                lhs: Box::new(ident("a")),
                rhs: Box::new(expr(ExprKind::Binary {
                    op: BinOp::Add,
                    lhs: Box::new(ident("b")),
                    rhs: Box::new(ident("ns::c")),
                })),
            })),
        });
        assert_eq!(e.referenced_names(), vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn block_locals_are_not_referenced_names() {
        let local = |name: &str, value: Expr| {
            expr(ExprKind::Let {
                name: name.into(),
                ty: None,
                value: Box::new(value),
            })
        };
        // { let w = h; let h = 1; w + h + d }
        let e = expr(ExprKind::Block(vec![
            local("w", ident("h")),
            local("h", expr(ExprKind::Lit(Lit::Int(1)))),
            expr(ExprKind::Binary {
                op: BinOp::Add,
                lhs: Box::new(ident("w")),
                rhs: Box::new(expr(ExprKind::Binary {
                    op: BinOp::Add,
                    lhs: Box::new(ident("h")),
                    rhs: Box::new(ident("d")),
                })),
            }),
        ]));
        assert_eq!(e.referenced_names(), vec!["h".to_string(), "d".to_string()]);

        // a local does not leak out of its block
        let e = expr(ExprKind::List(vec![
            expr(ExprKind::Block(vec![local("x", expr(ExprKind::Lit(Lit::Int(1))))])),
            ident("x"),
        ]));
        assert_eq!(e.referenced_names(), vec!["x".to_string()]);
    }
}
