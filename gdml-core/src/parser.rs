//! Recursive-descent parser producing the AST.
//!
//! Statement lists recover from syntax errors: the error is logged, the
//! stream resynchronizes and parsing continues. Everything below statement
//! level returns `Result` and propagates with `?`.

use crate::ast::{
    BinOp, Expr, ExprKind, FnDecl, Lit, Member, Param, Program, Prop, TypeExpr, TypeExprKind,
    UnaryOp, Variant,
};
use crate::error::ParseError;
use crate::lexer::{TokenKind, unescape};
use crate::path::IdentPath;
use crate::span::Span;
use crate::stream::TokenStream;

type PResult<T> = Result<T, ParseError>;

/// Parse a whole unit. Syntax errors are logged to the stream's log.
pub fn pull_program(s: &mut TokenStream<'_>) -> Program {
    let id = s.next_id();
    let start = s.current_span();
    let items = pull_stmt_list(s, false);
    Program {
        id,
        span: s.span_from(start),
        items,
    }
}

fn pull_stmt_list(s: &mut TokenStream<'_>, braced: bool) -> Vec<Expr> {
    let mut items = Vec::new();
    loop {
        match s.peek_kind() {
            TokenKind::Eof => break,
            TokenKind::RBrace if braced => break,
            TokenKind::RBrace => {
                let err = s.unexpected("statement");
                s.report(&err);
                s.advance();
                continue;
            }
            TokenKind::Semi => {
                s.advance();
                continue;
            }
            _ => {}
        }
        let before = s.position();
        match pull_stmt(s) {
            Ok(stmt) => items.push(stmt),
            Err(err) => {
                s.report(&err);
                s.synchronize();
                if s.position() == before {
                    s.advance();
                }
            }
        }
    }
    items
}

fn pull_stmt(s: &mut TokenStream<'_>) -> PResult<Expr> {
    let stmt = match s.peek_kind() {
        TokenKind::Extern => match s.peek_nth(1).kind {
            TokenKind::Struct => pull_struct(s)?,
            TokenKind::Enum => pull_enum(s)?,
            TokenKind::Fn => pull_fn(s)?,
            _ => {
                s.advance();
                return Err(s.unexpected("`struct`, `enum` or `fn` after `extern`"));
            }
        },
        TokenKind::Struct => pull_struct(s)?,
        TokenKind::Node => pull_node_decl(s)?,
        TokenKind::Enum => pull_enum(s)?,
        TokenKind::Alias => pull_alias(s)?,
        TokenKind::Namespace => pull_namespace(s)?,
        TokenKind::Fn => pull_fn(s)?,
        TokenKind::Let => pull_let(s)?,
        _ => pull_expr(s)?,
    };
    s.eat(TokenKind::Semi);
    Ok(stmt)
}

fn expect_ident(s: &mut TokenStream<'_>) -> PResult<(String, Span)> {
    let token = s.expect(TokenKind::Ident)?;
    Ok((s.text(&token).to_string(), token.span))
}

fn finish(s: &mut TokenStream<'_>, start: Span, kind: ExprKind) -> Expr {
    Expr {
        id: s.next_id(),
        span: s.span_from(start),
        kind,
    }
}

fn pull_struct(s: &mut TokenStream<'_>) -> PResult<Expr> {
    let start = s.current_span();
    let is_extern = s.eat(TokenKind::Extern).is_some();
    s.expect(TokenKind::Struct)?;
    let name = if s.check(TokenKind::Ident) {
        Some(expect_ident(s)?.0)
    } else {
        None
    };
    let members = pull_member_body(s)?;
    Ok(finish(
        s,
        start,
        ExprKind::Struct {
            name,
            members,
            is_extern,
        },
    ))
}

fn pull_node_decl(s: &mut TokenStream<'_>) -> PResult<Expr> {
    let start = s.current_span();
    s.expect(TokenKind::Node)?;
    let (name, _) = expect_ident(s)?;
    let members = pull_member_body(s)?;
    Ok(finish(s, start, ExprKind::Node { name, members }))
}

/// `{ member, member, ... }`
fn pull_member_body(s: &mut TokenStream<'_>) -> PResult<Vec<Member>> {
    s.expect(TokenKind::LBrace)?;
    let mut members = Vec::new();
    while !s.check(TokenKind::RBrace) && !s.at_end() {
        members.push(pull_member(s)?);
        if s.eat(TokenKind::Comma).is_none() {
            break;
        }
    }
    s.expect(TokenKind::RBrace)?;
    Ok(members)
}

fn pull_member(s: &mut TokenStream<'_>) -> PResult<Member> {
    let (name, start) = expect_ident(s)?;
    let optional = s.eat(TokenKind::Question).is_some();
    let ty = match s.eat(TokenKind::Colon) {
        Some(_) => Some(pull_type(s)?),
        None => None,
    };
    let default = match s.eat(TokenKind::Equal) {
        Some(_) => Some(pull_expr(s)?),
        None => None,
    };
    if ty.is_none() && default.is_none() {
        return Err(
            ParseError::invalid(format!("member `{name}` needs a type or a default value"), start)
                .with_hint(format!("write `{name}: <type>`")),
        );
    }
    Ok(Member {
        id: s.next_id(),
        span: s.span_from(start),
        name,
        optional,
        ty,
        default,
    })
}

fn pull_enum(s: &mut TokenStream<'_>) -> PResult<Expr> {
    let start = s.current_span();
    let is_extern = s.eat(TokenKind::Extern).is_some();
    s.expect(TokenKind::Enum)?;
    let (name, _) = expect_ident(s)?;
    s.expect(TokenKind::LBrace)?;
    let mut variants = Vec::new();
    while !s.check(TokenKind::RBrace) && !s.at_end() {
        let (variant, vstart) = expect_ident(s)?;
        let ty = match s.eat(TokenKind::Colon) {
            Some(_) => Some(pull_type(s)?),
            None => None,
        };
        variants.push(Variant {
            span: s.span_from(vstart),
            name: variant,
            ty,
        });
        if s.eat(TokenKind::Comma).is_none() {
            break;
        }
    }
    s.expect(TokenKind::RBrace)?;
    Ok(finish(
        s,
        start,
        ExprKind::Enum {
            name,
            variants,
            is_extern,
        },
    ))
}

fn pull_alias(s: &mut TokenStream<'_>) -> PResult<Expr> {
    let start = s.current_span();
    s.expect(TokenKind::Alias)?;
    let (name, _) = expect_ident(s)?;
    s.expect(TokenKind::Equal)?;
    let target = pull_type(s)?;
    Ok(finish(s, start, ExprKind::Alias { name, target }))
}

fn pull_namespace(s: &mut TokenStream<'_>) -> PResult<Expr> {
    let start = s.current_span();
    s.expect(TokenKind::Namespace)?;
    let (path, _) = pull_path(s)?;
    s.expect(TokenKind::LBrace)?;
    let body = s.nested(|s| Ok(pull_stmt_list(s, true)))?;
    s.expect(TokenKind::RBrace)?;
    Ok(finish(s, start, ExprKind::Namespace { path, body }))
}

fn pull_fn(s: &mut TokenStream<'_>) -> PResult<Expr> {
    let start = s.current_span();
    let is_extern = s.eat(TokenKind::Extern).is_some();
    s.expect(TokenKind::Fn)?;
    let (name, name_span) = expect_ident(s)?;
    s.expect(TokenKind::LParen)?;
    let mut params = Vec::new();
    while !s.check(TokenKind::RParen) && !s.at_end() {
        let (param, pstart) = expect_ident(s)?;
        let ty = match s.eat(TokenKind::Colon) {
            Some(_) => Some(pull_type(s)?),
            None => None,
        };
        params.push(Param {
            span: s.span_from(pstart),
            name: param,
            ty,
        });
        if s.eat(TokenKind::Comma).is_none() {
            break;
        }
    }
    s.expect(TokenKind::RParen)?;
    let ret = match s.eat(TokenKind::Arrow) {
        Some(_) => Some(pull_type(s)?),
        None => None,
    };
    let body = if s.check(TokenKind::LBrace) {
        Some(Box::new(pull_block(s)?))
    } else {
        s.expect(TokenKind::Semi)?;
        None
    };
    match (is_extern, body.is_some()) {
        (true, true) => {
            return Err(ParseError::invalid(
                format!("extern function `{name}` cannot have a body"),
                name_span,
            ));
        }
        (false, false) => {
            return Err(ParseError::invalid(
                format!("function `{name}` needs a body"),
                name_span,
            )
            .with_hint("mark it `extern` if it is provided by the host"));
        }
        _ => {}
    }
    Ok(finish(
        s,
        start,
        ExprKind::Fn(FnDecl {
            name,
            params,
            ret,
            body,
            is_extern,
        }),
    ))
}

fn pull_let(s: &mut TokenStream<'_>) -> PResult<Expr> {
    let start = s.current_span();
    s.expect(TokenKind::Let)?;
    let (name, _) = expect_ident(s)?;
    let ty = match s.eat(TokenKind::Colon) {
        Some(_) => Some(pull_type(s)?),
        None => None,
    };
    s.expect(TokenKind::Equal)?;
    let value = Box::new(pull_expr(s)?);
    Ok(finish(s, start, ExprKind::Let { name, ty, value }))
}

fn pull_block(s: &mut TokenStream<'_>) -> PResult<Expr> {
    s.nested(|s| {
        let start = s.current_span();
        s.expect(TokenKind::LBrace)?;
        let stmts = pull_stmt_list(s, true);
        s.expect(TokenKind::RBrace)?;
        Ok(finish(s, start, ExprKind::Block(stmts)))
    })
}

/// `::`? IDENT (`::` IDENT)*
pub fn pull_path(s: &mut TokenStream<'_>) -> PResult<(IdentPath, Span)> {
    let start = s.current_span();
    let absolute = s.eat(TokenKind::DoubleColon).is_some();
    let (first, _) = expect_ident(s)?;
    let mut segments = vec![first];
    while s.check(TokenKind::DoubleColon) && s.peek_nth(1).kind == TokenKind::Ident {
        s.advance();
        segments.push(expect_ident(s)?.0);
    }
    let span = s.span_from(start);
    IdentPath::from_segments(segments, absolute)
        .map(|path| (path, span))
        .ok_or_else(|| ParseError::invalid("empty path", span))
}

pub fn pull_type(s: &mut TokenStream<'_>) -> PResult<TypeExpr> {
    s.nested(|s| {
        let start = s.current_span();
        let kind = match s.peek_kind() {
            TokenKind::Amp => {
                s.advance();
                TypeExprKind::Ref(Box::new(pull_type(s)?))
            }
            TokenKind::Fn => {
                s.advance();
                s.expect(TokenKind::LParen)?;
                let mut params = Vec::new();
                while !s.check(TokenKind::RParen) && !s.at_end() {
                    params.push(pull_type(s)?);
                    if s.eat(TokenKind::Comma).is_none() {
                        break;
                    }
                }
                s.expect(TokenKind::RParen)?;
                let ret = match s.eat(TokenKind::Arrow) {
                    Some(_) => Some(Box::new(pull_type(s)?)),
                    None => None,
                };
                TypeExprKind::Fn { params, ret }
            }
            TokenKind::Struct => {
                s.advance();
                TypeExprKind::Struct(pull_member_body(s)?)
            }
            TokenKind::Ident | TokenKind::DoubleColon => TypeExprKind::Path(pull_path(s)?.0),
            _ => return Err(s.unexpected("type")),
        };
        Ok(TypeExpr {
            id: s.next_id(),
            span: s.span_from(start),
            kind,
        })
    })
}

pub fn pull_expr(s: &mut TokenStream<'_>) -> PResult<Expr> {
    let lhs = pull_unary(s)?;
    pull(s, lhs, 1)
}

/// Precedence climbing over binary operators, starting from an already
/// parsed left operand. Consumes operators binding at least `min_prec`.
/// Each operator applied deepens the left operand by one level, so links
/// count toward the nesting limit.
pub fn pull(s: &mut TokenStream<'_>, lhs: Expr, min_prec: u8) -> PResult<Expr> {
    s.chained(|s| pull_chain(s, lhs, min_prec))
}

fn pull_chain(s: &mut TokenStream<'_>, lhs: Expr, min_prec: u8) -> PResult<Expr> {
    let mut lhs = lhs;
    while let Some(op) = BinOp::from_token(s.peek_kind()) {
        if op.precedence() < min_prec {
            break;
        }
        s.deepen()?;
        s.advance();
        let mut rhs = pull_unary(s)?;
        while let Some(next) = BinOp::from_token(s.peek_kind()) {
            if next.precedence() <= op.precedence() {
                break;
            }
            rhs = pull(s, rhs, op.precedence() + 1)?;
        }
        let span = lhs.span.to(rhs.span);
        lhs = Expr {
            id: s.next_id(),
            span,
            kind: ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        };
    }
    Ok(lhs)
}

fn pull_unary(s: &mut TokenStream<'_>) -> PResult<Expr> {
    s.nested(|s| {
        let start = s.current_span();
        let kind = match s.peek_kind() {
            TokenKind::Minus if s.peek_nth(1).kind == TokenKind::IntLiteral && !has_suffix(s) => {
                s.advance();
                let token = s.advance();
                let text = format!("-{}", s.text(&token));
                ExprKind::Lit(Lit::Int(parse_int(&text, start.to(token.span))?))
            }
            TokenKind::Minus => {
                s.advance();
                let operand = Box::new(pull_unary(s)?);
                ExprKind::Unary {
                    op: UnaryOp::Neg,
                    operand,
                }
            }
            TokenKind::Bang => {
                s.advance();
                let operand = Box::new(pull_unary(s)?);
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand,
                }
            }
            TokenKind::Amp => {
                s.advance();
                ExprKind::Ref(Box::new(pull_unary(s)?))
            }
            _ => return pull_primary(s),
        };
        Ok(finish(s, start, kind))
    })
}

/// A primary expression followed by any number of call and member suffixes.
pub fn pull_primary(s: &mut TokenStream<'_>) -> PResult<Expr> {
    s.chained(pull_suffixes)
}

fn pull_suffixes(s: &mut TokenStream<'_>) -> PResult<Expr> {
    let start = s.current_span();
    let mut expr = pull_primary_non_call(s)?;
    loop {
        match s.peek_kind() {
            TokenKind::LParen => {
                s.deepen()?;
                s.advance();
                let mut args = Vec::new();
                while !s.check(TokenKind::RParen) && !s.at_end() {
                    args.push(pull_expr(s)?);
                    if s.eat(TokenKind::Comma).is_none() {
                        break;
                    }
                }
                s.expect(TokenKind::RParen)?;
                expr = finish(
                    s,
                    start,
                    ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                );
            }
            TokenKind::Dot => {
                s.deepen()?;
                s.advance();
                let (member, _) = expect_ident(s)?;
                expr = finish(
                    s,
                    start,
                    ExprKind::Member {
                        target: Box::new(expr),
                        member,
                    },
                );
            }
            _ => break,
        }
    }
    Ok(expr)
}

/// Whether the literal after a leading `-` carries a call or member suffix,
/// in which case the minus applies to the whole suffixed expression.
fn has_suffix(s: &TokenStream<'_>) -> bool {
    matches!(s.peek_nth(2).kind, TokenKind::LParen | TokenKind::Dot)
}

fn parse_int(text: &str, span: Span) -> PResult<i64> {
    let text = text.replace('_', "");
    text.parse::<i64>()
        .map_err(|_| ParseError::invalid(format!("integer literal `{text}` is out of range"), span))
}

/// A primary expression without trailing call or member suffixes.
pub fn pull_primary_non_call(s: &mut TokenStream<'_>) -> PResult<Expr> {
    let start = s.current_span();
    let kind = match s.peek_kind() {
        TokenKind::IntLiteral => {
            let token = s.advance();
            ExprKind::Lit(Lit::Int(parse_int(s.text(&token), token.span)?))
        }
        TokenKind::FloatLiteral => {
            let token = s.advance();
            let text = s.text(&token).replace('_', "");
            let value = text.parse::<f64>().map_err(|_| {
                ParseError::invalid(format!("invalid float literal `{text}`"), token.span)
            })?;
            ExprKind::Lit(Lit::Float(value))
        }
        TokenKind::StringLiteral => {
            let token = s.advance();
            ExprKind::Lit(Lit::Str(unescape(s.text(&token))))
        }
        TokenKind::BoolLiteral => {
            let token = s.advance();
            ExprKind::Lit(Lit::Bool(s.text(&token) == "true"))
        }
        TokenKind::LParen => {
            s.advance();
            let inner = pull_expr(s)?;
            s.expect(TokenKind::RParen)?;
            return Ok(inner);
        }
        TokenKind::LBracket => {
            s.advance();
            let mut items = Vec::new();
            while !s.check(TokenKind::RBracket) && !s.at_end() {
                items.push(pull_expr(s)?);
                if s.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
            s.expect(TokenKind::RBracket)?;
            ExprKind::List(items)
        }
        TokenKind::LBrace => return pull_block(s),
        TokenKind::Ident | TokenKind::DoubleColon => {
            let (path, _) = pull_path(s)?;
            if s.check(TokenKind::LBrace) {
                if let Some((props, children)) = s.speculate(pull_node_body)? {
                    return Ok(finish(
                        s,
                        start,
                        ExprKind::NodeLit {
                            path,
                            props,
                            children,
                        },
                    ));
                }
            }
            ExprKind::Ident(path)
        }
        _ => return Err(s.unexpected("expression")),
    };
    Ok(finish(s, start, kind))
}

/// `path { ... }` in child position, where it cannot be anything else.
fn pull_node_lit(s: &mut TokenStream<'_>) -> PResult<Expr> {
    s.nested(|s| {
        let start = s.current_span();
        let (path, _) = pull_path(s)?;
        let (props, children) = pull_node_body(s)?;
        Ok(finish(
            s,
            start,
            ExprKind::NodeLit {
                path,
                props,
                children,
            },
        ))
    })
}

/// `{ (name: expr | child_node) ,? ... }`
fn pull_node_body(s: &mut TokenStream<'_>) -> PResult<(Vec<Prop>, Vec<Expr>)> {
    s.expect(TokenKind::LBrace)?;
    let mut props = Vec::new();
    let mut children = Vec::new();
    while !s.check(TokenKind::RBrace) && !s.at_end() {
        if s.check(TokenKind::Ident) && s.peek_nth(1).kind == TokenKind::Colon {
            let (name, start) = expect_ident(s)?;
            s.advance();
            let value = pull_expr(s)?;
            props.push(Prop {
                id: s.next_id(),
                span: s.span_from(start),
                name,
                value,
            });
        } else {
            children.push(pull_node_lit(s)?);
        }
        s.eat(TokenKind::Comma);
    }
    s.expect(TokenKind::RBrace)?;
    Ok((props, children))
}
