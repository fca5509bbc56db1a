//! Lexer for GDML sources.

use crate::diagnostic::Diagnostic;
use crate::error::codes;
use crate::span::Span;

/// Kind of a token produced by the lexer.
///
/// The lexer does not attach any semantic meaning beyond recognizing
/// keywords and basic literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Special
    Eof,

    // Identifiers and literals
    Ident,
    IntLiteral,
    FloatLiteral,
    StringLiteral,
    BoolLiteral, // true / false

    // Punctuation
    LParen,      // (
    RParen,      // )
    LBrace,      // {
    RBrace,      // }
    LBracket,    // [
    RBracket,    // ]
    Comma,       // ,
    Semi,        // ;
    Colon,       // :
    DoubleColon, // ::
    Dot,         // .
    Equal,       // =
    Arrow,       // ->
    Amp,         // &
    Question,    // ?

    // Operators
    Plus,      // +
    Minus,     // -
    Star,      // *
    Slash,     // /
    Percent,   // %
    EqEq,      // ==
    NotEq,     // !=
    Less,      // <
    LessEq,    // <=
    Greater,   // >
    GreaterEq, // >=
    AndAnd,    // &&
    OrOr,      // ||
    Bang,      // !

    // Keywords
    Struct,
    Node,
    Enum,
    Alias,
    Namespace,
    Fn,
    Extern,
    Let,
}

impl TokenKind {
    /// Human-readable name used in "expected ..., found ..." messages.
    pub fn describe(self) -> &'static str {
        use TokenKind::*;
        match self {
            Eof => "end of input",
            Ident => "identifier",
            IntLiteral => "integer literal",
            FloatLiteral => "float literal",
            StringLiteral => "string literal",
            BoolLiteral => "boolean literal",
            LParen => "`(`",
            RParen => "`)`",
            LBrace => "`{`",
            RBrace => "`}`",
            LBracket => "`[`",
            RBracket => "`]`",
            Comma => "`,`",
            Semi => "`;`",
            Colon => "`:`",
            DoubleColon => "`::`",
            Dot => "`.`",
            Equal => "`=`",
            Arrow => "`->`",
            Amp => "`&`",
            Question => "`?`",
            Plus => "`+`",
            Minus => "`-`",
            Star => "`*`",
            Slash => "`/`",
            Percent => "`%`",
            EqEq => "`==`",
            NotEq => "`!=`",
            Less => "`<`",
            LessEq => "`<=`",
            Greater => "`>`",
            GreaterEq => "`>=`",
            AndAnd => "`&&`",
            OrOr => "`||`",
            Bang => "`!`",
            Struct => "`struct`",
            Node => "`node`",
            Enum => "`enum`",
            Alias => "`alias`",
            Namespace => "`namespace`",
            Fn => "`fn`",
            Extern => "`extern`",
            Let => "`let`",
        }
    }

    /// Keywords that start a declaration; used to resynchronize after errors.
    pub fn starts_declaration(self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Struct | Node | Enum | Alias | Namespace | Fn | Extern | Let
        )
    }
}

/// A single token with its kind and span.
///
/// `text_start` / `text_end` are byte offsets of the token's text. For string
/// literals they exclude the quotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub text_start: u32,
    pub text_end: u32,
}

/// Result of lexing a source file.
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<Token>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Lex a source string into tokens. The last token is always `Eof`.
pub fn lex(source: &str) -> LexResult {
    let mut lexer = Lexer {
        source,
        chars: source.as_bytes(),
        len: source.len(),
        index: 0,
        diagnostics: Vec::new(),
    };
    lexer.run()
}

struct Lexer<'src> {
    source: &'src str,
    chars: &'src [u8],
    len: usize,
    index: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'src> Lexer<'src> {
    fn run(&mut self) -> LexResult {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek_char() {
            if is_whitespace(ch) {
                self.consume_char();
                continue;
            }
            if ch == b'/' && self.peek_next() == Some(b'/') {
                self.skip_line_comment();
                continue;
            }

            let start = self.index as u32;
            let token = match ch {
                b'(' => self.single(TokenKind::LParen, start),
                b')' => self.single(TokenKind::RParen, start),
                b'{' => self.single(TokenKind::LBrace, start),
                b'}' => self.single(TokenKind::RBrace, start),
                b'[' => self.single(TokenKind::LBracket, start),
                b']' => self.single(TokenKind::RBracket, start),
                b',' => self.single(TokenKind::Comma, start),
                b';' => self.single(TokenKind::Semi, start),
                b'.' => self.single(TokenKind::Dot, start),
                b'?' => self.single(TokenKind::Question, start),
                b'+' => self.single(TokenKind::Plus, start),
                b'*' => self.single(TokenKind::Star, start),
                b'/' => self.single(TokenKind::Slash, start),
                b'%' => self.single(TokenKind::Percent, start),
                b':' => self.one_or_two(b':', TokenKind::Colon, TokenKind::DoubleColon, start),
                b'=' => self.one_or_two(b'=', TokenKind::Equal, TokenKind::EqEq, start),
                b'!' => self.one_or_two(b'=', TokenKind::Bang, TokenKind::NotEq, start),
                b'<' => self.one_or_two(b'=', TokenKind::Less, TokenKind::LessEq, start),
                b'>' => self.one_or_two(b'=', TokenKind::Greater, TokenKind::GreaterEq, start),
                b'&' => self.one_or_two(b'&', TokenKind::Amp, TokenKind::AndAnd, start),
                b'-' => self.one_or_two(b'>', TokenKind::Minus, TokenKind::Arrow, start),
                b'|' => {
                    if self.peek_next() == Some(b'|') {
                        self.consume_char();
                        self.consume_char();
                        self.simple_token(TokenKind::OrOr, start)
                    } else {
                        self.consume_char();
                        self.unexpected_char(start)
                    }
                }
                b'"' => self.lex_string(start),
                b'0'..=b'9' => self.lex_number(start),
                _ => {
                    if is_ident_start(ch) {
                        self.lex_ident_or_keyword(start)
                    } else {
                        self.consume_char();
                        self.unexpected_char(start)
                    }
                }
            };

            if let Some(tok) = token {
                tokens.push(tok);
            }
        }

        // EOF token at end
        let eof_span = Span::new(self.len as u32, self.len as u32);
        tokens.push(Token {
            kind: TokenKind::Eof,
            span: eof_span,
            text_start: self.len as u32,
            text_end: self.len as u32,
        });

        LexResult {
            tokens,
            diagnostics: std::mem::take(&mut self.diagnostics),
        }
    }

    fn single(&mut self, kind: TokenKind, start: u32) -> Option<Token> {
        self.consume_char();
        self.simple_token(kind, start)
    }

    /// `short` if the next byte is not `second`, otherwise the two-byte `long`.
    fn one_or_two(&mut self, second: u8, short: TokenKind, long: TokenKind, start: u32) -> Option<Token> {
        self.consume_char();
        if self.peek_char() == Some(second) {
            self.consume_char();
            self.simple_token(long, start)
        } else {
            self.simple_token(short, start)
        }
    }

    fn simple_token(&self, kind: TokenKind, start: u32) -> Option<Token> {
        let end = self.index as u32;
        Some(Token {
            kind,
            span: Span::new(start, end),
            text_start: start,
            text_end: end,
        })
    }

    fn unexpected_char(&mut self, start: u32) -> Option<Token> {
        let end = self.index as u32;
        let span = Span::new(start, end);
        let text = &self.source[start as usize..end as usize];
        let diag = Diagnostic::error(format!("unexpected character `{text}`"), span)
            .with_code(codes::UNEXPECTED_CHAR);
        self.diagnostics.push(diag);
        None
    }

    fn skip_line_comment(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch == b'\n' {
                break;
            }
            self.consume_char();
        }
    }

    fn lex_string(&mut self, start: u32) -> Option<Token> {
        // Consume the opening quote
        self.consume_char();

        let content_start = self.index;
        while let Some(ch) = self.peek_char() {
            match ch {
                b'"' => {
                    let content_end = self.index;
                    self.consume_char(); // closing quote
                    let span = Span::new(start, self.index as u32);
                    return Some(Token {
                        kind: TokenKind::StringLiteral,
                        span,
                        text_start: content_start as u32,
                        text_end: content_end as u32,
                    });
                }
                b'\\' => {
                    // Skip over escape sequence: backslash + next char (if any)
                    self.consume_char();
                    if self.peek_char().is_some() {
                        self.consume_char();
                    }
                }
                b'\n' => break,
                _ => {
                    self.consume_char();
                }
            }
        }

        // Unterminated string
        let span = Span::new(start, self.index as u32);
        let diag = Diagnostic::error("unterminated string literal", span)
            .with_code(codes::UNTERMINATED_STRING);
        self.diagnostics.push(diag);
        None
    }

    fn lex_number(&mut self, start: u32) -> Option<Token> {
        // integer or float: digits [ '.' digits ]?
        self.consume_digits();

        let mut is_float = false;
        if self.peek_char() == Some(b'.') {
            // Only a float if the '.' is followed by a digit; `1.foo` is member access.
            if let Some(next) = self.peek_next() {
                if next.is_ascii_digit() {
                    is_float = true;
                    self.consume_char(); // '.'
                    self.consume_digits();
                }
            }
        }

        let kind = if is_float {
            TokenKind::FloatLiteral
        } else {
            TokenKind::IntLiteral
        };
        self.simple_token(kind, start)
    }

    fn consume_digits(&mut self) {
        while let Some(ch) = self.peek_char() {
            if matches!(ch, b'0'..=b'9' | b'_') {
                self.consume_char();
            } else {
                break;
            }
        }
    }

    fn lex_ident_or_keyword(&mut self, start: u32) -> Option<Token> {
        while let Some(ch) = self.peek_char() {
            if is_ident_continue(ch) {
                self.consume_char();
            } else {
                break;
            }
        }

        let end = self.index as u32;
        let text = &self.source[start as usize..end as usize];

        let kind = match text {
            "struct" => TokenKind::Struct,
            "node" => TokenKind::Node,
            "enum" => TokenKind::Enum,
            "alias" => TokenKind::Alias,
            "namespace" => TokenKind::Namespace,
            "fn" => TokenKind::Fn,
            "extern" => TokenKind::Extern,
            "let" => TokenKind::Let,
            "true" | "false" => TokenKind::BoolLiteral,
            _ => TokenKind::Ident,
        };

        self.simple_token(kind, start)
    }

    fn peek_char(&self) -> Option<u8> {
        self.chars.get(self.index).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.chars.get(self.index + 1).copied()
    }

    fn consume_char(&mut self) {
        if self.index < self.len {
            self.index += 1;
        }
    }
}

/// Resolve the escape sequences of a string literal's raw contents.
pub fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn is_whitespace(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\n' | b'\r')
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex(src).tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_declaration() {
        use TokenKind::*;
        assert_eq!(
            kinds("node Button { text?: string = \"ok\" }"),
            vec![Node, Ident, LBrace, Ident, Question, Colon, Ident, Equal, StringLiteral, RBrace, Eof]
        );
    }

    #[test]
    fn lexes_compound_operators() {
        use TokenKind::*;
        assert_eq!(
            kinds("a::b -> == != <= >= && || & ! = < >"),
            vec![
                Ident, DoubleColon, Ident, Arrow, EqEq, NotEq, LessEq, GreaterEq, AndAnd, OrOr, Amp,
                Bang, Equal, Less, Greater, Eof
            ]
        );
    }

    #[test]
    fn distinguishes_floats_from_member_access() {
        use TokenKind::*;
        assert_eq!(kinds("1.5"), vec![FloatLiteral, Eof]);
        assert_eq!(kinds("1.x"), vec![IntLiteral, Dot, Ident, Eof]);
    }

    #[test]
    fn skips_comments() {
        use TokenKind::*;
        assert_eq!(kinds("let // comment\nx"), vec![Let, Ident, Eof]);
    }

    #[test]
    fn string_token_excludes_quotes() {
        let src = "\"hi\\n\"";
        let result = lex(src);
        let tok = &result.tokens[0];
        let raw = &src[tok.text_start as usize..tok.text_end as usize];
        assert_eq!(raw, "hi\\n");
        assert_eq!(unescape(raw), "hi\n");
    }

    #[test]
    fn reports_unexpected_characters() {
        let result = lex("let $ = 1");
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].code, Some(codes::UNEXPECTED_CHAR));
        assert_eq!(result.tokens.len(), 4);
    }

    #[test]
    fn reports_unterminated_strings() {
        let result = lex("\"open");
        assert_eq!(result.diagnostics[0].code, Some(codes::UNTERMINATED_STRING));
    }
}
