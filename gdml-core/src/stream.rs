//! Token stream consumed by the recursive-descent parser.

use crate::ast::NodeId;
use crate::diagnostic::DiagnosticLog;
use crate::error::ParseError;
use crate::lexer::{Token, TokenKind};
use crate::span::Span;

/// Saved stream state for rewinding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pos: usize,
    next_id: u32,
    depth: usize,
}

/// Token stream with lookahead, node-id allocation and a nesting guard.
///
/// The stream shares the unit's diagnostic log so that a rewind can also
/// discard every diagnostic logged since the checkpoint (see
/// [`TokenStream::speculate`]).
pub struct TokenStream<'a> {
    tokens: Vec<Token>,
    text: &'a str,
    pos: usize,
    next_id: u32,
    depth: usize,
    max_depth: usize,
    log: &'a mut DiagnosticLog,
}

impl<'a> TokenStream<'a> {
    /// `tokens` must end with an `Eof` token, as produced by [`crate::lexer::lex`].
    pub fn new(tokens: Vec<Token>, text: &'a str, log: &'a mut DiagnosticLog, max_depth: usize) -> Self {
        Self {
            tokens,
            text,
            pos: 0,
            next_id: 0,
            depth: 0,
            max_depth,
            log,
        }
    }

    /// Current token. At the end this is always the `Eof` token.
    pub fn peek(&self) -> &Token {
        self.peek_nth(0)
    }

    pub fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    /// Token `n` positions ahead, clamped to `Eof`.
    pub fn peek_nth(&self, n: usize) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.pos + n).min(last)]
    }

    /// Consume and return the current token. `Eof` is never consumed.
    pub fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    pub fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    /// Consume the current token if it has the given kind.
    pub fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        self.check(kind).then(|| self.advance())
    }

    pub fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        self.eat(kind).ok_or_else(|| self.unexpected(kind.describe()))
    }

    /// Error for the current token, which did not match `expected`.
    pub fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.peek();
        let found = match token.kind {
            TokenKind::Eof => None,
            TokenKind::Ident => Some(format!("identifier `{}`", self.text(token))),
            kind => Some(kind.describe().to_string()),
        };
        ParseError::expected(expected, found.as_deref(), token.span)
    }

    pub fn at_end(&self) -> bool {
        self.check(TokenKind::Eof)
    }

    /// Source text of a token; for string literals, without the quotes.
    pub fn text(&self, token: &Token) -> &'a str {
        self.text
            .get(token.text_start as usize..token.text_end as usize)
            .unwrap_or("")
    }

    pub fn current_span(&self) -> Span {
        self.peek().span
    }

    /// Span of the most recently consumed token.
    pub fn prev_span(&self) -> Span {
        match self.pos.checked_sub(1) {
            Some(prev) => self.tokens[prev].span,
            None => self.current_span(),
        }
    }

    /// Span from `start` to the end of the last consumed token.
    pub fn span_from(&self, start: Span) -> Span {
        start.to(self.prev_span())
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn log(&mut self) -> &mut DiagnosticLog {
        self.log
    }

    pub fn report(&mut self, err: &ParseError) {
        self.log.log(err.to_diagnostic());
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            pos: self.pos,
            next_id: self.next_id,
            depth: self.depth,
        }
    }

    pub fn rewind(&mut self, checkpoint: Checkpoint) {
        self.pos = checkpoint.pos;
        self.next_id = checkpoint.next_id;
        self.depth = checkpoint.depth;
    }

    /// Run `f` as a speculative attempt.
    ///
    /// On success its tokens and diagnostics are kept. On failure the stream
    /// is rewound and every diagnostic logged during the attempt is dropped,
    /// so the caller can try another alternative.
    pub fn speculate<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<Option<T>, ParseError> {
        let start = self.checkpoint();
        let level = self.log.push_log_level();
        let result = f(self);
        let span = self.current_span();
        let internal = |err: crate::error::CheckError| ParseError::invalid(err.to_string(), span);
        match result {
            Ok(value) => {
                self.log.pop_log_level().map_err(internal)?;
                Ok(Some(value))
            }
            Err(_) => {
                self.log.pop_messages(level).map_err(internal)?;
                self.log.pop_log_level().map_err(internal)?;
                self.rewind(start);
                Ok(None)
            }
        }
    }

    /// Run `f` one nesting level deeper, failing once the configured limit
    /// is exceeded. The level is released on every exit path.
    pub fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= self.max_depth {
            return Err(ParseError::too_deep(self.max_depth, self.current_span()));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// Run `f`, which builds a left-nested chain in a loop and calls
    /// [`TokenStream::deepen`] once per link. Every link counts toward the
    /// nesting limit until `f` returns.
    pub fn chained<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        let depth = self.depth;
        let result = f(self);
        self.depth = depth;
        result
    }

    /// Account for one more level of a chain built by [`TokenStream::chained`].
    pub fn deepen(&mut self) -> Result<(), ParseError> {
        if self.depth >= self.max_depth {
            return Err(ParseError::too_deep(self.max_depth, self.current_span()));
        }
        self.depth += 1;
        Ok(())
    }

    /// Skip to the start of the next statement after a syntax error.
    ///
    /// Stops after a `;`, or before a `}` or a declaration keyword.
    pub fn synchronize(&mut self) {
        loop {
            match self.peek_kind() {
                TokenKind::Eof | TokenKind::RBrace => break,
                TokenKind::Semi => {
                    self.advance();
                    break;
                }
                kind if kind.starts_declaration() => break,
                _ => {
                    self.advance();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Diagnostic;
    use crate::lexer::lex;

    fn stream<'a>(src: &'a str, log: &'a mut DiagnosticLog) -> TokenStream<'a> {
        TokenStream::new(lex(src).tokens, src, log, 8)
    }

    #[test]
    fn never_consumes_eof() {
        let mut log = DiagnosticLog::new();
        let mut s = stream("x", &mut log);
        assert_eq!(s.advance().kind, TokenKind::Ident);
        assert_eq!(s.advance().kind, TokenKind::Eof);
        assert_eq!(s.advance().kind, TokenKind::Eof);
        assert!(s.at_end());
        assert_eq!(s.peek_nth(5).kind, TokenKind::Eof);
    }

    #[test]
    fn expect_reports_found_token() {
        let mut log = DiagnosticLog::new();
        let mut s = stream("foo", &mut log);
        let err = s.expect(TokenKind::LBrace).unwrap_err();
        assert_eq!(err.message, "expected `{`, found identifier `foo`");
    }

    #[test]
    fn failed_speculation_rewinds_and_drops_diagnostics() {
        let mut log = DiagnosticLog::new();
        log.log(Diagnostic::info("before"));
        let mut s = stream("a b c", &mut log);
        let id_before = s.checkpoint();
        let result: Option<()> = s
            .speculate(|s| {
                s.advance();
                s.next_id();
                let err = ParseError::invalid("nope", s.current_span());
                s.report(&err);
                s.report(&err);
                Err(err)
            })
            .unwrap();
        assert!(result.is_none());
        assert_eq!(s.checkpoint(), id_before);
        assert_eq!(s.log().len(), 1);
        assert_eq!(s.log().open_checkpoints(), 0);
    }

    #[test]
    fn successful_speculation_keeps_progress() {
        let mut log = DiagnosticLog::new();
        let mut s = stream("a b", &mut log);
        let token = s.speculate(|s| Ok(s.advance())).unwrap();
        assert_eq!(token.map(|t| t.kind), Some(TokenKind::Ident));
        assert_eq!(s.position(), 1);
    }

    #[test]
    fn nesting_is_bounded() {
        fn dive(s: &mut TokenStream<'_>, n: usize) -> Result<usize, ParseError> {
            if n == 0 {
                return Ok(0);
            }
            s.nested(|s| dive(s, n - 1).map(|d| d + 1))
        }
        let mut log = DiagnosticLog::new();
        let mut s = stream("", &mut log);
        assert_eq!(dive(&mut s, 8).unwrap(), 8);
        assert_eq!(
            dive(&mut s, 9).unwrap_err().kind,
            crate::error::ParseErrorKind::TooDeep
        );
        assert_eq!(dive(&mut s, 3).unwrap(), 3);
    }

    #[test]
    fn chain_links_share_the_nesting_limit() {
        let mut log = DiagnosticLog::new();
        let mut s = stream("", &mut log);
        let links = s.chained(|s| {
            for _ in 0..6 {
                s.deepen()?;
            }
            s.nested(|s| s.nested(|_| Ok(6)))
        });
        assert_eq!(links.unwrap(), 6);

        let err = s
            .chained(|s| {
                for _ in 0..6 {
                    s.deepen()?;
                }
                s.nested(|s| s.nested(|s| s.nested(|_| Ok(()))))
            })
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ParseErrorKind::TooDeep);

        // the chain's levels are released afterwards
        assert_eq!(s.chained(|s| (0..8).try_for_each(|_| s.deepen())), Ok(()));
    }

    #[test]
    fn synchronize_stops_at_statement_boundaries() {
        let mut log = DiagnosticLog::new();
        let mut s = stream("1 2 ; let", &mut log);
        s.synchronize();
        assert_eq!(s.peek_kind(), TokenKind::Let);
        let mut log = DiagnosticLog::new();
        let mut s = stream("1 2 } x", &mut log);
        s.synchronize();
        assert_eq!(s.peek_kind(), TokenKind::RBrace);
    }
}
