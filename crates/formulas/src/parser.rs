//! Formula parser module
//!
//! A hand-written lexer and recursive-descent parser. Besides the expression
//! tree, parsing records the byte span of every reference so callers can
//! rewrite references without touching the rest of the formula text.

use std::ops::Range;

use gridcalc_primitives::{
    column_letters_to_index, CellError, CellRef, ColRef, ErrorValue, RefTarget, Reference, RowRef,
    Value, MAX_ROW_COUNT,
};

use crate::{BinaryOperator, FormulaError, FormulaExpr, UnaryOperator};

/// A reference together with its byte range in the original formula text.
#[derive(Debug, Clone, PartialEq)]
pub struct RefSpan {
    pub span: Range<usize>,
    pub reference: Reference,
}

/// Parse result: the tree plus every reference in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFormula {
    pub expr: FormulaExpr,
    pub references: Vec<RefSpan>,
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    String(String),
    Identifier(String),
    SheetName(String),
    Error(ErrorValue),
    CellRef(CellRef),
    ColumnRange(ColRef, ColRef),
    RowRange(RowRef, RowRef),
    LParen,
    RParen,
    Comma,
    Semicolon,
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Ampersand,
    Percent,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Colon,
    Bang,
    Eof,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    start: usize,
    end: usize,
}

struct Lexer<'a> {
    input: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().collect(),
            pos: 0,
        }
    }

    fn next_token(&mut self) -> Result<Token, FormulaError> {
        self.skip_whitespace();
        let start = self.pos;
        let Some(ch) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                start: self.byte_pos(start),
                end: self.byte_pos(start),
            });
        };

        let kind = match ch {
            '(' => self.simple(TokenKind::LParen),
            ')' => self.simple(TokenKind::RParen),
            ',' => self.simple(TokenKind::Comma),
            ';' => self.simple(TokenKind::Semicolon),
            '+' => self.simple(TokenKind::Plus),
            '-' => self.simple(TokenKind::Minus),
            '*' => self.simple(TokenKind::Star),
            '/' => self.simple(TokenKind::Slash),
            '^' => self.simple(TokenKind::Caret),
            '&' => self.simple(TokenKind::Ampersand),
            '%' => self.simple(TokenKind::Percent),
            ':' => self.simple(TokenKind::Colon),
            '!' => self.simple(TokenKind::Bang),
            '=' => self.simple(TokenKind::Equal),
            '<' => {
                self.advance();
                if self.consume('=') {
                    TokenKind::LessEqual
                } else if self.consume('>') {
                    TokenKind::NotEqual
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                self.advance();
                if self.consume('=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                }
            }
            '"' => self.string_token()?,
            '\'' => self.sheet_name_token()?,
            '#' => self.error_token()?,
            '$' | '0'..='9' => match self.row_range_token() {
                Some(kind) => kind,
                None if ch == '$' => self.identifier_or_cell_token(),
                None => self.number_token()?,
            },
            '.' => self.number_token()?,
            'A'..='Z' | 'a'..='z' | '_' => self.identifier_or_cell_token(),
            c if c.is_alphabetic() => self.identifier_or_cell_token(),
            _ => {
                return Err(FormulaError::ParseError(format!(
                    "Unexpected character '{}' at {}",
                    ch, start
                )))
            }
        };

        Ok(Token {
            kind,
            start: self.byte_pos(start),
            end: self.byte_pos(self.pos),
        })
    }

    fn simple(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    fn quoted(&mut self, quote: char) -> Option<String> {
        self.advance();
        let mut result = String::new();
        while let Some(ch) = self.peek() {
            self.advance();
            if ch == quote {
                // A doubled quote is an escaped quote.
                if self.consume(quote) {
                    result.push(quote);
                    continue;
                }
                return Some(result);
            }
            result.push(ch);
        }
        None
    }

    fn string_token(&mut self) -> Result<TokenKind, FormulaError> {
        self.quoted('"')
            .map(TokenKind::String)
            .ok_or_else(|| FormulaError::ParseError("Unterminated string literal".to_string()))
    }

    fn sheet_name_token(&mut self) -> Result<TokenKind, FormulaError> {
        self.quoted('\'')
            .map(TokenKind::SheetName)
            .ok_or_else(|| FormulaError::ParseError("Unterminated sheet name".to_string()))
    }

    fn error_token(&mut self) -> Result<TokenKind, FormulaError> {
        let rest = &self.input[self.byte_pos(self.pos)..];
        const LABELS: [ErrorValue; 7] = [
            ErrorValue::Div0,
            ErrorValue::Name,
            ErrorValue::Value,
            ErrorValue::Ref,
            ErrorValue::Num,
            ErrorValue::NA,
            ErrorValue::Error,
        ];
        for kind in LABELS {
            let label = kind.label();
            if rest.len() >= label.len()
                && rest.is_char_boundary(label.len())
                && rest[..label.len()].eq_ignore_ascii_case(label)
            {
                self.pos += label.chars().count();
                return Ok(TokenKind::Error(kind));
            }
        }
        let literal: String = rest
            .chars()
            .take_while(|c| !is_delimiter(*c))
            .collect();
        Err(FormulaError::ParseError(format!(
            "Unknown error literal '{}'",
            literal
        )))
    }

    fn number_token(&mut self) -> Result<TokenKind, FormulaError> {
        let start = self.pos;
        let mut seen_dot = false;
        let mut seen_exp = false;

        while let Some(ch) = self.peek() {
            match ch {
                '0'..='9' => self.advance(),
                '.' if !seen_dot && !seen_exp => {
                    seen_dot = true;
                    self.advance();
                }
                'e' | 'E' if !seen_exp => {
                    seen_exp = true;
                    self.advance();
                    let _ = self.consume('+') || self.consume('-');
                }
                _ => break,
            }
        }

        let text = self.slice(start, self.pos);
        let value: f64 = text
            .parse()
            .map_err(|_| FormulaError::ParseError(format!("Invalid number literal '{}'", text)))?;
        Ok(TokenKind::Number(value))
    }

    /// `1:1`, `$2:$5`. Restores the position when the text is not a row range.
    fn row_range_token(&mut self) -> Option<TokenKind> {
        let start = self.pos;
        let result = (|| {
            let first = self.row_bound()?;
            if !self.consume(':') {
                return None;
            }
            let second = self.row_bound()?;
            let boundary = match self.peek() {
                None => true,
                Some(ch) => !(ch.is_alphanumeric() || matches!(ch, '.' | '_' | '$' | '(')),
            };
            boundary.then_some(TokenKind::RowRange(first, second))
        })();
        if result.is_none() {
            self.pos = start;
        }
        result
    }

    fn row_bound(&mut self) -> Option<RowRef> {
        let abs = self.consume('$');
        let digits = self.take_while(|c| c.is_ascii_digit());
        let row: u32 = digits.parse().ok()?;
        (1..=MAX_ROW_COUNT)
            .contains(&row)
            .then_some(RowRef { row, abs })
    }

    /// `A:A`, `$B:D`. Restores the position when the text is not a column range.
    fn column_range_token(&mut self) -> Option<TokenKind> {
        let start = self.pos;
        let result = (|| {
            let first = self.column_bound()?;
            if !self.consume(':') {
                return None;
            }
            let second = self.column_bound()?;
            let boundary = match self.peek() {
                None => true,
                Some(ch) => !(ch.is_alphanumeric() || matches!(ch, '.' | '_' | '$' | '(')),
            };
            boundary.then_some(TokenKind::ColumnRange(first, second))
        })();
        if result.is_none() {
            self.pos = start;
        }
        result
    }

    fn column_bound(&mut self) -> Option<ColRef> {
        let abs = self.consume('$');
        let letters = self.take_while(|c| c.is_ascii_alphabetic());
        let col = column_letters_to_index(&letters).ok()?;
        Some(ColRef { col, abs })
    }

    fn identifier_or_cell_token(&mut self) -> TokenKind {
        if let Some(kind) = self.column_range_token() {
            return kind;
        }
        let start = self.pos;
        if let Some(cell) = self.cell_ref() {
            return TokenKind::CellRef(cell);
        }
        self.pos = start;

        let ident = self.take_while(|c| c.is_alphanumeric() || c == '_' || c == '.');
        if ident.is_empty() {
            // A lone `$` that did not start a reference.
            self.advance();
            return TokenKind::Identifier("$".to_string());
        }
        TokenKind::Identifier(ident)
    }

    fn cell_ref(&mut self) -> Option<CellRef> {
        let col_abs = self.consume('$');
        let letters = self.take_while(|c| c.is_ascii_alphabetic());
        if letters.is_empty() {
            return None;
        }
        let row_abs = self.consume('$');
        let digits = self.take_while(|c| c.is_ascii_digit());
        if digits.is_empty() {
            return None;
        }
        // `LOG10(` is a function name and `Sheet1!` a sheet qualifier.
        match self.peek() {
            Some('(' | '!' | '.' | '_') => return None,
            Some(ch) if ch.is_alphanumeric() => return None,
            _ => {}
        }
        let col = column_letters_to_index(&letters).ok()?;
        let row: u32 = digits.parse().ok()?;
        if !(1..=MAX_ROW_COUNT).contains(&row) {
            return None;
        }
        Some(CellRef {
            row,
            col,
            row_abs,
            col_abs,
        })
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(ch) = self.peek() {
            if !pred(ch) {
                break;
            }
            out.push(ch);
            self.advance();
        }
        out
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(ch) if ch.is_whitespace()) {
            self.advance();
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, ch)| *ch)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn consume(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn byte_pos(&self, idx: usize) -> usize {
        self.chars
            .get(idx)
            .map(|(i, _)| *i)
            .unwrap_or(self.input.len())
    }

    fn slice(&self, start: usize, end: usize) -> &str {
        &self.input[self.byte_pos(start)..self.byte_pos(end)]
    }
}

fn is_delimiter(ch: char) -> bool {
    ch.is_whitespace()
        || matches!(
            ch,
            '(' | ')'
                | ','
                | ';'
                | '+'
                | '-'
                | '*'
                | '/'
                | '^'
                | '&'
                | '%'
                | ':'
                | '!'
                | '='
                | '<'
                | '>'
        )
}

struct Parser {
    tokens: Vec<Token>,
    idx: usize,
    offset: usize,
    references: Vec<RefSpan>,
}

impl Parser {
    fn new(tokens: Vec<Token>, offset: usize) -> Self {
        Self {
            tokens,
            idx: 0,
            offset,
            references: Vec::new(),
        }
    }

    fn parse_expression(&mut self) -> Result<FormulaExpr, FormulaError> {
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<FormulaExpr, FormulaError> {
        let mut expr = self.parse_concat()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Equal => BinaryOperator::Equal,
                TokenKind::NotEqual => BinaryOperator::NotEqual,
                TokenKind::Less => BinaryOperator::LessThan,
                TokenKind::LessEqual => BinaryOperator::LessThanOrEqual,
                TokenKind::Greater => BinaryOperator::GreaterThan,
                TokenKind::GreaterEqual => BinaryOperator::GreaterThanOrEqual,
                _ => break,
            };
            self.advance();
            let right = self.parse_concat()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_concat(&mut self) -> Result<FormulaExpr, FormulaError> {
        let mut expr = self.parse_add_sub()?;
        while matches!(self.peek_kind(), TokenKind::Ampersand) {
            self.advance();
            let right = self.parse_add_sub()?;
            expr = binary(BinaryOperator::Concat, expr, right);
        }
        Ok(expr)
    }

    fn parse_add_sub(&mut self) -> Result<FormulaExpr, FormulaError> {
        let mut expr = self.parse_mul_div()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOperator::Add,
                TokenKind::Minus => BinaryOperator::Subtract,
                _ => break,
            };
            self.advance();
            let right = self.parse_mul_div()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_mul_div(&mut self) -> Result<FormulaExpr, FormulaError> {
        let mut expr = self.parse_power()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOperator::Multiply,
                TokenKind::Slash => BinaryOperator::Divide,
                _ => break,
            };
            self.advance();
            let right = self.parse_power()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    // Power is left-associative and binds looser than a sign: `-2^2` is 4.
    fn parse_power(&mut self) -> Result<FormulaExpr, FormulaError> {
        let mut expr = self.parse_unary()?;
        while matches!(self.peek_kind(), TokenKind::Caret) {
            self.advance();
            let right = self.parse_unary()?;
            expr = binary(BinaryOperator::Power, expr, right);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<FormulaExpr, FormulaError> {
        match self.peek_kind() {
            TokenKind::Plus => {
                self.advance();
                self.parse_unary()
            }
            TokenKind::Minus => {
                self.advance();
                let expr = self.parse_unary()?;
                Ok(FormulaExpr::UnaryOp {
                    op: UnaryOperator::Negate,
                    expr: Box::new(expr),
                })
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<FormulaExpr, FormulaError> {
        let mut expr = self.parse_primary()?;
        while matches!(self.peek_kind(), TokenKind::Percent) {
            self.advance();
            expr = FormulaExpr::UnaryOp {
                op: UnaryOperator::Percent,
                expr: Box::new(expr),
            };
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<FormulaExpr, FormulaError> {
        let token = self.advance().clone();
        match token.kind {
            TokenKind::Number(value) => Ok(FormulaExpr::Literal(Value::Number(value))),
            TokenKind::String(value) => Ok(FormulaExpr::Literal(Value::Text(value))),
            TokenKind::Error(kind) => Ok(FormulaExpr::Literal(Value::Error(CellError::from(kind)))),
            TokenKind::Identifier(name) => self.parse_identifier_or_ref(name, token.start),
            TokenKind::SheetName(name) => self.parse_sheet_ref(name, token.start),
            TokenKind::CellRef(_) | TokenKind::ColumnRange(..) | TokenKind::RowRange(..) => {
                self.parse_reference(token, None, None)
            }
            TokenKind::LParen => {
                let expr = self.parse_expression()?;
                self.expect(&TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::Eof => Err(FormulaError::ParseError(
                "Unexpected end of input".to_string(),
            )),
            other => Err(FormulaError::ParseError(format!(
                "Unexpected token {:?} at {}",
                other,
                token.start + self.offset
            ))),
        }
    }

    fn parse_identifier_or_ref(
        &mut self,
        name: String,
        start: usize,
    ) -> Result<FormulaExpr, FormulaError> {
        if matches!(self.peek_kind(), TokenKind::Bang) {
            return self.parse_sheet_ref(name, start);
        }

        if matches!(self.peek_kind(), TokenKind::LParen) {
            self.advance();
            let args = self.parse_arguments()?;
            return Ok(FormulaExpr::FunctionCall {
                name: name.to_uppercase(),
                args,
            });
        }

        match name.to_uppercase().as_str() {
            "TRUE" => Ok(FormulaExpr::Literal(Value::Bool(true))),
            "FALSE" => Ok(FormulaExpr::Literal(Value::Bool(false))),
            _ => Err(FormulaError::ParseError(format!(
                "Unexpected identifier '{}'",
                name
            ))),
        }
    }

    fn parse_sheet_ref(&mut self, sheet: String, start: usize) -> Result<FormulaExpr, FormulaError> {
        if !matches!(self.peek_kind(), TokenKind::Bang) {
            return Err(FormulaError::ParseError(format!(
                "Sheet name '{}' missing '!'.",
                sheet
            )));
        }
        self.advance();
        let token = self.advance().clone();
        match token.kind {
            TokenKind::CellRef(_) | TokenKind::ColumnRange(..) | TokenKind::RowRange(..) => {
                self.parse_reference(token, Some(sheet), Some(start))
            }
            // `Sheet1!#REF!` is what a deleted qualified reference looks like.
            TokenKind::Error(kind) => Ok(FormulaExpr::Literal(Value::Error(kind.into()))),
            other => Err(FormulaError::ParseError(format!(
                "Expected cell reference after sheet name, got {:?}",
                other
            ))),
        }
    }

    fn parse_reference(
        &mut self,
        first: Token,
        sheet: Option<String>,
        sheet_start: Option<usize>,
    ) -> Result<FormulaExpr, FormulaError> {
        let start = sheet_start.unwrap_or(first.start);
        let mut end = first.end;
        let target = match first.kind {
            TokenKind::CellRef(a) => {
                if matches!(self.peek_kind(), TokenKind::Colon) {
                    self.advance();
                    let next = self.advance().clone();
                    let TokenKind::CellRef(b) = next.kind else {
                        return Err(FormulaError::ParseError(
                            "Expected cell reference after ':'".to_string(),
                        ));
                    };
                    end = next.end;
                    RefTarget::Range(a, b)
                } else {
                    RefTarget::Cell(a)
                }
            }
            TokenKind::ColumnRange(a, b) => RefTarget::Columns(a, b),
            TokenKind::RowRange(a, b) => RefTarget::Rows(a, b),
            _ => {
                return Err(FormulaError::ParseError(
                    "Expected a reference".to_string(),
                ))
            }
        };
        let reference = Reference { sheet, target };
        self.references.push(RefSpan {
            span: start + self.offset..end + self.offset,
            reference: reference.clone(),
        });
        Ok(FormulaExpr::Reference(reference))
    }

    fn parse_arguments(&mut self) -> Result<Vec<FormulaExpr>, FormulaError> {
        let mut args = Vec::new();
        if matches!(self.peek_kind(), TokenKind::RParen) {
            self.advance();
            return Ok(args);
        }
        loop {
            let expr = self.parse_expression()?;
            args.push(expr);
            match self.peek_kind() {
                TokenKind::Comma | TokenKind::Semicolon => {
                    self.advance();
                }
                TokenKind::RParen => {
                    self.advance();
                    break;
                }
                _ => {
                    return Err(FormulaError::ParseError(
                        "Expected ',' or ')' in argument list".to_string(),
                    ))
                }
            }
        }
        Ok(args)
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<(), FormulaError> {
        let token = self.advance();
        if std::mem::discriminant(&token.kind) == std::mem::discriminant(kind) {
            Ok(())
        } else {
            Err(FormulaError::ParseError(format!(
                "Expected {:?}, got {:?}",
                kind, token.kind
            )))
        }
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.tokens[self.idx].kind
    }

    fn advance(&mut self) -> &Token {
        let token = &self.tokens[self.idx];
        if !matches!(token.kind, TokenKind::Eof) {
            self.idx += 1;
        }
        token
    }
}

fn binary(op: BinaryOperator, left: FormulaExpr, right: FormulaExpr) -> FormulaExpr {
    FormulaExpr::BinaryOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Parse a formula string into an AST
pub fn parse_formula(formula: &str) -> Result<FormulaExpr, FormulaError> {
    parse_formula_with_refs(formula).map(|parsed| parsed.expr)
}

/// Parse a formula and collect reference spans. Spans index into `formula`
/// as given, including any leading `=`.
pub fn parse_formula_with_refs(formula: &str) -> Result<ParsedFormula, FormulaError> {
    let trimmed = formula.trim_start();
    let body = trimmed.strip_prefix('=').unwrap_or(trimmed);
    let offset = formula.len() - body.len();
    if body.trim().is_empty() {
        return Err(FormulaError::ParseError("Empty formula".to_string()));
    }

    let mut lexer = Lexer::new(body);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let is_eof = matches!(token.kind, TokenKind::Eof);
        tokens.push(token);
        if is_eof {
            break;
        }
    }

    let mut parser = Parser::new(tokens, offset);
    let expr = parser.parse_expression()?;
    if !matches!(parser.peek_kind(), TokenKind::Eof) {
        return Err(FormulaError::ParseError(
            "Unexpected trailing input".to_string(),
        ));
    }
    Ok(ParsedFormula {
        expr,
        references: parser.references,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridcalc_primitives::{Area, CellAddress};

    fn reference(formula: &str) -> Reference {
        match parse_formula(formula).unwrap() {
            FormulaExpr::Reference(r) => r,
            other => panic!("expected reference, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(
            parse_formula("=42").unwrap(),
            FormulaExpr::Literal(Value::Number(42.0))
        );
        assert_eq!(
            parse_formula("=\"say \"\"hi\"\"\"").unwrap(),
            FormulaExpr::Literal(Value::from("say \"hi\""))
        );
        assert_eq!(
            parse_formula("=true").unwrap(),
            FormulaExpr::Literal(Value::Bool(true))
        );
        assert!(matches!(
            parse_formula("=#DIV/0!").unwrap(),
            FormulaExpr::Literal(Value::Error(e)) if e.kind == ErrorValue::Div0
        ));
    }

    #[test]
    fn test_precedence() {
        let expr = parse_formula("=1+2*3").unwrap();
        assert!(matches!(
            expr,
            FormulaExpr::BinaryOp { op: BinaryOperator::Add, ref right, .. }
                if matches!(**right, FormulaExpr::BinaryOp { op: BinaryOperator::Multiply, .. })
        ));

        let expr = parse_formula("=1&2=\"12\"").unwrap();
        assert!(matches!(
            expr,
            FormulaExpr::BinaryOp { op: BinaryOperator::Equal, ref left, .. }
                if matches!(**left, FormulaExpr::BinaryOp { op: BinaryOperator::Concat, .. })
        ));

        let expr = parse_formula("=-2^2").unwrap();
        assert!(matches!(
            expr,
            FormulaExpr::BinaryOp { op: BinaryOperator::Power, ref left, .. }
                if matches!(**left, FormulaExpr::UnaryOp { op: UnaryOperator::Negate, .. })
        ));
    }

    #[test]
    fn test_cell_and_range_refs() {
        let r = reference("=$B$3");
        assert_eq!(r.sheet, None);
        assert!(matches!(
            r.target,
            RefTarget::Cell(CellRef { row: 3, col: 2, row_abs: true, col_abs: true })
        ));

        let r = reference("=C4:a1");
        assert_eq!(r.area(), Area::parse("A1:C4").unwrap());
    }

    #[test]
    fn test_whole_row_and_column_refs() {
        let r = reference("=A:C");
        assert_eq!(r.area(), Area::whole_columns(1, 3));
        let r = reference("=$2:5");
        assert!(matches!(r.target, RefTarget::Rows(RowRef { row: 2, abs: true }, RowRef { row: 5, abs: false })));
    }

    #[test]
    fn test_sheet_qualified_refs() {
        let r = reference("=Data!B2");
        assert_eq!(r.sheet.as_deref(), Some("Data"));
        let r = reference("='My ''Q1'' Sheet'!A1:B2");
        assert_eq!(r.sheet.as_deref(), Some("My 'Q1' Sheet"));
        assert_eq!(r.area(), Area::parse("A1:B2").unwrap());
        let r = reference("=ÜBER!C3");
        assert_eq!(r.sheet.as_deref(), Some("ÜBER"));
        assert_eq!(r.area(), Area::parse("C3").unwrap());
    }

    #[test]
    fn test_function_calls() {
        let expr = parse_formula("=sum(A1:A3; 4, LOG10(100))").unwrap();
        match expr {
            FormulaExpr::FunctionCall { name, args } => {
                assert_eq!(name, "SUM");
                assert_eq!(args.len(), 3);
                assert!(matches!(args[2], FormulaExpr::FunctionCall { ref name, .. } if name == "LOG10"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            parse_formula("=NOW()").unwrap(),
            FormulaExpr::FunctionCall { ref args, .. } if args.is_empty()
        ));
    }

    #[test]
    fn test_reference_spans() {
        let text = "=SUM(B9:E9) + 'Other Sheet'!$A$1 * A:A";
        let parsed = parse_formula_with_refs(text).unwrap();
        let spans: Vec<&str> = parsed
            .references
            .iter()
            .map(|r| &text[r.span.clone()])
            .collect();
        assert_eq!(spans, vec!["B9:E9", "'Other Sheet'!$A$1", "A:A"]);
        assert_eq!(
            parsed.references[0].reference.area().top_left(),
            CellAddress::new(9, 2)
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_formula("=").is_err());
        assert!(parse_formula("=1+").is_err());
        assert!(parse_formula("=(1").is_err());
        assert!(parse_formula("=SUM(1 2)").is_err());
        assert!(parse_formula("=\"open").is_err());
        assert!(parse_formula("=#BOGUS!").is_err());
        assert!(parse_formula("=1 1").is_err());
        assert!(parse_formula("=foo").is_err());
    }

    #[test]
    fn test_number_forms() {
        assert_eq!(
            parse_formula("=1.5e2").unwrap(),
            FormulaExpr::Literal(Value::Number(150.0))
        );
        assert_eq!(
            parse_formula("=.5").unwrap(),
            FormulaExpr::Literal(Value::Number(0.5))
        );
    }

    #[test]
    fn test_ref_error_after_sheet_name() {
        assert!(matches!(
            parse_formula("=Data!#REF!+1").unwrap(),
            FormulaExpr::BinaryOp { ref left, .. }
                if matches!(**left, FormulaExpr::Literal(Value::Error(ref e)) if e.kind == ErrorValue::Ref)
        ));
    }
}
