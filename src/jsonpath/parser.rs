use regex::{Regex, RegexBuilder};
use serde_json::Value as Json;

use crate::{
    ast::{yields_to, BinaryOperator, Slice, Token, UnaryOperator},
    error::{ErrorKind, ParseError},
    functions::FunctionRegistry,
    jsonpath::{
        filter::FilterExpr,
        selector::{Selector, SelectorKind},
    },
    lexer::Lexer,
    parser::MAX_NESTING,
};

fn is_name_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}

fn is_name_part(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// Compiles JSONPath text into a [`Selector`] chain.
///
/// Paths are read by recursive descent; filter expressions are compiled with an
/// explicit operand and operator stack. Nested paths, calls and parentheses count
/// towards [`MAX_NESTING`].
pub struct PathParser<'r> {
    lexer: Lexer,
    registry: &'r FunctionRegistry,
    next_root_id: usize,
    depth: usize,
}

impl<'r> PathParser<'r> {
    pub fn new(input: &str, registry: &'r FunctionRegistry) -> Self {
        PathParser {
            lexer: Lexer::new(input),
            registry,
            next_root_id: 0,
            depth: 0,
        }
    }

    pub fn parse(mut self) -> Result<Selector, ParseError> {
        self.lexer.skip_whitespace();
        match self.lexer.current_char() {
            Some('$') => {}
            Some(_) => return Err(self.error(ErrorKind::SyntaxError)),
            None => return Err(self.error(ErrorKind::UnexpectedEndOfInput)),
        }
        let selector = self.path()?;
        self.lexer.skip_whitespace();
        if !self.lexer.is_at_end() {
            return Err(self.error(ErrorKind::SyntaxError));
        }
        Ok(selector)
    }

    fn error(&self, kind: ErrorKind) -> ParseError {
        ParseError::new(kind, self.lexer.location())
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error(ErrorKind::NestingTooDeep));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// A `$` or `@` path; the current character is the sigil.
    fn path(&mut self) -> Result<Selector, ParseError> {
        let head = match self.lexer.current_char() {
            Some('$') => {
                let id = self.next_root_id;
                self.next_root_id += 1;
                SelectorKind::Root { id }
            }
            Some('@') => SelectorKind::CurrentNode,
            _ => return Err(self.error(ErrorKind::SyntaxError)),
        };
        self.lexer.advance();

        let mut kinds = vec![head];
        let outer = self.depth;
        loop {
            // Every step is one more level of recursion when selecting.
            self.depth = outer + kinds.len();
            if self.depth > MAX_NESTING {
                return Err(self.error(ErrorKind::NestingTooDeep));
            }
            match self.lexer.current_char() {
                Some('.') => {
                    self.lexer.advance();
                    if self.lexer.current_char() == Some('.') {
                        self.lexer.advance();
                        kinds.push(SelectorKind::RecursiveDescent);
                        if self.lexer.current_char() == Some('[') {
                            continue;
                        }
                    }
                    kinds.push(self.member()?);
                }
                Some('[') => {
                    self.lexer.advance();
                    kinds.push(self.bracket()?);
                }
                Some('^') => {
                    let mut depth = 0;
                    while self.lexer.current_char() == Some('^') {
                        self.lexer.advance();
                        depth += 1;
                    }
                    kinds.push(SelectorKind::Parent(depth));
                }
                _ => break,
            }
        }
        self.depth = outer;

        Selector::chain(kinds).ok_or_else(|| self.error(ErrorKind::SyntaxError))
    }

    /// The name or `*` after a dot.
    fn member(&mut self) -> Result<SelectorKind, ParseError> {
        match self.lexer.current_char() {
            Some('*') => {
                self.lexer.advance();
                Ok(SelectorKind::Wildcard)
            }
            Some(ch) if is_name_start(ch) => Ok(SelectorKind::Identifier(self.lexer.read_while(is_name_part))),
            Some(_) => Err(self.error(ErrorKind::ExpectedIdentifier)),
            None => Err(self.error(ErrorKind::UnexpectedEndOfInput)),
        }
    }

    /// The elements of `[...]`; the opening bracket is consumed.
    fn bracket(&mut self) -> Result<SelectorKind, ParseError> {
        let mut elements = Vec::new();
        loop {
            self.lexer.skip_whitespace();
            let kind = match self.lexer.current_char() {
                Some('*') => {
                    self.lexer.advance();
                    SelectorKind::Wildcard
                }
                Some(quote @ ('\'' | '"')) => SelectorKind::Identifier(self.quoted(quote)?),
                Some('?') => {
                    self.lexer.advance();
                    SelectorKind::Filter(self.filter_expression()?)
                }
                Some('-' | ':' | '0'..='9') => self.index_or_slice()?,
                Some(_) => return Err(self.error(ErrorKind::SyntaxError)),
                None => return Err(self.error(ErrorKind::UnexpectedEndOfInput)),
            };
            elements.push(Selector { kind, tail: None });

            self.lexer.skip_whitespace();
            match self.lexer.current_char() {
                Some(',') => self.lexer.advance(),
                Some(']') => {
                    self.lexer.advance();
                    break;
                }
                Some(_) => return Err(self.error(ErrorKind::ExpectedRightBracket)),
                None => return Err(self.error(ErrorKind::UnexpectedEndOfInput)),
            }
        }

        if elements.len() == 1
            && let Some(only) = elements.pop()
        {
            return Ok(only.kind);
        }
        Ok(SelectorKind::Union(elements))
    }

    fn integer(&mut self) -> Result<i64, ParseError> {
        let mut text = String::new();
        if self.lexer.current_char() == Some('-') {
            text.push('-');
            self.lexer.advance();
        }
        let digits = self.lexer.read_while(|ch| ch.is_ascii_digit());
        if digits.is_empty() {
            return Err(self.error(ErrorKind::InvalidNumber));
        }
        text.push_str(&digits);
        text.parse().map_err(|_| self.error(ErrorKind::InvalidNumber))
    }

    fn optional_integer(&mut self) -> Result<Option<i64>, ParseError> {
        self.lexer.skip_whitespace();
        match self.lexer.current_char() {
            Some('-' | '0'..='9') => self.integer().map(Some),
            _ => Ok(None),
        }
    }

    fn index_or_slice(&mut self) -> Result<SelectorKind, ParseError> {
        let start = self.optional_integer()?;
        self.lexer.skip_whitespace();
        if self.lexer.current_char() != Some(':') {
            return match start {
                Some(index) => Ok(SelectorKind::Index(index)),
                None => Err(self.error(ErrorKind::SyntaxError)),
            };
        }
        self.lexer.advance();
        let stop = self.optional_integer()?;
        self.lexer.skip_whitespace();
        let mut step = 1;
        if self.lexer.current_char() == Some(':') {
            self.lexer.advance();
            if let Some(explicit) = self.optional_integer()? {
                if explicit == 0 {
                    return Err(self.error(ErrorKind::StepCannotBeZero));
                }
                step = explicit;
            }
        }
        Ok(SelectorKind::Slice(Slice { start, stop, step }))
    }

    /// A single- or double-quoted name with JSON-style escapes.
    fn quoted(&mut self, quote: char) -> Result<String, ParseError> {
        self.lexer.advance();
        let mut text = String::new();
        loop {
            match self.lexer.current_char() {
                Some(ch) if ch == quote => {
                    self.lexer.advance();
                    return Ok(text);
                }
                Some('\\') => {
                    self.lexer.advance();
                    let unescaped = match self.lexer.current_char() {
                        Some(ch @ ('\'' | '"' | '\\' | '/')) => ch,
                        Some('b') => '\u{8}',
                        Some('f') => '\u{c}',
                        Some('n') => '\n',
                        Some('r') => '\r',
                        Some('t') => '\t',
                        Some('u') => {
                            self.lexer.advance();
                            text.push(self.unicode_escape()?);
                            continue;
                        }
                        Some(_) => return Err(self.error(ErrorKind::IllegalEscapeCharacter)),
                        None => return Err(self.error(ErrorKind::UnexpectedEndOfInput)),
                    };
                    text.push(unescaped);
                    self.lexer.advance();
                }
                Some(ch) => {
                    text.push(ch);
                    self.lexer.advance();
                }
                None => return Err(self.error(ErrorKind::UnexpectedEndOfInput)),
            }
        }
    }

    fn hex4(&mut self) -> Result<u32, ParseError> {
        let mut code = 0;
        for _ in 0..4 {
            let digit = self
                .lexer
                .current_char()
                .and_then(|ch| ch.to_digit(16))
                .ok_or_else(|| self.error(ErrorKind::InvalidCodepoint))?;
            code = code * 16 + digit;
            self.lexer.advance();
        }
        Ok(code)
    }

    /// `XXXX` after `\u`, combining a surrogate pair into one character.
    fn unicode_escape(&mut self) -> Result<char, ParseError> {
        let high = self.hex4()?;
        let code = match high {
            0xD800..=0xDBFF => {
                if self.lexer.current_char() != Some('\\') || self.lexer.peek_char(1) != Some('u') {
                    return Err(self.error(ErrorKind::InvalidCodepoint));
                }
                self.lexer.advance();
                self.lexer.advance();
                let low = self.hex4()?;
                if !(0xDC00..=0xDFFF).contains(&low) {
                    return Err(self.error(ErrorKind::InvalidCodepoint));
                }
                0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00)
            }
            0xDC00..=0xDFFF => return Err(self.error(ErrorKind::InvalidCodepoint)),
            code => code,
        };
        char::from_u32(code).ok_or_else(|| self.error(ErrorKind::InvalidCodepoint))
    }

    /// Reads a filter expression up to an unbalanced `)`, `]` or `,`.
    fn filter_expression(&mut self) -> Result<FilterExpr, ParseError> {
        self.enter()?;
        let mut operands: Vec<(FilterExpr, usize)> = Vec::new();
        let mut operators: Vec<Token> = Vec::new();
        let mut open_parens = 0usize;

        'operand: loop {
            self.lexer.skip_whitespace();
            match self.lexer.current_char() {
                Some('!') => {
                    self.lexer.advance();
                    operators.push(Token::Unary(UnaryOperator::Not));
                    continue;
                }
                Some('(') => {
                    self.lexer.advance();
                    self.enter()?;
                    open_parens += 1;
                    operators.push(Token::LeftParen);
                    continue;
                }
                Some('-') if !self.lexer.peek_char(1).is_some_and(|ch| ch.is_ascii_digit()) => {
                    self.lexer.advance();
                    operators.push(Token::Unary(UnaryOperator::Minus));
                    continue;
                }
                _ => {
                    let operand = self.filter_operand()?;
                    operands.push((operand, 1));
                }
            }

            loop {
                self.lexer.skip_whitespace();
                match self.lexer.current_char() {
                    Some(')') if open_parens > 0 => {
                        self.lexer.advance();
                        while operators.last().is_some_and(Token::is_operator) {
                            self.reduce(&mut operands, &mut operators)?;
                        }
                        operators.pop();
                        open_parens -= 1;
                        self.leave();
                    }
                    Some('=') if self.lexer.peek_char(1) == Some('~') => {
                        self.lexer.advance();
                        self.lexer.advance();
                        let regex = self.regex()?;
                        let (operand, height) = operands.pop().ok_or_else(|| self.error(ErrorKind::SyntaxError))?;
                        let operand = FilterExpr::Unary {
                            op: UnaryOperator::Matches(regex),
                            operand: Box::new(operand),
                        };
                        operands.push((operand, self.checked_height(height + 1)?));
                    }
                    None | Some(')' | ']' | ',') => break 'operand,
                    Some(_) => {
                        let op = self.binary_operator()?;
                        while operators.last().is_some_and(|pending| {
                            pending.is_operator()
                                && yields_to(pending.precedence(), op.precedence(), op.is_right_associative())
                        }) {
                            self.reduce(&mut operands, &mut operators)?;
                        }
                        operators.push(Token::Binary(op));
                        continue 'operand;
                    }
                }
            }
        }

        if open_parens > 0 {
            return Err(match self.lexer.current_char() {
                None => self.error(ErrorKind::UnexpectedEndOfInput),
                Some(_) => self.error(ErrorKind::ExpectedRightParen),
            });
        }
        while !operators.is_empty() {
            self.reduce(&mut operands, &mut operators)?;
        }
        let (expression, _) = operands.pop().ok_or_else(|| self.error(ErrorKind::SyntaxError))?;
        if !operands.is_empty() {
            return Err(self.error(ErrorKind::SyntaxError));
        }
        self.leave();
        Ok(expression)
    }

    /// Rejects filter trees that would nest deeper than [`MAX_NESTING`] levels in total.
    fn checked_height(&self, height: usize) -> Result<usize, ParseError> {
        if self.depth + height > MAX_NESTING {
            return Err(self.error(ErrorKind::NestingTooDeep));
        }
        Ok(height)
    }

    fn reduce(&self, operands: &mut Vec<(FilterExpr, usize)>, operators: &mut Vec<Token>) -> Result<(), ParseError> {
        let mut pop = || operands.pop().ok_or_else(|| self.error(ErrorKind::SyntaxError));
        let (reduced, height) = match operators.pop() {
            Some(Token::Binary(op)) => {
                let (rhs, rhs_height) = pop()?;
                let (lhs, lhs_height) = pop()?;
                let reduced = FilterExpr::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                };
                (reduced, lhs_height.max(rhs_height))
            }
            Some(Token::Unary(op)) => {
                let (operand, height) = pop()?;
                let reduced = FilterExpr::Unary {
                    op,
                    operand: Box::new(operand),
                };
                (reduced, height)
            }
            _ => return Err(self.error(ErrorKind::SyntaxError)),
        };
        operands.push((reduced, self.checked_height(height + 1)?));
        Ok(())
    }

    fn binary_operator(&mut self) -> Result<BinaryOperator, ParseError> {
        let Some(first) = self.lexer.current_char() else {
            return Err(self.error(ErrorKind::UnexpectedEndOfInput));
        };
        let second = self.lexer.peek_char(1);
        let (op, width) = match (first, second) {
            ('=', Some('=')) => (BinaryOperator::Equal, 2),
            ('!', Some('=')) => (BinaryOperator::NotEqual, 2),
            ('<', Some('=')) => (BinaryOperator::LessEqual, 2),
            ('>', Some('=')) => (BinaryOperator::GreaterEqual, 2),
            ('&', Some('&')) => (BinaryOperator::And, 2),
            ('|', Some('|')) => (BinaryOperator::Or, 2),
            ('/', Some('/')) => (BinaryOperator::IntegerDivide, 2),
            ('<', _) => (BinaryOperator::LessThan, 1),
            ('>', _) => (BinaryOperator::GreaterThan, 1),
            ('+', _) => (BinaryOperator::Add, 1),
            ('-', _) => (BinaryOperator::Subtract, 1),
            ('*', _) => (BinaryOperator::Multiply, 1),
            ('/', _) => (BinaryOperator::Divide, 1),
            ('%', _) => (BinaryOperator::Modulo, 1),
            ('=' | '!', _) => return Err(self.error(ErrorKind::ExpectedComparator)),
            _ => return Err(self.error(ErrorKind::SyntaxError)),
        };
        for _ in 0..width {
            self.lexer.advance();
        }
        Ok(op)
    }

    /// `/pattern/flags` after `=~`.
    fn regex(&mut self) -> Result<Regex, ParseError> {
        self.lexer.skip_whitespace();
        if self.lexer.current_char() != Some('/') {
            return Err(self.error(ErrorKind::SyntaxError));
        }
        self.lexer.advance();

        let mut pattern = String::new();
        loop {
            match self.lexer.current_char() {
                Some('/') => {
                    self.lexer.advance();
                    break;
                }
                Some('\\') => {
                    self.lexer.advance();
                    match self.lexer.current_char() {
                        Some('/') => pattern.push('/'),
                        Some(ch) => {
                            pattern.push('\\');
                            pattern.push(ch);
                        }
                        None => return Err(self.error(ErrorKind::UnexpectedEndOfInput)),
                    }
                    self.lexer.advance();
                }
                Some(ch) => {
                    pattern.push(ch);
                    self.lexer.advance();
                }
                None => return Err(self.error(ErrorKind::UnexpectedEndOfInput)),
            }
        }

        let flags = self.lexer.read_while(|ch| ch.is_ascii_alphabetic());
        let mut builder = RegexBuilder::new(&pattern);
        for flag in flags.chars() {
            match flag {
                'i' => builder.case_insensitive(true),
                'm' => builder.multi_line(true),
                's' => builder.dot_matches_new_line(true),
                'x' => builder.ignore_whitespace(true),
                _ => return Err(self.error(ErrorKind::InvalidRegex(format!("unknown flag '{flag}'")))),
            };
        }
        builder
            .build()
            .map_err(|e| self.error(ErrorKind::InvalidRegex(e.to_string())))
    }

    fn filter_operand(&mut self) -> Result<FilterExpr, ParseError> {
        match self.lexer.current_char() {
            Some('@' | '$') => {
                self.enter()?;
                let selector = self.path()?;
                self.leave();
                let singular = selector.is_singular();
                Ok(FilterExpr::Path {
                    selector: Box::new(selector),
                    singular,
                })
            }
            Some(quote @ ('\'' | '"')) => Ok(FilterExpr::Literal(Json::String(self.quoted(quote)?))),
            Some('-' | '0'..='9') => self.number(),
            Some(ch) if is_name_start(ch) => {
                let name = self.lexer.read_while(is_name_part);
                match name.as_str() {
                    "true" => Ok(FilterExpr::Literal(Json::Bool(true))),
                    "false" => Ok(FilterExpr::Literal(Json::Bool(false))),
                    "null" => Ok(FilterExpr::Literal(Json::Null)),
                    _ => {
                        self.lexer.skip_whitespace();
                        if self.lexer.current_char() != Some('(') {
                            return Err(self.error(ErrorKind::SyntaxError));
                        }
                        self.call(name)
                    }
                }
            }
            Some(_) => Err(self.error(ErrorKind::SyntaxError)),
            None => Err(self.error(ErrorKind::UnexpectedEndOfInput)),
        }
    }

    fn number(&mut self) -> Result<FilterExpr, ParseError> {
        let mut text = String::new();
        if self.lexer.current_char() == Some('-') {
            text.push('-');
            self.lexer.advance();
        }
        text.push_str(&self.lexer.read_while(|ch| ch.is_ascii_digit()));
        if self.lexer.current_char() == Some('.') {
            text.push('.');
            self.lexer.advance();
            text.push_str(&self.lexer.read_while(|ch| ch.is_ascii_digit()));
        }
        if let Some(e @ ('e' | 'E')) = self.lexer.current_char() {
            text.push(e);
            self.lexer.advance();
            if let Some(sign @ ('+' | '-')) = self.lexer.current_char() {
                text.push(sign);
                self.lexer.advance();
            }
            text.push_str(&self.lexer.read_while(|ch| ch.is_ascii_digit()));
        }
        match serde_json::from_str::<Json>(&text) {
            Ok(number @ Json::Number(_)) => Ok(FilterExpr::Literal(number)),
            _ => Err(self.error(ErrorKind::InvalidNumber)),
        }
    }

    /// `name(args...)`; the current character is `(`.
    fn call(&mut self, name: String) -> Result<FilterExpr, ParseError> {
        let Some(function) = self.registry.get(&name) else {
            return Err(self.error(ErrorKind::UnknownFunction(name)));
        };
        self.lexer.advance();
        self.enter()?;

        let mut args = Vec::new();
        self.lexer.skip_whitespace();
        if self.lexer.current_char() == Some(')') {
            self.lexer.advance();
        } else {
            loop {
                args.push(self.filter_expression()?);
                match self.lexer.current_char() {
                    Some(',') => self.lexer.advance(),
                    Some(')') => {
                        self.lexer.advance();
                        break;
                    }
                    Some(_) => return Err(self.error(ErrorKind::ExpectedRightParen)),
                    None => return Err(self.error(ErrorKind::UnexpectedEndOfInput)),
                }
            }
        }
        self.leave();

        if let Some(expected) = function.arity()
            && expected != args.len()
        {
            return Err(self.error(ErrorKind::InvalidArity {
                name,
                expected,
                found: args.len(),
            }));
        }
        Ok(FilterExpr::Function { function, args })
    }
}
