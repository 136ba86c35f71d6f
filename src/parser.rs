//! JMESPath compiler.
//!
//! The parser is a character-driven state machine with an explicit state stack; it
//! never recurses. Operands and group markers accumulate on an output stack, operators
//! wait on an operator stack and are reduced by precedence (shunting-yard), so deeply
//! nested input is bounded by [`MAX_NESTING`] rather than by the call stack.

use std::mem;

use log::trace;
use serde_json::Value as Json;

use crate::{
    ast::{yields_to, Ast, BinaryOperator, ProjectionKind, Slice, Token, UnaryOperator},
    error::{ErrorKind, ParseError},
    functions::FunctionRegistry,
    lexer::{is_identifier_part, is_identifier_start, Lexer, Position},
};

/// Deepest group nesting (parentheses, brackets, braces, calls) accepted, and the
/// tallest expression tree a chain of steps or operators may build.
pub const MAX_NESTING: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Bottom of the stack; only end of input is accepted here
    Terminal,
    /// Start of an operand
    LhsExpression,
    /// After an operand: steps, infix operators or a closer
    RhsExpression,
    /// After `.`
    SubExpression,

    UnquotedString,
    QuotedString,
    RawString,
    RawStringEscape,
    JsonLiteral,
    Escape,
    EscapeHex { remaining: u8, low: bool },
    ExpectSurrogateBackslash,
    ExpectSurrogateU,

    /// A finished identifier; `(` turns it into a call
    IdentifierOrFunction { chained: bool },
    /// A finished quoted identifier
    QuotedField { chained: bool },
    /// A finished raw string
    RawLiteral,
    /// A finished backtick literal
    JsonValue,

    /// After `[` following an operand
    BracketSpecifier,
    /// After `[` in operand position
    BracketSpecifierOrMultiSelectList,
    /// After `[*`
    WildcardBracket,
    Number,
    IndexOrSliceStart,
    SliceStop,
    SliceStep,
    FilterEnd,
    MultiSelectList,

    HashKey,
    HashKeyEnd,
    ExpectColon,
    HashValueEnd,

    ExpectRightParen,
    ArgumentOrRightParen,
    FunctionArguments,

    ExpectPipeOrOr,
    ExpectAnd,
    CmpLtOrLte,
    CmpGtOrGte,
    CmpEq,
    CmpNe,
    ExpectDivideOrIntegerDivide,
}

impl State {
    fn skips_whitespace(self) -> bool {
        matches!(
            self,
            State::LhsExpression
                | State::RhsExpression
                | State::SubExpression
                | State::IdentifierOrFunction { .. }
                | State::BracketSpecifier
                | State::BracketSpecifierOrMultiSelectList
                | State::WildcardBracket
                | State::IndexOrSliceStart
                | State::SliceStop
                | State::SliceStep
                | State::FilterEnd
                | State::MultiSelectList
                | State::HashKey
                | State::ExpectColon
                | State::HashValueEnd
                | State::ExpectRightParen
                | State::ArgumentOrRightParen
                | State::FunctionArguments
        )
    }
}

/// A dot or bracket step applied to the operand on top of the output stack.
enum Step {
    Field(String),
    Index(i64),
    Slice(Slice),
    ListWildcard,
    ObjectWildcard,
    Filter(Ast),
    /// Multi-select or function call after `.`
    Node(Ast),
}

impl Step {
    fn projects(&self) -> bool {
        matches!(
            self,
            Step::Slice(_) | Step::ListWildcard | Step::ObjectWildcard | Step::Filter(_)
        )
    }

    fn apply(self, target: Ast) -> Ast {
        match self {
            Step::Field(name) => Ast::subexpression(target, Ast::Field(name)),
            Step::Index(index) => Ast::subexpression(target, Ast::Index(index)),
            Step::Slice(slice) => Ast::projection(
                ProjectionKind::List,
                Ast::subexpression(target, Ast::Slice(slice)),
            ),
            Step::ListWildcard => Ast::projection(ProjectionKind::List, target),
            Step::ObjectWildcard => Ast::projection(ProjectionKind::Object, target),
            Step::Filter(predicate) => {
                Ast::projection(ProjectionKind::Filter(Box::new(predicate)), target)
            }
            Step::Node(node) => Ast::subexpression(target, node),
        }
    }
}

/// Applies `step` inside the innermost open projection of `target`.
fn extend(target: Ast, step: Step) -> Ast {
    match target {
        Ast::Projection { kind, lhs, rhs } => Ast::Projection {
            kind,
            lhs,
            rhs: Box::new(extend(*rhs, step)),
        },
        target => step.apply(target),
    }
}

/// Compiles JMESPath text into an [`Ast`].
pub struct Parser<'r> {
    lexer: Lexer,
    registry: &'r FunctionRegistry,
    states: Vec<State>,
    output: Vec<Token>,
    operators: Vec<Token>,
    /// Identifier, string or literal text being read
    buffer: String,
    code_point: u32,
    low_code_point: u32,
    /// `[start:stop:step]` parts read so far and the part being read
    slice: [Option<i64>; 3],
    slice_part: usize,
    depth: usize,
    /// Opening backtick of the literal being read
    literal_start: Position,
}

impl<'r> Parser<'r> {
    pub fn new(input: &str, registry: &'r FunctionRegistry) -> Self {
        Parser {
            lexer: Lexer::new(input),
            registry,
            states: vec![State::Terminal, State::RhsExpression, State::LhsExpression],
            output: Vec::new(),
            operators: Vec::new(),
            buffer: String::new(),
            code_point: 0,
            low_code_point: 0,
            slice: [None; 3],
            slice_part: 0,
            depth: 0,
            literal_start: Position { line: 1, column: 1 },
        }
    }

    pub fn parse(mut self) -> Result<Ast, ParseError> {
        loop {
            let ch = self.lexer.current_char();
            if ch.is_none() && self.states == [State::Terminal] {
                break;
            }
            self.step(ch)?;
        }
        self.push(Token::EndOfExpression)?;

        let (ast, _, _) = self.pop_operand()?;
        if !self.output.is_empty() {
            return Err(self.error(ErrorKind::SyntaxError));
        }
        trace!("parsed {ast:?}");
        Ok(ast)
    }

    fn error(&self, kind: ErrorKind) -> ParseError {
        ParseError::new(kind, self.lexer.location())
    }

    fn replace(&mut self, state: State) {
        if let Some(top) = self.states.last_mut() {
            *top = state;
        }
    }

    /// Queues a complete sub-expression: an operand and whatever follows it.
    fn expect_expression(&mut self) {
        self.states.push(State::RhsExpression);
        self.states.push(State::LhsExpression);
    }

    fn step(&mut self, ch: Option<char>) -> Result<(), ParseError> {
        let Some(state) = self.states.last().copied() else {
            return Err(self.error(ErrorKind::SyntaxError));
        };
        if state.skips_whitespace() && ch.is_some_and(char::is_whitespace) {
            self.lexer.advance();
            return Ok(());
        }

        match state {
            State::Terminal => Err(self.error(ErrorKind::SyntaxError)),
            State::LhsExpression => self.lhs_expression(ch),
            State::RhsExpression => self.rhs_expression(ch),
            State::SubExpression => self.sub_expression(ch),

            State::UnquotedString => {
                let name = self.lexer.read_while(is_identifier_part);
                self.buffer.push_str(&name);
                self.states.pop();
                Ok(())
            }
            State::QuotedString => self.quoted_string(ch),
            State::RawString => self.raw_string(ch),
            State::RawStringEscape => {
                let Some(ch) = ch else {
                    return Err(self.error(ErrorKind::UnexpectedEndOfInput));
                };
                if ch != '\'' {
                    self.buffer.push('\\');
                }
                self.buffer.push(ch);
                self.lexer.advance();
                self.states.pop();
                Ok(())
            }
            State::JsonLiteral => self.json_literal(ch),
            State::Escape => self.escape(ch),
            State::EscapeHex { remaining, low } => self.escape_hex(ch, remaining, low),
            State::ExpectSurrogateBackslash => self.expect_surrogate(ch, '\\', State::ExpectSurrogateU),
            State::ExpectSurrogateU => {
                self.low_code_point = 0;
                self.expect_surrogate(ch, 'u', State::EscapeHex { remaining: 4, low: true })
            }

            State::IdentifierOrFunction { chained } => self.identifier_or_function(ch, chained),
            State::QuotedField { chained } => {
                let name = mem::take(&mut self.buffer);
                self.field(name, chained)?;
                self.states.pop();
                Ok(())
            }
            State::RawLiteral => {
                let text = mem::take(&mut self.buffer);
                self.push(Token::Literal(Json::String(text)))?;
                self.states.pop();
                Ok(())
            }
            State::JsonValue => {
                let text = mem::take(&mut self.buffer);
                let json = serde_json::from_str(&text)
                    .map_err(|_| ParseError::new(ErrorKind::InvalidLiteral, self.literal_start))?;
                self.push(Token::Literal(json))?;
                self.states.pop();
                Ok(())
            }

            State::BracketSpecifier => self.bracket_specifier(ch),
            State::BracketSpecifierOrMultiSelectList => self.bracket_or_multi_select_list(ch),
            State::WildcardBracket => match ch {
                Some(']') => {
                    self.lexer.advance();
                    self.attach(Step::ListWildcard, 0)?;
                    self.states.pop();
                    Ok(())
                }
                Some(_) => Err(self.error(ErrorKind::ExpectedRightBracket)),
                None => Err(self.error(ErrorKind::UnexpectedEndOfInput)),
            },
            State::Number => self.number(),
            State::IndexOrSliceStart | State::SliceStop | State::SliceStep => self.index_or_slice(ch),
            State::FilterEnd => self.close_with(ch, ']', Token::EndFilter, ErrorKind::ExpectedRightBracket),
            State::MultiSelectList => match ch {
                Some(',') => {
                    self.lexer.advance();
                    self.push(Token::Separator)?;
                    self.expect_expression();
                    Ok(())
                }
                _ => self.close_with(ch, ']', Token::EndMultiSelectList, ErrorKind::ExpectedRightBracket),
            },

            State::HashKey => self.hash_key(ch),
            State::HashKeyEnd => {
                let key = mem::take(&mut self.buffer);
                self.push(Token::Key(key))?;
                self.replace(State::ExpectColon);
                Ok(())
            }
            State::ExpectColon => match ch {
                Some(':') => {
                    self.lexer.advance();
                    self.replace(State::HashValueEnd);
                    self.expect_expression();
                    Ok(())
                }
                Some(_) => Err(self.error(ErrorKind::ExpectedColon)),
                None => Err(self.error(ErrorKind::UnexpectedEndOfInput)),
            },
            State::HashValueEnd => match ch {
                Some(',') => {
                    self.lexer.advance();
                    self.push(Token::Separator)?;
                    self.replace(State::HashKey);
                    Ok(())
                }
                _ => self.close_with(ch, '}', Token::EndMultiSelectHash, ErrorKind::ExpectedRightBrace),
            },

            State::ExpectRightParen => self.close_with(ch, ')', Token::RightParen, ErrorKind::ExpectedRightParen),
            State::ArgumentOrRightParen => match ch {
                Some(')') => self.close_with(ch, ')', Token::EndArguments, ErrorKind::ExpectedRightParen),
                _ => {
                    self.replace(State::FunctionArguments);
                    self.expect_expression();
                    Ok(())
                }
            },
            State::FunctionArguments => match ch {
                Some(',') => {
                    self.lexer.advance();
                    self.push(Token::Separator)?;
                    self.expect_expression();
                    Ok(())
                }
                _ => self.close_with(ch, ')', Token::EndArguments, ErrorKind::ExpectedRightParen),
            },

            State::ExpectPipeOrOr => match ch {
                Some('|') => {
                    self.lexer.advance();
                    self.infix(Token::Binary(BinaryOperator::Or))
                }
                _ => self.infix(Token::Pipe),
            },
            State::ExpectAnd => match ch {
                Some('&') => {
                    self.lexer.advance();
                    self.infix(Token::Binary(BinaryOperator::And))
                }
                Some(_) => Err(self.error(ErrorKind::SyntaxError)),
                None => Err(self.error(ErrorKind::UnexpectedEndOfInput)),
            },
            State::CmpLtOrLte => self.comparison(ch, BinaryOperator::LessEqual, Some(BinaryOperator::LessThan)),
            State::CmpGtOrGte => self.comparison(ch, BinaryOperator::GreaterEqual, Some(BinaryOperator::GreaterThan)),
            State::CmpEq => self.comparison(ch, BinaryOperator::Equal, None),
            State::CmpNe => self.comparison(ch, BinaryOperator::NotEqual, None),
            State::ExpectDivideOrIntegerDivide => match ch {
                Some('/') => {
                    self.lexer.advance();
                    self.infix(Token::Binary(BinaryOperator::IntegerDivide))
                }
                _ => self.infix(Token::Binary(BinaryOperator::Divide)),
            },
        }
    }

    fn lhs_expression(&mut self, ch: Option<char>) -> Result<(), ParseError> {
        let Some(ch) = ch else {
            return Err(self.error(ErrorKind::UnexpectedEndOfInput));
        };
        match ch {
            '"' => {
                self.lexer.advance();
                self.replace(State::QuotedField { chained: false });
                self.states.push(State::QuotedString);
            }
            '\'' => {
                self.lexer.advance();
                self.replace(State::RawLiteral);
                self.states.push(State::RawString);
            }
            '`' => {
                self.literal_start = self.lexer.location();
                self.lexer.advance();
                self.replace(State::JsonValue);
                self.states.push(State::JsonLiteral);
            }
            '[' => {
                self.lexer.advance();
                self.replace(State::BracketSpecifierOrMultiSelectList);
            }
            '{' => {
                self.lexer.advance();
                self.push(Token::BeginMultiSelectHash { chained: false })?;
                self.replace(State::HashKey);
            }
            '*' => {
                self.lexer.advance();
                self.push_operand(Ast::projection(ProjectionKind::Object, Ast::Identity), true);
                self.states.pop();
            }
            '@' => {
                self.lexer.advance();
                self.push(Token::CurrentNode)?;
                self.states.pop();
            }
            '(' => {
                self.lexer.advance();
                self.push(Token::LeftParen)?;
                self.replace(State::ExpectRightParen);
                self.expect_expression();
            }
            '!' => {
                self.lexer.advance();
                self.push(Token::Unary(UnaryOperator::Not))?;
            }
            '-' => {
                self.lexer.advance();
                self.push(Token::Unary(UnaryOperator::Minus))?;
            }
            '&' => {
                self.lexer.advance();
                self.push(Token::BeginExpressionType)?;
            }
            ch if is_identifier_start(ch) => {
                self.replace(State::IdentifierOrFunction { chained: false });
                self.states.push(State::UnquotedString);
            }
            _ => return Err(self.error(ErrorKind::SyntaxError)),
        }
        Ok(())
    }

    fn rhs_expression(&mut self, ch: Option<char>) -> Result<(), ParseError> {
        let Some(ch) = ch else {
            self.states.pop();
            return Ok(());
        };
        let lookahead = match ch {
            '.' => State::SubExpression,
            '[' => State::BracketSpecifier,
            '|' => State::ExpectPipeOrOr,
            '&' => State::ExpectAnd,
            '<' => State::CmpLtOrLte,
            '>' => State::CmpGtOrGte,
            '=' => State::CmpEq,
            '!' => State::CmpNe,
            '/' => State::ExpectDivideOrIntegerDivide,
            '+' | '-' | '*' | '%' => {
                let op = match ch {
                    '+' => BinaryOperator::Add,
                    '-' => BinaryOperator::Subtract,
                    '*' => BinaryOperator::Multiply,
                    _ => BinaryOperator::Modulo,
                };
                self.lexer.advance();
                self.push(Token::Binary(op))?;
                self.states.push(State::LhsExpression);
                return Ok(());
            }
            ')' | ']' | '}' | ',' => {
                self.states.pop();
                return Ok(());
            }
            ch if is_identifier_start(ch) || ch == '"' => {
                return Err(self.error(ErrorKind::ExpectedDot));
            }
            _ => return Err(self.error(ErrorKind::SyntaxError)),
        };
        self.lexer.advance();
        self.states.push(lookahead);
        Ok(())
    }

    fn sub_expression(&mut self, ch: Option<char>) -> Result<(), ParseError> {
        let Some(ch) = ch else {
            return Err(self.error(ErrorKind::UnexpectedEndOfInput));
        };
        match ch {
            ch if is_identifier_start(ch) => {
                self.replace(State::IdentifierOrFunction { chained: true });
                self.states.push(State::UnquotedString);
            }
            '"' => {
                self.lexer.advance();
                self.replace(State::QuotedField { chained: true });
                self.states.push(State::QuotedString);
            }
            '*' => {
                self.lexer.advance();
                self.attach(Step::ObjectWildcard, 0)?;
                self.states.pop();
            }
            '[' => {
                self.lexer.advance();
                self.push(Token::BeginMultiSelectList { chained: true })?;
                self.replace(State::MultiSelectList);
                self.expect_expression();
            }
            '{' => {
                self.lexer.advance();
                self.push(Token::BeginMultiSelectHash { chained: true })?;
                self.replace(State::HashKey);
            }
            _ => return Err(self.error(ErrorKind::ExpectedIdentifier)),
        }
        Ok(())
    }

    fn quoted_string(&mut self, ch: Option<char>) -> Result<(), ParseError> {
        match ch {
            Some('"') => {
                self.lexer.advance();
                self.states.pop();
            }
            Some('\\') => {
                self.lexer.advance();
                self.states.push(State::Escape);
            }
            Some(ch) => {
                self.buffer.push(ch);
                self.lexer.advance();
            }
            None => return Err(self.error(ErrorKind::UnexpectedEndOfInput)),
        }
        Ok(())
    }

    fn raw_string(&mut self, ch: Option<char>) -> Result<(), ParseError> {
        match ch {
            Some('\'') => {
                self.lexer.advance();
                self.states.pop();
            }
            Some('\\') => {
                self.lexer.advance();
                self.states.push(State::RawStringEscape);
            }
            Some(ch) => {
                self.buffer.push(ch);
                self.lexer.advance();
            }
            None => return Err(self.error(ErrorKind::UnexpectedEndOfInput)),
        }
        Ok(())
    }

    fn json_literal(&mut self, ch: Option<char>) -> Result<(), ParseError> {
        match ch {
            Some('`') => {
                self.lexer.advance();
                self.states.pop();
            }
            Some('\\') if self.lexer.peek_char(1) == Some('`') => {
                self.buffer.push('`');
                self.lexer.advance();
                self.lexer.advance();
            }
            Some(ch) => {
                self.buffer.push(ch);
                self.lexer.advance();
            }
            None => return Err(self.error(ErrorKind::UnexpectedEndOfInput)),
        }
        Ok(())
    }

    fn escape(&mut self, ch: Option<char>) -> Result<(), ParseError> {
        let Some(ch) = ch else {
            return Err(self.error(ErrorKind::UnexpectedEndOfInput));
        };
        let unescaped = match ch {
            '"' | '\\' | '/' => ch,
            'b' => '\u{8}',
            'f' => '\u{c}',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'u' => {
                self.lexer.advance();
                self.code_point = 0;
                self.replace(State::EscapeHex { remaining: 4, low: false });
                return Ok(());
            }
            _ => return Err(self.error(ErrorKind::IllegalEscapeCharacter)),
        };
        self.buffer.push(unescaped);
        self.lexer.advance();
        self.states.pop();
        Ok(())
    }

    fn escape_hex(&mut self, ch: Option<char>, remaining: u8, low: bool) -> Result<(), ParseError> {
        let Some(ch) = ch else {
            return Err(self.error(ErrorKind::UnexpectedEndOfInput));
        };
        let Some(digit) = ch.to_digit(16) else {
            return Err(self.error(ErrorKind::InvalidCodepoint));
        };
        let target = if low {
            &mut self.low_code_point
        } else {
            &mut self.code_point
        };
        *target = *target * 16 + digit;

        if remaining > 1 {
            self.lexer.advance();
            self.replace(State::EscapeHex { remaining: remaining - 1, low });
            return Ok(());
        }

        let code_point = match (low, self.code_point) {
            (false, 0xD800..=0xDBFF) => {
                self.lexer.advance();
                self.replace(State::ExpectSurrogateBackslash);
                return Ok(());
            }
            (false, 0xDC00..=0xDFFF) => return Err(self.error(ErrorKind::InvalidCodepoint)),
            (false, code_point) => code_point,
            (true, high) => {
                if !(0xDC00..=0xDFFF).contains(&self.low_code_point) {
                    return Err(self.error(ErrorKind::InvalidCodepoint));
                }
                0x10000 + ((high - 0xD800) << 10) + (self.low_code_point - 0xDC00)
            }
        };
        let decoded = char::from_u32(code_point).ok_or_else(|| self.error(ErrorKind::InvalidCodepoint))?;
        self.buffer.push(decoded);
        self.lexer.advance();
        self.states.pop();
        Ok(())
    }

    /// A high surrogate must be followed by `\u` and a low surrogate.
    fn expect_surrogate(&mut self, ch: Option<char>, expected: char, next: State) -> Result<(), ParseError> {
        match ch {
            Some(ch) if ch == expected => {
                self.lexer.advance();
                self.replace(next);
                Ok(())
            }
            Some(_) => Err(self.error(ErrorKind::InvalidCodepoint)),
            None => Err(self.error(ErrorKind::UnexpectedEndOfInput)),
        }
    }

    fn identifier_or_function(&mut self, ch: Option<char>, chained: bool) -> Result<(), ParseError> {
        let name = mem::take(&mut self.buffer);
        if ch == Some('(') {
            let Some(function) = self.registry.get(&name) else {
                return Err(self.error(ErrorKind::UnknownFunction(name)));
            };
            self.lexer.advance();
            self.push(Token::Function { function, chained })?;
            self.replace(State::ArgumentOrRightParen);
            return Ok(());
        }
        self.field(name, chained)?;
        self.states.pop();
        Ok(())
    }

    fn field(&mut self, name: String, chained: bool) -> Result<(), ParseError> {
        if chained {
            self.attach(Step::Field(name), 0)
        } else {
            self.push_operand(Ast::Field(name), false);
            Ok(())
        }
    }

    fn bracket_specifier(&mut self, ch: Option<char>) -> Result<(), ParseError> {
        let Some(ch) = ch else {
            return Err(self.error(ErrorKind::UnexpectedEndOfInput));
        };
        match ch {
            '*' => {
                self.lexer.advance();
                self.replace(State::WildcardBracket);
            }
            ']' => {
                self.lexer.advance();
                self.flatten()?;
                self.states.pop();
            }
            '?' => {
                self.lexer.advance();
                self.push(Token::BeginFilter { chained: true })?;
                self.replace(State::FilterEnd);
                self.expect_expression();
            }
            '-' | ':' | '0'..='9' => self.replace(State::IndexOrSliceStart),
            _ => return Err(self.error(ErrorKind::SyntaxError)),
        }
        Ok(())
    }

    fn bracket_or_multi_select_list(&mut self, ch: Option<char>) -> Result<(), ParseError> {
        let Some(ch) = ch else {
            return Err(self.error(ErrorKind::UnexpectedEndOfInput));
        };
        let starts_index = match ch {
            '0'..='9' | ':' => true,
            '-' => self.lexer.peek_char(1).is_some_and(|next| next.is_ascii_digit()),
            _ => false,
        };
        match ch {
            '*' if self.lexer.peek_significant() == Some(']') => {
                self.lexer.advance();
                self.push_operand(Ast::Identity, false);
                self.replace(State::WildcardBracket);
            }
            ']' => {
                self.lexer.advance();
                self.push_operand(Ast::projection(ProjectionKind::Flatten, Ast::Identity), true);
                self.states.pop();
            }
            '?' => {
                self.lexer.advance();
                self.push(Token::BeginFilter { chained: false })?;
                self.replace(State::FilterEnd);
                self.expect_expression();
            }
            _ if starts_index => {
                self.push_operand(Ast::Identity, false);
                self.replace(State::IndexOrSliceStart);
            }
            _ => {
                self.push(Token::BeginMultiSelectList { chained: false })?;
                self.replace(State::MultiSelectList);
                self.expect_expression();
            }
        }
        Ok(())
    }

    /// Reads `-?[0-9]+` into the slice part being parsed.
    fn number(&mut self) -> Result<(), ParseError> {
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
        let value = text
            .parse::<i64>()
            .map_err(|_| self.error(ErrorKind::InvalidNumber))?;
        self.slice[self.slice_part] = Some(value);
        self.states.pop();
        Ok(())
    }

    fn index_or_slice(&mut self, ch: Option<char>) -> Result<(), ParseError> {
        let Some(ch) = ch else {
            return Err(self.error(ErrorKind::UnexpectedEndOfInput));
        };
        match ch {
            '-' | '0'..='9' if self.slice[self.slice_part].is_none() => {
                self.states.push(State::Number);
            }
            ':' if self.slice_part < 2 => {
                self.lexer.advance();
                self.slice_part += 1;
                self.replace(if self.slice_part == 1 {
                    State::SliceStop
                } else {
                    State::SliceStep
                });
            }
            ']' => {
                let step = if self.slice_part == 0 {
                    match self.slice[0] {
                        Some(index) => Step::Index(index),
                        None => return Err(self.error(ErrorKind::SyntaxError)),
                    }
                } else {
                    let [start, stop, step] = self.slice;
                    let step = step.unwrap_or(1);
                    if step == 0 {
                        return Err(self.error(ErrorKind::StepCannotBeZero));
                    }
                    Step::Slice(Slice { start, stop, step })
                };
                self.lexer.advance();
                self.slice = [None; 3];
                self.slice_part = 0;
                self.attach(step, 0)?;
                self.states.pop();
            }
            _ => return Err(self.error(ErrorKind::ExpectedRightBracket)),
        }
        Ok(())
    }

    fn hash_key(&mut self, ch: Option<char>) -> Result<(), ParseError> {
        match ch {
            Some('"') => {
                self.lexer.advance();
                self.replace(State::HashKeyEnd);
                self.states.push(State::QuotedString);
            }
            Some(ch) if is_identifier_start(ch) => {
                self.replace(State::HashKeyEnd);
                self.states.push(State::UnquotedString);
            }
            Some(_) => return Err(self.error(ErrorKind::ExpectedIdentifier)),
            None => return Err(self.error(ErrorKind::UnexpectedEndOfInput)),
        }
        Ok(())
    }

    /// Consumes `closer` and closes the innermost group with `token`.
    fn close_with(&mut self, ch: Option<char>, closer: char, token: Token, kind: ErrorKind) -> Result<(), ParseError> {
        match ch {
            Some(ch) if ch == closer => {
                self.lexer.advance();
                self.push(token)?;
                self.states.pop();
                Ok(())
            }
            Some(_) => Err(self.error(kind)),
            None => Err(self.error(ErrorKind::UnexpectedEndOfInput)),
        }
    }

    fn comparison(
        &mut self,
        ch: Option<char>,
        with_equals: BinaryOperator,
        alone: Option<BinaryOperator>,
    ) -> Result<(), ParseError> {
        if ch == Some('=') {
            self.lexer.advance();
            return self.infix(Token::Binary(with_equals));
        }
        match alone {
            Some(op) => self.infix(Token::Binary(op)),
            None => Err(self.error(ErrorKind::ExpectedComparator)),
        }
    }

    /// Pushes an infix operator read by a lookahead state, then expects its right operand.
    fn infix(&mut self, token: Token) -> Result<(), ParseError> {
        self.push(token)?;
        self.replace(State::LhsExpression);
        Ok(())
    }

    /// Pushes a leaf operand or a projection over one.
    fn push_operand(&mut self, ast: Ast, projecting: bool) {
        self.output.push(Token::Expression {
            ast,
            projecting,
            height: 2,
        });
    }

    /// Pushes a composite operand of the given tree height. The evaluator walks the
    /// tree recursively, so the height is capped like group nesting.
    fn push_node(&mut self, ast: Ast, projecting: bool, height: usize) -> Result<(), ParseError> {
        if height > MAX_NESTING {
            return Err(self.error(ErrorKind::NestingTooDeep));
        }
        self.output.push(Token::Expression {
            ast,
            projecting,
            height,
        });
        Ok(())
    }

    /// Routes a token onto the output and operator stacks.
    fn push(&mut self, token: Token) -> Result<(), ParseError> {
        match token {
            Token::CurrentNode | Token::Literal(_) | Token::Key(_) | Token::Expression { .. } => {
                self.output.push(token);
            }
            Token::LeftParen
            | Token::BeginMultiSelectList { .. }
            | Token::BeginMultiSelectHash { .. }
            | Token::BeginFilter { .. }
            | Token::Function { .. } => {
                self.depth += 1;
                if self.depth > MAX_NESTING {
                    return Err(self.error(ErrorKind::NestingTooDeep));
                }
                self.output.push(token);
                self.operators.push(Token::LeftParen);
            }
            Token::Separator => self.reduce_to_barrier()?,
            Token::RightParen
            | Token::EndMultiSelectList
            | Token::EndMultiSelectHash
            | Token::EndFilter
            | Token::EndArguments => self.close_group(token)?,
            Token::Binary(_) | Token::Pipe => {
                self.close_projection();
                while self.operators.last().is_some_and(|pending| {
                    pending.is_operator()
                        && yields_to(pending.precedence(), token.precedence(), token.is_right_associative())
                }) {
                    self.reduce_top()?;
                }
                self.operators.push(token);
            }
            Token::Unary(_) | Token::BeginExpressionType => self.operators.push(token),
            Token::EndOfExpression => {
                self.reduce_to_barrier()?;
                if !self.operators.is_empty() {
                    return Err(self.error(ErrorKind::UnexpectedEndOfInput));
                }
            }
        }
        Ok(())
    }

    /// Ends an open projection on the top operand; later steps apply to its result.
    fn close_projection(&mut self) {
        if let Some(Token::Expression { projecting, .. }) = self.output.last_mut() {
            *projecting = false;
        }
    }

    fn reduce_to_barrier(&mut self) -> Result<(), ParseError> {
        while self.operators.last().is_some_and(Token::is_operator) {
            self.reduce_top()?;
        }
        Ok(())
    }

    fn reduce_top(&mut self) -> Result<(), ParseError> {
        let Some(op) = self.operators.pop() else {
            return Err(self.error(ErrorKind::SyntaxError));
        };
        let (ast, height) = match op {
            Token::Binary(op) => {
                let (rhs, _, rhs_height) = self.pop_operand()?;
                let (lhs, _, lhs_height) = self.pop_operand()?;
                let ast = Ast::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                };
                (ast, lhs_height.max(rhs_height))
            }
            Token::Pipe => {
                let (rhs, _, rhs_height) = self.pop_operand()?;
                let (lhs, _, lhs_height) = self.pop_operand()?;
                let ast = Ast::Pipe {
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                };
                (ast, lhs_height.max(rhs_height))
            }
            Token::Unary(op) => {
                let (operand, _, height) = self.pop_operand()?;
                let ast = Ast::Unary {
                    op,
                    operand: Box::new(operand),
                };
                (ast, height)
            }
            Token::BeginExpressionType => {
                let (operand, _, height) = self.pop_operand()?;
                (Ast::ExpressionRef(Box::new(operand)), height)
            }
            _ => return Err(self.error(ErrorKind::SyntaxError)),
        };
        self.push_node(ast, false, height + 1)
    }

    /// An operand token as `(ast, projecting, height)`.
    fn operand(&self, token: Token) -> Result<(Ast, bool, usize), ParseError> {
        match token {
            Token::Expression {
                ast,
                projecting,
                height,
            } => Ok((ast, projecting, height)),
            Token::CurrentNode => Ok((Ast::Identity, false, 1)),
            Token::Literal(json) => Ok((Ast::Literal(json), false, 1)),
            _ => Err(self.error(ErrorKind::SyntaxError)),
        }
    }

    fn pop_operand(&mut self) -> Result<(Ast, bool, usize), ParseError> {
        match self.output.pop() {
            Some(token) => self.operand(token),
            None => Err(self.error(ErrorKind::SyntaxError)),
        }
    }

    /// Applies `step` to the top operand. `inner` is the height of a filter predicate
    /// or chained node carried by the step.
    fn attach(&mut self, step: Step, inner: usize) -> Result<(), ParseError> {
        let (target, projecting, height) = self.pop_operand()?;
        let projects = step.projects();
        let height = match (projecting, &step) {
            (true, _) => height + inner + 2,
            (false, Step::Slice(_)) => height + 2,
            (false, _) => height.max(inner) + 1,
        };
        let ast = if projecting {
            extend(target, step)
        } else {
            step.apply(target)
        };
        self.push_node(ast, projecting || projects, height)
    }

    /// `[]` wraps the whole operand, open projection included.
    fn flatten(&mut self) -> Result<(), ParseError> {
        let (target, _, height) = self.pop_operand()?;
        self.push_node(Ast::projection(ProjectionKind::Flatten, target), true, height + 2)
    }

    fn close_group(&mut self, closer: Token) -> Result<(), ParseError> {
        self.reduce_to_barrier()?;
        if !matches!(self.operators.pop(), Some(Token::LeftParen)) {
            return Err(self.error(ErrorKind::SyntaxError));
        }
        self.depth = self.depth.saturating_sub(1);

        let mut items = Vec::new();
        let marker = loop {
            match self.output.pop() {
                Some(token) if token.is_group_marker() => break token,
                Some(token) => items.push(token),
                None => return Err(self.error(ErrorKind::SyntaxError)),
            }
        };
        items.reverse();

        match (marker, closer) {
            (Token::LeftParen, Token::RightParen) => {
                let [item] = <[Token; 1]>::try_from(items).map_err(|_| self.error(ErrorKind::SyntaxError))?;
                let (ast, _, height) = self.operand(item)?;
                self.push_node(ast, false, height)
            }
            (Token::BeginFilter { chained }, Token::EndFilter) => {
                let [item] = <[Token; 1]>::try_from(items).map_err(|_| self.error(ErrorKind::SyntaxError))?;
                let (predicate, _, height) = self.operand(item)?;
                if chained {
                    self.attach(Step::Filter(predicate), height)
                } else {
                    let kind = ProjectionKind::Filter(Box::new(predicate));
                    self.push_node(Ast::projection(kind, Ast::Identity), true, height + 1)
                }
            }
            (Token::BeginMultiSelectList { chained }, Token::EndMultiSelectList) => {
                let mut height = 0;
                let mut elements = Vec::with_capacity(items.len());
                for item in items {
                    let (ast, _, item_height) = self.operand(item)?;
                    height = height.max(item_height);
                    elements.push(ast);
                }
                self.finish_node(Ast::MultiSelectList(elements), chained, height + 1)
            }
            (Token::BeginMultiSelectHash { chained }, Token::EndMultiSelectHash) => {
                let mut height = 0;
                let mut entries = Vec::with_capacity(items.len() / 2);
                let mut items = items.into_iter();
                while let Some(key) = items.next() {
                    let (Token::Key(key), Some(value)) = (key, items.next()) else {
                        return Err(self.error(ErrorKind::SyntaxError));
                    };
                    let (value, _, value_height) = self.operand(value)?;
                    height = height.max(value_height);
                    entries.push((key, value));
                }
                self.finish_node(Ast::MultiSelectHash(entries), chained, height + 1)
            }
            (Token::Function { function, chained }, Token::EndArguments) => {
                if let Some(expected) = function.arity()
                    && expected != items.len()
                {
                    return Err(self.error(ErrorKind::InvalidArity {
                        name: function.name().to_string(),
                        expected,
                        found: items.len(),
                    }));
                }
                let mut height = 0;
                let mut args = Vec::with_capacity(items.len());
                for item in items {
                    let (ast, _, arg_height) = self.operand(item)?;
                    height = height.max(arg_height);
                    args.push(ast);
                }
                self.finish_node(Ast::Function { function, args }, chained, height + 1)
            }
            _ => Err(self.error(ErrorKind::SyntaxError)),
        }
    }

    fn finish_node(&mut self, node: Ast, chained: bool, height: usize) -> Result<(), ParseError> {
        if chained {
            self.attach(Step::Node(node), height)
        } else {
            self.push_node(node, false, height)
        }
    }
}

/// Compiles `input` against `registry`.
pub fn parse(input: &str, registry: &FunctionRegistry) -> Result<Ast, ParseError> {
    Parser::new(input, registry).parse()
}
