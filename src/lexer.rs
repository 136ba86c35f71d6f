/// A 1-based location in the expression text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Default for Position {
    fn default() -> Self {
        Position { line: 1, column: 1 }
    }
}

/// Character source shared by the JMESPath and JSONPath parsers.
///
/// The lexer hands out one character at a time and tracks where it is, so parse errors
/// can report the line and column of the character that caused them.
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    location: Position,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
            location: Position::default(),
        }
    }

    pub fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    pub fn peek_char(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    /// The first non-whitespace character after the current one.
    pub fn peek_significant(&self) -> Option<char> {
        self.input[(self.position + 1).min(self.input.len())..]
            .iter()
            .copied()
            .find(|ch| !ch.is_whitespace())
    }

    pub fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            if ch == '\n' {
                self.location.line += 1;
                self.location.column = 1;
            } else {
                self.location.column += 1;
            }
            self.position += 1;
        }
    }

    pub fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    pub fn location(&self) -> Position {
        self.location
    }

    pub fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    /// Reads a run of characters accepted by `accept`.
    pub fn read_while(&mut self, accept: impl Fn(char) -> bool) -> String {
        let mut result = String::new();
        while let Some(ch) = self.current_char() {
            if accept(ch) {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        result
    }
}

/// `[A-Za-z_]`
pub fn is_identifier_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

/// `[A-Za-z0-9_]`
pub fn is_identifier_part(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

#[test]
fn test_position_tracking() {
    let mut lexer = Lexer::new("a\nbc");
    assert_eq!(lexer.location(), Position { line: 1, column: 1 });
    lexer.advance();
    assert_eq!(lexer.location(), Position { line: 1, column: 2 });
    lexer.advance();
    assert_eq!(lexer.location(), Position { line: 2, column: 1 });
    lexer.advance();
    lexer.advance();
    assert_eq!(lexer.location(), Position { line: 2, column: 3 });
    assert!(lexer.is_at_end());
    lexer.advance();
    assert_eq!(lexer.location(), Position { line: 2, column: 3 });
}

#[test]
fn test_peek_significant() {
    let lexer = Lexer::new("*  ]");
    assert_eq!(lexer.current_char(), Some('*'));
    assert_eq!(lexer.peek_significant(), Some(']'));
    assert_eq!(Lexer::new("*").peek_significant(), None);
}

#[test]
fn test_read_while() {
    let mut lexer = Lexer::new("foo_1.bar");
    assert_eq!(lexer.read_while(is_identifier_part), "foo_1");
    assert_eq!(lexer.current_char(), Some('.'));
}
