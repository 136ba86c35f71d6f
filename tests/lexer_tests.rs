use quarry::lexer::{is_identifier_part, is_identifier_start, Lexer, Position};

#[test]
fn test_lexer_starts_at_line_one() {
    let lexer = Lexer::new("abc");
    assert_eq!(lexer.location(), Position { line: 1, column: 1 });
    assert_eq!(lexer.current_char(), Some('a'));
    assert!(!lexer.is_at_end());
}

#[test]
fn test_lexer_advance_tracks_columns() {
    let mut lexer = Lexer::new("ab");
    lexer.advance();
    assert_eq!(lexer.current_char(), Some('b'));
    assert_eq!(lexer.location(), Position { line: 1, column: 2 });
    lexer.advance();
    assert!(lexer.is_at_end());
    assert_eq!(lexer.current_char(), None);

    // Advancing past the end is a no-op
    lexer.advance();
    assert_eq!(lexer.location(), Position { line: 1, column: 3 });
}

#[test]
fn test_lexer_newlines_reset_column() {
    let mut lexer = Lexer::new("a\n  b");
    lexer.advance();
    lexer.advance();
    assert_eq!(lexer.location(), Position { line: 2, column: 1 });
    lexer.skip_whitespace();
    assert_eq!(lexer.current_char(), Some('b'));
    assert_eq!(lexer.location(), Position { line: 2, column: 3 });
}

#[test]
fn test_lexer_peek() {
    let lexer = Lexer::new("*  ]");
    assert_eq!(lexer.peek_char(1), Some(' '));
    assert_eq!(lexer.peek_char(10), None);
    assert_eq!(lexer.peek_significant(), Some(']'));
    assert_eq!(Lexer::new("x").peek_significant(), None);
}

#[test]
fn test_lexer_read_while() {
    let mut lexer = Lexer::new("foo_bar1.baz");
    assert_eq!(lexer.read_while(is_identifier_part), "foo_bar1");
    assert_eq!(lexer.current_char(), Some('.'));
    assert_eq!(lexer.location().column, 9);
    assert_eq!(lexer.read_while(char::is_alphabetic), "");
}

#[test]
fn test_lexer_counts_characters_not_bytes() {
    let mut lexer = Lexer::new("é✓x");
    lexer.advance();
    lexer.advance();
    assert_eq!(lexer.current_char(), Some('x'));
    assert_eq!(lexer.location().column, 3);
}

#[test]
fn test_identifier_classes() {
    assert!(is_identifier_start('a'));
    assert!(is_identifier_start('_'));
    assert!(!is_identifier_start('1'));
    assert!(is_identifier_part('1'));
    assert!(!is_identifier_part('-'));
}
