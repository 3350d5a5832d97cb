//! Tests for chat command

use wiki_rag::commands::{parse_input, ChatInput};

#[test]
fn test_chat_exit_words() {
    for word in ["exit", "quit", "q", "EXIT", " Quit "] {
        assert_eq!(parse_input(word), ChatInput::Exit, "{word:?}");
    }
}

#[test]
fn test_chat_clear_words() {
    assert_eq!(parse_input("clear"), ChatInput::Clear);
    assert_eq!(parse_input("RESET"), ChatInput::Clear);
}

#[test]
fn test_chat_ignores_blank_lines() {
    assert_eq!(parse_input(""), ChatInput::Skip);
    assert_eq!(parse_input("\t  "), ChatInput::Skip);
}

#[test]
fn test_chat_question_is_trimmed_not_lowercased() {
    assert_eq!(
        parse_input("  What is Quantum Computing?\n"),
        ChatInput::Question("What is Quantum Computing?".to_string())
    );
}
