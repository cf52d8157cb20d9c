use std::iter::Peekable;
use std::str::Chars;

pub const COMMENT: &str = "#";

pub struct Lexer<'a> {
    input: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.chars().peekable(),
        }
    }

    /// 下一个以空白分隔的 token；没有引号也没有转义
    pub fn next_token(&mut self) -> Option<String> {
        self.skip_whitespace();
        self.peek_char()?;
        Some(self.read_word())
    }

    fn read_char(&mut self) -> Option<char> {
        self.input.next()
    }

    fn peek_char(&mut self) -> Option<char> {
        self.input.peek().copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if !c.is_ascii_whitespace() {
                break;
            }
            self.read_char();
        }
    }

    fn read_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_ascii_whitespace() {
                break;
            }
            word.push(c);
            self.read_char();
        }
        word
    }
}

/// 把一行切成 token，`#` 及其之后的内容全部丢弃
pub fn tokenize(line: &str) -> Vec<String> {
    let mut lexer = Lexer::new(line);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token() {
        if token == COMMENT {
            break;
        }
        tokens.push(token);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_command() {
        assert_eq!(tokenize("ls -l"), vec!["ls", "-l"]);
    }

    #[test]
    fn test_operators_need_whitespace() {
        assert_eq!(tokenize("echo hi | wc -l"), vec!["echo", "hi", "|", "wc", "-l"]);
        assert_eq!(tokenize("echo hi|wc"), vec!["echo", "hi|wc"]);
    }

    #[test]
    fn test_comment_is_stripped() {
        assert_eq!(tokenize("echo a # b c"), vec!["echo", "a"]);
        assert_eq!(tokenize("# only a comment"), Vec::<String>::new());
        // 只有独立的 `#` 才是注释
        assert_eq!(tokenize("echo a#b"), vec!["echo", "a#b"]);
    }

    #[test]
    fn test_blank_line() {
        assert!(tokenize(" \t  \n").is_empty());
    }

    #[test]
    fn test_quotes_are_plain_characters() {
        assert_eq!(tokenize(r#"echo "a b""#), vec!["echo", "\"a", "b\""]);
    }
}
