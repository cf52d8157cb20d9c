use super::ast::ConditionalBlock;
use crate::shell::error::ShellError;

pub const IF: &str = "if";
pub const THEN: &str = "then";
pub const ELSE: &str = "else";
pub const END: &str = "end";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Then,
    ElseOrEnd,
    End,
    Done,
}

pub fn is_conditional(tokens: &[String]) -> bool {
    tokens.first().is_some_and(|token| token == IF)
}

/// 校验 `if ... then ... [else ...] end` 的形状并切出三段区间。
/// 不支持嵌套 `if`，`end` 之后也不能再有 token。
pub fn parse(tokens: &[String]) -> Result<ConditionalBlock<'_>, ShellError> {
    if !is_conditional(tokens) {
        return Err(ShellError::MalformedConditional("block must start with 'if'"));
    }

    let mut state = ScanState::Then;
    let mut then_at = 0;
    let mut else_at = None;
    let mut end_at = 0;

    for (i, token) in tokens.iter().enumerate().skip(1) {
        state = match (state, token.as_str()) {
            (ScanState::Done, _) => {
                return Err(ShellError::MalformedConditional("unexpected tokens after 'end'"))
            }
            (_, IF) => return Err(ShellError::MalformedConditional("nested 'if' is not supported")),
            (ScanState::Then, THEN) => {
                then_at = i;
                ScanState::ElseOrEnd
            }
            (ScanState::Then, ELSE | END) => {
                return Err(ShellError::MalformedConditional("missing 'then'"))
            }
            (ScanState::ElseOrEnd, ELSE) => {
                else_at = Some(i);
                ScanState::End
            }
            (ScanState::ElseOrEnd | ScanState::End, END) => {
                end_at = i;
                ScanState::Done
            }
            (ScanState::ElseOrEnd | ScanState::End, THEN) => {
                return Err(ShellError::MalformedConditional("duplicate 'then'"))
            }
            (ScanState::End, ELSE) => {
                return Err(ShellError::MalformedConditional("duplicate 'else'"))
            }
            (state, _) => state,
        };
    }

    match state {
        ScanState::Then => return Err(ShellError::MalformedConditional("missing 'then'")),
        ScanState::ElseOrEnd | ScanState::End => {
            return Err(ShellError::MalformedConditional("missing 'end'"))
        }
        ScanState::Done => {}
    }

    let condition = &tokens[1..then_at];
    let (then_branch, else_branch) = match else_at {
        Some(else_at) => (
            &tokens[then_at + 1..else_at],
            Some(&tokens[else_at + 1..end_at]),
        ),
        None => (&tokens[then_at + 1..end_at], None),
    };

    if condition.is_empty() {
        return Err(ShellError::MalformedConditional("empty condition"));
    }
    if then_branch.is_empty() {
        return Err(ShellError::MalformedConditional("empty 'then' branch"));
    }
    if else_branch.is_some_and(|branch| branch.is_empty()) {
        return Err(ShellError::MalformedConditional("empty 'else' branch"));
    }

    Ok(ConditionalBlock {
        condition,
        then_branch,
        else_branch,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn tokens(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_if_then_else() {
        let t = tokens("if false then echo A else echo B end");
        let block = parse(&t).unwrap();
        assert_eq!(block.condition, ["false"]);
        assert_eq!(block.then_branch, ["echo", "A"]);
        assert_eq!(block.else_branch.unwrap(), ["echo", "B"]);
    }

    #[test]
    fn test_if_then_without_else() {
        let t = tokens("if test -f x then cat x | wc -l end");
        let block = parse(&t).unwrap();
        assert_eq!(block.condition, ["test", "-f", "x"]);
        assert_eq!(block.then_branch, ["cat", "x", "|", "wc", "-l"]);
        assert!(block.else_branch.is_none());
    }

    #[test]
    fn test_branch_keeps_background_marker() {
        let t = tokens("if true then sleep 1 & end");
        let block = parse(&t).unwrap();
        assert_eq!(block.then_branch, ["sleep", "1", "&"]);
    }

    #[test]
    fn test_missing_then() {
        let t = tokens("if echo A end");
        assert!(matches!(
            parse(&t),
            Err(ShellError::MalformedConditional("missing 'then'"))
        ));
    }

    #[test]
    fn test_missing_end() {
        let t = tokens("if true then echo A else echo B");
        assert!(matches!(
            parse(&t),
            Err(ShellError::MalformedConditional("missing 'end'"))
        ));
    }

    #[test]
    fn test_rejects_bad_shapes() {
        for line in [
            "if true then if true then echo end end",
            "if true then echo A then echo B end",
            "if true then echo A else echo B else echo C end",
            "if true else echo A then echo B end",
            "if true then echo A end echo B",
            "if then echo A end",
            "if true then end",
            "if true then echo A else end",
        ] {
            assert!(parse(&tokens(line)).is_err(), "{} should be rejected", line);
        }
    }

    #[test]
    fn test_is_conditional() {
        assert!(is_conditional(&tokens("if a then b end")));
        assert!(!is_conditional(&tokens("echo if")));
        assert!(!is_conditional(&[]));
    }
}
