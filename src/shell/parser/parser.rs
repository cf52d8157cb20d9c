use log::debug;

use super::ast::{Command, Pipeline, Redirections, Stage};
use super::redirect;
use crate::shell::error::ShellError;

pub const PIPE: &str = "|";
pub const BACKGROUND: &str = "&";

pub struct Parser<'a> {
    tokens: &'a [String],
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [String]) -> Self {
        Parser { tokens }
    }

    pub fn parse_pipeline(&self) -> Result<Pipeline, ShellError> {
        let (body, background) = self.strip_background()?;
        if body.is_empty() {
            return Err(ShellError::EmptyStage);
        }

        let spans: Vec<&[String]> = body.split(|token| token == PIPE).collect();
        let count = spans.len();
        let mut stages = Vec::with_capacity(count);
        for (index, span) in spans.into_iter().enumerate() {
            let stage = self.parse_stage(span)?;
            // 中间的 stage 的 stdin/stdout 只能是管道
            if index > 0 && stage.redirections.input.is_some() {
                return Err(ShellError::InteriorRedirection(index));
            }
            if index + 1 < count && stage.redirections.output.is_some() {
                return Err(ShellError::InteriorRedirection(index));
            }
            stages.push(stage);
        }

        Ok(Pipeline { stages, background })
    }

    /// `&` 只能作为最后一个 token 出现
    fn strip_background(&self) -> Result<(&'a [String], bool), ShellError> {
        let (body, background) = match self.tokens.split_last() {
            Some((last, rest)) if last == BACKGROUND => (rest, true),
            _ => (self.tokens, false),
        };
        if body.iter().any(|token| token == BACKGROUND) {
            return Err(ShellError::MisplacedBackground);
        }
        Ok((body, background))
    }

    fn parse_stage(&self, span: &[String]) -> Result<Stage, ShellError> {
        let split_at = span
            .iter()
            .position(|token| redirect::is_operator(token))
            .unwrap_or(span.len());

        let command =
            Command::new(span[..split_at].to_vec()).ok_or(ShellError::EmptyStage)?;

        let redirections = if split_at < span.len() {
            let resolved = redirect::resolve(span, split_at)?;
            debug!("`{}` 的重定向占用 {} 个 token", command, resolved.consumed);
            resolved.redirections
        } else {
            Redirections::default()
        };

        Ok(Stage {
            command,
            redirections,
        })
    }
}

pub fn split(tokens: &[String]) -> Result<Pipeline, ShellError> {
    Parser::new(tokens).parse_pipeline()
}
