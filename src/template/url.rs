//! Endpoint templates
//!
//! Unlike body templates, a URL may embed any number of `{name}` references
//! anywhere in the string. Each distinct name is recorded once, in the order
//! it first appears, and every occurrence is replaced at render time.
//! Rendering walks the parsed pieces once, so a value that itself looks like
//! `{name}` is copied verbatim.

use super::TemplateError;
use crate::value::VariableStore;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Variable(String),
}

/// A parsed endpoint template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    pieces: Vec<Piece>,
    variables: Vec<String>,
}

impl UrlTemplate {
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        if template.is_empty() {
            return Err(TemplateError::EmptyUrl);
        }

        let mut pieces = Vec::new();
        let mut variables: Vec<String> = Vec::new();
        let mut rest = template;
        let mut offset = 0;

        while let Some(open) = rest.find('{') {
            let close = rest[open..]
                .find('}')
                .map(|i| open + i)
                .ok_or_else(|| TemplateError::UnclosedBrace {
                    template: template.to_string(),
                    position: offset + open,
                })?;

            if open > 0 {
                pieces.push(Piece::Literal(rest[..open].to_string()));
            }
            let name = &rest[open + 1..close];
            if name.is_empty() {
                pieces.push(Piece::Literal("{}".to_string()));
            } else {
                if !variables.iter().any(|v| v == name) {
                    variables.push(name.to_string());
                }
                pieces.push(Piece::Variable(name.to_string()));
            }

            offset += close + 1;
            rest = &rest[close + 1..];
        }

        if !rest.is_empty() {
            pieces.push(Piece::Literal(rest.to_string()));
        }

        Ok(Self { pieces, variables })
    }

    /// Distinct variable names, in first-seen order
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Expand the template with values from `store`
    ///
    /// Every referenced variable must exist; nothing is rendered otherwise.
    pub fn render(&self, store: &VariableStore) -> Result<String, TemplateError> {
        for name in &self.variables {
            if store.get(name).is_none() {
                return Err(TemplateError::MissingVariable(name.clone()));
            }
        }

        let mut result = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => result.push_str(text),
                Piece::Variable(name) => {
                    let value = store
                        .get(name)
                        .ok_or_else(|| TemplateError::MissingVariable(name.clone()))?;
                    result.push_str(&value.to_string());
                }
            }
        }
        Ok(result)
    }
}
