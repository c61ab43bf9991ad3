use crate::error::{BoxError, EngineError};
use serde_json::Value;

/// Compiles raw template text.
///
/// The engine is pluggable; [`PlaceholderEngine`] is installed by default.
pub trait TemplateEngine: Send + Sync {
    fn compile(&self, source: &str) -> Result<Box<dyn CompiledTemplate>, BoxError>;
}

impl<T: TemplateEngine + ?Sized> TemplateEngine for Box<T> {
    fn compile(&self, source: &str) -> Result<Box<dyn CompiledTemplate>, BoxError> {
        (**self).compile(source)
    }
}

/// A compiled template, applied to a model to produce output.
pub trait CompiledTemplate: Send + Sync {
    fn render(&self, model: &Value) -> Result<String, BoxError>;
}

/// Substitutes `{{ name }}` and `{{ a.b.c }}` placeholders with values from the model.
///
/// Strings are inserted as they are, missing values and `null` render as nothing, any
/// other value renders as its JSON text.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderEngine;

enum Piece {
    Text(String),
    Value(Vec<String>),
}

struct Placeholders {
    pieces: Vec<Piece>,
}

impl TemplateEngine for PlaceholderEngine {
    fn compile(&self, source: &str) -> Result<Box<dyn CompiledTemplate>, BoxError> {
        let mut pieces = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find("{{") {
            pieces.push(Piece::Text(rest[..start].to_string()));
            let offset = source.len() - rest.len() + start;
            let inner = &rest[start + 2..];
            let end = inner.find("}}").ok_or_else(|| EngineError::template(format!("unclosed placeholder at {offset}")))?;
            let key = inner[..end].trim();
            if key.is_empty() {
                return Err(EngineError::template(format!("empty placeholder at {offset}")).into());
            }
            pieces.push(Piece::Value(key.split('.').map(str::to_string).collect()));
            rest = &inner[end + 2..];
        }
        pieces.push(Piece::Text(rest.to_string()));

        Ok(Box::new(Placeholders { pieces }))
    }
}

impl CompiledTemplate for Placeholders {
    fn render(&self, model: &Value) -> Result<String, BoxError> {
        let mut output = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Text(text) => output.push_str(text),
                Piece::Value(path) => match path.iter().try_fold(model, |value, key| value.get(key)) {
                    None | Some(Value::Null) => {}
                    Some(Value::String(s)) => output.push_str(s),
                    Some(other) => output.push_str(&other.to_string()),
                },
            }
        }
        Ok(output)
    }
}
