use std::fmt;

pub type CadenzaResult<T> = Result<T, CadenzaError>;

#[derive(thiserror::Error, Debug)]
pub enum CadenzaError {
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("compile error at line {line}: {message}")]
    Compile { line: usize, message: String },

    #[error("load error: {0}")]
    Load(String),

    #[error("serialization error: {0}")]
    Binary(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CadenzaError {
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }

    pub fn compile(line: usize, message: impl Into<String>) -> Self {
        Self::Compile {
            line,
            message: message.into(),
        }
    }

    pub fn load(msg: impl Into<String>) -> Self {
        Self::Load(msg.into())
    }

    pub fn binary(msg: impl Into<String>) -> Self {
        Self::Binary(msg.into())
    }

    /// Source line the error is tagged with, if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Parse { line, .. } | Self::Compile { line, .. } => Some(*line),
            Self::Load(_) | Self::Binary(_) | Self::Other(_) => None,
        }
    }
}

/// All errors collected from one compile invocation. Lexical errors are
/// gathered across the whole file; the first fatal compile error ends the run.
#[derive(Debug)]
pub struct CompileFailure {
    pub errors: Vec<CadenzaError>,
}

impl CompileFailure {
    pub fn new(errors: Vec<CadenzaError>) -> Self {
        debug_assert!(!errors.is_empty());
        Self { errors }
    }
}

impl fmt::Display for CompileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "compilation failed with {} error(s):", self.errors.len())?;
        for e in &self.errors {
            writeln!(f, "  {e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileFailure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            CadenzaError::parse(3, "x")
                .to_string()
                .contains("parse error at line 3:")
        );
        assert!(
            CadenzaError::compile(7, "x")
                .to_string()
                .contains("compile error at line 7:")
        );
        assert!(CadenzaError::load("x").to_string().contains("load error:"));
        assert!(
            CadenzaError::binary("x")
                .to_string()
                .contains("serialization error:")
        );
    }

    #[test]
    fn failure_lists_every_error() {
        let fail = CompileFailure::new(vec![
            CadenzaError::parse(3, "unterminated string"),
            CadenzaError::parse(7, "bad timestamp"),
        ]);
        let s = fail.to_string();
        assert!(s.contains("2 error(s)"));
        assert!(s.contains("line 3"));
        assert!(s.contains("line 7"));
    }
}
