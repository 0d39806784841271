// Shared input handling for the bootlisp binaries

use clap::ValueEnum;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use tracing::debug;

/// Where the batch driver reads its program from
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputSource {
    /// Evaluate a string given on the command line
    String,
    /// Evaluate a file
    File,
    /// Read from stdin pipe
    Pipe,
}

#[derive(Debug, Clone)]
pub struct InputConfig {
    pub source: InputSource,
    pub file_path: Option<PathBuf>,
    pub string_content: Option<String>,
}

impl InputConfig {
    pub fn from_file(file_path: PathBuf) -> Self {
        Self {
            source: InputSource::File,
            file_path: Some(file_path),
            string_content: None,
        }
    }

    pub fn from_string(content: String) -> Self {
        Self {
            source: InputSource::String,
            file_path: None,
            string_content: Some(content),
        }
    }

    pub fn from_pipe() -> Self {
        Self {
            source: InputSource::Pipe,
            file_path: None,
            string_content: None,
        }
    }
}

/// Program text plus a name for diagnostics
#[derive(Debug)]
pub struct InputContent {
    pub content: String,
    pub source_name: String,
}

/// Errors that can occur during input handling
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("--file argument required when using --input file")]
    MissingFileArgument,

    #[error("--string argument required when using --input string")]
    MissingStringArgument,

    #[error("Error reading file '{}': {error}", .path.display())]
    FileReadError {
        path: PathBuf,
        #[source]
        error: io::Error,
    },

    #[error("Error reading from stdin: {0}")]
    StdinReadError(#[source] io::Error),
}

pub fn read_input_content(config: &InputConfig) -> Result<InputContent, InputError> {
    match config.source {
        InputSource::File => {
            let file_path = config
                .file_path
                .as_ref()
                .ok_or(InputError::MissingFileArgument)?;
            debug!("reading from file: {}", file_path.display());
            let content = fs::read_to_string(file_path).map_err(|e| InputError::FileReadError {
                path: file_path.clone(),
                error: e,
            })?;
            Ok(InputContent {
                content,
                source_name: file_path.to_string_lossy().to_string(),
            })
        }

        InputSource::String => {
            let content = config
                .string_content
                .clone()
                .ok_or(InputError::MissingStringArgument)?;
            debug!("evaluating string input ({} bytes)", content.len());
            Ok(InputContent {
                content,
                source_name: "<string>".to_string(),
            })
        }

        InputSource::Pipe => {
            debug!("reading from stdin pipe");
            let mut content = String::new();
            io::stdin()
                .lock()
                .read_to_string(&mut content)
                .map_err(InputError::StdinReadError)?;
            Ok(InputContent {
                content,
                source_name: "<stdin>".to_string(),
            })
        }
    }
}

/// Validate input arguments for a given source type
pub fn validate_input_args(
    source: InputSource,
    file_path: &Option<PathBuf>,
    string_content: &Option<String>,
) -> Result<(), InputError> {
    match source {
        InputSource::File if file_path.is_none() => Err(InputError::MissingFileArgument),
        InputSource::String if string_content.is_none() => Err(InputError::MissingStringArgument),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_files_and_strings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "(+ 1 2)").unwrap();
        let input = read_input_content(&InputConfig::from_file(file.path().to_path_buf())).unwrap();
        assert_eq!(input.content, "(+ 1 2)");

        let input = read_input_content(&InputConfig::from_string("x".to_string())).unwrap();
        assert_eq!(input.source_name, "<string>");
    }

    #[test]
    fn missing_arguments_are_reported() {
        assert!(matches!(
            validate_input_args(InputSource::File, &None, &None),
            Err(InputError::MissingFileArgument)
        ));
        assert!(matches!(
            validate_input_args(InputSource::String, &None, &None),
            Err(InputError::MissingStringArgument)
        ));
        assert!(validate_input_args(InputSource::Pipe, &None, &None).is_ok());
        let err = read_input_content(&InputConfig::from_file("/nonexistent/x.bl".into())).unwrap_err();
        assert!(matches!(err, InputError::FileReadError { .. }));
    }
}
