//! Output formats for a finished catalog run.

pub mod dbt_yaml;
pub mod json;
pub mod markdown;

use std::fmt;
use std::str::FromStr;

use crate::catalog::CatalogRun;
use crate::error::{Result, ScribeError};

/// Document format for the catalog file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Markdown,
    Json,
}

impl OutputFormat {
    pub fn render(self, run: &CatalogRun) -> Result<String> {
        match self {
            OutputFormat::Markdown => Ok(markdown::render(run)),
            OutputFormat::Json => json::render(run),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ScribeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "json" => Ok(OutputFormat::Json),
            other => Err(ScribeError::config(format!(
                "Unknown output format '{}'. Supported formats: markdown, json",
                other
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Markdown => write!(f, "markdown"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        assert_eq!("markdown".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
        assert_eq!("MD".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("html".parse::<OutputFormat>().is_err());
    }
}
