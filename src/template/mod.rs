//! `{name}` placeholder substitution for request bodies and endpoints

pub mod body;
pub mod url;

use thiserror::Error;

pub use body::substitute;
pub use url::UrlTemplate;

/// Failure to expand a template
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("variable {0} does not exist in variable store")]
    MissingVariable(String),

    #[error("url is empty")]
    EmptyUrl,

    #[error("url '{template}': variable closing delimiter '}}' is missing after position {position}")]
    UnclosedBrace { template: String, position: usize },
}
