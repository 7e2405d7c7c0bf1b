//! # trellis
//!
//! The run-time core of an XSLT 2.0 processor.
//!
//! Stylesheets are assembled as instruction trees with
//! [`ExecutableBuilder`], then run against XML sources by a [`Transformer`]
//! configured through a [`TransformConfig`]. The data model lives in
//! [`xdm`], the runtime in [`xslt`].
//!
//! ```no_run
//! use trellis::{ExecutableBuilder, Expr, TemplateDefinition, TransformConfig};
//! use trellis::xdm::QName;
//!
//! let exec = ExecutableBuilder::new()
//!     .template(TemplateDefinition::named(QName::local("main"), Expr::string("hello")))
//!     .build()?;
//! let output = trellis::transform_to_string(&exec, None, r#"{"initial-template": "main"}"#)?;
//! assert_eq!(output, "hello");
//! # Ok::<(), trellis::TransformError>(())
//! ```

pub use trellis_xdm as xdm;
pub use trellis_xslt as xslt;

pub use trellis_xslt::{
    AttributeSet, CollectingMessageListener, Controller, Executable, ExecutableBuilder, Expr,
    LoggingMessageListener, MessageListener, Pattern, TemplateDefinition, TransformConfig,
    SequenceType, TransformResult, Transformer, UserFunction, UserFunctionParameter, XsltError,
};

use thiserror::Error;
use trellis_xdm::{XdmError, parse_document, serialize};

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Source document error: {0}")]
    Source(#[from] XdmError),

    #[error(transparent)]
    Xslt(#[from] XsltError),
}

/// Parses `source`, runs `executable` with the JSON-encoded
/// [`TransformConfig`] and serializes the result document.
pub fn transform_to_string(
    executable: &Executable,
    source: Option<&str>,
    config_json: &str,
) -> Result<String, TransformError> {
    let config = TransformConfig::from_json(config_json)?;
    let source = source.map(|text| parse_document(text, None)).transpose()?;
    log::debug!(
        "Transforming {} with {} templates",
        if source.is_some() { "a source document" } else { "no source" },
        executable.templates().len()
    );
    let result = Transformer::new(executable, config).transform(source.as_ref())?;
    Ok(serialize(&result).map_err(XsltError::from)?)
}
