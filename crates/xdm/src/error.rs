use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum XdmError {
    #[error("[{code}] {message}")]
    NoOpenStartTag { code: &'static str, message: String },

    #[error("Invalid lexical QName: '{0}'")]
    InvalidQName(String),

    #[error("[{code}] {message}")]
    Conversion { code: &'static str, message: String },

    #[error("Unbalanced receiver events: {0}")]
    Unbalanced(String),

    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl XdmError {
    /// Attribute or namespace written after child content of an element.
    pub fn attribute_after_children(name: &str) -> Self {
        Self::NoOpenStartTag {
            code: "XTDE0410",
            message: format!(
                "Cannot create attribute or namespace node '{}' after children of the containing element",
                name
            ),
        }
    }

    /// Attribute or namespace written directly to a document node.
    pub fn attribute_on_document(name: &str) -> Self {
        Self::NoOpenStartTag {
            code: "XTDE0420",
            message: format!(
                "Cannot attach attribute or namespace node '{}' to a document node",
                name
            ),
        }
    }

    pub fn cast(message: impl Into<String>) -> Self {
        Self::Conversion {
            code: "FORG0001",
            message: message.into(),
        }
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::Conversion {
            code: "XPTY0004",
            message: message.into(),
        }
    }

    /// The error code carried by this error, where one exists.
    pub fn code(&self) -> &'static str {
        match self {
            XdmError::NoOpenStartTag { code, .. } | XdmError::Conversion { code, .. } => code,
            XdmError::InvalidQName(_) => "FORG0001",
            XdmError::Unbalanced(_) => "XTDE0410",
            XdmError::XmlParse(_) => "FODC0002",
            XdmError::Serialization(_) => "SEPM0016",
        }
    }
}

impl From<roxmltree::Error> for XdmError {
    fn from(err: roxmltree::Error) -> Self {
        XdmError::XmlParse(err.to_string())
    }
}

impl From<quick_xml::Error> for XdmError {
    fn from(err: quick_xml::Error) -> Self {
        XdmError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for XdmError {
    fn from(err: std::io::Error) -> Self {
        XdmError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, XdmError>;
