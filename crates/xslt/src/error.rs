use thiserror::Error;
use trellis_xdm::XdmError;

/// Where an instruction came from in the stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub module: Option<String>,
    pub line: usize,
    pub col: usize,
}

impl Location {
    pub fn new(line: usize, col: usize) -> Self {
        Self {
            module: None,
            line,
            col,
        }
    }

    pub fn in_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.module {
            Some(m) => write!(f, "{} line {}, column {}", m, self.line, self.col),
            None => write!(f, "line {}, column {}", self.line, self.col),
        }
    }
}

impl From<(usize, usize)> for Location {
    fn from((line, col): (usize, usize)) -> Self {
        Location::new(line, col)
    }
}

fn at(location: &Option<Location>) -> String {
    location
        .as_ref()
        .map(|l| format!(" at {}", l))
        .unwrap_or_default()
}

/// Every failure a transformation can end with.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum XsltError {
    #[error("Dynamic error [{code}]: {message}{}", at(.location))]
    Dynamic {
        code: String,
        message: String,
        location: Option<Location>,
    },

    #[error("Type error [{code}]: {message}{}", at(.location))]
    Type {
        code: String,
        message: String,
        location: Option<Location>,
    },

    #[error("Static error [{code}]: {message}")]
    Static { code: String, message: String },

    #[error("Circular definition of ${name}{}", at(.location))]
    Circularity {
        name: String,
        location: Option<Location>,
    },

    #[error("Processing terminated by xsl:message: {message}")]
    Terminate { message: String },
}

impl XsltError {
    pub fn dynamic(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dynamic {
            code: code.into(),
            message: message.into(),
            location: None,
        }
    }

    pub fn type_error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Type {
            code: code.into(),
            message: message.into(),
            location: None,
        }
    }

    pub fn static_error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Static {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn circularity(name: impl Into<String>) -> Self {
        Self::Circularity {
            name: name.into(),
            location: None,
        }
    }

    pub fn terminate(message: impl Into<String>) -> Self {
        Self::Terminate {
            message: message.into(),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            XsltError::Dynamic { code, .. }
            | XsltError::Type { code, .. }
            | XsltError::Static { code, .. } => code,
            XsltError::Circularity { .. } => "XTDE0640",
            XsltError::Terminate { .. } => "XTMM9000",
        }
    }

    pub fn is_type_error(&self) -> bool {
        matches!(self, XsltError::Type { .. })
    }

    pub fn is_static_error(&self) -> bool {
        matches!(self, XsltError::Static { .. })
    }

    pub fn is_termination(&self) -> bool {
        matches!(self, XsltError::Terminate { .. })
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            XsltError::Dynamic { location, .. }
            | XsltError::Type { location, .. }
            | XsltError::Circularity { location, .. } => location.as_ref(),
            _ => None,
        }
    }

    /// Attaches `loc` unless a location is already present.
    pub fn with_location(mut self, loc: &Location) -> Self {
        match &mut self {
            XsltError::Dynamic { location, .. }
            | XsltError::Type { location, .. }
            | XsltError::Circularity { location, .. } => {
                if location.is_none() {
                    *location = Some(loc.clone());
                }
            }
            XsltError::Static { .. } | XsltError::Terminate { .. } => {}
        }
        self
    }
}

impl From<XdmError> for XsltError {
    fn from(err: XdmError) -> Self {
        let code = err.code();
        let message = match &err {
            XdmError::NoOpenStartTag { message, .. } | XdmError::Conversion { message, .. } => {
                message.clone()
            }
            other => other.to_string(),
        };
        if code == "XPTY0004" {
            XsltError::type_error(code, message)
        } else {
            XsltError::dynamic(code, message)
        }
    }
}

pub type Result<T> = std::result::Result<T, XsltError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_location_wins() {
        let err = XsltError::dynamic("XTDE0820", "bad name")
            .with_location(&Location::new(3, 7))
            .with_location(&Location::new(9, 1));
        assert_eq!(err.location(), Some(&Location::new(3, 7)));
        assert!(err.to_string().ends_with("at line 3, column 7"));
    }

    #[test]
    fn test_termination_is_not_located() {
        let err = XsltError::terminate("stop").with_location(&Location::new(1, 1));
        assert!(err.is_termination());
        assert!(err.location().is_none());
        assert_eq!(err.code(), "XTMM9000");
    }

    #[test]
    fn test_xdm_errors_map_to_codes() {
        let err: XsltError = XdmError::attribute_after_children("x").into();
        assert_eq!(err.code(), "XTDE0410");
        let err: XsltError = XdmError::type_mismatch("no").into();
        assert!(err.is_type_error());
    }

    #[test]
    fn test_circularity_display() {
        let err = XsltError::circularity("a");
        assert_eq!(err.to_string(), "Circular definition of $a");
        assert_eq!(err.code(), "XTDE0640");
    }
}
