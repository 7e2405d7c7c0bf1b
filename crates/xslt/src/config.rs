//! Run-time options for a transformation.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use trellis_xdm::{AtomicValue, QName, Sequence};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TransformConfig {
    /// Clark name (`{uri}local`) or local name of the initial mode.
    pub initial_mode: Option<String>,
    /// Start by calling this named template instead of applying templates.
    pub initial_template: Option<String>,
    /// Supplied global parameters, bound as `xs:untypedAtomic`.
    pub parameters: BTreeMap<String, String>,
    /// Base URI of the principal result document.
    pub base_output_uri: Option<String>,
    /// Treat every `xsl:message` as terminating.
    pub terminate_on_message: bool,
}

impl TransformConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_initial_mode(mut self, mode: impl Into<String>) -> Self {
        self.initial_mode = Some(mode.into());
        self
    }

    pub fn with_initial_template(mut self, name: impl Into<String>) -> Self {
        self.initial_template = Some(name.into());
        self
    }

    /// The supplied parameters keyed by expanded name.
    pub fn supplied_parameters(&self) -> HashMap<QName, Sequence> {
        self.parameters
            .iter()
            .map(|(name, value)| {
                (
                    QName::from_clark(name),
                    Sequence::singleton(AtomicValue::UntypedAtomic(value.clone())),
                )
            })
            .collect()
    }
}
