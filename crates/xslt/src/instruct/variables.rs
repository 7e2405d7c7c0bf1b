//! Variables and parameters.
//!
//! Local variables (`xsl:variable` inside a sequence constructor) and
//! local parameters live in slots of the enclosing template's stack frame.
//! Global variables and stylesheet parameters live in the controller's
//! [`Bindery`](crate::bindery::Bindery) and are evaluated on first use.
use crate::context::{ParamBinding, XPathContext};
use crate::error::{Location, Result, XsltError};
use crate::expr::Expr;
use crate::params::ParamId;
use crate::slots::SlotManager;
use crate::types::{RoleLocator, SequenceType, convert_sequence};
use trellis_xdm::{AtomicValue, QName, Sequence};

/// `xsl:variable` within a sequence constructor, scoped over `action`.
#[derive(Debug, Clone)]
pub struct Let {
    pub name: QName,
    pub slot: usize,
    pub select: Box<Expr>,
    pub action: Box<Expr>,
    pub required_type: Option<SequenceType>,
}

impl Let {
    pub fn new(name: QName, select: Expr, action: Expr) -> Self {
        Self {
            name,
            slot: 0,
            select: Box::new(select),
            action: Box::new(action),
            required_type: None,
        }
    }

    pub fn with_type(mut self, required: SequenceType) -> Self {
        self.required_type = Some(required);
        self
    }

    /// Evaluates the value and stores it in the variable's slot.
    pub fn bind<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<()> {
        let mut value = self.select.evaluate(ctx)?;
        if let Some(required) = &self.required_type {
            value = convert_sequence(value, required, &RoleLocator::variable(&self.name.display_name()))?;
        }
        ctx.set_local_variable(self.slot, value);
        Ok(())
    }
}

/// `xsl:param` within a template.
#[derive(Debug, Clone)]
pub struct LocalParam {
    pub name: QName,
    pub slot: usize,
    pub id: ParamId,
    /// The `select` attribute or content; absent when neither is given.
    pub default: Option<Box<Expr>>,
    pub required: bool,
    pub tunnel: bool,
    pub required_type: Option<SequenceType>,
    pub location: Option<Location>,
}

impl LocalParam {
    pub fn new(name: QName) -> Self {
        Self {
            name,
            slot: 0,
            id: 0,
            default: None,
            required: false,
            tunnel: false,
            required_type: None,
            location: None,
        }
    }

    pub fn with_default(mut self, default: Expr) -> Self {
        self.default = Some(Box::new(default));
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn tunnel(mut self) -> Self {
        self.tunnel = true;
        self
    }

    pub fn with_type(mut self, required: SequenceType) -> Self {
        self.required_type = Some(required);
        self
    }

    fn convert(&self, value: Sequence) -> Result<Sequence> {
        match &self.required_type {
            Some(required) => convert_sequence(value, required, &RoleLocator::param(&self.name.display_name())),
            None => Ok(value),
        }
    }

    /// Binds the supplied value, or the default when none was supplied.
    pub fn process<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<()> {
        match ctx.use_local_parameter(self.id, self.slot, self.tunnel) {
            ParamBinding::SuppliedAndChecked => Ok(()),
            ParamBinding::Supplied => {
                if self.required_type.is_some() {
                    let value = self.convert(ctx.evaluate_local_variable(self.slot)?)?;
                    ctx.set_local_variable(self.slot, value);
                }
                Ok(())
            }
            ParamBinding::NotSupplied => {
                if self.required {
                    return Err(XsltError::dynamic(
                        "XTDE0700",
                        format!("No value supplied for required parameter ${}", self.name.display_name()),
                    ));
                }
                let value = match (&self.default, &self.required_type) {
                    (Some(default), _) => default.evaluate(ctx)?,
                    (None, Some(_)) => Sequence::empty(),
                    (None, None) => Sequence::singleton(AtomicValue::String(String::new())),
                };
                ctx.set_local_variable(self.slot, self.convert(value)?);
                Ok(())
            }
        }
    }
}

/// A top-level `xsl:variable` or `xsl:param`.
#[derive(Debug, Clone)]
pub struct GlobalVariable {
    pub name: QName,
    pub slot: usize,
    pub select: Expr,
    pub required_type: Option<SequenceType>,
    pub is_param: bool,
    /// `required="yes"` on a stylesheet parameter.
    pub required: bool,
    /// Local variables used by the initializer.
    pub slots: SlotManager,
    pub location: Option<Location>,
}

impl GlobalVariable {
    pub fn variable(name: QName, select: Expr) -> Self {
        Self {
            name,
            slot: 0,
            select,
            required_type: None,
            is_param: false,
            required: false,
            slots: SlotManager::new(),
            location: None,
        }
    }

    /// A stylesheet parameter whose default value is `select`.
    pub fn param(name: QName, select: Expr) -> Self {
        Self {
            is_param: true,
            ..Self::variable(name, select)
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_type(mut self, required: SequenceType) -> Self {
        self.required_type = Some(required);
        self
    }

    /// The value of the variable, computing it on first use. The
    /// initializer runs in a clean context with a frame of its own.
    pub fn evaluate_variable<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<Sequence> {
        let bindery = ctx.controller().bindery();
        if let Some(value) = bindery.global_variable_value(self.slot)? {
            return Ok(value);
        }
        if self.is_param {
            let required = self.required_type.unwrap_or(SequenceType::ANY);
            let supplied = bindery.use_global_parameter(&self.name, self.slot, &required)?;
            if let Some(value) = bindery.global_variable_value(self.slot)?.filter(|_| supplied) {
                return Ok(value);
            }
            if self.required {
                return Err(XsltError::dynamic(
                    "XTDE0050",
                    format!("No value supplied for required parameter ${}", self.name.display_name()),
                ));
            }
        }
        bindery.set_executing(self.slot, &self.name)?;
        log::debug!("Evaluating global variable ${}", self.name.display_name());
        let value = match self.compute(ctx) {
            Ok(value) => value,
            Err(err) => {
                bindery.set_not_executing(self.slot)?;
                return Err(match &self.location {
                    Some(location) => err.with_location(location),
                    None => err,
                });
            }
        };
        bindery.save_global_variable_value(self.slot, value)
    }

    fn compute<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<Sequence> {
        let mut c = ctx.new_clean_context();
        c.open_stack_frame(self.slots.number_of_variables());
        let value = self.select.evaluate(&c)?;
        match &self.required_type {
            Some(required) => convert_sequence(value, required, &RoleLocator::variable(&self.name.display_name())),
            None => Ok(value),
        }
    }
}
