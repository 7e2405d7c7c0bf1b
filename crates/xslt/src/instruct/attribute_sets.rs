//! `xsl:attribute-set` and the `use-attribute-sets` attribute.
use crate::context::XPathContext;
use crate::error::{Location, Result};
use crate::expr::Expr;
use crate::slots::SlotManager;
use trellis_xdm::QName;

/// Index of an attribute set in its executable.
pub type AttributeSetId = usize;

/// The attribute sets named by a `use-attribute-sets` attribute.
#[derive(Debug, Clone, Default)]
pub struct UseAttributeSets {
    pub names: Vec<QName>,
    /// Every declaration of every named set, in expansion order. Filled in
    /// when the executable is built.
    pub targets: Vec<AttributeSetId>,
}

impl UseAttributeSets {
    pub fn new(names: Vec<QName>) -> Self {
        Self {
            names,
            targets: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Writes the attributes of every target set to the context's receiver.
    pub fn expand<'e>(&self, ctx: &XPathContext<'e>) -> Result<()> {
        let exec = ctx.executable();
        for &id in &self.targets {
            exec.attribute_set(id)?.expand(ctx)?;
        }
        Ok(())
    }
}

/// One `xsl:attribute-set` declaration.
#[derive(Debug, Clone)]
pub struct AttributeSet {
    pub id: AttributeSetId,
    pub name: QName,
    pub use_attribute_sets: UseAttributeSets,
    /// `xsl:attribute` instructions, evaluated with the caller's focus.
    pub body: Expr,
    pub slots: SlotManager,
    pub location: Option<Location>,
}

impl AttributeSet {
    pub fn new(name: QName, body: Expr) -> Self {
        Self {
            id: 0,
            name,
            use_attribute_sets: UseAttributeSets::default(),
            body,
            slots: SlotManager::new(),
            location: None,
        }
    }

    pub fn using(mut self, names: Vec<QName>) -> Self {
        self.use_attribute_sets = UseAttributeSets::new(names);
        self
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Expands the sets this one uses, then its own attributes, so that its
    /// own attributes win over inherited ones of the same name.
    pub fn expand<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<()> {
        self.use_attribute_sets.expand(ctx)?;
        let result = match self.slots.number_of_variables() {
            0 => self.body.process(ctx),
            n => {
                let mut c = ctx.clone();
                c.open_stack_frame(n);
                self.body.process(&c)
            }
        };
        match (result, &self.location) {
            (Err(err), Some(location)) => Err(err.with_location(location)),
            (result, _) => result,
        }
    }
}
