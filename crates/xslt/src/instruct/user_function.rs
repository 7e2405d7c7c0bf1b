//! Stylesheet functions (`xsl:function`).
//!
//! A [`UserFunction`] is a procedure like a template: it owns its body and
//! a [`SlotManager`], and every call runs in a frame of its own. The
//! parameters take the first slots of that frame, in declaration order.
use crate::context::XPathContext;
use crate::error::{Location, Result};
use crate::expr::Expr;
use crate::slots::SlotManager;
use crate::types::{RoleLocator, SequenceType, convert_sequence};
use trellis_xdm::{QName, Sequence};

/// Index of a function in its executable.
pub type FunctionId = usize;

/// One `xsl:param` of a stylesheet function.
#[derive(Debug, Clone)]
pub struct UserFunctionParameter {
    pub name: QName,
    pub slot: usize,
    pub required_type: Option<SequenceType>,
}

impl UserFunctionParameter {
    pub fn new(name: QName) -> Self {
        Self {
            name,
            slot: 0,
            required_type: None,
        }
    }

    pub fn with_type(mut self, required: SequenceType) -> Self {
        self.required_type = Some(required);
        self
    }
}

#[derive(Debug, Clone)]
pub struct UserFunction {
    pub name: QName,
    pub params: Vec<UserFunctionParameter>,
    pub result_type: Option<SequenceType>,
    pub body: Expr,
    pub slots: SlotManager,
    pub location: Option<Location>,
}

impl UserFunction {
    pub fn new(name: QName, params: Vec<UserFunctionParameter>, body: Expr) -> Self {
        Self {
            name,
            params,
            result_type: None,
            body,
            slots: SlotManager::new(),
            location: None,
        }
    }

    pub fn with_type(mut self, required: SequenceType) -> Self {
        self.result_type = Some(required);
        self
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// `name#arity`
    pub fn display_name(&self) -> String {
        format!("{}#{}", self.name.display_name(), self.arity())
    }

    /// Runs the function on already evaluated arguments. The body sees no
    /// focus, template rule, group or parameters of the caller.
    pub fn call<'e>(&'e self, args: Vec<Sequence>, ctx: &XPathContext<'e>) -> Result<Sequence> {
        let c = ctx.new_function_context(self.slots.number_of_variables());
        for (i, (param, value)) in self.params.iter().zip(args).enumerate() {
            let value = match &param.required_type {
                Some(required) => convert_sequence(
                    value,
                    required,
                    &RoleLocator::function_argument(&self.display_name(), i + 1),
                )?,
                None => value,
            };
            c.set_local_variable(param.slot, value);
        }
        log::trace!("Calling function {}", self.display_name());
        let result = self.body.evaluate(&c).and_then(|value| match &self.result_type {
            Some(required) => convert_sequence(value, required, &RoleLocator::function_result(&self.display_name())),
            None => Ok(value),
        });
        match (result, &self.location) {
            (Err(err), Some(location)) => Err(err.with_location(location)),
            (result, _) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{VariableBinding, VariableRef};
    use crate::testing::with_context;
    use trellis_xdm::{AtomicType, AtomicValue, Item};

    fn integer(n: i64) -> Sequence {
        Sequence::singleton(AtomicValue::Integer(n))
    }

    fn add() -> UserFunction {
        let mut f = UserFunction::new(
            QName::new("f", "urn:f", "add"),
            vec![
                UserFunctionParameter::new(QName::local("a")).with_type(SequenceType::single_atomic(AtomicType::Double)),
                UserFunctionParameter::new(QName::local("b")),
            ],
            Expr::empty(),
        );
        f.params[1].slot = 1;
        f.slots.allocate_slot(QName::local("a"));
        f.slots.allocate_slot(QName::local("b"));
        f
    }

    #[test]
    fn test_arguments_are_converted_into_slots() {
        let mut f = add();
        let mut a = VariableRef::new(QName::local("a"));
        a.binding = VariableBinding::Local(0);
        f.body = Expr::VariableRef(a);
        with_context(|ctx| {
            let out = f
                .call(vec![Sequence::singleton(AtomicValue::UntypedAtomic("1.5".into())), integer(2)], &ctx)
                .unwrap();
            assert!(matches!(out.first(), Some(Item::Atomic(AtomicValue::Double(d))) if *d == 1.5));
        });
    }

    #[test]
    fn test_bad_argument_and_result_types() {
        let f = add();
        let typed = add().with_type(SequenceType::single_atomic(AtomicType::Integer));
        with_context(|ctx| {
            let err = f.call(vec![Sequence::singleton(AtomicValue::from("x")), integer(1)], &ctx).unwrap_err();
            assert_eq!(err.code(), "XPTY0004");
            let err = typed.call(vec![integer(1), integer(1)], &ctx).unwrap_err();
            assert_eq!(err.code(), "XPTY0004");
        });
    }

    #[test]
    fn test_body_has_no_focus() {
        let mut f = add();
        f.body = Expr::ContextItem;
        with_context(|ctx| {
            let ctx = ctx.with_focus(Item::from(AtomicValue::Integer(1)), 1, Some(1));
            let err = f.call(vec![integer(1), integer(2)], &ctx).unwrap_err();
            assert_eq!(err.code(), "XPDY0002");
        });
    }

    #[test]
    fn test_display_name_includes_arity() {
        assert_eq!(add().display_name(), "f:add#2");
    }
}
