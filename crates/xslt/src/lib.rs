//! # trellis-xslt
//!
//! The run-time core of an XSLT 2.0 processor: a compiled instruction tree
//! that evaluates in pull mode (iterating items) or push mode (writing
//! events to a [`Receiver`](trellis_xdm::Receiver)), with tail calls driven
//! by a trampoline, rule-based template dispatch and grouping.
//!
//! | Module | Contents |
//! |---|---|
//! | [`executable`] | the compiled stylesheet and its builder |
//! | [`controller`] | per-transformation state and the [`Transformer`] entry point |
//! | [`context`] | the dynamic context: focus, frames, parameters, current mode and group |
//! | [`expr`] | the expression tree, its XPath subset and the static rewrite pipeline |
//! | [`instruct`] | XSLT instructions, attribute sets and stylesheet functions |
//! | [`mode`] | modes and rule lookup |
//! | [`pattern`] | match patterns |
//! | [`tail_call`] | tail-call packages and the trampoline |
//! | [`bindery`] | global variable values |
//! | [`params`], [`slots`] | parameter sets, slot layouts and stack frames |
//! | [`sort`] | sort keys and comparers |
//! | [`types`] | sequence types and conversion rules |
//! | [`iter`] | the pull-mode iterator protocol |
//! | [`config`] | run-time options |

pub mod bindery;
pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod executable;
pub mod expr;
pub mod instruct;
pub mod iter;
pub mod mode;
pub mod params;
pub mod pattern;
pub mod slots;
pub mod sort;
pub mod tail_call;
pub mod types;

pub use config::TransformConfig;
pub use context::XPathContext;
pub use controller::{Controller, TransformResult, Transformer};
pub use error::{Location, Result, XsltError};
pub use executable::{Executable, ExecutableBuilder, TemplateDefinition};
pub use expr::Expr;
pub use instruct::attribute_sets::AttributeSet;
pub use instruct::message::{CollectingMessageListener, LoggingMessageListener, MessageListener};
pub use instruct::user_function::{UserFunction, UserFunctionParameter};
pub use pattern::Pattern;
pub use types::{Cardinality, ItemType, SequenceType};

#[cfg(test)]
pub(crate) mod testing {
    use crate::config::TransformConfig;
    use crate::context::{OutputRef, XPathContext};
    use crate::controller::Controller;
    use crate::executable::ExecutableBuilder;
    use std::cell::RefCell;
    use std::rc::Rc;
    use trellis_xdm::SequenceOutputter;

    /// Runs `f` with a context over an empty executable, writing to a
    /// sequence outputter.
    pub fn with_context<F: FnOnce(XPathContext<'_>)>(f: F) {
        let exec = ExecutableBuilder::new().build().unwrap();
        let controller = Rc::new(Controller::new(&exec, TransformConfig::default(), None));
        let out: OutputRef = Rc::new(RefCell::new(SequenceOutputter::new()));
        f(XPathContext::new(controller, out));
    }
}
