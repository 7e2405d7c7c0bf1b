//! Tail calls and the trampoline that drives them.
//!
//! An instruction in tail position does not invoke the next template
//! itself. It returns a [`TailCall`] describing the invocation, and the
//! nearest driving loop ([`drive`]) performs it. Only one package is alive
//! at a time, so recursion depth costs heap, not native stack.
use crate::context::XPathContext;
use crate::error::Result;
use crate::instruct::templates::{Template, apply_templates};
use crate::mode::Mode;
use crate::params::ParameterSet;
use std::rc::Rc;
use trellis_xdm::Sequence;

/// A template invocation whose context (frame, parameters, focus) is
/// already prepared.
pub struct CallTemplatePackage<'e> {
    pub template: &'e Template,
    pub context: XPathContext<'e>,
}

/// An `xsl:apply-templates` over an already selected sequence.
pub struct ApplyTemplatesPackage<'e> {
    pub selection: Sequence,
    pub mode: &'e Mode,
    pub params: Rc<ParameterSet>,
    pub tunnel_params: Rc<ParameterSet>,
    pub context: XPathContext<'e>,
}

pub enum TailCall<'e> {
    CallTemplate(CallTemplatePackage<'e>),
    ApplyTemplates(ApplyTemplatesPackage<'e>),
}

impl<'e> TailCall<'e> {
    /// Performs one step, returning the next pending call if the step itself
    /// ended in tail position.
    pub fn process_leaving_tail(self) -> Result<Option<TailCall<'e>>> {
        match self {
            TailCall::CallTemplate(package) => package.template.apply_leaving_tail(&package.context),
            TailCall::ApplyTemplates(package) => apply_templates(
                &package.selection,
                package.mode,
                package.params,
                package.tunnel_params,
                &package.context,
            ),
        }
    }
}

/// Runs `tail_call` and every call it leaves behind until none remain.
pub fn drive(tail_call: Option<TailCall<'_>>) -> Result<()> {
    let mut pending = tail_call;
    while let Some(call) = pending {
        log::trace!(
            "Trampoline step: {}",
            match &call {
                TailCall::CallTemplate(p) => p.template.display_name(),
                TailCall::ApplyTemplates(_) => "apply-templates".to_string(),
            }
        );
        pending = call.process_leaving_tail()?;
    }
    Ok(())
}
