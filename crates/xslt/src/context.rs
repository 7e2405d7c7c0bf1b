//! The dynamic evaluation context.
//!
//! An [`XPathContext`] is cheap to clone: the stack frame, parameter sets,
//! current group and output destination are shared handles. Instructions
//! that change part of the context (the focus, the frame, the receiver)
//! clone it first and modify the copy, so the caller's view is unaffected.
use crate::controller::Controller;
use crate::error::{Result, XsltError};
use crate::executable::Executable;
use crate::mode::{Mode, Rule};
use crate::params::{ParamId, ParameterSet};
use crate::slots::StackFrame;
use std::cell::RefCell;
use std::rc::Rc;
use trellis_xdm::{AtomicValue, Item, Receiver, Sequence, SequenceOutputter};

/// Shared handle to the current output destination.
pub type OutputRef = Rc<RefCell<dyn Receiver>>;

/// The context item with its position and, when known, the context size.
#[derive(Debug, Clone)]
pub struct Focus {
    pub item: Item,
    pub position: usize,
    pub last: Option<usize>,
}

impl Focus {
    pub fn new(item: Item, position: usize, last: Option<usize>) -> Self {
        Self { item, position, last }
    }

    /// A focus on a lone item.
    pub fn singleton(item: Item) -> Self {
        Self::new(item, 1, Some(1))
    }
}

/// The group being processed by `xsl:for-each-group`.
#[derive(Debug, Clone)]
pub struct CurrentGroup {
    pub items: Sequence,
    pub key: Option<AtomicValue>,
}

/// How a local parameter was bound by [`XPathContext::use_local_parameter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamBinding {
    NotSupplied,
    Supplied,
    SuppliedAndChecked,
}

#[derive(Clone)]
pub struct XPathContext<'e> {
    controller: Rc<Controller<'e>>,
    focus: Option<Focus>,
    frame: Rc<RefCell<StackFrame>>,
    local_params: Rc<ParameterSet>,
    tunnel_params: Rc<ParameterSet>,
    current_mode: Option<&'e Mode>,
    current_rule: Option<&'e Rule>,
    current_group: Option<Rc<CurrentGroup>>,
    receiver: OutputRef,
}

impl<'e> XPathContext<'e> {
    /// A top-level context writing to `receiver`, focused on the
    /// controller's initial context item.
    pub fn new(controller: Rc<Controller<'e>>, receiver: OutputRef) -> Self {
        let focus = controller.initial_context_item().cloned().map(Focus::singleton);
        Self {
            controller,
            focus,
            frame: Rc::new(RefCell::new(StackFrame::default())),
            local_params: Rc::new(ParameterSet::new()),
            tunnel_params: Rc::new(ParameterSet::new()),
            current_mode: None,
            current_rule: None,
            current_group: None,
            receiver,
        }
    }

    /// A context sharing nothing with this one but the controller and the
    /// receiver: used to evaluate global variables.
    pub fn new_clean_context(&self) -> Self {
        Self::new(Rc::clone(&self.controller), Rc::clone(&self.receiver))
    }

    /// The context a stylesheet function body runs in: a fresh frame of
    /// `slots` slots and nothing of the caller's focus, template rule,
    /// group or parameters.
    pub fn new_function_context(&self, slots: usize) -> Self {
        let mut c = self.clone();
        c.focus = None;
        c.local_params = Rc::new(ParameterSet::new());
        c.tunnel_params = Rc::new(ParameterSet::new());
        c.current_mode = None;
        c.current_rule = None;
        c.current_group = None;
        c.open_stack_frame(slots);
        c
    }

    pub fn controller(&self) -> &Rc<Controller<'e>> {
        &self.controller
    }

    pub fn executable(&self) -> &'e Executable {
        self.controller.executable()
    }

    // Focus

    pub fn focus(&self) -> Option<&Focus> {
        self.focus.as_ref()
    }

    pub fn set_focus(&mut self, focus: Option<Focus>) {
        self.focus = focus;
    }

    pub fn with_focus(&self, item: Item, position: usize, last: Option<usize>) -> Self {
        let mut c = self.clone();
        c.focus = Some(Focus::new(item, position, last));
        c
    }

    pub fn context_item(&self) -> Result<&Item> {
        self.focus
            .as_ref()
            .map(|f| &f.item)
            .ok_or_else(|| XsltError::dynamic("XPDY0002", "The context item is absent"))
    }

    pub fn position(&self) -> Result<usize> {
        self.focus
            .as_ref()
            .map(|f| f.position)
            .ok_or_else(|| XsltError::dynamic("XPDY0002", "The context item is absent"))
    }

    pub fn last(&self) -> Result<usize> {
        match &self.focus {
            Some(Focus { last: Some(n), .. }) => Ok(*n),
            Some(_) => Err(XsltError::dynamic(
                "XPDY0002",
                "The context size is not available here",
            )),
            None => Err(XsltError::dynamic("XPDY0002", "The context item is absent")),
        }
    }

    // Local variables

    /// Gives this context a fresh stack frame of `size` slots.
    pub fn open_stack_frame(&mut self, size: usize) {
        log::trace!("Opening stack frame with {} slots", size);
        self.frame = Rc::new(RefCell::new(StackFrame::new(size)));
    }

    /// Empties the current frame in place. Used before a tail call so that
    /// no values from the caller survive into the next iteration.
    pub fn clear_stack_frame(&self) {
        self.frame.borrow_mut().clear();
    }

    pub fn set_local_variable(&self, slot: usize, value: Sequence) {
        self.frame.borrow_mut().set(slot, value);
    }

    pub fn evaluate_local_variable(&self, slot: usize) -> Result<Sequence> {
        self.frame.borrow().get(slot).cloned().ok_or_else(|| {
            XsltError::dynamic(
                "XPDY0002",
                format!("Local variable in slot {} has no value", slot),
            )
        })
    }

    // Parameters

    pub fn local_parameters(&self) -> &Rc<ParameterSet> {
        &self.local_params
    }

    pub fn tunnel_parameters(&self) -> &Rc<ParameterSet> {
        &self.tunnel_params
    }

    pub fn set_local_parameters(&mut self, params: Rc<ParameterSet>) {
        self.local_params = params;
    }

    pub fn set_tunnel_parameters(&mut self, params: Rc<ParameterSet>) {
        self.tunnel_params = params;
    }

    /// Binds the supplied value of parameter `id`, if any, into `slot`.
    /// Tunnel parameters are looked up in the tunnel set only.
    pub fn use_local_parameter(&self, id: ParamId, slot: usize, tunnel: bool) -> ParamBinding {
        let params = if tunnel {
            &self.tunnel_params
        } else {
            &self.local_params
        };
        match params.index_of(id) {
            None => ParamBinding::NotSupplied,
            Some(index) => {
                self.set_local_variable(slot, params.value(index).clone());
                if params.is_type_checked(index) {
                    ParamBinding::SuppliedAndChecked
                } else {
                    ParamBinding::Supplied
                }
            }
        }
    }

    // Template state

    pub fn current_mode(&self) -> Option<&'e Mode> {
        self.current_mode
    }

    pub fn set_current_mode(&mut self, mode: Option<&'e Mode>) {
        self.current_mode = mode;
    }

    pub fn current_rule(&self) -> Option<&'e Rule> {
        self.current_rule
    }

    pub fn set_current_rule(&mut self, rule: Option<&'e Rule>) {
        self.current_rule = rule;
    }

    pub fn current_group(&self) -> Option<&Rc<CurrentGroup>> {
        self.current_group.as_ref()
    }

    pub fn set_current_group(&mut self, group: Option<Rc<CurrentGroup>>) {
        self.current_group = group;
    }

    // Output

    pub fn receiver(&self) -> &OutputRef {
        &self.receiver
    }

    pub fn set_receiver(&mut self, receiver: OutputRef) {
        self.receiver = receiver;
    }

    /// Runs `action` with output redirected into a fresh sequence, which is
    /// returned once the action completes.
    pub fn capture<F>(&self, action: F) -> Result<Sequence>
    where
        F: FnOnce(&XPathContext<'e>) -> Result<()>,
    {
        let base_uri = self.receiver.borrow().system_id();
        let outputter = Rc::new(RefCell::new(SequenceOutputter::new().with_base_uri(base_uri)));
        let target: OutputRef = outputter.clone();
        let mut c = self.clone();
        c.receiver = target;
        action(&c)?;
        let captured = std::mem::take(&mut *outputter.borrow_mut());
        Ok(captured.into_sequence())
    }
}
