//! Per-transformation state and the entry point that runs a transformation.
use crate::bindery::Bindery;
use crate::config::TransformConfig;
use crate::context::{OutputRef, XPathContext};
use crate::error::{Result, XsltError};
use crate::executable::Executable;
use crate::instruct::message::{LoggingMessageListener, MessageListener};
use crate::instruct::templates::apply_templates;
use crate::params::ParameterSet;
use crate::tail_call::drive;
use std::cell::{OnceCell, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;
use trellis_xdm::{Item, NodeHandle, QName, Receiver, Sequence, TreeBuilder};

/// State shared by every context of one transformation: the executable,
/// the run-time options, global variable values, the message sink and the
/// secondary result documents.
pub struct Controller<'e> {
    executable: &'e Executable,
    config: TransformConfig,
    initial_context_item: Option<Item>,
    bindery: OnceCell<Bindery>,
    message_listener: Rc<dyn MessageListener>,
    output_uris: RefCell<HashSet<String>>,
    result_documents: RefCell<BTreeMap<String, NodeHandle>>,
}

impl<'e> Controller<'e> {
    pub fn new(executable: &'e Executable, config: TransformConfig, initial_context_item: Option<Item>) -> Self {
        Self {
            executable,
            config,
            initial_context_item,
            bindery: OnceCell::new(),
            message_listener: Rc::new(LoggingMessageListener),
            output_uris: RefCell::new(HashSet::new()),
            result_documents: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn with_message_listener(mut self, listener: Rc<dyn MessageListener>) -> Self {
        self.message_listener = listener;
        self
    }

    pub fn executable(&self) -> &'e Executable {
        self.executable
    }

    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    pub fn initial_context_item(&self) -> Option<&Item> {
        self.initial_context_item.as_ref()
    }

    /// Global variable values, created on first use from the supplied
    /// stylesheet parameters.
    pub fn bindery(&self) -> &Bindery {
        self.bindery.get_or_init(|| {
            Bindery::new(self.executable.global_count(), self.config.supplied_parameters())
        })
    }

    pub fn message_listener(&self) -> &dyn MessageListener {
        self.message_listener.as_ref()
    }

    /// `href` made absolute against the base output URI, when there is one.
    pub fn resolve_output_uri(&self, href: &str) -> String {
        let base = self
            .config
            .base_output_uri
            .as_deref()
            .and_then(|base| url::Url::parse(base).ok());
        match base.and_then(|base| base.join(href).ok()) {
            Some(uri) => uri.to_string(),
            None => href.to_string(),
        }
    }

    /// Reserves the output URI for `href`. Each URI can be written once.
    pub fn claim_output_uri(&self, href: &str) -> Result<String> {
        let uri = self.resolve_output_uri(href);
        if !self.output_uris.borrow_mut().insert(uri.clone()) {
            return Err(XsltError::dynamic(
                "XTDE1490",
                format!("Cannot write more than one result document to the same URI: {}", uri),
            ));
        }
        Ok(uri)
    }

    pub fn add_result_document(&self, uri: String, document: NodeHandle) {
        self.result_documents.borrow_mut().insert(uri, document);
    }

    pub fn result_document_count(&self) -> usize {
        self.output_uris.borrow().len()
    }

    pub fn take_result_documents(&self) -> BTreeMap<String, NodeHandle> {
        std::mem::take(&mut *self.result_documents.borrow_mut())
    }
}

/// Everything a transformation produced.
#[derive(Debug)]
pub struct TransformResult {
    pub principal: NodeHandle,
    /// Documents written by `xsl:result-document`, keyed by absolute URI.
    pub result_documents: BTreeMap<String, NodeHandle>,
}

/// Runs an [`Executable`] against a source tree and builds the principal
/// result document.
pub struct Transformer<'e> {
    executable: &'e Executable,
    config: TransformConfig,
    message_listener: Option<Rc<dyn MessageListener>>,
}

impl<'e> Transformer<'e> {
    pub fn new(executable: &'e Executable, config: TransformConfig) -> Self {
        Self {
            executable,
            config,
            message_listener: None,
        }
    }

    pub fn with_message_listener(mut self, listener: Rc<dyn MessageListener>) -> Self {
        self.message_listener = Some(listener);
        self
    }

    /// Transforms `source`, starting either at the configured initial
    /// template or by applying templates to `source` in the initial mode.
    pub fn transform(&self, source: Option<&NodeHandle>) -> Result<NodeHandle> {
        Ok(self.transform_with_results(source)?.principal)
    }

    /// Like [`Transformer::transform`], also returning the documents
    /// written by `xsl:result-document`.
    pub fn transform_with_results(&self, source: Option<&NodeHandle>) -> Result<TransformResult> {
        let exec = self.executable;
        let mut controller = Controller::new(exec, self.config.clone(), source.cloned().map(Item::Node));
        if let Some(listener) = &self.message_listener {
            controller = controller.with_message_listener(Rc::clone(listener));
        }
        let controller = Rc::new(controller);
        let builder = Rc::new(RefCell::new(
            TreeBuilder::new().with_base_uri(self.config.base_output_uri.clone()),
        ));
        let out: OutputRef = builder.clone();
        builder.borrow_mut().start_document()?;
        self.run(Rc::clone(&controller), out, source)?;
        builder.borrow_mut().end_document()?;
        let tree = std::mem::take(&mut *builder.borrow_mut());
        Ok(TransformResult {
            principal: tree.finish()?,
            result_documents: controller.take_result_documents(),
        })
    }

    fn run(&self, controller: Rc<Controller<'e>>, out: OutputRef, source: Option<&NodeHandle>) -> Result<()> {
        let exec = self.executable;
        let mut ctx = XPathContext::new(controller, out);
        if let Some(name) = &self.config.initial_template {
            let name = QName::from_clark(name);
            let template = exec.named_template(&name).ok_or_else(|| {
                XsltError::dynamic(
                    "XTDE0040",
                    format!("The initial template {} does not exist", name.display_name()),
                )
            })?;
            log::debug!("Starting transformation at template {}", template.display_name());
            ctx.open_stack_frame(template.slots.number_of_variables());
            return template.apply(&ctx);
        }
        let Some(source) = source else {
            return Err(XsltError::dynamic(
                "XTDE0040",
                "Either a source document or an initial template must be supplied",
            ));
        };
        let mode_name = self.config.initial_mode.as_deref().map(QName::from_clark);
        let mode = exec.mode(mode_name.as_ref()).ok_or_else(|| {
            XsltError::dynamic(
                "XTDE0045",
                format!(
                    "The initial mode {} does not exist",
                    mode_name.as_ref().map(QName::display_name).unwrap_or_default()
                ),
            )
        })?;
        log::debug!("Starting transformation in mode {}", mode.display_name());
        let selection = Sequence::singleton(Item::Node(source.clone()));
        let empty = Rc::new(ParameterSet::new());
        drive(apply_templates(&selection, mode, Rc::clone(&empty), empty, &ctx)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executable::{ExecutableBuilder, TemplateDefinition};
    use crate::expr::Expr;
    use crate::instruct::message::CollectingMessageListener;
    use crate::instruct::variables::GlobalVariable;
    use crate::pattern::Pattern;
    use trellis_xdm::{StaticNamespaces, parse_document, serialize};

    #[test]
    fn test_initial_template() {
        let exec = ExecutableBuilder::new()
            .template(TemplateDefinition::named(QName::local("main"), Expr::string("hello")))
            .build()
            .unwrap();
        let config = TransformConfig::default().with_initial_template("main");
        let result = Transformer::new(&exec, config).transform(None).unwrap();
        assert_eq!(result.string_value(), "hello");
    }

    #[test]
    fn test_missing_entry_points() {
        let exec = ExecutableBuilder::new().build().unwrap();
        let no_template = TransformConfig::default().with_initial_template("nope");
        assert_eq!(Transformer::new(&exec, no_template).transform(None).unwrap_err().code(), "XTDE0040");
        let source = parse_document("<a/>", None).unwrap();
        let no_mode = TransformConfig::default().with_initial_mode("m");
        assert_eq!(
            Transformer::new(&exec, no_mode).transform(Some(&source)).unwrap_err().code(),
            "XTDE0045"
        );
    }

    #[test]
    fn test_apply_templates_in_initial_mode() {
        let ns = StaticNamespaces::new();
        let exec = ExecutableBuilder::new()
            .template(
                TemplateDefinition::matching(Pattern::parse("b", &ns).unwrap(), Expr::string("B"))
                    .in_mode(QName::local("m")),
            )
            .build()
            .unwrap();
        let source = parse_document("<a>x<b/>y</a>", None).unwrap();
        let config = TransformConfig::default().with_initial_mode("m");
        let result = Transformer::new(&exec, config).transform(Some(&source)).unwrap();
        assert_eq!(serialize(&result).unwrap(), "xBy");
    }

    #[test]
    fn test_supplied_parameter() {
        let exec = ExecutableBuilder::new()
            .global(GlobalVariable::param(QName::local("p"), Expr::string("default")))
            .template(TemplateDefinition::named(QName::local("main"), Expr::xpath("$p").unwrap()))
            .build()
            .unwrap();
        let config = TransformConfig::default()
            .with_initial_template("main")
            .with_parameter("p", "given");
        let result = Transformer::new(&exec, config).transform(None).unwrap();
        assert_eq!(result.string_value(), "given");
    }

    #[test]
    fn test_output_uris_resolve_against_base() {
        let exec = ExecutableBuilder::new().build().unwrap();
        let config = TransformConfig {
            base_output_uri: Some("file:///out/main.xml".to_string()),
            ..TransformConfig::default()
        };
        let controller = Controller::new(&exec, config, None);
        assert_eq!(controller.claim_output_uri("part1.xml").unwrap(), "file:///out/part1.xml");
        assert_eq!(controller.claim_output_uri("part1.xml").unwrap_err().code(), "XTDE1490");
        assert_eq!(
            controller.claim_output_uri("file:///out/part1.xml").unwrap_err().code(),
            "XTDE1490"
        );
        assert_eq!(controller.result_document_count(), 1);
        let plain = Controller::new(&exec, TransformConfig::default(), None);
        assert_eq!(plain.resolve_output_uri("a.xml"), "a.xml");
    }

    #[test]
    fn test_message_listener_receives_messages() {
        let listener = Rc::new(CollectingMessageListener::new());
        let body = Expr::Message(crate::instruct::message::Message::new(Expr::string("note")));
        let exec = ExecutableBuilder::new()
            .template(TemplateDefinition::named(QName::local("main"), body))
            .build()
            .unwrap();
        let config = TransformConfig::default().with_initial_template("main");
        Transformer::new(&exec, config)
            .with_message_listener(listener.clone())
            .transform(None)
            .unwrap();
        assert_eq!(listener.messages(), ["note"]);
    }
}
