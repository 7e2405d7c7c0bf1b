//! `xsl:result-document`: secondary result trees.
use crate::context::{OutputRef, XPathContext};
use crate::error::{Location, Result};
use crate::expr::Expr;
use std::cell::RefCell;
use std::rc::Rc;
use trellis_xdm::{Receiver, TreeBuilder};

#[derive(Debug, Clone)]
pub struct ResultDocument {
    /// Absent: the document is named `result{n}`.
    pub href: Option<Box<Expr>>,
    pub content: Box<Expr>,
    pub location: Option<Location>,
}

impl ResultDocument {
    pub fn new(href: Option<Expr>, content: Expr) -> Self {
        Self {
            href: href.map(Box::new),
            content: Box::new(content),
            location: None,
        }
    }

    pub fn children(&self) -> Vec<&Expr> {
        let mut out: Vec<&Expr> = self.href.iter().map(|h| &**h).collect();
        out.push(&*self.content);
        out
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        let mut out: Vec<&mut Expr> = self.href.iter_mut().map(|h| &mut **h).collect();
        out.push(&mut *self.content);
        out
    }

    /// Builds the document and hands it to the controller. The output URI
    /// is claimed before the content runs.
    pub fn process<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<()> {
        let controller = ctx.controller();
        let href = match &self.href {
            Some(href) => href.evaluate_as_string(ctx, "")?,
            None => format!("result{}", controller.result_document_count() + 1),
        };
        let uri = controller.claim_output_uri(&href)?;
        log::debug!("Writing result document {}", uri);
        let builder = Rc::new(RefCell::new(TreeBuilder::new().with_base_uri(Some(uri.clone()))));
        let out: OutputRef = builder.clone();
        let mut c = ctx.clone();
        c.set_receiver(out);
        builder.borrow_mut().start_document()?;
        self.content.process(&c)?;
        builder.borrow_mut().end_document()?;
        let tree = std::mem::take(&mut *builder.borrow_mut());
        controller.add_result_document(uri, tree.finish()?);
        Ok(())
    }
}
