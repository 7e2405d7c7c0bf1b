/// State carried through the static rewrite passes.
#[derive(Debug, Clone, Default)]
pub struct ExpressionVisitor {
    static_base_uri: Option<String>,
    rewrites: usize,
}

impl ExpressionVisitor {
    pub fn new(static_base_uri: Option<String>) -> Self {
        Self {
            static_base_uri,
            rewrites: 0,
        }
    }

    pub fn static_base_uri(&self) -> Option<&str> {
        self.static_base_uri.as_deref()
    }

    /// Notes that a node was replaced by a simpler one.
    pub fn record_rewrite(&mut self, what: &str) {
        self.rewrites += 1;
        log::trace!("Rewrite: {}", what);
    }

    pub fn rewrites(&self) -> usize {
        self.rewrites
    }
}
