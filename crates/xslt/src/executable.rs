//! The compiled stylesheet and the builder that assembles it.
//!
//! [`ExecutableBuilder`] takes template, function, attribute set and global
//! variable declarations whose bodies are expression trees, and prepares
//! them for execution:
//!
//! 1. allocates global slots, parameter ids and local variable slots, and
//!    binds every variable reference, function call, `xsl:call-template`,
//!    attribute set and mode name;
//! 2. rejects attribute sets that use themselves;
//! 3. runs `simplify`, `type_check` and `optimize` over every body;
//! 4. marks calls in tail position so that they return a
//!    [`TailCall`](crate::tail_call::TailCall) instead of recursing;
//! 5. registers each template's pattern in its modes.
use crate::error::{Location, Result, XsltError};
use crate::expr::{Expr, ExpressionVisitor, VariableBinding};
use crate::instruct::attribute_sets::{AttributeSet, AttributeSetId, UseAttributeSets};
use crate::instruct::for_each_group::GroupingAlgorithm;
use crate::instruct::templates::{ModeRef, Template, WithParam};
use crate::instruct::user_function::{FunctionId, UserFunction};
use crate::instruct::variables::GlobalVariable;
use crate::mode::{Mode, TemplateId};
use crate::params::ParamId;
use crate::pattern::Pattern;
use crate::slots::SlotManager;
use crate::types::{ItemType, SequenceType};
use std::collections::{HashMap, HashSet};
use trellis_xdm::QName;

#[derive(Debug, Default)]
pub struct Executable {
    templates: Vec<Template>,
    named_templates: HashMap<QName, TemplateId>,
    default_mode: Mode,
    modes: HashMap<QName, Mode>,
    globals: Vec<GlobalVariable>,
    functions: Vec<UserFunction>,
    function_index: HashMap<(QName, usize), FunctionId>,
    attribute_sets: Vec<AttributeSet>,
    static_base_uri: Option<String>,
}

impl Executable {
    pub fn template(&self, id: TemplateId) -> Result<&Template> {
        self.templates
            .get(id)
            .ok_or_else(|| XsltError::dynamic("XTDE0040", format!("No template with id {}", id)))
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    pub fn named_template(&self, name: &QName) -> Option<&Template> {
        self.named_templates.get(name).map(|&id| &self.templates[id])
    }

    pub fn default_mode(&self) -> &Mode {
        &self.default_mode
    }

    /// The mode called `name`; `None` is the default mode.
    pub fn mode(&self, name: Option<&QName>) -> Option<&Mode> {
        match name {
            None => Some(&self.default_mode),
            Some(name) => self.modes.get(name),
        }
    }

    pub fn global_variable(&self, slot: usize) -> Result<&GlobalVariable> {
        self.globals
            .get(slot)
            .ok_or_else(|| XsltError::dynamic("XPST0008", format!("No global variable in slot {}", slot)))
    }

    pub fn global_variables(&self) -> &[GlobalVariable] {
        &self.globals
    }

    pub fn global_count(&self) -> usize {
        self.globals.len()
    }

    pub fn function(&self, id: FunctionId) -> Result<&UserFunction> {
        self.functions
            .get(id)
            .ok_or_else(|| XsltError::static_error("XPST0017", format!("No function with id {}", id)))
    }

    /// The stylesheet function called `name` taking `arity` arguments.
    pub fn user_function(&self, name: &QName, arity: usize) -> Option<&UserFunction> {
        self.function_index
            .get(&(name.clone(), arity))
            .map(|&id| &self.functions[id])
    }

    pub fn attribute_set(&self, id: AttributeSetId) -> Result<&AttributeSet> {
        self.attribute_sets
            .get(id)
            .ok_or_else(|| XsltError::static_error("XTSE0710", format!("No attribute set with id {}", id)))
    }

    pub fn static_base_uri(&self) -> Option<&str> {
        self.static_base_uri.as_deref()
    }
}

/// A template declaration: named, matching, or both.
#[derive(Debug, Clone)]
pub struct TemplateDefinition {
    pub name: Option<QName>,
    pub pattern: Option<Pattern>,
    /// Modes the rule belongs to; empty means the default mode only.
    pub modes: Vec<Option<QName>>,
    pub priority: Option<f64>,
    pub precedence: i32,
    pub min_import_precedence: i32,
    pub required_type: Option<SequenceType>,
    pub body: Expr,
    pub location: Option<Location>,
}

impl TemplateDefinition {
    fn new(name: Option<QName>, pattern: Option<Pattern>, body: Expr) -> Self {
        Self {
            name,
            pattern,
            modes: Vec::new(),
            priority: None,
            precedence: 0,
            min_import_precedence: 0,
            required_type: None,
            body,
            location: None,
        }
    }

    pub fn named(name: QName, body: Expr) -> Self {
        Self::new(Some(name), None, body)
    }

    pub fn matching(pattern: Pattern, body: Expr) -> Self {
        Self::new(None, Some(pattern), body)
    }

    pub fn with_name(mut self, name: QName) -> Self {
        self.name = Some(name);
        self
    }

    pub fn in_mode(mut self, mode: QName) -> Self {
        self.modes.push(Some(mode));
        self
    }

    pub fn in_default_mode(mut self) -> Self {
        self.modes.push(None);
        self
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Import precedence of the declaring module, and the lowest precedence
    /// among the modules it imports.
    pub fn with_precedence(mut self, precedence: i32, min_import_precedence: i32) -> Self {
        self.precedence = precedence;
        self.min_import_precedence = min_import_precedence;
        self
    }

    pub fn with_type(mut self, required: SequenceType) -> Self {
        self.required_type = Some(required);
        self
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

#[derive(Debug, Default)]
pub struct ExecutableBuilder {
    templates: Vec<TemplateDefinition>,
    globals: Vec<GlobalVariable>,
    functions: Vec<UserFunction>,
    attribute_sets: Vec<AttributeSet>,
    static_base_uri: Option<String>,
}

impl ExecutableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_static_base_uri(mut self, uri: impl Into<String>) -> Self {
        self.static_base_uri = Some(uri.into());
        self
    }

    pub fn template(mut self, definition: TemplateDefinition) -> Self {
        self.templates.push(definition);
        self
    }

    pub fn global(mut self, variable: GlobalVariable) -> Self {
        self.globals.push(variable);
        self
    }

    pub fn function(mut self, function: UserFunction) -> Self {
        self.functions.push(function);
        self
    }

    /// Declarations sharing a name are merged, in the order given.
    pub fn attribute_set(mut self, set: AttributeSet) -> Self {
        self.attribute_sets.push(set);
        self
    }

    pub fn build(self) -> Result<Executable> {
        let mut global_slots = HashMap::new();
        for (slot, g) in self.globals.iter().enumerate() {
            if global_slots.insert(g.name.clone(), slot).is_some() {
                return Err(XsltError::static_error(
                    "XTSE0630",
                    format!("Duplicate global variable ${}", g.name.display_name()),
                ));
            }
        }
        let mut named_templates = HashMap::new();
        for (id, t) in self.templates.iter().enumerate() {
            if let Some(name) = &t.name {
                if named_templates.insert(name.clone(), id).is_some() {
                    return Err(XsltError::static_error(
                        "XTSE0660",
                        format!("Duplicate template name {}", name.display_name()),
                    ));
                }
            }
        }

        let mut function_index = HashMap::new();
        for (id, f) in self.functions.iter().enumerate() {
            if function_index.insert((f.name.clone(), f.arity()), id).is_some() {
                return Err(XsltError::static_error(
                    "XTSE0770",
                    format!("Duplicate function declaration {}", f.display_name()),
                ));
            }
        }
        let mut set_index: HashMap<QName, Vec<AttributeSetId>> = HashMap::new();
        for (id, set) in self.attribute_sets.iter().enumerate() {
            set_index.entry(set.name.clone()).or_default().push(id);
        }

        let mut names = Names {
            globals: &global_slots,
            templates: &named_templates,
            functions: &function_index,
            attribute_sets: &set_index,
            params: HashMap::new(),
            modes: HashSet::new(),
            static_base_uri: self.static_base_uri.clone(),
        };
        let mut visitor = ExpressionVisitor::new(self.static_base_uri.clone());

        let mut globals = Vec::with_capacity(self.globals.len());
        for (slot, mut g) in self.globals.into_iter().enumerate() {
            g.slot = slot;
            let mut binder = Binder::new(&mut names);
            binder.bind(&mut g.select)?;
            g.slots = binder.slots;
            g.select = prepare(std::mem::take(&mut g.select), &mut visitor, None)?;
            globals.push(g);
        }

        let mut templates = Vec::with_capacity(self.templates.len());
        let mut rules = Vec::new();
        for (id, mut def) in self.templates.into_iter().enumerate() {
            let mut binder = Binder::new(&mut names);
            binder.bind(&mut def.body)?;
            let slots = binder.slots;
            if let Some(pattern) = &mut def.pattern {
                let mut binder = Binder::new(&mut names);
                for predicate in pattern.predicates_mut() {
                    binder.bind(predicate)?;
                }
            }
            let context_item = def.pattern.as_ref().map(|p| match p.node_kind() {
                Some(kind) => ItemType::Node(kind),
                None => ItemType::AnyNode,
            });
            let mut body = prepare(def.body, &mut visitor, context_item)?;
            if def.required_type.is_none() {
                mark_tail_calls(&mut body);
            }
            let mut template = Template::new(id, def.name, body);
            template.slots = slots;
            template.required_type = def.required_type;
            template.location = def.location;
            templates.push(template);
            if let Some(pattern) = def.pattern {
                let modes = if def.modes.is_empty() { vec![None] } else { def.modes };
                for mode in modes {
                    rules.push((mode, pattern.clone(), id, def.precedence, def.min_import_precedence, def.priority));
                }
            }
        }

        let mut functions = Vec::with_capacity(self.functions.len());
        for mut f in self.functions {
            let mut binder = Binder::new(&mut names);
            for param in &mut f.params {
                if binder.scope.iter().any(|(n, _)| *n == param.name) {
                    return Err(XsltError::static_error(
                        "XTSE0580",
                        format!("Duplicate parameter ${} in function {}", param.name.display_name(), f.name.display_name()),
                    ));
                }
                param.slot = binder.slots.allocate_slot(param.name.clone());
                binder.scope.push((param.name.clone(), param.slot));
            }
            binder.bind(&mut f.body)?;
            f.slots = binder.slots;
            f.body = prepare(std::mem::take(&mut f.body), &mut visitor, None)?;
            functions.push(f);
        }

        let mut attribute_sets = Vec::with_capacity(self.attribute_sets.len());
        for (id, mut set) in self.attribute_sets.into_iter().enumerate() {
            set.id = id;
            let mut binder = Binder::new(&mut names);
            binder.resolve_attribute_sets(&mut set.use_attribute_sets)?;
            binder.bind(&mut set.body)?;
            set.slots = binder.slots;
            set.body = prepare(std::mem::take(&mut set.body), &mut visitor, None)?;
            attribute_sets.push(set);
        }
        check_attribute_set_cycles(&attribute_sets)?;

        let mut default_mode = Mode::new(None);
        let mut modes: HashMap<QName, Mode> = names
            .modes
            .into_iter()
            .map(|name| (name.clone(), Mode::new(Some(name))))
            .collect();
        for (mode, pattern, id, precedence, min_import, priority) in rules {
            let target = match mode {
                None => &mut default_mode,
                Some(name) => modes.entry(name.clone()).or_insert_with(|| Mode::new(Some(name))),
            };
            target.add_rule(&pattern, id, precedence, min_import, priority);
        }
        log::debug!(
            "Built executable: {} templates, {} functions, {} attribute sets, {} named modes, {} globals, {} rewrites",
            templates.len(),
            functions.len(),
            attribute_sets.len(),
            modes.len(),
            globals.len(),
            visitor.rewrites()
        );
        Ok(Executable {
            templates,
            named_templates,
            default_mode,
            modes,
            globals,
            functions,
            function_index,
            attribute_sets,
            static_base_uri: self.static_base_uri,
        })
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Visit {
    New,
    Active,
    Done,
}

/// XTSE0720: an attribute set may not use itself, directly or not.
fn check_attribute_set_cycles(sets: &[AttributeSet]) -> Result<()> {
    fn visit(id: AttributeSetId, sets: &[AttributeSet], state: &mut [Visit]) -> Result<()> {
        match state[id] {
            Visit::Done => Ok(()),
            Visit::Active => Err(XsltError::static_error(
                "XTSE0720",
                format!("Attribute set {} uses itself", sets[id].name.display_name()),
            )),
            Visit::New => {
                state[id] = Visit::Active;
                for &next in &sets[id].use_attribute_sets.targets {
                    visit(next, sets, state)?;
                }
                state[id] = Visit::Done;
                Ok(())
            }
        }
    }
    let mut state = vec![Visit::New; sets.len()];
    for id in 0..sets.len() {
        visit(id, sets, &mut state)?;
    }
    Ok(())
}

fn prepare(expr: Expr, visitor: &mut ExpressionVisitor, context_item: Option<ItemType>) -> Result<Expr> {
    expr.simplify(visitor)?
        .type_check(visitor, context_item)?
        .optimize(visitor, context_item)
}

/// Sets the tail-call flag on every call that is the last thing its
/// template does.
fn mark_tail_calls(expr: &mut Expr) {
    match expr {
        Expr::CallTemplate(c) => c.use_tail_recursion = true,
        Expr::ApplyTemplates(a) => a.use_tail_recursion = true,
        Expr::ApplyImports(a) => a.use_tail_recursion = true,
        Expr::NextMatch(n) => n.use_tail_recursion = true,
        Expr::Block(b) => {
            if let Some(last) = b.children.last_mut() {
                mark_tail_calls(last);
            }
        }
        Expr::Choose(c) => {
            for (_, action) in &mut c.branches {
                mark_tail_calls(action);
            }
        }
        Expr::Let(l) => mark_tail_calls(&mut l.action),
        _ => {}
    }
}

/// Names known across the whole stylesheet.
struct Names<'a> {
    globals: &'a HashMap<QName, usize>,
    templates: &'a HashMap<QName, TemplateId>,
    functions: &'a HashMap<(QName, usize), FunctionId>,
    attribute_sets: &'a HashMap<QName, Vec<AttributeSetId>>,
    params: HashMap<QName, ParamId>,
    modes: HashSet<QName>,
    static_base_uri: Option<String>,
}

impl Names<'_> {
    fn param_id(&mut self, name: &QName) -> ParamId {
        let next = self.params.len() as ParamId;
        *self.params.entry(name.clone()).or_insert(next)
    }
}

/// Binds the names used in one procedure body and allocates its local
/// variable slots.
struct Binder<'n, 'a> {
    names: &'n mut Names<'a>,
    slots: SlotManager,
    scope: Vec<(QName, usize)>,
}

impl<'n, 'a> Binder<'n, 'a> {
    fn new(names: &'n mut Names<'a>) -> Self {
        Self {
            names,
            slots: SlotManager::new(),
            scope: Vec::new(),
        }
    }

    fn resolve(&self, name: &QName) -> Result<VariableBinding> {
        if let Some((_, slot)) = self.scope.iter().rev().find(|(n, _)| n == name) {
            return Ok(VariableBinding::Local(*slot));
        }
        match self.names.globals.get(name) {
            Some(&slot) => Ok(VariableBinding::Global(slot)),
            None => Err(XsltError::static_error(
                "XPST0008",
                format!("Variable ${} has not been declared", name.display_name()),
            )),
        }
    }

    fn resolve_attribute_sets(&self, sets: &mut UseAttributeSets) -> Result<()> {
        sets.targets.clear();
        for name in &sets.names {
            let ids = self.names.attribute_sets.get(name).ok_or_else(|| {
                XsltError::static_error(
                    "XTSE0710",
                    format!("No attribute set named {} has been declared", name.display_name()),
                )
            })?;
            sets.targets.extend(ids);
        }
        Ok(())
    }

    fn number_params(&mut self, params: &mut [WithParam]) {
        for p in params {
            p.id = self.names.param_id(&p.name);
        }
    }

    fn bind(&mut self, expr: &mut Expr) -> Result<()> {
        match expr {
            Expr::VariableRef(v) => {
                v.binding = self.resolve(&v.name)?;
                return Ok(());
            }
            Expr::Let(l) => {
                self.bind(&mut l.select)?;
                l.slot = self.slots.allocate_slot(l.name.clone());
                self.scope.push((l.name.clone(), l.slot));
                self.bind(&mut l.action)?;
                self.scope.pop();
                return Ok(());
            }
            Expr::Block(b) => {
                // Parameters declared in a block stay in scope until its end.
                let depth = self.scope.len();
                for child in &mut b.children {
                    self.bind(child)?;
                }
                self.scope.truncate(depth);
                return Ok(());
            }
            Expr::LocalParam(p) => {
                if let Some(default) = &mut p.default {
                    self.bind(default)?;
                }
                p.slot = self.slots.allocate_slot(p.name.clone());
                p.id = self.names.param_id(&p.name);
                self.scope.push((p.name.clone(), p.slot));
                return Ok(());
            }
            Expr::UserFunctionCall(f) => {
                let key = (f.name.clone(), f.args.len());
                let target = self.names.functions.get(&key).copied().ok_or_else(|| {
                    XsltError::static_error(
                        "XPST0017",
                        format!("Unknown function {}#{}", f.name.display_name(), f.args.len()),
                    )
                })?;
                f.target = Some(target);
            }
            Expr::Element(e) => self.resolve_attribute_sets(&mut e.attribute_sets)?,
            Expr::Copy(c) => self.resolve_attribute_sets(&mut c.attribute_sets)?,
            Expr::CallTemplate(c) => {
                let target = self.names.templates.get(&c.name).copied().ok_or_else(|| {
                    XsltError::static_error(
                        "XTSE0650",
                        format!("No template named {} has been declared", c.name.display_name()),
                    )
                })?;
                c.target = Some(target);
                self.number_params(&mut c.params);
                self.number_params(&mut c.tunnel_params);
            }
            Expr::ApplyTemplates(a) => {
                if let ModeRef::Named(name) = &a.mode {
                    self.names.modes.insert(name.clone());
                }
                self.number_params(&mut a.params);
                self.number_params(&mut a.tunnel_params);
            }
            Expr::ApplyImports(a) => {
                self.number_params(&mut a.params);
                self.number_params(&mut a.tunnel_params);
            }
            Expr::NextMatch(n) => {
                self.number_params(&mut n.params);
                self.number_params(&mut n.tunnel_params);
            }
            Expr::ForEachGroup(g) => {
                if let GroupingAlgorithm::StartingWith(p) | GroupingAlgorithm::EndingWith(p) = &mut g.algorithm {
                    for predicate in p.predicates_mut() {
                        self.bind(predicate)?;
                    }
                }
            }
            Expr::CopyOf(c) => {
                if c.static_base_uri.is_none() {
                    c.static_base_uri = self.names.static_base_uri.clone();
                }
            }
            _ => {}
        }
        for child in expr.children_mut() {
            self.bind(child)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{VariableRef, parse_xpath};
    use crate::instruct::block::Block;
    use crate::instruct::nodes::{AttributeCreator, ElementCreator, NodeName};
    use crate::instruct::templates::CallTemplate;
    use crate::instruct::user_function::UserFunctionParameter;
    use crate::instruct::variables::{Let, LocalParam};
    use trellis_xdm::StaticNamespaces;

    fn var(name: &str) -> Expr {
        Expr::VariableRef(VariableRef::new(QName::local(name)))
    }

    #[test]
    fn test_empty_executable() {
        let exec = ExecutableBuilder::new().build().unwrap();
        assert!(exec.default_mode().is_empty());
        assert_eq!(exec.global_count(), 0);
        assert!(exec.mode(Some(&QName::local("m"))).is_none());
    }

    #[test]
    fn test_names_are_bound() {
        let body = Expr::Block(Block::new(vec![
            Expr::LocalParam(LocalParam::new(QName::local("p"))),
            Expr::Let(Let::new(QName::local("x"), var("g"), Expr::xpath("$x, $p").unwrap())),
            Expr::CallTemplate(CallTemplate::new(QName::local("t"))),
        ]));
        let exec = ExecutableBuilder::new()
            .global(GlobalVariable::variable(QName::local("g"), Expr::integer(1)))
            .template(TemplateDefinition::named(QName::local("t"), body))
            .build()
            .unwrap();
        let t = exec.named_template(&QName::local("t")).unwrap();
        assert_eq!(t.slots.number_of_variables(), 2);
        let mut refs = Vec::new();
        t.body.walk(&mut |e| {
            if let Expr::VariableRef(v) = e {
                refs.push(v.binding.clone());
            }
        });
        assert!(refs.contains(&VariableBinding::Global(0)));
        assert!(refs.contains(&VariableBinding::Local(0)));
        assert!(refs.contains(&VariableBinding::Local(1)));
    }

    #[test]
    fn test_tail_position_is_marked() {
        let body = Expr::Block(Block::new(vec![
            Expr::CallTemplate(CallTemplate::new(QName::local("t"))),
            Expr::CallTemplate(CallTemplate::new(QName::local("t"))),
        ]));
        let exec = ExecutableBuilder::new()
            .template(TemplateDefinition::named(QName::local("t"), body))
            .build()
            .unwrap();
        let Expr::Block(b) = &exec.templates()[0].body else {
            panic!("expected a block");
        };
        let flags: Vec<bool> = b
            .children
            .iter()
            .map(|c| matches!(c, Expr::CallTemplate(c) if c.use_tail_recursion))
            .collect();
        assert_eq!(flags, [false, true]);
    }

    #[test]
    fn test_static_errors() {
        let missing = ExecutableBuilder::new()
            .template(TemplateDefinition::named(QName::local("a"), Expr::CallTemplate(CallTemplate::new(QName::local("b")))))
            .build()
            .unwrap_err();
        assert_eq!(missing.code(), "XTSE0650");
        let undeclared = ExecutableBuilder::new()
            .template(TemplateDefinition::named(QName::local("a"), var("nope")))
            .build()
            .unwrap_err();
        assert_eq!(undeclared.code(), "XPST0008");
        let duplicate = ExecutableBuilder::new()
            .template(TemplateDefinition::named(QName::local("a"), Expr::empty()))
            .template(TemplateDefinition::named(QName::local("a"), Expr::empty()))
            .build()
            .unwrap_err();
        assert_eq!(duplicate.code(), "XTSE0660");
    }

    fn double() -> UserFunction {
        UserFunction::new(
            QName::new("f", "urn:f", "double"),
            vec![UserFunctionParameter::new(QName::local("n"))],
            Expr::xpath("$n * 2").unwrap(),
        )
    }

    #[test]
    fn test_function_calls_are_bound_by_arity() {
        let ns = StaticNamespaces::new().bind("f", "urn:f");
        let call = parse_xpath("f:double(3)", &ns).unwrap();
        let exec = ExecutableBuilder::new()
            .function(double())
            .template(TemplateDefinition::named(QName::local("t"), call))
            .build()
            .unwrap();
        let f = exec.user_function(&QName::new("", "urn:f", "double"), 1).unwrap();
        assert_eq!(f.params[0].slot, 0);
        assert_eq!(f.slots.number_of_variables(), 1);
        assert!(exec.user_function(&QName::new("", "urn:f", "double"), 2).is_none());
        let mut targets = Vec::new();
        exec.templates()[0].body.walk(&mut |e| {
            if let Expr::UserFunctionCall(c) = e {
                targets.push(c.target);
            }
        });
        assert_eq!(targets, [Some(0)]);

        let wrong_arity = ExecutableBuilder::new()
            .function(double())
            .template(TemplateDefinition::named(QName::local("t"), parse_xpath("f:double(1, 2)", &ns).unwrap()))
            .build()
            .unwrap_err();
        assert_eq!(wrong_arity.code(), "XPST0017");
        let duplicate = ExecutableBuilder::new().function(double()).function(double()).build().unwrap_err();
        assert_eq!(duplicate.code(), "XTSE0770");
    }

    fn set(name: &str, attribute: &str) -> AttributeSet {
        AttributeSet::new(
            QName::local(name),
            Expr::Attribute(AttributeCreator::new(NodeName::Fixed(QName::local(attribute)), Expr::string("v"))),
        )
    }

    #[test]
    fn test_attribute_sets_are_merged_and_bound() {
        let element = ElementCreator::fixed(QName::local("e"), Expr::empty()).with_attribute_sets(vec![QName::local("a")]);
        let exec = ExecutableBuilder::new()
            .attribute_set(set("a", "x"))
            .attribute_set(set("b", "y"))
            .attribute_set(set("a", "z").using(vec![QName::local("b")]))
            .template(TemplateDefinition::named(QName::local("t"), Expr::Element(element)))
            .build()
            .unwrap();
        let Expr::Element(e) = &exec.templates()[0].body else {
            panic!("expected an element constructor");
        };
        assert_eq!(e.attribute_sets.targets, [0, 2]);
        assert_eq!(exec.attribute_set(2).unwrap().use_attribute_sets.targets, [1]);
    }

    #[test]
    fn test_attribute_set_errors() {
        let element = ElementCreator::fixed(QName::local("e"), Expr::empty()).with_attribute_sets(vec![QName::local("nope")]);
        let unknown = ExecutableBuilder::new()
            .template(TemplateDefinition::named(QName::local("t"), Expr::Element(element)))
            .build()
            .unwrap_err();
        assert_eq!(unknown.code(), "XTSE0710");
        let cycle = ExecutableBuilder::new()
            .attribute_set(set("a", "x").using(vec![QName::local("b")]))
            .attribute_set(set("b", "y").using(vec![QName::local("a")]))
            .build()
            .unwrap_err();
        assert_eq!(cycle.code(), "XTSE0720");
    }

    #[test]
    fn test_rules_registered_in_modes() {
        let ns = StaticNamespaces::new();
        let exec = ExecutableBuilder::new()
            .template(TemplateDefinition::matching(Pattern::parse("a | b", &ns).unwrap(), Expr::empty()))
            .template(
                TemplateDefinition::matching(Pattern::parse("c", &ns).unwrap(), Expr::empty())
                    .in_mode(QName::local("m"))
                    .in_default_mode(),
            )
            .build()
            .unwrap();
        assert_eq!(exec.default_mode().rules().len(), 3);
        assert_eq!(exec.mode(Some(&QName::local("m"))).unwrap().rules().len(), 1);
    }
}
