use rustc_hash::FxHashMap;

use crate::{
    Shared,
    ast::node::{Expr, MemberProperty, Node, NodeId, Program},
    filter::FilterRegistry,
};

/// What the analyzer learned about one node.
#[derive(Debug, Clone, Default)]
pub struct Annotation {
    pub constant: bool,
    /// Sub-expressions whose values fully determine this node's value.
    pub to_watch: Vec<Shared<Node>>,
}

/// Per-node annotations for one program, keyed by [`NodeId`].
#[derive(Debug, Default)]
pub struct Analysis {
    annotations: FxHashMap<NodeId, Annotation>,
    constant: bool,
}

impl Analysis {
    pub fn get(&self, id: NodeId) -> Option<&Annotation> {
        self.annotations.get(&id)
    }

    pub fn is_constant(&self, node: &Node) -> bool {
        self.get(node.id).is_some_and(|a| a.constant)
    }

    pub fn to_watch(&self, node: &Node) -> &[Shared<Node>] {
        self.get(node.id)
            .map(|a| a.to_watch.as_slice())
            .unwrap_or_default()
    }

    /// Whether every statement of the program is constant.
    #[inline(always)]
    pub fn program_constant(&self) -> bool {
        self.constant
    }

    /// The cheaper sub-expressions to watch instead of the whole program.
    ///
    /// Only single-statement programs qualify, and only when the statement
    /// does not simply watch itself.
    pub fn inputs(&self, program: &Program) -> Option<Vec<Shared<Node>>> {
        let [statement] = program.body.as_slice() else {
            return None;
        };

        match self.to_watch(statement) {
            [] => None,
            [only] if Shared::ptr_eq(only, statement) => None,
            candidates => Some(candidates.to_vec()),
        }
    }
}

/// Marks constant nodes and computes watch sets, bottom-up.
pub struct Analyzer<'a> {
    filters: &'a FilterRegistry,
}

impl<'a> Analyzer<'a> {
    pub fn new(filters: &'a FilterRegistry) -> Self {
        Self { filters }
    }

    pub fn analyze(&self, program: &Program) -> Analysis {
        let mut analysis = Analysis::default();
        let mut constant = true;

        for statement in &program.body {
            constant &= self.visit(statement, &mut analysis);
        }

        analysis.constant = constant;
        analysis
    }

    fn visit(&self, node: &Shared<Node>, analysis: &mut Analysis) -> bool {
        let annotation = match &node.expr {
            Expr::Literal(_) => Annotation {
                constant: true,
                to_watch: Vec::new(),
            },
            Expr::Identifier(_) => Annotation {
                constant: false,
                to_watch: vec![Shared::clone(node)],
            },
            Expr::This | Expr::Locals | Expr::ValueParameter => Annotation::default(),
            Expr::Array(elements) => self.visit_all(elements.iter(), analysis),
            Expr::Object(properties) => {
                self.visit_all(properties.iter().map(|p| &p.value), analysis)
            }
            Expr::Member { object, property } => {
                let mut constant = self.visit(object, analysis);
                if let MemberProperty::Computed(property) = property {
                    constant &= self.visit(property, analysis);
                }

                Annotation {
                    constant,
                    to_watch: vec![Shared::clone(node)],
                }
            }
            Expr::Call {
                callee,
                args,
                filter,
            } => {
                let stateless = *filter
                    && match &callee.expr {
                        Expr::Identifier(name) => !self.filters.is_stateful(name),
                        _ => false,
                    };

                if !*filter {
                    self.visit(callee, analysis);
                }

                let Annotation { constant, to_watch } = self.visit_all(args.iter(), analysis);

                Annotation {
                    constant: stateless && constant,
                    to_watch: if stateless {
                        to_watch
                    } else {
                        vec![Shared::clone(node)]
                    },
                }
            }
            Expr::Assignment { left, right } => {
                let left = self.visit(left, analysis);
                let right = self.visit(right, analysis);

                Annotation {
                    constant: left && right,
                    to_watch: vec![Shared::clone(node)],
                }
            }
            Expr::Unary { argument, .. } => {
                let constant = self.visit(argument, analysis);

                Annotation {
                    constant,
                    to_watch: analysis.to_watch(argument).to_vec(),
                }
            }
            Expr::Binary { left, right, .. } => {
                let constant = self.visit(left, analysis) & self.visit(right, analysis);
                let mut to_watch = analysis.to_watch(left).to_vec();
                to_watch.extend_from_slice(analysis.to_watch(right));

                Annotation { constant, to_watch }
            }
            Expr::Logical { left, right, .. } => {
                let constant = self.visit(left, analysis) & self.visit(right, analysis);
                self.watch_self_unless_constant(node, constant)
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                let constant = self.visit(test, analysis)
                    & self.visit(consequent, analysis)
                    & self.visit(alternate, analysis);
                self.watch_self_unless_constant(node, constant)
            }
        };

        let constant = annotation.constant;
        analysis.annotations.insert(node.id, annotation);
        constant
    }

    /// Constant when every child is; watches the union of the non-constant
    /// children's watch sets.
    fn visit_all<'n>(
        &self,
        nodes: impl Iterator<Item = &'n Shared<Node>>,
        analysis: &mut Analysis,
    ) -> Annotation {
        let mut constant = true;
        let mut to_watch = Vec::new();

        for node in nodes {
            if self.visit(node, analysis) {
                continue;
            }
            constant = false;
            to_watch.extend_from_slice(analysis.to_watch(node));
        }

        Annotation { constant, to_watch }
    }

    #[inline(always)]
    fn watch_self_unless_constant(&self, node: &Shared<Node>, constant: bool) -> Annotation {
        Annotation {
            constant,
            to_watch: if constant {
                Vec::new()
            } else {
                vec![Shared::clone(node)]
            },
        }
    }
}
