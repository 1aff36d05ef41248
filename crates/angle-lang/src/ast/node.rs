use std::fmt::{self, Display, Formatter};

use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::{Shared, range::Range, value::format_number};

pub type NodeId = usize;
pub type Args = SmallVec<[Shared<Node>; 4]>;

#[derive(PartialEq, Debug, Clone)]
pub struct Node {
    /// Unique within the program the node belongs to.
    pub id: NodeId,
    pub range: Range,
    pub expr: Expr,
}

#[derive(PartialEq, Debug, Clone)]
pub enum Literal {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(SmolStr),
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Gt,
    Lte,
    Gte,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(PartialEq, Debug, Clone)]
pub enum MemberProperty {
    Static(SmolStr),
    Computed(Shared<Node>),
}

#[derive(PartialEq, Debug, Clone)]
pub struct Property {
    pub key: SmolStr,
    pub value: Shared<Node>,
}

#[derive(PartialEq, Debug, Clone)]
pub enum Expr {
    Literal(Literal),
    Array(Vec<Shared<Node>>),
    Object(Vec<Property>),
    Identifier(SmolStr),
    This,
    Locals,
    Member {
        object: Shared<Node>,
        property: MemberProperty,
    },
    /// `filter` marks calls desugared from `value | name:arg`; their callee is
    /// always an identifier naming a registered filter.
    Call {
        callee: Shared<Node>,
        args: Args,
        filter: bool,
    },
    Assignment {
        left: Shared<Node>,
        right: Shared<Node>,
    },
    Unary {
        op: UnaryOp,
        argument: Shared<Node>,
    },
    Binary {
        op: BinaryOp,
        left: Shared<Node>,
        right: Shared<Node>,
    },
    Logical {
        op: LogicalOp,
        left: Shared<Node>,
        right: Shared<Node>,
    },
    Conditional {
        test: Shared<Node>,
        consequent: Shared<Node>,
        alternate: Shared<Node>,
    },
    /// Placeholder for the value passed to an expression's `assign`.
    ValueParameter,
}

impl Expr {
    #[inline(always)]
    pub fn is_assignable(&self) -> bool {
        matches!(self, Expr::Identifier(_) | Expr::Member { .. })
    }

    #[inline(always)]
    pub fn is_literal(&self) -> bool {
        matches!(self, Expr::Literal(_) | Expr::Array(_) | Expr::Object(_))
    }
}

/// The parsed form of a whole expression: `;`-separated statements.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Program {
    pub body: Vec<Shared<Node>>,
    pub(crate) node_count: usize,
}

impl Program {
    pub fn new(body: Vec<Shared<Node>>, node_count: usize) -> Self {
        Self { body, node_count }
    }

    /// `true` for an empty program or a single literal, array or object.
    pub fn is_literal(&self) -> bool {
        match self.body.as_slice() {
            [] => true,
            [node] => node.expr.is_literal(),
            _ => false,
        }
    }

    /// The single assignable statement, if that is all the program holds.
    pub fn assignable_target(&self) -> Option<&Shared<Node>> {
        match self.body.as_slice() {
            [node] if node.expr.is_assignable() => Some(node),
            _ => None,
        }
    }

    /// Builds `target = $value` for the program's assignable statement.
    pub fn assign_program(&self) -> Option<Program> {
        let target = self.assignable_target()?;
        let value = Shared::new(Node {
            id: self.node_count,
            range: target.range,
            expr: Expr::ValueParameter,
        });
        let assignment = Shared::new(Node {
            id: self.node_count + 1,
            range: target.range,
            expr: Expr::Assignment {
                left: Shared::clone(target),
                right: value,
            },
        });

        Some(Program::new(vec![assignment], self.node_count + 2))
    }
}

impl Display for UnaryOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Plus => write!(f, "+"),
            UnaryOp::Minus => write!(f, "-"),
            UnaryOp::Not => write!(f, "!"),
        }
    }
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let op = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Lte => "<=",
            BinaryOp::Gte => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::StrictEq => "===",
            BinaryOp::StrictNotEq => "!==",
        };
        write!(f, "{}", op)
    }
}

impl Display for LogicalOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOp::And => write!(f, "&&"),
            LogicalOp::Or => write!(f, "||"),
        }
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Undefined => write!(f, "undefined"),
            Literal::Null => write!(f, "null"),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Number(n) => write!(f, "{}", format_number(*n)),
            Literal::String(s) => write!(f, "{:?}", s.as_str()),
        }
    }
}

fn join(nodes: &[Shared<Node>], separator: &str) -> String {
    nodes
        .iter()
        .map(|node| node.to_string())
        .collect::<Vec<_>>()
        .join(separator)
}

/// Renders a fully parenthesized form, handy for checking precedence.
impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.expr {
            Expr::Literal(literal) => write!(f, "{}", literal),
            Expr::Array(elements) => write!(f, "[{}]", join(elements, ", ")),
            Expr::Object(properties) => write!(
                f,
                "{{{}}}",
                properties
                    .iter()
                    .map(|p| format!("{}: {}", p.key, p.value))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Expr::Identifier(name) => write!(f, "{}", name),
            Expr::This => write!(f, "this"),
            Expr::Locals => write!(f, "$locals"),
            Expr::Member {
                object,
                property: MemberProperty::Static(name),
            } => write!(f, "{}.{}", object, name),
            Expr::Member {
                object,
                property: MemberProperty::Computed(property),
            } => write!(f, "{}[{}]", object, property),
            Expr::Call {
                callee,
                args,
                filter: true,
            } => {
                let mut args = args.iter();
                let input = args.next().map(|a| a.to_string()).unwrap_or_default();
                write!(f, "({} | {}", input, callee)?;
                for arg in args {
                    write!(f, ":{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Call { callee, args, .. } => write!(f, "{}({})", callee, join(args, ", ")),
            Expr::Assignment { left, right } => write!(f, "({} = {})", left, right),
            Expr::Unary { op, argument } => write!(f, "({}{})", op, argument),
            Expr::Binary { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Expr::Logical { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => write!(f, "({} ? {} : {})", test, consequent, alternate),
            Expr::ValueParameter => write!(f, "$value"),
        }
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", join(&self.body, "; "))
    }
}
