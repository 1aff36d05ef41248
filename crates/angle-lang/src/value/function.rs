use smol_str::SmolStr;

use crate::{Shared, Value, error::runtime::RuntimeError};

pub type NativeFunction = dyn Fn(&Value, &[Value]) -> Result<Value, RuntimeError>;

/// Distinguishes the built-ins the expression sandbox refuses to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Ordinary,
    FunctionConstructor,
    ObjectConstructor,
    Call,
    Apply,
    Bind,
}

struct FunctionData {
    name: SmolStr,
    kind: FunctionKind,
    body: Box<NativeFunction>,
}

/// A host function callable from expressions as `f(args...)`.
///
/// Receives the receiver (`this`) and the evaluated arguments.
#[derive(Clone)]
pub struct Function(Shared<FunctionData>);

impl Function {
    pub fn new(
        name: impl Into<SmolStr>,
        body: impl Fn(&Value, &[Value]) -> Result<Value, RuntimeError> + 'static,
    ) -> Self {
        Self::with_kind(FunctionKind::Ordinary, name, body)
    }

    fn with_kind(
        kind: FunctionKind,
        name: impl Into<SmolStr>,
        body: impl Fn(&Value, &[Value]) -> Result<Value, RuntimeError> + 'static,
    ) -> Self {
        Self(Shared::new(FunctionData {
            name: name.into(),
            kind,
            body: Box::new(body),
        }))
    }

    /// Stand-in for the global `Function`; it never compiles source text.
    pub fn function_constructor() -> Self {
        Self::with_kind(FunctionKind::FunctionConstructor, "Function", |_, _| {
            Err(RuntimeError::FunctionConstructor)
        })
    }

    /// Stand-in for the global `Object`: returns its argument when it is
    /// already an object, a fresh empty object otherwise.
    pub fn object_constructor() -> Self {
        Self::with_kind(FunctionKind::ObjectConstructor, "Object", |_, args| {
            Ok(match args.first() {
                Some(value @ (Value::Object(_) | Value::Array(_) | Value::Function(_))) => {
                    value.clone()
                }
                _ => Value::Object(Default::default()),
            })
        })
    }

    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    #[inline(always)]
    pub fn kind(&self) -> FunctionKind {
        self.0.kind
    }

    pub fn call(&self, this: &Value, args: &[Value]) -> Result<Value, RuntimeError> {
        (self.0.body)(this, args)
    }

    #[inline(always)]
    pub fn ptr_eq(&self, other: &Function) -> bool {
        Shared::ptr_eq(&self.0, &other.0)
    }

    /// `f.call(this, ...args)`
    pub fn call_method(&self) -> Function {
        let target = self.clone();
        Self::with_kind(FunctionKind::Call, "call", move |_, args| {
            let this = args.first().cloned().unwrap_or_default();
            target.call(&this, args.get(1..).unwrap_or_default())
        })
    }

    /// `f.apply(this, [args...])`
    pub fn apply_method(&self) -> Function {
        let target = self.clone();
        Self::with_kind(FunctionKind::Apply, "apply", move |_, args| {
            let this = args.first().cloned().unwrap_or_default();
            match args.get(1) {
                Some(Value::Array(array)) => target.call(&this, &array.to_vec()),
                None | Some(Value::Undefined | Value::Null) => target.call(&this, &[]),
                Some(other) => Err(RuntimeError::InvalidArguments(
                    "apply".to_string(),
                    format!("expected an array, got {}", other.name()),
                )),
            }
        })
    }

    /// `f.bind(this, ...args)` returns an ordinary function with the receiver
    /// and leading arguments fixed.
    pub fn bind_method(&self) -> Function {
        let target = self.clone();
        Self::with_kind(FunctionKind::Bind, "bind", move |_, args| {
            let this = args.first().cloned().unwrap_or_default();
            let bound = args.get(1..).unwrap_or_default().to_vec();
            let target = target.clone();
            let name = format!("bound {}", target.name());

            Ok(Value::Function(Function::new(name, move |_, args| {
                let args = bound.iter().chain(args.iter()).cloned().collect::<Vec<_>>();
                target.call(&this, &args)
            })))
        })
    }
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "function {}()", self.name())
    }
}
