use std::collections::HashMap;

use derive_more::Display;
use lazy_static::lazy_static;
use serde::Serialize;
use strum::IntoEnumIterator;
use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};

use crate::error::{OptError, OptResult};
use crate::expr::LogicalExpression;

pub const BUILTIN_NAMESPACE: &str = "algebricks";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize)]
#[display(fmt = "{}:{}", namespace, name)]
pub struct FunctionIdentifier {
    namespace: String,
    name: String,
}

impl FunctionIdentifier {
    pub fn new<N: Into<String>, S: Into<String>>(namespace: N, name: S) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, StrumDisplay, Serialize)]
pub enum FunctionKind {
    Scalar,
    Aggregate,
    Stateful,
    Unnest,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, n: usize) -> bool {
        match self {
            Arity::Exactly(k) => n == *k,
            Arity::AtLeast(k) => n >= *k,
        }
    }
}

/// Functions the optimizer itself reasons about.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, EnumIter, EnumString, IntoStaticStr, StrumDisplay,
)]
#[strum(serialize_all = "kebab-case")]
pub enum BuiltinFunction {
    And,
    Or,
    Not,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    NumericAdd,
    Count,
    Sum,
    Min,
    Max,
    ScanCollection,
}

impl BuiltinFunction {
    pub fn identifier(&self) -> FunctionIdentifier {
        let name: &'static str = self.into();
        FunctionIdentifier::new(BUILTIN_NAMESPACE, name)
    }

    pub fn kind(&self) -> FunctionKind {
        match self {
            Self::Count | Self::Sum | Self::Min | Self::Max => FunctionKind::Aggregate,
            Self::ScanCollection => FunctionKind::Unnest,
            _ => FunctionKind::Scalar,
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            Self::And | Self::Or => Arity::AtLeast(1),
            Self::Not
            | Self::Count
            | Self::Sum
            | Self::Min
            | Self::Max
            | Self::ScanCollection => Arity::Exactly(1),
            _ => Arity::Exactly(2),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionInfo {
    pub identifier: FunctionIdentifier,
    pub kind: FunctionKind,
    pub arity: Arity,
}

lazy_static! {
    static ref BUILTIN_FUNCTIONS: Vec<FunctionInfo> = BuiltinFunction::iter()
        .map(|f| FunctionInfo {
            identifier: f.identifier(),
            kind: f.kind(),
            arity: f.arity(),
        })
        .collect();
}

/// Function signatures known to one compilation.
///
/// A registry is an ordinary value owned by the optimization context, so independent
/// compilations never observe each other's registrations.
#[derive(Clone, Debug, Default)]
pub struct FunctionRegistry {
    functions: HashMap<FunctionIdentifier, FunctionInfo>,
}

impl FunctionRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        for info in BUILTIN_FUNCTIONS.iter() {
            registry.register(info.clone());
        }
        registry
    }

    pub fn register(&mut self, info: FunctionInfo) {
        self.functions.insert(info.identifier.clone(), info);
    }

    pub fn lookup(&self, identifier: &FunctionIdentifier) -> OptResult<&FunctionInfo> {
        self.functions
            .get(identifier)
            .ok_or_else(|| OptError::UnknownFunction(identifier.clone()).into())
    }

    /// Checks that every call in `expr` names a registered function of the declared kind
    /// and passes an accepted number of arguments.
    pub fn validate(&self, expr: &LogicalExpression) -> OptResult<()> {
        let mut result = Ok(());
        expr.for_each_call(&mut |e| {
            if result.is_err() {
                return;
            }
            let Some(call) = e.as_function_call() else {
                return;
            };
            result = self.lookup(call.function()).and_then(|info| {
                if info.kind != call.kind() {
                    Err(malformed(e, format!("expected a {} function", info.kind)))
                } else if !info.arity.accepts(call.arguments().len()) {
                    Err(malformed(
                        e,
                        format!("{} arguments do not match {:?}", call.arguments().len(), info.arity),
                    ))
                } else {
                    Ok(())
                }
            });
        });
        result
    }
}

fn malformed(expr: &LogicalExpression, reason: String) -> anyhow::Error {
    OptError::MalformedExpression {
        expr: expr.to_string(),
        reason,
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::LogicalVariable;

    #[test]
    fn test_builtin_names() {
        assert_eq!("numeric-add", BuiltinFunction::NumericAdd.identifier().name());
        assert_eq!(
            BuiltinFunction::ScanCollection,
            "scan-collection".parse::<BuiltinFunction>().unwrap()
        );
    }

    #[test]
    fn test_validate_arity() {
        let registry = FunctionRegistry::with_builtins();
        let x = LogicalExpression::var(LogicalVariable::new(1));
        assert!(registry
            .validate(&LogicalExpression::eq(x.clone(), x.clone()))
            .is_ok());
        let bad = LogicalExpression::call(BuiltinFunction::Eq, vec![x]);
        let err = registry.validate(&bad).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OptError>(),
            Some(OptError::MalformedExpression { .. })
        ));
    }

    #[test]
    fn test_unknown_function() {
        let registry = FunctionRegistry::empty();
        let expr = LogicalExpression::and(vec![
            LogicalExpression::true_constant(),
            LogicalExpression::true_constant(),
        ]);
        let err = registry.validate(&expr).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OptError>(),
            Some(OptError::UnknownFunction(_))
        ));
    }
}
