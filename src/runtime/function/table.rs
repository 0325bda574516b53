//! Function table: the descriptor supplier the patch engine resolves targets through.

use dashmap::DashMap;

use crate::runtime::arena::BodyFn;
use crate::runtime::function::descriptor::{
    Function, FunctionId, FunctionRc, ParameterDescriptor,
};
use crate::runtime::function::types::FunctionFlags;
use crate::runtime::value::TypeDesc;
use crate::{Error, Result};

/// Registry of every known function, keyed by identity.
///
/// Plays the role of the function-descriptor supplier: resolve a function by owner,
/// name and ordered parameter-type list, and hand out the descriptor the rest of the
/// engine works with. Lookups that match nothing fail with
/// [`Error::MissingTarget`].
///
/// # Examples
///
/// ```rust
/// use repatch::runtime::function::{FunctionFlags, FunctionId, FunctionTable, ParameterDescriptor};
/// use repatch::runtime::value::{TypeDesc, Value};
/// use std::sync::Arc;
///
/// let table = FunctionTable::new();
/// table.define(
///     "Calculator",
///     "add",
///     FunctionFlags::STATIC,
///     vec![
///         ParameterDescriptor::new("a", TypeDesc::I32),
///         ParameterDescriptor::new("b", TypeDesc::I32),
///     ],
///     TypeDesc::I32,
///     Arc::new(|_, args| Ok(Value::I32(args[0].as_i32()? + args[1].as_i32()?))),
/// );
///
/// let id = FunctionId::new("Calculator", "add", vec![TypeDesc::I32, TypeDesc::I32]);
/// let function = table.resolve(&id)?;
/// assert_eq!(function.name(), "add");
/// # Ok::<(), repatch::Error>(())
/// ```
pub struct FunctionTable {
    functions: DashMap<FunctionId, FunctionRc>,
}

impl FunctionTable {
    /// Creates an empty table
    #[must_use]
    pub fn new() -> Self {
        FunctionTable {
            functions: DashMap::new(),
        }
    }

    /// Defines a function and returns its descriptor.
    ///
    /// A definition with the same owner, name and parameter types replaces the
    /// previous one; overloads with different parameter lists coexist.
    pub fn define(
        &self,
        owner: &str,
        name: &str,
        flags: FunctionFlags,
        params: Vec<ParameterDescriptor>,
        returns: TypeDesc,
        body: BodyFn,
    ) -> FunctionRc {
        let function = Function::new(owner, name, flags, params, returns, body);
        let _ = self
            .functions
            .insert(function.id().clone(), function.clone());
        function
    }

    /// Resolves a function by identity
    ///
    /// # Errors
    /// Returns [`Error::MissingTarget`] if no function matches `id`.
    pub fn resolve(&self, id: &FunctionId) -> Result<FunctionRc> {
        self.functions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::MissingTarget {
                target: id.to_string(),
            })
    }

    /// Number of defined functions
    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Returns true if no functions are defined
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl Default for FunctionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTable")
            .field("functions", &self.functions.len())
            .finish()
    }
}
