//! Function descriptors: identity, parameters, and the resident-code handle.
//!
//! A [`Function`] is the immutable description of one target: who owns it, what it is
//! called, its ordered parameters, its return type, and (once prepared) where its
//! resident code lives. Identity for lookup and patch bookkeeping is the
//! [`FunctionId`]: owner plus name plus the ordered parameter-type list, rendered the
//! way the runtime renders overloads (`Calculator.add(i32, i32)`).

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::runtime::address::CodeAddress;
use crate::runtime::arena::{BodyFn, CodeBackend};
use crate::runtime::function::types::{FunctionFlags, ParamAttributes};
use crate::runtime::value::TypeDesc;
use crate::Result;

/// One parameter of a function, in declaration order.
#[derive(Clone, Debug)]
pub struct ParameterDescriptor {
    /// Parameter name, for diagnostics
    pub name: Arc<str>,
    /// Parameter type
    pub ty: TypeDesc,
    /// Attribute bits; `OUT` without `IN` marks an output-only parameter
    pub flags: ParamAttributes,
    /// Position among the parameters, starting at 0; assigned when the function is built
    pub sequence: u32,
}

impl ParameterDescriptor {
    /// Creates an ordinary (input) parameter
    #[must_use]
    pub fn new(name: &str, ty: TypeDesc) -> Self {
        ParameterDescriptor {
            name: Arc::from(name),
            ty,
            flags: ParamAttributes::empty(),
            sequence: 0,
        }
    }

    /// Creates an output-only parameter; its incoming value is never read, so it is
    /// excluded from prefix signatures.
    #[must_use]
    pub fn output(name: &str, ty: TypeDesc) -> Self {
        ParameterDescriptor {
            name: Arc::from(name),
            ty,
            flags: ParamAttributes::OUT,
            sequence: 0,
        }
    }

    /// True when the parameter only carries a result back to the caller
    #[must_use]
    pub fn is_output_only(&self) -> bool {
        self.flags.is_output_only()
    }
}

/// Identity of a function: owner, name, and the ordered parameter-type list.
///
/// Doubles as the selector callers hand to the registry and the function table;
/// two overloads of the same name have distinct identities.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FunctionId {
    owner: Arc<str>,
    name: Arc<str>,
    params: Vec<TypeDesc>,
}

impl FunctionId {
    /// Creates an identity from owner, name and parameter types
    #[must_use]
    pub fn new(owner: &str, name: &str, params: Vec<TypeDesc>) -> Self {
        FunctionId {
            owner: Arc::from(owner),
            name: Arc::from(name),
            params,
        }
    }

    /// The owning type or module
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The function name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ordered parameter types
    #[must_use]
    pub fn params(&self) -> &[TypeDesc] {
        &self.params
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}(", self.owner, self.name)?;
        for (index, ty) in self.params.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{ty}")?;
        }
        write!(f, ")")
    }
}

/// The immutable description of one compiled function.
///
/// Built once by [`crate::runtime::function::FunctionTable::define`]; the only state
/// that changes afterwards is the lazily materialized resident address.
pub struct Function {
    id: FunctionId,
    flags: FunctionFlags,
    params: Vec<ParameterDescriptor>,
    returns: TypeDesc,
    body: BodyFn,
    address: OnceLock<CodeAddress>,
}

/// Shared handle to a [`Function`]
pub type FunctionRc = Arc<Function>;

impl Function {
    /// Builds a function descriptor; parameter sequence numbers are assigned here.
    #[must_use]
    pub(crate) fn new(
        owner: &str,
        name: &str,
        flags: FunctionFlags,
        mut params: Vec<ParameterDescriptor>,
        returns: TypeDesc,
        body: BodyFn,
    ) -> FunctionRc {
        #[allow(clippy::cast_possible_truncation)]
        for (index, param) in params.iter_mut().enumerate() {
            param.sequence = index as u32;
        }

        let id = FunctionId::new(
            owner,
            name,
            params.iter().map(|p| p.ty.clone()).collect(),
        );

        Arc::new(Function {
            id,
            flags,
            params,
            returns,
            body,
            address: OnceLock::new(),
        })
    }

    /// The function's identity
    #[must_use]
    pub fn id(&self) -> &FunctionId {
        &self.id
    }

    /// The owning type or module
    #[must_use]
    pub fn owner(&self) -> &str {
        self.id.owner()
    }

    /// The function name
    #[must_use]
    pub fn name(&self) -> &str {
        self.id.name()
    }

    /// Modifier flags
    #[must_use]
    pub fn flags(&self) -> FunctionFlags {
        self.flags
    }

    /// Ordered parameter descriptors
    #[must_use]
    pub fn params(&self) -> &[ParameterDescriptor] {
        &self.params
    }

    /// Return type
    #[must_use]
    pub fn returns(&self) -> &TypeDesc {
        &self.returns
    }

    /// True when calls carry an instance receiver ahead of the parameters
    #[must_use]
    pub fn is_instance_bound(&self) -> bool {
        !self.flags.contains(FunctionFlags::STATIC)
    }

    /// Number of by-value slots a call passes: receiver (if any) plus parameters
    #[must_use]
    pub fn arg_count(&self) -> usize {
        self.params.len() + usize::from(self.is_instance_bound())
    }

    /// The resident code address, if the function has been prepared
    #[must_use]
    pub fn address(&self) -> Option<CodeAddress> {
        self.address.get().copied()
    }

    /// Forces the function into a compiled, resident state.
    ///
    /// Idempotent: the first call defines a region in the backend and pins its
    /// address; later calls return the pinned address.
    ///
    /// # Errors
    /// Propagates backend definition failures.
    pub fn prepare(&self, backend: &dyn CodeBackend) -> Result<CodeAddress> {
        if let Some(address) = self.address.get() {
            return Ok(*address);
        }
        let address = backend.define(self.name(), self.body.clone())?;
        Ok(*self.address.get_or_init(|| address))
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("id", &self.id.to_string())
            .field("flags", &self.flags)
            .field("returns", &self.returns)
            .field("address", &self.address.get())
            .finish()
    }
}
