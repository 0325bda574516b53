//! Dynamic types and values flowing through the interception runtime.
//!
//! The engine operates on an explicit in-process function model, so parameters, results
//! and receivers are represented as [`Value`]s described by [`TypeDesc`]s. A declared or
//! computed signature is a list of [`SlotDesc`]s, each of which may be by-reference:
//! by-reference slots are the call-site storage locations an interceptor chain shares
//! within one invocation.
//!
//! # Key Types
//! - [`TypeDesc`] - the type of a parameter, result or receiver
//! - [`SlotDesc`] - one element of a signature, with its by-reference flag
//! - [`Value`] - a runtime value occupying a slot
//! - [`ObjectData`] / [`ObjectRef`] - class instances with aliasing identity
//!
//! # Aliasing
//!
//! Scalar values are copied between frames and written back after each interceptor
//! call, which realizes by-reference threading for the serial chain. Object values
//! alias through [`std::sync::Arc`], so field mutation is visible everywhere the
//! instance is held, and replacing an object slot swaps the receiver every later
//! participant observes.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::{Error, Result};

/// The type of a parameter, result or receiver in the function model.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeDesc {
    /// No value; the return type of functions that return nothing
    Void,
    /// Boolean
    Bool,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// 64-bit floating point
    F64,
    /// Owned string
    Str,
    /// A class instance of the named type
    Class(Arc<str>),
}

impl TypeDesc {
    /// Creates a class type descriptor for `name`
    #[must_use]
    pub fn class(name: &str) -> Self {
        TypeDesc::Class(Arc::from(name))
    }

    /// Returns the default value of this type, used to seed a dispatcher's result slot
    /// before any prefix or the original has written to it.
    ///
    /// Classes default to [`Value::Null`]; `Void` defaults to [`Value::Unit`].
    #[must_use]
    pub fn default_value(&self) -> Value {
        match self {
            TypeDesc::Void => Value::Unit,
            TypeDesc::Bool => Value::Bool(false),
            TypeDesc::I32 => Value::I32(0),
            TypeDesc::I64 => Value::I64(0),
            TypeDesc::F64 => Value::F64(0.0),
            TypeDesc::Str => Value::Str(String::new()),
            TypeDesc::Class(_) => Value::Null,
        }
    }

    /// Returns true for `Void`
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, TypeDesc::Void)
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDesc::Void => write!(f, "void"),
            TypeDesc::Bool => write!(f, "bool"),
            TypeDesc::I32 => write!(f, "i32"),
            TypeDesc::I64 => write!(f, "i64"),
            TypeDesc::F64 => write!(f, "f64"),
            TypeDesc::Str => write!(f, "str"),
            TypeDesc::Class(name) => write!(f, "{name}"),
        }
    }
}

/// One element of a declared or computed signature.
///
/// `by_ref` slots are shared call-site storage: whatever an interceptor writes into
/// such a slot is observed by every subsequent interceptor and by the original call.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SlotDesc {
    /// The slot is a shared, mutable storage location rather than a copied value
    pub by_ref: bool,
    /// The type occupying the slot
    pub ty: TypeDesc,
}

impl SlotDesc {
    /// Creates a by-value slot
    #[must_use]
    pub fn by_val(ty: TypeDesc) -> Self {
        SlotDesc { by_ref: false, ty }
    }

    /// Creates a by-reference slot
    #[must_use]
    pub fn by_ref(ty: TypeDesc) -> Self {
        SlotDesc { by_ref: true, ty }
    }
}

impl fmt::Display for SlotDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.by_ref {
            write!(f, "&mut {}", self.ty)
        } else {
            write!(f, "{}", self.ty)
        }
    }
}

/// A class instance with named fields.
///
/// Instances are held behind [`Arc`] so every slot referring to the same object
/// aliases it; field mutation through any alias is visible through all of them.
pub struct ObjectData {
    class: Arc<str>,
    fields: RwLock<HashMap<String, Value>>,
}

/// Shared handle to an [`ObjectData`]
pub type ObjectRef = Arc<ObjectData>;

impl ObjectData {
    /// Creates a new, empty instance of the named class
    #[must_use]
    pub fn new(class: &str) -> ObjectRef {
        Arc::new(ObjectData {
            class: Arc::from(class),
            fields: RwLock::new(HashMap::new()),
        })
    }

    /// The class name of this instance
    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Reads a field value, `None` if the field was never set
    #[must_use]
    pub fn get(&self, field: &str) -> Option<Value> {
        self.fields.read().ok()?.get(field).cloned()
    }

    /// Writes a field value, creating the field on first write
    pub fn set(&self, field: &str, value: Value) {
        if let Ok(mut fields) = self.fields.write() {
            let _ = fields.insert(field.to_string(), value);
        }
    }
}

impl fmt::Debug for ObjectData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectData({})", self.class)
    }
}

/// A runtime value occupying a parameter, result or receiver slot.
#[derive(Clone, Debug)]
pub enum Value {
    /// The absence of a value; what void calls produce
    Unit,
    /// A class slot holding no instance
    Null,
    /// Boolean
    Bool(bool),
    /// 32-bit signed integer
    I32(i32),
    /// 64-bit signed integer
    I64(i64),
    /// 64-bit floating point
    F64(f64),
    /// Owned string
    Str(String),
    /// A class instance, aliased through its [`ObjectRef`]
    Object(ObjectRef),
}

impl Value {
    /// Creates a string value
    #[must_use]
    pub fn str(value: &str) -> Self {
        Value::Str(value.to_string())
    }

    /// The type descriptor of this value.
    ///
    /// `Unit` maps to `Void`; `Null` has no class of its own and also maps to `Void`,
    /// use [`Value::matches`] for assignability checks instead.
    #[must_use]
    pub fn type_desc(&self) -> TypeDesc {
        match self {
            Value::Unit | Value::Null => TypeDesc::Void,
            Value::Bool(_) => TypeDesc::Bool,
            Value::I32(_) => TypeDesc::I32,
            Value::I64(_) => TypeDesc::I64,
            Value::F64(_) => TypeDesc::F64,
            Value::Str(_) => TypeDesc::Str,
            Value::Object(data) => TypeDesc::class(data.class()),
        }
    }

    /// Returns true if this value can occupy a slot of type `ty`.
    ///
    /// `Null` is assignable to any class slot.
    #[must_use]
    pub fn matches(&self, ty: &TypeDesc) -> bool {
        match (self, ty) {
            (Value::Null, TypeDesc::Class(_)) => true,
            _ => self.type_desc() == *ty,
        }
    }

    /// Extracts a boolean
    ///
    /// # Errors
    /// Returns [`Error::Invocation`] if the value is not a `Bool`.
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(value) => Ok(*value),
            other => Err(Error::Invocation(format!("expected bool, found {other:?}"))),
        }
    }

    /// Extracts a 32-bit integer
    ///
    /// # Errors
    /// Returns [`Error::Invocation`] if the value is not an `I32`.
    pub fn as_i32(&self) -> Result<i32> {
        match self {
            Value::I32(value) => Ok(*value),
            other => Err(Error::Invocation(format!("expected i32, found {other:?}"))),
        }
    }

    /// Extracts a 64-bit integer
    ///
    /// # Errors
    /// Returns [`Error::Invocation`] if the value is not an `I64`.
    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Value::I64(value) => Ok(*value),
            other => Err(Error::Invocation(format!("expected i64, found {other:?}"))),
        }
    }

    /// Extracts a float
    ///
    /// # Errors
    /// Returns [`Error::Invocation`] if the value is not an `F64`.
    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Value::F64(value) => Ok(*value),
            other => Err(Error::Invocation(format!("expected f64, found {other:?}"))),
        }
    }

    /// Borrows the string contents
    ///
    /// # Errors
    /// Returns [`Error::Invocation`] if the value is not a `Str`.
    pub fn as_str(&self) -> Result<&str> {
        match self {
            Value::Str(value) => Ok(value),
            other => Err(Error::Invocation(format!("expected str, found {other:?}"))),
        }
    }

    /// Borrows the object handle
    ///
    /// # Errors
    /// Returns [`Error::Invocation`] if the value is not an `Object`.
    pub fn as_object(&self) -> Result<&ObjectRef> {
        match self {
            Value::Object(data) => Ok(data),
            other => Err(Error::Invocation(format!(
                "expected an object instance, found {other:?}"
            ))),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            // Object identity, not structural equality
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
