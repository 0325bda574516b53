//! Flag types for functions and their parameters.
//!
//! The numeric values mirror the attribute encodings of the runtime this model is
//! shaped after, so descriptors read naturally next to real metadata dumps.

use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    /// Attributes of a single parameter
    pub struct ParamAttributes: u32 {
        /// The incoming value is read by the callee
        const IN = 0x0001;
        /// The parameter carries a value back to the caller
        const OUT = 0x0002;
        /// The parameter is optional
        const OPTIONAL = 0x0010;
        /// The parameter has a default value
        const HAS_DEFAULT = 0x1000;
    }
}

impl ParamAttributes {
    /// True when the parameter's incoming value is never read: it only carries a
    /// result back. Output-only parameters are excluded from prefix signatures.
    #[must_use]
    pub fn is_output_only(&self) -> bool {
        self.contains(ParamAttributes::OUT) && !self.contains(ParamAttributes::IN)
    }
}

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    /// Modifiers of a function definition
    pub struct FunctionFlags: u32 {
        /// Defined on the owner type rather than per instance
        const STATIC = 0x0010;
        /// The function cannot be overridden
        const FINAL = 0x0020;
        /// The function is virtual
        const VIRTUAL = 0x0040;
        /// The function is special to the runtime
        const SPECIAL_NAME = 0x0800;
    }
}
