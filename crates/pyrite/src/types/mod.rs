//! Object types referenced from [`Value`](crate::value::Value).

pub mod class;
pub mod dict;
pub mod function;
pub mod generator;
pub mod iter;
pub mod list;
pub mod module;
pub mod set;

pub use class::{BuiltinType, Class, ExcRef, Instance, NativeConstructor, SuperProxy, compute_mro};
pub use dict::{Dict, DictKey};
pub use function::{BoundMethod, Function, NativeFn, NativeFunction, NativeReturn};
pub use generator::Generator;
pub use iter::ValueIter;
pub use list::{List, Tuple};
pub use module::Module;
pub use set::Set;
