//! Implementation of the id() and repr() builtin functions.

use std::hash::{BuildHasher, Hash, Hasher};

use crate::{args::CallArgs, bytecode::Vm, exception_private::RunResult, types::NativeReturn, value::Value};

/// Fixed seeds so scalar ids are stable for the life of the process.
const SCALAR_ID_SEEDS: [u64; 4] = [0x9e37_79b9, 0x7f4a_7c15, 0x85eb_ca6b, 0xc2b2_ae35];

/// Implementation of the id() builtin function.
///
/// Heap-backed values report their object identity. Scalars have none, so
/// equal scalars get an id derived from their rendering.
pub(super) fn builtin_id(_vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let value = args.get_one_arg("id")?;
    let id = match value.object_id() {
        Some(id) => id.as_u64(),
        None => {
            let [k0, k1, k2, k3] = SCALAR_ID_SEEDS;
            let mut hasher = ahash::RandomState::with_seeds(k0, k1, k2, k3).build_hasher();
            value.type_name().hash(&mut hasher);
            value.basic_repr().hash(&mut hasher);
            hasher.finish()
        }
    };
    Ok(Value::Int(i64::try_from(id >> 1).unwrap_or(i64::MAX)).into())
}

pub(super) fn builtin_repr(vm: &mut Vm, args: CallArgs) -> RunResult<NativeReturn> {
    let value = args.get_one_arg("repr")?;
    Ok(Value::from(vm.repr_value(&value)?).into())
}
