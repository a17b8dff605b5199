//! IR queries that inkwell does not expose.
//!
//! Use lists and constant operands are walked through the LLVM C API
//! directly. Every function here takes inkwell handles, so the values are
//! known to be live for the duration of the call.

use std::ffi::CStr;

use inkwell::llvm_sys::core::{
    LLVMGetFirstUse, LLVMGetNextUse, LLVMGetNumOperands, LLVMGetOperand, LLVMGetUser,
    LLVMGetValueName2, LLVMIsAConstant, LLVMIsAConstantExpr, LLVMIsAGlobalValue,
    LLVMSetInitializer,
};
use inkwell::llvm_sys::prelude::LLVMValueRef;
use inkwell::module::{Linkage, Module};
use inkwell::values::{AsValueRef, FunctionValue, GlobalValue};

/// Name of the appending global that keeps its referents alive through
/// optimization.
pub const COMPILER_USED: &str = "llvm.compiler.used";

/// Section LLVM requires for the compiler-used array.
pub const METADATA_SECTION: &str = "llvm.metadata";

/// Number of real uses of `function`.
///
/// Uses through constant expressions and constant aggregates are followed
/// to the instructions or globals that hold them, so a dead bitcast counts
/// for nothing. Anything flowing into `excluded` (the current compiler-used
/// array) is not counted.
pub fn genuine_use_count(function: FunctionValue<'_>, excluded: Option<GlobalValue<'_>>) -> usize {
    let excluded = excluded
        .and_then(|global| global.get_initializer())
        .map(|init| init.as_value_ref());
    // SAFETY: `function` is a live function in a live module; use lists and
    // users are only read.
    unsafe { count_users(function.as_value_ref(), excluded) }
}

unsafe fn count_users(value: LLVMValueRef, excluded: Option<LLVMValueRef>) -> usize {
    let mut count = 0;
    let mut use_ref = LLVMGetFirstUse(value);
    while !use_ref.is_null() {
        let user = LLVMGetUser(use_ref);
        if Some(user) == excluded {
            // Preservation entry, not a use.
        } else if !LLVMIsAConstant(user).is_null() && LLVMIsAGlobalValue(user).is_null() {
            count += count_users(user, excluded);
        } else {
            count += 1;
        }
        use_ref = LLVMGetNextUse(use_ref);
    }
    count
}

/// Whether anything at all refers to `function`.
pub fn has_any_use(function: FunctionValue<'_>) -> bool {
    // SAFETY: reads the use list of a live function.
    unsafe { !LLVMGetFirstUse(function.as_value_ref()).is_null() }
}

/// Names of the globals referenced by the compiler-used array, in order.
pub fn compiler_used_names(module: &Module<'_>) -> Vec<String> {
    let Some(init) = module
        .get_global(COMPILER_USED)
        .and_then(|global| global.get_initializer())
    else {
        return Vec::new();
    };

    let mut names = Vec::new();
    // SAFETY: the initializer is a live constant owned by `module`.
    unsafe {
        let array = init.as_value_ref();
        let count = LLVMGetNumOperands(array).max(0) as u32;
        for i in 0..count {
            let mut entry = LLVMGetOperand(array, i);
            while !entry.is_null() && !LLVMIsAConstantExpr(entry).is_null() {
                entry = LLVMGetOperand(entry, 0);
            }
            if entry.is_null() || LLVMIsAGlobalValue(entry).is_null() {
                continue;
            }
            if let Some(name) = value_name(entry) {
                names.push(name);
            }
        }
    }
    names
}

unsafe fn value_name(value: LLVMValueRef) -> Option<String> {
    let mut len = 0usize;
    let ptr = LLVMGetValueName2(value, &mut len);
    if ptr.is_null() || len == 0 {
        return None;
    }
    let bytes = std::slice::from_raw_parts(ptr as *const u8, len);
    Some(String::from_utf8_lossy(bytes).into_owned())
}

/// A function's name as an owned string.
pub fn function_name(function: FunctionValue<'_>) -> String {
    cstr_to_string(function.get_name())
}

pub fn global_name(global: GlobalValue<'_>) -> String {
    cstr_to_string(global.get_name())
}

/// Drop a global variable's initializer, leaving an external declaration.
pub fn clear_initializer(global: GlobalValue<'_>) {
    // SAFETY: a null initializer is how the C API turns a live global
    // variable into a declaration.
    unsafe { LLVMSetInitializer(global.as_value_ref(), std::ptr::null_mut()) }
    global.set_linkage(Linkage::External);
}

pub fn cstr_to_string(name: &CStr) -> String {
    name.to_string_lossy().into_owned()
}

/// Whether `name` is in LLVM's reserved intrinsic namespace.
pub fn is_intrinsic_name(name: &str) -> bool {
    name.starts_with("llvm.")
}

/// Number of functions in the module that have a body.
pub fn defined_function_count(module: &Module<'_>) -> usize {
    module
        .get_functions()
        .filter(|f| f.count_basic_blocks() > 0)
        .count()
}
