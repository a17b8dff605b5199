//! Binding foreign LLVM functions to source-level symbols.
//!
//! When the type checker meets a reference to an LLVM intrinsic, it needs
//! a function symbol with a source signature. The binder builds one from
//! the intrinsic's LLVM signature, using the [`IntrinsicTypeMapper`], and
//! memoizes the result per function so that every reference shares one
//! symbol.

use inkwell::intrinsics::Intrinsic;
use inkwell::module::Module;
use inkwell::types::AnyType;
use inkwell::values::FunctionValue;
use tracing::debug;

use super::error::BindError;
use super::type_map::IntrinsicTypeMapper;
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::symbol::{SymbolId, SymbolOrigin, SymbolTable};
use crate::types::FunctionType;

/// Creates source symbols for foreign functions.
#[derive(Debug, Clone, Copy)]
pub struct IntrinsicSymbolBinder {
    mapper: IntrinsicTypeMapper,
}

impl IntrinsicSymbolBinder {
    pub fn new(mapper: IntrinsicTypeMapper) -> Self {
        Self { mapper }
    }

    pub fn mapper(&self) -> &IntrinsicTypeMapper {
        &self.mapper
    }

    /// Return the symbol for `function`, creating it on first use.
    ///
    /// A function whose signature cannot be expressed in source types is
    /// reported once to `sink`; later calls return the same error without
    /// reporting again. Intrinsic signatures carry no signedness, so
    /// integers bind as signed.
    pub fn bind<'ctx>(
        &self,
        function: FunctionValue<'ctx>,
        table: &mut SymbolTable<'ctx>,
        sink: &mut DiagnosticSink,
    ) -> Result<SymbolId, BindError> {
        if let Some(id) = table.lookup_intrinsic(function) {
            return Ok(id);
        }
        if let Some(error) = table.rejection(function) {
            return Err(error.clone());
        }

        let name = function.get_name().to_string_lossy().into_owned();
        let fn_type = match self.signature_of(function, &name) {
            Ok(fn_type) => fn_type,
            Err(error) => {
                debug!(function = %name, %error, "intrinsic rejected");
                sink.report(Diagnostic::from(&error));
                table.record_rejection(function, error.clone());
                return Err(error);
            }
        };

        debug!(function = %name, signature = %fn_type, "created intrinsic symbol");
        let id = table.add_function(&name, fn_type, SymbolOrigin::ForeignIntrinsic(function));
        table.register_intrinsic(function, id);
        Ok(id)
    }

    /// Declare the LLVM intrinsic `name` in `module` if needed and bind it.
    ///
    /// Overloaded intrinsics need concrete types to be declared and are
    /// refused here.
    pub fn declare_and_bind<'ctx>(
        &self,
        module: &Module<'ctx>,
        name: &str,
        table: &mut SymbolTable<'ctx>,
        sink: &mut DiagnosticSink,
    ) -> Result<SymbolId, BindError> {
        if let Some(function) = module.get_function(name) {
            return self.bind(function, table, sink);
        }

        let function = Intrinsic::find(name)
            .ok_or_else(|| BindError::UnknownIntrinsic {
                function: name.to_string(),
            })
            .and_then(|intrinsic| {
                if intrinsic.is_overloaded() {
                    return Err(BindError::OverloadedIntrinsic {
                        function: name.to_string(),
                    });
                }
                intrinsic
                    .get_declaration(module, &[])
                    .ok_or_else(|| BindError::UnknownIntrinsic {
                        function: name.to_string(),
                    })
            });

        match function {
            Ok(function) => self.bind(function, table, sink),
            Err(error) => {
                sink.report(Diagnostic::from(&error));
                Err(error)
            }
        }
    }

    fn signature_of(&self, function: FunctionValue<'_>, name: &str) -> Result<FunctionType, BindError> {
        let llvm_type = function.get_type();

        let return_type = match llvm_type.get_return_type() {
            Some(ty) => ty.as_any_type_enum(),
            None => llvm_type.get_context().void_type().as_any_type_enum(),
        };
        let return_type = self.mapper.map_type(return_type, false).map_err(|err| {
            BindError::UnrepresentableReturn {
                function: name.to_string(),
                llvm_type: err.llvm_type,
            }
        })?;

        let params = llvm_type
            .get_param_types()
            .into_iter()
            .enumerate()
            .map(|(index, ty)| {
                self.mapper
                    .map_type(ty.as_any_type_enum(), false)
                    .map_err(|err| BindError::UnrepresentableParam {
                        function: name.to_string(),
                        index,
                        llvm_type: err.llvm_type,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FunctionType::new(return_type, params))
    }
}
