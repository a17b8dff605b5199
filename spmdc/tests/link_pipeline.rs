//! End-to-end tests for the builtin link pipeline.
//!
//! Libraries are registered as textual IR, linked into a small kernel
//! module, and the module is inspected afterwards.

use inkwell::context::Context;
use inkwell::memory_buffer::MemoryBuffer;
use inkwell::module::{Linkage, Module};
use spmdc::builtins::{
    link_dispatcher, BindError, BitcodeModuleLinker, IntrinsicSymbolBinder, IntrinsicTypeMapper,
    LibraryKey, LibraryRegistry, LibraryRole, LinkError, LinkMode, LinkPipeline, LinkStage,
    PersistentCatalog, PersistentGroup,
};
use spmdc::config::LinkContext;
use spmdc::diagnostics::{DiagnosticSink, ErrorCode};
use spmdc::symbol::SymbolTable;
use spmdc::target::{Arch, Target, TargetIsa, TargetOs};

const KERNEL: &str = r#"
target triple = "x86_64-unknown-linux-gnu"

declare void @member1()
declare <8 x float> @__stdlib_rsqrt(<8 x float>)

define <8 x float> @kernel(<8 x float> %x) {
  call void @member1()
  %r = call <8 x float> @__stdlib_rsqrt(<8 x float> %x)
  ret <8 x float> %r
}
"#;

const STDLIB: &str = r#"
declare void @member2()
declare void @member3()
declare void @member4()
declare void @__do_print(i8*)

define <8 x float> @__stdlib_rsqrt(<8 x float> %x) {
  ret <8 x float> %x
}

define void @__stdlib_print_lanes() {
  call void @member3()
  ret void
}

!llvm.ident = !{!0}
!0 = !{!"stdlib build compiler"}
"#;

const COMMON_BUILTINS: &str = r#"
define i32 @__num_cores() {
  ret i32 4
}

define void @__do_print(i8* %format) {
  ret void
}

define void @__common_unused() {
  ret void
}
"#;

const TARGET_BUILTINS: &str = r#"
@__math_lib = constant i32 0

declare <8 x float> @llvm.x86.avx.rcp.ps.256(<8 x float>)

define void @member1() {
  %lib = load i32, i32* @__math_lib
  ret void
}
define void @member2() {
  ret void
}
define void @member3() {
  ret void
}
define void @member4() {
  ret void
}
define <8 x float> @__target_rcp(<8 x float> %x) {
  %r = call <8 x float> @llvm.x86.avx.rcp.ps.256(<8 x float> %x)
  ret <8 x float> %r
}
"#;

fn avx2() -> Target {
    Target::new(TargetIsa::Avx2I32x8, TargetOs::Linux, Arch::X86_64).unwrap()
}

fn parse<'ctx>(ctx: &'ctx Context, name: &str, ir: &str) -> Module<'ctx> {
    let buffer = MemoryBuffer::create_from_memory_range_copy(ir.as_bytes(), name);
    ctx.create_module_from_ir(buffer).unwrap()
}

fn catalog() -> PersistentCatalog {
    PersistentCatalog::new(
        vec![
            PersistentGroup::new("groupX", &["member1", "member2"]),
            PersistentGroup::new("groupY", &["member3", "member4"]),
        ],
        vec!["__do_print"],
    )
}

fn registry_for(target: &Target) -> LibraryRegistry {
    let registry = LibraryRegistry::new();
    registry.register_ir(LibraryKey::for_target(LibraryRole::Stdlib, target), STDLIB);
    registry.register_ir(
        LibraryKey::for_target(LibraryRole::CommonBuiltins, target),
        COMMON_BUILTINS,
    );
    registry.register_ir(
        LibraryKey::for_target(LibraryRole::TargetBuiltins, target),
        TARGET_BUILTINS,
    );
    registry
}

// ============================================================
// Persistent groups
// ============================================================

#[test]
fn test_group_sibling_survives_and_unused_group_is_gone() {
    let target = avx2();
    let config = LinkContext::new(target);
    let registry = registry_for(&target);
    let context = Context::create();
    let module = parse(&context, "kernel", KERNEL);

    let mut stage = 0;
    let report = LinkPipeline::new(&config, &registry)
        .with_catalog(catalog())
        .run(&context, &module, &mut stage)
        .unwrap();

    for kept in ["member1", "member2"] {
        let function = module.get_function(kept).unwrap();
        assert!(function.count_basic_blocks() > 0, "{} lost its body", kept);
    }
    assert!(module.get_function("member3").is_none());
    assert!(module.get_function("member4").is_none());
    assert!(module.get_function("__stdlib_print_lanes").is_none());

    assert_eq!(report.roots.names(), ["member1", "member2", "__do_print"]);
    assert_eq!(stage, 3);
    assert!(report.warnings.is_empty());
    assert!(module.verify().is_ok());
}

#[test]
fn test_persistent_funcs_survive_without_uses() {
    let target = avx2();
    let config = LinkContext::new(target);
    let registry = registry_for(&target);
    let context = Context::create();
    let module = parse(&context, "kernel", KERNEL);

    let mut stage = 0;
    LinkPipeline::new(&config, &registry)
        .with_catalog(catalog())
        .run(&context, &module, &mut stage)
        .unwrap();

    let print = module.get_function("__do_print").unwrap();
    assert!(print.count_basic_blocks() > 0);
    assert_eq!(print.get_linkage(), Linkage::External);
    assert_eq!(
        module.get_function("__num_cores").unwrap().get_linkage(),
        Linkage::External
    );
    assert!(module.get_function("__common_unused").is_none());
}

#[test]
fn test_stdlib_definitions_become_internal() {
    let target = avx2();
    let config = LinkContext::new(target);
    let registry = registry_for(&target);
    let context = Context::create();
    let module = parse(&context, "kernel", KERNEL);

    let mut stage = 0;
    let report = LinkPipeline::new(&config, &registry)
        .with_catalog(catalog())
        .run(&context, &module, &mut stage)
        .unwrap();

    assert_eq!(
        module.get_function("__stdlib_rsqrt").unwrap().get_linkage(),
        Linkage::Internal
    );
    assert_eq!(
        module.get_function("kernel").unwrap().get_linkage(),
        Linkage::External
    );
    assert_eq!(
        module.get_global("__math_lib").unwrap().get_linkage(),
        Linkage::Internal
    );
    assert_eq!(module.get_global_metadata_size("llvm.ident"), 0);

    let stages: Vec<_> = report.stages.iter().map(|s| s.stage).collect();
    assert_eq!(
        stages,
        [
            LinkStage::LinkStdlib,
            LinkStage::LinkCommonBuiltins,
            LinkStage::LinkTargetBuiltins,
            LinkStage::FinalizeLinkage,
        ]
    );
}

#[test]
fn test_without_stdlib_preservation_still_runs() {
    let target = avx2();
    let config = LinkContext::new(target).with_stdlib(false);
    let registry = registry_for(&target);
    let context = Context::create();
    let module = parse(
        &context,
        "kernel",
        r#"
declare void @member2()

define void @kernel() {
  call void @member2()
  ret void
}
"#,
    );

    let mut stage = 0;
    let report = LinkPipeline::new(&config, &registry)
        .with_catalog(catalog())
        .run(&context, &module, &mut stage)
        .unwrap();

    assert_eq!(stage, 2);
    assert!(report.stage(LinkStage::LinkStdlib).is_none());
    // member1 was not declared when groups were evaluated, so only the
    // referenced member is kept.
    assert!(module.get_function("member2").is_some());
    assert!(module.get_function("member1").is_none());
    assert!(module.get_function("__stdlib_rsqrt").is_none());
}

// ============================================================
// Failures
// ============================================================

#[test]
fn test_missing_library_aborts_before_any_merge() {
    let target = avx2();
    let config = LinkContext::new(target);
    let registry = LibraryRegistry::new();
    registry.register_ir(LibraryKey::for_target(LibraryRole::Stdlib, &target), STDLIB);
    registry.register_ir(
        LibraryKey::for_target(LibraryRole::CommonBuiltins, &target),
        COMMON_BUILTINS,
    );
    let context = Context::create();
    let module = parse(&context, "kernel", KERNEL);
    let before = module.print_to_string().to_string();

    let mut stage = 0;
    let err = LinkPipeline::new(&config, &registry)
        .run(&context, &module, &mut stage)
        .unwrap_err();

    assert_eq!(err.stage(), Some(LinkStage::LinkTargetBuiltins));
    match err.root_cause() {
        LinkError::MissingLibrary { key } => {
            assert_eq!(key.role, LibraryRole::TargetBuiltins);
            assert_eq!(key.isa, Some(TargetIsa::Avx2I32x8));
        }
        other => panic!("expected a missing library, got {:?}", other),
    }
    assert_eq!(err.error_code(), ErrorCode::MissingLibrary);
    assert!(err.to_string().starts_with("LinkTargetBuiltins failed"));
    assert_eq!(module.print_to_string().to_string(), before);
    assert_eq!(stage, 0);
}

#[test]
fn test_library_for_another_target_is_missing() {
    let registry = registry_for(&avx2());
    let sse = Target::new(TargetIsa::Sse41I32x4, TargetOs::Linux, Arch::X86_64).unwrap();
    let config = LinkContext::new(sse);
    let context = Context::create();
    let module = context.create_module("kernel");

    let err = LinkPipeline::new(&config, &registry)
        .run(&context, &module, &mut 0)
        .unwrap_err();
    assert_eq!(err.stage(), Some(LinkStage::LinkStdlib));
    assert!(matches!(err.root_cause(), LinkError::MissingLibrary { .. }));
}

#[test]
fn test_stale_intrinsic_declaration_fails_finalize() {
    let target = avx2();
    let config = LinkContext::new(target).with_stdlib(false);
    let registry = registry_for(&target);
    registry.register_ir(
        LibraryKey::for_target(LibraryRole::TargetBuiltins, &target),
        r#"
declare <4 x float> @llvm.x86.avx.rcp.ps.256(<4 x float>)

define <4 x float> @__target_rcp(<4 x float> %x) {
  %r = call <4 x float> @llvm.x86.avx.rcp.ps.256(<4 x float> %x)
  ret <4 x float> %r
}
"#,
    );
    let context = Context::create();
    let module = parse(
        &context,
        "kernel",
        r#"
declare <4 x float> @__target_rcp(<4 x float>)

define <4 x float> @kernel(<4 x float> %x) {
  %r = call <4 x float> @__target_rcp(<4 x float> %x)
  ret <4 x float> %r
}
"#,
    );

    let err = LinkPipeline::new(&config, &registry)
        .run(&context, &module, &mut 0)
        .unwrap_err();
    assert_eq!(err.stage(), Some(LinkStage::FinalizeLinkage));
    assert!(matches!(
        err.root_cause(),
        LinkError::IntrinsicSignatureMismatch { name, .. } if name == "llvm.x86.avx.rcp.ps.256"
    ));
}

#[test]
fn test_user_definition_of_a_builtin_wins() {
    let target = avx2();
    let config = LinkContext::new(target).with_stdlib(false);
    let registry = registry_for(&target);
    let context = Context::create();
    let module = parse(
        &context,
        "kernel",
        "define i32 @__num_cores() {\n  ret i32 1\n}\n",
    );

    LinkPipeline::new(&config, &registry)
        .run(&context, &module, &mut 0)
        .unwrap();

    let cores = module.get_function("__num_cores").unwrap();
    assert_eq!(cores.get_linkage(), Linkage::External);
    let text = module.print_to_string().to_string();
    assert!(text.contains("ret i32 1"));
    assert!(!text.contains("ret i32 4"));
}

#[test]
fn test_user_function_named_like_a_local_library_helper_survives() {
    let target = avx2();
    let config = LinkContext::new(target);
    let registry = registry_for(&target);
    registry.register_ir(
        LibraryKey::for_target(LibraryRole::Stdlib, &target),
        "define internal void @helper() {\n  ret void\n}\n",
    );
    let context = Context::create();
    let module = parse(
        &context,
        "kernel",
        "define void @helper() {\n  ret void\n}\n",
    );

    LinkPipeline::new(&config, &registry)
        .run(&context, &module, &mut 0)
        .unwrap();

    let helper = module.get_function("helper").unwrap();
    assert!(helper.count_basic_blocks() > 0);
    assert_eq!(helper.get_linkage(), Linkage::External);
}

#[test]
fn test_stdlib_globals_are_internal_or_gone() {
    let target = avx2();
    let config = LinkContext::new(target);
    let registry = registry_for(&target);
    registry.register_ir(
        LibraryKey::for_target(LibraryRole::Stdlib, &target),
        r#"
@__stdlib_lut = constant [2 x i32] [i32 1, i32 2]
@__stdlib_scale = global float 2.0

define <8 x float> @__stdlib_rsqrt(<8 x float> %x) {
  %s = load float, float* @__stdlib_scale
  ret <8 x float> %x
}
"#,
    );
    let context = Context::create();
    let module = parse(&context, "kernel", KERNEL);

    LinkPipeline::new(&config, &registry)
        .run(&context, &module, &mut 0)
        .unwrap();

    assert!(module.get_global("__stdlib_lut").is_none());
    assert_eq!(
        module.get_global("__stdlib_scale").unwrap().get_linkage(),
        Linkage::Internal
    );
    assert_eq!(
        module.get_function("__stdlib_rsqrt").unwrap().get_linkage(),
        Linkage::Internal
    );
}

#[test]
fn test_incompatible_builtins_fail_the_stage() {
    let target = avx2();
    let config = LinkContext::new(target).with_stdlib(false);
    let registry = registry_for(&target);
    registry.register_ir(
        LibraryKey::for_target(LibraryRole::CommonBuiltins, &target),
        "@__init_table = appending global [1 x i64] [i64 2]\n",
    );
    let context = Context::create();
    let module = parse(
        &context,
        "kernel",
        "@__init_table = appending global [1 x i32] [i32 1]\n",
    );

    let err = LinkPipeline::new(&config, &registry)
        .run(&context, &module, &mut 0)
        .unwrap_err();
    assert_eq!(err.stage(), Some(LinkStage::LinkCommonBuiltins));
    assert_eq!(err.error_code(), ErrorCode::LinkConflict);
}

// ============================================================
// Multi-target builds and dumps
// ============================================================

#[test]
fn test_multi_target_stdlib_names_do_not_collide() {
    let context = Context::create();
    let module = context.create_module("dispatch_object");
    let linker = BitcodeModuleLinker::new(&context, &module);

    let mut all = Vec::new();
    for isa in [TargetIsa::Sse41I32x4, TargetIsa::Avx2I32x8] {
        let target = Target::new(isa, TargetOs::Linux, Arch::X86_64).unwrap();
        let lib = parse(&context, "stdlib", STDLIB);
        let names = linker
            .link_module(lib, "stdlib", &LinkMode::library().with_suffix(target.symbol_suffix()))
            .unwrap();
        all.extend(names.definitions);
    }

    assert_eq!(all.len(), 4);
    for name in &all {
        assert!(!name.starts_with("llvm."));
        assert!(module.get_function(name).is_some());
    }
    let mut unique = all.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), all.len());
    assert!(module.get_function("__stdlib_rsqrt_avx2_i32x8").is_some());
}

#[test]
fn test_dumps_follow_the_stage_counter() {
    let target = avx2();
    let dir = tempfile::tempdir().unwrap();
    let config = LinkContext::new(target)
        .with_multi_target(true)
        .with_debug_stages([5, 6, 7])
        .with_disabled_stages([6])
        .with_dump_dir(dir.path());
    let registry = registry_for(&target);
    let context = Context::create();
    let module = parse(
        &context,
        "kernel",
        r#"
declare void @member1()
declare <8 x float> @__stdlib_rsqrt_avx2_i32x8(<8 x float>)

define <8 x float> @kernel(<8 x float> %x) {
  call void @member1()
  %r = call <8 x float> @__stdlib_rsqrt_avx2_i32x8(<8 x float> %x)
  ret <8 x float> %r
}
"#,
    );

    let mut stage = 5;
    LinkPipeline::new(&config, &registry)
        .with_catalog(catalog())
        .run(&context, &module, &mut stage)
        .unwrap();

    assert_eq!(stage, 8);
    assert!(dir.path().join("pre_5_LinkStdlib.ll_avx2-i32x8").exists());
    assert!(!dir.path().join("pre_6_LinkCommonBuiltins.ll_avx2-i32x8").exists());
    let last = std::fs::read_to_string(dir.path().join("pre_7_LinkTargetBuiltins.ll_avx2-i32x8"))
        .unwrap();
    assert!(last.contains("@member2"));

    let rsqrt = module.get_function("__stdlib_rsqrt_avx2_i32x8").unwrap();
    assert!(rsqrt.count_basic_blocks() > 0);
    assert_eq!(rsqrt.get_linkage(), Linkage::Internal);
    for unsuffixed in ["__stdlib_rsqrt", "__stdlib_print_lanes"] {
        assert!(module.get_function(unsuffixed).is_none(), "{} left behind", unsuffixed);
    }
    assert!(module.verify().is_ok());
}

// ============================================================
// Dispatch and binding
// ============================================================

#[test]
fn test_dispatcher_links_all_stubs() {
    let target = avx2();
    let config = LinkContext::new(target);
    let registry = LibraryRegistry::new();
    registry.register_ir(
        LibraryKey::dispatch(TargetOs::Linux),
        r#"
declare i32 @__get_system_isa()

define void @__set_system_isa() {
  %isa = call i32 @__get_system_isa()
  ret void
}

define void @__terminate_now() {
  ret void
}
"#,
    );
    let context = Context::create();
    let module = context.create_module("dispatch");

    link_dispatcher(&context, &module, &config, &registry).unwrap();
    for name in ["__set_system_isa", "__terminate_now"] {
        let stub = module.get_function(name).unwrap();
        assert!(stub.count_basic_blocks() > 0);
        assert_eq!(stub.get_linkage(), Linkage::External);
    }
    assert!(module.get_global("llvm.compiler.used").is_none());

    let windows = Target::new(TargetIsa::Avx2I32x8, TargetOs::Windows, Arch::X86_64).unwrap();
    let other_os = LinkContext::new(windows);
    let err = link_dispatcher(&context, &module, &other_os, &registry).unwrap_err();
    assert_eq!(err.stage(), Some(LinkStage::LinkDispatch));
}

#[test]
fn test_aggregate_parameter_is_unrepresentable() {
    let context = Context::create();
    let module = parse(
        &context,
        "foreign",
        "declare <8 x float> @foreign_blend({ i32, float }, <8 x float>)\n",
    );
    let function = module.get_function("foreign_blend").unwrap();
    let binder = IntrinsicSymbolBinder::new(IntrinsicTypeMapper::for_target(&avx2()));
    let mut table = SymbolTable::new();
    let mut sink = DiagnosticSink::new();

    let err = binder.bind(function, &mut table, &mut sink).unwrap_err();
    assert!(matches!(
        err,
        BindError::UnrepresentableParam { ref function, index: 0, .. } if function == "foreign_blend"
    ));
    assert_eq!(sink.error_count(), 1);
    let diagnostic = &sink.diagnostics()[0];
    assert_eq!(diagnostic.code, Some(ErrorCode::UnrepresentableParamType));
    assert!(diagnostic.message.contains("parameter 0"));
    assert!(diagnostic.message.contains("foreign_blend"));
    assert!(table.is_empty());
    assert!(table.lookup_functions("foreign_blend").is_empty());

    assert_eq!(binder.bind(function, &mut table, &mut sink).unwrap_err(), err);
    assert_eq!(sink.error_count(), 1);
}
