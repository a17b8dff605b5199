//! Property-based tests for type mapping and multi-target naming.
//!
//! Uses proptest to generate LLVM type shapes and target pairs.

use inkwell::context::Context;
use inkwell::types::{AnyType, BasicType, BasicTypeEnum};
use inkwell::AddressSpace;
use proptest::prelude::*;
use spmdc::builtins::IntrinsicTypeMapper;
use spmdc::target::{MaskRepr, TargetIsa};

/// An LLVM type, described independently of any context.
#[derive(Debug, Clone)]
enum Shape {
    Int(u32),
    Half,
    Float,
    Double,
    Vector { elem: Box<Shape>, lanes: u32 },
    Pointer { pointee: Box<Shape>, address_space: u16 },
    Struct(Vec<Shape>),
    Array { elem: Box<Shape>, len: u32 },
}

fn scalar() -> impl Strategy<Value = Shape> {
    prop_oneof![
        prop_oneof![Just(1u32), Just(8), Just(16), Just(32), Just(64), 2u32..128].prop_map(Shape::Int),
        Just(Shape::Half),
        Just(Shape::Float),
        Just(Shape::Double),
    ]
}

fn vector() -> impl Strategy<Value = Shape> {
    (scalar(), prop_oneof![Just(4u32), Just(8), Just(16), 1u32..33]).prop_map(|(elem, lanes)| {
        Shape::Vector {
            elem: Box::new(elem),
            lanes,
        }
    })
}

/// Strategy for generating arbitrary type shapes, aggregates included
fn shape() -> impl Strategy<Value = Shape> {
    prop_oneof![scalar(), vector()].prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            (inner.clone(), prop_oneof![Just(0u16), 1u16..5]).prop_map(|(pointee, address_space)| {
                Shape::Pointer {
                    pointee: Box::new(pointee),
                    address_space,
                }
            }),
            prop::collection::vec(inner.clone(), 1..4).prop_map(Shape::Struct),
            (inner, 1u32..5).prop_map(|(elem, len)| Shape::Array {
                elem: Box::new(elem),
                len,
            }),
        ]
    })
}

fn isa() -> impl Strategy<Value = TargetIsa> {
    prop::sample::select(TargetIsa::ALL.to_vec())
}

fn build<'ctx>(ctx: &'ctx Context, shape: &Shape) -> BasicTypeEnum<'ctx> {
    match shape {
        Shape::Int(width) => ctx.custom_width_int_type(*width).into(),
        Shape::Half => ctx.f16_type().into(),
        Shape::Float => ctx.f32_type().into(),
        Shape::Double => ctx.f64_type().into(),
        Shape::Vector { elem, lanes } => match build(ctx, elem) {
            BasicTypeEnum::IntType(t) => t.vec_type(*lanes).into(),
            BasicTypeEnum::FloatType(t) => t.vec_type(*lanes).into(),
            other => unreachable!("vector of {:?}", other),
        },
        Shape::Pointer {
            pointee,
            address_space,
        } => build(ctx, pointee)
            .ptr_type(AddressSpace::from(*address_space))
            .into(),
        Shape::Struct(fields) => {
            let fields: Vec<_> = fields.iter().map(|f| build(ctx, f)).collect();
            ctx.struct_type(&fields, false).into()
        }
        Shape::Array { elem, len } => build(ctx, elem).array_type(*len).into(),
    }
}

fn is_scalar(shape: &Shape) -> bool {
    match shape {
        Shape::Int(width) => matches!(width, 1 | 8 | 16 | 32 | 64),
        Shape::Half | Shape::Float | Shape::Double => true,
        _ => false,
    }
}

fn is_bool(shape: &Shape) -> bool {
    match shape {
        Shape::Int(1) => true,
        Shape::Vector { elem, .. } => matches!(**elem, Shape::Int(1)),
        _ => false,
    }
}

/// Independent statement of which shapes have a source type.
fn representable(shape: &Shape, isa: TargetIsa) -> bool {
    match shape {
        Shape::Vector { elem, lanes } => {
            let bool_lanes = matches!(**elem, Shape::Int(1));
            *lanes == isa.vector_width()
                && is_scalar(elem)
                && (!bool_lanes || isa.mask_repr() == MaskRepr::I1)
        }
        Shape::Pointer {
            pointee,
            address_space,
        } => {
            *address_space == 0
                && !matches!(**pointee, Shape::Pointer { .. })
                && representable(pointee, isa)
                && !is_bool(pointee)
        }
        Shape::Struct(_) | Shape::Array { .. } => false,
        scalar => is_scalar(scalar),
    }
}

proptest! {
    /// The mapper accepts exactly the enumerated domain
    #[test]
    fn mapper_domain_is_exact(shape in shape(), isa in isa(), unsigned in any::<bool>()) {
        let ctx = Context::create();
        let ty = build(&ctx, &shape).as_any_type_enum();
        let mapped = IntrinsicTypeMapper::for_isa(isa).map_type(ty, unsigned);
        prop_assert_eq!(mapped.is_ok(), representable(&shape, isa), "{:?} on {}", shape, isa);
        if let Err(err) = mapped {
            prop_assert_eq!(err.llvm_type, ty.print_to_string().to_string());
        }
    }

    /// Mapping is a pure function of the type and the hint
    #[test]
    fn mapper_is_deterministic(shapes in prop::collection::vec(shape(), 1..6), isa in isa()) {
        let mapper = IntrinsicTypeMapper::for_isa(isa);
        let first_ctx = Context::create();
        let first: Vec<_> = shapes
            .iter()
            .map(|s| mapper.map_type(build(&first_ctx, s).as_any_type_enum(), false).ok())
            .collect();

        // Different context, reversed order.
        let second_ctx = Context::create();
        let mut second: Vec<_> = shapes
            .iter()
            .rev()
            .map(|s| mapper.map_type(build(&second_ctx, s).as_any_type_enum(), false).ok())
            .collect();
        second.reverse();
        prop_assert_eq!(first, second);
    }

    /// The signedness hint only ever changes integer kinds
    #[test]
    fn unsigned_hint_only_affects_integers(shape in shape(), isa in isa()) {
        let ctx = Context::create();
        let ty = build(&ctx, &shape).as_any_type_enum();
        let mapper = IntrinsicTypeMapper::for_isa(isa);
        if let (Ok(signed), Ok(unsigned)) = (mapper.map_type(ty, false), mapper.map_type(ty, true)) {
            prop_assert_eq!(signed.to_string(), unsigned.to_string().replace("uint", "int"));
        }
    }

    /// Per-ISA copies of a stdlib function never share a name
    #[test]
    fn multi_target_suffixes_are_distinct(
        name in "__[a-z][a-z0-9_]{0,15}",
        a in isa(),
        b in isa(),
    ) {
        let renamed_a = format!("{}{}", name, a.symbol_suffix());
        let renamed_b = format!("{}{}", name, b.symbol_suffix());
        prop_assert_eq!(renamed_a == renamed_b, a == b);
        prop_assert!(!renamed_a.starts_with("llvm."));
        prop_assert!(renamed_a.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }
}
