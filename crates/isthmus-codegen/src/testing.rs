//! Shared fixture for the codegen unit tests.

use isthmus_catalog::{CatalogConfig, TypeCatalog};
use isthmus_core::types::Field;
use isthmus_core::{
    Capability, ConstValue, DeclaredConstant, DeclaredFunction, DeclaredType, Finding, Parameter,
    ParameterMode, QualifiedName, Side, TypeKind,
};
use isthmus_ownership::OwnershipResolver;
use isthmus_verify::{check_constant, check_signature, verify, CheckedSignature, VerificationProfile};

use crate::plan::{
    plan_constant, plan_function, plan_type, CodegenConfig, ConstantPlan, FunctionPlan, TypePlan,
};

pub struct Fixture {
    pub catalog: TypeCatalog,
    pub functions: Vec<DeclaredFunction>,
    pub constants: Vec<DeclaredConstant>,
    pub config: CodegenConfig,
}

fn point(name: &str, side: Side, float: &str) -> DeclaredType {
    DeclaredType::new(name, side, TypeKind::Value)
        .with_fields(vec![Field::new("x", float), Field::new("y", float)])
        .with_capabilities(&[Capability::Copyable, Capability::Movable])
}

/// A move-only record that owns a database handle.
fn entry(name: &str, side: Side, db: &str, id: &str) -> DeclaredType {
    DeclaredType::new(name, side, TypeKind::Value)
        .with_fields(vec![Field::new("db", db), Field::new("id", id)])
        .with_capabilities(&[Capability::Movable])
}

fn packet(name: &str, side: Side, id: &str, body: &str) -> DeclaredType {
    DeclaredType::new(name, side, TypeKind::Value)
        .with_fields(vec![Field::new("id", id), Field::new("body", body)])
        .with_capabilities(&[Capability::Copyable, Capability::Movable])
}

pub fn catalog() -> TypeCatalog {
    let mut cat = TypeCatalog::with_primitives(CatalogConfig::default());
    let types = vec![
        DeclaredType::sequence("Int32Slice", Side::A, "i32"),
        DeclaredType::sequence("IntSeq", Side::B, "int32_t").with_counterpart("Int32Slice"),
        point("Point", Side::A, "f64").with_counterpart("point_t"),
        point("point_t", Side::B, "double"),
        DeclaredType::opaque_handle("Db", Side::A)
            .with_dispatch(&["query", "close"])
            .with_counterpart("db_t"),
        DeclaredType::opaque_handle("db_t", Side::B).with_dispatch(&["query", "close"]),
        DeclaredType::opaque_handle("Shared", Side::A)
            .with_capabilities(&[
                Capability::RefCounted,
                Capability::ThreadShareable,
                Capability::DestructibleByOwner,
            ])
            .with_counterpart("shared_t"),
        DeclaredType::opaque_handle("shared_t", Side::B),
        DeclaredType::result("PortResult", Side::A, "u16", "i32")
            .with_capabilities(&[Capability::Copyable, Capability::Movable])
            .with_counterpart("port_result_t"),
        DeclaredType::result("port_result_t", Side::B, "uint16_t", "int32_t")
            .with_capabilities(&[Capability::Copyable, Capability::Movable]),
        DeclaredType::result("OpenResult", Side::A, "Db", "i32").with_counterpart("open_result_t"),
        DeclaredType::result("open_result_t", Side::B, "db_t", "int32_t"),
        entry("Entry", Side::A, "Db", "u32").with_counterpart("entry_t"),
        entry("entry_t", Side::B, "db_t", "uint32_t"),
        DeclaredType::sequence("Bytes", Side::A, "u8").with_counterpart("bytes_t"),
        DeclaredType::sequence("bytes_t", Side::B, "uint8_t"),
        packet("Packet", Side::A, "u32", "Bytes").with_counterpart("packet_t"),
        packet("packet_t", Side::B, "uint32_t", "bytes_t"),
        DeclaredType::new("MaybePacket", Side::A, TypeKind::Optional)
            .with_element("Packet")
            .with_capabilities(&[Capability::Copyable, Capability::Movable])
            .with_counterpart("maybe_packet_t"),
        DeclaredType::new("maybe_packet_t", Side::B, TypeKind::Optional)
            .with_element("packet_t")
            .with_capabilities(&[Capability::Copyable, Capability::Movable]),
    ];
    for ty in types {
        cat.register_type(ty).unwrap();
    }
    cat
}

pub fn functions() -> Vec<DeclaredFunction> {
    vec![
        DeclaredFunction::new("sum", Side::B)
            .param(Parameter::new("values", "IntSeq", ParameterMode::BorrowImmutable))
            .returning("int32_t"),
        DeclaredFunction::new("parse_port", Side::B)
            .param(Parameter::new("code", "int32_t", ParameterMode::ByValueCopy))
            .returning("port_result_t")
            .fallible(),
        DeclaredFunction::new("db_close", Side::B)
            .param(Parameter::new("db", "db_t", ParameterMode::ByValueMove)),
        DeclaredFunction::new("translate", Side::B)
            .param(Parameter::new("p", "point_t", ParameterMode::BorrowMutable))
            .param(Parameter::new("dx", "double", ParameterMode::ByValueCopy)),
        DeclaredFunction::new("watch", Side::A)
            .param(Parameter::new("s", "Shared", ParameterMode::ByValueCopy))
            .returning("i64"),
        DeclaredFunction::new("db_open", Side::B).returning("db_t"),
        DeclaredFunction::new("db_open_checked", Side::B)
            .returning("open_result_t")
            .fallible(),
        DeclaredFunction::new("adopt", Side::A)
            .param(Parameter::new("db", "Db", ParameterMode::ByValueMove)),
        DeclaredFunction::new("swap_entry", Side::B)
            .param(Parameter::new("entry", "entry_t", ParameterMode::ByValueMove))
            .returning("entry_t"),
        DeclaredFunction::new("reopen", Side::A)
            .param(Parameter::new("db", "Db", ParameterMode::ByValueMove))
            .returning("Db"),
        DeclaredFunction::new("stash_entry", Side::A)
            .param(Parameter::new("entry", "Entry", ParameterMode::ByValueMove))
            .returning("Entry"),
    ]
}

pub fn fixture() -> Fixture {
    Fixture {
        catalog: catalog(),
        functions: functions(),
        constants: vec![DeclaredConstant {
            name: QualifiedName::new("MAX_PORTS"),
            side: Side::B,
            ty: QualifiedName::new("int32_t"),
            value: ConstValue::Int(64),
        }],
        config: CodegenConfig::default(),
    }
}

impl Fixture {
    pub fn function(&self, name: &str) -> &DeclaredFunction {
        self.functions
            .iter()
            .find(|f| f.name.as_str() == name)
            .unwrap()
    }

    pub fn signature(&self, name: &str) -> CheckedSignature {
        let func = self.function(name);
        let own = OwnershipResolver::new()
            .resolve_function(&self.catalog, func)
            .unwrap();
        check_signature(&self.catalog, func, &own).unwrap()
    }

    pub fn finding(&self, name: &str) -> Finding {
        verify(
            &self.catalog,
            &self.signature(name),
            &VerificationProfile::default(),
        )
    }

    pub fn function_plan(&self, name: &str) -> FunctionPlan {
        plan_function(
            &self.catalog,
            &self.signature(name),
            &self.finding(name),
            &self.config,
        )
        .unwrap()
    }

    pub fn type_plan(&self, side: Side, name: &str) -> TypePlan {
        let ty = self.catalog.get(side, &QualifiedName::new(name)).unwrap();
        plan_type(&self.catalog, ty, &self.config).unwrap()
    }

    pub fn constant_plan(&self, name: &str) -> ConstantPlan {
        let constant = self
            .constants
            .iter()
            .find(|c| c.name.as_str() == name)
            .unwrap();
        let edge = check_constant(&self.catalog, constant).unwrap();
        plan_constant(&self.catalog, constant, &edge, &self.config)
    }
}
